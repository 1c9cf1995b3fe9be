use serde::Deserialize;
use std::path::Path;

use crate::core::iat::{AudioEncoding, BusinessArgs};
use crate::errors::{IatError, IatResult};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// credentials:
///   app_id: "your-app-id"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///
/// endpoint: "wss://ws-api.xfyun.cn/v2/iat"
///
/// business:
///   domain: iat
///   language: zh_cn
///   accent: mandarin
///   vinfo: 1
///   vad_eos: 10000
///
/// audio:
///   format: "audio/L16;rate=16000"
///   encoding: lame
///
/// session:
///   frame_size: 8000
///   frame_interval_ms: 40
///   settle_delay_ms: 1000
///   connect_timeout_secs: 10
///   session_timeout_secs: 120
///   close_timeout_ms: 5000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub credentials: Option<CredentialsYaml>,
    pub endpoint: Option<String>,
    pub business: Option<BusinessYaml>,
    pub audio: Option<AudioYaml>,
    pub session: Option<SessionYaml>,
}

/// Application credentials from YAML
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsYaml {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for CredentialsYaml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsYaml")
            .field("app_id", &self.app_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Recognition parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BusinessYaml {
    pub domain: Option<String>,
    pub language: Option<String>,
    pub accent: Option<String>,
    pub vinfo: Option<u8>,
    pub vad_eos: Option<u32>,
}

impl BusinessYaml {
    /// Overlay the values present here onto `base`.
    pub fn apply_to(&self, base: &mut BusinessArgs) {
        if let Some(domain) = &self.domain {
            base.domain = domain.clone();
        }
        if let Some(language) = &self.language {
            base.language = language.clone();
        }
        if let Some(accent) = &self.accent {
            base.accent = accent.clone();
        }
        if let Some(vinfo) = self.vinfo {
            base.vinfo = vinfo;
        }
        if let Some(vad_eos) = self.vad_eos {
            base.vad_eos = vad_eos;
        }
    }
}

/// Audio payload description from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub format: Option<String>,
    pub encoding: Option<AudioEncoding>,
}

/// Session pacing and deadlines from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub frame_size: Option<usize>,
    pub frame_interval_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub session_timeout_secs: Option<u64>,
    pub close_timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns a configuration error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &Path) -> IatResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IatError::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> IatResult<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|e| IatError::Configuration(format!("Failed to parse YAML config: {e}")))
    }
}
