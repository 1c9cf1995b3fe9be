//! Configuration module for the ASR tool
//!
//! Settings come from .env files, YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use andleoht_asr::config::ToolConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ToolConfig::from_env()?;
//!
//! // Load from YAML file with environment variable underneath
//! let config = ToolConfig::from_file(Path::new("asr.yaml"))?;
//!
//! println!("Recognizing against {}", config.iat.endpoint.base_url());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

mod yaml;

pub use yaml::{AudioYaml, BusinessYaml, CredentialsYaml, SessionYaml, YamlConfig};

use crate::core::iat::{AudioEncoding, IatConfig, IatCredentials};
use crate::errors::{IatError, IatResult};

pub const ENV_APP_ID: &str = "XFYUN_APP_ID";
pub const ENV_API_KEY: &str = "XFYUN_API_KEY";
pub const ENV_API_SECRET: &str = "XFYUN_API_SECRET";
pub const ENV_IAT_URL: &str = "XFYUN_IAT_URL";
pub const ENV_LANGUAGE: &str = "XFYUN_IAT_LANGUAGE";
pub const ENV_ACCENT: &str = "XFYUN_IAT_ACCENT";
pub const ENV_VAD_EOS: &str = "XFYUN_IAT_VAD_EOS";
pub const ENV_ENCODING: &str = "XFYUN_IAT_ENCODING";
pub const ENV_FRAME_SIZE: &str = "XFYUN_IAT_FRAME_SIZE";
pub const ENV_FRAME_INTERVAL_MS: &str = "XFYUN_IAT_FRAME_INTERVAL_MS";
pub const ENV_SESSION_TIMEOUT_SECS: &str = "XFYUN_IAT_SESSION_TIMEOUT_SECS";

/// Tool configuration
///
/// Holds the session settings and, optionally, default credentials used when
/// an invocation does not bring its own.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    pub iat: IatConfig,
    pub credentials: Option<IatCredentials>,
}

impl ToolConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first; variables that
    /// are already set win over its values.
    pub fn from_env() -> IatResult<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a YAML file on top of the process environment.
    ///
    /// # Errors
    /// Returns a configuration error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - The merged configuration fails validation
    pub fn from_file(path: &Path) -> IatResult<Self> {
        load_dotenv();
        let yaml = YamlConfig::from_file(path)?;
        Self::from_sources(|key| std::env::var(key).ok(), Some(yaml))
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> IatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_sources(lookup, None)
    }

    /// Merge environment values (base) with YAML overrides, then validate.
    pub fn from_sources<F>(lookup: F, yaml: Option<YamlConfig>) -> IatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut iat = IatConfig::default();

        // Environment
        if let Some(url) = get(ENV_IAT_URL) {
            iat = iat.with_endpoint(&url)?;
        }
        if let Some(language) = get(ENV_LANGUAGE) {
            iat.business.language = language;
        }
        if let Some(accent) = get(ENV_ACCENT) {
            iat.business.accent = accent;
        }
        if let Some(vad_eos) = get(ENV_VAD_EOS) {
            iat.business.vad_eos = parse_value(ENV_VAD_EOS, &vad_eos)?;
        }
        if let Some(encoding) = get(ENV_ENCODING) {
            iat.encoding = AudioEncoding::from_str(&encoding)?;
        }
        if let Some(frame_size) = get(ENV_FRAME_SIZE) {
            iat.frame_size = parse_value(ENV_FRAME_SIZE, &frame_size)?;
        }
        if let Some(interval) = get(ENV_FRAME_INTERVAL_MS) {
            iat.frame_interval =
                Duration::from_millis(parse_value(ENV_FRAME_INTERVAL_MS, &interval)?);
        }
        if let Some(timeout) = get(ENV_SESSION_TIMEOUT_SECS) {
            iat.session_timeout =
                Duration::from_secs(parse_value(ENV_SESSION_TIMEOUT_SECS, &timeout)?);
        }

        let mut app_id = get(ENV_APP_ID);
        let mut api_key = get(ENV_API_KEY);
        let mut api_secret = get(ENV_API_SECRET);

        // YAML overrides
        if let Some(yaml) = yaml {
            if let Some(creds) = &yaml.credentials {
                app_id = creds.app_id.clone().or(app_id);
                api_key = creds.api_key.clone().or(api_key);
                api_secret = creds.api_secret.clone().or(api_secret);
            }
            if let Some(endpoint) = &yaml.endpoint {
                iat = iat.with_endpoint(endpoint)?;
            }
            if let Some(business) = &yaml.business {
                business.apply_to(&mut iat.business);
            }
            if let Some(audio) = &yaml.audio {
                if let Some(format) = &audio.format {
                    iat.audio_format = format.clone();
                }
                if let Some(encoding) = audio.encoding {
                    iat.encoding = encoding;
                }
            }
            if let Some(session) = &yaml.session {
                if let Some(frame_size) = session.frame_size {
                    iat.frame_size = frame_size;
                }
                if let Some(ms) = session.frame_interval_ms {
                    iat.frame_interval = Duration::from_millis(ms);
                }
                if let Some(ms) = session.settle_delay_ms {
                    iat.settle_delay = Duration::from_millis(ms);
                }
                if let Some(secs) = session.connect_timeout_secs {
                    iat.connect_timeout = Duration::from_secs(secs);
                }
                if let Some(secs) = session.session_timeout_secs {
                    iat.session_timeout = Duration::from_secs(secs);
                }
                if let Some(ms) = session.close_timeout_ms {
                    iat.close_timeout = Duration::from_millis(ms);
                }
            }
        }

        let credentials = if app_id.is_none() && api_key.is_none() && api_secret.is_none() {
            None
        } else {
            Some(IatCredentials::new(
                app_id.unwrap_or_default(),
                api_key.unwrap_or_default(),
                api_secret.unwrap_or_default(),
            ))
        };

        let config = Self { iat, credentials };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IatResult<()> {
        self.iat.validate()?;
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => debug!("Ignoring unreadable .env file: {}", e),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> IatResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        IatError::Configuration(format!("Invalid value for {key}: '{raw}' ({e})"))
    })
}
