//! Configuration types for the iFlytek IAT streaming API.
//!
//! This module contains:
//! - Credentials issued by the vendor console
//! - The endpoint the session connects to
//! - Business parameters sent with the first frame
//! - Audio encoding and session pacing settings

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{IatError, IatResult};

// =============================================================================
// Constants
// =============================================================================

/// Default IAT WebSocket endpoint.
pub const IAT_URL: &str = "wss://ws-api.xfyun.cn/v2/iat";

/// Host of the default endpoint, used in the request signature.
pub const IAT_HOST: &str = "ws-api.xfyun.cn";

/// Request path of the default endpoint, used in the request signature.
pub const IAT_PATH: &str = "/v2/iat";

/// Audio format descriptor for 16 kHz 16-bit mono PCM.
pub const DEFAULT_AUDIO_FORMAT: &str = "audio/L16;rate=16000";

/// Bytes of audio per frame.
pub const DEFAULT_FRAME_SIZE: usize = 8000;

/// Largest frame the client will agree to send.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Pause between two frames. The server expects audio at roughly real-time pace.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Pause after the last frame so trailing results can arrive.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// WebSocket handshake deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for one complete session, handshake excluded.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// How long closing the outbound half may take, and how long the server may
/// keep answering after it.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Credentials
// =============================================================================

/// Credentials for one IAT application.
///
/// Wiped from memory on drop; `Debug` never prints the key or secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Deserialize)]
pub struct IatCredentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

impl IatCredentials {
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Reject credentials with blank fields.
    pub fn validate(&self) -> IatResult<()> {
        let blank = [
            ("app_id", &self.app_id),
            ("api_key", &self.api_key),
            ("api_secret", &self.api_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if blank.is_empty() {
            Ok(())
        } else {
            Err(IatError::Configuration(format!(
                "Missing credential fields: {}",
                blank.join(", ")
            )))
        }
    }
}

impl fmt::Debug for IatCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IatCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// A parsed `ws://` or `wss://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IatEndpoint {
    url: Url,
}

impl IatEndpoint {
    pub fn parse(raw: &str) -> IatResult<Self> {
        let url = Url::parse(raw)
            .map_err(|e| IatError::Configuration(format!("Invalid endpoint URL '{raw}': {e}")))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(IatError::Configuration(format!(
                    "Endpoint scheme must be ws or wss, got: {other}"
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(IatError::Configuration(format!(
                "Endpoint URL '{raw}' has no host"
            )));
        }

        Ok(Self { url })
    }

    /// Host as it appears in the `Host` header: with the port when one is explicit.
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Endpoint without query or fragment.
    pub fn base_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.to_string()
    }
}

impl Default for IatEndpoint {
    fn default() -> Self {
        Self {
            url: Url::parse(IAT_URL).expect("IAT_URL is a valid URL"),
        }
    }
}

// =============================================================================
// Audio Encoding
// =============================================================================

/// Encoding of the audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// MP3
    #[default]
    Lame,
    /// Headerless PCM
    Raw,
}

impl AudioEncoding {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lame => "lame",
            Self::Raw => "raw",
        }
    }

    /// Guess the encoding from a file name. Only PCM extensions map to `Raw`.
    pub fn from_filename(name: &str) -> Self {
        let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pcm") | Some("raw") => Self::Raw,
            _ => Self::Lame,
        }
    }
}

impl FromStr for AudioEncoding {
    type Err = IatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lame" | "mp3" => Ok(Self::Lame),
            "raw" | "pcm" => Ok(Self::Raw),
            other => Err(IatError::Configuration(format!(
                "Unsupported audio encoding: {other}. Supported encodings: lame, raw"
            ))),
        }
    }
}

// =============================================================================
// Business Parameters
// =============================================================================

/// Recognition parameters sent once, with the first frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessArgs {
    /// Recognition domain; `iat` is general dictation.
    pub domain: String,
    pub language: String,
    pub accent: String,
    /// Return voice activity details with results (0 or 1).
    pub vinfo: u8,
    /// Trailing silence in milliseconds after which the server ends the utterance.
    pub vad_eos: u32,
}

impl Default for BusinessArgs {
    fn default() -> Self {
        Self {
            domain: "iat".to_string(),
            language: "zh_cn".to_string(),
            accent: "mandarin".to_string(),
            vinfo: 1,
            vad_eos: 10000,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Settings for one recognition session.
#[derive(Debug, Clone)]
pub struct IatConfig {
    pub endpoint: IatEndpoint,
    pub business: BusinessArgs,
    /// Value of `data.format` on every frame.
    pub audio_format: String,
    pub encoding: AudioEncoding,
    pub frame_size: usize,
    pub frame_interval: Duration,
    pub settle_delay: Duration,
    pub connect_timeout: Duration,
    pub session_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for IatConfig {
    fn default() -> Self {
        Self {
            endpoint: IatEndpoint::default(),
            business: BusinessArgs::default(),
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            encoding: AudioEncoding::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl IatConfig {
    pub fn with_endpoint(mut self, raw: &str) -> IatResult<Self> {
        self.endpoint = IatEndpoint::parse(raw)?;
        Ok(self)
    }

    pub fn with_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn validate(&self) -> IatResult<()> {
        if self.frame_size == 0 || self.frame_size > MAX_FRAME_SIZE {
            return Err(IatError::Configuration(format!(
                "Frame size {} is outside supported range (1-{} bytes)",
                self.frame_size, MAX_FRAME_SIZE
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(IatError::Configuration(
                "Connect timeout must be greater than zero".to_string(),
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(IatError::Configuration(
                "Session timeout must be greater than zero".to_string(),
            ));
        }
        if self.close_timeout.is_zero() {
            return Err(IatError::Configuration(
                "Close timeout must be greater than zero".to_string(),
            ));
        }
        if self.business.domain.trim().is_empty() || self.business.language.trim().is_empty() {
            return Err(IatError::Configuration(
                "Business domain and language must not be empty".to_string(),
            ));
        }
        if self.audio_format.trim().is_empty() {
            return Err(IatError::Configuration(
                "Audio format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
