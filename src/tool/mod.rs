//! The `asr` tool: the host-facing boundary around the IAT driver.
//!
//! A host hands the tool a credential map and an uploaded file and always
//! gets a [`ToolMessage`] back. Failures never escape as panics or `Err`;
//! they travel in [`ToolMessage::error`] next to whatever text was recognized.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ToolConfig;
use crate::core::iat::{AudioEncoding, IatClient, IatCredentials, SpeechRecognizer};
use crate::errors::{IatError, IatResult};

pub const TOOL_NAME: &str = "asr";
pub const PARAM_AUDIO_FILE: &str = "audio_file";
pub const CREDENTIAL_APP_ID: &str = "xfyun_app_id";
pub const CREDENTIAL_API_KEY: &str = "xfyun_api_key";
pub const CREDENTIAL_API_SECRET: &str = "xfyun_api_secret";

/// Text returned when the input is not an audio file.
pub const NOT_AUDIO_MESSAGE: &str = "not a valid audio file";

// =============================================================================
// Tool I/O
// =============================================================================

/// Kind of an uploaded file, as classified by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Document,
    Audio,
    Video,
    Custom,
}

/// A file handed to the tool, already downloaded.
#[derive(Debug, Clone)]
pub struct ToolFile {
    pub file_type: FileType,
    pub filename: Option<String>,
    pub content: Bytes,
}

impl ToolFile {
    pub fn audio(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_type: FileType::Audio,
            filename: Some(filename.into()),
            content: content.into(),
        }
    }

    /// Payload encoding implied by the file name; MP3 when unknown.
    pub fn encoding(&self) -> AudioEncoding {
        self.filename
            .as_deref()
            .map(AudioEncoding::from_filename)
            .unwrap_or_default()
    }
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolMessage {
    pub text: String,
    pub error: Option<IatError>,
}

impl ToolMessage {
    pub fn failed(text: impl Into<String>, error: IatError) -> Self {
        Self {
            text: text.into(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// A parameter the tool accepts.
#[derive(Debug, Clone, Serialize)]
pub struct ToolParameter {
    pub name: String,
    pub label: String,
    pub file_type: FileType,
    pub required: bool,
}

/// Tool description for discovery and documentation
#[derive(Debug, Clone, Serialize)]
pub struct ToolMetadata {
    /// Tool identifier
    pub name: String,

    /// Display name
    pub display_name: String,

    /// Brief description
    pub description: String,

    /// Version string
    pub version: String,

    /// Invocation parameters
    pub parameters: Vec<ToolParameter>,

    /// Credential keys the provider requires
    pub credential_keys: Vec<String>,
}

// =============================================================================
// AsrTool
// =============================================================================

/// Speech-to-text tool backed by the IAT streaming API.
#[derive(Debug, Clone, Default)]
pub struct AsrTool {
    config: ToolConfig,
}

impl AsrTool {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn metadata() -> ToolMetadata {
        ToolMetadata {
            name: TOOL_NAME.to_string(),
            display_name: "Speech to Text (iFlytek IAT)".to_string(),
            description: "Transcribes an uploaded audio file with the iFlytek streaming dictation API"
                .to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            parameters: vec![ToolParameter {
                name: PARAM_AUDIO_FILE.to_string(),
                label: "Audio File".to_string(),
                file_type: FileType::Audio,
                required: true,
            }],
            credential_keys: vec![
                CREDENTIAL_APP_ID.to_string(),
                CREDENTIAL_API_KEY.to_string(),
                CREDENTIAL_API_SECRET.to_string(),
            ],
        }
    }

    /// Extract credentials from a host credential map.
    pub fn credentials_from_map(map: &HashMap<String, String>) -> IatResult<IatCredentials> {
        let missing = [CREDENTIAL_APP_ID, CREDENTIAL_API_KEY, CREDENTIAL_API_SECRET]
            .into_iter()
            .filter(|key| map.get(*key).is_none_or(|value| value.trim().is_empty()))
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(IatError::Configuration(format!(
                "Missing credentials: {}",
                missing.join(", ")
            )));
        }

        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        Ok(IatCredentials::new(
            get(CREDENTIAL_APP_ID),
            get(CREDENTIAL_API_KEY),
            get(CREDENTIAL_API_SECRET),
        ))
    }

    /// Provider-level check that all three credentials are present.
    pub fn validate_credentials(map: &HashMap<String, String>) -> IatResult<()> {
        Self::credentials_from_map(map)?.validate()
    }

    /// Transcribe `file` with credentials from `credentials`.
    ///
    /// An empty credential map falls back to the configured credentials.
    pub async fn invoke(
        &self,
        credentials: &HashMap<String, String>,
        file: Option<&ToolFile>,
    ) -> ToolMessage {
        if let Err(message) = check_file(file) {
            return message;
        }

        let credentials = match (credentials.is_empty(), &self.config.credentials) {
            (true, Some(configured)) => Ok(configured.clone()),
            _ => Self::credentials_from_map(credentials),
        };

        let client = match credentials.and_then(|c| IatClient::new(c, self.config.iat.clone())) {
            Ok(client) => client,
            Err(e) => {
                warn!("ASR tool is not configured: {}", e);
                return ToolMessage::failed("", e);
            }
        };

        self.invoke_with(&client, file).await
    }

    /// Transcribe `file` with any recognizer.
    pub async fn invoke_with(
        &self,
        recognizer: &dyn SpeechRecognizer,
        file: Option<&ToolFile>,
    ) -> ToolMessage {
        let file = match check_file(file) {
            Ok(file) => file,
            Err(message) => return message,
        };

        let encoding = file.encoding();
        info!(
            "Transcribing {} ({} bytes, encoding {})",
            file.filename.as_deref().unwrap_or("<unnamed>"),
            file.content.len(),
            encoding.as_str()
        );

        let recognition = AssertUnwindSafe(recognizer.recognize_audio(file.content.clone(), encoding))
            .catch_unwind()
            .await;

        match recognition {
            Ok(Ok(outcome)) => {
                if let Some(e) = &outcome.error {
                    warn!("ASR finished with error, returning partial text: {}", e);
                }
                ToolMessage {
                    text: outcome.text,
                    error: outcome.error,
                }
            }
            Ok(Err(e)) => {
                warn!("ASR failed: {}", e);
                ToolMessage::failed("", e)
            }
            Err(_) => {
                warn!("ASR recognizer panicked");
                ToolMessage::failed("", IatError::Internal("recognizer panicked".to_string()))
            }
        }
    }
}

/// Reject anything that is not a non-empty audio file before connecting.
fn check_file(file: Option<&ToolFile>) -> Result<&ToolFile, ToolMessage> {
    match file {
        Some(file) if file.file_type == FileType::Audio => {
            if file.content.is_empty() {
                Err(ToolMessage::failed(
                    "",
                    IatError::InvalidInput("audio file is empty".to_string()),
                ))
            } else {
                Ok(file)
            }
        }
        Some(file) => Err(ToolMessage::failed(
            NOT_AUDIO_MESSAGE,
            IatError::InvalidInput(format!("expected an audio file, got {:?}", file.file_type)),
        )),
        None => Err(ToolMessage::failed(
            NOT_AUDIO_MESSAGE,
            IatError::InvalidInput(format!("missing parameter {PARAM_AUDIO_FILE}")),
        )),
    }
}
