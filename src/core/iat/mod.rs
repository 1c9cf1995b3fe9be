//! iFlytek IAT (dictation) streaming speech recognition.
//!
//! This module drives one recognition session per call against the IAT
//! WebSocket API:
//!
//! - URL signing with HMAC-SHA256 over host, date and request line
//! - Audio framing into FIRST / CONTINUATION / LAST frames, paced at 40 ms
//! - Concurrent accumulation of recognized text from streamed results
//! - Partial results are kept when the connection drops or times out
//!
//! # Architecture
//!
//! - [`auth`]: Signed connection URL
//! - [`config`]: Credentials, endpoint, business parameters and session tuning
//! - [`framing`]: The frame sequencer (feeder state machine)
//! - [`messages`]: Wire types for outgoing frames and incoming results
//! - [`client`]: [`IatClient`] and the two-task session driver
//!
//! # Example
//!
//! ```rust,no_run
//! use andleoht_asr::core::iat::{IatClient, IatConfig, IatCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = IatClient::new(
//!         IatCredentials::new("app-id", "api-key", "api-secret"),
//!         IatConfig::default(),
//!     )?;
//!
//!     let file = tokio::fs::File::open("speech.mp3").await?;
//!     let outcome = client.recognize(file).await?;
//!
//!     match &outcome.error {
//!         None => println!("Recognized: {}", outcome.text),
//!         Some(e) => println!("Partial result '{}' ({e})", outcome.text),
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
mod client;
pub mod config;
pub mod framing;
pub mod messages;


pub use auth::{build_signed_url, build_signed_url_now, rfc1123_date};
pub use client::{
    IatClient, RecognitionOutcome, ServerError, SpeechRecognizer, run_session,
};
pub use config::{
    AudioEncoding, BusinessArgs, IAT_HOST, IAT_PATH, IAT_URL, IatConfig, IatCredentials,
    IatEndpoint,
};
pub use framing::{AudioFrame, FramePosition, FrameSequencer};
pub use messages::{FrameEncoder, IatResponse};
