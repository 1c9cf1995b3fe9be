//! WebSocket message types for the IAT streaming API.
//!
//! - **Outgoing**: one JSON text message per audio frame ([`FrameRequest`]).
//!   The first frame also carries `common` and `business`.
//! - **Incoming**: JSON envelopes ([`IatResponse`]) carrying a status `code`,
//!   the session id and, on success, word groups to append to the transcript.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::config::BusinessArgs;
use super::framing::{AudioFrame, FramePosition};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Application identification, first frame only.
#[derive(Debug, Clone, Serialize)]
pub struct CommonArgs<'a> {
    pub app_id: &'a str,
}

/// Audio payload of a frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameData<'a> {
    /// 0 = first, 1 = continuation, 2 = last
    pub status: u8,
    pub format: &'a str,
    /// Base64 encoded audio bytes
    pub audio: String,
    pub encoding: &'a str,
}

/// One outbound frame message.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common: Option<CommonArgs<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<&'a BusinessArgs>,
    pub data: FrameData<'a>,
}

/// Turns [`AudioFrame`]s into JSON text for the wire.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    pub app_id: String,
    pub business: BusinessArgs,
    pub format: String,
    pub encoding: String,
}

impl FrameEncoder {
    pub fn request<'a>(&'a self, frame: &AudioFrame) -> FrameRequest<'a> {
        let first = frame.position == FramePosition::First;
        FrameRequest {
            common: first.then(|| CommonArgs {
                app_id: &self.app_id,
            }),
            business: first.then_some(&self.business),
            data: FrameData {
                status: frame.position.status(),
                format: &self.format,
                audio: BASE64.encode(&frame.payload),
                encoding: &self.encoding,
            },
        }
    }

    pub fn encode(&self, frame: &AudioFrame) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.request(frame))
    }
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// One candidate word.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateWord {
    #[serde(default)]
    pub w: String,
}

/// A word group (`ws` entry); each group lists its candidate words.
#[derive(Debug, Clone, Deserialize)]
pub struct WordGroup {
    /// Start offset of the group in the audio, in 10 ms units
    #[serde(default)]
    pub bg: Option<u64>,
    #[serde(default)]
    pub cw: Vec<CandidateWord>,
}

/// Recognition result of one message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognitionResult {
    /// Sentence number
    #[serde(default)]
    pub sn: Option<u32>,
    /// Whether this is the last sentence of the session
    #[serde(default)]
    pub ls: bool,
    #[serde(default)]
    pub ws: Vec<WordGroup>,
}

impl RecognitionResult {
    /// All word fragments, concatenated in arrival order.
    pub fn text(&self) -> String {
        self.ws
            .iter()
            .flat_map(|group| group.cw.iter())
            .map(|word| word.w.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseData {
    /// 2 once the server has produced its final result
    #[serde(default)]
    pub status: Option<u8>,
    #[serde(default)]
    pub result: Option<RecognitionResult>,
}

/// One inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct IatResponse {
    /// 0 on success, vendor error code otherwise
    pub code: i64,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<ResponseData>,
}

impl IatResponse {
    /// Parse a WebSocket text message.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.code != 0
    }

    /// Text carried by a successful message; empty for errors.
    pub fn text(&self) -> String {
        if self.is_error() {
            return String::new();
        }
        self.data
            .as_ref()
            .and_then(|data| data.result.as_ref())
            .map(RecognitionResult::text)
            .unwrap_or_default()
    }

    /// Whether the server marked this as its final result.
    pub fn is_final(&self) -> bool {
        !self.is_error()
            && self.data.as_ref().is_some_and(|data| {
                data.status == Some(FramePosition::Last.status())
                    || data.result.as_ref().is_some_and(|result| result.ls)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::Value;

    fn encoder() -> FrameEncoder {
        FrameEncoder {
            app_id: "app-1".to_string(),
            business: BusinessArgs::default(),
            format: "audio/L16;rate=16000".to_string(),
            encoding: "raw".to_string(),
        }
    }

    fn frame(position: FramePosition, payload: &'static [u8]) -> AudioFrame {
        AudioFrame {
            position,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_first_frame_carries_session_config() {
        let json = encoder()
            .encode(&frame(FramePosition::First, b"abc"))
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["common"]["app_id"], "app-1");
        assert_eq!(value["business"]["domain"], "iat");
        assert_eq!(value["business"]["language"], "zh_cn");
        assert_eq!(value["business"]["accent"], "mandarin");
        assert_eq!(value["business"]["vinfo"], 1);
        assert_eq!(value["business"]["vad_eos"], 10000);
        assert_eq!(value["data"]["status"], 0);
        assert_eq!(value["data"]["format"], "audio/L16;rate=16000");
        assert_eq!(value["data"]["encoding"], "raw");
        assert_eq!(value["data"]["audio"], "YWJj");
    }

    #[test]
    fn test_later_frames_omit_session_config() {
        for (position, status) in [(FramePosition::Continuation, 1), (FramePosition::Last, 2)] {
            let json = encoder().encode(&frame(position, b"")).unwrap();
            let value: Value = serde_json::from_str(&json).unwrap();

            assert!(value.get("common").is_none());
            assert!(value.get("business").is_none());
            assert_eq!(value["data"]["status"], status);
            assert_eq!(value["data"]["audio"], "");
        }
    }

    #[test]
    fn test_parse_success_message() {
        let json = r#"{
            "code": 0,
            "message": "success",
            "sid": "iat000704fa@dx16ade44e4d87a1c802",
            "data": {
                "status": 1,
                "result": {
                    "sn": 1,
                    "ls": false,
                    "bg": 0,
                    "ed": 0,
                    "ws": [
                        {"bg": 0, "cw": [{"sc": 0, "w": "今天"}]},
                        {"bg": 60, "cw": [{"sc": 0, "w": "天气"}]}
                    ]
                }
            }
        }"#;

        let msg = IatResponse::parse(json).unwrap();
        assert!(!msg.is_error());
        assert!(!msg.is_final());
        assert_eq!(msg.sid.as_deref(), Some("iat000704fa@dx16ade44e4d87a1c802"));
        assert_eq!(msg.text(), "今天天气");
    }

    #[test]
    fn test_parse_minimal_message() {
        let msg =
            IatResponse::parse(r#"{"code":0,"data":{"result":{"ws":[{"cw":[{"w":"你"}]}]}}}"#)
                .unwrap();
        assert_eq!(msg.text(), "你");
        assert!(msg.sid.is_none());
    }

    #[test]
    fn test_every_candidate_word_is_kept() {
        let msg = IatResponse::parse(
            r#"{"code":0,"data":{"result":{"ws":[{"cw":[{"w":"a"},{"w":"b"}]},{"cw":[]},{"cw":[{"w":"c"}]}]}}}"#,
        )
        .unwrap();
        assert_eq!(msg.text(), "abc");
    }

    #[test]
    fn test_parse_error_message() {
        let msg = IatResponse::parse(r#"{"code":10165,"message":"invalid handle","sid":"x"}"#)
            .unwrap();
        assert!(msg.is_error());
        assert!(!msg.is_final());
        assert_eq!(msg.message.as_deref(), Some("invalid handle"));
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_final_markers() {
        let by_status =
            IatResponse::parse(r#"{"code":0,"data":{"status":2,"result":{"ws":[]}}}"#).unwrap();
        assert!(by_status.is_final());

        let by_last_sentence =
            IatResponse::parse(r#"{"code":0,"data":{"status":1,"result":{"ls":true,"ws":[]}}}"#)
                .unwrap();
        assert!(by_last_sentence.is_final());
    }

    #[test]
    fn test_success_without_data_has_no_text() {
        let msg = IatResponse::parse(r#"{"code":0,"sid":"s"}"#).unwrap();
        assert_eq!(msg.text(), "");
        assert!(!msg.is_final());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(IatResponse::parse("not json").is_err());
        assert!(IatResponse::parse(r#"{"sid":"missing code"}"#).is_err());
    }
}
