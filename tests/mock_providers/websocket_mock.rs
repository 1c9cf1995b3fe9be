//! WebSocket Mock Server for the IAT dictation API

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// How the mock behaves once the client has sent its last frame.
#[derive(Debug, Clone, Default)]
pub struct IatMockScript {
    /// Messages sent after the LAST frame, in order
    pub replies: Vec<Value>,
    /// Send a close frame after the replies
    pub close_after_replies: bool,
    /// Refuse the WebSocket upgrade with 401
    pub reject_handshake: bool,
}

/// What the mock observed.
#[derive(Debug, Clone, Default)]
pub struct IatMockRecord {
    pub connections: u64,
    pub request_uri: Option<String>,
    pub statuses: Vec<u64>,
    pub audio: Vec<u8>,
    pub first_frame: Option<Value>,
    pub client_closed: bool,
}

impl IatMockRecord {
    /// Value of a query parameter of the handshake URI.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let uri = self.request_uri.as_deref()?;
        let query = uri.split_once('?')?.1;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn path(&self) -> Option<String> {
        let uri = self.request_uri.as_deref()?;
        Some(uri.split_once('?').map(|(p, _)| p).unwrap_or(uri).to_string())
    }
}

/// IAT Mock Server State
pub struct IatMockState {
    pub script: IatMockScript,
    pub record: Mutex<IatMockRecord>,
}

impl IatMockState {
    pub fn new(script: IatMockScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            record: Mutex::new(IatMockRecord::default()),
        })
    }

    /// Replies `words` as intermediate results and closes with a final one.
    pub fn transcribing(words: &[&str]) -> Arc<Self> {
        let mut replies: Vec<Value> = words.iter().map(|w| word_result(w, false)).collect();
        replies.push(word_result("", true));
        Self::new(IatMockScript {
            replies,
            ..Default::default()
        })
    }

    pub fn snapshot(&self) -> IatMockRecord {
        self.record.lock().unwrap().clone()
    }
}

/// A successful result message carrying one word.
pub fn word_result(word: &str, last: bool) -> Value {
    json!({
        "code": 0,
        "message": "success",
        "sid": "iat-mock-sid",
        "data": {
            "status": if last { 2 } else { 1 },
            "result": {
                "sn": 1,
                "ls": last,
                "ws": [{ "bg": 0, "cw": [{ "sc": 0, "w": word }] }]
            }
        }
    })
}

/// An error status message.
pub fn error_result(code: i64, message: &str) -> Value {
    json!({ "code": code, "message": message, "sid": "iat-mock-sid" })
}

/// Handle a single IAT WebSocket connection
async fn handle_iat_connection(
    stream: TcpStream,
    state: Arc<IatMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let callback_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let mut record = callback_state.record.lock().unwrap();
        record.connections += 1;
        record.request_uri = Some(request.uri().to_string());
        drop(record);

        if callback_state.script.reject_handshake {
            let mut rejection = ErrorResponse::new(Some("HMAC signature does not match".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(rejection);
        }
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(text.as_str())?;
                let status = frame["data"]["status"].as_u64().unwrap_or(u64::MAX);
                let audio = BASE64.decode(frame["data"]["audio"].as_str().unwrap_or_default())?;

                {
                    let mut record = state.record.lock().unwrap();
                    if record.first_frame.is_none() {
                        record.first_frame = Some(frame.clone());
                    }
                    record.statuses.push(status);
                    record.audio.extend_from_slice(&audio);
                }

                if status == 2 {
                    for reply in &state.script.replies {
                        write.send(Message::Text(reply.to_string().into())).await?;
                    }
                    if state.script.close_after_replies {
                        write.send(Message::Close(None)).await?;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                state.record.lock().unwrap().client_closed = true;
                break;
            }
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Err(e) => {
                eprintln!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Start the mock on an ephemeral port.
pub async fn spawn_iat_mock(state: Arc<IatMockState>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_iat_connection(stream, state).await {
                    eprintln!("IAT mock connection error: {}", e);
                }
            });
        }
    });

    (addr, handle)
}
