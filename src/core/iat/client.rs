//! IAT WebSocket session driver.
//!
//! A session runs two tasks over one connection:
//!
//! ```text
//!                  ┌───────────────┐  frames (status 0/1/2)   ┌──────────┐
//!  audio source ──▶│  feeder task  │─────────────────────────▶│          │
//!                  └───────┬───────┘                          │  server  │
//!                          │ shutdown (CancellationToken)     │          │
//!                  ┌───────▼───────┐  results / errors        │          │
//!  transcript  ◀───│ receiver task │◀─────────────────────────│          │
//!                  └───────────────┘                          └──────────┘
//! ```
//!
//! The feeder owns the outbound half and is the only place it is closed. The
//! receiver owns the inbound half and the transcript. Either task cancels the
//! shared token when the session is over; the caller joins both and only then
//! reads the transcript. Once the outbound half is closed the receiver waits at
//! most `close_timeout` for the server to finish.
//!
//! Both tasks are aborted and the token cancelled if the caller drops the
//! session future, so the connection never outlives [`run_session`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio::task::JoinError;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use super::auth::{build_signed_url_now, redact_query};
use super::config::{AudioEncoding, IatConfig, IatCredentials};
use super::framing::{FramePosition, FrameSequencer};
use super::messages::{FrameEncoder, IatResponse};
use crate::errors::{IatError, IatResult};

// =============================================================================
// Session Results
// =============================================================================

/// A non-zero status reported by the server during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: i64,
    pub message: String,
    pub sid: Option<String>,
}

/// Result of one recognition session.
///
/// `text` holds whatever was recognized, even when `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionOutcome {
    pub text: String,
    pub sid: Option<String>,
    pub frames_sent: usize,
    pub server_errors: Vec<ServerError>,
    pub error: Option<IatError>,
}

impl RecognitionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// State owned by the receiver task.
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    pub(crate) text: String,
    pub(crate) sid: Option<String>,
    pub(crate) server_errors: Vec<ServerError>,
    pub(crate) completed: bool,
    pub(crate) error: Option<IatError>,
}

impl Transcript {
    /// Apply one inbound message. Returns `false` once the session is over.
    pub(crate) fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Text(text) => {
                debug!("Received IAT message: {}", text.as_str());

                match IatResponse::parse(text.as_str()) {
                    Ok(response) => {
                        if let Some(sid) = &response.sid
                            && self.sid.is_none()
                        {
                            info!("IAT session id: {}", sid);
                            self.sid = Some(sid.clone());
                        }

                        if response.is_error() {
                            let message = response.message.clone().unwrap_or_default();
                            error!(
                                "sid:{} call error:{} code is:{}",
                                response.sid.as_deref().unwrap_or("-"),
                                message,
                                response.code
                            );
                            self.server_errors.push(ServerError {
                                code: response.code,
                                message,
                                sid: response.sid,
                            });
                            return true;
                        }

                        self.text.push_str(&response.text());

                        if response.is_final() {
                            info!("IAT final result received");
                            self.completed = true;
                            return false;
                        }
                    }
                    Err(e) => {
                        warn!("Received IAT message, but failed to parse it: {}", e);
                    }
                }
            }

            Message::Close(close_frame) => {
                info!("IAT WebSocket closed: {:?}", close_frame);
                return false;
            }

            Message::Ping(_) => {
                debug!("Received ping from IAT server");
            }

            Message::Pong(_) => {
                debug!("Received pong from IAT server");
            }

            Message::Binary(data) => {
                debug!(
                    "Ignoring unexpected binary message ({} bytes) from IAT server",
                    data.len()
                );
            }

            _ => {
                debug!("Received unexpected message type");
            }
        }

        true
    }
}

/// What the feeder task reports back.
#[derive(Debug, Default)]
pub(crate) struct FeedReport {
    pub(crate) frames_sent: usize,
    pub(crate) error: Option<IatError>,
}

// =============================================================================
// Feeder Task
// =============================================================================

/// Frame pacing of the feeder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pacing {
    pub(crate) frame_interval: Duration,
    pub(crate) settle_delay: Duration,
    pub(crate) close_timeout: Duration,
}

/// Send frames until LAST, then close the outbound half exactly once.
pub(crate) async fn feed_audio<K, R>(
    mut sink: K,
    mut frames: FrameSequencer<R>,
    encoder: FrameEncoder,
    pacing: Pacing,
    shutdown: CancellationToken,
    outbound_closed: CancellationToken,
) -> FeedReport
where
    K: Sink<Message, Error = WsError> + Unpin,
    R: AsyncRead + Unpin,
{
    let mut report = FeedReport::default();

    let outcome = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!("IAT feeder stopped: session is shutting down");
            Ok(())
        }
        result = send_frames(&mut sink, &mut frames, &encoder, pacing, &mut report.frames_sent) => result,
    };

    if let Err(e) = &outcome {
        error!("IAT feeder failed: {}", e);
    }

    match timeout(pacing.close_timeout, sink.close()).await {
        Ok(Ok(())) => debug!("IAT outbound stream closed"),
        Ok(Err(e)) => debug!("IAT outbound stream closed with error: {}", e),
        Err(_) => warn!("Timed out closing IAT outbound stream"),
    }
    outbound_closed.cancel();

    if let Err(e) = outcome {
        report.error = Some(e);
        shutdown.cancel();
    }

    report
}

async fn send_frames<K, R>(
    sink: &mut K,
    frames: &mut FrameSequencer<R>,
    encoder: &FrameEncoder,
    pacing: Pacing,
    frames_sent: &mut usize,
) -> IatResult<()>
where
    K: Sink<Message, Error = WsError> + Unpin,
    R: AsyncRead + Unpin,
{
    while let Some(frame) = frames
        .next_frame()
        .await
        .map_err(|e| IatError::AudioRead(e.to_string()))?
    {
        let json = encoder
            .encode(&frame)
            .map_err(|e| IatError::Internal(format!("Failed to encode frame: {e}")))?;

        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| IatError::Network(format!("Failed to send audio frame: {e}")))?;

        *frames_sent += 1;
        debug!(
            "Sent IAT frame status={} ({} bytes of audio)",
            frame.position.status(),
            frame.payload.len()
        );

        if frame.position == FramePosition::Last {
            sleep(pacing.settle_delay).await;
            break;
        }
        sleep(pacing.frame_interval).await;
    }

    Ok(())
}

// =============================================================================
// Receiver Task
// =============================================================================

/// Consume inbound messages until the session is over.
///
/// After `outbound_closed` fires, trailing messages are read for at most
/// `close_timeout`.
pub(crate) async fn receive_results<T>(
    mut stream: T,
    shutdown: CancellationToken,
    outbound_closed: CancellationToken,
    close_timeout: Duration,
) -> Transcript
where
    T: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut transcript = Transcript::default();
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("IAT receiver stopped: session is shutting down");
                break;
            }
            _ = outbound_closed.cancelled(), if drain_deadline.is_none() => {
                drain_deadline = Some(Instant::now() + close_timeout);
                continue;
            }
            _ = sleep_until_deadline(drain_deadline) => {
                warn!(
                    "IAT server did not finish within {:?} of the outbound close",
                    close_timeout
                );
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                if !transcript.handle_message(message) {
                    break;
                }
            }
            Some(Err(e)) => {
                let err = IatError::Network(format!("WebSocket error: {e}"));
                error!("{}", err);
                transcript.error = Some(err);
                break;
            }
            None => {
                info!("IAT WebSocket stream ended");
                break;
            }
        }
    }

    shutdown.cancel();
    transcript
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Session
// =============================================================================

/// Await a session task; a task that dies before reaching its own cancel
/// still ends the session.
async fn watch_task<T>(
    handle: AbortOnDropHandle<T>,
    shutdown: CancellationToken,
) -> Result<T, JoinError> {
    let result = handle.await;
    if result.is_err() {
        shutdown.cancel();
    }
    result
}

/// Run one session over an already established transport.
///
/// Never fails: transport problems, timeouts and task panics end up in
/// [`RecognitionOutcome::error`] next to the text received so far.
pub async fn run_session<S, R>(
    transport: S,
    audio: R,
    app_id: &str,
    config: &IatConfig,
) -> RecognitionOutcome
where
    S: Sink<Message, Error = WsError> + Stream<Item = Result<Message, WsError>> + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let (sink, stream) = transport.split();
    let shutdown = CancellationToken::new();
    let outbound_closed = CancellationToken::new();
    // Dropping this future mid-session ends both tasks.
    let _shutdown_on_drop = shutdown.clone().drop_guard();

    let encoder = FrameEncoder {
        app_id: app_id.to_string(),
        business: config.business.clone(),
        format: config.audio_format.clone(),
        encoding: config.encoding.as_str().to_string(),
    };
    let pacing = Pacing {
        frame_interval: config.frame_interval,
        settle_delay: config.settle_delay,
        close_timeout: config.close_timeout,
    };
    let frames = FrameSequencer::new(audio, config.frame_size);

    let feeder = AbortOnDropHandle::new(tokio::spawn(feed_audio(
        sink,
        frames,
        encoder,
        pacing,
        shutdown.clone(),
        outbound_closed.clone(),
    )));
    let receiver = AbortOnDropHandle::new(tokio::spawn(receive_results(
        stream,
        shutdown.clone(),
        outbound_closed,
        config.close_timeout,
    )));

    let joined = async {
        tokio::join!(
            watch_task(feeder, shutdown.clone()),
            watch_task(receiver, shutdown.clone())
        )
    };
    tokio::pin!(joined);

    let mut timed_out = false;
    let joined_in_time = timeout(config.session_timeout, &mut joined).await;
    let (feed_result, receive_result) = match joined_in_time {
        Ok(results) => results,
        Err(_) => {
            warn!(
                "IAT session exceeded {:?}, shutting it down",
                config.session_timeout
            );
            timed_out = true;
            shutdown.cancel();
            joined.await
        }
    };

    let mut outcome = RecognitionOutcome::default();
    let mut errors = Vec::new();

    if timed_out {
        errors.push(IatError::Timeout(format!(
            "no session end within {:?}",
            config.session_timeout
        )));
    }

    match receive_result {
        Ok(transcript) => {
            outcome.text = transcript.text;
            outcome.sid = transcript.sid;
            outcome.server_errors = transcript.server_errors;
            if !transcript.completed {
                debug!("IAT session ended without a final result");
            }
            errors.extend(transcript.error);
        }
        Err(e) => {
            error!("IAT receiver task failed: {}", e);
            errors.push(IatError::Internal(format!("Receiver task failed: {e}")));
        }
    }

    match feed_result {
        Ok(report) => {
            outcome.frames_sent = report.frames_sent;
            errors.extend(report.error);
        }
        Err(e) => {
            error!("IAT feeder task failed: {}", e);
            errors.push(IatError::Internal(format!("Feeder task failed: {e}")));
        }
    }

    // Internal faults outrank everything else; otherwise the first failure wins.
    let internal = errors
        .iter()
        .position(|e| matches!(e, IatError::Internal(_)));
    outcome.error = match internal {
        Some(i) => Some(errors.swap_remove(i)),
        None => errors.into_iter().next(),
    };

    info!(
        "IAT session finished: {} frames sent, {} chars recognized{}",
        outcome.frames_sent,
        outcome.text.chars().count(),
        outcome
            .error
            .as_ref()
            .map(|e| format!(", error: {e}"))
            .unwrap_or_default()
    );

    outcome
}

// =============================================================================
// IatClient
// =============================================================================

/// Install the process-wide rustls crypto provider once.
fn ensure_crypto_provider() {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Client for the IAT streaming API.
///
/// One client can run any number of sessions; each call to
/// [`recognize`](Self::recognize) signs a fresh URL and opens its own connection.
///
/// # Example
///
/// ```rust,no_run
/// use andleoht_asr::{IatClient, IatConfig, IatCredentials};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let credentials = IatCredentials::new("app-id", "api-key", "api-secret");
///     let client = IatClient::new(credentials, IatConfig::default())?;
///
///     let audio = std::fs::read("speech.mp3")?;
///     let outcome = client.recognize_bytes(audio.into()).await?;
///     println!("{}", outcome.text);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct IatClient {
    credentials: IatCredentials,
    config: IatConfig,
}

impl IatClient {
    pub fn new(credentials: IatCredentials, config: IatConfig) -> IatResult<Self> {
        credentials.validate()?;
        config.validate()?;
        Ok(Self {
            credentials,
            config,
        })
    }

    pub fn config(&self) -> &IatConfig {
        &self.config
    }

    /// Signed connection URL for the current time.
    pub fn signed_url(&self) -> IatResult<String> {
        build_signed_url_now(
            &self.config.endpoint,
            &self.credentials.api_key,
            &self.credentials.api_secret,
        )
    }

    /// Recognize an in-memory clip. Empty audio is rejected before connecting.
    pub async fn recognize_bytes(&self, audio: Bytes) -> IatResult<RecognitionOutcome> {
        if audio.is_empty() {
            return Err(IatError::InvalidInput("audio is empty".to_string()));
        }
        self.recognize(std::io::Cursor::new(audio)).await
    }

    /// Recognize everything `audio` yields.
    ///
    /// Returns `Err` only if the session could not be opened.
    pub async fn recognize<R>(&self, audio: R) -> IatResult<RecognitionOutcome>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let url = self.signed_url()?;
        let endpoint = redact_query(&url).to_string();

        ensure_crypto_provider();
        info!("Connecting to IAT endpoint {}", endpoint);

        let (ws_stream, _response) = match timeout(self.config.connect_timeout, connect_async(url))
            .await
        {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                let err = IatError::ConnectionFailed(format!("Failed to connect to {endpoint}: {e}"));
                error!("{}", err);
                return Err(err);
            }
            Err(_) => {
                let err = IatError::ConnectionFailed(format!(
                    "Timed out connecting to {endpoint} after {:?}",
                    self.config.connect_timeout
                ));
                error!("{}", err);
                return Err(err);
            }
        };

        info!("Connected to IAT WebSocket");

        Ok(run_session(ws_stream, audio, &self.credentials.app_id, &self.config).await)
    }
}

/// Anything that can turn an audio clip into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize_audio(
        &self,
        audio: Bytes,
        encoding: AudioEncoding,
    ) -> IatResult<RecognitionOutcome>;
}

#[async_trait]
impl SpeechRecognizer for IatClient {
    async fn recognize_audio(
        &self,
        audio: Bytes,
        encoding: AudioEncoding,
    ) -> IatResult<RecognitionOutcome> {
        if encoding == self.config.encoding {
            return self.recognize_bytes(audio).await;
        }
        let client = IatClient {
            credentials: self.credentials.clone(),
            config: self.config.clone().with_encoding(encoding),
        };
        client.recognize_bytes(audio).await
    }
}
