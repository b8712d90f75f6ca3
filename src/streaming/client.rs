//! AssemblyAI streaming WebSocket client
//!
//! Manages the WebSocket connection lifecycle for real-time transcription.
//!
//! # Connection Flow
//!
//! 1. `StreamingClient::connect()` - Open WebSocket, wait for `Begin`
//! 2. `send_audio()` - Stream PCM frames as binary messages (non-blocking)
//! 3. Events arrive on the channel returned by `connect()`
//! 4. `end_stream()` + `close()` - Clean shutdown
//!
//! # Failure Strategy
//!
//! There is no retry and no reconnection: a connect failure or mid-stream
//! drop is terminal for that recording attempt. The session controller
//! falls back to batch transcription (once per session).

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use super::protocol::{connect_url, pcm_frame_bytes, ClientMessage, ServerMessage, TranscriptEvent};
use super::StreamingError;
use crate::api::ApiClient;

/// Timeout for the WebSocket transport handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the `Begin` acknowledgment; connect() rejects when it lapses
const BEGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime requested for short-lived streaming tokens (seconds)
const TOKEN_EXPIRES_IN_SECS: u32 = 300;

/// Events surfaced to the session controller from the receiver task.
///
/// Every server message is dispatched through one handler into this tagged
/// union; callers never see raw socket frames.
#[derive(Debug, Clone)]
pub enum StreamingEvent {
    /// Interim or final transcript for the current turn
    Transcript(TranscriptEvent),
    /// Service-reported error; the connection is not retried
    Error(String),
    /// Stream ended (server termination or socket close)
    Closed,
}

/// Resolve the auth token for a streaming connection.
///
/// Prefers a short-lived token minted by the backend side-channel; falls
/// back to the long-lived API key when the side-channel is unavailable.
pub async fn resolve_stream_token(
    api: &ApiClient,
    api_key: Option<&str>,
) -> Result<String, StreamingError> {
    match api.assemblyai_token(TOKEN_EXPIRES_IN_SECS).await {
        Ok(token) => {
            log::info!("Streaming: obtained temporary token from backend");
            Ok(token)
        }
        Err(e) => {
            log::warn!(
                "Streaming: temporary token unavailable ({}), falling back to API key",
                e
            );
            api_key
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
                .ok_or(StreamingError::MissingCredentials)
        }
    }
}

/// Handle to an active streaming transcription session.
///
/// Owns the socket write half; incoming messages are processed by a
/// background task and surfaced on the event channel returned by
/// [`StreamingClient::connect`]. Lifetime is bounded by one recording
/// interval: created on connect, destroyed on `close()` or socket error.
pub struct StreamingClient {
    write: futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    /// Provider-assigned session id from the Begin message
    session_id: String,
    /// Unix timestamp after which the provider expires the session
    expires_at: Option<f64>,
    /// Cleared by the receiver task on termination/close; send_audio checks it
    open: Arc<AtomicBool>,
    receiver_task: tokio::task::JoinHandle<()>,
}

impl StreamingClient {
    /// Connect to the streaming service and wait for the session to begin.
    ///
    /// Resolves only after the `Begin` acknowledgment arrives; a bare
    /// socket-open is not enough. Rejects after [`BEGIN_TIMEOUT`] if no
    /// acknowledgment arrives, and on handshake rejection or transport
    /// errors. No retries.
    pub async fn connect(
        token: &str,
        sample_rate: u32,
    ) -> Result<(Self, mpsc::Receiver<StreamingEvent>), StreamingError> {
        if token.is_empty() {
            return Err(StreamingError::MissingCredentials);
        }

        let url = connect_url(sample_rate, token);
        log::info!(
            "Streaming: connecting (sample_rate={}, encoding=pcm_s16le)...",
            sample_rate
        );

        let (ws_stream, _response) = timeout(CONNECTION_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| StreamingError::ConnectionFailed("connection timeout".to_string()))?
            .map_err(|e| StreamingError::ConnectionFailed(e.to_string()))?;

        log::info!("Streaming: socket open, waiting for Begin...");

        let (write, mut read) = ws_stream.split();

        // Wait for the Begin acknowledgment before resolving
        let (session_id, expires_at) = timeout(BEGIN_TIMEOUT, async {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Begin { id, expires_at }) => {
                            log::info!("Streaming: session began: {}", id);
                            return Ok((id, expires_at));
                        }
                        Ok(ServerMessage::Error { error }) => {
                            return Err(StreamingError::HandshakeRejected(error));
                        }
                        Ok(_) => {
                            log::debug!("Streaming: ignoring message while waiting for Begin");
                        }
                        Err(e) => {
                            log::warn!("Streaming: failed to parse message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        return Err(StreamingError::Disconnected(
                            "connection closed before session began".to_string(),
                        ));
                    }
                    Err(e) => {
                        return Err(StreamingError::ProtocolError(e.to_string()));
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            Err(StreamingError::Disconnected("stream ended".to_string()))
        })
        .await
        .map_err(|_| {
            StreamingError::ConnectionFailed("timed out waiting for session Begin".to_string())
        })??;

        let open = Arc::new(AtomicBool::new(true));
        let (events_tx, events_rx) = mpsc::channel(100);

        let task_open = open.clone();
        let receiver_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if !dispatch_message(msg, &events_tx, &task_open).await {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("Streaming: failed to parse message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Streaming: socket closed by server");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Streaming: socket error: {}", e);
                        let _ = events_tx.send(StreamingEvent::Error(e.to_string())).await;
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            task_open.store(false, Ordering::SeqCst);
            let _ = events_tx.send(StreamingEvent::Closed).await;
            log::debug!("Streaming: receiver task exiting");
        });

        Ok((
            Self {
                write,
                session_id,
                expires_at,
                open,
                receiver_task,
            },
            events_rx,
        ))
    }

    /// Send a PCM frame as a binary message.
    ///
    /// Samples are serialized as signed 16-bit little-endian. When the
    /// socket is no longer open this is a silent no-op: stop/teardown races
    /// routinely leave a few frames in flight and they carry no value.
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<(), StreamingError> {
        if !self.is_connected() {
            log::debug!("Streaming: dropping {}-sample frame, socket not open", samples.len());
            return Ok(());
        }

        let bytes = pcm_frame_bytes(samples);
        match self.write.send(Message::Binary(bytes)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.open.store(false, Ordering::SeqCst);
                Err(StreamingError::SendFailed(e.to_string()))
            }
        }
    }

    /// Send the Terminate control message. Does not wait for acknowledgment.
    pub async fn end_stream(&mut self) {
        if !self.is_connected() {
            return;
        }
        let json = match serde_json::to_string(&ClientMessage::Terminate) {
            Ok(j) => j,
            Err(e) => {
                log::warn!("Streaming: failed to serialize Terminate: {}", e);
                return;
            }
        };
        if let Err(e) = self.write.send(Message::Text(json)).await {
            log::warn!("Streaming: failed to send Terminate: {}", e);
            self.open.store(false, Ordering::SeqCst);
        }
    }

    /// Close the socket unconditionally and clear session state. Idempotent.
    pub async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            log::info!("Streaming: closing session {}", self.session_id);
        }
        if let Err(e) = self.write.close().await {
            log::debug!("Streaming: error closing socket: {}", e);
        }
        self.receiver_task.abort();
    }

    /// Pure state query: is the socket still usable for sending?
    pub fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Provider-assigned session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session expiry as a Unix timestamp, when the provider reported one
    pub fn expires_at(&self) -> Option<f64> {
        self.expires_at
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        // Ensure the receiver task dies if close() was never called
        self.receiver_task.abort();
    }
}

/// Dispatch one parsed server message onto the event channel.
///
/// Returns false when the receive loop should stop (termination or a
/// dropped consumer).
async fn dispatch_message(
    msg: ServerMessage,
    events_tx: &mpsc::Sender<StreamingEvent>,
    open: &Arc<AtomicBool>,
) -> bool {
    match msg {
        ServerMessage::Turn { .. } => {
            // transcript_event() is Some for every Turn
            if let Some(event) = msg.transcript_event() {
                if events_tx.send(StreamingEvent::Transcript(event)).await.is_err() {
                    log::debug!("Streaming: event consumer dropped");
                    return false;
                }
            }
            true
        }
        ServerMessage::Termination {
            audio_duration_seconds,
        } => {
            log::info!(
                "Streaming: session terminated (audio duration: {:?}s)",
                audio_duration_seconds
            );
            open.store(false, Ordering::SeqCst);
            false
        }
        ServerMessage::Error { error } => {
            log::warn!("Streaming: service error: {}", error);
            let _ = events_tx.send(StreamingEvent::Error(error)).await;
            true
        }
        ServerMessage::Begin { id, .. } => {
            log::debug!("Streaming: unexpected Begin after session start: {}", id);
            true
        }
        ServerMessage::Unknown => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;

    #[tokio::test]
    async fn test_dispatch_turn_yields_transcript_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let open = Arc::new(AtomicBool::new(true));

        let keep_going = dispatch_message(
            ServerMessage::Turn {
                transcript: "hello".to_string(),
                end_of_turn: false,
                confidence: None,
            },
            &tx,
            &open,
        )
        .await;

        assert!(keep_going);
        match rx.try_recv().unwrap() {
            StreamingEvent::Transcript(event) => {
                assert_eq!(event.text, "hello");
                assert!(!event.is_final);
            }
            other => panic!("Expected Transcript, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_termination_closes_session() {
        let (tx, _rx) = mpsc::channel(4);
        let open = Arc::new(AtomicBool::new(true));

        let keep_going = dispatch_message(
            ServerMessage::Termination {
                audio_duration_seconds: Some(3.0),
            },
            &tx,
            &open,
        )
        .await;

        assert!(!keep_going);
        assert!(!open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispatch_error_surfaces_without_closing() {
        let (tx, mut rx) = mpsc::channel(4);
        let open = Arc::new(AtomicBool::new(true));

        let keep_going = dispatch_message(
            ServerMessage::Error {
                error: "bad token".to_string(),
            },
            &tx,
            &open,
        )
        .await;

        assert!(keep_going);
        assert!(open.load(Ordering::SeqCst));
        assert!(matches!(
            rx.try_recv().unwrap(),
            StreamingEvent::Error(e) if e == "bad token"
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_token() {
        let result = StreamingClient::connect("", 16_000).await;
        assert!(matches!(result, Err(StreamingError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_resolve_token_falls_back_to_api_key() {
        // Backend at an unroutable address: the side-channel fails fast and
        // the long-lived key is used instead.
        let api = ApiClient::new("http://127.0.0.1:1/api");
        let token = resolve_stream_token(&api, Some("long-lived-key")).await;
        assert_eq!(token.unwrap(), "long-lived-key");
    }

    #[tokio::test]
    async fn test_resolve_token_without_any_credential_fails() {
        let api = ApiClient::new("http://127.0.0.1:1/api");
        let result = resolve_stream_token(&api, None).await;
        assert!(matches!(result, Err(StreamingError::MissingCredentials)));
    }

    #[tokio::test]
    #[ignore] // Requires a valid ASSEMBLYAI_API_KEY and network access
    async fn test_live_connection() {
        let key = std::env::var("ASSEMBLYAI_API_KEY").expect("ASSEMBLYAI_API_KEY required");

        let (mut client, _events) = StreamingClient::connect(&key, 16_000)
            .await
            .expect("connection failed");
        assert!(client.is_connected());
        assert!(!client.session_id().is_empty());

        // 100ms of silence
        client.send_audio(&vec![0i16; 1600]).await.expect("send failed");

        client.end_stream().await;
        client.close().await;
        assert!(!client.is_connected());
    }
}
