//! Push-channel subscriber.
//!
//! Runs one background task that holds a Socket.IO connection, forwards
//! decoded [`PushEvent`]s to a single owner over an mpsc channel and keeps
//! the set of joined project rooms so it can rejoin them after a reconnect.
//! Reconnects use [`Backoff`]; once attempts are exhausted the task reports
//! [`PushNotice::Disconnected`] and exits.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use vansh_core::socketio::{self, EnginePacket, Frame, SocketPacket};
use vansh_core::{ClientMessage, PushEvent};

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::PushError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the push task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotice {
    Connected { sid: String },
    Event(PushEvent),
    /// A server acknowledgement of `start_transcription` / `stop_transcription`.
    Acknowledged {
        event: &'static str,
        error: Option<String>,
    },
    Reconnecting {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// Reconnect attempts are exhausted; the task has stopped.
    Disconnected { reason: String },
}

#[derive(Debug)]
enum Command {
    Join(String),
    Leave(String),
    Send(ClientMessage),
}

/// Cheap handle for steering the push task.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl PushHandle {
    /// Subscribe to a project's room. Remembered across reconnects.
    pub fn join(&self, project_id: &str) {
        let _ = self.tx.send(Command::Join(project_id.to_string()));
    }

    pub fn leave(&self, project_id: &str) {
        let _ = self.tx.send(Command::Leave(project_id.to_string()));
    }

    /// Send a message if connected; dropped while reconnecting.
    pub fn send(&self, message: ClientMessage) {
        let _ = self.tx.send(Command::Send(message));
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.cancel.is_cancelled()
    }
}

pub struct PushClient {
    url: String,
    token: Option<String>,
    backoff: Backoff,
    handshake_timeout: Duration,
}

impl PushClient {
    pub fn new(config: &Config, token: Option<String>) -> Self {
        Self {
            url: config.socket_url(),
            token,
            backoff: Backoff::new(
                config.backoff_base,
                config.backoff_cap,
                config.reconnect_attempts,
            ),
            handshake_timeout: config.request_timeout.min(Duration::from_secs(20)),
        }
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Start the background task. It stops when `cancel` fires, when every
    /// [`PushHandle`] is dropped, or when reconnects are exhausted.
    pub fn spawn(
        self,
        events: mpsc::UnboundedSender<PushNotice>,
        cancel: CancellationToken,
    ) -> (PushHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PushHandle {
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(self.run(rx, events, cancel));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<PushNotice>,
        cancel: CancellationToken,
    ) {
        let mut rooms = BTreeSet::new();

        loop {
            let reason = match self.connect_once(&mut commands, &mut rooms, &events, &cancel).await {
                Ok(Exit::Stopped) => break,
                Ok(Exit::Lost(reason)) => reason,
                Err(e) => e.to_string(),
            };

            let Some(delay) = self.backoff.next_delay() else {
                log::warn!("push channel giving up after {} attempts: {reason}", self.backoff.attempt());
                let _ = events.send(PushNotice::Disconnected { reason });
                break;
            };
            let attempt = self.backoff.attempt();
            log::info!(
                "push channel lost ({reason}), reconnect {attempt} in {:.1}s",
                delay.as_secs_f64()
            );
            let _ = events.send(PushNotice::Reconnecting {
                attempt,
                delay,
                reason,
            });

            if !wait_offline(delay, &mut commands, &mut rooms, &cancel).await {
                break;
            }
        }
        log::debug!("push task finished");
    }

    async fn connect_once(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        rooms: &mut BTreeSet<String>,
        events: &mpsc::UnboundedSender<PushNotice>,
        cancel: &CancellationToken,
    ) -> Result<Exit, PushError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                request.headers_mut().insert("authorization", value);
            }
        }

        let connect = tokio_tungstenite::connect_async(request);
        let (ws, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(Exit::Stopped),
            res = timeout(self.handshake_timeout, connect) => {
                res.map_err(|_| PushError::HandshakeTimeout)??
            }
        };
        let (sink, stream) = ws.split();
        let mut link = Link {
            sink,
            stream,
            next_ack: 0,
            pending_acks: HashMap::new(),
            pending_binary: 0,
        };

        let heartbeat = link.handshake(self.token.as_deref(), self.handshake_timeout, events).await?;
        self.backoff.reset();

        for room in rooms.iter() {
            link.send(&ClientMessage::JoinProject {
                project_id: room.clone(),
            })
            .await?;
        }

        let mut deadline = Instant::now() + heartbeat;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    link.close().await;
                    return Ok(Exit::Stopped);
                }
                _ = sleep_until(deadline) => {
                    return Err(PushError::HeartbeatTimeout(heartbeat));
                }
                cmd = commands.recv() => match cmd {
                    None => {
                        link.close().await;
                        return Ok(Exit::Stopped);
                    }
                    Some(Command::Join(id)) => {
                        if rooms.insert(id.clone()) {
                            link.send(&ClientMessage::JoinProject { project_id: id }).await?;
                        }
                    }
                    Some(Command::Leave(id)) => {
                        if rooms.remove(&id) {
                            link.send(&ClientMessage::LeaveProject { project_id: id }).await?;
                        }
                    }
                    Some(Command::Send(message)) => link.send(&message).await?,
                },
                frame = link.stream.next() => match frame {
                    None => return Ok(Exit::Lost("connection closed".into())),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => {
                        if link.on_text(&text, events).await? {
                            deadline = Instant::now() + heartbeat;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Attachments of server binary events carry nothing we project.
                        link.pending_binary = link.pending_binary.saturating_sub(1);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".into());
                        return Ok(Exit::Lost(reason));
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

enum Exit {
    /// Cancelled or abandoned by the owner.
    Stopped,
    Lost(String),
}

/// Sleep out a reconnect delay while keeping the room set current.
/// Returns `false` if the task should stop.
async fn wait_offline(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    rooms: &mut BTreeSet<String>,
    cancel: &CancellationToken,
) -> bool {
    let until = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep_until(until) => return true,
            cmd = commands.recv() => match cmd {
                None => return false,
                Some(Command::Join(id)) => {
                    rooms.insert(id);
                }
                Some(Command::Leave(id)) => {
                    rooms.remove(&id);
                }
                Some(Command::Send(message)) => {
                    log::warn!("push channel offline, dropping {}", message.event_name());
                }
            },
        }
    }
}

struct Link {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    next_ack: u64,
    pending_acks: HashMap<u64, &'static str>,
    pending_binary: usize,
}

impl Link {
    async fn next_text(&mut self) -> Result<String, PushError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(_))) | None => return Err(PushError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Engine.IO open then Socket.IO connect. Returns the heartbeat window.
    async fn handshake(
        &mut self,
        token: Option<&str>,
        limit: Duration,
        events: &mpsc::UnboundedSender<PushNotice>,
    ) -> Result<Duration, PushError> {
        let open = timeout(limit, self.next_text())
            .await
            .map_err(|_| PushError::HandshakeTimeout)??;
        let info = match EnginePacket::decode(&open)? {
            EnginePacket::Open(info) => info,
            other => {
                return Err(PushError::Rejected(format!(
                    "expected engine open, got {other:?}"
                )));
            }
        };

        let auth = token.map(|t| json!({ "token": t }));
        self.sink
            .send(Message::Text(socketio::connect_frame(auth.as_ref())))
            .await?;

        loop {
            let text = timeout(limit, self.next_text())
                .await
                .map_err(|_| PushError::HandshakeTimeout)??;
            match EnginePacket::decode(&text)? {
                EnginePacket::Ping => {
                    self.sink.send(Message::Text(EnginePacket::Pong.encode())).await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect(data) => {
                        let sid = data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .unwrap_or(&info.sid)
                            .to_string();
                        log::info!("push channel connected (sid {sid})");
                        let _ = events.send(PushNotice::Connected { sid });
                        break;
                    }
                    SocketPacket::ConnectError(data) => {
                        return Err(PushError::Rejected(error_message(&data)));
                    }
                    other => log::debug!("ignoring {other:?} before connect"),
                },
                EnginePacket::Close => return Err(PushError::Closed),
                _ => {}
            }
        }

        Ok(Duration::from_millis(info.ping_interval + info.ping_timeout))
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), PushError> {
        let ack = match message {
            ClientMessage::StartTranscription { .. } | ClientMessage::StopTranscription { .. } => {
                let id = self.next_ack;
                self.next_ack += 1;
                self.pending_acks.insert(id, message.event_name());
                Some(id)
            }
            _ => None,
        };
        for frame in socketio::encode_client(message, ack) {
            let msg = match frame {
                Frame::Text(text) => Message::Text(text),
                Frame::Binary(bytes) => Message::Binary(bytes),
            };
            self.sink.feed(msg).await?;
        }
        self.sink.flush().await?;
        Ok(())
    }

    /// Handle one text frame. Returns `true` when the server showed signs of
    /// life (resets the heartbeat deadline).
    async fn on_text(
        &mut self,
        text: &str,
        events: &mpsc::UnboundedSender<PushNotice>,
    ) -> Result<bool, PushError> {
        let packet = match EnginePacket::decode(text) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("dropping undecodable frame: {e}");
                return Ok(false);
            }
        };
        match packet {
            EnginePacket::Ping => {
                self.sink.send(Message::Text(EnginePacket::Pong.encode())).await?;
                Ok(true)
            }
            EnginePacket::Close => Err(PushError::Closed),
            EnginePacket::Message(body) => {
                match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Event { name, payload }) => {
                        match PushEvent::decode(&name, payload) {
                            Ok(Some(event)) => {
                                let _ = events.send(PushNotice::Event(event));
                            }
                            Ok(None) => log::trace!("unhandled push event {name}"),
                            Err(e) => log::warn!("malformed {name} payload: {e}"),
                        }
                    }
                    Ok(SocketPacket::Ack { id, data }) => {
                        if let Some(event) = self.pending_acks.remove(&id) {
                            let reply = data.get(0).unwrap_or(&data);
                            let error = reply
                                .get("error")
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            let _ = events.send(PushNotice::Acknowledged { event, error });
                        }
                    }
                    Ok(SocketPacket::BinaryEvent {
                        name, attachments, ..
                    }) => {
                        log::debug!("skipping binary event {name} ({attachments} attachments)");
                        self.pending_binary += attachments;
                    }
                    Ok(SocketPacket::Disconnect) => return Err(PushError::Closed),
                    Ok(SocketPacket::ConnectError(data)) => {
                        return Err(PushError::Rejected(error_message(&data)));
                    }
                    Ok(SocketPacket::Connect(_)) => {}
                    Err(e) => log::warn!("dropping undecodable packet: {e}"),
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn close(&mut self) {
        let _ = self
            .sink
            .send(Message::Text(EnginePacket::Message("1".into()).encode()))
            .await;
        let _ = self.sink.close().await;
    }
}

fn error_message(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}
