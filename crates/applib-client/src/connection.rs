//! Connection manager.
//!
//! A single background task owns the transport. Everything else talks to it
//! through a [`ConnectionHandle`]: `connect`, `send`, and the current
//! [`ConnectionState`]. Inbound frames and open/close notifications arrive on
//! an event channel in transport order.

use applib_core::{ConnectionState, Request, SessionToken};
use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::tungstenite::Message;

/// Delay before re-establishing a lost connection.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Delay before the very first connection attempt.
pub const INITIAL_CONNECT_DELAY: Duration = Duration::from_millis(100);

pub type TextSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open duplex text channel.
pub struct TransportLink {
    pub sink: TextSink,
    pub stream: TextStream,
}

/// Opens transports on demand.
pub trait Connector: Send + 'static {
    fn connect(&mut self) -> BoxFuture<'static, Result<TransportLink, TransportError>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    fn connect(&mut self) -> BoxFuture<'static, Result<TransportLink, TransportError>> {
        let url = self.url.clone();
        Box::pin(async move {
            let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
            let (sink, stream) = ws.split();

            let sink = sink
                .sink_map_err(TransportError::from)
                .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

            let stream = stream.filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                    Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

            Ok(TransportLink {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// Notifications emitted by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport is open and queued frames have been flushed.
    Opened,
    /// A text frame from the server.
    Message(String),
    /// An open transport was lost or closed.
    Closed,
}

enum Command {
    Connect,
    Send(String),
    SetToken(SessionToken),
    Shutdown,
}

/// Cloneable front door to the connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    stopping: Arc<AtomicBool>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => f.write_str("Connect"),
            Command::Send(_) => f.write_str("Send"),
            Command::SetToken(_) => f.write_str("SetToken"),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl ConnectionHandle {
    /// Ensure a connection exists or is being established.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Queue a text frame. It is written as soon as the transport is open.
    ///
    /// Fails once [`shutdown`](Self::shutdown) has been requested.
    pub fn send(&self, payload: String) -> Result<(), TransportError> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        self.commands
            .send(Command::Send(payload))
            .map_err(|_| TransportError::Shutdown)
    }

    /// Remember the token to present after the next (re)open.
    pub fn set_session_token(&self, token: SessionToken) {
        let _ = self.commands.send(Command::SetToken(token));
    }

    /// Close the transport and stop the task. Pending reconnects are cancelled.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Latest connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolves once the connection task has exited.
    pub async fn closed(&self) {
        self.commands.closed().await
    }
}

/// Spawns and owns the connection task.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Start the connection task on the current runtime.
    ///
    /// The first attempt is made after [`INITIAL_CONNECT_DELAY`].
    pub fn spawn<C: Connector>(
        connector: C,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            connector,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            pending: None,
            link: None,
            retry: Some(Box::pin(sleep(INITIAL_CONNECT_DELAY))),
            queue: VecDeque::new(),
            token: None,
        };
        tokio::spawn(driver.run());

        let handle = ConnectionHandle {
            commands: command_tx,
            state: state_rx,
            stopping: Arc::new(AtomicBool::new(false)),
        };
        (handle, event_rx)
    }
}

type PendingConnect = BoxFuture<'static, Result<TransportLink, TransportError>>;

struct Driver<C> {
    connector: C,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    pending: Option<PendingConnect>,
    link: Option<TransportLink>,
    retry: Option<Pin<Box<Sleep>>>,
    queue: VecDeque<String>,
    token: Option<SessionToken>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Send(payload)) => {
                        self.queue.push_back(payload);
                        self.connect();
                        self.flush().await;
                    }
                    Some(Command::SetToken(token)) => self.token = Some(token),
                    Some(Command::Shutdown) | None => {
                        self.drain_commands();
                        self.close().await;
                        break;
                    }
                },
                result = pending_connect(&mut self.pending) => {
                    self.pending = None;
                    match result {
                        Ok(link) => self.opened(link).await,
                        Err(e) => {
                            tracing::warn!("Connection attempt failed: {}", e);
                            self.lost();
                        }
                    }
                }
                frame = next_frame(&mut self.link) => match frame {
                    Some(Ok(text)) => {
                        let _ = self.events.send(ConnectionEvent::Message(text));
                    }
                    Some(Err(e)) => {
                        tracing::debug!("Transport error: {}", e);
                        self.lost();
                    }
                    None => self.lost(),
                },
                () = retry_due(&mut self.retry) => {
                    self.retry = None;
                    self.connect();
                }
            }
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn connect(&mut self) {
        // A scheduled retry already owns the next attempt.
        if self.retry.is_some() || !self.current().needs_connect() {
            return;
        }
        self.state.send_replace(ConnectionState::Connecting);
        self.pending = Some(self.connector.connect());
    }

    async fn opened(&mut self, link: TransportLink) {
        tracing::info!("Connection open");
        self.link = Some(link);
        self.state.send_replace(ConnectionState::Open);

        if let Some(token) = &self.token {
            let resume = Request::ResumeSession {
                token: token.clone(),
            };
            self.queue.push_front(resume.to_value().to_string());
        }

        let _ = self.events.send(ConnectionEvent::Opened);
        self.flush().await;
    }

    async fn flush(&mut self) {
        while self.current() == ConnectionState::Open {
            let Some(link) = self.link.as_mut() else {
                break;
            };
            let Some(payload) = self.queue.pop_front() else {
                break;
            };
            if let Err(e) = link.sink.send(payload.clone()).await {
                tracing::debug!("Write failed, keeping frame for the next connection: {}", e);
                self.queue.push_front(payload);
                self.lost();
            }
        }
    }

    fn lost(&mut self) {
        let was_open = self.current() == ConnectionState::Open;
        self.link = None;
        self.pending = None;
        if self.current() == ConnectionState::Closing {
            return;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        if was_open {
            let _ = self.events.send(ConnectionEvent::Closed);
        }
        if self.retry.is_none() {
            tracing::info!(
                "Connection lost, retrying in {}ms ({} frames queued)",
                RECONNECT_DELAY.as_millis(),
                self.queue.len()
            );
            self.retry = Some(Box::pin(sleep(RECONNECT_DELAY)));
        }
    }

    /// Stop accepting commands and keep any frames sent behind the shutdown.
    fn drain_commands(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Send(payload) = command {
                self.queue.push_back(payload);
            }
        }
    }

    async fn close(&mut self) {
        self.state.send_replace(ConnectionState::Closing);
        self.retry = None;
        self.pending = None;
        if let Some(mut link) = self.link.take() {
            let _ = link.sink.close().await;
            let _ = self.events.send(ConnectionEvent::Closed);
        }
        if !self.queue.is_empty() {
            tracing::warn!("Shutting down with {} unsent frames", self.queue.len());
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

async fn pending_connect(pending: &mut Option<PendingConnect>) -> Result<TransportLink, TransportError> {
    match pending {
        Some(attempt) => attempt.await,
        None => future::pending().await,
    }
}

async fn next_frame(link: &mut Option<TransportLink>) -> Option<Result<String, TransportError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => future::pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => future::pending().await,
    }
}

/// Transport-level failure. Recovered internally by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("transport closed")]
    Closed,
    #[error("connection task has shut down")]
    Shutdown,
}
