//! WebSocket connection to the match server with resume-on-drop.
//!
//! One socket at a time. Inbound text frames are parsed into
//! [`ServerMessage`]s and routed through the [`HandlerRegistry`]; the
//! built-in handlers keep the [`SessionStore`] in sync with the match.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use pawnhub_shared::{read_fen, ClientMessage, MessageKind, PlayState, ProtocolError, ServerMessage};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::registry::{HandlerRegistry, Subscription};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::SessionStore;

/// Connection state of the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The socket dropped mid-match and a resume is in flight.
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// The live socket: the writer task drains `sender`, the reader task clears
/// `open` when the stream ends.
struct Socket {
    generation: u64,
    sender: UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl Socket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    fn shutdown(self) {
        self.open.store(false, Ordering::Release);
        let _ = self.sender.unbounded_send(Message::Close(None));
    }
}

struct Inner {
    config: ClientConfig,
    session: Arc<dyn SessionStore>,
    registry: HandlerRegistry,
    socket: Mutex<Option<Socket>>,
    state: Mutex<ConnectionState>,
    /// Serializes `prepare` so concurrent callers share one socket.
    connect_lock: tokio::sync::Mutex<()>,
    /// Closes the session if a dropped match is not resumed in time.
    fallback: Mutex<Option<JoinHandle<()>>>,
    /// The in-flight resume after a dropped socket.
    resume: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every `close()`. A resume only installs its socket if no
    /// close happened since the drop it answers.
    closes: AtomicU64,
    generations: AtomicU64,
}

/// Client side of the match server connection.
///
/// Cheap to clone; clones share the socket, handlers and session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection and register the built-in handlers. No socket is
    /// opened until [`Connection::prepare`].
    pub fn new(config: ClientConfig, session: Arc<dyn SessionStore>) -> Self {
        let connection = Self {
            inner: Arc::new(Inner {
                config,
                session,
                registry: HandlerRegistry::new(),
                socket: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                connect_lock: tokio::sync::Mutex::new(()),
                fallback: Mutex::new(None),
                resume: Mutex::new(None),
                closes: AtomicU64::new(0),
                generations: AtomicU64::new(0),
            }),
        };
        connection.register_builtin_handlers();
        connection
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.inner.session
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .socket
            .lock()
            .as_ref()
            .is_some_and(|socket| socket.is_open())
    }

    /// Register a handler for `kind`. Built-in handlers always run first.
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.registry.on(kind, handler)
    }

    /// Make sure a socket is open, connecting if needed.
    pub async fn prepare(&self) -> Result<(), ClientError> {
        self.prepare_with(|_| {}).await
    }

    /// Like [`Connection::prepare`], additionally calling `on_error` if the
    /// socket cannot be opened.
    ///
    /// Gives up after the configured connect timeout, so the future always
    /// resolves.
    pub async fn prepare_with<F>(&self, on_error: F) -> Result<(), ClientError>
    where
        F: FnOnce(&ClientError),
    {
        self.open_socket(on_error, None).await
    }

    /// Open a socket unless one is already open. With `resuming_after`, the
    /// socket is only installed if no `close()` happened since that epoch.
    async fn open_socket<F>(&self, on_error: F, resuming_after: Option<u64>) -> Result<(), ClientError>
    where
        F: FnOnce(&ClientError),
    {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let url = self.inner.config.endpoint().to_string();
        if self.inner.config.debug_local_server {
            warn!(%url, "Using local server");
        }
        if self.state() != ConnectionState::Reconnecting {
            self.set_state(ConnectionState::Connecting);
        }

        let connect_timeout = self.inner.config.connect_timeout;
        let stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let err = ClientError::Connect {
                    url,
                    source: Box::new(e),
                };
                return Err(self.connect_failed(err, on_error));
            }
            Err(_) => {
                let err = ClientError::ConnectTimeout {
                    url,
                    timeout: connect_timeout,
                };
                return Err(self.connect_failed(err, on_error));
            }
        };

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (write, read) = stream.split();
        let (sender, receiver) = unbounded();
        let open = Arc::new(AtomicBool::new(true));

        let previous = {
            let mut socket = self.inner.socket.lock();
            // close() bumps the epoch before it takes the socket lock
            if let Some(epoch) = resuming_after {
                if self.inner.closes.load(Ordering::Acquire) != epoch {
                    info!(%url, "Match was closed while resuming, dropping new socket");
                    return Err(ClientError::Closed);
                }
            }
            socket.replace(Socket {
                generation,
                sender,
                open: open.clone(),
            })
        };
        if let Some(previous) = previous {
            previous.shutdown();
        }

        self.set_state(ConnectionState::Connected);
        info!(%url, generation, "WebSocket connected");

        tokio::spawn(write_loop(write, receiver));
        tokio::spawn(self.clone().read_loop(read, open, generation));
        Ok(())
    }

    fn connect_failed<F>(&self, err: ClientError, on_error: F) -> ClientError
    where
        F: FnOnce(&ClientError),
    {
        error!("{}", err);
        self.set_state(ConnectionState::Disconnected);
        on_error(&err);
        err
    }

    /// End the match: clear the session and close the socket. Safe to call
    /// at any time, any number of times.
    pub fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::AcqRel);
        self.cancel_fallback();
        self.cancel_resume();
        self.inner.session.reset_after_close();

        let socket = self.inner.socket.lock().take();
        if let Some(socket) = socket {
            info!(generation = socket.generation, "Closing connection");
            socket.shutdown();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Parse a text frame and run the handlers for it.
    ///
    /// Returns how many handlers ran; unknown message types run none.
    pub fn handle_message(&self, text: &str) -> Result<usize, ProtocolError> {
        debug!("Received message: {}", text);
        let message = ServerMessage::parse(text)?;
        Ok(self.inner.registry.dispatch(&message))
    }

    /// Transmit a raw text frame. Fails without sending if no socket is open.
    pub fn send(&self, text: &str) -> Result<(), ClientError> {
        debug!("Sending message: {}", text);
        let socket = self.inner.socket.lock();
        let Some(socket) = socket.as_ref().filter(|s| s.is_open()) else {
            return Err(ClientError::NotOpen);
        };
        socket
            .sender
            .unbounded_send(Message::text(text.to_string()))
            .map_err(|_| ClientError::NotOpen)
    }

    pub fn send_message(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let json = message.to_json()?;
        self.send(&json)
    }

    /// Ask to join the match hosted by `host_id`.
    pub fn send_connect_request(&self, host_id: &str, code: &str) -> Result<(), ClientError> {
        self.send_message(&ClientMessage::ConnectAttendee {
            host: host_id.to_string(),
            code: code.to_string(),
        })
    }

    /// Send a move and mark it pending until the server accepts it.
    pub fn send_move(&self, from: &str, to: &str) -> Result<(), ClientError> {
        self.send_message(&ClientMessage::SendMove {
            from: from.to_string(),
            to: to.to_string(),
        })?;
        self.inner.session.set_pending_move(true);
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.inner.state.lock();
        let previous = *current;
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
            *current = state;
        }
    }

    fn register_builtin_handlers(&self) {
        for kind in MessageKind::ALL {
            let weak = Arc::downgrade(&self.inner);
            self.inner.registry.on(kind, move |message| {
                if let Some(inner) = weak.upgrade() {
                    Connection { inner }.apply_builtin(message);
                }
            });
        }
    }

    fn apply_builtin(&self, message: &ServerMessage) {
        let session = &self.inner.session;
        match message {
            ServerMessage::ConnectedId { id, reconnect_code } => {
                session.set_client_id(id.clone());
                session.set_reconnect_code(reconnect_code.clone());
            }
            ServerMessage::Matched { fen } => {
                session.set_play_state(PlayState::Playing);
                session.apply_position(read_fen(fen));
            }
            ServerMessage::ReceiveMove { fen } => {
                session.apply_position(read_fen(fen));
                session.set_unread_move(true);
            }
            ServerMessage::AcceptMove { fen } => {
                session.apply_position(read_fen(fen));
                session.set_pending_move(false);
            }
            ServerMessage::Reconnected { reconnect_code } => {
                self.cancel_fallback();
                session.set_reconnect_code(reconnect_code.clone());
                info!("Reconnected");
            }
            ServerMessage::Board { fen } => {
                session.apply_position(read_fen(fen));
            }
            ServerMessage::OpponentDisconnected => {
                info!("Opponent disconnected, closing match");
                self.close();
            }
            ServerMessage::Unknown => {}
        }
    }

    async fn read_loop<S>(self, mut read: S, open: Arc<AtomicBool>, generation: u64)
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.handle_message(text.as_str()) {
                        error!("Failed to handle message: {}", e);
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!(?frame, generation, "WebSocket received close frame");
                    break;
                }
                Ok(_) => {
                    // Pings are answered by tungstenite; binary frames are not part of the protocol
                }
                Err(e) => {
                    error!(generation, "WebSocket read error: {}", e);
                    break;
                }
            }
        }

        open.store(false, Ordering::Release);
        self.socket_closed(generation);
    }

    fn socket_closed(&self, generation: u64) {
        {
            let mut socket = self.inner.socket.lock();
            let is_current = socket
                .as_ref()
                .is_some_and(|s| s.generation == generation);
            if !is_current {
                debug!(generation, "Replaced or closed socket finished");
                return;
            }
            *socket = None;
        }

        info!(generation, "WebSocket closed");
        self.set_state(ConnectionState::Disconnected);

        // close() clears the code first, so only unexpected drops get here
        if self.inner.session.reconnect_code().is_some() {
            self.handle_connection_closed();
        }
    }

    /// Try to resume the match after the socket dropped, closing the session
    /// if that has not succeeded within the grace period.
    fn handle_connection_closed(&self) {
        let code = self.inner.session.reconnect_code();
        let epoch = self.inner.closes.load(Ordering::Acquire);
        warn!("Connection lost, trying to resume the match");
        self.set_state(ConnectionState::Reconnecting);
        self.arm_fallback();

        let connection = self.clone();
        let task = tokio::spawn(async move { connection.resume(code, epoch).await });
        if let Some(previous) = self.inner.resume.lock().replace(task) {
            previous.abort();
        }
    }

    async fn resume(&self, code: Option<String>, epoch: u64) {
        match self.open_socket(|_| {}, Some(epoch)).await {
            Ok(()) => {}
            Err(ClientError::Closed) => return,
            Err(e) => {
                warn!("Resume failed, waiting for the grace period to run out: {}", e);
                return;
            }
        }

        self.inner.session.set_reconnect_code(None);
        let message = ClientMessage::Reconnect {
            id: self.inner.session.client_id(),
            reconnect_code: code,
        };
        if let Err(e) = self.send_message(&message) {
            error!("Failed to send reconnect request: {}", e);
        }
    }

    fn arm_fallback(&self) {
        let grace = self.inner.config.reconnect_grace;
        let weak = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                warn!(?grace, "Match was not resumed in time, closing");
                Connection { inner }.close();
            }
        });

        if let Some(previous) = self.inner.fallback.lock().replace(timer) {
            previous.abort();
        }
    }

    fn cancel_fallback(&self) {
        let timer = self.inner.fallback.lock().take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    fn cancel_resume(&self) {
        let task = self.inner.resume.lock().take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.config.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop<S>(mut write: S, mut receiver: UnboundedReceiver<Message>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(message) = receiver.next().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            error!("Send failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = write.close().await;
}
