//! Signaling socket
//!
//! Owns the WebSocket to the rendezvous server. While connected two
//! background tasks run per connection:
//! - keepalive: sends an empty ping every `ping_interval_ms`
//! - receive: the only reader of the transport, decodes text frames and
//!   publishes them as [`SocketEvent`]s
//!
//! The connection lives in a single `Mutex<Option<Connection>>` which is
//! also the write lock, so pings, application frames and the close frame
//! are never interleaved on the wire. Dialing happens outside that lock.
//! Every teardown runs under a separate gate, so `close` never returns while
//! a teardown started by a background task is still joining.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use sigwire_core::{codec, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn, Level};

use crate::emitter::{EventEmitter, SubscriptionId};
use crate::error::{ClientError, Result};
use crate::options::{ReadRetryPolicy, SocketOptions};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Event tags published by a [`Socket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEventType {
    /// A text frame arrived (decoded, or with a decode error)
    Message,
    /// The connection was established
    Connected,
    /// The connection was torn down
    Disconnected,
}

impl SocketEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketEventType::Message => "message",
            SocketEventType::Connected => "connected",
            SocketEventType::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SocketEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the socket
#[derive(Debug, Clone)]
pub struct SocketEvent {
    pub kind: SocketEventType,
    pub message: Option<Message>,
    pub error: Option<Arc<ClientError>>,
}

impl SocketEvent {
    fn message(message: Message) -> Self {
        Self {
            kind: SocketEventType::Message,
            message: Some(message),
            error: None,
        }
    }

    fn decode_failure(err: ClientError) -> Self {
        Self {
            kind: SocketEventType::Message,
            message: None,
            error: Some(Arc::new(err)),
        }
    }

    fn lifecycle(kind: SocketEventType, error: Option<ClientError>) -> Self {
        Self {
            kind,
            message: None,
            error: error.map(Arc::new),
        }
    }
}

/// Which side initiated a teardown. A background task never joins itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Keepalive,
    Receiver,
}

/// A live connection. Present in the socket state iff connected.
struct Connection {
    generation: u64,
    sink: WsSink,
    shutdown: watch::Sender<bool>,
    keepalive: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

struct Inner {
    options: SocketOptions,
    events: Arc<EventEmitter<SocketEvent>>,
    state: Mutex<Option<Connection>>,
    /// Serializes `start`
    dial: Mutex<()>,
    /// Held for the whole of every teardown
    teardown_gate: Mutex<()>,
    next_generation: AtomicU64,
}

/// Signaling socket client
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

impl Socket {
    /// Create a disconnected socket publishing into `events`
    pub fn new(options: SocketOptions, events: Arc<EventEmitter<SocketEvent>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                events,
                state: Mutex::new(None),
                dial: Mutex::new(()),
                teardown_gate: Mutex::new(()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Create a socket with its own event emitter
    pub fn with_options(options: SocketOptions) -> Self {
        Self::new(options, Arc::new(EventEmitter::new()))
    }

    pub fn options(&self) -> &SocketOptions {
        &self.inner.options
    }

    pub fn events(&self) -> &Arc<EventEmitter<SocketEvent>> {
        &self.inner.events
    }

    /// Register a handler for one kind of socket event
    pub fn subscribe<F>(&self, kind: SocketEventType, handler: F) -> SubscriptionId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind.as_str(), handler)
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.is_some()
    }

    /// Connect as peer `id` with session `token`.
    ///
    /// Does nothing if already connected. On a dial failure the socket stays
    /// disconnected and `start` may be called again.
    pub async fn start(&self, id: &str, token: &str) -> Result<()> {
        let _dial = self.inner.dial.lock().await;
        // A teardown in flight publishes its disconnect before we reconnect
        drop(self.inner.teardown_gate.lock().await);
        if self.is_connected().await {
            return Ok(());
        }

        let url = self.inner.options.build_url(id, token);
        debug!("Connecting to {}", url);

        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(ClientError::Dial)?;
        debug!("WebSocket connected, response: {:?}", response.status());

        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            debug!("Already connected, dropping the new transport");
            return Ok(());
        }

        let (sink, source) = ws_stream.split();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);

        let keepalive = tokio::spawn(keepalive_loop(
            Arc::downgrade(&self.inner),
            shutdown_rx.clone(),
            generation,
            self.inner.options.keepalive_period(),
        ));
        let receiver = tokio::spawn(receive_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.events),
            source,
            shutdown_rx,
            generation,
            ReceiveSettings::from(&self.inner.options),
        ));

        *state = Some(Connection {
            generation,
            sink,
            shutdown: shutdown_tx,
            keepalive: Some(keepalive),
            receiver: Some(receiver),
        });

        info!("Signaling socket connected as {}", id);
        Ok(())
    }

    /// Send one text frame. Does nothing if disconnected.
    ///
    /// A write failure is returned but leaves the connection in place.
    pub async fn send(&self, frame: impl Into<String>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let Some(conn) = state.as_mut() else {
            return Ok(());
        };

        conn.sink
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(ClientError::Write)
    }

    /// Encode and send a signaling message
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        let frame = codec::encode(message)?;
        self.send(frame).await
    }

    /// Close the connection. Does nothing if already disconnected.
    ///
    /// Both background tasks have finished by the time this returns, even
    /// when a background task had already started tearing the connection
    /// down. The only error surfaced is the one from closing the transport.
    pub async fn close(&self) -> Result<()> {
        let _gate = self.inner.teardown_gate.lock().await;
        let conn = self.inner.state.lock().await.take();
        match conn {
            Some(conn) => self.inner.teardown(conn, Origin::Caller, None).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Inner {
    /// Take the connection out of the state if it is still `generation`
    async fn take_connection(&self, generation: u64) -> Option<Connection> {
        let mut state = self.state.lock().await;
        match state.as_ref() {
            Some(conn) if conn.generation == generation => state.take(),
            _ => None,
        }
    }

    /// Tear down connection `generation` from one of its own tasks.
    ///
    /// Gives up once shutdown is signalled: whoever signalled it owns the
    /// teardown and is about to join this task.
    async fn teardown_from_task(
        &self,
        generation: u64,
        origin: Origin,
        cause: Option<ClientError>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let _gate = tokio::select! {
            gate = self.teardown_gate.lock() => gate,
            _ = shutdown.changed() => return,
        };
        if let Some(conn) = self.take_connection(generation).await {
            let _ = self.teardown(conn, origin, cause).await;
        }
    }

    async fn teardown(
        &self,
        mut conn: Connection,
        origin: Origin,
        cause: Option<ClientError>,
    ) -> Result<()> {
        debug!("Tearing down connection {} ({:?})", conn.generation, origin);
        let _ = conn.shutdown.send(true);

        let close_frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = conn.sink.send(WsMessage::Close(Some(close_frame))).await {
            debug!("Failed to send close message: {}", e);
        }

        let result = match conn.sink.close().await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => {
                warn!("WS close error: {}", e);
                Err(ClientError::Close(e))
            }
        };

        if origin != Origin::Keepalive {
            if let Some(handle) = conn.keepalive.take() {
                let _ = handle.await;
            }
        }
        if origin != Origin::Receiver {
            if let Some(handle) = conn.receiver.take() {
                let _ = handle.await;
            }
        }

        info!("Signaling socket disconnected");
        self.events.publish(
            SocketEventType::Disconnected.as_str(),
            &SocketEvent::lifecycle(SocketEventType::Disconnected, cause),
        );
        result
    }
}

async fn keepalive_loop(
    inner: Weak<Inner>,
    mut shutdown: watch::Receiver<bool>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };

        let mut state = inner.state.lock().await;
        let conn = match state.as_mut() {
            Some(conn) if conn.generation == generation => conn,
            _ => return,
        };

        let result = conn.sink.send(WsMessage::Ping(Vec::new())).await;
        drop(state);
        if let Err(e) = result {
            warn!("Keepalive ping failed: {}", e);
            inner
                .teardown_from_task(generation, Origin::Keepalive, None, &mut shutdown)
                .await;
            return;
        }
    }
}

/// Receive loop settings copied out of the socket options
#[derive(Debug, Clone, Copy)]
struct ReceiveSettings {
    retry: ReadRetryPolicy,
    trace_frames: bool,
}

impl From<&SocketOptions> for ReceiveSettings {
    fn from(options: &SocketOptions) -> Self {
        Self {
            retry: options.read_retry,
            trace_frames: options.logs(Level::DEBUG),
        }
    }
}

async fn receive_loop(
    inner: Weak<Inner>,
    events: Arc<EventEmitter<SocketEvent>>,
    mut source: WsSource,
    mut shutdown: watch::Receiver<bool>,
    generation: u64,
    settings: ReceiveSettings,
) {
    events.publish(
        SocketEventType::Connected.as_str(),
        &SocketEvent::lifecycle(SocketEventType::Connected, None),
    );

    let mut failures: u32 = 0;
    let cause = loop {
        let item = tokio::select! {
            _ = shutdown.changed() => return,
            item = source.next() => item,
        };

        match item {
            None => break None,
            Some(Ok(msg)) => {
                failures = 0;
                match msg {
                    WsMessage::Text(text) => {
                        if settings.trace_frames {
                            debug!("WS recv: {}", text);
                        }
                        dispatch_text(&events, &text);
                    }
                    WsMessage::Close(frame) => {
                        match &frame {
                            None => debug!("WebSocket closed without status"),
                            Some(f) if is_graceful(f.code) => {
                                debug!("WebSocket closed: {} {}", f.code, f.reason)
                            }
                            Some(f) => warn!("WebSocket closed by server: {} {}", f.code, f.reason),
                        }
                        break None;
                    }
                    WsMessage::Binary(data) => {
                        debug!("Ignoring binary frame ({} bytes)", data.len());
                    }
                    // Pongs are answered by tungstenite
                    _ => {}
                }
            }
            Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => break None,
            Some(Err(e)) => {
                failures += 1;
                warn!("WS read error: {}", e);
                match settings.retry.delay_for(failures) {
                    Some(delay) => {
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        error!("Giving up after {} consecutive read errors", failures);
                        break Some(ClientError::Read(e.to_string()));
                    }
                }
            }
        }
    };

    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner
        .teardown_from_task(generation, Origin::Receiver, cause, &mut shutdown)
        .await;
}

fn dispatch_text(events: &EventEmitter<SocketEvent>, text: &str) {
    let event = match codec::decode(text) {
        Ok(message) => SocketEvent::message(message),
        Err(e) => {
            error!("Failed to decode message={} {}", text, e);
            SocketEvent::decode_failure(ClientError::Codec(e))
        }
    };
    events.publish(SocketEventType::Message.as_str(), &event);
}

fn is_graceful(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away | CloseCode::Status)
}
