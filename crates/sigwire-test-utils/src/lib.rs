//! Common test helpers and utilities for SigWire tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A mock signaling server with RAII cleanup
//! - Event collectors for socket subscription testing, with notify-based waits

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sigwire_client::{Socket, SocketEvent, SocketEventType};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait until the socket reports the given connection state
pub async fn wait_for_connected(socket: &Socket, connected: bool, max_wait: Duration) -> bool {
    wait_for(
        || async { socket.is_connected().await == connected },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Mock Signaling Server
// ============================================================================

/// Mock server behaviour
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Send `{"type":"OPEN"}` as soon as a client connects
    pub send_open: bool,
    /// Echo every text frame back to its sender
    pub echo: bool,
}

enum Command {
    Text(String),
    Binary(Vec<u8>),
    Close(u16, String),
    /// Drop the TCP stream without a close handshake
    Drop,
}

#[derive(Default)]
struct Recorded {
    requests: Mutex<Vec<String>>,
    frames: Mutex<Vec<String>>,
    pings: AtomicU32,
    close_frames: AtomicU32,
    connections: AtomicU32,
    disconnections: AtomicU32,
    client: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

/// An in-process WebSocket signaling server that records what clients do.
///
/// Commands (`push`, `close_client`, `drop_client`) go to the most recently
/// connected client. The server stops when dropped.
pub struct MockSignalServer {
    port: u16,
    handle: Option<tokio::task::JoinHandle<()>>,
    recorded: Arc<Recorded>,
}

impl MockSignalServer {
    /// Start a mock server with default behaviour
    pub async fn start() -> Self {
        Self::start_with_config(MockConfig::default()).await
    }

    pub async fn start_with_config(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let recorded = Arc::new(Recorded::default());

        let shared = recorded.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, shared.clone(), config.clone()));
            }
        });

        Self {
            port,
            handle: Some(handle),
            recorded,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    /// Request URIs (path and query) of every accepted handshake
    pub fn requests(&self) -> Vec<String> {
        self.recorded.requests.lock().clone()
    }

    /// Text frames received from clients, in arrival order
    pub fn frames(&self) -> Vec<String> {
        self.recorded.frames.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.recorded.frames.lock().len()
    }

    pub fn ping_count(&self) -> u32 {
        self.recorded.pings.load(Ordering::SeqCst)
    }

    pub fn close_frame_count(&self) -> u32 {
        self.recorded.close_frames.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> u32 {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    pub fn disconnection_count(&self) -> u32 {
        self.recorded.disconnections.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` text frames have arrived
    pub async fn wait_for_frames(&self, n: usize, max_wait: Duration) -> bool {
        wait_for(
            || async { self.frame_count() >= n },
            DEFAULT_CHECK_INTERVAL,
            max_wait,
        )
        .await
    }

    pub async fn wait_for_pings(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.recorded.pings, n, max_wait).await
    }

    pub async fn wait_for_connections(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.recorded.connections, n, max_wait).await
    }

    pub async fn wait_for_disconnections(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.recorded.disconnections, n, max_wait).await
    }

    /// Send a text frame to the current client
    pub fn push(&self, frame: &str) -> bool {
        self.command(Command::Text(frame.to_string()))
    }

    /// Send a binary frame to the current client
    pub fn push_binary(&self, data: &[u8]) -> bool {
        self.command(Command::Binary(data.to_vec()))
    }

    /// Close the current client with a close frame carrying `code`
    pub fn close_client(&self, code: u16, reason: &str) -> bool {
        self.command(Command::Close(code, reason.to_string()))
    }

    /// Drop the current client's TCP stream without a close handshake
    pub fn drop_client(&self) -> bool {
        self.command(Command::Drop)
    }

    fn command(&self, cmd: Command) -> bool {
        match self.recorded.client.lock().as_ref() {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }

    /// Stop the server explicitly (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for MockSignalServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve_client(stream: TcpStream, recorded: Arc<Recorded>, config: MockConfig) {
    let requests = recorded.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        requests.requests.lock().push(req.uri().to_string());
        Ok(resp)
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Mock handshake failed: {}", e);
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    *recorded.client.lock() = Some(tx);
    recorded.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();

    if config.send_open {
        let _ = write.send(WsMessage::Text(r#"{"type":"OPEN"}"#.to_string())).await;
    }

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        recorded.frames.lock().push(text.clone());
                        if config.echo {
                            let _ = write.send(WsMessage::Text(text)).await;
                        }
                    }
                    Some(Ok(WsMessage::Ping(_))) => {
                        recorded.pings.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        recorded.close_frames.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Text(text)) => {
                        let _ = write.send(WsMessage::Text(text)).await;
                    }
                    Some(Command::Binary(data)) => {
                        let _ = write.send(WsMessage::Binary(data)).await;
                    }
                    Some(Command::Close(code, reason)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = write.send(WsMessage::Close(Some(frame))).await;
                    }
                    Some(Command::Drop) | None => break,
                }
            }
        }
    }

    recorded.disconnections.fetch_add(1, Ordering::SeqCst);
}

// ============================================================================
// Event Collectors - for verifying published socket events
// ============================================================================

/// Collector for socket events with thread-safe access
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<SocketEvent>>>,
    count: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this collector to one event kind on `socket`
    pub fn attach(&self, socket: &Socket, kind: SocketEventType) {
        socket.subscribe(kind, self.callback());
    }

    /// Create a handler that records every event it receives
    pub fn callback(&self) -> impl Fn(&SocketEvent) + Send + Sync + 'static {
        let events = self.events.clone();
        let count = self.count.clone();
        let notify = self.notify.clone();

        move |event: &SocketEvent| {
            events.lock().push(event.clone());
            count.fetch_add(1, Ordering::SeqCst);
            notify.notify_waiters();
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n events to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        timeout(max_wait, async {
            loop {
                // Created before the check so a concurrent publish still wakes us
                let notified = self.notify.notified();
                if self.count() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    pub fn events(&self) -> Vec<SocketEvent> {
        self.events.lock().clone()
    }

    /// Kinds of the collected events, in order
    pub fn kinds(&self) -> Vec<SocketEventType> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn last(&self) -> Option<SocketEvent> {
        self.events.lock().last().cloned()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

/// Run `fut` under [`DEFAULT_TIMEOUT`], panicking with `what` if it elapses
pub async fn within<T>(what: &str, fut: impl std::future::Future<Output = T>) -> T {
    match timeout(DEFAULT_TIMEOUT, fut).await {
        Ok(v) => v,
        Err(_) => panic!("timed out: {}", what),
    }
}
