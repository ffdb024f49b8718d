//! [`BridgeServer`] – HTTP + WebSocket front door for the coordinator.
//!
//! Listens on `0.0.0.0:3000` by default (see [`BridgeServer::with_port`] and
//! [`BridgeServer::with_bind_address`]).
//!
//! * WebSocket upgrades on the configured path → one coordinator session per
//!   connection.
//! * `GET /` → plain-text greeting.
//! * `GET /ledger` → JSON array of the cars currently on the bridge.
//! * Anything else → 404.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use onelane_coordinator::{BridgeCoordinator, ChannelNotifier, Notifier};
use onelane_types::BridgeError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default TCP port for the bridge server.
pub const DEFAULT_PORT: u16 = 3000;

/// Default path on which WebSocket upgrades are accepted.
pub const DEFAULT_WS_PATH: &str = "/ws";

const GREETING: &str = "OneLane bridge coordinator is running. Connect a WebSocket to cross.\n";

// Enough for the request line and the headers we look at.
const PEEK_BYTES: usize = 2048;

// ---------------------------------------------------------------------------
// BridgeServer
// ---------------------------------------------------------------------------

/// Builder for the bridge server.
///
/// # Example
///
/// ```rust,no_run
/// use onelane_coordinator::BridgeCoordinator;
/// use onelane_server::BridgeServer;
///
/// #[tokio::main]
/// async fn main() {
///     BridgeServer::new(BridgeCoordinator::default())
///         .with_port(8080)
///         .run()
///         .await
///         .expect("bridge server failed");
/// }
/// ```
pub struct BridgeServer {
    coordinator: BridgeCoordinator,
    bind_address: IpAddr,
    port: u16,
    ws_path: String,
}

impl BridgeServer {
    /// Create a server in front of `coordinator` on `0.0.0.0:`[`DEFAULT_PORT`].
    pub fn new(coordinator: BridgeCoordinator) -> Self {
        Self {
            coordinator,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
        }
    }

    /// Override the listening port (builder-style).  `0` picks a free port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the listening address (builder-style).
    pub fn with_bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Override the WebSocket upgrade path (builder-style).
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    pub fn ws_path(&self) -> &str {
        &self.ws_path
    }

    /// Bind the TCP listener without starting to accept connections.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the listener cannot bind.
    pub async fn bind(self) -> Result<BoundServer, BridgeError> {
        let addr = SocketAddr::new(self.bind_address, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("bind error on {addr}: {e}")))?;

        Ok(BoundServer {
            listener,
            shared: Arc::new(Shared {
                coordinator: self.coordinator,
                ws_path: self.ws_path,
            }),
        })
    }

    /// Bind and serve until the process ends.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), BridgeError> {
        self.bind().await?.serve().await
    }
}

/// State every connection task needs.
struct Shared {
    coordinator: BridgeCoordinator,
    ws_path: String,
}

/// A server whose listener is already bound.
pub struct BoundServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl BoundServer {
    /// The address actually bound (useful when the port was `0`).
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.listener
            .local_addr()
            .map_err(|e| BridgeError::Transport(format!("local_addr: {e}")))
    }

    /// Accept connections forever, one task per connection.
    ///
    /// Accept errors are logged and the loop carries on.
    pub async fn serve(self) -> Result<(), BridgeError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, ws_path = %self.shared.ws_path, "bridge server listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, shared).await {
                            error!(peer = %peer, error = %e, "client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection dispatch
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), BridgeError> {
    // `peek` leaves the bytes in place so tungstenite's handshaker still sees
    // the full HTTP request.
    let mut buf = [0u8; PEEK_BYTES];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| BridgeError::Transport(format!("peek error from {peer}: {e}")))?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let Some(head) = RequestHead::parse(&header_preview) else {
        debug!(peer = %peer, "unparseable request line");
        return respond(stream, n, Status::BadRequest, "text/plain; charset=utf-8", "bad request\n").await;
    };

    if head.is_ws_upgrade {
        if head.path == shared.ws_path {
            return handle_ws(stream, peer, &shared.coordinator).await;
        }
        return respond(stream, n, Status::NotFound, "text/plain; charset=utf-8", "not found\n").await;
    }

    if head.method != "GET" {
        return respond(
            stream,
            n,
            Status::MethodNotAllowed,
            "text/plain; charset=utf-8",
            "method not allowed\n",
        )
        .await;
    }

    match head.path.as_str() {
        "/" => respond(stream, n, Status::Ok, "text/plain; charset=utf-8", GREETING).await,
        "/ledger" => {
            let snapshot = shared.coordinator.ledger().snapshot();
            let body = serde_json::to_string(&snapshot)
                .map_err(|e| BridgeError::Transport(format!("ledger serialization: {e}")))?;
            respond(stream, n, Status::Ok, "application/json", &body).await
        }
        _ => respond(stream, n, Status::NotFound, "text/plain; charset=utf-8", "not found\n").await,
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    fn line(self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::BadRequest => "400 Bad Request",
            Status::NotFound => "404 Not Found",
            Status::MethodNotAllowed => "405 Method Not Allowed",
        }
    }
}

/// Write a one-shot HTTP/1.1 response and close the connection.
///
/// `peeked` bytes of the request are drained first so the peer does not see
/// a reset for unread data.
async fn respond(
    mut stream: TcpStream,
    peeked: usize,
    status: Status,
    content_type: &str,
    body: &str,
) -> Result<(), BridgeError> {
    let mut sink = vec![0u8; peeked];
    stream
        .read_exact(&mut sink)
        .await
        .map_err(|e| BridgeError::Transport(format!("HTTP read error: {e}")))?;

    let response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status.line(),
        content_type,
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| BridgeError::Transport(format!("HTTP write error: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| BridgeError::Transport(format!("HTTP shutdown error: {e}")))?;
    Ok(())
}

/// The parts of an HTTP request head the router cares about.
#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    method: String,
    /// Request target without its query string.
    path: String,
    is_ws_upgrade: bool,
}

impl RequestHead {
    fn parse(preview: &str) -> Option<Self> {
        let mut lines = preview.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?.to_string();
        let target = request_line.next()?;
        let path = target.split('?').next().unwrap_or(target).to_string();

        let is_ws_upgrade = lines.any(|line| {
            let line = line.to_ascii_lowercase();
            line.starts_with("upgrade:") && line.contains("websocket")
        });

        Some(Self {
            method,
            path,
            is_ws_upgrade,
        })
    }
}

// ---------------------------------------------------------------------------
// WebSocket session
// ---------------------------------------------------------------------------

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: &BridgeCoordinator,
) -> Result<(), BridgeError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| BridgeError::Transport(format!("WS handshake from {peer}: {e}")))?;

    // Every admission and release made for this client nests under this span.
    let conn_id = Uuid::new_v4();
    let span = info_span!("ws_session", peer = %peer, conn_id = %conn_id);
    run_session(ws_stream, coordinator).instrument(span).await;
    Ok(())
}

async fn run_session(ws_stream: WebSocketStream<TcpStream>, coordinator: &BridgeCoordinator) {
    info!("client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (notifier, mut outbound) = ChannelNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    loop {
        tokio::select! {
            // ── Downstream: coordinator → client ───────────────────────────
            Some(notification) = outbound.recv() => {
                match notification.to_json() {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "serialization error"),
                }
            }
            // ── Upstream: client → coordinator ─────────────────────────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        info!(message = %text.as_str(), "message from client");
                        coordinator
                            .handle_request(text.as_str(), Arc::clone(&notifier))
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("connection closed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use onelane_coordinator::Admission;
    use onelane_types::Notification;
    use tokio_tungstenite::connect_async;

    async fn spawn_server(coordinator: BridgeCoordinator) -> SocketAddr {
        let bound = BridgeServer::new(coordinator)
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .bind()
            .await
            .expect("bind");
        let addr = bound.local_addr().expect("local addr");
        tokio::spawn(bound.serve());
        addr
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");
        response
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        raw_request(addr, &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n")).await
    }

    async fn next_notification<S>(ws: &mut S) -> Notification
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).expect("notification json");
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {other:?}"),
            }
        }
    }

    // ── Builder ──────────────────────────────────────────────────────────────

    #[test]
    fn defaults() {
        let server = BridgeServer::new(BridgeCoordinator::default());
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.ws_path(), DEFAULT_WS_PATH);
        assert_eq!(server.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn builder_overrides() {
        let server = BridgeServer::new(BridgeCoordinator::default())
            .with_port(9999)
            .with_ws_path("/cars")
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(server.port(), 9999);
        assert_eq!(server.ws_path(), "/cars");
        assert_eq!(server.bind_address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    // ── Request head parsing ─────────────────────────────────────────────────

    #[test]
    fn parses_websocket_upgrade() {
        let head = RequestHead::parse(
            "GET /ws?token=1 HTTP/1.1\r\nHost: x\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/ws");
        assert!(head.is_ws_upgrade);
    }

    #[test]
    fn parses_plain_get() {
        let head = RequestHead::parse("GET /ledger HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(head.path, "/ledger");
        assert!(!head.is_ws_upgrade);
    }

    #[test]
    fn rejects_empty_preview() {
        assert!(RequestHead::parse("").is_none());
        assert!(RequestHead::parse("GET").is_none());
    }

    // ── HTTP routes ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn root_serves_greeting() {
        let addr = spawn_server(BridgeCoordinator::default()).await;
        let response = http_get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("bridge coordinator is running"));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let addr = spawn_server(BridgeCoordinator::default()).await;
        let response = http_get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    }

    #[tokio::test]
    async fn non_get_request_is_method_not_allowed() {
        let addr = spawn_server(BridgeCoordinator::default()).await;
        let response = raw_request(addr, "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"), "{response}");
        assert!(response.ends_with("method not allowed\n"));
    }

    #[tokio::test]
    async fn unparseable_request_line_is_bad_request() {
        let addr = spawn_server(BridgeCoordinator::default()).await;
        let response = raw_request(addr, "garbage\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{response}");
    }

    #[tokio::test]
    async fn ledger_route_lists_crossing_cars() {
        let coordinator = BridgeCoordinator::default();
        let (notifier, _rx) = ChannelNotifier::new();
        let admission = coordinator
            .handle_request(
                r#"{"id":"slow","direction":"right","time":1000}"#,
                Arc::new(notifier),
            )
            .await;
        assert!(matches!(admission, Admission::Admitted(_)));

        let addr = spawn_server(coordinator).await;
        let response = http_get(addr, "/ledger").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("application/json"));
        assert!(response.contains(r#""id":"slow""#));
        assert!(response.contains(r#""direction":"right""#));
    }

    // ── WebSocket sessions ───────────────────────────────────────────────────

    #[tokio::test]
    async fn websocket_rejects_garbage_and_releases_valid_car() {
        let coordinator = BridgeCoordinator::default();
        let addr = spawn_server(coordinator.clone()).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}{DEFAULT_WS_PATH}"))
            .await
            .expect("ws connect");

        ws.send(Message::Text("Hello from client!".into())).await.unwrap();
        assert_eq!(next_notification(&mut ws).await, Notification::invalid_request());

        ws.send(Message::Text(r#"{"id":"car1","direction":"left","time":0}"#.into()))
            .await
            .unwrap();
        assert_eq!(next_notification(&mut ws).await, Notification::released("car1"));
        assert!(!coordinator.ledger().contains("car1"));
    }

    #[tokio::test]
    async fn websocket_on_wrong_path_is_refused() {
        let addr = spawn_server(BridgeCoordinator::default()).await;
        assert!(connect_async(format!("ws://{addr}/elsewhere")).await.is_err());
    }

    #[tokio::test]
    async fn disconnected_client_still_leaves_the_bridge() {
        let coordinator = BridgeCoordinator::default();
        let addr = spawn_server(coordinator.clone()).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}{DEFAULT_WS_PATH}"))
            .await
            .expect("ws connect");

        ws.send(Message::Text(r#"{"id":"ghost","direction":"right","time":0.2}"#.into()))
            .await
            .unwrap();

        // Wait until the car shows up, then hang up before it is released.
        for _ in 0..50 {
            if coordinator.ledger().contains("ghost") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(coordinator.ledger().contains("ghost"));
        ws.close(None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(coordinator.ledger().is_empty());
    }
}
