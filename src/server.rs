//! Scrape endpoint
//!
//! A minimal HTTP/1.1 listener serving the counter exposition on one path,
//! optionally guarded by a bearer token. One request per connection.

use crate::exposition::{self, CONTENT_TYPE};
use crate::registry::MetricRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const MAX_REQUEST_HEAD: usize = 8192;
/// A client must deliver its request head within this window
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind scrape endpoint on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Scrape endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how metrics are served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeEndpoint {
    pub addr: String,
    pub path: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Parse the request line and headers. Returns `None` for a malformed head.
pub fn parse_request_head(head: &str) -> Option<RequestHead> {
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();

    let authorization = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("authorization"))
        .map(|(_, value)| value.trim().to_string());

    Some(RequestHead {
        method,
        path,
        authorization,
    })
}

/// Check an `Authorization` header against the expected bearer token
pub fn authorize(header: Option<&str>, token: &str) -> bool {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|presented| presented.trim() == token)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub body: String,
}

impl Response {
    fn new(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            body: body.into(),
        }
    }

    fn to_bytes(&self, head_only: bool) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason,
            CONTENT_TYPE,
            self.body.len()
        );
        if self.status == 401 {
            out.push_str("WWW-Authenticate: Bearer\r\n");
        }
        out.push_str("\r\n");
        if !head_only {
            out.push_str(&self.body);
        }
        out.into_bytes()
    }
}

/// Decide the response for one request
pub fn respond(
    request: &RequestHead,
    endpoint: &ScrapeEndpoint,
    registry: &MetricRegistry,
) -> Response {
    if request.path.trim_end_matches('/') != endpoint.path.trim_end_matches('/') {
        return Response::new(404, "Not Found", "Not Found\n");
    }

    if request.method != "GET" && request.method != "HEAD" {
        return Response::new(405, "Method Not Allowed", "Method Not Allowed\n");
    }

    if let Some(token) = endpoint.bearer_token.as_deref() {
        if !authorize(request.authorization.as_deref(), token) {
            return Response::new(401, "Unauthorized", "Unauthorized\n");
        }
    }

    Response::new(200, "OK", exposition::render(&registry.snapshot()))
}

/// Accept connections until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    endpoint: Arc<ScrapeEndpoint>,
    registry: Arc<MetricRegistry>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("scrape endpoint shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let endpoint = Arc::clone(&endpoint);
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let handled =
                            handle_connection(stream, &endpoint, &registry, peer_addr, READ_TIMEOUT)
                                .await;
                        if let Err(e) = handled {
                            debug!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    endpoint: &ScrapeEndpoint,
    registry: &MetricRegistry,
    peer_addr: SocketAddr,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let buffer = match tokio::time::timeout(read_timeout, read_request_head(&mut stream)).await {
        Ok(read) => read?,
        Err(_) => {
            debug!(peer = %peer_addr, "request head not received in time; closing");
            return stream.shutdown().await;
        }
    };

    let head = String::from_utf8_lossy(&buffer);
    let response = match parse_request_head(&head) {
        Some(request) => {
            let response = respond(&request, endpoint, registry);
            if response.status == 401 {
                warn!(peer = %peer_addr, "rejected unauthorized scrape");
            }
            stream
                .write_all(&response.to_bytes(request.method == "HEAD"))
                .await?;
            response
        }
        None => {
            let response = Response::new(400, "Bad Request", "Bad Request\n");
            stream.write_all(&response.to_bytes(false)).await?;
            response
        }
    };

    debug!(peer = %peer_addr, status = response.status, "scrape served");
    stream.shutdown().await
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut read_buf = [0u8; 1024];

    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&read_buf[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_HEAD {
            break;
        }
    }

    Ok(buffer)
}

/// A started scrape server
pub trait ScrapeServer: Send {
    fn local_addr(&self) -> Option<SocketAddr>;
    fn stop(self: Box<Self>);
}

/// Starts scrape servers; swapped out in tests to avoid binding ports
pub trait ScrapeServerFactory: Send + Sync {
    fn start(
        &self,
        endpoint: ScrapeEndpoint,
        registry: Arc<MetricRegistry>,
    ) -> Result<Box<dyn ScrapeServer>, ServerError>;
}

/// Runs the scrape server as a task on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioServerFactory {
    runtime: tokio::runtime::Handle,
}

impl TokioServerFactory {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
}

impl ScrapeServer for RunningServer {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn stop(self: Box<Self>) {
        let _ = self.shutdown.send(());
    }
}

impl ScrapeServerFactory for TokioServerFactory {
    fn start(
        &self,
        endpoint: ScrapeEndpoint,
        registry: Arc<MetricRegistry>,
    ) -> Result<Box<dyn ScrapeServer>, ServerError> {
        let bind_err = |source| ServerError::Bind {
            addr: endpoint.addr.clone(),
            source,
        };

        let std_listener = std::net::TcpListener::bind(&endpoint.addr).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = std_listener.local_addr()?;

        let _guard = self.runtime.enter();
        let listener = TcpListener::from_std(std_listener)?;

        info!(
            "Scrape endpoint listening on http://{}{}{}",
            local_addr,
            endpoint.path,
            if endpoint.bearer_token.is_some() {
                " (bearer token required)"
            } else {
                ""
            }
        );

        let (shutdown, shutdown_rx) = oneshot::channel();
        self.runtime
            .spawn(serve(listener, Arc::new(endpoint), registry, shutdown_rx));

        Ok(Box::new(RunningServer {
            local_addr,
            shutdown,
        }))
    }
}
