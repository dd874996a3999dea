use async_trait::async_trait;
use httpbench_common::{BenchError, Result, Target, DEFAULT_CONNECT_TIMEOUT};
use rustls::pki_types::ServerName;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub connect_timeout: Duration,
    /// Upper bound on the time spent reading the response. `None` reads until EOF.
    pub read_window: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT, read_window: None }
    }
}

/// Raw bytes of one response and, if the exchange did not finish cleanly, why.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub error: Option<BenchError>,
}

impl FetchResult {
    pub fn complete(bytes: Vec<u8>) -> Self {
        Self { bytes, error: None }
    }

    pub fn failed(bytes: Vec<u8>, error: BenchError) -> Self {
        Self { bytes, error: Some(error) }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One-shot GET against a target. Implementations never retry.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, target: &Target) -> FetchResult;
}

/// Fetcher that speaks HTTP/1.0 directly over TCP or TLS and keeps the raw response.
pub struct RawHttpFetcher {
    pub config: FetchConfig,
    tls: TlsConnector,
}

impl RawHttpFetcher {
    /// Create a new fetcher trusting the webpki root set
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| BenchError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { config, tls: TlsConnector::from(Arc::new(tls_config)) })
    }

    async fn connect(&self, target: &Target) -> Result<TcpStream> {
        let limit = self.config.connect_timeout;
        match timeout(limit, TcpStream::connect(target.authority())).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BenchError::Connect(e.to_string())),
            Err(_) => Err(BenchError::ConnectTimeout(limit.as_millis() as u64)),
        }
    }

    async fn fetch_tls(&self, target: &Target, tcp: TcpStream) -> FetchResult {
        let host = target.bare_host();
        let Ok(server_name) = ServerName::try_from(host.to_string()) else {
            let error = BenchError::InvalidServerName(host.to_string());
            return FetchResult::failed(Vec::new(), error);
        };

        let limit = self.config.connect_timeout;
        let error = match timeout(limit, self.tls.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => {
                return exchange(stream, &build_request(target), self.config.read_window).await;
            }
            Ok(Err(e)) => BenchError::Tls(e.to_string()),
            Err(_) => BenchError::ConnectTimeout(limit.as_millis() as u64),
        };
        FetchResult::failed(Vec::new(), error)
    }
}

#[async_trait]
impl Fetch for RawHttpFetcher {
    async fn fetch(&self, target: &Target) -> FetchResult {
        let tcp = match self.connect(target).await {
            Ok(tcp) => tcp,
            Err(e) => return FetchResult::failed(Vec::new(), e),
        };
        debug!(endpoint = %target.authority(), tls = target.tls, "connected");

        if target.tls {
            self.fetch_tls(target, tcp).await
        } else {
            exchange(tcp, &build_request(target), self.config.read_window).await
        }
    }
}

/// Build the request bytes for a plain GET of `target.path`.
pub fn build_request(target: &Target) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path,
        target.host_header()
    )
    .into_bytes()
}

/// Write `request`, then read until the peer closes or `read_window` elapses.
async fn exchange<S>(mut stream: S, request: &[u8], read_window: Option<Duration>) -> FetchResult
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.write_all(request).await {
        return FetchResult::failed(Vec::new(), BenchError::Io(e.to_string()));
    }

    let mut buf = Vec::new();
    let read = match read_window {
        None => stream.read_to_end(&mut buf).await,
        Some(window) => {
            let bounded = timeout(window, stream.read_to_end(&mut buf)).await;
            match bounded {
                Ok(read) => read,
                Err(_) => {
                    let error = BenchError::ReadTimeout(window.as_millis() as u64);
                    return FetchResult::failed(buf, error);
                }
            }
        }
    };

    match read {
        Ok(_) => FetchResult::complete(buf),
        // Peers that drop TLS without close_notify after a full response.
        Err(e) if e.kind() == ErrorKind::UnexpectedEof && !buf.is_empty() => {
            FetchResult::complete(buf)
        }
        Err(e) => FetchResult::failed(buf, BenchError::Io(e.to_string())),
    }
}

/// Second whitespace-delimited token of the first line, e.g. `HTTP/1.1 200 OK` -> `200`.
/// Returns `None` when the first line has fewer than two tokens.
pub fn parse_status(raw: &[u8]) -> Option<String> {
    let first_line = match raw.iter().position(|&b| b == b'\n') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    String::from_utf8_lossy(first_line).split_whitespace().nth(1).map(str::to_string)
}
