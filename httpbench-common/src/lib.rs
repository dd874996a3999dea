use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;

/// How long a single attempt may spend establishing its connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status token recorded when the connection could not be used at all.
pub const TRANSPORT_ERROR_TOKEN: &str = "400";

/// Status token recorded when the response carried no parseable status line.
pub const PARSE_ERROR_TOKEN: &str = "unknown";

/// Error types for HttpBench operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchError {
    #[error("Target URL has no host")]
    EmptyTarget,

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Request count must be at least 1")]
    NoRequests,

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Connect timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Read window of {0} ms elapsed")]
    ReadTimeout(u64),
}

/// Result type for HttpBench operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// The endpoint every attempt of a run is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub tls: bool,
}

impl Target {
    /// Split a URL into host and path.
    ///
    /// `http://` selects plaintext on port 80. `https://` or a bare
    /// `host/path` selects TLS on port 443. An explicit `host:port` wins
    /// over the scheme default.
    pub fn parse(url: &str) -> Result<Self> {
        let (tls, rest) = match url.find("://") {
            Some(idx) => {
                let scheme = url[..idx].to_ascii_lowercase();
                let tls = match scheme.as_str() {
                    "http" => false,
                    "https" => true,
                    _ => return Err(BenchError::UnsupportedScheme(scheme)),
                };
                (tls, &url[idx + 3..])
            }
            None => (true, url),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let default_port = if tls { HTTPS_PORT } else { HTTP_PORT };
        let (host, port_text) = split_authority(authority)?;
        let port = match port_text {
            Some(text) => parse_port(text)?,
            None => default_port,
        };

        if host.is_empty() || host == "[]" {
            return Err(BenchError::EmptyTarget);
        }

        Ok(Target { host: host.to_string(), port, path: path.to_string(), tls })
    }

    /// Host without IPv6 brackets, as used for TLS server name checks.
    pub fn bare_host(&self) -> &str {
        self.host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(&self.host)
    }

    /// `host:port` pair to dial.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value for the `Host` header; the port is omitted when it is the scheme default.
    pub fn host_header(&self) -> String {
        let default_port = if self.tls { HTTPS_PORT } else { HTTP_PORT };
        if self.port == default_port {
            self.host.clone()
        } else {
            self.authority()
        }
    }
}

/// Split `host[:port]` or `[v6]:port`. Bracketed hosts keep their brackets.
fn split_authority(authority: &str) -> Result<(&str, Option<&str>)> {
    if authority.starts_with('[') {
        let Some(close) = authority.find(']') else {
            return Err(BenchError::InvalidHost(authority.to_string()));
        };
        let (host, rest) = authority.split_at(close + 1);
        return match rest.strip_prefix(':') {
            Some(port) => Ok((host, Some(port))),
            None if rest.is_empty() => Ok((host, None)),
            None => Err(BenchError::InvalidHost(authority.to_string())),
        };
    }
    Ok(match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    })
}

fn parse_port(text: &str) -> Result<u16> {
    text.parse::<u16>().map_err(|_| BenchError::InvalidPort(text.to_string()))
}

/// What an attempt learned about the response status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Second token of the response's first line, verbatim.
    Code(String),
    /// Connecting or exchanging failed before any byte arrived.
    TransportError,
    /// Bytes arrived but the first line has fewer than two tokens.
    ParseError,
}

impl Status {
    /// Legacy token shown in reports and used for classification.
    pub fn as_token(&self) -> &str {
        match self {
            Status::Code(code) => code,
            Status::TransportError => TRANSPORT_ERROR_TOKEN,
            Status::ParseError => PARSE_ERROR_TOKEN,
        }
    }

    /// A status fails when its token starts with `4` or `5`.
    /// This is a prefix test on the text, so `"4xx"` fails too.
    pub fn is_failure(&self) -> bool {
        let token = self.as_token();
        token.starts_with('4') || token.starts_with('5')
    }
}

/// Recorded result of one request attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub elapsed_ms: u64,
    pub status: Status,
    pub size_bytes: u64,
}

/// Summary of a completed run.
///
/// The default value is the empty report produced for zero outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub request_count: usize,
    pub fastest_ms: u64,
    pub slowest_ms: u64,
    pub mean_ms: u64,
    pub median_ms: u64,
    pub success_percent: f64,
    /// Failing status tokens with their counts, in first-seen order.
    pub error_codes: Vec<(String, usize)>,
    pub min_size_bytes: u64,
    pub max_size_bytes: u64,
}

pub const REPORT_LABELS: [&str; 9] = [
    "Number of Requests",
    "Fastest Time",
    "Slowest Time",
    "Mean Time",
    "Median Time",
    "Percentage Succeeded",
    "Error Code Met",
    "Response Min Size",
    "Response Max Size",
];

impl Report {
    pub fn is_empty(&self) -> bool {
        self.request_count == 0
    }

    /// Render the histogram as `code*count, code*count`.
    pub fn error_histogram(&self) -> String {
        self.error_codes
            .iter()
            .map(|(code, count)| format!("{code}*{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The nine labelled values in display order. An empty report renders empty values.
    pub fn fields(&self) -> [(&'static str, String); 9] {
        let mut fields = REPORT_LABELS.map(|label| (label, String::new()));
        if self.is_empty() {
            return fields;
        }
        let values = [
            self.request_count.to_string(),
            format!("{} ms", self.fastest_ms),
            format!("{} ms", self.slowest_ms),
            format!("{} ms", self.mean_ms),
            format!("{} ms", self.median_ms),
            format!("{:.2}%", self.success_percent),
            self.error_histogram(),
            format!("{} byte", self.min_size_bytes),
            format!("{} byte", self.max_size_bytes),
        ];
        for (field, value) in fields.iter_mut().zip(values) {
            field.1 = value;
        }
        fields
    }
}
