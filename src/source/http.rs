//! HTTP-backed metadata source.
//!
//! Talks to a rate-sensitive metadata service over plain HTTP. Hostnames are
//! resolved once at construction; each query is retried round-robin across
//! the full (hostname, address) cross-product with a doubling, capped
//! backoff. The transport owns the raw response bytes because some metadata
//! proxies are known to prepend log text (a connection-limit warning) to the
//! status line; the parser strips any such prefix before reading the status
//! code.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

use crate::error::MetadataError;
use crate::source::Source;

/// Default maximum number of query attempts across all targets.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default initial backoff between attempts.
pub const DEFAULT_BACKOFF_START: Duration = Duration::from_secs(1);

/// Default backoff ceiling.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(15);

/// Default per-attempt timeout. There is no overall deadline; callers wrap
/// the whole pipeline in their own timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for an [`HttpSource`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Hostnames of the metadata service, tried in resolution order.
    pub hosts: Vec<String>,
    /// Service port.
    pub port: u16,
    /// Maximum attempts before a query fails.
    pub max_attempts: u32,
    /// Initial sleep between attempts; doubles each retry.
    pub backoff_start: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Timeout applied to each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["169.254.169.254".to_string()],
            port: 80,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_start: DEFAULT_BACKOFF_START,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// One (hostname, resolved address) pair in the retry rotation.
#[derive(Debug, Clone)]
struct Target {
    host: String,
    addr: SocketAddr,
}

/// Outcome of a single successful HTTP exchange.
#[derive(Debug, PartialEq)]
enum Fetched {
    /// 2xx with this body.
    Body(String),
    /// Clean 404: the resource legitimately does not exist.
    Absent,
}

/// HTTP metadata source. See module docs for retry semantics.
pub struct HttpSource {
    config: HttpConfig,
    targets: Vec<Target>,
    finished: AtomicBool,
}

impl HttpSource {
    /// Resolve all configured hosts and build the target rotation.
    ///
    /// # Errors
    ///
    /// Returns `QueryFailed` if no configured host resolves to any address.
    pub async fn new(config: HttpConfig) -> Result<Self, MetadataError> {
        let mut targets = Vec::new();
        for host in &config.hosts {
            match lookup_host((host.as_str(), config.port)).await {
                Ok(addrs) => {
                    for addr in addrs {
                        targets.push(Target {
                            host: host.clone(),
                            addr,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "hostname did not resolve");
                }
            }
        }
        if targets.is_empty() {
            return Err(MetadataError::QueryFailed(format!(
                "no metadata host resolved (tried {:?})",
                config.hosts
            )));
        }
        Ok(Self {
            config,
            targets,
            finished: AtomicBool::new(false),
        })
    }

    async fn attempt(&self, target: &Target, path: &str) -> Result<Fetched, MetadataError> {
        let mut stream = TcpStream::connect(target.addr)
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("connect {}: {}", target.addr, e)))?;

        let request = format!(
            "GET /{} HTTP/1.0\r\nHost: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
            path.trim_start_matches('/'),
            target.host
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("send: {}", e)))?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("recv: {}", e)))?;

        parse_response(&raw)
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn query(&self, path: &str) -> Result<String, MetadataError> {
        let mut backoff = self.config.backoff_start;
        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.config.max_attempts {
            let target = &self.targets[attempt as usize % self.targets.len()];
            let outcome =
                tokio::time::timeout(self.config.attempt_timeout, self.attempt(target, path)).await;

            match outcome {
                Ok(Ok(Fetched::Body(body))) => return Ok(body),
                Ok(Ok(Fetched::Absent)) => return Ok(String::new()),
                Ok(Err(MetadataError::ParseFailed(reason))) => {
                    return Err(MetadataError::ParseFailed(reason));
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        path = %path,
                        host = %target.host,
                        addr = %target.addr,
                        attempt,
                        error = %last_error,
                        "metadata query attempt failed"
                    );
                }
                Err(_) => {
                    last_error = format!("attempt timed out after {:?}", self.config.attempt_timeout);
                    tracing::warn!(path = %path, addr = %target.addr, attempt, "metadata query attempt timed out");
                }
            }

            if attempt + 1 < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.config.backoff_cap);
            }
        }

        Err(MetadataError::QueryFailed(format!(
            "{} after {} attempts (last: {})",
            path, self.config.max_attempts, last_error
        )))
    }

    async fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("http source finished");
        }
    }
}

/// Parse a raw HTTP response, tolerating spurious text before the status
/// line. Text preceding the first line that starts with `HTTP/` is dropped;
/// the rest is interpreted normally, so a malformed-but-recoverable response
/// still yields its body.
fn parse_response(raw: &[u8]) -> Result<Fetched, MetadataError> {
    let text = String::from_utf8_lossy(raw);

    let start = find_status_line(&text)
        .ok_or_else(|| MetadataError::ParseFailed("no HTTP status line in response".into()))?;
    let head = &text[start..];

    let status_line = head.lines().next().unwrap_or("");
    let code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|tok| tok.parse().ok())
        .ok_or_else(|| {
            MetadataError::ParseFailed(format!("unparseable status line: {:?}", status_line))
        })?;

    let body = match head.find("\r\n\r\n") {
        Some(idx) => &head[idx + 4..],
        None => match head.find("\n\n") {
            Some(idx) => &head[idx + 2..],
            None => "",
        },
    };

    match code {
        200..=299 => Ok(Fetched::Body(body.to_string())),
        404 => Ok(Fetched::Absent),
        other => Err(MetadataError::QueryFailed(format!("http status {}", other))),
    }
}

/// Byte offset of the first line beginning with `HTTP/`, if any.
fn find_status_line(text: &str) -> Option<usize> {
    if text.starts_with("HTTP/") {
        return Some(0);
    }
    text.match_indices("HTTP/")
        .find(|(idx, _)| text.as_bytes().get(idx.wrapping_sub(1)) == Some(&b'\n'))
        .map(|(idx, _)| idx)
}
