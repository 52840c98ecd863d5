use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use reqwest::{Client as ReqwestClient, ClientBuilder};
use thiserror::Error;
use url::{Host, Url};

use super::extractor::extract;
use crate::models::OgpRecord;

pub const FETCH_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const USER_AGENT: &str = "linkbox-ogp-fetcher/1.0";
const MAX_REDIRECTS: usize = 10;

/// Result of resolving one URL to its Open Graph metadata.
pub type FetchOutcome = Result<OgpRecord, FetchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Timeout,
    /// The target answered with a non-2xx status.
    UpstreamError { status: u16 },
    NetworkError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidUrl,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("URL fetch timed out after {} ms", after.as_millis()),
        }
    }

    /// `"<status> <statusText>"`, e.g. `"404 Not Found"`.
    pub fn upstream(status: reqwest::StatusCode) -> Self {
        let message = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        Self {
            kind: FailureKind::UpstreamError {
                status: status.as_u16(),
            },
            message,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NetworkError,
            message: message.into(),
        }
    }
}

/// Anything that can resolve a URL to a `FetchOutcome`.
///
/// `OgpRequestCache` is written against this trait so tests can swap in a
/// fake that counts calls instead of touching the network.
#[async_trait]
pub trait OgpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Skip the private/loopback address check. Only for local development
    /// and tests that serve pages from 127.0.0.1.
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: FETCH_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            allow_private_hosts: false,
        }
    }
}

/// Fetches a page over HTTP and extracts its Open Graph metadata.
///
/// Stateless apart from the pooled HTTP client. One attempt per call, no
/// retries.
#[derive(Clone)]
pub struct OgpFetchService {
    client: ReqwestClient,
    config: FetchConfig,
}

impl OgpFetchService {
    /// Unless private hosts are allowed, every hostname lookup goes through
    /// `PublicOnlyResolver` and every redirect hop is re-checked, so the
    /// address guard holds for each connection rather than only the first URL.
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let builder = client_builder(&config);
        let builder = if config.allow_private_hosts {
            builder
        } else {
            builder.dns_resolver(Arc::new(PublicOnlyResolver))
        };
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    /// Use `resolver` for every hostname lookup instead of the default one.
    /// IP-literal hosts and redirect hops are still checked against
    /// `allow_private_hosts`.
    pub fn with_resolver<R: Resolve + 'static>(
        config: FetchConfig,
        resolver: Arc<R>,
    ) -> Result<Self, reqwest::Error> {
        let client = client_builder(&config).dns_resolver(resolver).build()?;
        Ok(Self { client, config })
    }

    async fn get_html(&self, url: Url) -> Result<String, FetchError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if caused_by_blocked_host(&e) {
                tracing::warn!(url = %url, "OGP fetch reached a private or reserved address");
                return FetchError::invalid_url(BlockedHost.to_string());
            }
            tracing::warn!(error = ?e, url = %url, "Failed to fetch URL for OGP");
            FetchError::network(format!("Failed to fetch URL: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, %status, "Upstream returned non-success status");
            return Err(FetchError::upstream(status));
        }

        response.text().await.map_err(|e| {
            tracing::warn!(error = ?e, url = %url, "Failed to read response body");
            FetchError::network(format!("Failed to read response body: {e}"))
        })
    }
}

#[async_trait]
impl OgpFetcher for OgpFetchService {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let parsed = parse_target_url(url)?;
        if !self.config.allow_private_hosts {
            check_literal_host(&parsed).map_err(|e| FetchError::invalid_url(e.to_string()))?;
        }

        // Name resolution happens inside the request, so the deadline covers it.
        // Dropping the request future on timeout closes the connection.
        let html = tokio::time::timeout(self.config.timeout, self.get_html(parsed))
            .await
            .map_err(|_| {
                tracing::warn!(
                    url = %url,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "OGP fetch timed out"
                );
                FetchError::timeout(self.config.timeout)
            })??;

        Ok(extract(&html))
    }
}

fn client_builder(config: &FetchConfig) -> ClientBuilder {
    // A proxy would resolve names itself and bypass the address guard.
    ReqwestClient::builder()
        .user_agent(config.user_agent.clone())
        .no_proxy()
        .redirect(redirect_policy(config.allow_private_hosts))
}

fn redirect_policy(allow_private_hosts: bool) -> Policy {
    if allow_private_hosts {
        return Policy::limited(MAX_REDIRECTS);
    }
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match check_literal_host(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

/// The target (or a redirect hop) points at a private, loopback or
/// link-local address.
#[derive(Error, Debug, Clone, Copy)]
#[error("URL resolves to a private or reserved address")]
pub struct BlockedHost;

/// Reject IP-literal hosts in private ranges. Hostnames are left to
/// `PublicOnlyResolver`, which sees the addresses actually connected to.
pub fn check_literal_host(url: &Url) -> Result<(), BlockedHost> {
    let ip = match url.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return Ok(()),
    };
    if is_private_ip(ip) {
        Err(BlockedHost)
    } else {
        Ok(())
    }
}

/// System resolver that refuses any name with a private, loopback or
/// link-local address among its results.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            // Port is a placeholder; the connector applies the URL's port.
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let addrs = public_addrs(addrs)?;
            Ok::<Addrs, Box<dyn std::error::Error + Send + Sync>>(Box::new(addrs.into_iter()))
        })
    }
}

/// All of `addrs`, or `BlockedHost` if any of them is private.
pub fn public_addrs(
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<Vec<SocketAddr>, BlockedHost> {
    let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
    if addrs.iter().any(|addr| is_private_ip(addr.ip())) {
        return Err(BlockedHost);
    }
    Ok(addrs)
}

fn caused_by_blocked_host(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<BlockedHost>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Parse and validate a target URL: absolute, http(s), with a host.
pub fn parse_target_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url.trim()).map_err(|_| FetchError::invalid_url("Invalid URL"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(FetchError::invalid_url(
                "Only http/https URLs are supported",
            ))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::invalid_url("URL has no host"));
    }

    Ok(parsed)
}

/// Returns `true` if `ip` is a private, loopback, or link-local address.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            matches!(
                o,
                [127, ..]
                    | [10, ..]
                    | [169, 254, ..]
                    | [192, 168, ..]
                    | [0, ..]
                    | [255, 255, 255, 255]
            ) || (o[0] == 172 && (16..=31).contains(&o[1]))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00 == 0xfc00)
                || (v6.segments()[0] & 0xffc0 == 0xfe80)
        }
    }
}
