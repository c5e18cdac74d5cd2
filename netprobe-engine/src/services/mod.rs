//! Probe dispatcher and the shared input helpers every probe relies on.

mod banner;
mod blacklist;
mod dns;
mod http_headers;
pub mod resolver;
pub mod socket;
#[cfg(feature = "rustls")]
mod ssl;
mod tcp;
#[cfg(test)]
mod test_mocks;
mod whois;

use std::any::Any;
use std::net::Ipv6Addr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{ProbeData, ProbeKind, ProbeOptions, ProbeRequest, ProbeResult};
use resolver::{HickoryResolver, Resolver};
use socket::{Dialer, TcpDialer};

/// Validate and normalise a domain name or IP address input.
///
/// Trims whitespace, passes through valid IP addresses unchanged, converts
/// internationalised domain names (IDN) to ASCII via IDNA 2008, and rejects
/// empty or overlong inputs.
fn validate_domain(domain: &str) -> ToolboxResult<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(ToolboxError::ValidationError(
            "Domain name is required".to_string(),
        ));
    }
    if domain.parse::<std::net::IpAddr>().is_ok() {
        return Ok(domain.to_string());
    }
    let ascii_domain = idna::domain_to_ascii_strict(domain)
        .map_err(|_| ToolboxError::ValidationError(format!("Invalid domain name: {domain}")))?;
    if ascii_domain.len() > 253 {
        return Err(ToolboxError::ValidationError(format!(
            "Domain name exceeds maximum length of 253 characters (got {})",
            ascii_domain.len()
        )));
    }
    Ok(ascii_domain)
}

/// Split `host`, `host:port`, `[v6]:port` or a bare IPv6 address into a
/// validated host and a port.
///
/// `explicit` (the caller's `port` option) wins over a port embedded in the
/// target; `default_port` applies when neither is given.
fn parse_host_port(
    target: &str,
    explicit: Option<u16>,
    default_port: u16,
) -> ToolboxResult<(String, u16)> {
    let target = target.trim();
    let (host, embedded) = split_host_port(target)?;
    if host.is_empty() {
        return Err(ToolboxError::ValidationError(format!(
            "Missing host in target: {target}"
        )));
    }
    let port = explicit.or(embedded).unwrap_or(default_port);
    if port == 0 {
        return Err(ToolboxError::ValidationError("Invalid port: 0".to_string()));
    }
    Ok((validate_domain(host)?, port))
}

fn split_host_port(target: &str) -> ToolboxResult<(&str, Option<u16>)> {
    let invalid_port =
        |port: &str| ToolboxError::ValidationError(format!("Invalid port: {port}"));

    if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| {
            ToolboxError::ValidationError(format!("Invalid address: {target}"))
        })?;
        if after.is_empty() {
            return Ok((host, None));
        }
        let port = after.strip_prefix(':').ok_or_else(|| invalid_port(after))?;
        return port
            .parse()
            .map(|p| (host, Some(p)))
            .map_err(|_| invalid_port(port));
    }
    if target.parse::<Ipv6Addr>().is_ok() {
        return Ok((target, None));
    }
    match target.rsplit_once(':') {
        Some((host, port)) => port
            .parse()
            .map(|p| (host, Some(p)))
            .map_err(|_| invalid_port(port)),
        None => Ok((target, None)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "probe panicked".to_string())
}

/// Entry point for all network diagnostic probes.
///
/// Holds only immutable configuration and the network seams, so one engine can
/// serve any number of concurrent requests.
///
/// ```rust,no_run
/// use netprobe_engine::{EngineConfig, ProbeEngine, ProbeOptions};
/// # async fn demo() {
/// let engine = ProbeEngine::new(EngineConfig::default());
/// let result = engine.run_probe("dns", "example.com", &ProbeOptions::default()).await;
/// println!("{}", result.status());
/// # }
/// ```
#[derive(Clone)]
pub struct ProbeEngine {
    config: Arc<EngineConfig>,
    dialer: Arc<dyn Dialer>,
    resolver: Arc<dyn Resolver>,
}

impl Default for ProbeEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ProbeEngine {
    /// Engine with plain TCP sockets and a hickory resolver (the configured
    /// nameserver, or the system one).
    pub fn new(config: EngineConfig) -> Self {
        let resolver = HickoryResolver::new(config.nameserver);
        Self {
            config: Arc::new(config),
            dialer: Arc::new(TcpDialer),
            resolver: Arc::new(resolver),
        }
    }

    /// Replace the socket seam used by the TCP, banner, TLS and WHOIS probes.
    #[must_use]
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replace the resolver used by the DNS, reverse DNS and blacklist probes.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the probe named by `kind` (canonical slug or alias) against `target`.
    ///
    /// Never fails: every outcome, including unknown kinds and panics inside a
    /// probe, is reported through the envelope.
    pub async fn run_probe(&self, kind: &str, target: &str, options: &ProbeOptions) -> ProbeResult {
        match kind.parse::<ProbeKind>() {
            Ok(kind) => self.execute(kind, target, options).await,
            Err(e) => {
                debug!("[Engine] Rejected probe kind {kind:?}");
                ProbeResult::error(e.to_string())
            }
        }
    }

    /// Run a request whose kind is already parsed.
    pub async fn run(&self, request: &ProbeRequest) -> ProbeResult {
        self.execute(request.kind, &request.target, &request.options)
            .await
    }

    async fn execute(&self, kind: ProbeKind, target: &str, options: &ProbeOptions) -> ProbeResult {
        let target = target.trim();
        if target.is_empty() {
            debug!("[Engine] {kind}: empty target");
            return ProbeResult::error("Input required");
        }

        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.dispatch(kind, target, options))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!("[Engine] {kind} probe for {target} panicked: {message}");
                Err(ToolboxError::Internal(message))
            });
        let result = ProbeResult::from(outcome);

        debug!(
            "[Engine] {kind} {target} -> {} in {:?}",
            result.status(),
            start.elapsed()
        );
        result
    }

    async fn dispatch(
        &self,
        kind: ProbeKind,
        target: &str,
        options: &ProbeOptions,
    ) -> ToolboxResult<ProbeData> {
        let config = self.config.as_ref();
        let dialer = self.dialer.as_ref();
        let resolver = self.resolver.as_ref();

        match kind {
            ProbeKind::Dns => dns::dns_lookup(resolver, target, options, config.dns_timeout())
                .await
                .map(ProbeData::Dns),
            ProbeKind::ReverseDns => dns::reverse_lookup(resolver, target, config.dns_timeout())
                .await
                .map(ProbeData::ReverseDns),
            ProbeKind::TcpPort => tcp::tcp_check(dialer, target, options, config.tcp_timeout())
                .await
                .map(ProbeData::TcpPort),
            ProbeKind::Banner => banner::grab_banner(
                dialer,
                target,
                options,
                config.banner_timeout(),
                config.banner_max_bytes,
            )
            .await
            .map(ProbeData::Banner),
            #[cfg(feature = "rustls")]
            ProbeKind::SslCert => ssl::ssl_check(dialer, target, options, config.tls_timeout())
                .await
                .map(ProbeData::SslCert),
            #[cfg(not(feature = "rustls"))]
            ProbeKind::SslCert => Err(ToolboxError::ValidationError(
                "TLS certificate probe is not available in this build".to_string(),
            )),
            ProbeKind::HttpHeaders => http_headers::header_fetch(target, config.http_timeout())
                .await
                .map(ProbeData::HttpHeaders),
            ProbeKind::SecurityHeaders => {
                http_headers::security_grade(target, config.http_timeout())
                    .await
                    .map(ProbeData::SecurityHeaders)
            }
            ProbeKind::RedirectTrace => http_headers::redirect_trace(
                target,
                config.http_timeout(),
                config.redirect_hop_limit,
            )
            .await
            .map(ProbeData::RedirectTrace),
            ProbeKind::Blacklist => blacklist::blacklist_check(
                resolver,
                target,
                &config.blacklist_zones,
                config.dns_timeout(),
            )
            .await
            .map(ProbeData::Blacklist),
            ProbeKind::Whois => whois::whois_query(
                dialer,
                target,
                &config.whois_server,
                config.whois_timeout(),
                config.whois_max_bytes,
            )
            .await
            .map(ProbeData::Whois),
        }
    }
}
