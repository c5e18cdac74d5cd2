//! Engine configuration: per-probe deadlines and fixed endpoints.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default DNSBL zones queried by the blacklist probe.
pub const DEFAULT_BLACKLIST_ZONES: &[&str] = &["zen.spamhaus.org", "bl.spamcop.net"];

/// IANA referral WHOIS server.
pub const DEFAULT_WHOIS_SERVER: &str = "whois.iana.org";

/// Immutable settings shared by every probe invocation.
///
/// Missing fields fall back to [`EngineConfig::default`], so a partial TOML or
/// JSON document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dns_timeout_ms: u64,
    pub tcp_timeout_ms: u64,
    pub banner_timeout_ms: u64,
    pub tls_timeout_ms: u64,
    pub whois_timeout_ms: u64,
    pub http_timeout_ms: u64,
    /// Upper bound of the single read the banner probe performs.
    pub banner_max_bytes: usize,
    pub whois_server: String,
    /// WHOIS responses are cut off after this many bytes.
    pub whois_max_bytes: usize,
    pub redirect_hop_limit: usize,
    pub blacklist_zones: Vec<String>,
    /// Query this nameserver instead of the system resolver.
    pub nameserver: Option<IpAddr>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 2_000,
            tcp_timeout_ms: 2_000,
            banner_timeout_ms: 3_000,
            tls_timeout_ms: 5_000,
            whois_timeout_ms: 5_000,
            http_timeout_ms: 10_000,
            banner_max_bytes: 1024,
            whois_server: DEFAULT_WHOIS_SERVER.to_string(),
            whois_max_bytes: 16 * 1024,
            redirect_hop_limit: 10,
            blacklist_zones: DEFAULT_BLACKLIST_ZONES
                .iter()
                .map(ToString::to_string)
                .collect(),
            nameserver: None,
        }
    }
}

impl EngineConfig {
    pub const fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub const fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub const fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    pub const fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }

    pub const fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }

    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}
