//! Public types: the probe request, the result envelope, and per-probe payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolboxError;

/// Kind of diagnostic probe.
///
/// The set is closed: adding a probe means adding a variant here and an arm in
/// the dispatcher's `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    /// Forward DNS resolution for one record type.
    Dns,
    /// PTR lookup of an IP address.
    ReverseDns,
    /// TCP connect-and-close reachability check.
    TcpPort,
    /// First bytes a TCP service sends after connect.
    Banner,
    /// TLS certificate inspection.
    SslCert,
    /// Response status and headers of a HEAD request.
    HttpHeaders,
    /// Security header presence grading.
    SecurityHeaders,
    /// Redirect chain walk.
    RedirectTrace,
    /// DNSBL lookup across configured zones.
    Blacklist,
    /// Raw WHOIS referral query.
    Whois,
}

impl ProbeKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Dns,
        Self::ReverseDns,
        Self::TcpPort,
        Self::Banner,
        Self::SslCert,
        Self::HttpHeaders,
        Self::SecurityHeaders,
        Self::RedirectTrace,
        Self::Blacklist,
        Self::Whois,
    ];

    /// Canonical slug.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::ReverseDns => "reverse-dns",
            Self::TcpPort => "tcp-port",
            Self::Banner => "banner",
            Self::SslCert => "ssl-cert",
            Self::HttpHeaders => "http-headers",
            Self::SecurityHeaders => "security-headers",
            Self::RedirectTrace => "redirect-trace",
            Self::Blacklist => "blacklist",
            Self::Whois => "whois",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "dns" | "dns-lookup" => Ok(Self::Dns),
            "reverse-dns" | "ptr" | "rdns" => Ok(Self::ReverseDns),
            "tcp-port" | "tcp" | "port" => Ok(Self::TcpPort),
            "banner" => Ok(Self::Banner),
            "ssl-cert" | "ssl" | "tls" => Ok(Self::SslCert),
            "http-headers" | "headers" => Ok(Self::HttpHeaders),
            "security-headers" | "header-grade" => Ok(Self::SecurityHeaders),
            "redirect-trace" | "redirect" | "redirects" => Ok(Self::RedirectTrace),
            "blacklist" | "dnsbl" => Ok(Self::Blacklist),
            "whois" => Ok(Self::Whois),
            _ => Err(ToolboxError::ValidationError(format!(
                "Unknown probe kind: {s}"
            ))),
        }
    }
}

/// DNS record type for forward lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsQueryType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Canonical name (alias) record.
    Cname,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
    /// Name server record.
    Ns,
    /// Start of authority record.
    Soa,
    /// Service locator record.
    Srv,
    /// Certification authority authorization record.
    Caa,
}

impl DnsQueryType {
    /// Parse an optional, case-insensitive type name; anything unrecognised
    /// falls back to `A`.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or(Self::A)
    }
}

impl fmt::Display for DnsQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Cname => write!(f, "CNAME"),
            Self::Mx => write!(f, "MX"),
            Self::Txt => write!(f, "TXT"),
            Self::Ns => write!(f, "NS"),
            Self::Soa => write!(f, "SOA"),
            Self::Srv => write!(f, "SRV"),
            Self::Caa => write!(f, "CAA"),
        }
    }
}

impl FromStr for DnsQueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "CNAME" => Ok(Self::Cname),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            "NS" => Ok(Self::Ns),
            "SOA" => Ok(Self::Soa),
            "SRV" => Ok(Self::Srv),
            "CAA" => Ok(Self::Caa),
            _ => Err(format!("Unsupported DNS query type: {s}")),
        }
    }
}

/// Optional structured parameters of a probe request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeOptions {
    /// DNS record type (`A`, `MX`, ...). Defaults to `A`.
    pub record_type: Option<String>,
    /// Subdomain prefix for TXT lookups (e.g. `_dmarc`).
    pub prefix: Option<String>,
    /// Explicit port, overriding any port embedded in the target.
    pub port: Option<u16>,
}

/// One probe invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    pub kind: ProbeKind,
    pub target: String,
    #[serde(default)]
    pub options: ProbeOptions,
}

impl ProbeRequest {
    pub fn new(kind: ProbeKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            options: ProbeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ProbeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Coarse letter score, produced only by security header grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    F,
}

impl Grade {
    /// Map a 0..=100 score onto the letter scale.
    ///
    /// `A` is reserved for a full score: one missing header (80) is a `B`.
    pub const fn from_score(score: u8) -> Self {
        if score > 80 {
            Self::A
        } else if score >= 60 {
            Self::B
        } else {
            Self::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::F => write!(f, "F"),
        }
    }
}

/// The result envelope every probe produces.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeResult {
    Success {
        timestamp: DateTime<Utc>,
        data: ProbeData,
        #[serde(skip_serializing_if = "Option::is_none")]
        grade: Option<Grade>,
    },
    Error {
        timestamp: DateTime<Utc>,
        message: String,
    },
    /// A deadline expired. The message names which one.
    Timeout {
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl ProbeResult {
    pub fn success(data: ProbeData) -> Self {
        let grade = data.grade();
        Self::Success {
            timestamp: Utc::now(),
            data,
            grade,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// Status tag as serialized.
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Success { timestamp, .. }
            | Self::Error { timestamp, .. }
            | Self::Timeout { timestamp, .. } => *timestamp,
        }
    }

    pub const fn data(&self) -> Option<&ProbeData> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { message, .. } | Self::Timeout { message, .. } => Some(message),
        }
    }

    pub const fn grade(&self) -> Option<Grade> {
        match self {
            Self::Success { grade, .. } => *grade,
            _ => None,
        }
    }
}

impl From<Result<ProbeData, ToolboxError>> for ProbeResult {
    fn from(result: Result<ProbeData, ToolboxError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(ToolboxError::Timeout(message)) => Self::timeout(message),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Probe-specific payload carried by a successful envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProbeData {
    Dns(DnsLookupData),
    ReverseDns(ReverseDnsData),
    TcpPort(TcpPortData),
    Banner(BannerData),
    SslCert(SslCertData),
    HttpHeaders(HttpHeadersData),
    SecurityHeaders(SecurityHeadersData),
    RedirectTrace(RedirectTraceData),
    Blacklist(BlacklistData),
    Whois(WhoisData),
}

impl ProbeData {
    fn grade(&self) -> Option<Grade> {
        match self {
            Self::SecurityHeaders(d) => Some(d.grade),
            _ => None,
        }
    }
}

/// A single resolved DNS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    pub record_type: String,
    pub name: String,
    pub value: String,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsLookupData {
    /// Name actually queried (includes the TXT prefix, if any).
    pub name: String,
    pub record_type: String,
    pub records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseDnsData {
    pub ip: String,
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpPortData {
    pub status: PortStatus,
    pub host: String,
    pub port: u16,
    pub latency_ms: u64,
}

/// Whether the peer spoke before the banner deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerStatus {
    Received,
    /// Connected, no banner.
    Silent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerData {
    pub host: String,
    pub port: u16,
    pub status: BannerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertChainItem {
    pub subject: String,
    pub issuer: String,
    pub is_ca: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslCertData {
    pub host: String,
    pub port: u16,
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Whole days until `valid_to`, floored. Negative once expired.
    pub days_remaining: i64,
    /// Handshake trust verdict against the default root store.
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_error: Option<String>,
    pub san: Vec<String>,
    pub serial_number: String,
    pub signature_algorithm: String,
    pub chain: Vec<CertChainItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeadersData {
    pub url: String,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckOutcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeaderCheck {
    pub header: String,
    pub result: CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Remediation hint for a missing header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeadersData {
    pub url: String,
    pub status_code: u16,
    pub score: u8,
    /// Mirrored into the envelope's top-level `grade`.
    #[serde(skip)]
    pub grade: Grade,
    pub checks: Vec<SecurityHeaderCheck>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectTraceData {
    pub original_url: String,
    pub final_url: String,
    pub status_code: u16,
    pub hops: Vec<RedirectHop>,
}

/// Verdict of one DNSBL zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingStatus {
    Listed,
    /// The zone answered NXDOMAIN / no records.
    Clean,
    /// The lookup itself failed; nothing is known about the listing.
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneVerdict {
    pub zone: String,
    pub status: ListingStatus,
    /// Return codes (e.g. `127.0.0.2`) when listed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistData {
    pub ip: String,
    pub reversed: String,
    pub results: Vec<ZoneVerdict>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoisData {
    pub query: String,
    pub server: String,
    /// Authoritative server named by the referral response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<String>,
    pub raw: String,
    pub truncated: bool,
}
