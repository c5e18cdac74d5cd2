//! Network diagnostics engine.
//!
//! One entry point, [`ProbeEngine::run_probe`], runs a single probe (DNS,
//! reverse DNS, TCP reachability, banner grab, TLS certificate, HTTP headers,
//! security header grade, redirect trace, DNSBL blacklist or WHOIS) and
//! reports the outcome as a [`ProbeResult`] envelope. Probes never fail the
//! caller: faults, deadlines and panics all become envelopes.

mod config;
mod error;
mod services;
mod types;

pub use config::{EngineConfig, DEFAULT_BLACKLIST_ZONES, DEFAULT_WHOIS_SERVER};
pub use error::{ToolboxError, ToolboxResult};
pub use services::resolver::{HickoryResolver, LookupError, Resolver};
pub use services::socket::{
    bounded_session, BoxedStream, ByteStream, Dialer, SessionOutcome, TcpDialer,
};
pub use services::ProbeEngine;
pub use types::{
    BannerData, BannerStatus, BlacklistData, CertChainItem, CheckOutcome, DnsLookupData,
    DnsQueryType, DnsRecord, Grade, HttpHeadersData, ListingStatus, PortStatus, ProbeData,
    ProbeKind, ProbeOptions, ProbeRequest, ProbeResult, RedirectHop, RedirectTraceData,
    ReverseDnsData, SecurityHeaderCheck, SecurityHeadersData, SslCertData, TcpPortData,
    WhoisData, ZoneVerdict,
};
