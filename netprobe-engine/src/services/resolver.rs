//! DNS resolution seam shared by the DNS, reverse DNS and blacklist probes.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::rr::{Name, RData, Record, RecordType},
    ResolveError, TokioResolver,
};
use log::warn;
use thiserror::Error;

use crate::types::{DnsQueryType, DnsRecord};

/// Why a lookup produced no answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// NXDOMAIN or an empty answer section.
    #[error("{0}")]
    NotFound(String),
    /// SERVFAIL, refused, network error, malformed response...
    #[error("{0}")]
    Failed(String),
}

/// Record lookups used by the probes.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Forward lookup of `name` for one record type.
    async fn lookup(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<DnsRecord>, LookupError>;

    /// PTR lookup; returns hostnames without the trailing dot.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// [`Resolver`] backed by hickory.
pub struct HickoryResolver {
    inner: TokioResolver,
}

impl HickoryResolver {
    /// Use `nameserver` if given, otherwise the host system configuration.
    pub fn new(nameserver: Option<IpAddr>) -> Self {
        Self {
            inner: build_resolver_for_ns(nameserver),
        }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn lookup(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<DnsRecord>, LookupError> {
        let wanted = to_record_type(record_type);
        let response = self.inner.lookup(name, wanted).await.map_err(classify)?;

        let records: Vec<DnsRecord> = response
            .record_iter()
            .filter(|r| r.record_type() == wanted)
            .filter_map(|r| to_dns_record(name, r))
            .collect();

        if records.is_empty() {
            return Err(LookupError::NotFound(format!(
                "No {record_type} records found for {name}"
            )));
        }
        Ok(records)
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        let response = self.inner.reverse_lookup(ip).await.map_err(classify)?;
        Ok(response.iter().map(|ptr| trim_name(&ptr.0)).collect())
    }
}

fn classify(e: ResolveError) -> LookupError {
    if e.is_no_records_found() || e.is_nx_domain() {
        LookupError::NotFound(e.to_string())
    } else {
        LookupError::Failed(e.to_string())
    }
}

const fn to_record_type(record_type: DnsQueryType) -> RecordType {
    match record_type {
        DnsQueryType::A => RecordType::A,
        DnsQueryType::Aaaa => RecordType::AAAA,
        DnsQueryType::Cname => RecordType::CNAME,
        DnsQueryType::Mx => RecordType::MX,
        DnsQueryType::Txt => RecordType::TXT,
        DnsQueryType::Ns => RecordType::NS,
        DnsQueryType::Soa => RecordType::SOA,
        DnsQueryType::Srv => RecordType::SRV,
        DnsQueryType::Caa => RecordType::CAA,
    }
}

fn trim_name(name: &Name) -> String {
    name.to_string().trim_end_matches('.').to_string()
}

/// Render one answer record the way dig users expect to read it.
fn to_dns_record(queried: &str, record: &Record) -> Option<DnsRecord> {
    let (record_type, value, priority) = match record.data() {
        RData::A(a) => ("A", a.to_string(), None),
        RData::AAAA(aaaa) => ("AAAA", aaaa.to_string(), None),
        RData::CNAME(cname) => ("CNAME", trim_name(&cname.0), None),
        RData::MX(mx) => ("MX", trim_name(mx.exchange()), Some(mx.preference())),
        RData::NS(ns) => ("NS", trim_name(&ns.0), None),
        RData::TXT(txt) => (
            "TXT",
            txt.iter()
                .map(|data| String::from_utf8_lossy(data).to_string())
                .collect::<String>(),
            None,
        ),
        RData::SOA(soa) => (
            "SOA",
            format!(
                "{} {} {} {} {} {} {}",
                trim_name(soa.mname()),
                trim_name(soa.rname()),
                soa.serial(),
                soa.refresh(),
                soa.retry(),
                soa.expire(),
                soa.minimum()
            ),
            None,
        ),
        RData::SRV(srv) => (
            "SRV",
            format!(
                "{} {} {}",
                srv.weight(),
                srv.port(),
                trim_name(srv.target())
            ),
            Some(srv.priority()),
        ),
        RData::CAA(caa) => (
            "CAA",
            format!(
                "{} {} \"{}\"",
                if caa.issuer_critical() { 128 } else { 0 },
                caa.tag().as_str(),
                String::from_utf8_lossy(caa.raw_value())
            ),
            None,
        ),
        _ => return None,
    };

    Some(DnsRecord {
        record_type: record_type.to_string(),
        name: queried.to_string(),
        value,
        ttl: record.ttl(),
        priority,
    })
}

/// Answers are never cached; every probe asks the nameserver again.
fn uncached_options() -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.cache_size = 0;
    opts
}

/// Build a resolver that targets a specific nameserver IP, or falls back to the
/// system configuration when `ns_ip` is `None`.
fn build_resolver_for_ns(ns_ip: Option<IpAddr>) -> TokioResolver {
    match ns_ip {
        Some(ns_ip) => build_resolver_for_addr(SocketAddr::new(ns_ip, 53)),
        None => build_system_resolver(),
    }
}

fn build_resolver_for_addr(addr: SocketAddr) -> TokioResolver {
    let config = ResolverConfig::from_parts(
        None,
        vec![],
        NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true),
    );
    TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
        .with_options(uncached_options())
        .build()
}

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver() -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(mut builder) => {
                builder.options_mut().cache_size = 0;
                return builder.build();
            }
            Err(e) => {
                warn!(
                    "[DNS] Failed to load system DNS configuration, falling back to defaults: {e}"
                );
            }
        }
    }

    TokioResolver::builder_with_config(
        ResolverConfig::default(),
        TokioConnectionProvider::default(),
    )
    .with_options(uncached_options())
    .build()
}
