//! DNS lookup module

use std::net::IpAddr;
use std::time::Duration;

use log::debug;
use tokio::time::timeout;

use super::resolver::Resolver;
use super::validate_domain;
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{DnsLookupData, DnsQueryType, ProbeOptions, ReverseDnsData};

/// Forward DNS lookup
pub async fn dns_lookup(
    resolver: &dyn Resolver,
    target: &str,
    options: &ProbeOptions,
    deadline: Duration,
) -> ToolboxResult<DnsLookupData> {
    let domain = validate_domain(target)?;
    let record_type = DnsQueryType::parse_or_default(options.record_type.as_deref());
    let name = query_name(&domain, record_type, options.prefix.as_deref());

    debug!("[DNS] Looking up {record_type} records for {name}");
    let records = timeout(deadline, resolver.lookup(&name, record_type))
        .await
        .map_err(|_| ToolboxError::Timeout(format!("DNS lookup timed out ({deadline:?})")))?
        .map_err(|e| ToolboxError::NetworkError(format!("DNS lookup failed: {e}")))?;

    Ok(DnsLookupData {
        name,
        record_type: record_type.to_string(),
        records,
    })
}

/// Reverse (PTR) lookup
pub async fn reverse_lookup(
    resolver: &dyn Resolver,
    target: &str,
    deadline: Duration,
) -> ToolboxResult<ReverseDnsData> {
    let ip: IpAddr = target.trim().parse().map_err(|_| {
        ToolboxError::ValidationError(format!("Reverse DNS requires an IP address: {target}"))
    })?;

    debug!("[DNS] Reverse lookup for {ip}");
    let hostnames = timeout(deadline, resolver.reverse(ip))
        .await
        .map_err(|_| ToolboxError::Timeout(format!("DNS lookup timed out ({deadline:?})")))?
        .map_err(|e| ToolboxError::NetworkError(format!("Reverse lookup failed: {e}")))?;

    Ok(ReverseDnsData {
        ip: ip.to_string(),
        hostnames,
    })
}

/// TXT lookups may be redirected to a subdomain (`_dmarc.example.com`).
fn query_name(domain: &str, record_type: DnsQueryType, prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim().trim_matches('.')) {
        Some(prefix) if record_type == DnsQueryType::Txt && !prefix.is_empty() => {
            format!("{prefix}.{domain}")
        }
        _ => domain.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::super::test_mocks::FakeResolver;
    use super::*;
    use crate::services::resolver::LookupError;
    use crate::types::DnsRecord;

    fn txt(name: &str, value: &str) -> DnsRecord {
        DnsRecord {
            record_type: "TXT".to_string(),
            name: name.to_string(),
            value: value.to_string(),
            ttl: 300,
            priority: None,
        }
    }

    #[test]
    fn test_query_name_prefix_only_for_txt() {
        assert_eq!(
            query_name("example.com", DnsQueryType::Txt, Some("_dmarc")),
            "_dmarc.example.com"
        );
        assert_eq!(
            query_name("example.com", DnsQueryType::Mx, Some("_dmarc")),
            "example.com"
        );
        assert_eq!(query_name("example.com", DnsQueryType::Txt, Some(" ")), "example.com");
        assert_eq!(query_name("example.com", DnsQueryType::Txt, None), "example.com");
    }

    #[tokio::test]
    async fn test_dns_lookup_txt_with_prefix() {
        let resolver = FakeResolver::new().answer(
            "_dmarc.example.com",
            DnsQueryType::Txt,
            vec![txt("_dmarc.example.com", "v=DMARC1; p=reject")],
        );
        let options = ProbeOptions {
            record_type: Some("txt".to_string()),
            prefix: Some("_dmarc".to_string()),
            port: None,
        };
        let data = dns_lookup(&resolver, "example.com", &options, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(data.name, "_dmarc.example.com");
        assert_eq!(data.record_type, "TXT");
        assert_eq!(data.records[0].value, "v=DMARC1; p=reject");
    }

    #[tokio::test]
    async fn test_dns_lookup_unknown_type_defaults_to_a() {
        let resolver = FakeResolver::new().answer(
            "example.com",
            DnsQueryType::A,
            vec![DnsRecord {
                record_type: "A".to_string(),
                name: "example.com".to_string(),
                value: "93.184.216.34".to_string(),
                ttl: 60,
                priority: None,
            }],
        );
        let options = ProbeOptions {
            record_type: Some("bogus".to_string()),
            ..ProbeOptions::default()
        };
        let data = dns_lookup(&resolver, "example.com", &options, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(data.record_type, "A");
        assert_eq!(data.records.len(), 1);
    }

    #[tokio::test]
    async fn test_dns_lookup_resolver_failure_is_network_error() {
        let resolver = FakeResolver::new().fail(
            "example.com",
            DnsQueryType::Mx,
            LookupError::Failed("SERVFAIL".to_string()),
        );
        let options = ProbeOptions {
            record_type: Some("MX".to_string()),
            ..ProbeOptions::default()
        };
        let err = dns_lookup(&resolver, "example.com", &options, Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            ToolboxError::NetworkError(msg) => assert!(msg.contains("SERVFAIL")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_lookup_deadline() {
        let resolver = FakeResolver::new().stalled();
        let err = dns_lookup(
            &resolver,
            "example.com",
            &ProbeOptions::default(),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolboxError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_reverse_lookup_requires_ip() {
        let resolver = Arc::new(FakeResolver::new());
        let err = reverse_lookup(resolver.as_ref(), "example.com", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolboxError::ValidationError(_)));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_reverse_lookup_hostnames() {
        let resolver = FakeResolver::new().ptr("8.8.8.8".parse().unwrap(), vec!["dns.google"]);
        let data = reverse_lookup(&resolver, " 8.8.8.8 ", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(data.ip, "8.8.8.8");
        assert_eq!(data.hostnames, vec!["dns.google"]);
    }
}
