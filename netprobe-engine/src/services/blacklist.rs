//! DNSBL lookup: one A query per configured zone, run concurrently.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use tokio::time::timeout;

use super::resolver::{LookupError, Resolver};
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{BlacklistData, DnsQueryType, ListingStatus, ZoneVerdict};

pub async fn blacklist_check(
    resolver: &dyn Resolver,
    target: &str,
    zones: &[String],
    deadline: Duration,
) -> ToolboxResult<BlacklistData> {
    let ip: Ipv4Addr = target.trim().parse().map_err(|_| {
        ToolboxError::ValidationError("Blacklist lookup requires an IPv4 address".to_string())
    })?;
    let reversed = reverse_ipv4(ip);

    debug!("[DNSBL] Checking {ip} against {} zone(s)", zones.len());
    // join_all keeps input order, so verdicts line up with `zones`.
    let results = join_all(
        zones
            .iter()
            .map(|zone| check_zone(resolver, &reversed, zone, deadline)),
    )
    .await;

    let listed = results
        .iter()
        .filter(|r| r.status == ListingStatus::Listed)
        .count();
    debug!("[DNSBL] {ip}: listed in {listed}/{}", results.len());

    Ok(BlacklistData {
        ip: ip.to_string(),
        reversed,
        results,
    })
}

async fn check_zone(
    resolver: &dyn Resolver,
    reversed: &str,
    zone: &str,
    deadline: Duration,
) -> ZoneVerdict {
    let query = format!("{reversed}.{zone}");
    let verdict = |status, response, error| ZoneVerdict {
        zone: zone.to_string(),
        status,
        response,
        error,
    };

    match timeout(deadline, resolver.lookup(&query, DnsQueryType::A)).await {
        Ok(Ok(records)) if !records.is_empty() => verdict(
            ListingStatus::Listed,
            records.into_iter().map(|r| r.value).collect(),
            None,
        ),
        Ok(Ok(_) | Err(LookupError::NotFound(_))) => {
            verdict(ListingStatus::Clean, Vec::new(), None)
        }
        Ok(Err(LookupError::Failed(e))) => {
            warn!("[DNSBL] {query} failed: {e}");
            verdict(ListingStatus::Unknown, Vec::new(), Some(e))
        }
        Err(_) => {
            warn!("[DNSBL] {query} timed out ({deadline:?})");
            verdict(
                ListingStatus::Unknown,
                Vec::new(),
                Some("DNS lookup timed out".to_string()),
            )
        }
    }
}

/// `1.2.3.4` -> `4.3.2.1`
fn reverse_ipv4(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}")
}
