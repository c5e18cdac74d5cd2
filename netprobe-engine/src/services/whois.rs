//! WHOIS lookup module.
//!
//! Sends one query to the configured server over port 43 and returns the raw
//! answer. Delegation is not followed; the referral the server names is
//! reported so the caller can query it next.

use std::time::Duration;

use log::{debug, warn};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::socket::{bounded_session, Dialer, SessionOutcome};
use super::{parse_host_port, validate_domain};
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::WhoisData;

const WHOIS_PORT: u16 = 43;

pub async fn whois_query(
    dialer: &dyn Dialer,
    target: &str,
    server: &str,
    deadline: Duration,
    max_bytes: usize,
) -> ToolboxResult<WhoisData> {
    let query = validate_domain(target)?;
    let (host, port) = parse_host_port(server, None, WHOIS_PORT)?;

    debug!("[WHOIS] Querying {host}:{port} for {query}");
    let request = format!("{query}\r\n");
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let outcome = bounded_session(deadline, dialer.dial(&host, port), |mut stream| async move {
        stream.write_all(request.as_bytes()).await?;
        // One byte past the cap tells us whether anything was cut off.
        let mut buf = Vec::new();
        (&mut stream)
            .take(limit)
            .read_to_end(&mut buf)
            .await?;
        Ok(buf)
    })
    .await;

    let mut bytes = match outcome {
        SessionOutcome::Completed(bytes) => bytes,
        SessionOutcome::Failed(e) => {
            warn!("[WHOIS] {host}:{port} failed: {e}");
            return Err(ToolboxError::NetworkError(format!("WHOIS query failed: {e}")));
        }
        SessionOutcome::TimedOut { .. } => {
            warn!("[WHOIS] {host}:{port} timed out ({deadline:?})");
            return Err(ToolboxError::Timeout("WHOIS timeout".to_string()));
        }
    };

    let truncated = bytes.len() > max_bytes;
    bytes.truncate(max_bytes);
    let raw = String::from_utf8_lossy(&bytes).into_owned();
    let referral = extract_field(&raw, &[r"(?im)^\s*refer:\s*(\S+)", r"(?im)^\s*whois:\s*(\S+)"]);

    debug!(
        "[WHOIS] {query}: {} bytes, truncated={truncated}, referral={referral:?}",
        raw.len()
    );
    Ok(WhoisData {
        query,
        server: host,
        referral,
        raw,
        truncated,
    })
}

/// Try multiple regex patterns and return the first match.
fn extract_field(text: &str, patterns: &[&str]) -> Option<String> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
        })
}
