//! Banner grabbing: connect, optionally nudge HTTP services, keep the first chunk.

use std::net::Ipv6Addr;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::parse_host_port;
use super::socket::{bounded_session, Dialer, SessionOutcome};
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{BannerData, BannerStatus, ProbeOptions};

/// Ports that get a HEAD request instead of waiting passively.
const HTTP_PORTS: &[u16] = &[80, 8000, 8008, 8080, 8888];

const DEFAULT_BANNER_PORT: u16 = 80;

pub async fn grab_banner(
    dialer: &dyn Dialer,
    target: &str,
    options: &ProbeOptions,
    deadline: Duration,
    max_bytes: usize,
) -> ToolboxResult<BannerData> {
    let (host, port) = parse_host_port(target, options.port, DEFAULT_BANNER_PORT)?;
    let nudge = HTTP_PORTS.contains(&port).then(|| {
        format!(
            "HEAD / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            host_header(&host, port)
        )
    });
    let max_bytes = max_bytes.max(1);

    debug!("[Banner] Connecting to {host}:{port}");
    let outcome = bounded_session(deadline, dialer.dial(&host, port), |mut stream| async move {
        if let Some(nudge) = nudge {
            trace!("[Banner] Sending HTTP nudge");
            stream.write_all(nudge.as_bytes()).await?;
        }
        // First data event only.
        let mut buf = vec![0u8; max_bytes];
        let n = stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    })
    .await;

    let silent = |host: String| BannerData {
        host,
        port,
        status: BannerStatus::Silent,
        banner: None,
    };

    match outcome {
        SessionOutcome::Completed(bytes) if bytes.is_empty() => {
            debug!("[Banner] {host}:{port} closed without sending data");
            Ok(silent(host))
        }
        SessionOutcome::Completed(bytes) => {
            debug!("[Banner] {host}:{port} sent {} bytes", bytes.len());
            Ok(BannerData {
                host,
                port,
                status: BannerStatus::Received,
                banner: Some(render_banner(&bytes)),
            })
        }
        SessionOutcome::TimedOut { connected: true } => {
            debug!("[Banner] {host}:{port} connected, no banner before deadline");
            Ok(silent(host))
        }
        SessionOutcome::TimedOut { connected: false } => {
            warn!("[Banner] Connection to {host}:{port} timed out ({deadline:?})");
            Err(ToolboxError::Timeout("Connection timed out".to_string()))
        }
        SessionOutcome::Failed(e) => {
            warn!("[Banner] {host}:{port} failed: {e}");
            Err(ToolboxError::NetworkError(format!("Connection failed: {e}")))
        }
    }
}

/// `Host` header value; IPv6 literals are bracketed, port 80 is implied.
fn host_header(host: &str, port: u16) -> String {
    let host = if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    if port == 80 {
        host
    } else {
        format!("{host}:{port}")
    }
}

/// Lossy UTF-8 with control characters (other than CR, LF, TAB) masked.
fn render_banner(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\r' | '\n' | '\t') {
                '.'
            } else {
                c
            }
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}
