//! TCP reachability probe: connect, measure, close.

use std::time::{Duration, Instant};

use log::{debug, warn};

use super::parse_host_port;
use super::socket::{bounded_session, Dialer, SessionOutcome};
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{PortStatus, ProbeOptions, TcpPortData};

/// Port used when neither the target nor the options name one.
pub const DEFAULT_TCP_PORT: u16 = 80;

pub async fn tcp_check(
    dialer: &dyn Dialer,
    target: &str,
    options: &ProbeOptions,
    deadline: Duration,
) -> ToolboxResult<TcpPortData> {
    let (host, port) = parse_host_port(target, options.port, DEFAULT_TCP_PORT)?;

    debug!("[TCP] Connecting to {host}:{port}");
    let start = Instant::now();
    let outcome = bounded_session(deadline, dialer.dial(&host, port), |stream| async move {
        let latency = start.elapsed();
        drop(stream);
        Ok(latency)
    })
    .await;

    match outcome {
        SessionOutcome::Completed(latency) => {
            debug!("[TCP] {host}:{port} open, took {latency:?}");
            Ok(TcpPortData {
                status: PortStatus::Open,
                host,
                port,
                latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            })
        }
        SessionOutcome::Failed(e) => {
            warn!("[TCP] Connection to {host}:{port} failed: {e}");
            Err(ToolboxError::NetworkError(format!("Connection failed: {e}")))
        }
        SessionOutcome::TimedOut { .. } => {
            warn!("[TCP] Connection to {host}:{port} timed out ({deadline:?})");
            Err(ToolboxError::Timeout("Connection timed out".to_string()))
        }
    }
}
