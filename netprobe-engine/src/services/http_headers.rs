//! HTTP header inspection, security header grading and redirect tracing.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::time::timeout;
use url::Url;

use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{
    CheckOutcome, Grade, HttpHeadersData, RedirectHop, RedirectTraceData, SecurityHeaderCheck,
    SecurityHeadersData,
};

const USER_AGENT: &str = concat!("netprobe/", env!("CARGO_PKG_VERSION"));

/// Redirects followed by the header fetch and the grading request.
const FOLLOW_LIMIT: usize = 5;

/// Required security headers. Each missing one costs 20 points.
const REQUIRED_SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
];

fn build_client(request_timeout: Duration, policy: Policy) -> ToolboxResult<Client> {
    Client::builder()
        .timeout(request_timeout)
        .redirect(policy)
        .user_agent(USER_AGENT)
        .no_proxy()
        .build()
        .map_err(|e| ToolboxError::Internal(format!("HTTP client setup failed: {e}")))
}

/// Ensure the URL includes a scheme; default to https://
fn normalize_url(target: &str) -> ToolboxResult<Url> {
    let target = target.trim();
    let lower = target.to_ascii_lowercase();
    let url = if lower.starts_with("http://") || lower.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{target}")
    };
    Url::parse(&url)
        .map_err(|e| ToolboxError::ValidationError(format!("Invalid URL: {target} ({e})")))
}

fn request_error(e: &reqwest::Error, request_timeout: Duration) -> ToolboxError {
    if e.is_timeout() {
        ToolboxError::Timeout(format!("HTTP request timed out ({request_timeout:?})"))
    } else {
        ToolboxError::NetworkError(format!("HTTP request failed: {e}"))
    }
}

/// Bound a whole probe (all hops included) by the HTTP deadline.
async fn within<T>(
    deadline: Duration,
    probe: impl Future<Output = ToolboxResult<T>>,
) -> ToolboxResult<T> {
    timeout(deadline, probe).await.map_err(|_| {
        warn!("[HTTP] Probe timed out ({deadline:?})");
        ToolboxError::Timeout(format!("HTTP request timed out ({deadline:?})"))
    })?
}

/// Lowercase names; repeated headers are joined with `", "`.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    collected
}

/// HEAD `url` following redirects; returns the final status and headers.
async fn head_following(
    url: &Url,
    request_timeout: Duration,
) -> ToolboxResult<(u16, BTreeMap<String, String>)> {
    let client = build_client(request_timeout, Policy::limited(FOLLOW_LIMIT))?;
    let start = Instant::now();
    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| request_error(&e, request_timeout))?;
    let status_code = response.status().as_u16();
    let headers = collect_headers(response.headers());
    debug!(
        "[HTTP] HEAD {url} -> {status_code}, headers={}, time={:?}",
        headers.len(),
        start.elapsed()
    );
    Ok((status_code, headers))
}

/// Response status and headers of a HEAD request.
pub async fn header_fetch(target: &str, deadline: Duration) -> ToolboxResult<HttpHeadersData> {
    let url = normalize_url(target)?;
    within(deadline, async {
        let (status_code, headers) = head_following(&url, deadline).await?;
        Ok(HttpHeadersData {
            url: url.to_string(),
            status_code,
            headers,
        })
    })
    .await
}

/// Grade the presence of the required security headers.
pub async fn security_grade(
    target: &str,
    deadline: Duration,
) -> ToolboxResult<SecurityHeadersData> {
    let url = normalize_url(target)?;
    within(deadline, async {
        let (status_code, headers) = head_following(&url, deadline).await?;
        let (score, grade, checks) = grade_headers(&headers);
        debug!("[HTTP] {url} security score {score} ({grade})");
        Ok(SecurityHeadersData {
            url: url.to_string(),
            status_code,
            score,
            grade,
            checks,
        })
    })
    .await
}

/// Score `100 - 20 * missing` over [`REQUIRED_SECURITY_HEADERS`].
fn grade_headers(headers: &BTreeMap<String, String>) -> (u8, Grade, Vec<SecurityHeaderCheck>) {
    let checks: Vec<SecurityHeaderCheck> = REQUIRED_SECURITY_HEADERS
        .iter()
        .map(|&header| {
            let value = headers.get(header).cloned();
            SecurityHeaderCheck {
                header: header.to_string(),
                result: if value.is_some() {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail
                },
                recommendation: value.is_none().then(|| get_recommendation(header)),
                value,
            }
        })
        .collect();

    let score = checks
        .iter()
        .filter(|c| c.result == CheckOutcome::Fail)
        .fold(100u8, |score, _| score.saturating_sub(20));
    (score, Grade::from_score(score), checks)
}

/// Return a human-readable recommendation for a missing security header.
fn get_recommendation(header_name: &str) -> String {
    match header_name {
        "strict-transport-security" => "Add HSTS header to enforce HTTPS connections".to_string(),
        "x-frame-options" => "Add to prevent clickjacking attacks".to_string(),
        "x-content-type-options" => "Set to 'nosniff' to prevent MIME type sniffing".to_string(),
        "content-security-policy" => "Add CSP header to prevent XSS attacks".to_string(),
        _ => "Consider adding this security header".to_string(),
    }
}

/// Walk the redirect chain one HEAD request at a time.
pub async fn redirect_trace(
    target: &str,
    deadline: Duration,
    hop_limit: usize,
) -> ToolboxResult<RedirectTraceData> {
    let original = normalize_url(target)?;
    within(deadline, async {
        let client = build_client(deadline, Policy::none())?;
        let mut current = original.clone();
        let mut hops = Vec::new();

        loop {
            let response = client
                .head(current.clone())
                .send()
                .await
                .map_err(|e| request_error(&e, deadline))?;
            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let Some(location) = location.filter(|_| status.is_redirection()) else {
                debug!(
                    "[HTTP] {original} settled at {current} ({}) after {} hop(s)",
                    status.as_u16(),
                    hops.len()
                );
                return Ok(RedirectTraceData {
                    original_url: original.to_string(),
                    final_url: current.to_string(),
                    status_code: status.as_u16(),
                    hops,
                });
            };

            if hops.len() >= hop_limit {
                warn!("[HTTP] {original}: more than {hop_limit} redirects");
                return Err(ToolboxError::NetworkError("Too many redirects".to_string()));
            }
            let next = current.join(&location).map_err(|e| {
                ToolboxError::NetworkError(format!("Invalid redirect location {location}: {e}"))
            })?;
            trace!("[HTTP] {current} -> {} {next}", status.as_u16());
            hops.push(RedirectHop {
                url: current.to_string(),
                status_code: status.as_u16(),
                location: Some(location),
            });
            current = next;
        }
    })
    .await
}
