//! SSL/TLS certificate inspection module.
//!
//! The handshake runs through rustls with a verifier that records the webpki
//! verdict instead of enforcing it, so untrusted or expired certificates are
//! still inspected and reported as `authorized = false`.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use super::parse_host_port;
use super::socket::{bounded_session, Dialer, SessionOutcome};
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{CertChainItem, ProbeOptions, SslCertData};

const DEFAULT_TLS_PORT: u16 = 443;

/// Delegates to webpki and keeps its verdict, but lets every handshake proceed.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    verdict: OnceLock<Option<String>>,
}

impl RecordingVerifier {
    fn new(provider: Arc<CryptoProvider>) -> ToolboxResult<Self> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(root_store), provider)
            .build()
            .map_err(|e| ToolboxError::Internal(format!("TLS verifier setup failed: {e}")))?;
        Ok(Self {
            inner,
            verdict: OnceLock::new(),
        })
    }

    /// `None` when the chain validated, otherwise the reason it did not.
    /// Also `None` if no certificate was ever checked.
    fn authorization_error(&self) -> Option<String> {
        self.verdict.get().cloned().flatten()
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .err()
            .map(|e| e.to_string());
        if let Some(reason) = &verdict {
            debug!("[SSL] Chain not trusted: {reason}");
        }
        let _ = self.verdict.set(verdict);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn client_config(verifier: Arc<RecordingVerifier>) -> ToolboxResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ToolboxError::Internal(format!("TLS config failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(config)
}

/// Perform a TLS handshake and inspect the presented certificate chain.
pub async fn ssl_check(
    dialer: &dyn Dialer,
    target: &str,
    options: &ProbeOptions,
    deadline: Duration,
) -> ToolboxResult<SslCertData> {
    let (host, port) = parse_host_port(target, options.port, DEFAULT_TLS_PORT)?;
    let server_name = ServerName::try_from(host.clone())
        .map_err(|_| ToolboxError::ValidationError(format!("Invalid server name: {host}")))?;

    let verifier = Arc::new(RecordingVerifier::new(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))?);
    let connector = TlsConnector::from(Arc::new(client_config(Arc::clone(&verifier))?));

    debug!("[SSL] Starting check for {host}:{port}");
    let start_time = std::time::Instant::now();

    let connect = async {
        let stream = dialer
            .dial(&host, port)
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("Connection failed: {e}")))?;
        trace!("[SSL] TCP connected after {:?}, handshaking", start_time.elapsed());
        connector
            .connect(server_name, stream)
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("TLS handshake failed: {e}")))
    };

    let outcome = bounded_session(deadline, connect, |tls| async move {
        let (_, conn) = tls.get_ref();
        let certs: Vec<CertificateDer<'static>> = conn
            .peer_certificates()
            .map(|chain| chain.iter().map(|c| c.clone().into_owned()).collect())
            .unwrap_or_default();
        Ok(certs)
    })
    .await;

    let certs = match outcome {
        SessionOutcome::Completed(certs) => certs,
        SessionOutcome::Failed(e) => {
            warn!("[SSL] {host}:{port}: {e}");
            return Err(ToolboxError::NetworkError(e.to_string()));
        }
        SessionOutcome::TimedOut { .. } => {
            warn!("[SSL] Handshake with {host}:{port} timed out ({deadline:?})");
            return Err(ToolboxError::Timeout("TLS handshake timed out".to_string()));
        }
    };
    trace!("[SSL] Retrieved {} certificate(s)", certs.len());

    let data = build_cert_data(&host, port, &certs, verifier.authorization_error(), Utc::now())?;
    debug!(
        "[SSL] Check completed: {host} - authorized={}, days_remaining={}, chain_length={}, total_time={:?}",
        data.authorized,
        data.days_remaining,
        data.chain.len(),
        start_time.elapsed()
    );
    Ok(data)
}

/// Whole days from `now` until `valid_to`, rounded down; negative once expired.
fn days_remaining(valid_to: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (valid_to - now).num_seconds().div_euclid(86_400)
}

fn asn1_to_utc(time: ASN1Time) -> ToolboxResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        ToolboxError::NetworkError("Certificate validity date out of range".to_string())
    })
}

/// Build the probe payload from the peer chain (leaf first).
fn build_cert_data(
    host: &str,
    port: u16,
    certs: &[CertificateDer<'_>],
    authorization_error: Option<String>,
    now: DateTime<Utc>,
) -> ToolboxResult<SslCertData> {
    let leaf = certs
        .first()
        .ok_or_else(|| ToolboxError::NetworkError("No certificate found".to_string()))?;
    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| ToolboxError::NetworkError(format!("Certificate parsing failed: {e}")))?;

    let valid_from = asn1_to_utc(cert.validity().not_before)?;
    let valid_to = asn1_to_utc(cert.validity().not_after)?;

    let san: Vec<String> = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let chain = certs
        .iter()
        .filter_map(|c| {
            X509Certificate::from_der(c.as_ref())
                .ok()
                .map(|(_, parsed)| CertChainItem {
                    subject: parsed.subject().to_string(),
                    issuer: parsed.issuer().to_string(),
                    is_ca: parsed.is_ca(),
                })
        })
        .collect();

    Ok(SslCertData {
        host: host.to_string(),
        port,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        valid_from,
        valid_to,
        days_remaining: days_remaining(valid_to, now),
        authorized: authorization_error.is_none(),
        authorization_error,
        san,
        serial_number: cert.serial.to_str_radix(16).to_uppercase(),
        signature_algorithm: cert.signature_algorithm.algorithm.to_string(),
        chain,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use chrono::TimeZone;
    use rustls::ServerConfig;
    use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsAcceptor;

    use super::super::test_mocks::{RefusingDialer, ScriptedDialer, StalledDialer};
    use super::super::socket::TcpDialer;
    use super::*;

    const EXPIRED_CERT: &[u8] = include_bytes!("../../tests/fixtures/expired-cert.der");
    const LOCALHOST_CERT: &[u8] = include_bytes!("../../tests/fixtures/localhost-expired.der");
    const LOCALHOST_KEY: &[u8] = include_bytes!("../../tests/fixtures/localhost-expired.key.der");

    /// TLS server presenting the expired self-signed `localhost` certificate.
    fn self_signed_acceptor() -> TlsAcceptor {
        let config =
            ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .unwrap()
                .with_no_client_auth()
                .with_single_cert(
                    vec![CertificateDer::from(LOCALHOST_CERT)],
                    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(LOCALHOST_KEY)),
                )
                .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // ==================== days_remaining tests ====================

    #[test]
    fn test_days_remaining_floors() {
        let valid_to = utc(2025, 1, 10, 0);
        assert_eq!(days_remaining(valid_to, utc(2025, 1, 1, 0)), 9);
        assert_eq!(days_remaining(valid_to, utc(2025, 1, 1, 12)), 8);
        assert_eq!(days_remaining(valid_to, utc(2025, 1, 10, 0)), 0);
    }

    #[test]
    fn test_days_remaining_negative_after_expiry() {
        let valid_to = utc(2025, 1, 10, 0);
        assert_eq!(days_remaining(valid_to, utc(2025, 1, 10, 1)), -1);
        assert_eq!(days_remaining(valid_to, utc(2025, 1, 20, 0)), -10);
    }

    // ==================== certificate parsing tests ====================

    #[test]
    fn test_build_cert_data_expired_certificate() {
        let certs = [CertificateDer::from(EXPIRED_CERT)];
        let data = build_cert_data(
            "expired.netprobe.test",
            443,
            &certs,
            Some("invalid peer certificate: Expired".to_string()),
            utc(2024, 1, 1, 0),
        )
        .unwrap();

        assert!(data.subject.contains("CN=expired.netprobe.test"));
        assert_eq!(data.subject, data.issuer);
        assert_eq!(data.valid_from, utc(2020, 1, 1, 0));
        assert_eq!(data.valid_to, utc(2021, 1, 1, 0));
        assert!(data.days_remaining < 0);
        assert_eq!(data.days_remaining, -1095);
        assert!(!data.authorized);
        assert_eq!(
            data.san,
            vec!["expired.netprobe.test", "www.expired.netprobe.test"]
        );
        assert_eq!(data.serial_number, "1A2B3C4D");
        assert_eq!(data.signature_algorithm, "1.2.840.10045.4.3.2");
        assert_eq!(data.chain.len(), 1);
        assert!(data.chain[0].is_ca);
    }

    #[test]
    fn test_build_cert_data_empty_chain() {
        let err = build_cert_data("example.com", 443, &[], None, Utc::now()).unwrap_err();
        assert!(matches!(err, ToolboxError::NetworkError(_)));
    }

    #[test]
    fn test_build_cert_data_garbage() {
        let certs = [CertificateDer::from(&b"not a certificate"[..])];
        let err = build_cert_data("example.com", 443, &certs, None, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            ToolboxError::NetworkError(ref m) if m.starts_with("Certificate parsing failed")
        ));
    }

    #[test]
    fn test_recording_verifier_accepts_but_records_untrusted_chain() {
        let verifier =
            RecordingVerifier::new(Arc::new(rustls::crypto::ring::default_provider())).unwrap();
        let server_name = ServerName::try_from("expired.netprobe.test").unwrap();
        let result = verifier.verify_server_cert(
            &CertificateDer::from(EXPIRED_CERT),
            &[],
            &server_name,
            &[],
            UnixTime::now(),
        );
        assert!(result.is_ok());
        assert!(verifier.authorization_error().is_some());
    }

    // ==================== handshake tests ====================

    #[tokio::test]
    async fn test_ssl_check_plain_http_peer_is_handshake_failure() {
        let dialer = ScriptedDialer::new(|mut peer| async move {
            let _ = peer
                .write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
                .await;
        });
        let err = ssl_check(
            &dialer,
            "example.com",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ToolboxError::NetworkError(ref m) if m.starts_with("TLS handshake failed")
        ));
        assert_eq!(dialer.dialed(), vec![("example.com".to_string(), 443)]);
    }

    #[tokio::test]
    async fn test_ssl_check_untrusted_expired_chain_completes_handshake() {
        let acceptor = self_signed_acceptor();
        let dialer = ScriptedDialer::new(move |peer| {
            let acceptor = acceptor.clone();
            async move {
                if let Ok(mut tls) = acceptor.accept(peer).await {
                    let mut buf = [0u8; 1];
                    let _ = tls.read(&mut buf).await;
                }
            }
        });

        let data = ssl_check(
            &dialer,
            "localhost:8443",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(data.host, "localhost");
        assert_eq!(data.port, 8443);
        assert!(!data.authorized);
        assert!(data.authorization_error.is_some());
        assert!(data.subject.contains("CN=localhost"));
        assert_eq!(data.valid_to, utc(2021, 1, 1, 0));
        assert!(data.days_remaining < 0);
        assert_eq!(data.san, vec!["localhost"]);
        assert_eq!(data.serial_number, "5EED");
        assert_eq!(data.chain.len(), 1);
        assert!(!data.chain[0].is_ca);
    }

    #[tokio::test]
    async fn test_ssl_check_refused() {
        let err = ssl_check(
            &RefusingDialer,
            "example.com",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ToolboxError::NetworkError(ref m) if m.starts_with("Connection failed")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ssl_check_deadline() {
        let err = ssl_check(
            &StalledDialer,
            "example.com",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolboxError::Timeout(_)));
    }

    // NOTE: These tests depend on external networks; failures may be due to firewall/proxy issues

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ssl_check_https_site_real() {
        let data = ssl_check(
            &TcpDialer,
            "google.com",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_or_else(|e| panic!("SSL check failed: {e}"));
        assert!(data.authorized);
        assert!(data.days_remaining > 0);
        assert!(!data.san.is_empty(), "SAN should not be empty");
        assert!(!data.chain.is_empty(), "Certificate chain should not be empty");
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ssl_check_expired_site_real() {
        let data = ssl_check(
            &TcpDialer,
            "expired.badssl.com",
            &ProbeOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_or_else(|e| panic!("SSL check failed: {e}"));
        assert!(!data.authorized);
        assert!(data.authorization_error.is_some());
        assert!(data.days_remaining < 0);
    }
}
