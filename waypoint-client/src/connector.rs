use crate::config::{ClientConfig, ConfigError};
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig as RustlsConfig, DigitallySignedStruct, SignatureScheme};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Uri};
use tracing::{debug, error, info, warn};

/// Port the Waypoint server listens on when the address doesn't name one.
const DEFAULT_PORT: u16 = 9701;

/// Lifecycle of the connection while it is being established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing has been attempted yet
    Idle,
    /// TCP connect and TLS handshake in progress
    Connecting,
    /// The channel can carry calls
    Ready,
    /// The dial failed; terminal for this attempt
    TransientFailure,
}

/// A certificate verifier that accepts any certificate.
#[derive(Debug)]
struct InsecureServerCertVerifier;

impl ServerCertVerifier for InsecureServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// Create a rustls config that accepts any certificate and offers h2 via ALPN.
fn make_insecure_rustls_config() -> std::result::Result<RustlsConfig, rustls::Error> {
    let mut config =
        RustlsConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerCertVerifier))
            .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

/// Where to dial, derived from `ClientConfig::address`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
}

impl Target {
    fn parse(address: &str) -> std::result::Result<Self, ConfigError> {
        let address = address.trim();
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!("https://{address}")
        };

        let uri: Uri = url.parse().map_err(|e| {
            ConfigError::ValidationError(format!("Invalid address {address:?}: {e}"))
        })?;
        let host = uri
            .host()
            .ok_or_else(|| ConfigError::ValidationError(format!("No host in address {address:?}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(DEFAULT_PORT);

        Ok(Self { host, port })
    }

    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Connector that performs the TLS handshake itself with an accept-anything verifier.
#[derive(Clone)]
struct InsecureHttpsConnector {
    tls: TlsConnector,
    target: Target,
}

impl tower::Service<Uri> for InsecureHttpsConnector {
    type Response = hyper_util::rt::TokioIo<tokio_rustls::client::TlsStream<tokio::net::TcpStream>>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = Pin<
        Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let tls = self.tls.clone();
        let target = self.target.clone();

        Box::pin(async move {
            let addr = target.authority();
            debug!("TCP connecting to {}", addr);

            let tcp = tokio::net::TcpStream::connect(&addr).await.map_err(|e| {
                debug!("TCP connection failed: {} (kind: {:?})", e, e.kind());
                Box::new(e) as Self::Error
            })?;

            let server_name = ServerName::try_from(target.host.clone())
                .map_err(|_| format!("Invalid server name: {}", target.host))?;

            debug!("Starting TLS handshake with server_name: {:?}", server_name);
            let tls_stream = tls.connect(server_name, tcp).await?;
            debug!("TLS handshake completed");

            Ok(hyper_util::rt::TokioIo::new(tls_stream))
        })
    }
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = std::result::Result<Channel, tonic::transport::Error>> + Send>>;

/// Build the future that opens the channel, honoring the configured transport security.
fn prepare_connect(config: &ClientConfig, target: &Target) -> Result<ConnectFuture> {
    let timeout = config.connect_timeout();

    if config.insecure_skip_verify {
        warn!(
            "TLS certificate verification is DISABLED for {}",
            config.address
        );

        let tls_config = make_insecure_rustls_config()
            .map_err(|e| Error::connection_failed(&config.address, e.to_string()))?;
        let connector = InsecureHttpsConnector {
            tls: TlsConnector::from(Arc::new(tls_config)),
            target: target.clone(),
        };

        // The connector does TLS, so tonic must see a plain http:// endpoint.
        let mut endpoint = Endpoint::from_shared(format!("http://{}", target.authority()))
            .map_err(|e| ConfigError::ValidationError(format!("Invalid endpoint: {e}")))?;
        if let Some(timeout) = timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        return Ok(Box::pin(
            async move { endpoint.connect_with_connector(connector).await },
        ));
    }

    let domain_name = config
        .tls
        .as_ref()
        .and_then(|tls| tls.domain_name.clone())
        .unwrap_or_else(|| target.host.clone());

    let mut tls = ClientTlsConfig::new().domain_name(domain_name);
    tls = match config.ca_pem()? {
        Some(ca_pem) => {
            debug!("Verifying server against configured CA");
            tls.ca_certificate(Certificate::from_pem(ca_pem))
        }
        None => {
            debug!("Verifying server against native root certificates");
            tls.with_native_roots()
        }
    };

    let mut endpoint = Endpoint::from_shared(format!("https://{}", target.authority()))
        .map_err(|e| ConfigError::ValidationError(format!("Invalid endpoint: {e}")))?
        .tls_config(tls)
        .map_err(|e| ConfigError::ValidationError(format!("Invalid TLS settings: {e}")))?;
    if let Some(timeout) = timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    Ok(Box::pin(async move { endpoint.connect().await }))
}

/// Render an error with its whole source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = String::new();
    let mut source = Some(err);
    while let Some(err) = source {
        if !chain.is_empty() {
            chain.push_str(" -> ");
        }
        chain.push_str(&err.to_string());
        source = err.source();
    }
    chain
}

/// An in-flight dial publishing its state on a watch channel.
struct Dial {
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<std::result::Result<Channel, String>>,
}

impl Dial {
    fn start(connect: ConnectFuture) -> Self {
        let (tx, state) = watch::channel(ConnectionState::Idle);

        let task = tokio::spawn(async move {
            tx.send_replace(ConnectionState::Connecting);
            match connect.await {
                Ok(channel) => {
                    tx.send_replace(ConnectionState::Ready);
                    Ok(channel)
                }
                Err(e) => {
                    let reason = error_chain(&e);
                    error!("Channel connection failed: {}", reason);
                    tx.send_replace(ConnectionState::TransientFailure);
                    Err(reason)
                }
            }
        });

        Self { state, task }
    }
}

impl Drop for Dial {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Block until the state reaches `Ready`.
///
/// `TransientFailure`, a vanished dial task, or `interrupt` completing all end
/// the wait with an error describing why. There is no retry.
pub(crate) async fn wait_for_ready<F>(
    state: &mut watch::Receiver<ConnectionState>,
    interrupt: F,
) -> std::result::Result<(), String>
where
    F: Future<Output = String>,
{
    tokio::pin!(interrupt);

    loop {
        let current = *state.borrow_and_update();
        debug!(state = ?current, "connection state");

        match current {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::TransientFailure => {
                return Err("connection entered transient failure".to_string());
            }
            ConnectionState::Idle | ConnectionState::Connecting => {
                tokio::select! {
                    changed = state.changed() => {
                        if changed.is_err() {
                            return Err("dial ended before the connection became ready".to_string());
                        }
                    }
                    reason = &mut interrupt => return Err(reason),
                }
            }
        }
    }
}

/// Open a channel for `config` and wait until it is ready.
///
/// Resolves to exactly one of a ready channel or `Error::ConnectionFailed`.
/// `cancel` completing while the wait is in progress aborts the dial.
pub(crate) async fn establish<C>(config: &ClientConfig, cancel: C) -> Result<Channel>
where
    C: Future<Output = ()>,
{
    config.validate()?;
    let target = Target::parse(&config.address)?;
    debug!("Dialing Waypoint server at {}", target.authority());

    let mut dial = Dial::start(prepare_connect(config, &target)?);

    let timeout = config.connect_timeout();
    let interrupt = async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancel => "cancelled while waiting for the connection".to_string(),
            _ = deadline => "timed out waiting for the connection".to_string(),
        }
    };

    if let Err(reason) = wait_for_ready(&mut dial.state, interrupt).await {
        dial.task.abort();
        // A dial that already failed carries a more useful reason than the state.
        let reason = match (&mut dial.task).await {
            Ok(Err(detail)) => detail,
            _ => reason,
        };
        return Err(Error::connection_failed(&config.address, reason));
    }

    match (&mut dial.task).await {
        Ok(Ok(channel)) => {
            info!("Connected to Waypoint server at {}", config.address);
            Ok(channel)
        }
        Ok(Err(reason)) => Err(Error::connection_failed(&config.address, reason)),
        Err(e) => Err(Error::connection_failed(&config.address, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn never() -> impl Future<Output = String> {
        std::future::pending()
    }

    #[test]
    fn test_parse_host_port() {
        let target = Target::parse("waypoint.example.com:9702").unwrap();
        assert_eq!(target.host, "waypoint.example.com");
        assert_eq!(target.port, 9702);
        assert_eq!(target.authority(), "waypoint.example.com:9702");
    }

    #[test]
    fn test_parse_defaults_port() {
        let target = Target::parse("waypoint.example.com").unwrap();
        assert_eq!(target.port, DEFAULT_PORT);
    }

    #[test]
    fn test_parse_explicit_scheme_and_ipv6() {
        let target = Target::parse("https://[::1]:9701").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.authority(), "[::1]:9701");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Target::parse("not a host:port").is_err());
    }

    #[tokio::test]
    async fn test_wait_ready_immediately() {
        let (_tx, mut rx) = watch::channel(ConnectionState::Ready);
        assert!(wait_for_ready(&mut rx, never()).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_follows_transitions_to_ready() {
        let (tx, mut rx) = watch::channel(ConnectionState::Idle);

        tokio::spawn(async move {
            tx.send_replace(ConnectionState::Connecting);
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_replace(ConnectionState::Ready);
        });

        assert!(wait_for_ready(&mut rx, never()).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_fails_on_transient_failure() {
        let (tx, mut rx) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_replace(ConnectionState::TransientFailure);
            // Keep the sender alive so only the state can end the wait.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = wait_for_ready(&mut rx, never()).await.unwrap_err();
        assert!(err.contains("transient failure"), "got: {err}");
    }

    #[tokio::test]
    async fn test_wait_fails_when_dial_vanishes() {
        let (tx, mut rx) = watch::channel(ConnectionState::Connecting);
        drop(tx);

        let err = wait_for_ready(&mut rx, never()).await.unwrap_err();
        assert!(err.contains("dial ended"), "got: {err}");
    }

    #[tokio::test]
    async fn test_wait_fails_on_interrupt() {
        let (_tx, mut rx) = watch::channel(ConnectionState::Connecting);

        let err = wait_for_ready(&mut rx, async { "cancelled".to_string() })
            .await
            .unwrap_err();
        assert_eq!(err, "cancelled");
    }

    #[tokio::test]
    async fn test_establish_rejects_invalid_config() {
        let config = ClientConfig::new("localhost:9701", "");
        let err = establish(&config, std::future::pending()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got: {err:?}");
    }
}
