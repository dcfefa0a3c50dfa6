//! TLS for PostgreSQL connections.
//!
//! The `sslmode` query parameter of a PostgreSQL URI picks the mode.
//! `verify-full`, which tokio-postgres cannot handle itself, is stripped from
//! the URI and applied here through rustls. Server certificates are checked
//! against the bundled public web roots only; `sslrootcert` is not supported.

use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::ClientConfig;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::error::{CopyError, Result};

/// PostgreSQL `sslmode` values.
///
/// `verify-ca` is refused: rustls always checks the host name, so it would
/// silently behave as `verify-full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    /// TLS when the server offers it, without certificate checks.
    #[default]
    Prefer,
    /// TLS without certificate checks.
    Require,
    /// Certificate chain and host name checked against public web roots.
    VerifyFull,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "allow" => Ok(SslMode::Disable),
            "prefer" | "" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Err(CopyError::Config(
                "sslmode=verify-ca is not supported: certificates are always checked against \
                 the host name, use sslmode=verify-full"
                    .into(),
            )),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(CopyError::Config(format!(
                "Invalid sslmode '{}'. Valid values: disable, prefer, require, verify-full",
                other
            ))),
        }
    }

    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Value tokio-postgres understands for this mode.
    fn driver_value(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require | SslMode::VerifyFull => "require",
        }
    }
}

/// Pull `sslmode` out of a URI query string.
///
/// Returns the URI with `sslmode` rewritten to a value tokio-postgres accepts,
/// plus the requested mode.
pub fn split_ssl_mode(uri: &str) -> Result<(String, SslMode)> {
    let Some((base, query)) = uri.split_once('?') else {
        return Ok((uri.to_string(), SslMode::default()));
    };

    let mut mode = SslMode::default();
    let mut params = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("sslmode") => {
                mode = SslMode::parse(value)?;
                params.push(format!("sslmode={}", mode.driver_value()));
            }
            Some((key, _)) if key.eq_ignore_ascii_case("sslrootcert") => {
                return Err(CopyError::Config(
                    "sslrootcert is not supported: server certificates are verified against \
                     the public web roots"
                        .into(),
                ));
            }
            _ => params.push(pair.to_string()),
        }
    }

    if params.is_empty() {
        Ok((base.to_string(), mode))
    } else {
        Ok((format!("{}?{}", base, params.join("&")), mode))
    }
}

/// Connector matching one [`SslMode`].
#[derive(Clone)]
pub enum Connector {
    Plain,
    Tls(MakeRustlsConnect),
}

impl Connector {
    pub fn new(mode: SslMode) -> Result<Self> {
        if !mode.requires_tls() {
            return Ok(Connector::Plain);
        }
        Ok(Connector::Tls(MakeRustlsConnect::new(client_config(mode)?)))
    }

    /// Build a connection pool over `config`.
    pub fn pool(&self, config: PgConfig, max_size: usize) -> Result<Pool> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let builder = match self {
            Connector::Plain => Pool::builder(Manager::from_config(config, NoTls, mgr_config)),
            Connector::Tls(tls) => {
                Pool::builder(Manager::from_config(config, tls.clone(), mgr_config))
            }
        };
        builder
            .max_size(max_size)
            .build()
            .map_err(|e| CopyError::pool(e, "creating PostgreSQL pool"))
    }

    /// Open a dedicated connection outside any pool.
    ///
    /// The connection task is spawned on the runtime and ends when the
    /// returned client is dropped.
    pub async fn connect(&self, config: &PgConfig) -> Result<Client> {
        match self {
            Connector::Plain => {
                let (client, connection) = config.connect(NoTls).await?;
                spawn_connection(connection);
                Ok(client)
            }
            Connector::Tls(tls) => {
                let (client, connection) = config.connect(tls.clone()).await?;
                spawn_connection(connection);
                Ok(client)
            }
        }
    }
}

fn spawn_connection<F>(connection: F)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>
        + Send
        + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("PostgreSQL connection closed: {}", e);
        }
    });
}

fn client_config(mode: SslMode) -> Result<ClientConfig> {
    let config = match mode {
        SslMode::Disable => {
            return Err(CopyError::Config(
                "Cannot build TLS config for sslmode=disable".into(),
            ));
        }
        SslMode::Prefer | SslMode::Require => {
            if mode == SslMode::Require {
                warn!("sslmode=require does not verify the server certificate");
            }
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        }
        SslMode::VerifyFull => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    };
    Ok(config)
}

/// Accepts any server certificate. Used for `prefer` and `require`.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
