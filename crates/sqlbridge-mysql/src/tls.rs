//! TLS channel setup for encrypted server connections.
//!
//! Engaged only when the configuration passes the all-or-nothing gate:
//! client key, client certificate, and CA bundle must all be present.

use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use sqlbridge_core::settings::ResolvedTls;
use sqlbridge_core::{DriverError, DriverErrorKind};

fn tls_error(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Connect, message)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, DriverError> {
    let file = File::open(path).map_err(|e| tls_error(format!("cannot open {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("invalid certificate in {path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, DriverError> {
    let file = File::open(path).map_err(|e| tls_error(format!("cannot open {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| tls_error(format!("invalid private key in {path}: {e}")))?
        .ok_or_else(|| tls_error(format!("no private key found in {path}")))
}

fn build_root_store(tls: &ResolvedTls) -> Result<RootCertStore, DriverError> {
    let mut roots = RootCertStore::empty();

    for cert in load_certs(&tls.ca)? {
        roots
            .add(cert)
            .map_err(|e| tls_error(format!("rejected CA certificate: {e}")))?;
    }

    if let Some(dir) = &tls.ca_path {
        let entries =
            std::fs::read_dir(dir).map_err(|e| tls_error(format!("cannot read {dir}: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pem") {
                if let Some(path) = path.to_str() {
                    for cert in load_certs(path)? {
                        // Skip unparseable extras in the directory.
                        let _ = roots.add(cert);
                    }
                }
            }
        }
    }

    // Servers fronted by a public CA still verify.
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(roots)
}

/// Wrap an established TCP stream in a verified TLS session.
pub fn wrap(
    tcp: TcpStream,
    host: &str,
    tls: &ResolvedTls,
) -> Result<StreamOwned<ClientConnection, TcpStream>, DriverError> {
    let roots = build_root_store(tls)?;
    let certs = load_certs(&tls.cert)?;
    let key = load_key(&tls.key)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| tls_error(format!("client certificate rejected: {e}")))?;

    if tls.cipher.is_some() {
        tracing::debug!("cipher restriction ignored; using library cipher suites");
    }

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| tls_error(format!("invalid server name {host}: {e}")))?;
    let conn = ClientConnection::new(Arc::new(config), server_name)
        .map_err(|e| tls_error(format!("TLS session setup failed: {e}")))?;

    Ok(StreamOwned::new(conn, tcp))
}
