// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TLS listener: binds the configured host:port, negotiates TLS 1.2+ via
// `rustls` (which never implements SSLv2/3 or TLS 1.0/1.1, so there is no
// earlier-version code path to disable), optionally verifies the peer
// certificate for mutual TLS, and hands each accepted stream to the
// request handler on its own task.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use printbroker_core::{AppConfig, PrintBrokerError, SecurityConfig};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_rustls::TlsAcceptor;
use tracing::{info, instrument, warn};

use crate::handler::{handle_connection, AppState};

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, PrintBrokerError> {
    let file = File::open(path)
        .map_err(|e| PrintBrokerError::Internal(format!("opening cert file {path}: {e}")))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PrintBrokerError::Internal(format!("parsing cert file {path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, PrintBrokerError> {
    let file = File::open(path)
        .map_err(|e| PrintBrokerError::Internal(format!("opening key file {path}: {e}")))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| PrintBrokerError::Internal(format!("parsing key file {path}: {e}")))?
        .ok_or_else(|| PrintBrokerError::Internal(format!("no private key found in {path}")))
}

/// Builds the server-side TLS configuration: certificate chain always
/// required, client certificate verification only when `cafile` is set.
pub fn build_server_config(security: &SecurityConfig) -> Result<RustlsServerConfig, PrintBrokerError> {
    let certfile = security
        .certfile
        .as_deref()
        .ok_or_else(|| PrintBrokerError::Internal("security.certfile is required when TLS is enabled".into()))?;
    let keyfile = security
        .keyfile
        .as_deref()
        .ok_or_else(|| PrintBrokerError::Internal("security.keyfile is required when TLS is enabled".into()))?;

    let certs = load_certs(certfile)?;
    let key = load_key(keyfile)?;

    let builder = RustlsServerConfig::builder();

    let builder = if let Some(cafile) = &security.cafile {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(cafile)? {
            roots
                .add(cert)
                .map_err(|e| PrintBrokerError::Internal(format!("adding CA cert: {e}")))?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| PrintBrokerError::Internal(format!("building client verifier: {e}")))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    builder
        .with_single_cert(certs, key)
        .map_err(|e| PrintBrokerError::Internal(format!("loading server certificate: {e}")))
}

/// Accepts connections until `shutdown` fires, draining existing handlers
/// (each already bounded by its own read deadline) before returning.
#[instrument(skip(config, state, shutdown))]
pub async fn run_listener(
    config: Arc<AppConfig>,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> Result<(), PrintBrokerError> {
    let server_config = build_server_config(&config.security)?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| PrintBrokerError::Internal(format!("binding {bind_addr}: {e}")))?;
    info!(addr = %bind_addr, "TLS listener bound");

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    match acceptor.accept(socket).await {
                        Ok(tls_stream) => {
                            handle_connection(tls_stream, &state, &peer_addr.ip().to_string()).await;
                        }
                        Err(err) => {
                            warn!(peer = %peer_addr, error = %err, "TLS handshake failed");
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certfile_is_a_config_error() {
        let security = SecurityConfig {
            certfile: None,
            keyfile: None,
            ..SecurityConfig::default()
        };
        let err = build_server_config(&security).unwrap_err();
        assert!(matches!(err, PrintBrokerError::Internal(_)));
    }
}
