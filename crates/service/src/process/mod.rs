//! The provisioning server process: a TLS listener whose identity is
//! derived from the one-time password, serving the handler chain until a
//! commit lands or shutdown is requested, then draining under a bounded
//! timeout.

mod utils;

pub use utils::{graceful_shutdown_blocker, register_panic_logger};

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use common::crypto::OtpError;
use common::prelude::{OneTimePassword, TlsIdentity};

use crate::config::ServerConfig;
use crate::http;
use crate::state::{ServerState, Session};
use crate::storage::SecureBootStore;

/// Lifecycle of a provisioning server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Created,
    Listening,
    Serving,
    ShuttingDown,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("derive one-time password material: {0}")]
    Otp(#[from] OtpError),
    #[error("invalid tls identity: {0}")]
    Tls(#[from] rustls::Error),
    #[error("server died: {0}")]
    Io(#[from] std::io::Error),
}

/// The device-side half of the provisioning protocol.
///
/// Holds the derived TLS identity and the session state.  [`Server::run`]
/// serves until the one-shot commit transition or external cancellation,
/// whichever comes first, and does not return before the listener is fully
/// stopped.
pub struct Server {
    config: ServerConfig,
    state: ServerState,
    session: Arc<Session>,
    tls: Arc<rustls::ServerConfig>,
    phase_tx: watch::Sender<ServerPhase>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        secure_boot: Arc<dyn SecureBootStore>,
    ) -> Result<Self, ServerError> {
        let otp = OneTimePassword::derive(&config.secret)?;
        let identity = otp.tls_identity()?;
        let basic_auth_password = otp.basic_auth_password()?;
        let tls = Arc::new(tls_server_config(&identity)?);

        let session = Arc::new(Session::new());
        let state = ServerState::new(
            session.clone(),
            secure_boot,
            config.allowed_nets.clone(),
            config.hostname.clone(),
            basic_auth_password,
        );
        let (phase_tx, _) = watch::channel(ServerPhase::Created);
        Ok(Self {
            config,
            state,
            session,
            tls,
            phase_tx,
        })
    }

    /// The session owned by this server; stays valid after `run` returns,
    /// which is how the caller picks up the unique device secret.
    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Subscribe to lifecycle transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<ServerPhase> {
        self.phase_tx.subscribe()
    }

    /// Serve the provisioning session.
    ///
    /// Each accepted connection gets its own task: TLS handshake, then one
    /// HTTP exchange (keep-alive is off so draining terminates).  The
    /// accept loop ends on the commit notification or on `shutdown_rx`;
    /// in-flight connections are then drained under the configured
    /// timeout.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<()>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let acceptor = TlsAcceptor::from(self.tls.clone());
        let router = http::router(self.state.clone(), self.config.request_deadline);
        let mut make_service = router.into_make_service_with_connect_info::<SocketAddr>();
        let mut commit_rx = self.session.subscribe_commit();

        tracing::info!(addr = %self.config.listen_addr, "provisioning server listening");
        let _ = self.phase_tx.send(ServerPhase::Listening);
        let _ = self.phase_tx.send(ServerPhase::Serving);

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let service = match make_service.call(remote_addr).await {
                        Ok(service) => service,
                        Err(infallible) => match infallible {},
                    };
                    connections.spawn(serve_connection(stream, remote_addr, acceptor.clone(), service));
                }
                _ = commit_rx.changed() => {
                    tracing::info!("commit received, shutting down");
                    break;
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("shutdown requested, shutting down");
                    break;
                }
            }
        }

        let _ = self.phase_tx.send(ServerPhase::ShuttingDown);
        drop(listener);
        let drain = async {
            while connections.join_next().await.is_some() {}
        };
        if timeout(self.config.shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                timeout = ?self.config.shutdown_timeout,
                "graceful drain timed out, aborting remaining connections"
            );
            connections.shutdown().await;
        }

        let _ = self.phase_tx.send(ServerPhase::Closed);
        Ok(())
    }
}

async fn serve_connection<S>(
    stream: TcpStream,
    remote_addr: SocketAddr,
    acceptor: TlsAcceptor,
    service: S,
) where
    S: Service<Request<Incoming>, Response = axum::response::Response, Error = std::convert::Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    // A client derived from a different password fails right here: its
    // trust anchor does not match the certificate we present.
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            tracing::warn!(%remote_addr, "tls handshake failed: {e}");
            return;
        }
    };

    let mut builder = hyper::server::conn::http1::Builder::new();
    builder.keep_alive(false);
    if let Err(e) = builder
        .serve_connection(TokioIo::new(tls_stream), TowerToHyperService::new(service))
        .await
    {
        tracing::debug!(%remote_addr, "connection closed with error: {e}");
    }
}

fn tls_server_config(identity: &TlsIdentity) -> Result<rustls::ServerConfig, rustls::Error> {
    let certificate = CertificateDer::from(identity.certificate_der.clone());
    let private_key =
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(identity.private_key_der.clone()));
    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![certificate], private_key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{DEFAULT_REQUEST_DEADLINE, DEFAULT_SHUTDOWN_TIMEOUT};
    use crate::storage::MemSecureBootStore;

    fn test_server() -> Server {
        Server::new(
            ServerConfig {
                secret: "red".to_string(),
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                allowed_nets: vec!["127.0.0.1/25".parse().unwrap()],
                hostname: "mullis".to_string(),
                request_deadline: DEFAULT_REQUEST_DEADLINE,
                shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            },
            Arc::new(MemSecureBootStore::new(false)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_stops_on_external_shutdown() {
        let server = test_server();
        let mut phase = server.subscribe_phase();
        assert_eq!(*phase.borrow(), ServerPhase::Created);

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(server.run(shutdown_rx));

        while *phase.borrow() != ServerPhase::Serving {
            phase.changed().await.unwrap();
        }
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(*phase.borrow(), ServerPhase::Closed);
    }

    #[tokio::test]
    async fn test_run_stops_on_commit() {
        let server = test_server();
        let session = server.session();
        let mut phase = server.subscribe_phase();

        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(server.run(shutdown_rx));

        while *phase.borrow() != ServerPhase::Serving {
            phase.changed().await.unwrap();
        }
        session
            .commit(common::prelude::UniqueDeviceSecret::from([0u8; 32]))
            .unwrap();
        handle.await.unwrap().unwrap();
        assert!(session.uds().is_some());
    }
}
