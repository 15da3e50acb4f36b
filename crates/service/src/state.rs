use std::sync::Arc;

use ipnet::IpNet;
use parking_lot::Mutex;
use tokio::sync::watch;

use common::prelude::{Entropy, UniqueDeviceSecret};

use crate::storage::SecureBootStore;

/// The commit transition was already taken for this session
#[derive(Debug, thiserror::Error)]
#[error("session already committed")]
pub struct AlreadyCommitted;

/// Mutable state of one provisioning session.
///
/// All fields sit behind a single mutex: exactly one operator is expected
/// to drive the exchange serially, but concurrent or duplicate requests
/// must not be able to corrupt state.  Add-data is last-write-wins; the
/// commit transition happens at most once.
pub struct Session {
    inner: Mutex<SessionInner>,
    commit_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct SessionInner {
    entropy: Entropy,
    timestamp: i64,
    uds: Option<UniqueDeviceSecret>,
}

impl Session {
    pub fn new() -> Self {
        let (commit_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(SessionInner::default()),
            commit_tx,
        }
    }

    /// Store an operator entropy contribution, replacing any prior one
    pub fn store_contribution(&self, entropy: Entropy, timestamp: i64) {
        let mut inner = self.inner.lock();
        inner.entropy = entropy;
        inner.timestamp = timestamp;
    }

    /// The most recently contributed entropy (zeroed if none arrived)
    pub fn entropy(&self) -> Entropy {
        self.inner.lock().entropy
    }

    /// The most recently contributed timestamp
    pub fn timestamp(&self) -> i64 {
        self.inner.lock().timestamp
    }

    /// The unique device secret, present only after a successful commit
    pub fn uds(&self) -> Option<UniqueDeviceSecret> {
        self.inner.lock().uds.clone()
    }

    /// Take the one-time commit transition, storing the freshly derived
    /// unique device secret and signaling the server to shut down.
    ///
    /// The transition is checked and taken under the session lock; a
    /// second commit is rejected and leaves the first secret in place.
    pub fn commit(&self, uds: UniqueDeviceSecret) -> Result<(), AlreadyCommitted> {
        {
            let mut inner = self.inner.lock();
            if inner.uds.is_some() {
                return Err(AlreadyCommitted);
            }
            inner.uds = Some(uds);
        }
        // a watch send never blocks, so repeated signals are harmless
        let _ = self.commit_tx.send(true);
        Ok(())
    }

    /// Subscribe to the commit notification
    pub fn subscribe_commit(&self) -> watch::Receiver<bool> {
        self.commit_tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handler state of the provisioning server
#[derive(Clone)]
pub struct ServerState {
    session: Arc<Session>,
    secure_boot: Arc<dyn SecureBootStore>,
    allowed_nets: Arc<Vec<IpNet>>,
    hostname: Arc<str>,
    basic_auth_password: Arc<str>,
}

impl ServerState {
    pub fn new(
        session: Arc<Session>,
        secure_boot: Arc<dyn SecureBootStore>,
        allowed_nets: Vec<IpNet>,
        hostname: String,
        basic_auth_password: String,
    ) -> Self {
        Self {
            session,
            secure_boot,
            allowed_nets: Arc::new(allowed_nets),
            hostname: hostname.into(),
            basic_auth_password: basic_auth_password.into(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn secure_boot(&self) -> &dyn SecureBootStore {
        self.secure_boot.as_ref()
    }

    pub fn allowed_nets(&self) -> &[IpNet] {
        &self.allowed_nets
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn basic_auth_password(&self) -> &str {
        &self.basic_auth_password
    }
}
