//! External storage collaborators.
//!
//! The protocol core never interprets secure-boot key material or persists
//! anything itself; it hands opaque blobs to these traits.  The real
//! backends live outside this crate (EFI-NVRAM on the device); in-memory
//! implementations are provided for tests.

use parking_lot::Mutex;

/// Errors reported by a storage collaborator
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store for secure-boot key material.
///
/// `store` expects authentication_v2 descriptors (PK self-signed, KEK
/// signed by PK, db/dbx signed by KEK); validating the signing chain is
/// this collaborator's concern, not the caller's.
pub trait SecureBootStore: Send + Sync {
    /// Whether the firmware currently is in key-provisioning setup mode
    fn is_setup_mode(&self) -> Result<bool, StorageError>;

    /// Persist PK, KEK, db, and optionally dbx
    fn store(
        &self,
        pk: &[u8],
        kek: &[u8],
        db: &[u8],
        dbx: Option<&[u8]>,
    ) -> Result<(), StorageError>;

    /// Ask the firmware to boot into its setup menu on next reboot
    fn request_reboot_into_firmware_menu(&self) -> Result<(), StorageError>;
}

/// Store for the derived SSH host key
pub trait HostKeyStore: Send + Sync {
    /// Persist the PEM-encoded host key
    fn store(&self, pem: &[u8]) -> Result<(), StorageError>;
}

/// Secure-boot key material captured by [`MemSecureBootStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecureBootKeys {
    pub pk: Vec<u8>,
    pub kek: Vec<u8>,
    pub db: Vec<u8>,
    pub dbx: Option<Vec<u8>>,
}

/// In-memory secure-boot store for tests
#[derive(Default)]
pub struct MemSecureBootStore {
    inner: Mutex<MemSecureBootInner>,
}

#[derive(Default)]
struct MemSecureBootInner {
    setup_mode: bool,
    reject: bool,
    stored: Option<StoredSecureBootKeys>,
    reboot_requested: bool,
}

impl MemSecureBootStore {
    pub fn new(setup_mode: bool) -> Self {
        Self {
            inner: Mutex::new(MemSecureBootInner {
                setup_mode,
                ..Default::default()
            }),
        }
    }

    /// Make subsequent `store` calls fail, emulating rejected material
    pub fn set_reject(&self, reject: bool) {
        self.inner.lock().reject = reject;
    }

    pub fn stored(&self) -> Option<StoredSecureBootKeys> {
        self.inner.lock().stored.clone()
    }

    pub fn reboot_requested(&self) -> bool {
        self.inner.lock().reboot_requested
    }
}

impl SecureBootStore for MemSecureBootStore {
    fn is_setup_mode(&self) -> Result<bool, StorageError> {
        Ok(self.inner.lock().setup_mode)
    }

    fn store(
        &self,
        pk: &[u8],
        kek: &[u8],
        db: &[u8],
        dbx: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.reject {
            return Err(anyhow::anyhow!("signature database rejected").into());
        }
        inner.stored = Some(StoredSecureBootKeys {
            pk: pk.to_vec(),
            kek: kek.to_vec(),
            db: db.to_vec(),
            dbx: dbx.map(<[u8]>::to_vec),
        });
        Ok(())
    }

    fn request_reboot_into_firmware_menu(&self) -> Result<(), StorageError> {
        self.inner.lock().reboot_requested = true;
        Ok(())
    }
}

/// In-memory host-key store for tests
#[derive(Default)]
pub struct MemHostKeyStore {
    stored: Mutex<Option<Vec<u8>>>,
}

impl MemHostKeyStore {
    pub fn stored(&self) -> Option<Vec<u8>> {
        self.stored.lock().clone()
    }
}

impl HostKeyStore for MemHostKeyStore {
    fn store(&self, pem: &[u8]) -> Result<(), StorageError> {
        *self.stored.lock() = Some(pem.to_vec());
        Ok(())
    }
}
