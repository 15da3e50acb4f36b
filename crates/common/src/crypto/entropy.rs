use std::ops::Deref;

use super::derive::{DeriveError, EntropySource, SystemRandom};

/// Size of an entropy buffer in bytes (256 bits)
pub const ENTROPY_BYTES: usize = 32;

/// Errors that can occur constructing an entropy buffer
#[derive(Debug, thiserror::Error)]
pub enum EntropyError {
    #[error("entropy error: {0}")]
    Default(#[from] anyhow::Error),
    #[error(transparent)]
    Derive(#[from] DeriveError),
}

/// A fixed 256-bit entropy buffer.
///
/// Produced by the system RNG on the operator side and by derivation on the
/// device side.  Exactly [`ENTROPY_BYTES`] bytes, always; any other length
/// is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entropy([u8; ENTROPY_BYTES]);

impl Default for Entropy {
    fn default() -> Self {
        Entropy([0; ENTROPY_BYTES])
    }
}

impl Deref for Entropy {
    type Target = [u8; ENTROPY_BYTES];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; ENTROPY_BYTES]> for Entropy {
    fn from(bytes: [u8; ENTROPY_BYTES]) -> Self {
        Entropy(bytes)
    }
}

impl Entropy {
    /// Generate fresh entropy from the system RNG
    pub fn generate() -> Result<Self, EntropyError> {
        Ok(Entropy(SystemRandom.read_array()?))
    }

    /// Create an entropy buffer from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `ENTROPY_BYTES`.
    pub fn from_slice(data: &[u8]) -> Result<Self, EntropyError> {
        if data.len() != ENTROPY_BYTES {
            return Err(anyhow::anyhow!(
                "invalid entropy size, expected {}, got {}",
                ENTROPY_BYTES,
                data.len()
            )
            .into());
        }
        let mut buff = [0; ENTROPY_BYTES];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the entropy bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Render the entropy as a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_size_validation() {
        assert!(Entropy::from_slice(&[1u8; 16]).is_err());
        assert!(Entropy::from_slice(&[1u8; 64]).is_err());
        assert!(Entropy::from_slice(&[1u8; ENTROPY_BYTES]).is_ok());
    }

    #[test]
    fn test_generate_differs() {
        let a = Entropy::generate().unwrap();
        let b = Entropy::generate().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, Entropy::default());
    }
}
