use std::fmt;

use super::derive::{DerivationReader, DeriveError, EntropySource};
use super::entropy::{Entropy, ENTROPY_BYTES};
use crate::ssh::HostKey;

/// Comment attached to the derived SSH host key
pub const HOST_KEY_COMMENT: &str = "ospkg@system-transparency";

const UDS_BYTES: usize = 32;

/// The unique device secret, root of all long-term device identifiers.
///
/// Exists only after a successful commit: it mixes entropy generated on the
/// device with entropy contributed by the operator, so neither party alone
/// determines the outcome.  Identity, authentication, and the SSH host key
/// are pure functions of this value.
#[derive(Clone, PartialEq, Eq)]
pub struct UniqueDeviceSecret([u8; UDS_BYTES]);

impl fmt::Debug for UniqueDeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueDeviceSecret").finish_non_exhaustive()
    }
}

impl From<[u8; UDS_BYTES]> for UniqueDeviceSecret {
    fn from(bytes: [u8; UDS_BYTES]) -> Self {
        UniqueDeviceSecret(bytes)
    }
}

impl UniqueDeviceSecret {
    /// Mix device-local and externally contributed entropy into a unique
    /// device secret.  The local buffer is concatenated first.
    pub fn mix(local: &Entropy, external: &Entropy) -> Result<Self, DeriveError> {
        let mut ikm = Vec::with_capacity(2 * ENTROPY_BYTES);
        ikm.extend_from_slice(local.bytes());
        ikm.extend_from_slice(external.bytes());

        let uds = DerivationReader::new(&ikm, "uds", 1).read_array()?;
        Ok(Self(uds))
    }

    /// Derive the platform's identity parameter
    pub fn identity(&self) -> Result<Entropy, DeriveError> {
        let id: [u8; ENTROPY_BYTES] =
            DerivationReader::new(&self.0, "uds:identity", 1).read_array()?;
        Ok(id.into())
    }

    /// Derive the platform's authentication parameter
    pub fn authentication(&self) -> Result<Entropy, DeriveError> {
        let auth: [u8; ENTROPY_BYTES] =
            DerivationReader::new(&self.0, "uds:authentication", 1).read_array()?;
        Ok(auth.into())
    }

    /// Derive the platform's Ed25519 SSH host key
    pub fn ssh_host_key(&self) -> Result<HostKey, DeriveError> {
        let mut reader = DerivationReader::new(&self.0, "uds:ssh", 1);
        HostKey::generate(&mut reader, HOST_KEY_COMMENT)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn derive_all(uds: &UniqueDeviceSecret) -> (Entropy, Entropy, HostKey) {
        (
            uds.identity().unwrap(),
            uds.authentication().unwrap(),
            uds.ssh_host_key().unwrap(),
        )
    }

    #[test]
    fn test_mix_is_sensitive_to_both_inputs() {
        let zero = Entropy::default();
        let one = Entropy::from([1u8; ENTROPY_BYTES]);

        let base = UniqueDeviceSecret::mix(&zero, &zero).unwrap();
        assert_eq!(base, UniqueDeviceSecret::mix(&zero, &zero).unwrap());
        assert_ne!(base, UniqueDeviceSecret::mix(&one, &zero).unwrap());
        assert_ne!(base, UniqueDeviceSecret::mix(&zero, &one).unwrap());
        // mixing is ordered: swapping the inputs changes the result
        assert_ne!(
            UniqueDeviceSecret::mix(&one, &zero).unwrap(),
            UniqueDeviceSecret::mix(&zero, &one).unwrap()
        );
    }

    #[test]
    fn test_derivations_are_pure() {
        let uds = UniqueDeviceSecret::from([0u8; UDS_BYTES]);
        let (id1, auth1, hk1) = derive_all(&uds);
        let (id2, auth2, hk2) = derive_all(&uds);

        assert_eq!(id1, id2);
        assert_eq!(auth1, auth2);
        assert_eq!(hk1, hk2);
        assert_eq!(hk1.comment(), HOST_KEY_COMMENT);
    }

    #[test]
    fn test_different_uds_different_outputs() {
        let (id1, auth1, hk1) = derive_all(&UniqueDeviceSecret::from([0u8; UDS_BYTES]));
        let (id2, auth2, hk2) = derive_all(&UniqueDeviceSecret::from([1u8; UDS_BYTES]));

        assert_ne!(id1, id2);
        assert_ne!(auth1, auth2);
        assert_ne!(hk1, hk2);
    }

    #[test]
    fn test_outputs_are_domain_separated() {
        let uds = UniqueDeviceSecret::from([7u8; UDS_BYTES]);
        assert_ne!(uds.identity().unwrap(), uds.authentication().unwrap());
    }
}
