//! Core building blocks for OTP-bootstrapped provisioning: the labeled
//! secret-derivation engine, one-time-password trust material, long-term
//! device secrets, and the OpenSSH host-key codec.

pub mod crypto;
pub mod ssh;

pub mod prelude {
    pub use crate::crypto::{
        DerivationReader, Entropy, EntropySource, OneTimePassword, SystemRandom, TlsIdentity,
        UniqueDeviceSecret, DUMMY_SERVER_NAME, ENTROPY_BYTES,
    };
    pub use crate::ssh::HostKey;
}
