//! Deterministic secret derivation.
//!
//! Every secret in the system is defined as output of one labeled,
//! counter-indexed HKDF stream over some input secret.  The one-time
//! password bootstraps short-term TLS and Basic-Auth material; the unique
//! device secret roots the long-term identifiers minted at commit time.

pub mod derive;
pub mod entropy;
pub mod otp;
pub mod uds;

pub use derive::{DerivationReader, DeriveError, EntropySource, SystemRandom};
pub use entropy::{Entropy, EntropyError, ENTROPY_BYTES};
pub use otp::{OneTimePassword, OtpError, TlsIdentity, DUMMY_SERVER_NAME};
pub use uds::{UniqueDeviceSecret, HOST_KEY_COMMENT};
