//! The provisioning protocol: an HTTPS server and client pair whose mutual
//! trust is bootstrapped entirely from a shared one-time password.
//!
//! The server (device side) listens with an OTP-derived TLS identity and
//! serves three endpoints behind an access-control chain; the client
//! (operator side) trusts only the OTP-derived certificate and drives the
//! three-phase exchange: contribute entropy, optionally provision
//! secure-boot key material, commit.

pub mod client;
pub mod config;
pub mod http;
pub mod process;
pub mod state;
pub mod storage;

pub use client::{Client, ClientConfig, ClientError, SecureBootKeys};
pub use config::ServerConfig;
pub use process::{Server, ServerError, ServerPhase};
pub use state::{ServerState, Session};
