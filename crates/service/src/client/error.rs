use reqwest::StatusCode;

use common::crypto::OtpError;

/// Errors surfaced by the provisioning client.
///
/// Transport failures (including a TLS handshake rejected because the two
/// sides derived from different passwords) appear as [`ClientError::Request`];
/// an HTTP-level rejection carries the status and the server's message.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error("build request: {0}")]
    BuildRequest(String),
    #[error("no secure boot keys configured")]
    MissingSecureBootKeys,
}
