use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::crypto::{DeriveError, EntropyError};
use common::prelude::{Entropy, UniqueDeviceSecret};

use crate::state::{AlreadyCommitted, ServerState};

/// The output of a commit request: everything the operator needs to
/// recognize the device later.  Authentication and identity are hex
/// encoded; the fingerprint is the standard SSH rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub fingerprint: String,
    pub hostname: String,
    pub authentication: String,
    pub identity: String,
}

impl CommitResponse {
    /// Derive the response values from a unique device secret
    pub fn build(uds: &UniqueDeviceSecret, hostname: &str) -> Result<Self, CommitError> {
        let host_key = uds.ssh_host_key()?;
        Ok(Self {
            fingerprint: host_key.fingerprint(),
            hostname: hostname.to_string(),
            authentication: uds.authentication()?.to_hex(),
            identity: uds.identity()?.to_hex(),
        })
    }
}

pub async fn handler(State(state): State<ServerState>) -> Result<impl IntoResponse, CommitError> {
    let local = Entropy::generate()?;
    let uds = UniqueDeviceSecret::mix(&local, &state.session().entropy())?;
    let response = CommitResponse::build(&uds, state.hostname())?;

    state.session().commit(uds)?;
    tracing::info!(hostname = %response.hostname, "session committed");
    Ok((http::StatusCode::OK, Json(response)))
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("generate entropy: {0}")]
    Entropy(#[from] EntropyError),
    #[error("derive unique device secret: {0}")]
    Derive(#[from] DeriveError),
    #[error(transparent)]
    Conflict(#[from] AlreadyCommitted),
}

impl IntoResponse for CommitError {
    fn into_response(self) -> Response {
        match self {
            CommitError::Conflict(_) => {
                tracing::warn!("rejected repeated commit request");
                (http::StatusCode::CONFLICT, "session already committed").into_response()
            }
            CommitError::Entropy(_) | CommitError::Derive(_) => {
                tracing::error!("commit derivation failed: {}", self);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                )
                    .into_response()
            }
        }
    }
}
