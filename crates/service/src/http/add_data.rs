use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use common::crypto::EntropyError;
use common::prelude::Entropy;

use crate::state::ServerState;

/// Wire format of an add-data request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDataWire {
    /// 256 bits of entropy, base64 encoded
    pub entropy: String,
    /// Unix timestamp of the provisioning run
    pub timestamp: i64,
}

/// A validated entropy contribution.
///
/// The timestamp is not consumed by derivation; it used to land in the
/// platform's host configuration and is carried until it is clear whether
/// it is coming back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddDataRequest {
    pub entropy: Entropy,
    pub timestamp: i64,
}

impl AddDataRequest {
    /// Build a request carrying fresh entropy and the current time
    pub fn generate() -> Result<Self, AddDataError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Ok(Self {
            entropy: Entropy::generate()?,
            timestamp,
        })
    }
}

impl TryFrom<AddDataWire> for AddDataRequest {
    type Error = AddDataError;

    fn try_from(wire: AddDataWire) -> Result<Self, Self::Error> {
        let entropy = STANDARD
            .decode(&wire.entropy)
            .map_err(|_| AddDataError::InvalidRequest("entropy is not valid base64".into()))?;
        let entropy = Entropy::from_slice(&entropy).map_err(|_| {
            AddDataError::InvalidRequest(format!(
                "invalid number of entropy bytes: {}",
                entropy.len()
            ))
        })?;
        if wire.timestamp < 0 {
            return Err(AddDataError::InvalidRequest(format!(
                "invalid unix timestamp {}",
                wire.timestamp
            )));
        }
        Ok(Self {
            entropy,
            timestamp: wire.timestamp,
        })
    }
}

impl From<&AddDataRequest> for AddDataWire {
    fn from(request: &AddDataRequest) -> Self {
        Self {
            entropy: STANDARD.encode(request.entropy.bytes()),
            timestamp: request.timestamp,
        }
    }
}

pub async fn handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<impl IntoResponse, AddDataError> {
    let wire: AddDataWire = serde_json::from_slice(&body)?;
    let request = AddDataRequest::try_from(wire)?;

    state
        .session()
        .store_contribution(request.entropy, request.timestamp);
    Ok(http::StatusCode::OK)
}

#[derive(Debug, thiserror::Error)]
pub enum AddDataError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("generate entropy: {0}")]
    Entropy(#[from] EntropyError),
}

impl IntoResponse for AddDataError {
    fn into_response(self) -> Response {
        tracing::warn!("invalid add-data request: {}", self);
        (http::StatusCode::BAD_REQUEST, format!("Bad request: {}", self)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::crypto::ENTROPY_BYTES;

    fn wire(entropy_bytes: usize, timestamp: i64) -> AddDataWire {
        AddDataWire {
            entropy: STANDARD.encode(vec![0xaa; entropy_bytes]),
            timestamp,
        }
    }

    #[test]
    fn test_wire_validation() {
        assert!(AddDataRequest::try_from(wire(ENTROPY_BYTES, 0)).is_ok());
        assert!(AddDataRequest::try_from(wire(ENTROPY_BYTES - 1, 0)).is_err());
        assert!(AddDataRequest::try_from(wire(ENTROPY_BYTES + 1, 0)).is_err());
        assert!(AddDataRequest::try_from(wire(ENTROPY_BYTES, -1)).is_err());
        assert!(AddDataRequest::try_from(AddDataWire {
            entropy: "not base64!".into(),
            timestamp: 0,
        })
        .is_err());
    }

    #[test]
    fn test_wire_roundtrip() {
        let request = AddDataRequest::generate().unwrap();
        let roundtripped = AddDataRequest::try_from(AddDataWire::from(&request)).unwrap();
        assert_eq!(request, roundtripped);
    }
}
