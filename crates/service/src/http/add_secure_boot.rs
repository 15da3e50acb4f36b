use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::state::ServerState;
use crate::storage::StorageError;

/// Wire format of an add-secure-boot request.  The signature databases are
/// authentication_v2 descriptors, base64 encoded; this layer never looks
/// inside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSecureBootWire {
    pub pk: Option<String>,
    pub kek: Option<String>,
    pub db: Option<String>,
    pub dbx: Option<String>,
    #[serde(default)]
    pub reboot_into_uefi_menu: bool,
}

/// A validated request to provision secure-boot keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSecureBootRequest {
    pub pk: Vec<u8>,
    pub kek: Vec<u8>,
    pub db: Vec<u8>,
    pub dbx: Option<Vec<u8>>,
    pub reboot_into_uefi_menu: bool,
}

impl AddSecureBootRequest {
    /// Build a request; PK, KEK, and db must be non-empty
    pub fn new(
        pk: Vec<u8>,
        kek: Vec<u8>,
        db: Vec<u8>,
        dbx: Option<Vec<u8>>,
        reboot_into_uefi_menu: bool,
    ) -> Result<Self, AddSecureBootError> {
        for (name, blob) in [("PK", &pk), ("KEK", &kek), ("db", &db)] {
            if blob.is_empty() {
                return Err(AddSecureBootError::InvalidRequest(format!(
                    "{name} is required"
                )));
            }
        }
        Ok(Self {
            pk,
            kek,
            db,
            dbx: dbx.filter(|blob| !blob.is_empty()),
            reboot_into_uefi_menu,
        })
    }
}

impl TryFrom<AddSecureBootWire> for AddSecureBootRequest {
    type Error = AddSecureBootError;

    fn try_from(wire: AddSecureBootWire) -> Result<Self, Self::Error> {
        let decode = |name: &str, field: Option<String>| -> Result<Vec<u8>, AddSecureBootError> {
            let encoded = field.ok_or_else(|| {
                AddSecureBootError::InvalidRequest(format!("{name} is required"))
            })?;
            STANDARD.decode(encoded).map_err(|_| {
                AddSecureBootError::InvalidRequest(format!("{name} is not valid base64"))
            })
        };

        let pk = decode("PK", wire.pk)?;
        let kek = decode("KEK", wire.kek)?;
        let db = decode("db", wire.db)?;
        let dbx = wire
            .dbx
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|_| {
                    AddSecureBootError::InvalidRequest("dbx is not valid base64".into())
                })
            })
            .transpose()?;
        Self::new(pk, kek, db, dbx, wire.reboot_into_uefi_menu)
    }
}

impl From<&AddSecureBootRequest> for AddSecureBootWire {
    fn from(request: &AddSecureBootRequest) -> Self {
        Self {
            pk: Some(STANDARD.encode(&request.pk)),
            kek: Some(STANDARD.encode(&request.kek)),
            db: Some(STANDARD.encode(&request.db)),
            dbx: request.dbx.as_ref().map(|blob| STANDARD.encode(blob)),
            reboot_into_uefi_menu: request.reboot_into_uefi_menu,
        }
    }
}

pub async fn handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<impl IntoResponse, AddSecureBootError> {
    // initial key provisioning requires the firmware to be in setup mode
    match state.secure_boot().is_setup_mode() {
        Ok(true) => {}
        Ok(false) => return Err(AddSecureBootError::NotInSetupMode),
        Err(e) => return Err(AddSecureBootError::SetupMode(e)),
    }

    let wire: AddSecureBootWire = serde_json::from_slice(&body)?;
    let request = AddSecureBootRequest::try_from(wire)?;
    state
        .secure_boot()
        .store(
            &request.pk,
            &request.kek,
            &request.db,
            request.dbx.as_deref(),
        )
        .map_err(AddSecureBootError::Rejected)?;

    if request.reboot_into_uefi_menu {
        state
            .secure_boot()
            .request_reboot_into_firmware_menu()
            .map_err(AddSecureBootError::Reboot)?;
    }
    Ok(http::StatusCode::OK)
}

#[derive(Debug, thiserror::Error)]
pub enum AddSecureBootError {
    #[error("not in Secure Boot setup mode")]
    NotInSetupMode,
    #[error("read setup mode: {0}")]
    SetupMode(StorageError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("provision secure boot keys: {0}")]
    Rejected(StorageError),
    #[error("request reboot into firmware menu: {0}")]
    Reboot(StorageError),
}

impl IntoResponse for AddSecureBootError {
    fn into_response(self) -> Response {
        tracing::warn!("add-secure-boot request failed: {}", self);
        match self {
            AddSecureBootError::NotInSetupMode | AddSecureBootError::SetupMode(_) => {
                (http::StatusCode::FORBIDDEN, format!("Forbidden: {}", self)).into_response()
            }
            AddSecureBootError::InvalidRequest(_)
            | AddSecureBootError::Json(_)
            | AddSecureBootError::Rejected(_) => {
                (http::StatusCode::BAD_REQUEST, format!("Bad request: {}", self)).into_response()
            }
            AddSecureBootError::Reboot(_) => (
                http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
                .into_response(),
        }
    }
}
