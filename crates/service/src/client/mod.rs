//! The operator-side half of the provisioning protocol.
//!
//! The client derives the same certificate and Basic-Auth password as the
//! server from the shared one-time password, trusts only that certificate,
//! and drives the three-phase exchange over HTTPS.  It performs no
//! implicit retries; tolerating a server that is not yet listening is the
//! caller's responsibility.

mod error;

pub use error::ClientError;

use std::net::{IpAddr, SocketAddr};

use serde::Serialize;

use common::prelude::{OneTimePassword, DUMMY_SERVER_NAME};

use crate::http::add_data::{AddDataRequest, AddDataWire};
use crate::http::add_secure_boot::{AddSecureBootRequest, AddSecureBootWire};
use crate::http::commit::CommitResponse;
use crate::http::{Endpoint, BASIC_AUTH_USER, PROTOCOL};

/// Secure-boot key material the operator may submit
#[derive(Clone)]
pub struct SecureBootKeys {
    pub pk: Vec<u8>,
    pub kek: Vec<u8>,
    pub db: Vec<u8>,
    pub dbx: Option<Vec<u8>>,
    pub reboot_into_uefi_menu: bool,
}

/// Configuration for the provisioning client
#[derive(Clone)]
pub struct ClientConfig {
    /// Shared secret between the operator and the device
    pub secret: String,
    /// Address the device listens on
    pub remote_ip: IpAddr,
    /// Port the device listens on
    pub remote_port: u16,
    /// Secure-boot key material to submit, if any
    pub secure_boot: Option<SecureBootKeys>,
}

pub struct Client {
    config: ClientConfig,
    client: reqwest::Client,
    basic_auth_password: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let otp = OneTimePassword::derive(&config.secret)?;
        let certificate = reqwest::Certificate::from_der(&otp.certificate_der()?)?;
        let basic_auth_password = otp.basic_auth_password()?;

        // The derived certificate names DUMMY_SERVER_NAME, never the real
        // address; pin that name to the configured target and trust
        // nothing else.
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(certificate)
            .resolve(
                DUMMY_SERVER_NAME,
                SocketAddr::new(config.remote_ip, config.remote_port),
            )
            .build()?;

        let base_url = format!(
            "https://{}:{}/{}/",
            DUMMY_SERVER_NAME, config.remote_port, PROTOCOL
        );
        Ok(Self {
            config,
            client,
            basic_auth_password,
            base_url,
        })
    }

    /// Contribute fresh entropy and the current time to the session.
    /// Returns the submitted values so the caller can display them.
    pub async fn contribute_entropy(&self) -> Result<AddDataRequest, ClientError> {
        let request =
            AddDataRequest::generate().map_err(|e| ClientError::BuildRequest(e.to_string()))?;
        self.post(Endpoint::AddData, &AddDataWire::from(&request))
            .await?;
        Ok(request)
    }

    /// Submit the configured secure-boot key material
    pub async fn submit_secure_boot_keys(&self) -> Result<(), ClientError> {
        let keys = self
            .config
            .secure_boot
            .as_ref()
            .ok_or(ClientError::MissingSecureBootKeys)?;
        let request = AddSecureBootRequest::new(
            keys.pk.clone(),
            keys.kek.clone(),
            keys.db.clone(),
            keys.dbx.clone(),
            keys.reboot_into_uefi_menu,
        )
        .map_err(|e| ClientError::BuildRequest(e.to_string()))?;
        self.post(Endpoint::AddSecureBoot, &AddSecureBootWire::from(&request))
            .await?;
        Ok(())
    }

    /// Commit the session, receiving the minted device identifiers
    pub async fn commit(&self) -> Result<CommitResponse, ClientError> {
        let body = self.get(Endpoint::Commit).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.name())
    }

    async fn get(&self, endpoint: Endpoint) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .basic_auth(BASIC_AUTH_USER, Some(&self.basic_auth_password))
            .send()
            .await?;
        Self::read_body(response).await
    }

    async fn post<T: Serialize>(
        &self,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .basic_auth(BASIC_AUTH_USER, Some(&self.basic_auth_password))
            .json(body)
            .send()
            .await?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus(status, message));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
