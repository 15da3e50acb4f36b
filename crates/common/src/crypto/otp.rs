use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use rcgen::{
    CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose,
    SerialNumber,
};
use time::OffsetDateTime;

use super::derive::{DerivationReader, DeriveError, EntropySource};

/// The DNS name embedded in every derived certificate.
///
/// Both sides must reconstruct byte-identical certificate material without
/// ever exchanging it, so the real network address cannot be embedded.  The
/// client pins this name instead and maps it to the target address itself.
pub const DUMMY_SERVER_NAME: &str = "stprov";

const OTP_BYTES: usize = 32;

/// Errors that can occur deriving one-time-password material
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error(transparent)]
    Derive(#[from] DeriveError),
    #[error("encode private key: {0}")]
    Pkcs8(#[from] ed25519_dalek::pkcs8::Error),
    #[error("derive certificate: {0}")]
    Certificate(#[from] rcgen::Error),
}

/// Certificate and private key in DER, derived from a one-time password.
///
/// The server uses both as its TLS identity; the client uses only the
/// certificate, as its sole trust anchor.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    pub certificate_der: Vec<u8>,
    /// PKCS#8 v2 encoding of the Ed25519 key.
    pub private_key_der: Vec<u8>,
}

/// A one-time password bootstrapping mutually authenticated HTTPS.
///
/// Derived from a short secret exchanged out-of-band.  Everything the two
/// parties need to authenticate each other — the TLS certificate and the
/// Basic-Auth password — is a deterministic function of this value, so
/// nothing is ever transmitted.
pub struct OneTimePassword([u8; OTP_BYTES]);

impl OneTimePassword {
    /// Derive a one-time password from a shared secret
    pub fn derive(secret: &str) -> Result<Self, OtpError> {
        let otp = DerivationReader::new(secret.as_bytes(), "otp", 1).read_array()?;
        Ok(Self(otp))
    }

    /// Derive the Basic-Auth password, rendered as hex
    pub fn basic_auth_password(&self) -> Result<String, OtpError> {
        let pw: [u8; 32] =
            DerivationReader::new(&self.0, "otp:basicAuthPassword", 1).read_array()?;
        Ok(hex::encode(pw))
    }

    /// Derive the TLS identity: an Ed25519 key pair and a self-signed
    /// certificate over it.
    ///
    /// The certificate template is fixed — serial number 0, validity from
    /// the Unix epoch to the maximum 32-bit time value, digital-signature
    /// and data-encipherment key usage, client- and server-auth extended
    /// usage, and [`DUMMY_SERVER_NAME`] as the only DNS name.  Ed25519
    /// signatures are deterministic, so two independent derivations from
    /// the same password produce byte-identical DER.
    pub fn tls_identity(&self) -> Result<TlsIdentity, OtpError> {
        let seed: [u8; 32] = DerivationReader::new(&self.0, "otp:keygen", 1).read_array()?;
        let signing_key = SigningKey::from_bytes(&seed);
        let pkcs8 = signing_key.to_pkcs8_der()?;
        let key_pair = KeyPair::try_from(pkcs8.as_bytes())?;

        let mut params = CertificateParams::new(vec![DUMMY_SERVER_NAME.to_string()])?;
        params.distinguished_name = DistinguishedName::new();
        params.serial_number = Some(SerialNumber::from(vec![0u8]));
        params.not_before = OffsetDateTime::UNIX_EPOCH;
        params.not_after = OffsetDateTime::from_unix_timestamp(i64::from(i32::MAX))
            .expect("maximum 32-bit time value is representable");
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::DataEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];

        let certificate = params.self_signed(&key_pair)?;
        Ok(TlsIdentity {
            certificate_der: certificate.der().to_vec(),
            private_key_der: pkcs8.as_bytes().to_vec(),
        })
    }

    /// Derive only the certificate, the client's trust anchor
    pub fn certificate_der(&self) -> Result<Vec<u8>, OtpError> {
        Ok(self.tls_identity()?.certificate_der)
    }

    /// Get a reference to the one-time-password bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}
