use hkdf::Hkdf;
use sha2::Sha256;

/// Maximum output length of a single derivation stream.
/// Per RFC 5869: L <= 255 * HashLen = 255 * 32 = 8160 bytes.
pub const MAX_STREAM_LEN: usize = 255 * 32;

/// Domain-separation prefix applied to every derivation label.
const LABEL_PREFIX: &str = "stprov:";

/// Errors that can occur while producing randomness
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    #[error("derivation stream exhausted: {0} bytes exceeds the HKDF-SHA256 output limit")]
    StreamExhausted(usize),
    #[error("system randomness unavailable: {0}")]
    Random(#[from] getrandom::Error),
}

/// A source of (pseudo)random bytes.
///
/// Implemented both by the operating system RNG and by [`DerivationReader`],
/// so key generation can run off real entropy or off a deterministic,
/// secret-derived stream through the same interface.
pub trait EntropySource {
    /// Fill `buf` completely with the next bytes of the source.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DeriveError>;

    /// Read the next `N` bytes as a fixed-size array.
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DeriveError> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }
}

/// The operating system's cryptographically secure RNG.
pub struct SystemRandom;

impl EntropySource for SystemRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DeriveError> {
        getrandom::getrandom(buf)?;
        Ok(())
    }
}

/// A deterministic pseudorandom byte stream derived from a secret.
///
/// The stream is HKDF-SHA256 with the counter (rendered as a decimal
/// string) as the extract salt and `"stprov:" + label` as the expand info.
/// Identical `(secret, label, counter)` triples always yield the identical
/// stream; changing any one of the three yields an unrelated stream.
/// Consumers read exactly as many bytes as they need, in order.
pub struct DerivationReader {
    prk: Hkdf<Sha256>,
    info: Vec<u8>,
    pos: usize,
}

impl DerivationReader {
    pub fn new(secret: &[u8], label: &str, counter: u32) -> Self {
        let salt = counter.to_string();
        let prk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret);
        let info = format!("{LABEL_PREFIX}{label}").into_bytes();
        Self { prk, info, pos: 0 }
    }
}

impl EntropySource for DerivationReader {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DeriveError> {
        let end = self.pos + buf.len();
        if end > MAX_STREAM_LEN {
            return Err(DeriveError::StreamExhausted(end));
        }

        // Sequential reads must see one continuous stream, so expand the
        // full prefix and hand out the tail.  Reads are tiny (tens of
        // bytes), so re-expanding the prefix costs nothing measurable.
        let mut okm = vec![0u8; end];
        self.prk
            .expand(&self.info, &mut okm)
            .map_err(|_| DeriveError::StreamExhausted(end))?;
        buf.copy_from_slice(&okm[self.pos..]);
        self.pos = end;
        Ok(())
    }
}
