//! COSE public key pass-through
//!
//! Credential public keys arrive here already COSE-encoded (RFC 9052) by the
//! key generation layer. The attestation encoders splice those bytes into
//! Attested Credential Data verbatim, so this module only provides an opaque
//! wrapper that keeps the byte string intact.

/// An opaque, already-encoded COSE public key
///
/// The wrapped bytes are a complete CBOR map (for ES256: kty, alg, crv,
/// x and y). They are never re-encoded, which keeps the attestation output
/// independent of any CBOR library's map ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosePublicKey {
    bytes: Vec<u8>,
}

impl CosePublicKey {
    /// Wrap an externally produced COSE key encoding
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the raw COSE key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the encoding in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the encoding is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the wrapper and return the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for CosePublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for CosePublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
