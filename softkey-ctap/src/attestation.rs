//! Authenticator Data and Attestation Object encoding
//!
//! These are the structures a relying party verifies cryptographically, so
//! the byte layout is fixed down to CBOR map entry order:
//!
//! - Attested Credential Data: `aaguid (16) | credentialIdLength (2, BE) |
//!   credentialId | credentialPublicKey (COSE)`
//! - Authenticator Data: `rpIdHash (32) | flags (1) | signCount (4, BE) |
//!   [attestedCredentialData] | [extensions]`
//! - Attestation Object: CBOR map `{1: fmt, 2: authData, 3: attStmt}`
//!
//! Spec: <https://www.w3.org/TR/webauthn-2/#sctn-attestation>

use crate::cbor::MapBuilder;
use crate::cose::CosePublicKey;
use crate::error::{EncodeError, Result};

use ciborium::value::Value;

/// Authenticator Data flags byte
///
/// Bit positions per the WebAuthn authenticator data layout: UP at bit 0,
/// UV at bit 2, AT at bit 6, ED at bit 7. The remaining bits are reserved
/// and always emitted as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// User Present
    pub up: bool,
    /// User Verified
    pub uv: bool,
    /// Attested credential data included
    pub at: bool,
    /// Extension data included
    pub ed: bool,
}

impl Flags {
    const UP: u8 = 1 << 0;
    const UV: u8 = 1 << 2;
    const AT: u8 = 1 << 6;
    const ED: u8 = 1 << 7;

    /// Pack into the wire byte
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.up {
            bits |= Self::UP;
        }
        if self.uv {
            bits |= Self::UV;
        }
        if self.at {
            bits |= Self::AT;
        }
        if self.ed {
            bits |= Self::ED;
        }
        bits
    }

    /// Unpack from the wire byte, ignoring reserved bits
    pub fn from_bits(bits: u8) -> Self {
        Self {
            up: bits & Self::UP != 0,
            uv: bits & Self::UV != 0,
            at: bits & Self::AT != 0,
            ed: bits & Self::ED != 0,
        }
    }
}

/// Attested Credential Data
///
/// The credential-bearing substructure of Authenticator Data, present when
/// the AT flag is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    /// Authenticator model identifier (16 bytes)
    pub aaguid: [u8; 16],
    /// Declared credential id length, big-endian on the wire
    pub credential_length: u16,
    /// Credential id
    pub credential_id: Vec<u8>,
    /// COSE-encoded credential public key, spliced in verbatim
    pub credential_public_key: CosePublicKey,
}

impl AttestedCredentialData {
    /// Create attested credential data, deriving the declared length from
    /// the credential id
    pub fn new(
        aaguid: [u8; 16],
        credential_id: Vec<u8>,
        credential_public_key: CosePublicKey,
    ) -> Result<Self> {
        let credential_length =
            u16::try_from(credential_id.len()).map_err(|_| EncodeError::InvalidLength)?;
        Ok(Self {
            aaguid,
            credential_length,
            credential_id,
            credential_public_key,
        })
    }

    /// Encode to the wire layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        if usize::from(self.credential_length) != self.credential_id.len() {
            return Err(EncodeError::InvalidLength);
        }
        let mut out = Vec::with_capacity(
            16 + 2 + self.credential_id.len() + self.credential_public_key.len(),
        );
        out.extend_from_slice(&self.aaguid);
        out.extend_from_slice(&self.credential_length.to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(self.credential_public_key.as_bytes());
        Ok(out)
    }
}

/// Authenticator Data
///
/// The signed preimage binding a credential to a relying party and a
/// signature counter. Hashing the RP id is the caller's job; this type only
/// lays out bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying party id
    pub rp_id_hash: [u8; 32],
    /// Flags byte
    pub flags: Flags,
    /// Signature counter, big-endian on the wire
    pub sign_count: u32,
    /// Attested credential data, emitted when `flags.at` is set
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// Raw CBOR extensions map, emitted when `flags.ed` is set
    pub extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    /// Encode to the wire layout
    ///
    /// The flags byte is authoritative: a field is emitted iff its flag is
    /// set, and a set flag without its field is an error.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(37);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.sign_count.to_be_bytes());

        if self.flags.at {
            let acd = self
                .attested_credential_data
                .as_ref()
                .ok_or(EncodeError::InvalidState)?;
            out.extend_from_slice(&acd.encode()?);
        }

        if self.flags.ed {
            let extensions = self.extensions.as_ref().ok_or(EncodeError::InvalidState)?;
            out.extend_from_slice(extensions);
        }

        Ok(out)
    }

    /// Parse authenticator data back from its wire layout
    ///
    /// The COSE key and the extensions map are variable-length CBOR items,
    /// so their boundaries are found by decoding one item at a time.
    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() < 37 {
            return Err(EncodeError::InvalidLength);
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&input[..32]);
        let flags = Flags::from_bits(input[32]);
        let sign_count = u32::from_be_bytes([input[33], input[34], input[35], input[36]]);
        let mut offset = 37;

        let attested_credential_data = if flags.at {
            if input.len() < offset + 18 {
                return Err(EncodeError::InvalidLength);
            }
            let mut aaguid = [0u8; 16];
            aaguid.copy_from_slice(&input[offset..offset + 16]);
            offset += 16;

            let credential_length = u16::from_be_bytes([input[offset], input[offset + 1]]);
            offset += 2;

            let id_len = usize::from(credential_length);
            if input.len() < offset + id_len {
                return Err(EncodeError::InvalidLength);
            }
            let credential_id = input[offset..offset + id_len].to_vec();
            offset += id_len;

            let key_len = cbor_item_len(&input[offset..])?;
            let credential_public_key =
                CosePublicKey::from_bytes(input[offset..offset + key_len].to_vec());
            offset += key_len;

            Some(AttestedCredentialData {
                aaguid,
                credential_length,
                credential_id,
                credential_public_key,
            })
        } else {
            None
        };

        let extensions = if flags.ed {
            let rest = &input[offset..];
            if cbor_item_len(rest)? != rest.len() {
                return Err(EncodeError::InvalidLength);
            }
            offset = input.len();
            Some(rest.to_vec())
        } else {
            None
        };

        if offset != input.len() {
            return Err(EncodeError::InvalidLength);
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }
}

/// Length in bytes of the first CBOR item in `input`
fn cbor_item_len(input: &[u8]) -> Result<usize> {
    let mut cursor = std::io::Cursor::new(input);
    let _: Value = ciborium::from_reader(&mut cursor).map_err(|_| EncodeError::Cbor)?;
    Ok(cursor.position() as usize)
}

/// Attestation statement carried inside the Attestation Object
///
/// Only the `none` format is produced here. Other formats are assembled by
/// the attestation provider that owns the signing keys; they pass through as
/// a pre-built CBOR map.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    /// The `none` format: an empty statement map
    None,
    /// A format-specific statement, supplied as a finished CBOR map
    Custom {
        /// Registered attestation format identifier (e.g. `packed`)
        fmt: String,
        /// Statement map for that format
        stmt: Value,
    },
}

impl AttestationStatement {
    /// The format identifier written under map key 1
    pub fn format(&self) -> &str {
        match self {
            AttestationStatement::None => "none",
            AttestationStatement::Custom { fmt, .. } => fmt,
        }
    }

    fn to_value(&self) -> Result<Value> {
        match self {
            AttestationStatement::None => Ok(Value::Map(Vec::new())),
            AttestationStatement::Custom { stmt, .. } => match stmt {
                Value::Map(_) => Ok(stmt.clone()),
                _ => Err(EncodeError::InvalidState),
            },
        }
    }
}

/// The Attestation Object envelope
///
/// A CBOR map of exactly three entries with integer keys 1 (fmt), 2
/// (authData) and 3 (attStmt), emitted in that order so the output does not
/// depend on any map container's iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    /// Encoded authenticator data
    pub auth_data: Vec<u8>,
    /// Attestation statement
    pub statement: AttestationStatement,
}

impl AttestationObject {
    /// Create an attestation object
    pub fn new(auth_data: Vec<u8>, statement: AttestationStatement) -> Self {
        Self {
            auth_data,
            statement,
        }
    }

    /// Encode the CBOR envelope
    pub fn encode(&self) -> Result<Vec<u8>> {
        MapBuilder::new()
            .insert(1, Value::Text(self.statement.format().to_string()))
            .insert(2, Value::Bytes(self.auth_data.clone()))
            .insert(3, self.statement.to_value()?)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ES256 COSE key map: {1: 2, 3: -7, -1: 1, -2: x, -3: y}
    fn test_cose_key() -> CosePublicKey {
        let mut bytes = vec![0xA5, 0x01, 0x02, 0x03, 0x26, 0x20, 0x01, 0x21, 0x58, 0x20];
        bytes.extend_from_slice(&[0xAA; 32]);
        bytes.extend_from_slice(&[0x22, 0x58, 0x20]);
        bytes.extend_from_slice(&[0xBB; 32]);
        CosePublicKey::from_bytes(bytes)
    }

    fn test_acd() -> AttestedCredentialData {
        let credential_id: Vec<u8> = (0u8..64).collect();
        AttestedCredentialData::new([0u8; 16], credential_id, test_cose_key()).unwrap()
    }

    #[test]
    fn test_acd_layout() {
        let acd = test_acd();
        let bytes = acd.encode().unwrap();

        assert_eq!(&bytes[..16], &[0u8; 16]);
        assert_eq!(&bytes[16..18], &[0x00, 0x40]);
        assert_eq!(&bytes[18..82], &(0u8..64).collect::<Vec<u8>>()[..]);
        assert_eq!(
            &bytes[82..92],
            &[0xA5, 0x01, 0x02, 0x03, 0x26, 0x20, 0x01, 0x21, 0x58, 0x20]
        );
        assert_eq!(bytes.len(), 16 + 2 + 64 + acd.credential_public_key.len());
    }

    #[test]
    fn test_acd_length_mismatch() {
        let mut acd = test_acd();
        acd.credential_length = 63;
        assert_eq!(acd.encode(), Err(EncodeError::InvalidLength));
    }

    #[test]
    fn test_acd_oversized_id() {
        let result = AttestedCredentialData::new(
            [0u8; 16],
            vec![0u8; usize::from(u16::MAX) + 1],
            test_cose_key(),
        );
        assert_eq!(result, Err(EncodeError::InvalidLength));
    }

    #[test]
    fn test_flags_round_trip() {
        for bits in 0..16u8 {
            let flags = Flags {
                up: bits & 1 != 0,
                uv: bits & 2 != 0,
                at: bits & 4 != 0,
                ed: bits & 8 != 0,
            };
            assert_eq!(Flags::from_bits(flags.bits()), flags);
        }
    }

    #[test]
    fn test_flags_bit_positions() {
        assert_eq!(
            Flags {
                up: true,
                at: true,
                ..Flags::default()
            }
            .bits(),
            0x41
        );
        assert_eq!(
            Flags {
                ed: true,
                ..Flags::default()
            }
            .bits(),
            0x80
        );
    }

    #[test]
    fn test_authdata_layout() {
        let rp_id_hash = [0x21u8; 32];
        let acd = test_acd();
        let acd_bytes = acd.encode().unwrap();

        let auth_data = AuthenticatorData {
            rp_id_hash,
            flags: Flags {
                up: true,
                at: true,
                ..Flags::default()
            },
            sign_count: 0,
            attested_credential_data: Some(acd),
            extensions: None,
        };

        let bytes = auth_data.encode().unwrap();
        assert_eq!(&bytes[..32], &rp_id_hash);
        assert_eq!(bytes[32], 0x41);
        assert_eq!(&bytes[33..37], &[0, 0, 0, 0]);
        assert_eq!(&bytes[37..], &acd_bytes[..]);
    }

    #[test]
    fn test_authdata_missing_acd() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: Flags {
                at: true,
                ..Flags::default()
            },
            sign_count: 0,
            attested_credential_data: None,
            extensions: None,
        };
        assert_eq!(auth_data.encode(), Err(EncodeError::InvalidState));
    }

    #[test]
    fn test_authdata_missing_extensions() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: Flags {
                ed: true,
                ..Flags::default()
            },
            sign_count: 0,
            attested_credential_data: None,
            extensions: None,
        };
        assert_eq!(auth_data.encode(), Err(EncodeError::InvalidState));
    }

    #[test]
    fn test_authdata_emits_extensions() {
        // {"hmac-secret": true}
        let extensions = vec![
            0xA1, 0x6B, b'h', b'm', b'a', b'c', b'-', b's', b'e', b'c', b'r', b'e', b't', 0xF5,
        ];
        let auth_data = AuthenticatorData {
            rp_id_hash: [7u8; 32],
            flags: Flags {
                up: true,
                ed: true,
                ..Flags::default()
            },
            sign_count: 3,
            attested_credential_data: None,
            extensions: Some(extensions.clone()),
        };

        let bytes = auth_data.encode().unwrap();
        assert_eq!(&bytes[37..], &extensions[..]);
    }

    #[test]
    fn test_authdata_unflagged_fields_not_emitted() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: Flags {
                up: true,
                ..Flags::default()
            },
            sign_count: 9,
            attested_credential_data: Some(test_acd()),
            extensions: None,
        };
        assert_eq!(auth_data.encode().unwrap().len(), 37);
    }

    #[test]
    fn test_authdata_round_trip() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0x18u8; 32],
            flags: Flags {
                up: true,
                uv: true,
                at: true,
                ..Flags::default()
            },
            sign_count: 0x01020304,
            attested_credential_data: Some(test_acd()),
            extensions: None,
        };

        let decoded = AuthenticatorData::decode(&auth_data.encode().unwrap()).unwrap();
        assert_eq!(decoded, auth_data);
    }

    #[test]
    fn test_authdata_round_trip_with_extensions() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0x0Eu8; 32],
            flags: Flags {
                up: true,
                at: true,
                ed: true,
                ..Flags::default()
            },
            sign_count: 1,
            attested_credential_data: Some(test_acd()),
            extensions: Some(vec![0xA0]),
        };

        let decoded = AuthenticatorData::decode(&auth_data.encode().unwrap()).unwrap();
        assert_eq!(decoded, auth_data);
    }

    #[test]
    fn test_authdata_decode_rejects_trailing_bytes() {
        let auth_data = AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: Flags {
                up: true,
                ..Flags::default()
            },
            sign_count: 0,
            attested_credential_data: None,
            extensions: None,
        };
        let mut bytes = auth_data.encode().unwrap();
        bytes.push(0x00);
        assert_eq!(
            AuthenticatorData::decode(&bytes),
            Err(EncodeError::InvalidLength)
        );
    }

    #[test]
    fn test_attestation_object_none() {
        let auth_data = vec![0x11; 37];
        let object = AttestationObject::new(auth_data.clone(), AttestationStatement::None);
        let bytes = object.encode().unwrap();

        let mut expected = vec![0xA3];
        expected.extend_from_slice(&[0x01, 0x64, b'n', b'o', b'n', b'e']);
        expected.extend_from_slice(&[0x02, 0x58, 0x25]);
        expected.extend_from_slice(&auth_data);
        expected.extend_from_slice(&[0x03, 0xA0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_attestation_object_custom_format() {
        let stmt = Value::Map(vec![
            (Value::Text("alg".to_string()), Value::Integer((-7).into())),
            (Value::Text("sig".to_string()), Value::Bytes(vec![0x30])),
        ]);
        let object = AttestationObject::new(
            vec![0u8; 37],
            AttestationStatement::Custom {
                fmt: "packed".to_string(),
                stmt,
            },
        );

        let bytes = object.encode().unwrap();
        assert_eq!(bytes[0], 0xA3);
        // fmt text follows key 1
        assert_eq!(&bytes[1..9], &[0x01, 0x66, b'p', b'a', b'c', b'k', b'e', b'd']);
    }

    #[test]
    fn test_attestation_object_rejects_non_map_statement() {
        let object = AttestationObject::new(
            vec![0u8; 37],
            AttestationStatement::Custom {
                fmt: "packed".to_string(),
                stmt: Value::Integer(1.into()),
            },
        );
        assert_eq!(object.encode(), Err(EncodeError::InvalidState));
    }

    #[test]
    fn test_encoders_are_deterministic() {
        let acd = test_acd();
        assert_eq!(acd.encode().unwrap(), acd.encode().unwrap());

        let object = AttestationObject::new(vec![1, 2, 3], AttestationStatement::None);
        assert_eq!(object.encode().unwrap(), object.encode().unwrap());
    }
}
