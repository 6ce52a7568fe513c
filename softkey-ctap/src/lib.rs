#![warn(unused_extern_crates)]

//! CTAP2 attestation byte formats.
//!
//! This crate owns the binary layouts a relying party verifies during
//! WebAuthn registration: Attested Credential Data, Authenticator Data and
//! the Attestation Object envelope. All encoders are pure functions over
//! typed structures and produce byte-for-byte reproducible output.
//!
//! Spec: <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>

pub mod attestation;
pub mod cbor;
pub mod cose;
pub mod error;

// Re-export the main types for convenience
pub use attestation::{
    AttestationObject, AttestationStatement, AttestedCredentialData, AuthenticatorData, Flags,
};
pub use cose::CosePublicKey;
pub use error::{EncodeError, Result};
