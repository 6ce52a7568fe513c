#![warn(unused_extern_crates)]

//! # softkey
//!
//! Building blocks for a software FIDO2/WebAuthn authenticator:
//!
//! - **Transport**: the CTAPHID transaction engine. Reassembles multi-frame
//!   requests across multiplexed logical channels, dispatches complete
//!   requests to a CTAP2 command handler and fragments replies back into
//!   HID-sized frames.
//! - **Attestation**: deterministic byte encoders for Attested Credential
//!   Data, Authenticator Data and the Attestation Object envelope.
//!
//! The pieces that live outside this workspace: the raw HID report
//! transport, the CTAP2 command handler behind the
//! [`Authenticator`] trait, COSE key encoding and the cryptography itself.
//!
//! ## Example
//!
//! ```
//! use softkey::{Authenticator, Ctaphid, MonotonicClock};
//!
//! struct Core;
//!
//! impl Authenticator for Core {
//!     fn handle(&mut self, _request: &[u8]) -> Result<Vec<u8>, u8> {
//!         // A real core parses the CBOR command here
//!         Err(0x01)
//!     }
//! }
//!
//! let mut engine = Ctaphid::new(Core, MonotonicClock::new(), rand::rngs::OsRng);
//! let mut report = [0u8; 64];
//! report[..4].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
//! report[4] = 0x86; // INIT
//! report[6] = 0x08;
//! if let Some(response) = engine.handle(&report) {
//!     for frame in response.packets() {
//!         // hand each frame to the HID transport
//!         let _ = frame;
//!     }
//! }
//! ```

pub use softkey_ctap::{
    AttestationObject, AttestationStatement, AttestedCredentialData, AuthenticatorData,
    CosePublicKey, EncodeError, Flags,
};
pub use softkey_transport::{
    Authenticator, ChannelTable, Clock, Cmd, Ctaphid, DeviceConfig, ErrorCode, FrameError,
    InitResponse, Message, MonotonicClock, Packet, Packets, Response, BROADCAST_CID,
    DEFAULT_REPORT_SIZE, MAX_CHANNELS, MAX_MESSAGE_SIZE, MIN_REPORT_SIZE,
};
