#![warn(unused_extern_crates)]

//! CTAPHID transport layer
//!
//! This crate implements the authenticator side of CTAP over HID-style
//! fixed-size reports:
//! - frame parsing and message fragmentation/reassembly
//! - channel id allocation with FIFO-bounded lifetime
//! - the single-transaction reassembly engine that dispatches complete
//!   requests to an authenticator core and fragments replies back into
//!   frames
//!
//! The raw report transport (USB HID, UHID, ...) lives outside this crate:
//! it feeds inbound reports to [`engine::Ctaphid::handle`] and drains the
//! returned [`response::Response`] packet iterator.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb>

pub mod channel;
pub mod ctaphid;
pub mod engine;
pub mod error;
pub mod response;

// Re-export commonly used types
pub use channel::{ChannelTable, MAX_CHANNELS};
pub use ctaphid::{
    Cmd, ErrorCode, Message, Packet, BROADCAST_CID, DEFAULT_REPORT_SIZE, MAX_MESSAGE_SIZE,
    MIN_REPORT_SIZE,
};
pub use engine::{Authenticator, Clock, Ctaphid, DeviceConfig, InitResponse, MonotonicClock};
pub use error::{FrameError, Result};
pub use response::{Packets, Response};
