//! CTAPHID transaction engine
//!
//! One transaction is in flight at a time, engine-wide: the reassembly
//! buffer and the `busy` channel are shared across all channels, which is
//! what the HID device model looks like from the host. A second channel
//! that starts talking mid-transaction is answered with `ChannelBusy` and
//! the current transaction continues undisturbed.
//!
//! Transactions that stall are discarded after 250 ms without any wire
//! message; the stalled client times out on its own and retries.

use crate::channel::ChannelTable;
use crate::ctaphid::{
    Cmd, ErrorCode, Packet, BROADCAST_CID, CONT_HEADER_SIZE, DEFAULT_REPORT_SIZE,
    INIT_HEADER_SIZE, MAX_MESSAGE_SIZE, MIN_REPORT_SIZE,
};
use crate::response::Response;

use log::{debug, trace, warn};
use rand_core::RngCore;

use std::time::Instant;

/// Transactions exceeding this age are discarded on the next frame
const TRANSACTION_TIMEOUT_MS: u64 = 250;

/// CTAPHID protocol version reported in INIT replies
const PROTOCOL_VERSION: u8 = 2;

/// INIT payloads are exactly one nonce
const NONCE_SIZE: usize = 8;

/// U2F instruction byte for GET_VERSION, the only CTAP1 command recognized
const U2F_GET_VERSION: u8 = 0x03;

/// CTAP1 status words: conditions not satisfied
const SW_CONDITIONS_NOT_SATISFIED: [u8; 2] = [0x69, 0x86];

// Capability bits of the INIT reply
const CAPABILITY_WINK: u8 = 0x01;
const CAPABILITY_CBOR: u8 = 0x04;
const CAPABILITY_NMSG: u8 = 0x08;

/// The CBOR-level CTAP2 command handler behind the transport
///
/// The engine does not interpret the request or response bytes beyond
/// framing them; a failed request comes back as a one-byte status code that
/// is framed as-is.
pub trait Authenticator {
    /// Handle one request, returning owned response bytes or a status byte
    fn handle(&mut self, request: &[u8]) -> std::result::Result<Vec<u8>, u8>;
}

/// Monotonic millisecond reader
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&mut self) -> u64;
}

/// [`Clock`] backed by [`std::time::Instant`]
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&mut self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Device identity and capabilities reported in INIT replies
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Major device version
    pub version_major: u8,
    /// Minor device version
    pub version_minor: u8,
    /// Build device version
    pub version_build: u8,
    /// WINK capability
    pub wink: bool,
    /// CBOR capability
    pub cbor: bool,
    /// Set when CTAP1/MSG is NOT supported
    pub nmsg: bool,
    /// HID report size the transport delivers
    pub report_size: usize,
}

impl DeviceConfig {
    /// Default configuration: CBOR-capable, no wink, MSG supported
    pub fn new() -> Self {
        Self {
            version_major: 0xCA,
            version_minor: 0xFE,
            version_build: 0x01,
            wink: false,
            cbor: true,
            nmsg: false,
            report_size: DEFAULT_REPORT_SIZE,
        }
    }

    /// Set the device version triple
    pub fn with_version(mut self, major: u8, minor: u8, build: u8) -> Self {
        self.version_major = major;
        self.version_minor = minor;
        self.version_build = build;
        self
    }

    /// Set the WINK capability bit
    pub fn with_wink(mut self, wink: bool) -> Self {
        self.wink = wink;
        self
    }

    /// Set the CBOR capability bit
    pub fn with_cbor(mut self, cbor: bool) -> Self {
        self.cbor = cbor;
        self
    }

    /// Set the NMSG capability bit
    pub fn with_nmsg(mut self, nmsg: bool) -> Self {
        self.nmsg = nmsg;
        self
    }

    /// Set the HID report size
    ///
    /// Values below [`MIN_REPORT_SIZE`] cannot carry an initialization
    /// header plus payload and are raised to the minimum.
    pub fn with_report_size(mut self, report_size: usize) -> Self {
        self.report_size = report_size.max(MIN_REPORT_SIZE);
        self
    }

    fn capabilities(&self) -> u8 {
        let mut caps = 0;
        if self.wink {
            caps |= CAPABILITY_WINK;
        }
        if self.cbor {
            caps |= CAPABILITY_CBOR;
        }
        if self.nmsg {
            caps |= CAPABILITY_NMSG;
        }
        caps
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The 17-byte INIT reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitResponse {
    /// Nonce echoed from the request
    pub nonce: [u8; NONCE_SIZE],
    /// Newly allocated channel id
    pub cid: u32,
    /// CTAPHID protocol version
    pub protocol_version: u8,
    /// Major device version
    pub version_major: u8,
    /// Minor device version
    pub version_minor: u8,
    /// Build device version
    pub version_build: u8,
    /// Capability flags
    pub capabilities: u8,
}

impl InitResponse {
    /// Serialize into the wire layout
    pub fn serialize(&self) -> [u8; 17] {
        let mut out = [0u8; 17];
        out[..8].copy_from_slice(&self.nonce);
        out[8..12].copy_from_slice(&self.cid.to_be_bytes());
        out[12] = self.protocol_version;
        out[13] = self.version_major;
        out[14] = self.version_minor;
        out[15] = self.version_build;
        out[16] = self.capabilities;
        out
    }
}

/// The CTAPHID transaction engine
///
/// Feed raw inbound reports to [`Ctaphid::handle`]; when a frame completes
/// a transaction the returned [`Response`] fragments the reply back into
/// frames. `None` means the engine is waiting for more frames or the
/// command has no reply.
pub struct Ctaphid<A, C, R> {
    authenticator: A,
    clock: C,
    rng: R,
    config: DeviceConfig,
    channels: ChannelTable,
    // In-flight transaction; `busy` is set iff a transaction is open
    busy: Option<u32>,
    begin: Option<u64>,
    cmd: Option<Cmd>,
    bcnt_total: u16,
    bcnt: u16,
    seq: Option<u8>,
    // Shared reassembly buffer, one transaction at a time
    buffer: Box<[u8; MAX_MESSAGE_SIZE]>,
}

impl<A, C, R> Ctaphid<A, C, R>
where
    A: Authenticator,
    C: Clock,
    R: RngCore,
{
    /// Create an engine with the default [`DeviceConfig`]
    pub fn new(authenticator: A, clock: C, rng: R) -> Self {
        Self::with_config(authenticator, clock, rng, DeviceConfig::new())
    }

    /// Create an engine with an explicit configuration
    ///
    /// Report sizes below [`MIN_REPORT_SIZE`] are raised to the minimum.
    pub fn with_config(authenticator: A, clock: C, rng: R, mut config: DeviceConfig) -> Self {
        config.report_size = config.report_size.max(MIN_REPORT_SIZE);
        Self {
            authenticator,
            clock,
            rng,
            config,
            channels: ChannelTable::new(),
            busy: None,
            begin: None,
            cmd: None,
            bcnt_total: 0,
            bcnt: 0,
            seq: None,
            buffer: Box::new([0u8; MAX_MESSAGE_SIZE]),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The live channel table
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Process one raw inbound frame
    pub fn handle(&mut self, frame: &[u8]) -> Option<Response> {
        self.sweep_timeout();
        match self.busy {
            None => self.handle_idle(frame),
            Some(busy) => self.handle_collecting(busy, frame),
        }
    }

    /// Release the channel table and any in-flight transaction
    pub fn teardown(&mut self) {
        self.reset();
        self.channels.clear();
    }

    fn sweep_timeout(&mut self) {
        if let (Some(cid), Some(begin)) = (self.busy, self.begin) {
            if self.clock.now_ms().saturating_sub(begin) > TRANSACTION_TIMEOUT_MS {
                debug!("transaction on {cid:#010x} timed out, discarding");
                self.reset();
            }
        }
    }

    fn handle_idle(&mut self, frame: &[u8]) -> Option<Response> {
        if frame.len() < INIT_HEADER_SIZE {
            warn!("dropping {}-byte frame", frame.len());
            return Some(self.error(frame_cid(frame), ErrorCode::Other));
        }
        let packet = match Packet::parse(frame) {
            Ok(packet) => packet,
            Err(_) => return Some(self.error(frame_cid(frame), ErrorCode::Other)),
        };

        if !packet.is_init() {
            return Some(self.error(packet.cid(), ErrorCode::InvalidCmd));
        }

        let cid = packet.cid();
        if cid != BROADCAST_CID && !self.channels.contains(cid) {
            debug!("frame on unallocated channel {cid:#010x}");
            return Some(self.error(cid, ErrorCode::InvalidChannel));
        }

        let Some(bcnt_total) = packet.payload_len() else {
            return Some(self.error(cid, ErrorCode::Other));
        };
        if usize::from(bcnt_total) > MAX_MESSAGE_SIZE {
            warn!("declared length {bcnt_total} exceeds the reassembly buffer");
            return Some(self.error(cid, ErrorCode::InvalidLen));
        }

        let payload = packet.payload();
        let take = payload.len().min(usize::from(bcnt_total));
        self.buffer[..take].copy_from_slice(&payload[..take]);

        self.busy = Some(cid);
        self.begin = Some(self.clock.now_ms());
        self.cmd = packet.cmd();
        self.bcnt_total = bcnt_total;
        self.bcnt = take as u16;
        self.seq = None;
        trace!("transaction start cid={cid:#010x} cmd={:?} bcnt={bcnt_total}", self.cmd);

        self.try_complete()
    }

    fn handle_collecting(&mut self, busy: u32, frame: &[u8]) -> Option<Response> {
        if frame.len() < CONT_HEADER_SIZE {
            warn!("dropping {}-byte frame mid-transaction", frame.len());
            let cid = frame_cid(frame);
            self.reset();
            return Some(self.error(cid, ErrorCode::Other));
        }
        let packet = match Packet::parse(frame) {
            Ok(packet) => packet,
            Err(_) => {
                let cid = frame_cid(frame);
                self.reset();
                return Some(self.error(cid, ErrorCode::Other));
            }
        };

        if packet.cid() != busy {
            debug!(
                "channel {busy:#010x} busy, rejecting frame from {:#010x}",
                packet.cid()
            );
            return Some(self.error(packet.cid(), ErrorCode::ChannelBusy));
        }

        if packet.is_init() {
            warn!("initialization frame while collecting on {busy:#010x}");
            self.reset();
            return Some(self.error(busy, ErrorCode::InvalidCmd));
        }

        let Some(seq) = packet.seq() else {
            self.reset();
            return Some(self.error(busy, ErrorCode::Other));
        };
        let expected = self.seq.map_or(0, |s| s.wrapping_add(1));
        if seq != expected {
            warn!("sequence mismatch on {busy:#010x}: got {seq}, expected {expected}");
            self.reset();
            return Some(self.error(busy, ErrorCode::InvalidSeq));
        }

        let payload = packet.payload();
        let offset = usize::from(self.bcnt);
        let remaining = usize::from(self.bcnt_total) - offset;
        let take = payload.len().min(remaining);
        self.buffer[offset..offset + take].copy_from_slice(&payload[..take]);
        self.bcnt += take as u16;
        self.seq = Some(seq);

        self.try_complete()
    }

    fn try_complete(&mut self) -> Option<Response> {
        if self.bcnt < self.bcnt_total {
            return None;
        }
        let response = self.dispatch();
        self.reset();
        response
    }

    fn dispatch(&mut self) -> Option<Response> {
        let cid = self.busy?;
        let len = usize::from(self.bcnt);

        // Re-validate the channel against the full command: INIT may come in
        // on broadcast, everything else needs an allocated channel
        let allocated = self.channels.contains(cid);
        let init = self.cmd == Some(Cmd::Init);
        if !(allocated || (init && cid == BROADCAST_CID)) {
            return Some(self.error(cid, ErrorCode::InvalidChannel));
        }

        match self.cmd {
            Some(Cmd::Init) => self.dispatch_init(cid),
            Some(Cmd::Ping) => {
                trace!("ping cid={cid:#010x} len={len}");
                Some(self.reply(cid, Cmd::Ping, self.buffer[..len].to_vec()))
            }
            Some(Cmd::Msg) => Some(self.dispatch_msg(cid, len)),
            Some(Cmd::Cbor) => {
                trace!("cbor request cid={cid:#010x} len={len}");
                let data = match self.authenticator.handle(&self.buffer[..len]) {
                    Ok(bytes) => bytes,
                    Err(status) => vec![status],
                };
                Some(self.reply(cid, Cmd::Cbor, data))
            }
            Some(Cmd::Cancel) => {
                trace!("cancel cid={cid:#010x}");
                None
            }
            _ => Some(self.error(cid, ErrorCode::InvalidCmd)),
        }
    }

    fn dispatch_init(&mut self, cid: u32) -> Option<Response> {
        if usize::from(self.bcnt_total) != NONCE_SIZE {
            return Some(self.error(cid, ErrorCode::InvalidLen));
        }

        if cid == BROADCAST_CID {
            let mut nonce = [0u8; NONCE_SIZE];
            nonce.copy_from_slice(&self.buffer[..NONCE_SIZE]);

            let new_cid = self.rng.next_u32();
            self.channels.insert(new_cid);
            debug!("allocated channel {new_cid:#010x}");

            let response = InitResponse {
                nonce,
                cid: new_cid,
                protocol_version: PROTOCOL_VERSION,
                version_major: self.config.version_major,
                version_minor: self.config.version_minor,
                version_build: self.config.version_build,
                capabilities: self.config.capabilities(),
            };
            Some(self.reply(cid, Cmd::Init, response.serialize().to_vec()))
        } else {
            // Re-INIT on an allocated channel: the client is re-binding, the
            // reply is just the channel id
            Some(self.reply(cid, Cmd::Init, cid.to_be_bytes().to_vec()))
        }
    }

    fn dispatch_msg(&self, cid: u32, len: usize) -> Response {
        // Minimal CTAP1 pass-through: only GET_VERSION is recognized
        let data = if len >= 2 && self.buffer[1] == U2F_GET_VERSION {
            b"CTAP2/U2F_V2\x90\x00".to_vec()
        } else {
            SW_CONDITIONS_NOT_SATISFIED.to_vec()
        };
        self.reply(cid, Cmd::Msg, data)
    }

    fn reply(&self, cid: u32, cmd: Cmd, data: Vec<u8>) -> Response {
        // The reply path has the same ceiling as reassembly: past it, the
        // continuation sequence would run into the initialization bit
        if data.len() > MAX_MESSAGE_SIZE {
            warn!("{} reply bytes exceed the maximum message size", data.len());
            return self.error(cid, ErrorCode::InvalidLen);
        }
        Response::new(cid, cmd, data, self.config.report_size)
    }

    fn error(&self, cid: u32, code: ErrorCode) -> Response {
        Response::new(
            cid,
            Cmd::Error,
            vec![code.to_byte()],
            self.config.report_size,
        )
    }

    fn reset(&mut self) {
        self.busy = None;
        self.begin = None;
        self.cmd = None;
        self.bcnt_total = 0;
        self.bcnt = 0;
        self.seq = None;
    }
}

/// Best-effort cid of a possibly truncated frame, for addressing error
/// replies; broadcast when unreadable
fn frame_cid(frame: &[u8]) -> u32 {
    if frame.len() >= 4 {
        u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]])
    } else {
        BROADCAST_CID
    }
}
