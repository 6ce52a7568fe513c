//! CTAPHID frame and message formats
//!
//! Frame layout over fixed-size HID reports:
//! - Initialization frame: `CID(4) | CMD(1, bit 7 set) | BCNT(2, BE) | DATA`
//! - Continuation frame: `CID(4) | SEQ(1, bit 7 clear) | DATA`
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb-hid-framing>

use crate::error::{FrameError, Result};

/// Default HID report size (64 bytes for full-speed USB HID)
pub const DEFAULT_REPORT_SIZE: usize = 64;

/// Maximum reassembled message size: one initialization frame plus 128
/// continuation frames at 64-byte reports
pub const MAX_MESSAGE_SIZE: usize = 7609;

/// Broadcast channel id, only valid for INIT
pub const BROADCAST_CID: u32 = 0xFFFF_FFFF;

/// Header size of an initialization frame
pub const INIT_HEADER_SIZE: usize = 7;

/// Header size of a continuation frame
pub const CONT_HEADER_SIZE: usize = 5;

/// Smallest usable report size: an initialization header plus one payload
/// byte. Below this, fragmentation cannot make progress.
pub const MIN_REPORT_SIZE: usize = INIT_HEADER_SIZE + 1;

/// Bit 7 of the fifth frame byte distinguishes initialization frames
const TYPE_INIT: u8 = 0x80;

/// Highest continuation sequence number; 129 frames carry the maximum message
const MAX_SEQ: u8 = 0x7F;

/// CTAPHID commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Transaction that echoes the payload back.
    Ping = 0x01,
    /// Encapsulated CTAP1/U2F message.
    Msg = 0x03,
    /// Place an exclusive lock on one channel.
    Lock = 0x04,
    /// Allocate a new channel or synchronize an existing one.
    Init = 0x06,
    /// Ask the authenticator for a visual or audible identification.
    Wink = 0x08,
    /// Encapsulated CTAP2 CBOR encoded message.
    Cbor = 0x10,
    /// Cancel any outstanding request on the given channel.
    Cancel = 0x11,
    /// The request is still being processed.
    Keepalive = 0x3B,
    /// Error response message (see [`ErrorCode`]).
    Error = 0x3F,
}

impl Cmd {
    /// Decode a command byte, masking off the initialization bit
    pub fn from_byte(value: u8) -> Option<Self> {
        match value & !TYPE_INIT {
            0x01 => Some(Cmd::Ping),
            0x03 => Some(Cmd::Msg),
            0x04 => Some(Cmd::Lock),
            0x06 => Some(Cmd::Init),
            0x08 => Some(Cmd::Wink),
            0x10 => Some(Cmd::Cbor),
            0x11 => Some(Cmd::Cancel),
            0x3B => Some(Cmd::Keepalive),
            0x3F => Some(Cmd::Error),
            _ => None,
        }
    }

    /// The raw command value
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// The command value with the initialization bit set, as carried on the
    /// wire in initialization frames
    pub fn to_init_byte(self) -> u8 {
        self as u8 | TYPE_INIT
    }
}

/// CTAPHID error codes, carried as the one-byte payload of an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Invalid command
    InvalidCmd = 0x01,
    /// Invalid parameter
    InvalidPar = 0x02,
    /// Invalid message length
    InvalidLen = 0x03,
    /// Invalid message sequencing
    InvalidSeq = 0x04,
    /// Message has timed out
    MsgTimeout = 0x05,
    /// Channel busy
    ChannelBusy = 0x06,
    /// Command requires a channel lock
    LockRequired = 0x0A,
    /// Channel id is not valid
    InvalidChannel = 0x0B,
    /// Other unspecified error
    Other = 0x7F,
}

impl ErrorCode {
    /// The wire byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Borrowed view over a single inbound frame
///
/// The view never copies; accessors that only apply to one frame type return
/// `None` on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    data: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Wrap a raw frame; it must at least cover a continuation header
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < CONT_HEADER_SIZE {
            return Err(FrameError::FrameTooShort);
        }
        Ok(Self { data })
    }

    /// Channel id
    pub fn cid(&self) -> u32 {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Check whether this is an initialization frame
    pub fn is_init(&self) -> bool {
        self.data[4] & TYPE_INIT != 0
    }

    /// Command (initialization frames only; `None` for unknown bytes)
    pub fn cmd(&self) -> Option<Cmd> {
        if !self.is_init() {
            return None;
        }
        Cmd::from_byte(self.data[4])
    }

    /// Declared payload length (initialization frames only)
    pub fn payload_len(&self) -> Option<u16> {
        if !self.is_init() || self.data.len() < INIT_HEADER_SIZE {
            return None;
        }
        Some(u16::from_be_bytes([self.data[5], self.data[6]]))
    }

    /// Sequence number (continuation frames only)
    pub fn seq(&self) -> Option<u8> {
        if self.is_init() {
            return None;
        }
        Some(self.data[4])
    }

    /// Payload bytes after the header
    pub fn payload(&self) -> &'a [u8] {
        if self.is_init() {
            if self.data.len() < INIT_HEADER_SIZE {
                &[]
            } else {
                &self.data[INIT_HEADER_SIZE..]
            }
        } else {
            &self.data[CONT_HEADER_SIZE..]
        }
    }
}

/// A complete CTAPHID message
///
/// Used by transport adapters and tests to fragment outbound requests into
/// report-sized frames and to reassemble multi-frame replies. The engine
/// itself reassembles incrementally and does not go through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel id
    pub cid: u32,
    /// Command
    pub cmd: Cmd,
    /// Payload data
    pub data: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(cid: u32, cmd: Cmd, data: Vec<u8>) -> Self {
        Self { cid, cmd, data }
    }

    /// Fragment into zero-padded frames of `report_size` bytes
    pub fn to_frames(&self, report_size: usize) -> Result<Vec<Vec<u8>>> {
        if report_size <= INIT_HEADER_SIZE {
            return Err(FrameError::FrameTooShort);
        }
        if self.data.len() > MAX_MESSAGE_SIZE {
            return Err(FrameError::MessageTooLarge);
        }

        let mut frames = Vec::new();

        let mut frame = vec![0u8; report_size];
        frame[..4].copy_from_slice(&self.cid.to_be_bytes());
        frame[4] = self.cmd.to_init_byte();
        frame[5..7].copy_from_slice(&(self.data.len() as u16).to_be_bytes());
        let take = self.data.len().min(report_size - INIT_HEADER_SIZE);
        frame[INIT_HEADER_SIZE..INIT_HEADER_SIZE + take].copy_from_slice(&self.data[..take]);
        frames.push(frame);

        let mut remaining = &self.data[take..];
        let mut seq = 0u8;
        while !remaining.is_empty() {
            let mut frame = vec![0u8; report_size];
            frame[..4].copy_from_slice(&self.cid.to_be_bytes());
            frame[4] = seq;
            let take = remaining.len().min(report_size - CONT_HEADER_SIZE);
            frame[CONT_HEADER_SIZE..CONT_HEADER_SIZE + take].copy_from_slice(&remaining[..take]);
            frames.push(frame);

            remaining = &remaining[take..];
            if !remaining.is_empty() {
                if seq == MAX_SEQ {
                    return Err(FrameError::MessageTooLarge);
                }
                seq += 1;
            }
        }

        Ok(frames)
    }

    /// Reassemble a message from frames
    ///
    /// Trailing frames may be shorter than the report size; the declared
    /// length decides where the payload ends.
    pub fn from_frames<T: AsRef<[u8]>>(frames: &[T]) -> Result<Self> {
        let first = frames.first().ok_or(FrameError::Truncated)?;
        let packet = Packet::parse(first.as_ref())?;
        if !packet.is_init() {
            return Err(FrameError::UnexpectedContinuation);
        }
        let cmd = packet.cmd().ok_or(FrameError::UnknownCommand)?;
        let total = usize::from(packet.payload_len().ok_or(FrameError::FrameTooShort)?);
        if total > MAX_MESSAGE_SIZE {
            return Err(FrameError::MessageTooLarge);
        }
        let cid = packet.cid();

        let mut data = Vec::with_capacity(total);
        let payload = packet.payload();
        data.extend_from_slice(&payload[..payload.len().min(total)]);

        for (index, frame) in frames[1..].iter().enumerate() {
            if data.len() >= total {
                break;
            }
            let packet = Packet::parse(frame.as_ref())?;
            if packet.is_init() {
                return Err(FrameError::UnexpectedInitialization);
            }
            if packet.cid() != cid {
                return Err(FrameError::ChannelMismatch);
            }
            if packet.seq() != Some(index as u8) {
                return Err(FrameError::BadSequence);
            }
            let payload = packet.payload();
            let remaining = total - data.len();
            data.extend_from_slice(&payload[..payload.len().min(remaining)]);
        }

        if data.len() < total {
            return Err(FrameError::Truncated);
        }

        Ok(Self { cid, cmd, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_from_byte() {
        assert_eq!(Cmd::from_byte(0x01), Some(Cmd::Ping));
        assert_eq!(Cmd::from_byte(0x81), Some(Cmd::Ping));
        assert_eq!(Cmd::from_byte(0x10), Some(Cmd::Cbor));
        assert_eq!(Cmd::from_byte(0x86), Some(Cmd::Init));
        assert_eq!(Cmd::from_byte(0x7E), None);

        assert_eq!(Cmd::Ping.to_init_byte(), 0x81);
        assert_eq!(Cmd::Error.to_init_byte(), 0xBF);
        assert_eq!(Cmd::Cbor.to_byte(), 0x10);
    }

    #[test]
    fn test_packet_accessors() {
        let mut frame = vec![0u8; 64];
        frame[..4].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        frame[4] = Cmd::Ping.to_init_byte();
        frame[5..7].copy_from_slice(&5u16.to_be_bytes());
        frame[7..12].copy_from_slice(&[1, 2, 3, 4, 5]);

        let packet = Packet::parse(&frame).unwrap();
        assert_eq!(packet.cid(), 0x1234_5678);
        assert!(packet.is_init());
        assert_eq!(packet.cmd(), Some(Cmd::Ping));
        assert_eq!(packet.payload_len(), Some(5));
        assert_eq!(packet.seq(), None);
        assert_eq!(&packet.payload()[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_packet_continuation_accessors() {
        let mut frame = vec![0u8; 64];
        frame[..4].copy_from_slice(&0xABCD_EF01u32.to_be_bytes());
        frame[4] = 3;

        let packet = Packet::parse(&frame).unwrap();
        assert!(!packet.is_init());
        assert_eq!(packet.cmd(), None);
        assert_eq!(packet.payload_len(), None);
        assert_eq!(packet.seq(), Some(3));
        assert_eq!(packet.payload().len(), 59);
    }

    #[test]
    fn test_packet_too_short() {
        assert_eq!(Packet::parse(&[0, 0, 0]), Err(FrameError::FrameTooShort));
    }

    #[test]
    fn test_single_frame_message() {
        let message = Message::new(0x1111_1111, Cmd::Ping, vec![1, 2, 3]);
        let frames = message.to_frames(64).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 64);
        assert_eq!(Message::from_frames(&frames).unwrap(), message);
    }

    #[test]
    fn test_multi_frame_round_trip() {
        for len in [0usize, 57, 58, 116, 117, 1000, MAX_MESSAGE_SIZE] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let message = Message::new(0x2222_2222, Cmd::Cbor, data);
            let frames = message.to_frames(64).unwrap();
            assert_eq!(Message::from_frames(&frames).unwrap(), message);
        }
    }

    #[test]
    fn test_frame_count() {
        let message = Message::new(0x3333_3333, Cmd::Cbor, vec![0x42; 100]);
        let frames = message.to_frames(64).unwrap();
        // 57 bytes in the initialization frame, 43 in one continuation
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][4], 0);
    }

    #[test]
    fn test_message_too_large() {
        let message = Message::new(0, Cmd::Cbor, vec![0u8; MAX_MESSAGE_SIZE + 1]);
        assert_eq!(message.to_frames(64), Err(FrameError::MessageTooLarge));
    }

    #[test]
    fn test_reassembly_rejects_bad_sequence() {
        let message = Message::new(0x4444_4444, Cmd::Cbor, vec![0x33; 200]);
        let mut frames = message.to_frames(64).unwrap();
        frames[1][4] = 1;
        assert_eq!(Message::from_frames(&frames), Err(FrameError::BadSequence));
    }

    #[test]
    fn test_reassembly_rejects_foreign_channel() {
        let message = Message::new(0x5555_5555, Cmd::Cbor, vec![0x44; 200]);
        let mut frames = message.to_frames(64).unwrap();
        frames[1][0] = 0xAA;
        assert_eq!(
            Message::from_frames(&frames),
            Err(FrameError::ChannelMismatch)
        );
    }

    #[test]
    fn test_reassembly_truncated() {
        let message = Message::new(0x6666_6666, Cmd::Cbor, vec![0x55; 200]);
        let mut frames = message.to_frames(64).unwrap();
        frames.pop();
        assert_eq!(Message::from_frames(&frames), Err(FrameError::Truncated));
    }

    #[test]
    fn test_reassembly_accepts_short_trailing_frame() {
        // The engine emits unpadded trailing frames; reassembly must accept
        // them as long as the declared length is covered
        let frames = [
            {
                let mut frame = vec![0u8; 64];
                frame[..4].copy_from_slice(&0x7777_7777u32.to_be_bytes());
                frame[4] = Cmd::Ping.to_init_byte();
                frame[5..7].copy_from_slice(&60u16.to_be_bytes());
                frame[7..].copy_from_slice(&[0xEE; 57]);
                frame
            },
            {
                let mut frame = vec![0u8; CONT_HEADER_SIZE + 3];
                frame[..4].copy_from_slice(&0x7777_7777u32.to_be_bytes());
                frame[4] = 0;
                frame[5..].copy_from_slice(&[0xEE; 3]);
                frame
            },
        ];

        let message = Message::from_frames(&frames).unwrap();
        assert_eq!(message.data, vec![0xEE; 60]);
    }
}
