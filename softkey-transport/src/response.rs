//! Outbound replies and their fragmentation
//!
//! The engine hands back one [`Response`] per completed transaction. The
//! transport adapter pulls report-sized frames out of [`Response::packets`]
//! and is responsible for padding the trailing frame to the report size if
//! its HID layer requires fixed-length writes.

use crate::ctaphid::{Cmd, CONT_HEADER_SIZE, INIT_HEADER_SIZE};

/// A reply ready to be fragmented into frames
///
/// Owns the payload bytes; CBOR replies transfer their buffer from the
/// authenticator core into this carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    cid: u32,
    cmd: Cmd,
    data: Vec<u8>,
    report_size: usize,
}

impl Response {
    pub(crate) fn new(cid: u32, cmd: Cmd, data: Vec<u8>, report_size: usize) -> Self {
        Self {
            cid,
            cmd,
            data,
            report_size,
        }
    }

    /// Destination channel
    pub fn cid(&self) -> u32 {
        self.cid
    }

    /// Reply command
    pub fn cmd(&self) -> Cmd {
        self.cmd
    }

    /// Reply payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Iterate over the outbound frames
    pub fn packets(&self) -> Packets<'_> {
        Packets {
            response: self,
            offset: 0,
            seq: 0,
            started: false,
        }
    }
}

/// Iterator over a response's outbound frames
///
/// The first frame carries the command (initialization bit set) and the
/// big-endian payload length; continuations carry sequence numbers from 0.
/// Trailing frames are not padded.
pub struct Packets<'a> {
    response: &'a Response,
    offset: usize,
    seq: u8,
    started: bool,
}

impl Iterator for Packets<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = &self.response.data;
        let report_size = self.response.report_size;

        if !self.started {
            self.started = true;
            let take = data.len().min(report_size - INIT_HEADER_SIZE);
            let mut frame = Vec::with_capacity(INIT_HEADER_SIZE + take);
            frame.extend_from_slice(&self.response.cid.to_be_bytes());
            frame.push(self.response.cmd.to_init_byte());
            frame.extend_from_slice(&(data.len() as u16).to_be_bytes());
            frame.extend_from_slice(&data[..take]);
            self.offset = take;
            return Some(frame);
        }

        if self.offset >= data.len() {
            return None;
        }

        let take = (data.len() - self.offset).min(report_size - CONT_HEADER_SIZE);
        let mut frame = Vec::with_capacity(CONT_HEADER_SIZE + take);
        frame.extend_from_slice(&self.response.cid.to_be_bytes());
        frame.push(self.seq);
        frame.extend_from_slice(&data[self.offset..self.offset + take]);
        self.offset += take;
        self.seq = self.seq.wrapping_add(1);
        Some(frame)
    }
}
