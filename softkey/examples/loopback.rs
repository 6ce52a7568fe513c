//! Drive the transaction engine without a HID transport: allocate a
//! channel, ping it, then send a CBOR request to a stub command handler.
//!
//! Run with `RUST_LOG=trace cargo run --example loopback` to watch the
//! state machine.

use softkey::{Authenticator, Cmd, Ctaphid, Message, MonotonicClock, BROADCAST_CID};

struct StubCore;

impl Authenticator for StubCore {
    fn handle(&mut self, request: &[u8]) -> Result<Vec<u8>, u8> {
        println!("core received {} request bytes", request.len());
        // CTAP2_OK followed by an empty response map
        Ok(vec![0x00, 0xA0])
    }
}

fn main() {
    env_logger::init();

    let mut engine = Ctaphid::new(StubCore, MonotonicClock::new(), rand::rngs::OsRng);

    let init = Message::new(BROADCAST_CID, Cmd::Init, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let mut cid = BROADCAST_CID;
    for frame in init.to_frames(64).unwrap() {
        if let Some(response) = engine.handle(&frame) {
            let data = response.data();
            cid = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
            println!("allocated channel {cid:#010x}");
        }
    }

    let ping = Message::new(cid, Cmd::Ping, b"hello".to_vec());
    for frame in ping.to_frames(64).unwrap() {
        if let Some(response) = engine.handle(&frame) {
            for packet in response.packets() {
                println!("ping reply frame: {}", hex::encode(packet));
            }
        }
    }

    let request = Message::new(cid, Cmd::Cbor, vec![0x04]);
    for frame in request.to_frames(64).unwrap() {
        if let Some(response) = engine.handle(&frame) {
            println!("cbor reply: {}", hex::encode(response.data()));
        }
    }
}
