#![allow(dead_code)]

use bytes::Bytes;
use s7commplus::{ConnectionKey, Direction, Segment};
use std::{net::SocketAddr, sync::Once};
use tracing::Level;

pub const CLIENT: &str = "192.168.0.10:49152";
pub const PLC: &str = "192.168.0.1:102";

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

pub fn client_key() -> ConnectionKey {
    let src: SocketAddr = CLIENT.parse().unwrap();
    let dst: SocketAddr = PLC.parse().unwrap();
    ConnectionKey::new(src, dst)
}

/// Header, data part and (optionally) a matching trailer.
pub fn frame(version: u8, data: &[u8], trailer: bool) -> Bytes {
    let len = (data.len() as u16).to_be_bytes();
    let mut out = vec![0x72, version, len[0], len[1]];
    out.extend_from_slice(data);
    if trailer {
        out.extend_from_slice(&[0x72, version, len[0], len[1]]);
    }
    Bytes::from(out)
}

/// Request data part: opcode, function header, body.
pub fn request(function: u16, seq: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x31, 0x00, 0x00];
    out.extend_from_slice(&function.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00]);
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00]);
    out.extend_from_slice(body);
    out
}

/// Response data part: opcode, function header, body.
pub fn response(function: u16, seq: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x32, 0x00, 0x00];
    out.extend_from_slice(&function.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00]);
    out.extend_from_slice(&seq.to_be_bytes());
    out.push(0x00);
    out.extend_from_slice(body);
    out
}

pub fn segment(frame_id: u64, bytes: Bytes) -> Segment {
    Segment {
        key: client_key(),
        frame_id,
        direction: Direction::ToServer,
        bytes,
    }
}
