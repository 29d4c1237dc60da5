use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

pub const TPKT_VERSION: u8 = 0x03;
pub const TPKT_LEN: usize = 4;

/// TPKT (RFC1006) header: 4 bytes
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tpkt {
    /// Always 0x03 for RFC1006
    pub version: u8,
    /// Reserved, always 0x00
    pub reserved: u8,
    /// Total length including this 4-byte header
    pub length: u16,
}

impl Tpkt {
    pub fn with_payload_len(payload_len: usize) -> Self {
        Self {
            version: TPKT_VERSION,
            reserved: 0x00,
            length: (TPKT_LEN as u16).saturating_add(payload_len as u16),
        }
    }
}

impl WireEncode for Tpkt {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        TPKT_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(self.version);
        dst.put_u8(self.reserved);
        dst.put_u16(self.length);
        Ok(())
    }
}

impl WireDecode for Tpkt {
    type Error = Error;
    type Context = ();

    /// Parse the header; the remaining slice starts after the whole TPKT frame.
    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < TPKT_LEN {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: TPKT_LEN,
                available: input.len(),
            });
        }
        if input[0] != TPKT_VERSION || input[1] != 0x00 {
            return Err(Error::InvalidHeader {
                offset: 0,
                context: "invalid TPKT header",
            });
        }
        let length = u16::from_be_bytes([input[2], input[3]]) as usize;
        if length < TPKT_LEN {
            return Err(Error::InvalidHeader {
                offset: 2,
                context: "invalid TPKT length",
            });
        }
        if length > input.len() {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: length,
                available: input.len(),
            });
        }
        Ok((
            &input[length..],
            Tpkt {
                version: input[0],
                reserved: input[1],
                length: length as u16,
            },
        ))
    }
}
