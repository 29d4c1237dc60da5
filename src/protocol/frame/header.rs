use super::{
    super::error::{Error, Result},
    types::{ProtocolVersion, DIGEST_LEN, PROTOCOL_ID},
    vlq, WireDecode, WireEncode,
};
use crate::protocol::wire::Span;
use bytes::{BufMut, Bytes};
use serde::Serialize;

/// Length of the fixed header and of the trailer
pub const HEADER_LEN: usize = 4;
pub const TRAILER_LEN: usize = 4;

/// Segment header: protocolId, version, then data length (or keepalive sequence)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub protocol_id: u8,
    pub version: ProtocolVersion,
    /// Length of the data part; zero for keepalives
    pub data_length: u16,
    /// Keepalive sequence number (version 0xFF only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_seq: Option<u8>,
}

impl Header {
    pub fn new(version: ProtocolVersion, data_length: u16) -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            version,
            data_length,
            keepalive_seq: None,
        }
    }
}

impl WireDecode for Header {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < HEADER_LEN {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: HEADER_LEN,
                available: input.len(),
            });
        }
        if input[0] != PROTOCOL_ID {
            return Err(Error::InvalidHeader {
                offset: 0,
                context: "protocol id is not 0x72",
            });
        }
        let version = ProtocolVersion::try_from(input[1]).map_err(|_| Error::InvalidHeader {
            offset: 1,
            context: "unknown protocol version",
        })?;
        let header = if version == ProtocolVersion::Keepalive {
            Header {
                protocol_id: PROTOCOL_ID,
                version,
                data_length: 0,
                keepalive_seq: Some(input[2]),
            }
        } else {
            Header {
                protocol_id: PROTOCOL_ID,
                version,
                data_length: u16::from_be_bytes([input[2], input[3]]),
                keepalive_seq: None,
            }
        };
        Ok((&input[HEADER_LEN..], header))
    }
}

impl WireEncode for Header {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        HEADER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(self.protocol_id);
        dst.put_u8(self.version as u8);
        match self.keepalive_seq {
            Some(seq) => {
                dst.put_u8(seq);
                dst.put_u8(0);
            }
            None => dst.put_u16(self.data_length),
        }
        Ok(())
    }
}

/// Trailer closing a complete (or last) segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trailer {
    pub protocol_id: u8,
    pub version: u8,
    pub data_length: u16,
}

impl Trailer {
    /// Whether `input` plausibly is a trailer for a segment of `version`.
    pub fn matches(input: &[u8], version: ProtocolVersion) -> bool {
        input.len() == TRAILER_LEN && input[0] == PROTOCOL_ID && input[1] == version as u8
    }
}

impl WireDecode for Trailer {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < TRAILER_LEN {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: TRAILER_LEN,
                available: input.len(),
            });
        }
        if input[0] != PROTOCOL_ID {
            return Err(Error::InvalidHeader {
                offset: 0,
                context: "trailer protocol id is not 0x72",
            });
        }
        Ok((
            &input[TRAILER_LEN..],
            Trailer {
                protocol_id: input[0],
                version: input[1],
                data_length: u16::from_be_bytes([input[2], input[3]]),
            },
        ))
    }
}

impl WireEncode for Trailer {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        TRAILER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(self.protocol_id);
        dst.put_u8(self.version);
        dst.put_u16(self.data_length);
        Ok(())
    }
}

/// Integrity part: V3 places it before the data part, V2 after it with an id prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_id: Option<u32>,
    pub digest: Bytes,
    pub span: Span,
}

impl IntegrityBlock {
    /// V3 layout: `digestLen(1) · digest`, at the start of `input`.
    pub fn parse_leading(input: &[u8], parent: &Bytes, base: usize) -> Result<(usize, Self)> {
        let Some(&len) = input.first() else {
            return Err(Error::TruncatedInput {
                offset: base,
                needed: 1,
                available: 0,
            });
        };
        if len != DIGEST_LEN {
            return Err(Error::IntegrityDigestLengthMismatch {
                offset: base,
                length: len,
            });
        }
        let total = 1 + len as usize;
        if input.len() < total {
            return Err(Error::TruncatedInput {
                offset: base + 1,
                needed: len as usize,
                available: input.len() - 1,
            });
        }
        Ok((
            total,
            IntegrityBlock {
                integrity_id: None,
                digest: parent.slice_ref(&input[1..total]),
                span: Span::new(base, base + total),
            },
        ))
    }

    /// V2 layout: `integrityId(varuint32) · digestLen(1) · digest`, at the end of `input`.
    ///
    /// Returns the start offset of the block within `input`. The id is found by walking
    /// back over continuation bytes, so a preceding data byte with bit 7 set is ambiguous;
    /// the id is assumed to use no more than five bytes.
    pub fn locate_trailing(input: &[u8], parent: &Bytes, base: usize) -> Option<(usize, Self)> {
        let n = input.len();
        let digest_len = DIGEST_LEN as usize;
        if n < digest_len + 2 || input[n - digest_len - 1] != DIGEST_LEN {
            return None;
        }
        let id_end = n - digest_len - 1;
        if input[id_end - 1] & 0x80 != 0 {
            return None;
        }
        let mut id_start = id_end - 1;
        while id_start > 0
            && id_end - id_start < vlq::MAX_LEN_32
            && input[id_start - 1] & 0x80 != 0
        {
            id_start -= 1;
        }
        let (id, used) = vlq::decode_varuint32(&input[id_start..id_end]).ok()?;
        if used != id_end - id_start {
            return None;
        }
        Some((
            id_start,
            IntegrityBlock {
                integrity_id: Some(id),
                digest: parent.slice_ref(&input[id_end + 1..]),
                span: Span::new(base + id_start, base + n),
            },
        ))
    }
}
