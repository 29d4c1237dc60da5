use super::{
    super::error::{Diagnostic, Error, Result},
    context::DecodeCtx,
    function::{decode_request, decode_response, decode_stream_chunk, RequestBody, ResponseBody, StreamChunk},
    header::{Header, IntegrityBlock, Trailer, HEADER_LEN, TRAILER_LEN},
    notification::{decode_notification, Notification},
    types::{FunctionCode, Opcode, ProtocolVersion, OBJECT_QUALIFIER_MARKER},
    value::{decode_id_value_list, IdValue},
    WireDecode,
};
use crate::{protocol::wire::{Cursor, Span}, types::DecoderConfig};
use bytes::Bytes;
use serde::Serialize;

/// Function header following the opcode of requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionHeader {
    pub reserved: u16,
    pub function: u16,
    pub reserved2: u16,
    pub sequence_number: u16,
    /// Requests only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u32>,
    pub transport_flags: u8,
}

impl FunctionHeader {
    pub fn function_code(&self) -> Option<FunctionCode> {
        FunctionCode::try_from(self.function).ok()
    }

    fn decode(cur: &mut Cursor<'_>, opcode: Opcode) -> Result<Self> {
        let reserved = cur.be_u16()?;
        let function = cur.be_u16()?;
        let reserved2 = cur.be_u16()?;
        let sequence_number = cur.be_u16()?;
        let session_id = if opcode == Opcode::Request {
            Some(cur.be_u32()?)
        } else {
            None
        };
        let transport_flags = cur.u8()?;
        Ok(FunctionHeader {
            reserved,
            function,
            reserved2,
            sequence_number,
            session_id,
            transport_flags,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase")]
pub enum Body {
    Request(RequestBody),
    Response(ResponseBody),
    Notification(Notification),
    /// Body bytes could not be decoded; they are surfaced as an opaque region
    Undecoded,
}

/// Decoded data part of a complete (possibly reassembled) telegram
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPart {
    /// The data part bytes every span and offset inside it refers to
    pub raw: Bytes,
    pub opcode: Opcode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<FunctionHeader>,
    pub body: Body,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_qualifier: Option<Vec<IdValue>>,
    /// V2 integrity trailing the data part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityBlock>,
}

impl DataPart {
    pub fn function_code(&self) -> Option<FunctionCode> {
        self.header.as_ref().and_then(FunctionHeader::function_code)
    }
}

/// Bytes the decoder could not attribute to any structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueRegion {
    pub span: Span,
    pub data: Bytes,
}

impl OpaqueRegion {
    pub fn new(parent: &Bytes, start: usize, end: usize) -> Self {
        Self {
            span: Span::new(start, end),
            data: parent.slice(start..end),
        }
    }
}

/// Fragment bookkeeping attached to a segment that was buffered or completed a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentInfo {
    pub start_frame_id: u64,
    /// Segments in the group so far, this one included
    pub segments: usize,
    /// Bytes buffered so far, this segment included
    pub buffered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase")]
pub enum Content {
    /// Keepalive or system event; payload bytes, if any, are opaque
    Keepalive,
    /// Buffered for reassembly; decoded when the closing segment arrives
    Fragment(FragmentInfo),
    /// Complete data part: a standalone telegram or a finished reassembly
    Data(DataPart),
    /// Continuation of a streamed SetVarSubStreamed request
    StreamChunk(StreamChunk),
    /// Data part abandoned (unknown opcode or broken function header)
    Undecodable,
}

/// One segment's decode result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Telegram {
    pub frame_id: u64,
    pub header: Header,
    /// V3 integrity preceding the data part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityBlock>,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<Trailer>,
    /// Set on the segment closing a reassembled group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassembled: Option<FragmentInfo>,
    pub diagnostics: Vec<Diagnostic>,
    pub opaque: Vec<OpaqueRegion>,
}

impl Telegram {
    /// Start a telegram from split parts, taking over their diagnostics and opaque regions.
    ///
    /// The content is left undecodable; the data part bytes are returned for the caller.
    pub fn from_parts(frame_id: u64, parts: SegmentParts) -> (Self, Bytes) {
        let SegmentParts {
            header,
            integrity,
            data,
            trailer,
            diagnostics,
            opaque,
        } = parts;
        let telegram = Telegram {
            frame_id,
            header,
            integrity,
            content: Content::Undecodable,
            trailer,
            reassembled: None,
            diagnostics,
            opaque,
        };
        (telegram, data)
    }

    pub fn data_part(&self) -> Option<&DataPart> {
        match &self.content {
            Content::Data(d) => Some(d),
            _ => None,
        }
    }
}

/// A segment split into header, data part and trailer
#[derive(Debug, Clone)]
pub struct SegmentParts {
    pub header: Header,
    pub integrity: Option<IntegrityBlock>,
    pub data: Bytes,
    pub trailer: Option<Trailer>,
    pub diagnostics: Vec<Diagnostic>,
    pub opaque: Vec<OpaqueRegion>,
}

/// Split a segment into its parts.
///
/// Only an unparseable header fails; length disagreements between header, trailer and
/// the actual bytes are recorded as diagnostics and the bytes present win.
pub fn split_segment(bytes: &Bytes) -> Result<SegmentParts> {
    let (_, header) = Header::parse(bytes, bytes, &())?;
    let mut diagnostics = Vec::new();
    let mut opaque = Vec::new();
    let len = bytes.len();
    let region = len - HEADER_LEN;
    let dl = header.data_length as usize;

    let (data_end, trailer_at) = if header.version == ProtocolVersion::Keepalive {
        (len, None)
    } else if region == dl + TRAILER_LEN && Trailer::matches(&bytes[len - TRAILER_LEN..], header.version) {
        (len - TRAILER_LEN, Some(len - TRAILER_LEN))
    } else if region >= TRAILER_LEN
        && region != dl
        && Trailer::matches(&bytes[len - TRAILER_LEN..], header.version)
    {
        diagnostics.push(Diagnostic::from(Error::InvalidHeader {
            offset: 2,
            context: "data length differs from the bytes before the trailer",
        }));
        (len - TRAILER_LEN, Some(len - TRAILER_LEN))
    } else if region >= dl {
        if region > dl {
            diagnostics.push(Diagnostic::from(Error::InvalidHeader {
                offset: HEADER_LEN + dl,
                context: "bytes after the data part",
            }));
            opaque.push(OpaqueRegion::new(bytes, HEADER_LEN + dl, len));
        }
        (HEADER_LEN + dl, None)
    } else {
        diagnostics.push(Diagnostic::from(Error::TruncatedInput {
            offset: HEADER_LEN,
            needed: dl,
            available: region,
        }));
        (len, None)
    };

    let trailer = match trailer_at {
        Some(at) => {
            let (_, t) = Trailer::parse(&bytes[at..], bytes, &())?;
            if t.data_length != header.data_length {
                diagnostics.push(Diagnostic::from(Error::InvalidHeader {
                    offset: at + 2,
                    context: "trailer length differs from header",
                }));
            }
            Some(t)
        }
        None => None,
    };

    let mut data_start = HEADER_LEN;
    let mut integrity = None;
    if header.version == ProtocolVersion::V3 && data_end > data_start {
        match IntegrityBlock::parse_leading(&bytes[data_start..data_end], bytes, data_start) {
            Ok((n, block)) => {
                data_start += n;
                integrity = Some(block);
            }
            Err(e) => {
                let skip = match e {
                    Error::IntegrityDigestLengthMismatch { length, .. } => 1 + length as usize,
                    _ => data_end - data_start,
                };
                diagnostics.push(Diagnostic::from(e));
                data_start = (data_start + skip).min(data_end);
            }
        }
    }

    Ok(SegmentParts {
        header,
        integrity,
        data: bytes.slice(data_start..data_end),
        trailer,
        diagnostics,
        opaque,
    })
}

/// Opcode and function of a data part, without decoding it.
pub fn peek_function(data: &[u8]) -> Option<(Opcode, Option<FunctionCode>)> {
    let opcode = Opcode::try_from(*data.first()?).ok()?;
    if opcode == Opcode::Notification {
        return Some((opcode, None));
    }
    let function = data
        .get(3..5)
        .and_then(|b| FunctionCode::try_from(u16::from_be_bytes([b[0], b[1]])).ok());
    Some((opcode, function))
}

/// Locate the ObjectQualifier marker in `rest`, returning its offset.
fn find_object_qualifier(rest: &[u8]) -> Option<usize> {
    let marker = OBJECT_QUALIFIER_MARKER.to_be_bytes();
    rest.windows(2).position(|w| w == marker)
}

/// Decode a complete data part.
///
/// Fails only when the opcode is unknown or the function header is cut short; every
/// other failure is recorded on `ctx` and the affected bytes end up in `opaque`.
pub fn decode_data_part(
    raw: Bytes,
    version: ProtocolVersion,
    ctx: &mut DecodeCtx<'_>,
    opaque: &mut Vec<OpaqueRegion>,
) -> Result<DataPart> {
    let mut cur = Cursor::new(&raw);
    let opcode_raw = cur.u8()?;
    let opcode = Opcode::try_from(opcode_raw).map_err(|_| Error::UnknownOpcode {
        offset: 0,
        opcode: opcode_raw,
    })?;

    let mut integrity = None;
    if version == ProtocolVersion::V2 && opcode != Opcode::Notification {
        if let Some((start, block)) = IntegrityBlock::locate_trailing(&raw, &raw, 0) {
            cur.truncate_end(start);
            integrity = Some(block);
        }
    }

    let mut header = None;
    let mut object_qualifier = None;
    let body = if opcode == Opcode::Notification {
        let start = cur.position();
        match decode_notification(&mut cur, ctx) {
            Ok(n) => Body::Notification(n),
            Err(e) => {
                ctx.record(e);
                ctx.take_halt();
                cur.seek(start);
                Body::Undecoded
            }
        }
    } else {
        let fh = FunctionHeader::decode(&mut cur, opcode)?;
        header = Some(fh);
        let body_start = cur.position();
        match fh.function_code() {
            None => {
                ctx.record(Error::Decode {
                    offset: 3,
                    context: "unknown function code",
                });
                Body::Undecoded
            }
            Some(function) => {
                tracing::debug!(
                    ?opcode,
                    function = %function,
                    seq = fh.sequence_number,
                    "Dispatching S7COMM-PLUS body"
                );
                let decoded = if opcode == Opcode::Request {
                    decode_request(function, &mut cur, ctx).map(Body::Request)
                } else {
                    decode_response(function, &mut cur, ctx).map(Body::Response)
                };
                let body = match decoded {
                    Ok(b) => b,
                    Err(e) => {
                        ctx.record(e);
                        ctx.take_halt();
                        cur.seek(body_start);
                        Body::Undecoded
                    }
                };
                if opcode == Opcode::Request
                    && function.carries_object_qualifier()
                    && !ctx.is_halted()
                    && !matches!(body, Body::Undecoded)
                {
                    object_qualifier = scan_object_qualifier(&mut cur, &raw, ctx, opaque);
                }
                body
            }
        }
    };

    // A body list stopped on a bad entry: everything from that entry on is opaque
    if let Some(at) = ctx.take_halt() {
        cur.seek(at);
    }
    if !cur.is_empty() {
        opaque.push(OpaqueRegion::new(&raw, cur.position(), cur.end()));
    }

    Ok(DataPart {
        raw: raw.clone(),
        opcode,
        header,
        body,
        object_qualifier,
        integrity,
    })
}

/// Best-effort scan for the ObjectQualifier list after an address-bearing request.
fn scan_object_qualifier(
    cur: &mut Cursor<'_>,
    raw: &Bytes,
    ctx: &mut DecodeCtx<'_>,
    opaque: &mut Vec<OpaqueRegion>,
) -> Option<Vec<IdValue>> {
    let from = cur.position();
    let at = from + find_object_qualifier(cur.rest())?;
    if at > from {
        opaque.push(OpaqueRegion::new(raw, from, at));
    }
    cur.seek(at + 2);
    match decode_id_value_list(cur, ctx) {
        Ok(list) => Some(list),
        Err(e) => {
            ctx.record(e);
            cur.seek(at);
            None
        }
    }
}

/// Decode a streamed continuation segment.
pub fn decode_stream_part(raw: &Bytes, ctx: &mut DecodeCtx<'_>, opaque: &mut Vec<OpaqueRegion>) -> Content {
    let mut cur = Cursor::new(raw);
    match decode_stream_chunk(&mut cur) {
        Ok(chunk) => {
            if !cur.is_empty() {
                opaque.push(OpaqueRegion::new(raw, cur.position(), cur.end()));
            }
            Content::StreamChunk(chunk)
        }
        Err(e) => {
            ctx.record(e);
            opaque.push(OpaqueRegion::new(raw, 0, raw.len()));
            Content::Undecodable
        }
    }
}

/// Decode split segment parts as one complete telegram, no reassembly involved.
pub fn decode_complete(parts: SegmentParts, frame_id: u64, config: &DecoderConfig) -> Telegram {
    let (mut telegram, data) = Telegram::from_parts(frame_id, parts);
    let mut ctx = DecodeCtx::new(config);
    telegram.content = if telegram.header.version.is_keepalive() {
        if !data.is_empty() {
            telegram.opaque.push(OpaqueRegion::new(&data, 0, data.len()));
        }
        Content::Keepalive
    } else {
        decode_content(data, telegram.header.version, &mut ctx, &mut telegram.opaque)
    };
    telegram.diagnostics.extend(ctx.take_diagnostics());
    telegram
}

/// Decode `data` as a data part, turning a fatal failure into an undecodable content.
pub fn decode_content(
    data: Bytes,
    version: ProtocolVersion,
    ctx: &mut DecodeCtx<'_>,
    opaque: &mut Vec<OpaqueRegion>,
) -> Content {
    match decode_data_part(data.clone(), version, ctx, opaque) {
        Ok(part) => Content::Data(part),
        Err(e) => {
            ctx.record(e);
            if !data.is_empty() {
                opaque.push(OpaqueRegion::new(&data, 0, data.len()));
            }
            Content::Undecodable
        }
    }
}

/// Split and decode one self-contained segment.
pub fn decode_segment(bytes: &Bytes, frame_id: u64, config: &DecoderConfig) -> Result<Telegram> {
    Ok(decode_complete(split_segment(bytes)?, frame_id, config))
}
