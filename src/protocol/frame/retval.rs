use super::super::error::Result;
use crate::protocol::wire::{Cursor, Span};
use serde::Serialize;

/// Operation result carried as a 64-bit VLQ bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnValue {
    pub raw: u64,
    pub error_code: i16,
    pub oms_line: u16,
    pub error_source: u8,
    pub generic_error_code: u8,
    pub server_error: bool,
    pub debug_info: u16,
    /// An object tree follows the return value
    pub error_extension: bool,
    pub span: Span,
}

impl ReturnValue {
    pub fn from_raw(raw: u64, span: Span) -> Self {
        Self {
            raw,
            error_code: (raw & 0xffff) as u16 as i16,
            oms_line: ((raw & 0xffff_0000) >> 16) as u16,
            error_source: ((raw & 0xff_0000_0000) >> 32) as u8,
            generic_error_code: ((raw & 0x7f00_0000_0000) >> 40) as u8,
            server_error: raw & (1 << 47) != 0,
            debug_info: ((raw & 0x3fff_0000_0000_0000) >> 48) as u16,
            error_extension: raw & 0x4000_0000_0000_0000 != 0,
            span,
        }
    }

    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let start = cur.position();
        let raw = cur.varuint64()?;
        Ok(Self::from_raw(raw, Span::new(start, cur.position())))
    }

    pub fn generic_error_name(&self) -> &'static str {
        generic_error_name(self.generic_error_code)
    }
}

/// Name of a generic error code
pub fn generic_error_name(code: u8) -> &'static str {
    match code {
        0 => "Ok",
        17 => "Disconnected",
        19 => "InvalidAddress",
        20 => "NotFound",
        21 => "InvalidRequest",
        22 => "InvalidData",
        24 => "PermissionDenied",
        26 => "NotImplemented",
        27 => "InvalidFormat",
        30 => "ObjectNotFound",
        31 => "TooManyObjects",
        35 => "Busy",
        40 => "Timeout",
        49 => "InvalidSession",
        53 => "ProtectionViolation",
        60 => "SequenceError",
        _ => "Unknown",
    }
}
