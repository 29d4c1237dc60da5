use serde::Serialize;
use std::result::Result as StdResult;
use thiserror::Error as ThisError;

/// Unified S7COMM-PLUS result type
pub type Result<T> = StdResult<T, Error>;

/// Decode failures.
///
/// Every variant that refers to a position carries the byte offset relative to the
/// buffer being decoded (the data part, or the whole segment for header errors).
#[derive(Debug, Clone, PartialEq, Eq, ThisError, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Error {
    /// A 32-bit VLQ did not terminate within five bytes
    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    /// Input does not have enough bytes to complete the operation
    #[error("truncated input at offset {offset}: needed {needed} bytes, available {available} bytes")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },

    #[error("unknown datatype 0x{datatype:02x} at offset {offset}")]
    UnknownDatatype { offset: usize, datatype: u8 },

    #[error("integrity digest length {length} at offset {offset}, expected 32")]
    IntegrityDigestLengthMismatch { offset: usize, length: u8 },

    #[error("blob decompression failed at offset {offset}: {reason}")]
    BlobDecompressionFailed { offset: usize, reason: String },

    #[error("blob at offset {offset} needs preset dictionary 0x{checksum:08x}, which is not loaded")]
    BlobDecompressionNoDictionary { offset: usize, checksum: u32 },

    #[error("unknown notification return code 0x{code:02x} at offset {offset}")]
    NotificationUnknownReturnCode { offset: usize, code: u8 },

    /// Fragment sequence cannot be applied to the conversation state
    #[error("reassembly conflict at frame {frame_id}: {context}")]
    ReassemblyConflict {
        frame_id: u64,
        context: &'static str,
    },

    /// Segment header or trailer violates the framing contract
    #[error("invalid header at offset {offset}: {context}")]
    InvalidHeader {
        offset: usize,
        context: &'static str,
    },

    /// Structurally invalid bytes that are not covered by a more specific kind
    #[error("decode error at offset {offset}: {context}")]
    Decode {
        offset: usize,
        context: &'static str,
    },

    #[error("nesting deeper than {limit} levels at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },

    /// Transport adapter failure
    #[error("io error: {reason}")]
    Io { reason: String },
}

impl Error {
    /// Byte offset of the failure, if the error refers to a position.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::MalformedVarint { offset }
            | Error::TruncatedInput { offset, .. }
            | Error::UnknownOpcode { offset, .. }
            | Error::UnknownDatatype { offset, .. }
            | Error::IntegrityDigestLengthMismatch { offset, .. }
            | Error::BlobDecompressionFailed { offset, .. }
            | Error::BlobDecompressionNoDictionary { offset, .. }
            | Error::NotificationUnknownReturnCode { offset, .. }
            | Error::InvalidHeader { offset, .. }
            | Error::Decode { offset, .. }
            | Error::NestingTooDeep { offset, .. } => Some(*offset),
            Error::ReassemblyConflict { .. } | Error::Io { .. } => None,
        }
    }

    /// Shift a slice-relative offset so it becomes relative to the enclosing buffer.
    pub(crate) fn rebase(mut self, base: usize) -> Self {
        match &mut self {
            Error::MalformedVarint { offset }
            | Error::TruncatedInput { offset, .. }
            | Error::UnknownOpcode { offset, .. }
            | Error::UnknownDatatype { offset, .. }
            | Error::IntegrityDigestLengthMismatch { offset, .. }
            | Error::BlobDecompressionFailed { offset, .. }
            | Error::BlobDecompressionNoDictionary { offset, .. }
            | Error::NotificationUnknownReturnCode { offset, .. }
            | Error::InvalidHeader { offset, .. }
            | Error::Decode { offset, .. }
            | Error::NestingTooDeep { offset, .. } => *offset += base,
            Error::ReassemblyConflict { .. } | Error::Io { .. } => {}
        }
        self
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            reason: e.to_string(),
        }
    }
}

/// A recoverable failure recorded while decoding continued past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Offset of the failure, when it refers to a position
    pub offset: Option<usize>,
    pub error: Error,
}

impl From<Error> for Diagnostic {
    fn from(error: Error) -> Self {
        Self {
            offset: error.offset(),
            error,
        }
    }
}
