// ===== Value and id-value list decoding =====
use super::{
    super::error::{Error, Result},
    context::DecodeCtx,
    registry::{self, Extended},
    types::{Datatype, DatatypeFlags},
};
use crate::protocol::wire::{Cursor, Span};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use nom::number::Endianness;
use serde::Serialize;
use std::fmt;

/// Structs in these ranges carry a packed payload instead of a member list
const PACKED_STRUCT_RANGES: [(u32, u32); 2] =
    [(0x9000_0000, 0x9FFF_FFFF), (0x0200_0000, 0x02FF_FFFF)];

/// Reserved bytes between a blob's root id and its nested list
const BLOB_ROOT_RESERVED: usize = 9;

/// Nanoseconds since 1970-01-01 UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// `(milliseconds, microseconds, nanoseconds)` within the current second
    pub fn split_subsec(self) -> (u32, u32, u32) {
        let sub = (self.0 % 1_000_000_000) as u32;
        (sub / 1_000_000, (sub / 1_000) % 1_000, sub % 1_000)
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.0 / 1_000_000_000).ok()?;
        DateTime::from_timestamp(secs, (self.0 % 1_000_000_000) as u32)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ms, us, ns) = self.split_subsec();
        match self.to_datetime() {
            Some(dt) => write!(f, "{}.{ms:03}.{us:03}.{ns:03}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}ns", self.0),
        }
    }
}

/// Signed duration in nanoseconds, rendered as an LTIME literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Timespan(pub i64);

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 7] = [
            (86_400_000_000_000, "d"),
            (3_600_000_000_000, "h"),
            (60_000_000_000, "m"),
            (1_000_000_000, "s"),
            (1_000_000, "ms"),
            (1_000, "us"),
            (1, "ns"),
        ];
        f.write_str("LT#")?;
        if self.0 == 0 {
            return f.write_str("0ns");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }
        let mut rest = self.0.unsigned_abs();
        let mut first = true;
        for (div, unit) in UNITS {
            let n = rest / div;
            rest %= div;
            if n == 0 {
                continue;
            }
            if !first {
                f.write_str("_")?;
            }
            write!(f, "{n}{unit}")?;
            first = false;
        }
        Ok(())
    }
}

/// Payload of a packed struct
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedStruct {
    pub interface_timestamp: u64,
    pub transport_size: u8,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructValue {
    pub value: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed: Option<PackedStruct>,
    /// Members from the nested id-value list (empty for packed structs)
    pub members: Vec<IdValue>,
}

impl StructValue {
    pub fn is_packed_id(value: u32) -> bool {
        PACKED_STRUCT_RANGES
            .iter()
            .any(|&(lo, hi)| (lo..=hi).contains(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Blob {
    Raw { data: Bytes },
    Nested { root_id: u32, members: Vec<IdValue> },
}

/// A single decoded value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    USInt(u8),
    UInt(u16),
    UDInt(u32),
    ULInt(u64),
    SInt(i8),
    Int(i16),
    DInt(i32),
    LInt(i64),
    Byte(u8),
    Word(u16),
    DWord(u32),
    LWord(u64),
    Real(f32),
    LReal(f64),
    Timestamp(Timestamp),
    Timespan(Timespan),
    Rid(u32),
    Aid(u32),
    Blob(Blob),
    WString(String),
    S7String(String),
    /// Datatype tag carried inline, then the value
    Variant(Datatype, Box<Scalar>),
    Struct(StructValue),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Scalar(Scalar),
    Array(Vec<Scalar>),
    SparseArray(Vec<(u32, Scalar)>),
    StructArray {
        struct_id: u32,
        elements: Vec<Vec<IdValue>>,
    },
}

/// A value with its flags and datatype header
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemValue {
    pub flags: DatatypeFlags,
    pub datatype: Datatype,
    pub payload: Payload,
    pub span: Span,
}

impl ItemValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.payload {
            Payload::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// One entry of an id-value list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdValue {
    pub id: u32,
    pub value: ItemValue,
    /// Interpretation from the extended decode registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended: Option<Extended>,
    pub span: Span,
}

/// What the driver must decode after a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    PlainValue,
    /// A plain struct: its members follow as an id-value list
    EnterIdValueList,
    /// A struct address array: `count` id-value lists follow
    EnterAddressedList { count: usize },
}

/// Smallest wire size of one scalar, used to bound element counts
fn min_scalar_len(datatype: Datatype) -> usize {
    match datatype {
        Datatype::UInt | Datatype::Int | Datatype::Word => 2,
        Datatype::DWord | Datatype::Real | Datatype::Rid | Datatype::Struct => 4,
        Datatype::LWord | Datatype::LReal | Datatype::Timestamp => 8,
        _ => 1,
    }
}

fn read_datatype(cur: &mut Cursor<'_>) -> Result<Datatype> {
    let offset = cur.position();
    let raw = cur.u8()?;
    Datatype::try_from(raw).map_err(|_| Error::UnknownDatatype {
        offset,
        datatype: raw,
    })
}

/// Decode one scalar of `datatype` at the cursor.
pub fn decode_scalar(
    cur: &mut Cursor<'_>,
    datatype: Datatype,
    ctx: &mut DecodeCtx<'_>,
) -> Result<Scalar> {
    const BE: Endianness = Endianness::Big;
    Ok(match datatype {
        Datatype::Null => Scalar::Null,
        Datatype::Bool => Scalar::Bool(cur.u8()? != 0),
        Datatype::USInt => Scalar::USInt(cur.u8()?),
        Datatype::SInt => Scalar::SInt(cur.i8()?),
        Datatype::Byte => Scalar::Byte(cur.u8()?),
        Datatype::UInt => Scalar::UInt(cur.u16(BE)?),
        Datatype::Int => Scalar::Int(cur.i16(BE)?),
        Datatype::Word => Scalar::Word(cur.u16(BE)?),
        Datatype::UDInt => Scalar::UDInt(cur.varuint32()?),
        Datatype::Aid => Scalar::Aid(cur.varuint32()?),
        Datatype::ULInt => Scalar::ULInt(cur.varuint64()?),
        Datatype::DInt => Scalar::DInt(cur.varint32()?),
        Datatype::LInt => Scalar::LInt(cur.varint64()?),
        Datatype::Timespan => Scalar::Timespan(Timespan(cur.varint64()?)),
        Datatype::DWord => Scalar::DWord(cur.u32(BE)?),
        Datatype::Rid => Scalar::Rid(cur.u32(BE)?),
        Datatype::LWord => Scalar::LWord(cur.u64(BE)?),
        Datatype::Real => Scalar::Real(cur.f32(BE)?),
        Datatype::LReal => Scalar::LReal(cur.f64(BE)?),
        Datatype::Timestamp => Scalar::Timestamp(Timestamp(cur.u64(BE)?)),
        Datatype::WString => {
            let len = cur.varuint32()? as usize;
            Scalar::WString(String::from_utf8_lossy(cur.take(len)?).into_owned())
        }
        Datatype::S7String => {
            let len = cur.varuint32()? as usize;
            Scalar::S7String(cur.take(len)?.iter().map(|&b| b as char).collect())
        }
        Datatype::Blob => {
            let root_id = cur.varuint32()?;
            if root_id > 0 {
                cur.skip(BLOB_ROOT_RESERVED)?;
                let members = ctx.nested(cur.position(), |c| decode_id_value_list(cur, c))?;
                Scalar::Blob(Blob::Nested { root_id, members })
            } else {
                let len = cur.varuint32()? as usize;
                Scalar::Blob(Blob::Raw {
                    data: cur.take_bytes(len)?,
                })
            }
        }
        Datatype::Variant => {
            let inner = read_datatype(cur)?;
            let value = ctx.nested(cur.position(), |c| decode_scalar(cur, inner, c))?;
            Scalar::Variant(inner, Box::new(value))
        }
        Datatype::Struct => {
            let value = cur.be_u32()?;
            let packed = if StructValue::is_packed_id(value) {
                let interface_timestamp = cur.be_u64()?;
                let transport_size = cur.u8()?;
                let count = cur.varuint32()? as usize;
                Some(PackedStruct {
                    interface_timestamp,
                    transport_size,
                    data: cur.take_bytes(count)?,
                })
            } else {
                None
            };
            Scalar::Struct(StructValue {
                value,
                packed,
                members: Vec::new(),
            })
        }
    })
}

/// Decode `flags · datatype · payload` without following nested lists.
pub fn decode_value(
    cur: &mut Cursor<'_>,
    ctx: &mut DecodeCtx<'_>,
) -> Result<(ItemValue, DecodeOutcome)> {
    let start = cur.position();
    let flags = DatatypeFlags(cur.u8()?);
    let datatype = read_datatype(cur)?;

    let (payload, outcome) = if flags.is_sparse_array() {
        let mut entries = Vec::new();
        loop {
            let key = cur.varuint32()?;
            if key == 0 {
                break;
            }
            entries.push((key, decode_scalar(cur, datatype, ctx)?));
        }
        (Payload::SparseArray(entries), DecodeOutcome::PlainValue)
    } else if datatype == Datatype::Struct && flags.is_address_array() {
        let struct_id = cur.be_u32()?;
        let count = cur.varuint32()?;
        let count = cur.check_count(count, 1)?;
        (
            Payload::StructArray {
                struct_id,
                elements: Vec::with_capacity(count),
            },
            DecodeOutcome::EnterAddressedList { count },
        )
    } else if flags.is_array() || flags.is_address_array() {
        let size = cur.varuint32()?;
        let size = cur.check_count(size, min_scalar_len(datatype))?;
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(decode_scalar(cur, datatype, ctx)?);
        }
        (Payload::Array(items), DecodeOutcome::PlainValue)
    } else {
        let scalar = decode_scalar(cur, datatype, ctx)?;
        let outcome = match &scalar {
            Scalar::Struct(s) if s.packed.is_none() => DecodeOutcome::EnterIdValueList,
            _ => DecodeOutcome::PlainValue,
        };
        (Payload::Scalar(scalar), outcome)
    };

    Ok((
        ItemValue {
            flags,
            datatype,
            payload,
            span: Span::new(start, cur.position()),
        },
        outcome,
    ))
}

/// Decode a value and every nested list its outcome asks for.
pub fn decode_value_tree(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<ItemValue> {
    let (mut item, outcome) = decode_value(cur, ctx)?;
    match outcome {
        DecodeOutcome::PlainValue => {}
        DecodeOutcome::EnterIdValueList => {
            let members = ctx.nested(cur.position(), |c| decode_id_value_list(cur, c))?;
            if let Payload::Scalar(Scalar::Struct(s)) = &mut item.payload {
                s.members = members;
            }
        }
        DecodeOutcome::EnterAddressedList { count } => {
            for _ in 0..count {
                let list = ctx.nested(cur.position(), |c| decode_id_value_list(cur, c))?;
                if let Payload::StructArray { elements, .. } = &mut item.payload {
                    elements.push(list);
                }
            }
        }
    }
    item.span.end = cur.position();
    Ok(item)
}

/// Read one `id · value` entry; `None` on the terminating id 0.
fn read_id_value(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<Option<IdValue>> {
    let start = cur.position();
    let id = cur.varuint32()?;
    if id == 0 {
        return Ok(None);
    }
    let value = decode_value_tree(cur, ctx)?;
    let extended = registry::extend(id, &value, cur.parent(), ctx);
    Ok(Some(IdValue {
        id,
        value,
        extended,
        span: Span::new(start, cur.position()),
    }))
}

/// Decode `(id · value)*` up to and including the terminating id 0.
pub fn decode_id_value_list(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<Vec<IdValue>> {
    let mut out = Vec::new();
    while let Some(entry) = read_id_value(cur, ctx)? {
        out.push(entry);
    }
    Ok(out)
}

/// Id-value list at body level: a failing entry ends the list and halts `ctx`, keeping
/// the entries before it.
pub fn collect_id_value_list(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Vec<IdValue> {
    ctx.collect_entries(cur, read_id_value)
}
