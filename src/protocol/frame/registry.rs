//! Attribute-specific interpretation layered on top of the generic value.

use super::{
    super::error::{Error, Result},
    address::{decode_item_address, AddressVariant, ItemAddress},
    blob::{self, CompressedBlob},
    context::DecodeCtx,
    types::Datatype,
    value::{Blob, ItemValue, Payload, Scalar, Timestamp},
};
use crate::protocol::wire::Cursor;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Alarm HMI info: 8 bytes big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HmiInfo {
    pub syntax_id: u16,
    pub version: u8,
    pub client_alarm_id: u32,
    pub priority: u8,
}

impl HmiInfo {
    pub const LEN: usize = 8;

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != Self::LEN {
            return None;
        }
        Some(HmiInfo {
            syntax_id: u16::from_be_bytes([data[0], data[1]]),
            version: data[2],
            client_alarm_id: u32::from_be_bytes([data[3], data[4], data[5], data[6]]),
            priority: data[7],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedItem {
    pub reference: u32,
    pub address: ItemAddress,
}

/// Items a subscription adds and drops, carried as a UDINT array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRefList {
    pub credit_limit: u32,
    pub unsubscribe: Vec<u32>,
    pub subscribe: Vec<SubscribedItem>,
}

impl SubscriptionRefList {
    /// Read the array value at the cursor; its elements are
    /// `head(subscribe | unsubscribe << 16) · creditLimit · unsubscribeRef* · (ref · address)*`.
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        // flags · datatype · element count
        cur.skip(2)?;
        cur.varuint32()?;
        let head = cur.varuint32()?;
        let credit_limit = cur.varuint32()?;
        let n = cur.check_count(head >> 16, 1)?;
        let mut unsubscribe = Vec::with_capacity(n);
        for _ in 0..n {
            unsubscribe.push(cur.varuint32()?);
        }
        // reference plus the four head fields of an address
        let n = cur.check_count(head & 0xffff, 5)?;
        let mut subscribe = Vec::with_capacity(n);
        for _ in 0..n {
            subscribe.push(SubscribedItem {
                reference: cur.varuint32()?,
                address: decode_item_address(cur, AddressVariant::SubscriptionList)?,
            });
        }
        Ok(Self {
            credit_limit,
            unsubscribe,
            subscribe,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Extended {
    Timestamp { time: DateTime<Utc> },
    Enum { value: u64, name: &'static str },
    Xml(CompressedBlob),
    HmiInfo(HmiInfo),
    SubscriptionRefList(SubscriptionRefList),
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    UlintTimestamp,
    Enum(&'static [(u64, &'static str)]),
    CompressedXml,
    HmiInfo,
    /// UDINT array re-read as a subscription reference list
    SubscriptionRefs,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    id: u32,
    datatype: Datatype,
    kind: Kind,
}

const OPERATING_STATES: &[(u64, &str)] = &[
    (0, "Unknown"),
    (1, "Stop/firmware update"),
    (2, "Stop/reset memory"),
    (3, "Stop/self initialization"),
    (4, "Stop"),
    (5, "Startup"),
    (6, "Run"),
    (7, "Run/redundant"),
    (8, "Halt"),
    (9, "Run/link-up"),
    (10, "Run/update"),
    (11, "Defective"),
    (12, "Error search"),
    (13, "Power off"),
];

const BLOCK_LANGUAGES: &[(u64, &str)] = &[
    (0, "Undefined"),
    (1, "STL"),
    (2, "LAD"),
    (3, "FBD"),
    (4, "SCL"),
    (5, "DB"),
    (6, "GRAPH"),
    (7, "SDB"),
];

const fn reg(id: u32, datatype: Datatype, kind: Kind) -> Registration {
    Registration { id, datatype, kind }
}

/// Sorted by id
static REGISTRY: &[Registration] = &[
    reg(1048, Datatype::UDInt, Kind::SubscriptionRefs),
    reg(2445, Datatype::ULInt, Kind::UlintTimestamp),
    reg(2521, Datatype::Blob, Kind::CompressedXml),
    reg(2523, Datatype::UInt, Kind::Enum(BLOCK_LANGUAGES)),
    reg(2525, Datatype::ULInt, Kind::UlintTimestamp),
    reg(2527, Datatype::ULInt, Kind::UlintTimestamp),
    reg(2583, Datatype::Blob, Kind::CompressedXml),
    reg(2584, Datatype::Blob, Kind::CompressedXml),
    reg(2589, Datatype::Blob, Kind::CompressedXml),
    reg(2590, Datatype::Blob, Kind::CompressedXml),
    reg(2593, Datatype::Blob, Kind::CompressedXml),
    reg(2595, Datatype::Blob, Kind::CompressedXml),
    reg(2596, Datatype::Blob, Kind::CompressedXml),
    reg(3736, Datatype::UDInt, Kind::Enum(OPERATING_STATES)),
    reg(4275, Datatype::Blob, Kind::CompressedXml),
    reg(7813, Datatype::Blob, Kind::HmiInfo),
];

fn lookup(id: u32) -> Option<&'static Registration> {
    REGISTRY
        .binary_search_by_key(&id, |r| r.id)
        .ok()
        .map(|i| &REGISTRY[i])
}

fn as_unsigned(s: &Scalar) -> Option<u64> {
    Some(match *s {
        Scalar::USInt(v) | Scalar::Byte(v) => u64::from(v),
        Scalar::UInt(v) | Scalar::Word(v) => u64::from(v),
        Scalar::UDInt(v) | Scalar::DWord(v) => u64::from(v),
        Scalar::ULInt(v) | Scalar::LWord(v) => v,
        _ => return None,
    })
}

/// Re-read the elements of a UDINT array from `parent` as a subscription reference list.
fn subscription_refs(value: &ItemValue, parent: &Bytes, ctx: &mut DecodeCtx<'_>) -> Option<Extended> {
    if !matches!(value.payload, Payload::Array(_)) {
        return None;
    }
    let mut cur = Cursor::with_range(parent, value.span.start, value.span.end);
    match SubscriptionRefList::decode(&mut cur) {
        Ok(list) if cur.is_empty() => Some(Extended::SubscriptionRefList(list)),
        Ok(_) => {
            ctx.record(Error::Decode {
                offset: cur.position(),
                context: "subscription reference list leaves array elements unread",
            });
            None
        }
        Err(e) => {
            ctx.record(e);
            None
        }
    }
}

/// Apply the registration for `id`, if any, to a decoded value read from `parent`.
///
/// Decompression and reference-list failures are recorded on `ctx` and yield `None`.
pub fn extend(id: u32, value: &ItemValue, parent: &Bytes, ctx: &mut DecodeCtx<'_>) -> Option<Extended> {
    let reg = lookup(id)?;
    if reg.datatype != value.datatype {
        return None;
    }
    if let Kind::SubscriptionRefs = reg.kind {
        return subscription_refs(value, parent, ctx);
    }
    let Payload::Scalar(scalar) = &value.payload else {
        return None;
    };
    match reg.kind {
        Kind::UlintTimestamp => match *scalar {
            Scalar::ULInt(ns) => Timestamp(ns)
                .to_datetime()
                .map(|time| Extended::Timestamp { time }),
            _ => None,
        },
        Kind::Enum(names) => {
            let raw = as_unsigned(scalar)?;
            names
                .iter()
                .find(|(v, _)| *v == raw)
                .map(|&(value, name)| Extended::Enum { value, name })
        }
        Kind::CompressedXml => {
            if !ctx.config.decompress_blobs {
                return None;
            }
            let Scalar::Blob(Blob::Raw { data }) = scalar else {
                return None;
            };
            let offset = value.span.end - data.len();
            let config = ctx.config;
            match blob::decompress(
                id,
                data,
                offset,
                &config.dictionaries,
                config.max_decompressed_size,
            ) {
                Ok(xml) => Some(Extended::Xml(xml)),
                Err(e) => {
                    ctx.record(e);
                    None
                }
            }
        }
        Kind::HmiInfo => match scalar {
            Scalar::Blob(Blob::Raw { data }) => HmiInfo::parse(data).map(Extended::HmiInfo),
            _ => None,
        },
        Kind::SubscriptionRefs => None,
    }
}
