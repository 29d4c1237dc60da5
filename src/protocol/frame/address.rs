use super::super::error::Result;
use crate::protocol::wire::{Cursor, Span};
use serde::Serialize;

/// DB areas occupy 0x8a0e0000..=0x8a0effff; the low 16 bits are the DB number
const DB_AREA_MASK: u32 = 0xffff_0000;
const DB_AREA_BASE: u32 = 0x8a0e_0000;

/// Access kind LID selecting byte/bit addressing inside a classic area
const ACCESS_CLASSIC_BLOB: u32 = 3;

/// Native (non-DB) memory areas
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NativeArea {
    Inputs = 80,
    Outputs = 81,
    Flags = 82,
    Counters = 83,
    Timers = 84,
}

impl TryFrom<u32> for NativeArea {
    type Error = ();

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            80 => Ok(NativeArea::Inputs),
            81 => Ok(NativeArea::Outputs),
            82 => Ok(NativeArea::Flags),
            83 => Ok(NativeArea::Counters),
            84 => Ok(NativeArea::Timers),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseArea {
    Db(u16),
    Native(NativeArea),
    Other(u32),
}

impl From<u32> for BaseArea {
    fn from(raw: u32) -> Self {
        if raw & DB_AREA_MASK == DB_AREA_BASE {
            BaseArea::Db(raw as u16)
        } else if let Ok(area) = NativeArea::try_from(raw) {
            BaseArea::Native(area)
        } else {
            BaseArea::Other(raw)
        }
    }
}

impl BaseArea {
    fn is_classic_capable(self) -> bool {
        !matches!(self, BaseArea::Other(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessKind {
    ClassicBlob,
    Other(u32),
}

impl From<u32> for AccessKind {
    fn from(raw: u32) -> Self {
        match raw {
            ACCESS_CLASSIC_BLOB => AccessKind::ClassicBlob,
            other => AccessKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Access {
    Symbolic {
        lids: Vec<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Classic {
        access_kind: AccessKind,
        byte_offset: Option<u32>,
        byte_count: Option<u32>,
        bit_offset: Option<u32>,
        extra_lids: Vec<u32>,
    },
}

impl Access {
    /// Interpret a LID chain under `base`.
    ///
    /// The chain is classic when it is longer than one LID, the symbol CRC is zero and
    /// the base is a DB or a native area; otherwise every LID is symbolic.
    pub fn from_lids(symbol_crc: u32, base: BaseArea, lids: Vec<u32>) -> Self {
        if lids.len() <= 1 || symbol_crc != 0 || !base.is_classic_capable() {
            return Access::Symbolic { lids };
        }
        let access_kind = AccessKind::from(lids[0]);
        match access_kind {
            AccessKind::ClassicBlob => Access::Classic {
                access_kind,
                byte_offset: lids.get(1).copied(),
                byte_count: lids.get(2).copied(),
                bit_offset: lids.get(3).copied(),
                extra_lids: lids.get(4..).map(<[u32]>::to_vec).unwrap_or_default(),
            },
            AccessKind::Other(_) => Access::Classic {
                access_kind,
                byte_offset: None,
                byte_count: None,
                bit_offset: None,
                extra_lids: lids[1..].to_vec(),
            },
        }
    }
}

/// Symbolic item address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAddress {
    pub symbol_crc: u32,
    pub base_area: BaseArea,
    pub sub_area: u32,
    pub lid_nest_depth: u32,
    /// High half of the subscription-list head
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u16>,
    pub access: Access,
    pub span: Span,
}

/// Which of the two wire layouts an address uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressVariant {
    /// `crc · base · subArea · depth · lids`
    Primary,
    /// `head(depth | flags << 16) · base · crc · subArea · lids`
    SubscriptionList,
}

fn read_lids(cur: &mut Cursor<'_>, depth: u32) -> Result<Vec<u32>> {
    let n = cur.check_count(depth, 1)?;
    let mut lids = Vec::with_capacity(n);
    for _ in 0..n {
        lids.push(cur.varuint32()?);
    }
    Ok(lids)
}

pub fn decode_item_address(cur: &mut Cursor<'_>, variant: AddressVariant) -> Result<ItemAddress> {
    let start = cur.position();
    let (symbol_crc, raw_base, sub_area, depth, flags) = match variant {
        AddressVariant::Primary => {
            let crc = cur.varuint32()?;
            let base = cur.varuint32()?;
            let sub = cur.varuint32()?;
            let depth = cur.varuint32()?;
            (crc, base, sub, depth, None)
        }
        AddressVariant::SubscriptionList => {
            let head = cur.varuint32()?;
            let base = cur.varuint32()?;
            let crc = cur.varuint32()?;
            let sub = cur.varuint32()?;
            (crc, base, sub, head & 0xffff, Some((head >> 16) as u16))
        }
    };
    let base_area = BaseArea::from(raw_base);
    let lids = read_lids(cur, depth)?;
    Ok(ItemAddress {
        symbol_crc,
        base_area,
        sub_area,
        lid_nest_depth: depth,
        flags,
        access: Access::from_lids(symbol_crc, base_area, lids),
        span: Span::new(start, cur.position()),
    })
}
