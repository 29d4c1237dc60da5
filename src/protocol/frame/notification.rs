use super::{
    super::error::{Error, Result},
    context::DecodeCtx,
    object::{decode_object_tree, Element},
    retval::ReturnValue,
    types::ElementId,
    value::{decode_value_tree, ItemValue},
};
use crate::protocol::wire::Cursor;
use serde::Serialize;

const ITEM_VALUE: u8 = 0x92;
const ITEM_VALUE_COMPACT: u8 = 0x9b;
const ITEM_STATUS: u8 = 0x9c;
const ITEM_ERROR: u8 = 0x13;
const ITEM_ERROR_ALT: u8 = 0x81;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NotificationItem {
    #[serde(rename_all = "camelCase")]
    Value { item_ref: u32, value: ItemValue },
    /// Item reference sent as varuint32
    #[serde(rename_all = "camelCase")]
    CompactValue { item_ref: u32, value: ItemValue },
    #[serde(rename_all = "camelCase")]
    Status { item_ref: u32, status: u8 },
    #[serde(rename_all = "camelCase")]
    Error {
        code: u8,
        item_ref: u32,
        return_value: ReturnValue,
    },
}

/// Subscription notification (opcode 0x33, no function header)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_object_id: u32,
    pub reserved: [u16; 3],
    pub credit_tick: u8,
    pub sequence_number: u32,
    pub items: Vec<NotificationItem>,
    pub objects: Vec<Element>,
}

/// Read one item; `None` on the terminating 0x00.
fn read_item(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<Option<NotificationItem>> {
    let offset = cur.position();
    let code = cur.u8()?;
    Ok(Some(match code {
        0x00 => return Ok(None),
        ITEM_VALUE => NotificationItem::Value {
            item_ref: cur.be_u32()?,
            value: decode_value_tree(cur, ctx)?,
        },
        ITEM_VALUE_COMPACT => NotificationItem::CompactValue {
            item_ref: cur.varuint32()?,
            value: decode_value_tree(cur, ctx)?,
        },
        ITEM_STATUS => NotificationItem::Status {
            item_ref: cur.be_u32()?,
            status: cur.u8()?,
        },
        ITEM_ERROR | ITEM_ERROR_ALT => NotificationItem::Error {
            code,
            item_ref: cur.be_u32()?,
            return_value: ReturnValue::decode(cur)?,
        },
        _ => return Err(Error::NotificationUnknownReturnCode { offset, code }),
    }))
}

/// Decode a notification body.
///
/// A failing item, an unknown return code included, is recorded on `ctx` and ends the
/// item list; the items before it are kept and `ctx` halts at its first byte.
pub fn decode_notification(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<Notification> {
    let subscription_object_id = cur.be_u32()?;
    let reserved = [cur.be_u16()?, cur.be_u16()?, cur.be_u16()?];
    let credit_tick = cur.u8()?;
    let sequence_number = cur.varuint32()?;

    let items = ctx.collect_entries(cur, read_item);
    let objects = if !ctx.is_halted() && cur.peek_u8() == Some(ElementId::StartObject as u8) {
        decode_object_tree(cur, ctx)
    } else {
        Vec::new()
    };

    Ok(Notification {
        subscription_object_id,
        reserved,
        credit_tick,
        sequence_number,
        items,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::frame::value::{Payload, Scalar},
        types::DecoderConfig,
    };
    use bytes::Bytes;

    const HEAD: [u8; 12] = [
        0x00, 0x00, 0x10, 0x01, // subscription object
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
        0x02, // credit tick
        0x05, // sequence number
    ];

    #[test]
    fn test_notification_items() {
        let mut bytes = HEAD.to_vec();
        bytes.extend_from_slice(&[0x92, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 0x00, 0x2A]);
        bytes.extend_from_slice(&[0x9b, 0x02, 0x00, 0x01, 0x00]);
        bytes.extend_from_slice(&[0x9c, 0x00, 0x00, 0x00, 0x03, 0x01]);
        bytes.extend_from_slice(&[0x13, 0x00, 0x00, 0x00, 0x04, 0x00]);
        bytes.push(0x00);
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let n = decode_notification(&mut cur, &mut ctx).unwrap();
        assert!(cur.is_empty());
        assert!(ctx.diagnostics.is_empty());
        assert_eq!(n.subscription_object_id, 0x1001);
        assert_eq!(n.credit_tick, 2);
        assert_eq!(n.sequence_number, 5);
        assert_eq!(n.items.len(), 4);
        let NotificationItem::Value { item_ref, value } = &n.items[0] else {
            panic!("expected value item");
        };
        assert_eq!(*item_ref, 1);
        assert_eq!(value.payload, Payload::Scalar(Scalar::UInt(42)));
        assert!(matches!(n.items[1], NotificationItem::CompactValue { item_ref: 2, .. }));
        assert_eq!(
            n.items[2],
            NotificationItem::Status {
                item_ref: 3,
                status: 1
            }
        );
        assert!(matches!(n.items[3], NotificationItem::Error { code: 0x13, item_ref: 4, .. }));
    }

    #[test]
    fn test_unknown_return_code_stops_items() {
        let mut bytes = HEAD.to_vec();
        bytes.extend_from_slice(&[0x9c, 0x00, 0x00, 0x00, 0x03, 0x01, 0x77, 0xEE]);
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let n = decode_notification(&mut cur, &mut ctx).unwrap();
        assert_eq!(n.items.len(), 1);
        assert_eq!(cur.position(), 18);
        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(
            ctx.diagnostics[0].error,
            Error::NotificationUnknownReturnCode {
                offset: 18,
                code: 0x77
            }
        );
        assert_eq!(ctx.diagnostics[0].offset, Some(18));
        assert_eq!(ctx.take_halt(), Some(18));
    }

    #[test]
    fn test_bad_item_value_keeps_earlier_items() {
        let mut bytes = HEAD.to_vec();
        bytes.extend_from_slice(&[0x9c, 0x00, 0x00, 0x00, 0x03, 0x01]);
        // value item whose datatype byte 0x18 is unassigned
        bytes.extend_from_slice(&[0x92, 0x00, 0x00, 0x00, 0x04, 0x00, 0x18, 0x00, 0x00]);
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let n = decode_notification(&mut cur, &mut ctx).unwrap();
        assert_eq!(n.items.len(), 1);
        assert!(n.objects.is_empty());
        assert_eq!(
            ctx.diagnostics[0].error,
            Error::UnknownDatatype {
                offset: 24,
                datatype: 0x18
            }
        );
        assert_eq!(ctx.take_halt(), Some(18));
    }

    #[test]
    fn test_trailing_object_tree() {
        let mut bytes = HEAD.to_vec();
        bytes.push(0x00);
        bytes.extend_from_slice(&[0xa1, 0, 0, 0, 1, 0x01, 0x00, 0x00, 0xa2]);
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let n = decode_notification(&mut cur, &mut ctx).unwrap();
        assert!(n.items.is_empty());
        assert_eq!(n.objects.len(), 1);
        assert!(cur.is_empty());
    }
}
