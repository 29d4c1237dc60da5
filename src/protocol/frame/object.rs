use super::{
    super::error::{Error, Result},
    context::DecodeCtx,
    registry,
    types::{Datatype, ElementId},
    value::{decode_value_tree, IdValue},
};
use crate::protocol::wire::{Cursor, Span};
use nom::number::Endianness;
use serde::Serialize;

/// Upper bound on dimensions of a multi-dimensional array tag
pub const MAX_DIMENSIONS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    pub relation_id: u32,
    pub class_id: u32,
    pub class_flags: u32,
    pub attribute_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_id_flags: Option<u32>,
    pub children: Vec<Element>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: u32,
    pub target: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub lower_bound: i32,
    pub count: u32,
}

/// Where a tag lives inside its block, shape selected by bits 12-13 of the attribute flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OffsetInfo {
    None,
    #[serde(rename_all = "camelCase")]
    BitOffset { optimized: u16, non_optimized: u16 },
    #[serde(rename_all = "camelCase")]
    Array {
        optimized: u16,
        non_optimized: u16,
        lower_bound: i32,
        count: u32,
    },
    #[serde(rename_all = "camelCase")]
    MultiDim {
        optimized: u16,
        non_optimized: u16,
        total_count: u32,
        dimensions: Vec<Dimension>,
    },
}

impl OffsetInfo {
    pub fn code(attribute_flags: u32) -> u32 {
        (attribute_flags >> 12) & 0x3
    }

    /// Read the shape selected by `attribute_flags` with the given byte order.
    pub fn decode(cur: &mut Cursor<'_>, attribute_flags: u32, endian: Endianness) -> Result<Self> {
        let code = Self::code(attribute_flags);
        if code == 0 {
            return Ok(OffsetInfo::None);
        }
        let optimized = cur.u16(endian)?;
        let non_optimized = cur.u16(endian)?;
        Ok(match code {
            1 => OffsetInfo::BitOffset {
                optimized,
                non_optimized,
            },
            2 => OffsetInfo::Array {
                optimized,
                non_optimized,
                lower_bound: cur.i32(endian)?,
                count: cur.u32(endian)?,
            },
            _ => {
                let total_count = cur.u32(endian)?;
                let offset = cur.position();
                let dim_count = cur.u32(endian)?;
                if dim_count > MAX_DIMENSIONS {
                    return Err(Error::Decode {
                        offset,
                        context: "more than 6 array dimensions",
                    });
                }
                let mut dimensions = Vec::with_capacity(dim_count as usize);
                for _ in 0..dim_count {
                    dimensions.push(Dimension {
                        lower_bound: cur.i32(endian)?,
                        count: cur.u32(endian)?,
                    });
                }
                OffsetInfo::MultiDim {
                    optimized,
                    non_optimized,
                    total_count,
                    dimensions,
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDescription {
    pub name: String,
    pub datatype: Datatype,
    pub soft_datatype: u32,
    pub attribute_flags: u32,
    pub lid: u32,
    pub offset_info: OffsetInfo,
}

/// One record of a VARTYPELIST; LIDs are implicit and start at 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarType {
    pub lid: u32,
    pub attribute_flags: u32,
    pub soft_datatype: u8,
    pub bit_offset: u8,
    pub offset_info: OffsetInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "element", content = "body", rename_all = "camelCase")]
pub enum Element {
    Object(Object),
    Attribute(IdValue),
    Relation(Relation),
    TagDescription(TagDescription),
    VarTypeList(Vec<VarType>),
    VarNameList(Vec<String>),
}

/// Read one element; `None` at TERMOBJECT (consumed when `in_object`) or an unknown tag
/// (left unread).
fn read_element(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>, in_object: bool) -> Result<Option<Element>> {
    let Some(tag) = cur.peek_u8() else {
        return Ok(None);
    };
    let Ok(element) = ElementId::try_from(tag) else {
        return Ok(None);
    };
    let start = cur.position();
    Ok(Some(match element {
        ElementId::TermObject => {
            if in_object {
                cur.skip(1)?;
            }
            return Ok(None);
        }
        ElementId::TermTagDescription => return Ok(None),
        ElementId::StartObject => {
            cur.skip(1)?;
            Element::Object(ctx.nested(start, |c| decode_object_body(cur, c, start))?)
        }
        ElementId::Attribute => {
            cur.skip(1)?;
            let id = cur.varuint32()?;
            let value = decode_value_tree(cur, ctx)?;
            let extended = registry::extend(id, &value, cur.parent(), ctx);
            Element::Attribute(IdValue {
                id,
                value,
                extended,
                span: Span::new(start, cur.position()),
            })
        }
        ElementId::Relation => {
            cur.skip(1)?;
            let id = cur.varuint32()?;
            let target = cur.be_u32()?;
            Element::Relation(Relation { id, target })
        }
        ElementId::StartTagDescription => {
            cur.skip(1)?;
            Element::TagDescription(decode_tag_description(cur)?)
        }
        ElementId::VarTypeList => {
            cur.skip(1)?;
            Element::VarTypeList(decode_var_type_list(cur)?)
        }
        ElementId::VarNameList => {
            cur.skip(1)?;
            Element::VarNameList(decode_var_name_list(cur)?)
        }
    }))
}

/// Decode elements of one level. A failing element halts `ctx`; an object keeps the
/// children read before it.
fn decode_elements(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>, in_object: bool) -> Vec<Element> {
    ctx.collect_entries(cur, |cur, ctx| read_element(cur, ctx, in_object))
}

fn decode_object_body(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>, start: usize) -> Result<Object> {
    let relation_id = cur.be_u32()?;
    let class_id = cur.varuint32()?;
    let class_flags = cur.varuint32()?;
    let attribute_id = cur.varuint32()?;
    let attribute_id_flags = if attribute_id != 0 {
        Some(cur.varuint32()?)
    } else {
        None
    };
    let children = decode_elements(cur, ctx, true);
    Ok(Object {
        relation_id,
        class_id,
        class_flags,
        attribute_id,
        attribute_id_flags,
        children,
        span: Span::new(start, cur.position()),
    })
}

fn decode_tag_description(cur: &mut Cursor<'_>) -> Result<TagDescription> {
    let name_len = cur.varuint32()? as usize;
    let name = String::from_utf8_lossy(cur.take(name_len)?).into_owned();
    let dt_offset = cur.position();
    let raw = cur.u8()?;
    let datatype = Datatype::try_from(raw).map_err(|_| Error::UnknownDatatype {
        offset: dt_offset,
        datatype: raw,
    })?;
    let soft_datatype = cur.varuint32()?;
    let attribute_flags = cur.be_u32()?;
    let lid = cur.varuint32()?;
    let offset_info = OffsetInfo::decode(cur, attribute_flags, Endianness::Big)?;
    if cur.peek_u8() == Some(ElementId::TermTagDescription as u8) {
        cur.skip(1)?;
    }
    Ok(TagDescription {
        name,
        datatype,
        soft_datatype,
        attribute_flags,
        lid,
        offset_info,
    })
}

/// Decode `blockLen(u16 BE) · block` repeatedly until a zero length, feeding each block to `record`.
fn decode_blocks<T>(
    cur: &mut Cursor<'_>,
    mut record: impl FnMut(&mut Cursor<'_>, &mut Vec<T>) -> Result<()>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    loop {
        let len = cur.be_u16()? as usize;
        if len == 0 {
            break;
        }
        let mut block = cur.window(len)?;
        while !block.is_empty() {
            record(&mut block, &mut out)?;
        }
    }
    Ok(out)
}

fn decode_var_type_list(cur: &mut Cursor<'_>) -> Result<Vec<VarType>> {
    const LE: Endianness = Endianness::Little;
    decode_blocks(cur, |block, out: &mut Vec<VarType>| {
        let attribute_flags = block.u32(LE)?;
        let soft_datatype = block.u8()?;
        let bit_offset = block.u8()?;
        let offset_info = OffsetInfo::decode(block, attribute_flags, LE)?;
        out.push(VarType {
            lid: out.len() as u32 + 1,
            attribute_flags,
            soft_datatype,
            bit_offset,
            offset_info,
        });
        Ok(())
    })
}

fn decode_var_name_list(cur: &mut Cursor<'_>) -> Result<Vec<String>> {
    decode_blocks(cur, |block, out: &mut Vec<String>| {
        let len = block.u8()? as usize;
        out.push(String::from_utf8_lossy(block.take(len)?).into_owned());
        block.skip(1)?;
        Ok(())
    })
}

/// Decode a sequence of object-tree elements, stopping at the first unknown tag.
///
/// A failing element is recorded on `ctx`, which halts with the cursor at that element.
pub fn decode_object_tree(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Vec<Element> {
    decode_elements(cur, ctx, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecoderConfig;
    use bytes::Bytes;

    fn decode(bytes: Vec<u8>) -> (Vec<Element>, usize) {
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let tree = decode_object_tree(&mut cur, &mut ctx);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        (tree, cur.position())
    }

    #[test]
    fn test_object_with_attribute_and_relation() {
        let bytes = vec![
            0xa1, // STARTOBJECT
            0x00, 0x00, 0x01, 0x00, // relation id
            0x87, 0x48, // class id 0x3c8
            0x00, // class flags
            0x00, // attribute id 0 -> no attribute flags
            0xa3, 0x10, 0x00, 0x02, 0x2A, // attribute 0x10 = USINT 42
            0xa4, 0x05, 0x00, 0x00, 0x00, 0x09, // relation 5 -> 9
            0xa2, // TERMOBJECT
            0x55, // trailing byte left unread
        ];
        let (tree, used) = decode(bytes);
        assert_eq!(used, 21);
        let Element::Object(obj) = &tree[0] else {
            panic!("expected object");
        };
        assert_eq!(obj.relation_id, 0x100);
        assert_eq!(obj.class_id, 0x3c8);
        assert_eq!(obj.attribute_id_flags, None);
        assert_eq!(obj.children.len(), 2);
        assert!(matches!(&obj.children[0], Element::Attribute(a) if a.id == 0x10));
        assert_eq!(
            obj.children[1],
            Element::Relation(Relation { id: 5, target: 9 })
        );
        assert_eq!(obj.span, Span::new(0, 21));
    }

    #[test]
    fn test_nested_objects_with_attribute_flags() {
        let bytes = vec![
            0xa1, 0, 0, 0, 1, 0x01, 0x00, 0x02, 0x07, // attribute id 2 with flags 7
            0xa1, 0, 0, 0, 2, 0x01, 0x00, 0x00, 0xa2, // child
            0xa2,
        ];
        let (tree, used) = decode(bytes);
        assert_eq!(used, 19);
        let Element::Object(outer) = &tree[0] else {
            panic!("expected object");
        };
        assert_eq!(outer.attribute_id_flags, Some(7));
        assert!(matches!(&outer.children[0], Element::Object(inner) if inner.relation_id == 2));
    }

    #[test]
    fn test_tag_description_with_array_offset() {
        let mut bytes = vec![0xa7, 0x03, b'V', b'a', b'l', 0x03, 0x81, 0x00];
        bytes.extend_from_slice(&0x0000_2000u32.to_be_bytes()); // offset code 2
        bytes.push(0x0a); // lid
        bytes.extend_from_slice(&[0x00, 0x04, 0x00, 0x08]);
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        bytes.extend_from_slice(&10u32.to_be_bytes());
        bytes.push(0xa8);
        let total = bytes.len();
        let (tree, used) = decode(bytes);
        assert_eq!(used, total);
        assert_eq!(
            tree[0],
            Element::TagDescription(TagDescription {
                name: "Val".into(),
                datatype: Datatype::UInt,
                soft_datatype: 128,
                attribute_flags: 0x2000,
                lid: 10,
                offset_info: OffsetInfo::Array {
                    optimized: 4,
                    non_optimized: 8,
                    lower_bound: -1,
                    count: 10
                },
            })
        );
    }

    #[test]
    fn test_var_type_list_is_little_endian() {
        let mut block = Vec::new();
        // record 1: flags 0x1000 (bit offset pair)
        block.extend_from_slice(&0x0000_1000u32.to_le_bytes());
        block.extend_from_slice(&[0x01, 0x03]);
        block.extend_from_slice(&2u16.to_le_bytes());
        block.extend_from_slice(&6u16.to_le_bytes());
        // record 2: flags 0x3000 (multi-dim, 2 dims)
        block.extend_from_slice(&0x0000_3000u32.to_le_bytes());
        block.extend_from_slice(&[0x05, 0x00]);
        block.extend_from_slice(&4u16.to_le_bytes());
        block.extend_from_slice(&4u16.to_le_bytes());
        block.extend_from_slice(&6u32.to_le_bytes());
        block.extend_from_slice(&2u32.to_le_bytes());
        block.extend_from_slice(&0i32.to_le_bytes());
        block.extend_from_slice(&2u32.to_le_bytes());
        block.extend_from_slice(&1i32.to_le_bytes());
        block.extend_from_slice(&3u32.to_le_bytes());

        let mut bytes = vec![0xab];
        bytes.extend_from_slice(&(block.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&block);
        bytes.extend_from_slice(&[0x00, 0x00]);
        let (tree, _) = decode(bytes);
        let Element::VarTypeList(types) = &tree[0] else {
            panic!("expected var type list");
        };
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].lid, 1);
        assert_eq!(types[0].bit_offset, 3);
        assert_eq!(
            types[0].offset_info,
            OffsetInfo::BitOffset {
                optimized: 2,
                non_optimized: 6
            }
        );
        assert_eq!(types[1].lid, 2);
        assert_eq!(
            types[1].offset_info,
            OffsetInfo::MultiDim {
                optimized: 4,
                non_optimized: 4,
                total_count: 6,
                dimensions: vec![
                    Dimension {
                        lower_bound: 0,
                        count: 2
                    },
                    Dimension {
                        lower_bound: 1,
                        count: 3
                    },
                ],
            }
        );
    }

    #[test]
    fn test_var_name_list_blocks() {
        let bytes = vec![
            0xac, 0x00, 0x05, 0x03, b'A', b'b', b'c', 0x00, 0x00, 0x03, 0x01, b'x', 0x00, 0x00,
            0x00,
        ];
        let (tree, used) = decode(bytes);
        assert_eq!(used, 15);
        assert_eq!(
            tree[0],
            Element::VarNameList(vec!["Abc".to_string(), "x".to_string()])
        );
    }

    #[test]
    fn test_too_many_dimensions_rejected() {
        let mut bytes = vec![0xa7, 0x01, b'a', 0x01, 0x00];
        bytes.extend_from_slice(&0x0000_3000u32.to_be_bytes());
        bytes.push(0x01);
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&7u32.to_be_bytes());
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        assert!(decode_object_tree(&mut cur, &mut ctx).is_empty());
        assert!(matches!(ctx.diagnostics[0].error, Error::Decode { offset: 18, .. }));
        assert_eq!(ctx.take_halt(), Some(0));
    }

    #[test]
    fn test_failing_child_keeps_earlier_siblings() {
        let bytes = vec![
            0xa1, 0, 0, 0, 1, 0x01, 0x00, 0x00, // object, attribute id 0
            0xa3, 0x10, 0x00, 0x02, 0x2A, // attribute 0x10 = USINT 42
            0xa3, 0x11, 0x00, 0x18, 0x00, // attribute 0x11 with datatype 0x18
            0xa2,
        ];
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let tree = decode_object_tree(&mut cur, &mut ctx);
        let Element::Object(obj) = &tree[0] else {
            panic!("expected object");
        };
        assert_eq!(obj.children.len(), 1);
        assert!(matches!(&obj.children[0], Element::Attribute(a) if a.id == 0x10));
        assert_eq!(
            ctx.diagnostics[0].error,
            Error::UnknownDatatype {
                offset: 16,
                datatype: 0x18
            }
        );
        assert_eq!(ctx.take_halt(), Some(13));
        assert_eq!(cur.position(), 13);
    }
}
