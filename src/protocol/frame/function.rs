// ===== Per-operation request/response bodies =====
use super::{
    super::error::Result,
    address::{decode_item_address, AddressVariant, ItemAddress},
    context::DecodeCtx,
    object::{decode_object_tree, Element},
    retval::ReturnValue,
    types::FunctionCode,
    value::{collect_id_value_list, decode_value_tree, IdValue, ItemValue},
};
use crate::protocol::wire::Cursor;
use bytes::Bytes;
use serde::Serialize;

/// Return values an Invoke response may chain
const MAX_INVOKE_RETURN_VALUES: usize = 3;
/// Begin-sequence kind carrying an object id instead of a value
const SEQUENCE_KIND_OBJECT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberedValue {
    pub item_number: u32,
    pub value: ItemValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberedError {
    pub item_number: u32,
    pub return_value: ReturnValue,
}

/// Error body, also used for the Error function in both directions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub return_value: ReturnValue,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreRequest {
    pub explore_id: u32,
    pub request_id: u32,
    pub children_recursive: u8,
    pub reserved: u8,
    pub explore_parents: u8,
    pub filters: Vec<Vec<IdValue>>,
    pub attribute_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateObjectRequest {
    pub request_id: u32,
    pub request_value: ItemValue,
    pub reserved: u32,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableRequest {
    pub object_id: u32,
    pub item_count: u32,
    pub ids: Vec<u32>,
    pub values: Vec<ItemValue>,
}

/// `objectId · itemCount · ids`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdsRequest {
    pub object_id: u32,
    pub item_count: u32,
    pub ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub object_id: u32,
    pub items: Vec<IdValue>,
}

/// Items addressed by a multi-variable request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MultiVariablesTarget {
    /// Lead 0: plain read/write by item address
    Addresses { addresses: Vec<ItemAddress> },
    /// Non-zero lead: object id plus LIDs of a link
    #[serde(rename_all = "camelCase")]
    ObjectLink { object_id: u32, lids: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiVariablesRequest {
    pub item_count: u32,
    pub address_field_count: u32,
    pub target: MultiVariablesTarget,
    /// Empty for GetMultiVariables
    pub values: Vec<NumberedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BeginSequenceRequest {
    #[serde(rename_all = "camelCase")]
    Object { object_id: u32 },
    Value { value: ItemValue },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub subsession_id: u32,
    pub reserved: u8,
    pub parameters: Vec<IdValue>,
    pub trailing_reserved: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVarSubStreamedRequest {
    pub object_id: u32,
    pub attribute_id: u32,
    pub stream_flags: u8,
    pub value: ItemValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function")]
pub enum RequestBody {
    Error(ErrorBody),
    Explore(ExploreRequest),
    CreateObject(CreateObjectRequest),
    #[serde(rename_all = "camelCase")]
    DeleteObject { object_id: u32 },
    SetVariable(SetVariableRequest),
    GetVariable(ItemIdsRequest),
    AddLink(LinkRequest),
    RemoveLink(LinkRequest),
    #[serde(rename_all = "camelCase")]
    GetLink { object_id: u32, link_id: u32 },
    SetMultiVariables(MultiVariablesRequest),
    GetMultiVariables(MultiVariablesRequest),
    BeginSequence(BeginSequenceRequest),
    EndSequence { reserved: u16 },
    Invoke(InvokeRequest),
    SetVarSubStreamed(SetVarSubStreamedRequest),
    GetVarSubStreamed(ItemIdsRequest),
    #[serde(rename_all = "camelCase")]
    GetVariablesAddress { object_id: u32, attribute_id: u32 },
    #[serde(rename_all = "camelCase")]
    Abort { object_id: u32 },
}

/// Return value plus the object tree it announces through `errorExtension`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub return_value: ReturnValue,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStatusResponse {
    pub return_value: ReturnValue,
    pub object_id: Option<u32>,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreResponse {
    pub return_value: ReturnValue,
    pub explore_id: Option<u32>,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateObjectResponse {
    pub return_value: ReturnValue,
    pub object_ids: Vec<u32>,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueResponse {
    pub return_value: ReturnValue,
    pub value: Option<ItemValue>,
    pub objects: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLinkResponse {
    pub return_value: ReturnValue,
    pub link_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiVariablesResponse {
    pub return_value: ReturnValue,
    /// Empty for SetMultiVariables
    pub values: Vec<NumberedValue>,
    pub errors: Vec<NumberedError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    /// The leading return value and up to two chained ones
    pub return_values: Vec<ReturnValue>,
    pub results: Vec<IdValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function")]
pub enum ResponseBody {
    Error(ErrorBody),
    Explore(ExploreResponse),
    CreateObject(CreateObjectResponse),
    DeleteObject(ObjectStatusResponse),
    SetVariable(StatusResponse),
    GetVariable(ValueResponse),
    AddLink(StatusResponse),
    RemoveLink(StatusResponse),
    GetLink(GetLinkResponse),
    SetMultiVariables(MultiVariablesResponse),
    GetMultiVariables(MultiVariablesResponse),
    BeginSequence(ObjectStatusResponse),
    EndSequence(StatusResponse),
    Invoke(InvokeResponse),
    SetVarSubStreamed(StatusResponse),
    GetVarSubStreamed(ValueResponse),
    GetVariablesAddress(ValueResponse),
    Abort(StatusResponse),
}

/// Continuation segment of a streamed SetVarSubStreamed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub length: u32,
    pub data: Bytes,
}

fn read_u32_ids(cur: &mut Cursor<'_>, count: u32) -> Result<Vec<u32>> {
    let n = cur.check_count(count, 1)?;
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        ids.push(cur.varuint32()?);
    }
    Ok(ids)
}

fn read_item_ids(cur: &mut Cursor<'_>) -> Result<ItemIdsRequest> {
    let object_id = cur.be_u32()?;
    let item_count = cur.varuint32()?;
    let ids = read_u32_ids(cur, item_count)?;
    Ok(ItemIdsRequest {
        object_id,
        item_count,
        ids,
    })
}

/// `(itemNumber · value)*` up to item number 0; a failing item halts `ctx`.
fn read_numbered_values(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Vec<NumberedValue> {
    ctx.collect_entries(cur, |cur, ctx| {
        let item_number = cur.varuint32()?;
        if item_number == 0 {
            return Ok(None);
        }
        Ok(Some(NumberedValue {
            item_number,
            value: decode_value_tree(cur, ctx)?,
        }))
    })
}

fn read_numbered_errors(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Vec<NumberedError> {
    ctx.collect_entries(cur, |cur, _| {
        let item_number = cur.varuint32()?;
        if item_number == 0 {
            return Ok(None);
        }
        Ok(Some(NumberedError {
            item_number,
            return_value: ReturnValue::decode(cur)?,
        }))
    })
}

/// Object tree announced by `errorExtension`, empty otherwise.
fn extension_objects(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>, rv: &ReturnValue) -> Vec<Element> {
    if rv.error_extension {
        decode_object_tree(cur, ctx)
    } else {
        Vec::new()
    }
}

fn read_status(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<StatusResponse> {
    let return_value = ReturnValue::decode(cur)?;
    let objects = extension_objects(cur, ctx, &return_value);
    Ok(StatusResponse {
        return_value,
        objects,
    })
}

fn read_error(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<ErrorBody> {
    let StatusResponse {
        return_value,
        objects,
    } = read_status(cur, ctx)?;
    Ok(ErrorBody {
        return_value,
        objects,
    })
}

fn read_value_response(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<ValueResponse> {
    let return_value = ReturnValue::decode(cur)?;
    let objects = extension_objects(cur, ctx, &return_value);
    let value = if cur.is_empty() || ctx.is_halted() {
        None
    } else {
        Some(decode_value_tree(cur, ctx)?)
    };
    Ok(ValueResponse {
        return_value,
        value,
        objects,
    })
}

fn read_object_status(cur: &mut Cursor<'_>, ctx: &mut DecodeCtx<'_>) -> Result<ObjectStatusResponse> {
    let return_value = ReturnValue::decode(cur)?;
    let object_id = if cur.remaining() >= 4 {
        Some(cur.be_u32()?)
    } else {
        None
    };
    let objects = extension_objects(cur, ctx, &return_value);
    Ok(ObjectStatusResponse {
        return_value,
        object_id,
        objects,
    })
}

fn read_multi_variables_request(
    cur: &mut Cursor<'_>,
    ctx: &mut DecodeCtx<'_>,
    with_values: bool,
) -> Result<MultiVariablesRequest> {
    let lead = cur.be_u32()?;
    let item_count = cur.varuint32()?;
    let address_field_count = cur.varuint32()?;
    let target = if lead == 0 {
        let n = cur.check_count(item_count, 4)?;
        let mut addresses = Vec::with_capacity(n);
        for _ in 0..n {
            addresses.push(decode_item_address(cur, AddressVariant::Primary)?);
        }
        MultiVariablesTarget::Addresses { addresses }
    } else {
        MultiVariablesTarget::ObjectLink {
            object_id: lead,
            lids: read_u32_ids(cur, item_count)?,
        }
    };
    let values = if with_values {
        read_numbered_values(cur, ctx)
    } else {
        Vec::new()
    };
    Ok(MultiVariablesRequest {
        item_count,
        address_field_count,
        target,
        values,
    })
}

/// Decode a request body for `function`.
pub fn decode_request(
    function: FunctionCode,
    cur: &mut Cursor<'_>,
    ctx: &mut DecodeCtx<'_>,
) -> Result<RequestBody> {
    Ok(match function {
        FunctionCode::Error => RequestBody::Error(read_error(cur, ctx)?),
        FunctionCode::Explore => {
            let explore_id = cur.be_u32()?;
            let request_id = cur.varuint32()?;
            let children_recursive = cur.u8()?;
            let reserved = cur.u8()?;
            let explore_parents = cur.u8()?;
            let filter_count = cur.u8()?;
            let mut filters = Vec::with_capacity(filter_count as usize);
            for _ in 0..filter_count {
                if ctx.is_halted() {
                    break;
                }
                filters.push(collect_id_value_list(cur, ctx));
            }
            let attribute_ids = if ctx.is_halted() {
                Vec::new()
            } else {
                let attr_count = cur.varuint32()?;
                read_u32_ids(cur, attr_count)?
            };
            RequestBody::Explore(ExploreRequest {
                explore_id,
                request_id,
                children_recursive,
                reserved,
                explore_parents,
                filters,
                attribute_ids,
            })
        }
        FunctionCode::CreateObject => {
            let request_id = cur.be_u32()?;
            let request_value = decode_value_tree(cur, ctx)?;
            let reserved = cur.be_u32()?;
            let objects = decode_object_tree(cur, ctx);
            RequestBody::CreateObject(CreateObjectRequest {
                request_id,
                request_value,
                reserved,
                objects,
            })
        }
        FunctionCode::DeleteObject => RequestBody::DeleteObject {
            object_id: cur.be_u32()?,
        },
        FunctionCode::SetVariable => {
            let object_id = cur.be_u32()?;
            let item_count = cur.varuint32()?;
            let ids = read_u32_ids(cur, item_count)?;
            let mut values = Vec::with_capacity(ids.len());
            for _ in 0..ids.len() {
                values.push(decode_value_tree(cur, ctx)?);
            }
            RequestBody::SetVariable(SetVariableRequest {
                object_id,
                item_count,
                ids,
                values,
            })
        }
        FunctionCode::GetVariable => RequestBody::GetVariable(read_item_ids(cur)?),
        FunctionCode::AddLink | FunctionCode::RemoveLink => {
            let object_id = cur.be_u32()?;
            let items = collect_id_value_list(cur, ctx);
            let link = LinkRequest { object_id, items };
            if function == FunctionCode::AddLink {
                RequestBody::AddLink(link)
            } else {
                RequestBody::RemoveLink(link)
            }
        }
        FunctionCode::GetLink => RequestBody::GetLink {
            object_id: cur.be_u32()?,
            link_id: cur.varuint32()?,
        },
        FunctionCode::SetMultiVariables => {
            RequestBody::SetMultiVariables(read_multi_variables_request(cur, ctx, true)?)
        }
        FunctionCode::GetMultiVariables => {
            RequestBody::GetMultiVariables(read_multi_variables_request(cur, ctx, false)?)
        }
        FunctionCode::BeginSequence => {
            let kind = cur.u8()?;
            RequestBody::BeginSequence(if kind == SEQUENCE_KIND_OBJECT {
                BeginSequenceRequest::Object {
                    object_id: cur.be_u32()?,
                }
            } else {
                BeginSequenceRequest::Value {
                    value: decode_value_tree(cur, ctx)?,
                }
            })
        }
        FunctionCode::EndSequence => RequestBody::EndSequence {
            reserved: cur.be_u16()?,
        },
        FunctionCode::Invoke => {
            let subsession_id = cur.be_u32()?;
            let reserved = cur.u8()?;
            let parameters = collect_id_value_list(cur, ctx);
            let trailing_reserved = if cur.is_empty() || ctx.is_halted() {
                None
            } else {
                Some(cur.u8()?)
            };
            RequestBody::Invoke(InvokeRequest {
                subsession_id,
                reserved,
                parameters,
                trailing_reserved,
            })
        }
        FunctionCode::SetVarSubStreamed => {
            RequestBody::SetVarSubStreamed(SetVarSubStreamedRequest {
                object_id: cur.be_u32()?,
                attribute_id: cur.varuint32()?,
                stream_flags: cur.u8()?,
                value: decode_value_tree(cur, ctx)?,
            })
        }
        FunctionCode::GetVarSubStreamed => RequestBody::GetVarSubStreamed(read_item_ids(cur)?),
        FunctionCode::GetVariablesAddress => RequestBody::GetVariablesAddress {
            object_id: cur.be_u32()?,
            attribute_id: cur.varuint32()?,
        },
        FunctionCode::Abort => RequestBody::Abort {
            object_id: cur.be_u32()?,
        },
    })
}

/// Decode a response body for `function` (Response and Response2 alike).
pub fn decode_response(
    function: FunctionCode,
    cur: &mut Cursor<'_>,
    ctx: &mut DecodeCtx<'_>,
) -> Result<ResponseBody> {
    Ok(match function {
        FunctionCode::Error => ResponseBody::Error(read_error(cur, ctx)?),
        FunctionCode::Explore => {
            let return_value = ReturnValue::decode(cur)?;
            let explore_id = if cur.remaining() >= 4 {
                Some(cur.be_u32()?)
            } else {
                None
            };
            let objects = decode_object_tree(cur, ctx);
            ResponseBody::Explore(ExploreResponse {
                return_value,
                explore_id,
                objects,
            })
        }
        FunctionCode::CreateObject => {
            let return_value = ReturnValue::decode(cur)?;
            let count = cur.u8()?;
            let object_ids = read_u32_ids(cur, u32::from(count))?;
            let objects = decode_object_tree(cur, ctx);
            ResponseBody::CreateObject(CreateObjectResponse {
                return_value,
                object_ids,
                objects,
            })
        }
        FunctionCode::DeleteObject => ResponseBody::DeleteObject(read_object_status(cur, ctx)?),
        FunctionCode::SetVariable => ResponseBody::SetVariable(read_status(cur, ctx)?),
        FunctionCode::GetVariable => ResponseBody::GetVariable(read_value_response(cur, ctx)?),
        FunctionCode::AddLink => ResponseBody::AddLink(read_status(cur, ctx)?),
        FunctionCode::RemoveLink => ResponseBody::RemoveLink(read_status(cur, ctx)?),
        FunctionCode::GetLink => {
            let return_value = ReturnValue::decode(cur)?;
            let link_count = cur.varuint32()?;
            let n = cur.check_count(link_count, 4)?;
            let mut link_ids = Vec::with_capacity(n);
            for _ in 0..n {
                link_ids.push(cur.be_u32()?);
            }
            ResponseBody::GetLink(GetLinkResponse {
                return_value,
                link_ids,
            })
        }
        FunctionCode::SetMultiVariables => {
            let return_value = ReturnValue::decode(cur)?;
            let errors = read_numbered_errors(cur, ctx);
            ResponseBody::SetMultiVariables(MultiVariablesResponse {
                return_value,
                values: Vec::new(),
                errors,
            })
        }
        FunctionCode::GetMultiVariables => {
            let return_value = ReturnValue::decode(cur)?;
            let values = read_numbered_values(cur, ctx);
            let errors = read_numbered_errors(cur, ctx);
            ResponseBody::GetMultiVariables(MultiVariablesResponse {
                return_value,
                values,
                errors,
            })
        }
        FunctionCode::BeginSequence => ResponseBody::BeginSequence(read_object_status(cur, ctx)?),
        FunctionCode::EndSequence => ResponseBody::EndSequence(read_status(cur, ctx)?),
        FunctionCode::Invoke => {
            let mut return_values = vec![ReturnValue::decode(cur)?];
            let results = collect_id_value_list(cur, ctx);
            while return_values.len() < MAX_INVOKE_RETURN_VALUES
                && !cur.is_empty()
                && !ctx.is_halted()
            {
                return_values.push(ReturnValue::decode(cur)?);
            }
            ResponseBody::Invoke(InvokeResponse {
                return_values,
                results,
            })
        }
        FunctionCode::SetVarSubStreamed => ResponseBody::SetVarSubStreamed(read_status(cur, ctx)?),
        FunctionCode::GetVarSubStreamed => {
            ResponseBody::GetVarSubStreamed(read_value_response(cur, ctx)?)
        }
        FunctionCode::GetVariablesAddress => {
            ResponseBody::GetVariablesAddress(read_value_response(cur, ctx)?)
        }
        FunctionCode::Abort => ResponseBody::Abort(read_status(cur, ctx)?),
    })
}

/// Decode `length(varuint32) · chunk` of a streamed continuation segment.
pub fn decode_stream_chunk(cur: &mut Cursor<'_>) -> Result<StreamChunk> {
    let length = cur.varuint32()?;
    let data = cur.take_bytes(length as usize)?;
    Ok(StreamChunk { length, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{address::Access, value::{Payload, Scalar}};
    use crate::types::DecoderConfig;

    fn request(function: FunctionCode, bytes: Vec<u8>) -> (RequestBody, usize) {
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let body = decode_request(function, &mut cur, &mut ctx).unwrap();
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        (body, cur.remaining())
    }

    fn response(function: FunctionCode, bytes: Vec<u8>) -> (ResponseBody, usize) {
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let body = decode_response(function, &mut cur, &mut ctx).unwrap();
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        (body, cur.remaining())
    }

    #[test]
    fn test_get_variable_request() {
        let (body, rest) = request(
            FunctionCode::GetVariable,
            vec![0x00, 0x00, 0x01, 0x2c, 0x01, 0x89, 0x6a],
        );
        assert_eq!(rest, 0);
        assert_eq!(
            body,
            RequestBody::GetVariable(ItemIdsRequest {
                object_id: 300,
                item_count: 1,
                ids: vec![0x04ea],
            })
        );
    }

    #[test]
    fn test_get_variable_response_value() {
        let (body, rest) = response(FunctionCode::GetVariable, vec![0x00, 0x00, 0x02, 0x07]);
        assert_eq!(rest, 0);
        let ResponseBody::GetVariable(resp) = body else {
            panic!("expected GetVariable");
        };
        assert_eq!(resp.return_value.generic_error_name(), "Ok");
        assert_eq!(
            resp.value.map(|v| v.payload),
            Some(Payload::Scalar(Scalar::USInt(7)))
        );
    }

    #[test]
    fn test_set_multi_variables_plain_write() {
        let mut bytes = vec![0, 0, 0, 0, 0x01, 0x08];
        // address: crc 0, DB1, sub 0, depth 4, lids 3, 2, 1, 0
        bytes.extend_from_slice(&[0x00, 0x88, 0xd0, 0xb8, 0x80, 0x01, 0x00, 0x04, 0x03, 0x02, 0x01, 0x00]);
        // item 1 = BOOL true, terminator
        bytes.extend_from_slice(&[0x01, 0x00, 0x01, 0x01, 0x00]);
        let (body, rest) = request(FunctionCode::SetMultiVariables, bytes);
        assert_eq!(rest, 0);
        let RequestBody::SetMultiVariables(req) = body else {
            panic!("expected SetMultiVariables");
        };
        assert_eq!(req.item_count, 1);
        assert_eq!(req.address_field_count, 8);
        let MultiVariablesTarget::Addresses { addresses } = &req.target else {
            panic!("expected addresses");
        };
        assert!(matches!(addresses[0].access, Access::Classic { byte_offset: Some(2), .. }));
        assert_eq!(req.values.len(), 1);
        assert_eq!(req.values[0].item_number, 1);
    }

    #[test]
    fn test_get_multi_variables_object_link() {
        let bytes = vec![0x00, 0x00, 0x00, 0x33, 0x02, 0x02, 0x05, 0x06, 0x00];
        let (body, rest) = request(FunctionCode::GetMultiVariables, bytes);
        // the trailing byte is left for the ObjectQualifier scan
        assert_eq!(rest, 1);
        let RequestBody::GetMultiVariables(req) = body else {
            panic!("expected GetMultiVariables");
        };
        assert_eq!(
            req.target,
            MultiVariablesTarget::ObjectLink {
                object_id: 0x33,
                lids: vec![5, 6]
            }
        );
        assert!(req.values.is_empty());
    }

    #[test]
    fn test_get_multi_variables_response() {
        // rv 0, item 1 = UINT 9, terminator, error item 2 rv 0x13, terminator
        let bytes = vec![0x00, 0x01, 0x00, 0x03, 0x00, 0x09, 0x00, 0x02, 0x13, 0x00];
        let (body, rest) = response(FunctionCode::GetMultiVariables, bytes);
        assert_eq!(rest, 0);
        let ResponseBody::GetMultiVariables(resp) = body else {
            panic!("expected GetMultiVariables");
        };
        assert_eq!(resp.values[0].item_number, 1);
        assert_eq!(resp.errors[0].item_number, 2);
        assert_eq!(resp.errors[0].return_value.error_code, 0x13);
    }

    #[test]
    fn test_error_extension_pulls_object_tree() {
        // rv with bit 62 set needs 9 bytes: high = raw >> 8
        let mut bytes = Vec::new();
        crate::protocol::frame::vlq::encode_varuint64(0x4000_0000_0000_0000, &mut bytes);
        bytes.extend_from_slice(&[0xa1, 0, 0, 0, 1, 0x01, 0x00, 0x00, 0xa2]);
        let (body, rest) = response(FunctionCode::SetVariable, bytes);
        assert_eq!(rest, 0);
        let ResponseBody::SetVariable(status) = body else {
            panic!("expected SetVariable");
        };
        assert!(status.return_value.error_extension);
        assert_eq!(status.objects.len(), 1);
    }

    #[test]
    fn test_invoke_response_chains_return_values() {
        let bytes = vec![0x00, 0x05, 0x00, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00];
        let (body, rest) = response(FunctionCode::Invoke, bytes);
        assert_eq!(rest, 1);
        let ResponseBody::Invoke(resp) = body else {
            panic!("expected Invoke");
        };
        assert_eq!(resp.return_values.len(), 3);
        assert_eq!(resp.results.len(), 1);
    }

    #[test]
    fn test_explore_request() {
        let bytes = vec![
            0x00, 0x00, 0x00, 0x10, 0x01, 0x01, 0x00, 0x00, 0x01, // header fields, one filter
            0x05, 0x00, 0x02, 0x03, 0x00, // filter list {5: USINT 3}
            0x02, 0x81, 0x00, 0x7f, // two attribute ids
        ];
        let (body, rest) = request(FunctionCode::Explore, bytes);
        assert_eq!(rest, 0);
        let RequestBody::Explore(req) = body else {
            panic!("expected Explore");
        };
        assert_eq!(req.explore_id, 0x10);
        assert_eq!(req.filters.len(), 1);
        assert_eq!(req.filters[0][0].id, 5);
        assert_eq!(req.attribute_ids, vec![128, 127]);
    }

    #[test]
    fn test_stream_chunk() {
        let buf = Bytes::from_static(&[0x03, 0xAA, 0xBB, 0xCC, 0xDD]);
        let mut cur = Cursor::new(&buf);
        let chunk = decode_stream_chunk(&mut cur).unwrap();
        assert_eq!(chunk.length, 3);
        assert_eq!(chunk.data.as_ref(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(cur.remaining(), 1);
    }

    const EMPTY_OBJECT: [u8; 9] = [0xa1, 0, 0, 0, 1, 0x01, 0x00, 0x00, 0xa2];

    #[test]
    fn test_explore_request_without_filters() {
        let bytes = vec![0x00, 0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let (body, rest) = request(FunctionCode::Explore, bytes);
        assert_eq!(rest, 0);
        let RequestBody::Explore(req) = body else {
            panic!("expected Explore");
        };
        assert_eq!(req.request_id, 1);
        assert!(req.filters.is_empty());
        assert!(req.attribute_ids.is_empty());
    }

    #[test]
    fn test_explore_request_bad_filter_keeps_earlier_filters() {
        let bytes = vec![
            0x00, 0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x00, 0x02, // two filters
            0x05, 0x00, 0x02, 0x03, 0x00, // {5: USINT 3}
            0x06, 0x00, 0x18, 0x00, // {6: datatype 0x18}
            0x01, 0x07, // attribute ids, not read
        ];
        let cfg = DecoderConfig::default();
        let mut ctx = DecodeCtx::new(&cfg);
        let buf = Bytes::from(bytes);
        let mut cur = Cursor::new(&buf);
        let RequestBody::Explore(req) = decode_request(FunctionCode::Explore, &mut cur, &mut ctx).unwrap()
        else {
            panic!("expected Explore");
        };
        assert_eq!(req.filters.len(), 2);
        assert_eq!(req.filters[0][0].id, 5);
        assert!(req.filters[1].is_empty());
        assert!(req.attribute_ids.is_empty());
        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(ctx.take_halt(), Some(14));
    }

    #[test]
    fn test_create_object_request() {
        let mut bytes = vec![0x00, 0x00, 0x01, 0x20, 0x00, 0x04, 0x81, 0x00, 0x00, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&EMPTY_OBJECT);
        let (body, rest) = request(FunctionCode::CreateObject, bytes);
        assert_eq!(rest, 0);
        let RequestBody::CreateObject(req) = body else {
            panic!("expected CreateObject");
        };
        assert_eq!(req.request_id, 0x120);
        assert_eq!(req.request_value.payload, Payload::Scalar(Scalar::UDInt(128)));
        assert_eq!(req.reserved, 0);
        assert_eq!(req.objects.len(), 1);
    }

    #[test]
    fn test_create_object_response() {
        let (body, rest) = response(FunctionCode::CreateObject, vec![0x00, 0x01, 0x81, 0x00]);
        assert_eq!(rest, 0);
        let ResponseBody::CreateObject(resp) = body else {
            panic!("expected CreateObject");
        };
        assert_eq!(resp.object_ids, vec![128]);
        assert!(resp.objects.is_empty());
    }

    #[test]
    fn test_create_object_response_without_ids() {
        let mut bytes = vec![0x00, 0x00];
        bytes.extend_from_slice(&EMPTY_OBJECT);
        let (body, rest) = response(FunctionCode::CreateObject, bytes);
        assert_eq!(rest, 0);
        let ResponseBody::CreateObject(resp) = body else {
            panic!("expected CreateObject");
        };
        assert!(resp.object_ids.is_empty());
        assert_eq!(resp.objects.len(), 1);
    }

    #[test]
    fn test_delete_object() {
        let (body, rest) = request(FunctionCode::DeleteObject, vec![0x00, 0x00, 0x01, 0x2c]);
        assert_eq!(rest, 0);
        assert_eq!(body, RequestBody::DeleteObject { object_id: 300 });

        let (body, _) = response(FunctionCode::DeleteObject, vec![0x00, 0x00, 0x00, 0x01, 0x2c]);
        let ResponseBody::DeleteObject(resp) = body else {
            panic!("expected DeleteObject");
        };
        assert_eq!(resp.object_id, Some(300));

        // no room for an object id
        let (body, _) = response(FunctionCode::DeleteObject, vec![0x00]);
        assert!(matches!(body, ResponseBody::DeleteObject(ObjectStatusResponse { object_id: None, .. })));
    }

    #[test]
    fn test_begin_sequence_object_kind() {
        let (body, rest) = request(FunctionCode::BeginSequence, vec![0x01, 0x00, 0x00, 0x00, 0x34]);
        assert_eq!(rest, 0);
        assert_eq!(
            body,
            RequestBody::BeginSequence(BeginSequenceRequest::Object { object_id: 0x34 })
        );
    }

    #[test]
    fn test_begin_sequence_value_kind() {
        let (body, rest) = request(FunctionCode::BeginSequence, vec![0x02, 0x00, 0x02, 0x07]);
        assert_eq!(rest, 0);
        let RequestBody::BeginSequence(BeginSequenceRequest::Value { value }) = body else {
            panic!("expected value kind");
        };
        assert_eq!(value.payload, Payload::Scalar(Scalar::USInt(7)));

        let (body, _) = response(FunctionCode::BeginSequence, vec![0x00, 0x00, 0x00, 0x00, 0x07]);
        assert!(matches!(body, ResponseBody::BeginSequence(ObjectStatusResponse { object_id: Some(7), .. })));
    }

    #[test]
    fn test_end_sequence() {
        let (body, rest) = request(FunctionCode::EndSequence, vec![0x00, 0x00]);
        assert_eq!(rest, 0);
        assert_eq!(body, RequestBody::EndSequence { reserved: 0 });

        let (body, rest) = response(FunctionCode::EndSequence, vec![0x00]);
        assert_eq!(rest, 0);
        let ResponseBody::EndSequence(status) = body else {
            panic!("expected EndSequence");
        };
        assert_eq!(status.return_value.generic_error_name(), "Ok");
        assert!(status.objects.is_empty());
    }

    #[test]
    fn test_invoke_request() {
        let bytes = vec![0x00, 0x00, 0x00, 0x0a, 0x00, 0x05, 0x00, 0x02, 0x01, 0x00, 0x00];
        let (body, rest) = request(FunctionCode::Invoke, bytes);
        assert_eq!(rest, 0);
        let RequestBody::Invoke(req) = body else {
            panic!("expected Invoke");
        };
        assert_eq!(req.subsession_id, 10);
        assert_eq!(req.parameters.len(), 1);
        assert_eq!(req.parameters[0].id, 5);
        assert_eq!(req.trailing_reserved, Some(0));
    }

    #[test]
    fn test_get_link() {
        let (body, rest) = request(FunctionCode::GetLink, vec![0x00, 0x00, 0x00, 0x33, 0x81, 0x00]);
        assert_eq!(rest, 0);
        assert_eq!(
            body,
            RequestBody::GetLink {
                object_id: 0x33,
                link_id: 128
            }
        );

        let bytes = vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02];
        let (body, rest) = response(FunctionCode::GetLink, bytes);
        assert_eq!(rest, 0);
        let ResponseBody::GetLink(resp) = body else {
            panic!("expected GetLink");
        };
        assert_eq!(resp.link_ids, vec![1, 2]);
    }

    #[test]
    fn test_get_variables_address() {
        let (body, rest) = request(
            FunctionCode::GetVariablesAddress,
            vec![0x00, 0x00, 0x00, 0x33, 0x81, 0x00],
        );
        assert_eq!(rest, 0);
        assert_eq!(
            body,
            RequestBody::GetVariablesAddress {
                object_id: 0x33,
                attribute_id: 128
            }
        );

        let bytes = vec![0x00, 0x00, 0x12, 0x00, 0x00, 0x00, 0x05];
        let (body, rest) = response(FunctionCode::GetVariablesAddress, bytes);
        assert_eq!(rest, 0);
        let ResponseBody::GetVariablesAddress(resp) = body else {
            panic!("expected GetVariablesAddress");
        };
        assert_eq!(resp.value.map(|v| v.payload), Some(Payload::Scalar(Scalar::Rid(5))));
    }

    #[test]
    fn test_abort() {
        let (body, rest) = request(FunctionCode::Abort, vec![0x00, 0x00, 0x00, 0x40]);
        assert_eq!(rest, 0);
        assert_eq!(body, RequestBody::Abort { object_id: 0x40 });

        let (body, rest) = response(FunctionCode::Abort, vec![0x00]);
        assert_eq!(rest, 0);
        assert!(matches!(body, ResponseBody::Abort(_)));
    }

    #[test]
    fn test_error_body() {
        let mut bytes = Vec::new();
        crate::protocol::frame::vlq::encode_varuint64(0x4000_1300_0000_0011, &mut bytes);
        bytes.extend_from_slice(&EMPTY_OBJECT);
        let (body, rest) = response(FunctionCode::Error, bytes.clone());
        assert_eq!(rest, 0);
        let ResponseBody::Error(err) = body else {
            panic!("expected Error");
        };
        assert_eq!(err.return_value.generic_error_name(), "InvalidAddress");
        assert_eq!(err.return_value.error_code, 0x11);
        assert_eq!(err.objects.len(), 1);

        let (body, rest) = request(FunctionCode::Error, bytes);
        assert_eq!(rest, 0);
        assert!(matches!(body, RequestBody::Error(ErrorBody { ref objects, .. }) if objects.len() == 1));
    }
}
