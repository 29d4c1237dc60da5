pub mod address;
pub mod blob;
pub mod context;
pub mod cotp;
pub mod dictionaries;
pub mod function;
pub mod header;
pub mod notification;
pub mod object;
pub mod registry;
pub mod retval;
pub mod telegram;
pub mod tpkt;
pub mod types;
pub mod value;
pub mod vlq;

pub use crate::protocol::wire::{WireDecode, WireEncode};

pub use address::{decode_item_address, Access, AddressVariant, BaseArea, ItemAddress, NativeArea};
pub use context::DecodeCtx;
pub use cotp::{Cotp, CotpDataParams, CotpType};
pub use function::{RequestBody, ResponseBody, StreamChunk};
pub use header::{Header, IntegrityBlock, Trailer};
pub use notification::{Notification, NotificationItem};
pub use object::{decode_object_tree, Element, Object};
pub use registry::Extended;
pub use retval::ReturnValue;
pub use telegram::{
    decode_segment, Body, Content, DataPart, FragmentInfo, FunctionHeader, OpaqueRegion,
    Telegram,
};
pub use tpkt::Tpkt;
pub use types::{Datatype, DatatypeFlags, ElementId, FunctionCode, Opcode, ProtocolVersion};
pub use value::{decode_value_tree, IdValue, ItemValue, Payload, Scalar};
