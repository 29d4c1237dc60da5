use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Protocol identifier, first byte of every header and trailer
pub const PROTOCOL_ID: u8 = 0x72;

/// Attribute id introducing the ObjectQualifier list, as a 16-bit marker on the wire
pub const OBJECT_QUALIFIER_MARKER: u16 = 0x04e8;
/// Attribute id of the global symbolics blob; stored without a version prefix
pub const GLOBAL_SYMBOLICS_ID: u32 = 4275;

/// Length of an integrity digest
pub const DIGEST_LEN: u8 = 32;

/// S7COMM-PLUS protocol version byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
pub enum ProtocolVersion {
    V1 = 0x01,
    V2 = 0x02,
    V3 = 0x03,
    /// Extended keepalive / system event
    SystemEvent = 0xFE,
    Keepalive = 0xFF,
}

impl ProtocolVersion {
    pub fn is_keepalive(self) -> bool {
        matches!(self, ProtocolVersion::Keepalive | ProtocolVersion::SystemEvent)
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x01 => Ok(ProtocolVersion::V1),
            0x02 => Ok(ProtocolVersion::V2),
            0x03 => Ok(ProtocolVersion::V3),
            0xFE => Ok(ProtocolVersion::SystemEvent),
            0xFF => Ok(ProtocolVersion::Keepalive),
            _ => Err(()),
        }
    }
}

/// Data part opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    Request = 0x31,
    Response = 0x32,
    Notification = 0x33,
    /// 1500-HMI flavour of Response
    Response2 = 0x02,
}

impl Opcode {
    /// Response2 is decoded with the response decoders.
    pub fn is_response(self) -> bool {
        matches!(self, Opcode::Response | Opcode::Response2)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x31 => Ok(Opcode::Request),
            0x32 => Ok(Opcode::Response),
            0x33 => Ok(Opcode::Notification),
            0x02 => Ok(Opcode::Response2),
            _ => Err(()),
        }
    }
}

/// Function codes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FunctionCode {
    Error = 0x04b1,
    Explore = 0x04bb,
    CreateObject = 0x04ca,
    DeleteObject = 0x04d4,
    SetVariable = 0x04f2,
    GetVariable = 0x04fc,
    AddLink = 0x0506,
    RemoveLink = 0x051a,
    GetLink = 0x0524,
    SetMultiVariables = 0x0542,
    GetMultiVariables = 0x054c,
    BeginSequence = 0x0556,
    EndSequence = 0x0560,
    Invoke = 0x056b,
    SetVarSubStreamed = 0x057c,
    GetVarSubStreamed = 0x0586,
    GetVariablesAddress = 0x0590,
    Abort = 0x059a,
}

impl FunctionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionCode::Error => "Error",
            FunctionCode::Explore => "Explore",
            FunctionCode::CreateObject => "CreateObject",
            FunctionCode::DeleteObject => "DeleteObject",
            FunctionCode::SetVariable => "SetVariable",
            FunctionCode::GetVariable => "GetVariable",
            FunctionCode::AddLink => "AddLink",
            FunctionCode::RemoveLink => "RemoveLink",
            FunctionCode::GetLink => "GetLink",
            FunctionCode::SetMultiVariables => "SetMultiVariables",
            FunctionCode::GetMultiVariables => "GetMultiVariables",
            FunctionCode::BeginSequence => "BeginSequence",
            FunctionCode::EndSequence => "EndSequence",
            FunctionCode::Invoke => "Invoke",
            FunctionCode::SetVarSubStreamed => "SetVarSubStreamed",
            FunctionCode::GetVarSubStreamed => "GetVarSubStreamed",
            FunctionCode::GetVariablesAddress => "GetVariablesAddress",
            FunctionCode::Abort => "Abort",
        }
    }

    /// Operations whose request bodies may be followed by an ObjectQualifier list.
    pub fn carries_object_qualifier(self) -> bool {
        matches!(
            self,
            FunctionCode::SetVariable
                | FunctionCode::GetVariable
                | FunctionCode::SetMultiVariables
                | FunctionCode::GetMultiVariables
                | FunctionCode::SetVarSubStreamed
                | FunctionCode::GetVarSubStreamed
                | FunctionCode::GetLink
        )
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u16> for FunctionCode {
    type Error = ();

    fn try_from(v: u16) -> std::result::Result<Self, ()> {
        match v {
            0x04b1 => Ok(FunctionCode::Error),
            0x04bb => Ok(FunctionCode::Explore),
            0x04ca => Ok(FunctionCode::CreateObject),
            0x04d4 => Ok(FunctionCode::DeleteObject),
            0x04f2 => Ok(FunctionCode::SetVariable),
            0x04fc => Ok(FunctionCode::GetVariable),
            0x0506 => Ok(FunctionCode::AddLink),
            0x051a => Ok(FunctionCode::RemoveLink),
            0x0524 => Ok(FunctionCode::GetLink),
            0x0542 => Ok(FunctionCode::SetMultiVariables),
            0x054c => Ok(FunctionCode::GetMultiVariables),
            0x0556 => Ok(FunctionCode::BeginSequence),
            0x0560 => Ok(FunctionCode::EndSequence),
            0x056b => Ok(FunctionCode::Invoke),
            0x057c => Ok(FunctionCode::SetVarSubStreamed),
            0x0586 => Ok(FunctionCode::GetVarSubStreamed),
            0x0590 => Ok(FunctionCode::GetVariablesAddress),
            0x059a => Ok(FunctionCode::Abort),
            _ => Err(()),
        }
    }
}

/// Value datatype tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Datatype {
    Null = 0x00,
    Bool = 0x01,
    USInt = 0x02,
    UInt = 0x03,
    UDInt = 0x04,
    ULInt = 0x05,
    SInt = 0x06,
    Int = 0x07,
    DInt = 0x08,
    LInt = 0x09,
    Byte = 0x0a,
    Word = 0x0b,
    DWord = 0x0c,
    LWord = 0x0d,
    Real = 0x0e,
    LReal = 0x0f,
    Timestamp = 0x10,
    Timespan = 0x11,
    Rid = 0x12,
    Aid = 0x13,
    Blob = 0x14,
    WString = 0x15,
    Variant = 0x16,
    Struct = 0x17,
    S7String = 0x19,
}

impl TryFrom<u8> for Datatype {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match v {
            0x00 => Datatype::Null,
            0x01 => Datatype::Bool,
            0x02 => Datatype::USInt,
            0x03 => Datatype::UInt,
            0x04 => Datatype::UDInt,
            0x05 => Datatype::ULInt,
            0x06 => Datatype::SInt,
            0x07 => Datatype::Int,
            0x08 => Datatype::DInt,
            0x09 => Datatype::LInt,
            0x0a => Datatype::Byte,
            0x0b => Datatype::Word,
            0x0c => Datatype::DWord,
            0x0d => Datatype::LWord,
            0x0e => Datatype::Real,
            0x0f => Datatype::LReal,
            0x10 => Datatype::Timestamp,
            0x11 => Datatype::Timespan,
            0x12 => Datatype::Rid,
            0x13 => Datatype::Aid,
            0x14 => Datatype::Blob,
            0x15 => Datatype::WString,
            0x16 => Datatype::Variant,
            0x17 => Datatype::Struct,
            0x19 => Datatype::S7String,
            _ => return Err(()),
        })
    }
}

/// Flags byte preceding a value's datatype
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DatatypeFlags(pub u8);

impl DatatypeFlags {
    pub const ARRAY: u8 = 0x10;
    pub const ADDRESS_ARRAY: u8 = 0x20;
    pub const SPARSE_ARRAY: u8 = 0x40;

    #[inline]
    pub fn is_array(self) -> bool {
        self.0 & Self::ARRAY != 0
    }

    #[inline]
    pub fn is_address_array(self) -> bool {
        self.0 & Self::ADDRESS_ARRAY != 0
    }

    #[inline]
    pub fn is_sparse_array(self) -> bool {
        self.0 & Self::SPARSE_ARRAY != 0
    }
}

/// Object tree element tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr)]
pub enum ElementId {
    StartObject = 0xa1,
    TermObject = 0xa2,
    Attribute = 0xa3,
    Relation = 0xa4,
    StartTagDescription = 0xa7,
    TermTagDescription = 0xa8,
    VarTypeList = 0xab,
    VarNameList = 0xac,
}

impl TryFrom<u8> for ElementId {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0xa1 => Ok(ElementId::StartObject),
            0xa2 => Ok(ElementId::TermObject),
            0xa3 => Ok(ElementId::Attribute),
            0xa4 => Ok(ElementId::Relation),
            0xa7 => Ok(ElementId::StartTagDescription),
            0xa8 => Ok(ElementId::TermTagDescription),
            0xab => Ok(ElementId::VarTypeList),
            0xac => Ok(ElementId::VarNameList),
            _ => Err(()),
        }
    }
}
