use super::super::frame::{FunctionCode, Opcode, ProtocolVersion};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::net::SocketAddr;

/// Fragment state of one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FragmentState {
    /// Nothing seen yet
    #[default]
    New,
    /// Last segment was a complete telegram
    NoFrag,
    /// A segment without trailer opened a group
    First,
    /// Further segments without trailer
    Inner,
    /// A segment with trailer closed the group
    Last,
}

impl FragmentState {
    pub fn in_group(self) -> bool {
        matches!(self, FragmentState::First | FragmentState::Inner)
    }
}

/// Directional endpoint pair identifying a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl ConnectionKey {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    /// The same connection seen from the other side
    pub fn reversed(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Client to PLC
    ToServer,
    /// PLC to client
    ToClient,
}

/// One transport segment handed to the dissector
#[derive(Debug, Clone)]
pub struct Segment {
    pub key: ConnectionKey,
    /// Arrival order; must increase per key
    pub frame_id: u64,
    pub direction: Direction,
    pub bytes: Bytes,
}

/// Reassembly state of one conversation key.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub state: FragmentState,
    pub start_frame_id: u64,
    pub start_opcode: Option<Opcode>,
    pub start_function: Option<FunctionCode>,
    pub version: Option<ProtocolVersion>,
    pub last_frame_id: Option<u64>,
    /// Group is a SetVarSubStreamed request whose segments are decoded one by one
    pub streaming: bool,
    pub(crate) segments: usize,
    pub(crate) buffer: BytesMut,
}

impl ConversationState {
    pub(crate) fn open(
        &mut self,
        frame_id: u64,
        version: ProtocolVersion,
        start: Option<(Opcode, Option<FunctionCode>)>,
    ) {
        self.state = FragmentState::First;
        self.start_frame_id = frame_id;
        self.start_opcode = start.map(|(op, _)| op);
        self.start_function = start.and_then(|(_, f)| f);
        self.version = Some(version);
        self.streaming = self.start_opcode == Some(Opcode::Request)
            && self.start_function == Some(FunctionCode::SetVarSubStreamed);
        self.segments = 1;
        self.buffer.clear();
    }

    /// Drop any buffered group and return to NOFRAG.
    pub(crate) fn close(&mut self) {
        self.state = FragmentState::NoFrag;
        self.start_opcode = None;
        self.start_function = None;
        self.version = None;
        self.streaming = false;
        self.segments = 0;
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
