mod state;
pub use state::{ConnectionKey, ConversationState, Direction, FragmentState, Segment};

use super::{
    error::{Diagnostic, Error, Result},
    frame::{
        telegram::{decode_complete, decode_content, decode_stream_part, peek_function, split_segment},
        Content, DecodeCtx, FragmentInfo, Telegram,
    },
};
use crate::types::DecoderConfig;
use std::collections::HashMap;

/// Reassembly state for every conversation seen so far, owned by the caller.
#[derive(Debug, Default)]
pub struct Conversations {
    slots: HashMap<ConnectionKey, ConversationState>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&ConversationState> {
        self.slots.get(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop the slot of one connection once it has closed; any partial group is discarded.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<ConversationState> {
        let removed = self.slots.remove(key);
        if let Some(conv) = &removed {
            tracing::debug!(
                ?key,
                state = ?conv.state,
                buffered = conv.buffered(),
                "Dropping S7COMM-PLUS conversation"
            );
        }
        removed
    }

    /// Forget all conversations, e.g. before dissecting a capture again.
    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

/// Decode one segment, reassembling fragments per conversation.
///
/// Fails when the header cannot be parsed or the segment arrives out of order for its
/// key; a dropped segment leaves the conversation untouched.
pub fn dissect_segment(
    conversations: &mut Conversations,
    segment: &Segment,
    config: &DecoderConfig,
) -> Result<Telegram> {
    let parts = split_segment(&segment.bytes)?;
    if parts.header.version.is_keepalive() || !config.reassemble {
        return Ok(decode_complete(parts, segment.frame_id, config));
    }

    let conv = conversations.slots.entry(segment.key).or_default();
    if conv.last_frame_id.is_some_and(|last| segment.frame_id <= last) {
        tracing::warn!(
            frame_id = segment.frame_id,
            last = ?conv.last_frame_id,
            "Dropping out-of-order S7COMM-PLUS segment"
        );
        return Err(Error::ReassemblyConflict {
            frame_id: segment.frame_id,
            context: "frame id does not increase",
        });
    }
    conv.last_frame_id = Some(segment.frame_id);

    let version = parts.header.version;
    let has_trailer = parts.trailer.is_some();
    let mut conflict = None;
    if conv.state.in_group() && conv.version != Some(version) {
        tracing::warn!(
            frame_id = segment.frame_id,
            start_frame_id = conv.start_frame_id,
            "Protocol version changed inside a fragment group, discarding the group"
        );
        conflict = Some(Diagnostic::from(Error::ReassemblyConflict {
            frame_id: segment.frame_id,
            context: "protocol version differs from fragment group",
        }));
        conv.close();
    }

    let from = conv.state;
    let mut telegram = if !conv.state.in_group() {
        if has_trailer {
            conv.state = FragmentState::NoFrag;
            decode_complete(parts, segment.frame_id, config)
        } else {
            conv.open(segment.frame_id, version, peek_function(&parts.data));
            if conv.streaming {
                // The first streamed segment is a complete request on its own
                decode_complete(parts, segment.frame_id, config)
            } else {
                let (mut telegram, data) = Telegram::from_parts(segment.frame_id, parts);
                conv.buffer.extend_from_slice(&data);
                telegram.content = Content::Fragment(fragment_info(conv));
                telegram
            }
        }
    } else {
        conv.segments += 1;
        conv.state = if has_trailer {
            FragmentState::Last
        } else {
            FragmentState::Inner
        };
        let (mut telegram, data) = Telegram::from_parts(segment.frame_id, parts);
        let mut ctx = DecodeCtx::new(config);
        if conv.streaming {
            telegram.content = decode_stream_part(&data, &mut ctx, &mut telegram.opaque);
        } else {
            conv.buffer.extend_from_slice(&data);
            let info = fragment_info(conv);
            if has_trailer {
                let joined = conv.buffer.split().freeze();
                telegram.content = decode_content(joined, version, &mut ctx, &mut telegram.opaque);
                telegram.reassembled = Some(info);
            } else {
                telegram.content = Content::Fragment(info);
            }
        }
        telegram.diagnostics.extend(ctx.take_diagnostics());
        if has_trailer {
            conv.close();
        }
        telegram
    };

    tracing::debug!(
        frame_id = segment.frame_id,
        direction = ?segment.direction,
        ?from,
        to = ?conv.state,
        "S7COMM-PLUS fragment state"
    );
    if let Some(diagnostic) = conflict {
        telegram.diagnostics.insert(0, diagnostic);
    }
    Ok(telegram)
}

fn fragment_info(conv: &ConversationState) -> FragmentInfo {
    FragmentInfo {
        start_frame_id: conv.start_frame_id,
        segments: conv.segments,
        buffered: conv.buffered(),
    }
}

/// Dissector owning its configuration and conversations
#[derive(Debug, Default)]
pub struct Dissector {
    config: DecoderConfig,
    conversations: Conversations,
}

impl Dissector {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            conversations: Conversations::new(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn conversations(&self) -> &Conversations {
        &self.conversations
    }

    pub fn dissect(&mut self, segment: &Segment) -> Result<Telegram> {
        dissect_segment(&mut self.conversations, segment, &self.config)
    }

    /// Release the reassembly slot of a closed connection.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<ConversationState> {
        self.conversations.remove(key)
    }

    /// Clear reassembly state so the same segments can be dissected again.
    pub fn reset(&mut self) {
        self.conversations.reset();
    }
}
