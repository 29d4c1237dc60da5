use super::super::error::{Diagnostic, Error, Result};
use crate::{protocol::wire::Cursor, types::DecoderConfig};

/// Per-decode state threaded through every nested decoder
#[derive(Debug)]
pub struct DecodeCtx<'c> {
    pub config: &'c DecoderConfig,
    pub diagnostics: Vec<Diagnostic>,
    depth: usize,
    /// Start of the list entry a body stopped at
    halted_at: Option<usize>,
}

impl<'c> DecodeCtx<'c> {
    pub fn new(config: &'c DecoderConfig) -> Self {
        Self {
            config,
            diagnostics: Vec::new(),
            depth: 0,
            halted_at: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run `f` one nesting level deeper, failing once `max_depth` is exceeded.
    pub fn nested<T>(&mut self, offset: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.config.max_depth {
            return Err(Error::NestingTooDeep {
                offset,
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Record a failure decoding continued past.
    pub fn record(&mut self, error: Error) {
        tracing::warn!(offset = ?error.offset(), error = %error, "S7COMM-PLUS decode diagnostic");
        self.diagnostics.push(Diagnostic::from(error));
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Read list entries until `entry` yields `None`.
    ///
    /// A failing entry is recorded and ends the list with the entries read before it. The
    /// cursor is rewound to the start of that entry and the context halts: later lists come
    /// back empty and bodies stop reading fields, leaving the rest for the opaque region.
    pub fn collect_entries<'a, T>(
        &mut self,
        cur: &mut Cursor<'a>,
        mut entry: impl FnMut(&mut Cursor<'a>, &mut Self) -> Result<Option<T>>,
    ) -> Vec<T> {
        let mut out = Vec::new();
        while !self.is_halted() {
            let start = cur.position();
            match entry(cur, self) {
                Ok(Some(item)) => out.push(item),
                Ok(None) => break,
                Err(e) => {
                    self.record(e);
                    cur.seek(start);
                    self.halted_at = Some(start);
                }
            }
        }
        out
    }

    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Clear the halt, returning where decoding stopped.
    pub fn take_halt(&mut self) -> Option<usize> {
        self.halted_at.take()
    }
}
