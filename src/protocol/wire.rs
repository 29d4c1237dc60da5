use super::{
    error::{Error, Result},
    frame::vlq,
};
use bytes::{BufMut, Bytes};
use nom::{
    error::Error as NomError,
    number::{complete as num, Endianness},
    IResult,
};
use serde::Serialize;
use std::result::Result as StdResult;

/// Unified wire encoding trait across layers
pub trait WireEncode {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    fn encoded_len(&self, ctx: &Self::Context) -> usize;
    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> StdResult<(), Self::Error>;
}

/// Unified zero-copy wire decoding trait across layers
pub trait WireDecode: Sized {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    /// Parse from `input`, returning the remaining slice and the parsed value.
    /// `parent` is used to permit zero-copy `Bytes::slice_ref` construction.
    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> StdResult<(&'a [u8], Self), Self::Error>;
}

/// Half-open byte range `[start, end)` of a decoded element inside its buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded reader over a shared buffer.
///
/// Positions are absolute offsets into the parent `Bytes`, so every error and span
/// reported while decoding nested regions still points into the enclosing data part.
/// A cursor may be narrowed to a window with [`Cursor::window`]; reads never cross `end`.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a Bytes) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    /// Cursor over `[start, end)` of `buf`.
    pub fn with_range(buf: &'a Bytes, start: usize, end: usize) -> Self {
        let end = end.min(buf.len());
        Self {
            buf,
            pos: start.min(end),
            end,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    /// Unread bytes of the current window
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..self.end]
    }

    pub fn parent(&self) -> &'a Bytes {
        self.buf
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.rest().first().copied()
    }

    /// Narrow to the next `len` bytes and advance past them.
    pub fn window(&mut self, len: usize) -> Result<Cursor<'a>> {
        self.ensure(len)?;
        let sub = Cursor {
            buf: self.buf,
            pos: self.pos,
            end: self.pos + len,
        };
        self.pos += len;
        Ok(sub)
    }

    /// Shrink the readable end, leaving the tail for a later pass.
    pub fn truncate_end(&mut self, end: usize) {
        self.end = end.clamp(self.pos, self.end);
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.end);
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(Error::TruncatedInput {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn run<T, P>(&mut self, needed: usize, parser: P) -> Result<T>
    where
        P: FnOnce(&'a [u8]) -> IResult<&'a [u8], T, NomError<&'a [u8]>>,
    {
        match parser(self.rest()) {
            Ok((rest, value)) => {
                self.pos = self.end - rest.len();
                Ok(value)
            }
            Err(_) => Err(Error::TruncatedInput {
                offset: self.pos,
                needed,
                available: self.remaining(),
            }),
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.run(1, num::u8)
    }

    pub fn i8(&mut self) -> Result<i8> {
        self.run(1, num::i8)
    }

    pub fn u16(&mut self, endian: Endianness) -> Result<u16> {
        self.run(2, num::u16(endian))
    }

    pub fn i16(&mut self, endian: Endianness) -> Result<i16> {
        self.run(2, num::i16(endian))
    }

    pub fn u32(&mut self, endian: Endianness) -> Result<u32> {
        self.run(4, num::u32(endian))
    }

    pub fn i32(&mut self, endian: Endianness) -> Result<i32> {
        self.run(4, num::i32(endian))
    }

    pub fn u64(&mut self, endian: Endianness) -> Result<u64> {
        self.run(8, num::u64(endian))
    }

    pub fn f32(&mut self, endian: Endianness) -> Result<f32> {
        self.run(4, num::f32(endian))
    }

    pub fn f64(&mut self, endian: Endianness) -> Result<f64> {
        self.run(8, num::f64(endian))
    }

    #[inline]
    pub fn be_u16(&mut self) -> Result<u16> {
        self.u16(Endianness::Big)
    }

    #[inline]
    pub fn be_u32(&mut self) -> Result<u32> {
        self.u32(Endianness::Big)
    }

    #[inline]
    pub fn be_u64(&mut self) -> Result<u64> {
        self.u64(Endianness::Big)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Zero-copy variant of [`Cursor::take`]
    pub fn take_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn varuint32(&mut self) -> Result<u32> {
        let (v, n) = vlq::decode_varuint32(self.rest()).map_err(|e| e.rebase(self.pos))?;
        self.pos += n;
        Ok(v)
    }

    pub fn varint32(&mut self) -> Result<i32> {
        let (v, n) = vlq::decode_varint32(self.rest()).map_err(|e| e.rebase(self.pos))?;
        self.pos += n;
        Ok(v)
    }

    pub fn varuint64(&mut self) -> Result<u64> {
        let (v, n) = vlq::decode_varuint64(self.rest()).map_err(|e| e.rebase(self.pos))?;
        self.pos += n;
        Ok(v)
    }

    pub fn varint64(&mut self) -> Result<i64> {
        let (v, n) = vlq::decode_varint64(self.rest()).map_err(|e| e.rebase(self.pos))?;
        self.pos += n;
        Ok(v)
    }

    /// Reject element counts that cannot possibly fit in the unread bytes.
    pub fn check_count(&self, count: u32, min_element_len: usize) -> Result<usize> {
        let count = count as usize;
        let needed = count.saturating_mul(min_element_len.max(1));
        if needed > self.remaining() {
            return Err(Error::TruncatedInput {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_endian_reads() {
        let buf = Bytes::from_static(&[0x12, 0x34, 0x78, 0x56, 0x34, 0x12, 0x01]);
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.be_u16().unwrap(), 0x1234);
        assert_eq!(cur.u32(Endianness::Little).unwrap(), 0x1234_5678);
        assert_eq!(cur.remaining(), 1);
        let err = cur.be_u16().unwrap_err();
        assert_eq!(
            err,
            Error::TruncatedInput {
                offset: 6,
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_window_keeps_absolute_offsets() {
        let buf = Bytes::from_static(&[0xAA, 0x01, 0x02, 0x03, 0xBB]);
        let mut cur = Cursor::new(&buf);
        cur.skip(1).unwrap();
        let mut win = cur.window(2).unwrap();
        assert_eq!(win.position(), 1);
        assert_eq!(win.take(2).unwrap(), &[0x01, 0x02]);
        assert!(win.u8().is_err());
        assert_eq!(cur.position(), 3);
        assert_eq!(cur.take_bytes(2).unwrap().as_ref(), &[0x03, 0xBB]);
    }

    #[test]
    fn test_check_count_bounds_by_remaining() {
        let buf = Bytes::from_static(&[0; 4]);
        let cur = Cursor::new(&buf);
        assert_eq!(cur.check_count(4, 1).unwrap(), 4);
        assert!(cur.check_count(3, 2).is_err());
        assert!(cur.check_count(u32::MAX, 0).is_err());
    }

    #[test]
    fn test_unterminated_varint_reports_its_start() {
        let buf = Bytes::from_static(&[0x01, 0x02, 0x81, 0x82]);
        let mut cur = Cursor::new(&buf);
        cur.skip(2).unwrap();
        assert_eq!(cur.varuint32().unwrap_err(), Error::MalformedVarint { offset: 2 });
        assert_eq!(cur.position(), 2);
    }
}
