//! Variable-length quantities.
//!
//! Seven value bits per byte, most significant group first, bit 7 set on every byte
//! except the last. Signed forms carry the sign in bit 6 of the first byte. The 64-bit
//! forms switch to a full 8-bit group on the ninth byte.

use super::super::error::{Error, Result};
use bytes::BufMut;

/// Longest encoding of a 32-bit value
pub const MAX_LEN_32: usize = 5;
/// Longest encoding of a 64-bit value
pub const MAX_LEN_64: usize = 9;

const CONT: u8 = 0x80;
const SIGN: u8 = 0x40;

/// Decode an unsigned 32-bit VLQ, returning `(value, consumed)`.
pub fn decode_varuint32(input: &[u8]) -> Result<(u32, usize)> {
    let mut val: u32 = 0;
    for (i, &octet) in input.iter().take(MAX_LEN_32).enumerate() {
        val = (val << 7) | u32::from(octet & 0x7f);
        if octet & CONT == 0 {
            return Ok((val, i + 1));
        }
    }
    // Out of input or out of groups before the terminating byte
    Err(Error::MalformedVarint { offset: 0 })
}

/// Decode a signed 32-bit VLQ, returning `(value, consumed)`.
pub fn decode_varint32(input: &[u8]) -> Result<(i32, usize)> {
    let mut val: u32 = 0;
    for (i, &octet) in input.iter().take(MAX_LEN_32).enumerate() {
        let mut bits = octet;
        if i == 0 && octet & SIGN != 0 {
            bits &= !SIGN;
            val = 0xffff_ffc0;
        } else {
            val <<= 7;
        }
        val |= u32::from(bits & 0x7f);
        if octet & CONT == 0 {
            return Ok((val as i32, i + 1));
        }
    }
    Err(Error::MalformedVarint { offset: 0 })
}

/// Decode an unsigned 64-bit VLQ, returning `(value, consumed)`.
pub fn decode_varuint64(input: &[u8]) -> Result<(u64, usize)> {
    let mut val: u64 = 0;
    for (i, &octet) in input.iter().take(MAX_LEN_64).enumerate() {
        if i == MAX_LEN_64 - 1 {
            return Ok(((val << 8) | u64::from(octet), MAX_LEN_64));
        }
        val = (val << 7) | u64::from(octet & 0x7f);
        if octet & CONT == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(Error::MalformedVarint { offset: 0 })
}

/// Decode a signed 64-bit VLQ, returning `(value, consumed)`.
pub fn decode_varint64(input: &[u8]) -> Result<(i64, usize)> {
    let mut val: u64 = 0;
    for (i, &octet) in input.iter().take(MAX_LEN_64).enumerate() {
        if i == MAX_LEN_64 - 1 {
            return Ok((((val << 8) | u64::from(octet)) as i64, MAX_LEN_64));
        }
        let mut bits = octet;
        if i == 0 && octet & SIGN != 0 {
            bits &= !SIGN;
            val = 0xffff_ffff_ffff_ffc0;
        } else {
            val <<= 7;
        }
        val |= u64::from(bits & 0x7f);
        if octet & CONT == 0 {
            return Ok((val as i64, i + 1));
        }
    }
    Err(Error::MalformedVarint { offset: 0 })
}

/// Number of 7-bit groups needed for an unsigned value.
fn unsigned_groups(v: u64) -> usize {
    let bits = 64 - v.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Number of 7-bit groups needed for a signed value (the first group spends one bit on the sign).
fn signed_groups(v: i64) -> usize {
    let magnitude = if v < 0 { !v } else { v } as u64;
    let bits = 64 - magnitude.leading_zeros() as usize + 1;
    bits.div_ceil(7).max(1)
}

fn put_groups<B: BufMut>(v: u64, groups: usize, last_has_cont: bool, dst: &mut B) {
    for i in (0..groups).rev() {
        let mut octet = ((v >> (7 * i)) & 0x7f) as u8;
        if i > 0 || last_has_cont {
            octet |= CONT;
        }
        dst.put_u8(octet);
    }
}

pub fn varuint32_len(v: u32) -> usize {
    unsigned_groups(u64::from(v))
}

pub fn varint32_len(v: i32) -> usize {
    signed_groups(i64::from(v))
}

pub fn varuint64_len(v: u64) -> usize {
    unsigned_groups(v).min(MAX_LEN_64)
}

pub fn varint64_len(v: i64) -> usize {
    signed_groups(v).min(MAX_LEN_64)
}

/// Encode `v` with the minimal number of bytes; returns the bytes written.
pub fn encode_varuint32<B: BufMut>(v: u32, dst: &mut B) -> usize {
    let n = varuint32_len(v);
    put_groups(u64::from(v), n, false, dst);
    n
}

pub fn encode_varint32<B: BufMut>(v: i32, dst: &mut B) -> usize {
    let n = varint32_len(v);
    put_groups(i64::from(v) as u64, n, false, dst);
    n
}

pub fn encode_varuint64<B: BufMut>(v: u64, dst: &mut B) -> usize {
    let n = varuint64_len(v);
    if n == MAX_LEN_64 {
        put_groups(v >> 8, MAX_LEN_64 - 1, true, dst);
        dst.put_u8(v as u8);
    } else {
        put_groups(v, n, false, dst);
    }
    n
}

pub fn encode_varint64<B: BufMut>(v: i64, dst: &mut B) -> usize {
    let n = varint64_len(v);
    if n == MAX_LEN_64 {
        put_groups((v >> 8) as u64, MAX_LEN_64 - 1, true, dst);
        dst.put_u8(v as u8);
    } else {
        put_groups(v as u64, n, false, dst);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varuint32_known_vectors() {
        assert_eq!(decode_varuint32(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode_varuint32(&[0x7f]).unwrap(), (127, 1));
        assert_eq!(decode_varuint32(&[0x81, 0x00]).unwrap(), (128, 2));
        assert_eq!(decode_varuint32(&[0x89, 0x6a]).unwrap(), (0x04ea, 2));
        assert_eq!(
            decode_varuint32(&[0x8f, 0xff, 0xff, 0xff, 0x7f]).unwrap(),
            (u32::MAX, 5)
        );
    }

    #[test]
    fn test_varuint32_errors() {
        assert_eq!(
            decode_varuint32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).unwrap_err(),
            Error::MalformedVarint { offset: 0 }
        );
        assert_eq!(
            decode_varuint32(&[0x80, 0x80]).unwrap_err(),
            Error::MalformedVarint { offset: 0 }
        );
        assert_eq!(
            decode_varuint32(&[]).unwrap_err(),
            Error::MalformedVarint { offset: 0 }
        );
    }

    #[test]
    fn test_exhausted_input_is_malformed() {
        let unterminated = Error::MalformedVarint { offset: 0 };
        assert_eq!(decode_varint32(&[0xc0]).unwrap_err(), unterminated);
        assert_eq!(decode_varuint64(&[0x81, 0x82, 0x83]).unwrap_err(), unterminated);
        assert_eq!(decode_varint64(&[]).unwrap_err(), unterminated);
    }

    #[test]
    fn test_varint_sign_preload() {
        assert_eq!(decode_varint32(&[0x7f]).unwrap(), (-1, 1));
        assert_eq!(decode_varint32(&[0x40]).unwrap(), (-64, 1));
        assert_eq!(decode_varint32(&[0x3f]).unwrap(), (63, 1));
        assert_eq!(decode_varint32(&[0x80, 0x40]).unwrap(), (64, 2));
        assert_eq!(decode_varint64(&[0x7f]).unwrap(), (-1, 1));
        assert_eq!(decode_varint64(&[0xff, 0x00]).unwrap(), (-128, 2));
    }

    #[test]
    fn test_varuint64_ninth_byte_is_full() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(decode_varuint64(&bytes).unwrap(), (u64::MAX, 9));
        assert_eq!(decode_varint64(&bytes).unwrap(), (-1, 9));
    }

    #[test]
    fn test_round_trip_and_length_bounds() {
        for v in [0u32, 1, 63, 64, 127, 128, 0x3fff, 0x4000, 0x0fff_ffff, u32::MAX] {
            let mut buf = Vec::new();
            let n = encode_varuint32(v, &mut buf);
            assert!(n <= MAX_LEN_32);
            assert_eq!(decode_varuint32(&buf).unwrap(), (v, n));
        }
        for v in [0i32, 1, -1, 63, -64, 64, -65, 8191, -8192, i32::MAX, i32::MIN] {
            let mut buf = Vec::new();
            let n = encode_varint32(v, &mut buf);
            assert!(n <= MAX_LEN_32);
            assert_eq!(decode_varint32(&buf).unwrap(), (v, n));
        }
        for v in [0u64, 127, 1 << 35, (1 << 56) - 1, 1 << 56, u64::MAX] {
            let mut buf = Vec::new();
            let n = encode_varuint64(v, &mut buf);
            assert!(n <= MAX_LEN_64);
            assert_eq!(decode_varuint64(&buf).unwrap(), (v, n));
        }
        for v in [0i64, -1, 1 << 40, -(1 << 40), (1 << 55) - 1, -(1 << 55), i64::MAX, i64::MIN] {
            let mut buf = Vec::new();
            let n = encode_varint64(v, &mut buf);
            assert!(n <= MAX_LEN_64);
            assert_eq!(decode_varint64(&buf).unwrap(), (v, n));
        }
    }

    #[test]
    fn test_encoding_is_minimal() {
        assert_eq!(varuint32_len(127), 1);
        assert_eq!(varuint32_len(128), 2);
        assert_eq!(varint32_len(63), 1);
        assert_eq!(varint32_len(64), 2);
        assert_eq!(varint32_len(-64), 1);
        assert_eq!(varint32_len(-65), 2);
        assert_eq!(varuint64_len((1 << 56) - 1), 8);
        assert_eq!(varuint64_len(1 << 56), 9);
    }
}
