//! Strict canonical byte codec for entry-point payloads.
//!
//! Fixed-layout, length-prefixed, big-endian. Decoding rejects anything
//! non-canonical instead of normalizing it: truncation, trailing bytes,
//! out-of-range lengths, and non-standard booleans are all typed
//! failures. Every payload has exactly one byte representation, so two
//! observers never disagree about what a call asked for.

use crate::address::{ADDRESS_BYTES, Address};
use crate::selector::{SELECTOR_BYTES, Selector};
use crate::word::{WORD_BYTES, Word};

/// Codec-level failure. Folded into the call-surface taxonomy
/// (`MalformedCallData`) at entry-point boundaries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input at offset {offset}: need {needed} more bytes")]
    UnexpectedEnd { offset: usize, needed: usize },
    #[error("{count} trailing bytes after the last field")]
    TrailingBytes { count: usize },
    #[error("length {len} exceeds limit {max}")]
    LengthOverflow { len: u64, max: u64 },
    #[error("non-canonical bool byte 0x{byte:02x} at offset {offset}")]
    NonCanonicalBool { byte: u8, offset: usize },
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Append-only payload builder. Lengths are `u32` big-endian; fixed-width
/// fields are raw bytes.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_address(&mut self, value: Address) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_selector(&mut self, value: Selector) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_word(&mut self, value: Word) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Length-prefixed byte string.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), WireError> {
        let len = u32::try_from(value.len()).map_err(|_| WireError::LengthOverflow {
            len: value.len() as u64,
            max: u32::MAX as u64,
        })?;
        self.write_u32(len);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Length prefix for a homogeneous list the caller then writes
    /// element by element.
    pub fn write_len(&mut self, len: usize) -> Result<(), WireError> {
        let len = u32::try_from(len).map_err(|_| WireError::LengthOverflow {
            len: len as u64,
            max: u32::MAX as u64,
        })?;
        self.write_u32(len);
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Strict reader over a payload. `finish` must be called after the last
/// field; leftover bytes are an error, not padding.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.data.len() - self.offset;
        if remaining < n {
            return Err(WireError::UnexpectedEnd {
                offset: self.offset,
                needed: n - remaining,
            });
        }
        let out = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        let at = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(WireError::NonCanonicalBool { byte, offset: at }),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(out))
    }

    pub fn read_address(&mut self) -> Result<Address, WireError> {
        let bytes = self.take(ADDRESS_BYTES)?;
        let mut out = [0u8; ADDRESS_BYTES];
        out.copy_from_slice(bytes);
        Ok(Address(out))
    }

    pub fn read_selector(&mut self) -> Result<Selector, WireError> {
        let bytes = self.take(SELECTOR_BYTES)?;
        let mut out = [0u8; SELECTOR_BYTES];
        out.copy_from_slice(bytes);
        Ok(Selector(out))
    }

    pub fn read_word(&mut self) -> Result<Word, WireError> {
        let bytes = self.take(WORD_BYTES)?;
        let mut out = [0u8; WORD_BYTES];
        out.copy_from_slice(bytes);
        Ok(Word(out))
    }

    /// Length-prefixed byte string, bounded by `max` to keep hostile
    /// payloads from dictating allocations.
    pub fn read_bytes(&mut self, max: usize) -> Result<Vec<u8>, WireError> {
        let len = self.read_len(max)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Bounded list-length prefix.
    pub fn read_len(&mut self, max: usize) -> Result<usize, WireError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(WireError::LengthOverflow {
                len: len as u64,
                max: max as u64,
            });
        }
        Ok(len)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Assert the payload is fully consumed.
    pub fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(WireError::TrailingBytes { count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut enc = Encoder::new();
        enc.write_u8(7);
        enc.write_bool(true);
        enc.write_u32(0xdead_beef);
        enc.write_address(Address::from_low_u64(42));
        enc.write_selector(Selector([1, 2, 3, 4]));
        enc.write_word(Word::from_u64(99));
        enc.write_bytes(b"payload").expect("encode");
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_u8().expect("u8"), 7);
        assert!(dec.read_bool().expect("bool"));
        assert_eq!(dec.read_u32().expect("u32"), 0xdead_beef);
        assert_eq!(dec.read_address().expect("addr"), Address::from_low_u64(42));
        assert_eq!(dec.read_selector().expect("sel"), Selector([1, 2, 3, 4]));
        assert_eq!(dec.read_word().expect("word"), Word::from_u64(99));
        assert_eq!(dec.read_bytes(1024).expect("bytes"), b"payload".to_vec());
        dec.finish().expect("fully consumed");
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut dec = Decoder::new(&[0, 0]);
        let err = dec.read_u32().expect_err("truncated");
        assert_eq!(err, WireError::UnexpectedEnd { offset: 0, needed: 2 });
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut enc = Encoder::new();
        enc.write_u8(1);
        let mut bytes = enc.finish();
        bytes.push(0xcc);
        let mut dec = Decoder::new(&bytes);
        dec.read_u8().expect("u8");
        assert_eq!(
            dec.finish().expect_err("trailing"),
            WireError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn non_canonical_bool_is_rejected() {
        let mut dec = Decoder::new(&[2]);
        assert_eq!(
            dec.read_bool().expect_err("bool"),
            WireError::NonCanonicalBool { byte: 2, offset: 0 }
        );
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut enc = Encoder::new();
        enc.write_u32(10_000);
        let bytes = enc.finish();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(
            dec.read_len(100).expect_err("overflow"),
            WireError::LengthOverflow {
                len: 10_000,
                max: 100
            }
        );
    }

    #[test]
    fn bounded_bytes_guard_allocation() {
        let mut enc = Encoder::new();
        enc.write_bytes(&[0xaa; 64]).expect("encode");
        let bytes = enc.finish();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.read_bytes(32),
            Err(WireError::LengthOverflow { len: 64, max: 32 })
        ));
    }
}
