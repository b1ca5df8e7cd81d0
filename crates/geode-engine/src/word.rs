//! 256-bit storage words and the Keccak-256 helper behind slot math.
//!
//! Every persistent value in the shared arena is one [`Word`]: a 32-byte
//! big-endian quantity. Slot addresses are words too, so the arithmetic
//! needed by the derivation scheme (slot ± n, low-byte masking) lives
//! here, implemented directly over the byte representation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Width of a storage word in bytes.
pub const WORD_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Word — 256-bit big-endian value
// ---------------------------------------------------------------------------

/// A 256-bit big-endian word: the unit of storage, the type of a slot
/// address, and the canonical padded form of narrower values.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Word(pub [u8; WORD_BYTES]);

impl Word {
    /// The all-zero word. Reading an unwritten slot yields this value.
    pub const ZERO: Word = Word([0u8; WORD_BYTES]);

    /// Widen a `u64` into the low bytes of a word.
    pub fn from_u64(value: u64) -> Self {
        let mut out = [0u8; WORD_BYTES];
        out[WORD_BYTES - 8..].copy_from_slice(&value.to_be_bytes());
        Word(out)
    }

    /// Narrow to `u64` if the value fits, `None` if any high byte is set.
    pub fn as_u64(&self) -> Option<u64> {
        if self.0[..WORD_BYTES - 8].iter().any(|b| *b != 0) {
            return None;
        }
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&self.0[WORD_BYTES - 8..]);
        Some(u64::from_be_bytes(tail))
    }

    pub fn as_bytes(&self) -> &[u8; WORD_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// 256-bit wrapping addition of a small offset, carrying through the
    /// byte representation.
    pub fn wrapping_add_u64(self, rhs: u64) -> Self {
        let mut out = self.0;
        let mut carry = rhs as u128;
        for i in (0..WORD_BYTES).rev() {
            if carry == 0 {
                break;
            }
            let sum = out[i] as u128 + (carry & 0xff);
            out[i] = (sum & 0xff) as u8;
            carry = (carry >> 8) + (sum >> 8);
        }
        Word(out)
    }

    /// 256-bit wrapping subtraction of a small offset.
    pub fn wrapping_sub_u64(self, rhs: u64) -> Self {
        let mut out = self.0;
        let mut borrow = rhs as u128;
        for i in (0..WORD_BYTES).rev() {
            if borrow == 0 {
                break;
            }
            let sub = (borrow & 0xff) as u16;
            let cur = out[i] as u16;
            if cur >= sub {
                out[i] = (cur - sub) as u8;
                borrow >>= 8;
            } else {
                out[i] = (cur + 0x100 - sub) as u8;
                borrow = (borrow >> 8) + 1;
            }
        }
        Word(out)
    }

    /// Clear the least-significant byte (`slot & !0xff`), leaving headroom
    /// for fields adjacent to a namespace base.
    pub fn with_cleared_low_byte(self) -> Self {
        let mut out = self.0;
        out[WORD_BYTES - 1] = 0;
        Word(out)
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(2 + WORD_BYTES * 2);
        s.push_str("0x");
        for b in &self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    /// Parse from hex, with or without a `0x` prefix. Expects exactly 64
    /// hex digits.
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let digits = hex.strip_prefix("0x").unwrap_or(hex);
        if digits.len() != WORD_BYTES * 2 {
            return Err(format!(
                "expected {} hex digits, got {}",
                WORD_BYTES * 2,
                digits.len()
            ));
        }
        let mut out = [0u8; WORD_BYTES];
        for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| "non-ascii hex".to_string())?;
            out[i] = u8::from_str_radix(pair, 16).map_err(|e| format!("bad hex pair: {e}"))?;
        }
        Ok(Word(out))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; WORD_BYTES]> for Word {
    fn from(bytes: [u8; WORD_BYTES]) -> Self {
        Word(bytes)
    }
}

// ---------------------------------------------------------------------------
// Keccak-256
// ---------------------------------------------------------------------------

/// Keccak-256 over raw bytes. The one hash behind selector derivation and
/// every slot-derivation formula.
pub fn keccak256(data: &[u8]) -> Word {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; WORD_BYTES];
    out.copy_from_slice(&digest);
    Word(out)
}

/// Keccak-256 over the concatenation of two words, without an
/// intermediate allocation. Used by mapping-key derivation.
pub fn keccak256_pair(a: Word, b: Word) -> Word {
    let mut buf = [0u8; WORD_BYTES * 2];
    buf[..WORD_BYTES].copy_from_slice(&a.0);
    buf[WORD_BYTES..].copy_from_slice(&b.0);
    keccak256(&buf)
}
