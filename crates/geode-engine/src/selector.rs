//! Function selectors: the 4-byte dispatch keys.
//!
//! A selector is the first 4 bytes of Keccak-256 over a canonical
//! function signature string such as `transfer(address,uint256)`. The
//! same derivation must be used on both sides of the wire: the registry
//! binds selectors, and inbound calldata leads with one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::word::{WORD_BYTES, Word, keccak256};

/// Width of a selector in bytes.
pub const SELECTOR_BYTES: usize = 4;

// ---------------------------------------------------------------------------
// SelectorError
// ---------------------------------------------------------------------------

/// Rejection of a malformed canonical signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorError {
    MalformedSignature { signature: String, reason: String },
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSignature { signature, reason } => {
                write!(f, "malformed signature '{signature}': {reason}")
            }
        }
    }
}

impl std::error::Error for SelectorError {}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// A 4-byte function identifier, the unit of dispatch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Selector(pub [u8; SELECTOR_BYTES]);

impl Selector {
    /// The all-zero selector. Carried in `NoSelectorMatch` for calls too
    /// short to contain a selector; otherwise unremarkable.
    pub const ZERO: Selector = Selector([0u8; SELECTOR_BYTES]);

    /// Derive a selector from a signature the caller vouches for.
    ///
    /// Entry-point signatures baked into the crate use this; untrusted
    /// input goes through [`Selector::from_signature`], which validates
    /// canonical form first.
    pub fn of(signature: &str) -> Self {
        let digest = keccak256(signature.as_bytes());
        let mut out = [0u8; SELECTOR_BYTES];
        out.copy_from_slice(&digest.0[..SELECTOR_BYTES]);
        Selector(out)
    }

    /// Derive a selector from a canonical signature string.
    ///
    /// Canonical means `name(type1,type2,...)`: a non-empty name, a
    /// parenthesized argument list, no whitespace anywhere.
    pub fn from_signature(signature: &str) -> Result<Self, SelectorError> {
        let reject = |reason: &str| SelectorError::MalformedSignature {
            signature: signature.to_string(),
            reason: reason.to_string(),
        };
        let open = signature.find('(').ok_or_else(|| reject("missing '('"))?;
        if open == 0 {
            return Err(reject("empty function name"));
        }
        if !signature.ends_with(')') {
            return Err(reject("missing trailing ')'"));
        }
        if signature.chars().any(|c| c.is_whitespace()) {
            return Err(reject("whitespace is not canonical"));
        }
        Ok(Self::of(signature))
    }

    pub fn as_bytes(&self) -> &[u8; SELECTOR_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Canonical word form: the selector occupies the low 4 bytes.
    pub fn to_word(self) -> Word {
        let mut out = [0u8; WORD_BYTES];
        out[WORD_BYTES - SELECTOR_BYTES..].copy_from_slice(&self.0);
        Word(out)
    }

    /// Narrow a word back to a selector; `None` unless the high 28 bytes
    /// are zero.
    pub fn from_word(word: Word) -> Option<Self> {
        if word.0[..WORD_BYTES - SELECTOR_BYTES].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; SELECTOR_BYTES];
        out.copy_from_slice(&word.0[WORD_BYTES - SELECTOR_BYTES..]);
        Some(Selector(out))
    }

    /// Leading 4 bytes of calldata, if there are at least 4.
    pub fn from_calldata(calldata: &[u8]) -> Option<Self> {
        if calldata.len() < SELECTOR_BYTES {
            return None;
        }
        let mut out = [0u8; SELECTOR_BYTES];
        out.copy_from_slice(&calldata[..SELECTOR_BYTES]);
        Some(Selector(out))
    }

    /// Assemble calldata: `selector || payload`.
    pub fn calldata(self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(SELECTOR_BYTES + payload.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(payload);
        out
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(2 + SELECTOR_BYTES * 2);
        s.push_str("0x");
        for b in &self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; SELECTOR_BYTES]> for Selector {
    fn from(bytes: [u8; SELECTOR_BYTES]) -> Self {
        Selector(bytes)
    }
}

// ---------------------------------------------------------------------------
// Interface ids (ERC-165 style)
// ---------------------------------------------------------------------------

/// Fold a set of selectors into an interface id: the XOR of all of them.
/// An empty set folds to the zero selector.
pub fn interface_id<I>(selectors: I) -> Selector
where
    I: IntoIterator<Item = Selector>,
{
    let mut out = [0u8; SELECTOR_BYTES];
    for sel in selectors {
        for (acc, b) in out.iter_mut().zip(sel.0.iter()) {
            *acc ^= b;
        }
    }
    Selector(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = Selector::from_signature("owner()").expect("derive");
        let b = Selector::from_signature("owner()").expect("derive");
        assert_eq!(a, b);
        assert_ne!(a, Selector::from_signature("renounce()").expect("derive"));
    }

    #[test]
    fn of_agrees_with_validated_derivation() {
        assert_eq!(
            Selector::of("owner()"),
            Selector::from_signature("owner()").expect("derive")
        );
    }

    #[test]
    fn derivation_matches_keccak_prefix() {
        let sel = Selector::from_signature("transfer(address,uint256)").expect("derive");
        let digest = keccak256(b"transfer(address,uint256)");
        assert_eq!(&sel.0[..], &digest.0[..SELECTOR_BYTES]);
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        for bad in ["", "()", "owner", "owner(", "owner ()", "owner()x"] {
            assert!(
                Selector::from_signature(bad).is_err(),
                "accepted '{bad}'"
            );
        }
    }

    #[test]
    fn word_round_trip() {
        let sel = Selector([1, 2, 3, 4]);
        assert_eq!(Selector::from_word(sel.to_word()), Some(sel));
        let mut high = [0u8; WORD_BYTES];
        high[0] = 9;
        assert_eq!(Selector::from_word(Word(high)), None);
    }

    #[test]
    fn calldata_leads_with_selector() {
        let sel = Selector([0xaa, 0xbb, 0xcc, 0xdd]);
        let data = sel.calldata(&[1, 2, 3]);
        assert_eq!(Selector::from_calldata(&data), Some(sel));
        assert_eq!(&data[SELECTOR_BYTES..], &[1, 2, 3]);
        assert_eq!(Selector::from_calldata(&[0xaa, 0xbb]), None);
    }

    #[test]
    fn interface_id_folds_by_xor() {
        let a = Selector([0xf0, 0x00, 0x00, 0x01]);
        let b = Selector([0x0f, 0x00, 0x00, 0x10]);
        assert_eq!(interface_id([a, b]), Selector([0xff, 0x00, 0x00, 0x11]));
        assert_eq!(interface_id([a, a]), Selector::ZERO);
        assert_eq!(interface_id([]), Selector::ZERO);
    }
}
