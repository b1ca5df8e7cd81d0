//! Deterministic storage-slot derivation.
//!
//! Independently compiled modules share one storage arena, so there is no
//! central allocator: each component claims a base slot derived from a
//! human-readable namespace string and lays its fields out relative to
//! that base. The derivation depends only on the seed, never on runtime
//! state, which is what makes the claim collision-free and reproducible
//! across deployments.
//!
//! Formulas:
//! - namespace base: `keccak256(keccak256(seed) - 1) & ~0xff`
//! - array element `i` for a descriptor at `base`: `keccak256(base) + i`
//! - mapping value for `key` under `base`: `keccak256(key || base)`
//! - adjacent struct fields: `slot ± n`
//!
//! The namespace formula is fixed by a published vector (see the golden
//! test below); changing it at the same seed would silently re-address
//! every field a deployed component has already written.

use crate::address::Address;
use crate::selector::Selector;
use crate::word::{Word, keccak256, keccak256_pair};

/// Base slot for a namespace seed: `keccak256(keccak256(seed) - 1)` with
/// the low byte cleared to leave headroom for adjacent fields.
pub fn namespace_slot(seed: &str) -> Word {
    let inner = keccak256(seed.as_bytes());
    keccak256(inner.wrapping_sub_u64(1).as_bytes()).with_cleared_low_byte()
}

/// Address of element `i` of an array whose descriptor (length) lives at
/// `base`. Elements are laid out contiguously from `keccak256(base)`.
pub fn array_index(base: Word, i: u64) -> Word {
    keccak256(base.as_bytes()).wrapping_add_u64(i)
}

/// Address of the value bound to a word-sized `key` in a mapping
/// declared at `base`: `keccak256(key || base)`.
pub fn map_key(base: Word, key: Word) -> Word {
    keccak256_pair(key, base)
}

/// Mapping lookup keyed by an address, canonically widened to one word.
pub fn map_key_address(base: Word, key: Address) -> Word {
    map_key(base, key.to_word())
}

/// Mapping lookup keyed by a selector, canonically widened to one word.
pub fn map_key_selector(base: Word, key: Selector) -> Word {
    map_key(base, key.to_word())
}

/// Mapping lookup keyed by an arbitrary byte string (not padded).
pub fn map_key_bytes(base: Word, key: &[u8]) -> Word {
    let mut buf = Vec::with_capacity(key.len() + 32);
    buf.extend_from_slice(key);
    buf.extend_from_slice(base.as_bytes());
    keccak256(&buf)
}

/// The slot immediately after `slot`.
pub fn next(slot: Word) -> Word {
    slot.wrapping_add_u64(1)
}

/// The slot immediately before `slot`.
pub fn prev(slot: Word) -> Word {
    slot.wrapping_sub_u64(1)
}

/// The slot `n` past `slot`, for contiguous fixed-size struct layout.
pub fn offset(slot: Word, n: u64) -> Word {
    slot.wrapping_add_u64(n)
}
