//! Building blocks for upgradeable, modular programs.
//!
//! The core is the faceted dispatch and mutation system: one deployed
//! address routes calls by 4-byte selector to independently deployed
//! facets, and the routing table is mutable post-deployment through an
//! atomic batch cut. Around it sit the pieces that make the pattern
//! safe to live with: deterministic namespaced storage addressing so
//! facets share one arena without collision, read-only introspection,
//! beacon indirection for fleet-wide upgrades, and a deterministic
//! call-and-rollback host to run it all on.
//!
//! Start at [`diamond::Diamond`] for the assembled dispatcher,
//! [`cut_engine`] for the mutation surface, and [`slot_derivation`]
//! for the addressing scheme everything is built on.

#![forbid(unsafe_code)]

pub mod address;
pub mod beacon;
pub mod cut_engine;
pub mod diamond;
pub mod errors;
pub mod events;
pub mod facet_registry;
pub mod host;
pub mod loupe;
pub mod ownership;
pub mod reentrancy;
pub mod selector;
pub mod slot_derivation;
pub mod storage;
pub mod wire;
pub mod word;

pub use address::Address;
pub use errors::EngineError;
pub use selector::Selector;
pub use word::Word;
