//! Property codec for content-only similarity backends.
//!
//! # Responsibility
//! - Make structured properties visible to a backend that only indexes text.
//! - Keep that transformation invisible to every caller of the item store.
//!
//! # Invariants
//! - Encoding is pure and rejects invalid maps before anything is written.
//! - Authoritative values live in backend metadata, not in the text block.

pub mod humanize;
pub mod property_codec;
