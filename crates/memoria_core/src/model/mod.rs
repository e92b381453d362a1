//! Domain model for items and the context document.
//!
//! # Responsibility
//! - Define the data structures shared by codec, gateways and services.
//!
//! # Invariants
//! - Item properties are flat scalar maps.
//! - Items are hard-deleted; tombstones exist only as context-document lines.

pub mod item;
pub mod lines;
pub mod property;
