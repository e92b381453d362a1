//! Core use-case services.
//!
//! # Responsibility
//! - `ItemStore`: CRUD + similarity query over items through the codec.
//! - `ContextDocument`: the line-addressable context document lifecycle.
//! - Map codec and gateway failures onto one caller-facing error type.
//!
//! # Invariants
//! - Services never bypass codec validation before a gateway write.
//! - Gateway failures propagate unmodified; services never retry.

use crate::codec::property_codec::CodecError;
use crate::gateway::GatewayError;
use crate::model::item::ItemId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod context_document;
pub mod item_store;

pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing error for item and context operations.
#[derive(Debug)]
pub enum StoreError {
    /// No item exists under the id.
    NotFound(ItemId),
    /// A property value is not a flat scalar. Rejected before any write.
    UnsupportedPropertyType { key: String, found: &'static str },
    /// A property key is empty. Rejected before any write.
    InvalidPropertyKey(String),
    /// The gateway failed; the operation did not apply.
    StorageUnavailable(GatewayError),
    /// Stored data cannot be mapped back onto an item.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::UnsupportedPropertyType { key, found } => {
                write!(f, "unsupported property type for `{key}`: {found}")
            }
            Self::InvalidPropertyKey(key) => write!(f, "invalid property key: `{key}`"),
            Self::StorageUnavailable(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored item: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::UnsupportedPropertyType { key, found } => {
                Self::UnsupportedPropertyType { key, found }
            }
            CodecError::InvalidPropertyKey(key) => Self::InvalidPropertyKey(key),
        }
    }
}

impl From<GatewayError> for StoreError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::InvalidData(message) => Self::InvalidData(message),
            other => Self::StorageUnavailable(other),
        }
    }
}
