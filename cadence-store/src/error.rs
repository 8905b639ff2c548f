//! Error types for the cadence-store crate.

use std::io;

use cadence_common::{CampaignId, CampaignStatus};
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A row with the same unique key already exists.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Campaign status changed between the caller's check and the write.
    #[error("Campaign {id} is {status}, cannot start sending")]
    NotSendable { id: CampaignId, status: CampaignStatus },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Invalid store configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns `true` for unique-key violations
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialization(err.into())
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Serialization(err.into())
    }
}
