//! Persistence for sequences, enrollments, campaigns and subscribers.
//!
//! The engine talks to three traits ([`SequenceStore`], [`CampaignStore`],
//! [`SubscriberStore`]). Two backends implement all of them over the same
//! in-memory state: [`MemoryStore`] for tests and transient runs, and
//! [`FileStore`], which snapshots the state to disk after every write.

pub mod backends;
pub mod config;
pub mod error;
mod state;
pub mod r#trait;

pub use backends::{FileStore, MemoryStore};
pub use config::{StoreConfig, Stores};
pub use error::{Result, SerializationError, StoreError};
pub use r#trait::{CampaignStore, SequenceStore, SubscriberStore};
