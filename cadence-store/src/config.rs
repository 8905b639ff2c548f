use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{CampaignStore, FileStore, MemoryStore, Result, SequenceStore, SubscriberStore};

/// Which backend to persist into.
///
/// File-backed store in RON config:
/// ```ron
/// Cadence (
///     store: File(
///         path: "/var/lib/cadence/state.bin",
///     ),
/// )
/// ```
///
/// Memory-backed store for testing (lost on exit):
/// ```ron
/// Cadence (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    File { path: PathBuf },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/lib/cadence/state.bin"),
        }
    }
}

/// The three store handles an engine needs, sharing one backend
#[derive(Debug, Clone)]
pub struct Stores {
    pub sequences: Arc<dyn SequenceStore>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
}

impl Stores {
    fn from_backend<B>(backend: B) -> Self
    where
        B: SequenceStore + CampaignStore + SubscriberStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            sequences: backend.clone(),
            campaigns: backend.clone(),
            subscribers: backend,
        }
    }

    /// Handles over a fresh in-memory store
    #[must_use]
    pub fn memory() -> Self {
        Self::from_backend(MemoryStore::new())
    }
}

impl From<MemoryStore> for Stores {
    fn from(store: MemoryStore) -> Self {
        Self::from_backend(store)
    }
}

impl From<FileStore> for Stores {
    fn from(store: FileStore) -> Self {
        Self::from_backend(store)
    }
}

impl StoreConfig {
    /// Open the configured backend
    ///
    /// # Errors
    /// If a file-backed store cannot be opened
    pub async fn open(&self) -> Result<Stores> {
        match self {
            Self::File { path } => Ok(FileStore::open(path.clone()).await?.into()),
            Self::Memory => Ok(Stores::memory()),
        }
    }
}
