use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use cadence_common::internal;
use parking_lot::RwLock;
use tokio::{fs, sync::Mutex};

use super::impl_stores;
use crate::{Result, StoreError, state::StoreState};

/// File-backed store.
///
/// Serves reads from memory and writes the whole state to a single bincode
/// snapshot after every mutation. Snapshots are written to `<path>.tmp`
/// and renamed over `<path>`, so a crash mid-write leaves the previous
/// snapshot intact.
///
/// Writers are serialised: the state change and the snapshot it produces
/// happen under one async lock, so snapshots land on disk in the same order
/// as the changes they capture.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
    writer: Arc<Mutex<()>>,
}

fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

impl FileStore {
    /// Open (or create) the snapshot at `path`
    ///
    /// # Errors
    /// - If the path contains `..` components
    /// - If the parent directory cannot be created
    /// - If an existing snapshot cannot be read or decoded
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;

        internal!("Opening store at {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = Self::tmp_path(&path);
        if fs::try_exists(&tmp).await? {
            internal!(level = WARN, "Removing incomplete snapshot {}", tmp.display());
            fs::remove_file(&tmp).await?;
        }

        let state = if fs::try_exists(&path).await? {
            let bytes = fs::read(&path).await?;
            let (state, _): (StoreState, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode_config())?;
            state
        } else {
            internal!("{} does not exist, starting empty", path.display());
            StoreState::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            writer: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_path(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::Configuration(
                "Store path cannot be empty".to_string(),
            ));
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(StoreError::Configuration(format!(
                "Store path cannot contain '..' components: {}",
                path.display()
            )));
        }

        Ok(())
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.read();
        f(&*state)
    }

    async fn write<R>(&self, f: impl FnOnce(&mut StoreState) -> Result<R>) -> Result<R> {
        let _writer = self.writer.lock().await;

        // Changes apply to a copy that replaces the live state only once its
        // snapshot is on disk.
        let mut next = self.state.read().clone();
        let result = f(&mut next)?;
        let snapshot = bincode::serde::encode_to_vec(&next, bincode_config())?;

        let tmp = Self::tmp_path(&self.path);
        fs::write(&tmp, &snapshot).await?;
        if let Err(err) = fs::rename(&tmp, &self.path).await {
            internal!(level = WARN, "Failed to replace snapshot {}: {err}", self.path.display());
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        *self.state.write() = next;
        Ok(result)
    }
}

impl_stores!(FileStore);
