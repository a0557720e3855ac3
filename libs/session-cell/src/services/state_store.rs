use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use shared_browser::StorageState;
use shared_config::{SessionStateBackend, StorageConfig};
use shared_database::{BlobClient, StorageAccount};

use crate::error::SessionError;

/// Persisted browser state keyed by site identifier.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn load(&self, site: &str) -> Result<Option<StorageState>, SessionError>;

    async fn save(&self, site: &str, state: &StorageState) -> Result<(), SessionError>;

    async fn delete(&self, site: &str) -> Result<(), SessionError>;
}

/// Builds the store selected by `SESSION_STATE_BACKEND`.
pub fn state_store_from_config(config: &StorageConfig) -> Result<Arc<dyn SessionStateStore>, SessionError> {
    match config.session_state_backend {
        SessionStateBackend::Blob => {
            let account = StorageAccount::from_connection_string(&config.connection_string)?;
            let blobs = BlobClient::new(account, &config.session_state_container);
            Ok(Arc::new(BlobSessionStateStore::new(blobs)))
        }
        SessionStateBackend::File => Ok(Arc::new(FileSessionStateStore::new(&config.session_state_dir))),
    }
}

/// Unreadable snapshots are discarded so the caller falls back to a fresh login.
fn decode_state(site: &str, bytes: &[u8]) -> Option<StorageState> {
    match StorageState::from_json(bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Discarding unreadable session state for {}: {}", site, e);
            None
        }
    }
}

pub struct BlobSessionStateStore {
    blobs: BlobClient,
}

impl BlobSessionStateStore {
    pub fn new(blobs: BlobClient) -> Self {
        Self { blobs }
    }

    pub async fn ensure_container(&self) -> Result<(), SessionError> {
        self.blobs.create_container_if_missing().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStateStore for BlobSessionStateStore {
    async fn load(&self, site: &str) -> Result<Option<StorageState>, SessionError> {
        match self.blobs.get_blob(site).await? {
            Some(bytes) => {
                debug!("Loaded session state for {} from blob", site);
                Ok(decode_state(site, &bytes))
            }
            None => {
                debug!("No session state stored for {}", site);
                Ok(None)
            }
        }
    }

    async fn save(&self, site: &str, state: &StorageState) -> Result<(), SessionError> {
        let body = state.to_json()?;
        self.blobs.put_blob(site, body, "application/json").await?;
        debug!("Saved session state for {} to blob", site);
        Ok(())
    }

    async fn delete(&self, site: &str) -> Result<(), SessionError> {
        self.blobs.delete_blob(site).await?;
        info!("Deleted session state for {}", site);
        Ok(())
    }
}

/// Stores each site's state as `<dir>/<site>.json`.
pub struct FileSessionStateStore {
    dir: PathBuf,
}

impl FileSessionStateStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, site: &str) -> PathBuf {
        self.dir.join(format!("{}.json", site))
    }
}

#[async_trait]
impl SessionStateStore for FileSessionStateStore {
    async fn load(&self, site: &str) -> Result<Option<StorageState>, SessionError> {
        match tokio::fs::read(self.path_for(site)).await {
            Ok(bytes) => Ok(decode_state(site, &bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, site: &str, state: &StorageState) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(site), state.to_json()?).await?;
        debug!("Saved session state for {} to {}", site, self.dir.display());
        Ok(())
    }

    async fn delete(&self, site: &str) -> Result<(), SessionError> {
        match tokio::fs::remove_file(self.path_for(site)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct InMemorySessionStateStore {
    states: Mutex<HashMap<String, StorageState>>,
}

impl InMemorySessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(site: &str, state: StorageState) -> Self {
        let store = Self::default();
        store.insert(site, state);
        store
    }

    fn insert(&self, site: &str, state: StorageState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(site.to_string(), state);
        }
    }

    pub fn get(&self, site: &str) -> Option<StorageState> {
        self.states.lock().ok().and_then(|states| states.get(site).cloned())
    }

    pub fn contains(&self, site: &str) -> bool {
        self.get(site).is_some()
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStateStore {
    async fn load(&self, site: &str) -> Result<Option<StorageState>, SessionError> {
        Ok(self.get(site))
    }

    async fn save(&self, site: &str, state: &StorageState) -> Result<(), SessionError> {
        self.insert(site, state.clone());
        Ok(())
    }

    async fn delete(&self, site: &str) -> Result<(), SessionError> {
        if let Ok(mut states) = self.states.lock() {
            states.remove(site);
        }
        Ok(())
    }
}
