use std::sync::Arc;

use tracing::info;

use crate::config::{Config, StoreConfig};
use crate::service::CycleService;
use crate::storage::{EncryptedFileStore, MemoryStore, RecordStore, StoreError};

pub struct AppState {
    pub port: u16,
    pub service: CycleService,
}

impl AppState {
    pub fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store: Arc<dyn RecordStore> = match config.store {
            StoreConfig::Memory => {
                info!("Using in-memory record store");
                Arc::new(MemoryStore::new())
            }
            StoreConfig::Encrypted {
                data_dir,
                passphrase,
            } => {
                info!(data_dir = %data_dir.display(), "Using encrypted record store");
                Arc::new(EncryptedFileStore::open(&data_dir, passphrase)?)
            }
        };

        Ok(Self::with_store(config.port, store))
    }

    pub fn with_store(port: u16, store: Arc<dyn RecordStore>) -> Arc<Self> {
        Arc::new(Self {
            port,
            service: CycleService::new(store),
        })
    }
}
