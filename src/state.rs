use crate::config::AppConfig;
use crate::profiles::ProfileStore;
use crate::scan::{FeedCamera, LastScan, Scanner};
use crate::storage::{FileStorage, KeyValueStorage};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ProfileStore>,
    pub camera: FeedCamera,
    pub scanner: Arc<Scanner>,
    pub last_scan: Arc<Mutex<LastScan>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        // Local, device-only persistence
        let files = FileStorage::new(&config.data_dir);
        tracing::info!(dir = %files.dir().display(), key = %config.storage_key, "using file storage");
        let storage = Arc::new(files) as Arc<dyn KeyValueStorage>;
        Ok(Self::from_parts(config, storage).await)
    }

    pub async fn from_parts(config: Arc<AppConfig>, storage: Arc<dyn KeyValueStorage>) -> Self {
        let store = Arc::new(ProfileStore::load(storage, config.storage_key.clone()).await);
        let camera = FeedCamera::with_permission(config.scan.camera_allowed);
        let scanner = Arc::new(Scanner::new(Arc::new(camera.clone()), config.scan.fps));
        Self {
            config,
            store,
            camera,
            scanner,
            last_scan: Arc::new(Mutex::new(LastScan::default())),
        }
    }

    #[cfg(test)]
    pub async fn fake() -> Self {
        use crate::config::{ScanConfig, DEFAULT_STORAGE_KEY};
        use crate::qr::EncodeOptions;
        use crate::storage::MemoryStorage;

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_dir: "fake".into(),
            storage_key: DEFAULT_STORAGE_KEY.into(),
            qr: EncodeOptions::default(),
            export_dir: None,
            scan: ScanConfig::default(),
        });
        let storage = Arc::new(MemoryStorage::new()) as Arc<dyn KeyValueStorage>;
        Self::from_parts(config, storage).await
    }
}
