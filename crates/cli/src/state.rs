use std::{fs, path::PathBuf, sync::Arc};

use common::prelude::{Config, FsBackend, KeyMaterial, Session};

pub const APP_NAME: &str = "dweb";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const STORE_DIR_NAME: &str = "store";

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the dweb directory (~/.dweb)
    pub dir: PathBuf,
    /// Path to the seed PEM file
    pub key_path: PathBuf,
    /// Root of the filesystem backend
    pub store_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: Config,
}

impl AppState {
    /// Get the dweb directory path (custom or default ~/.dweb)
    pub fn dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory with a fresh seed
    pub fn init(custom_path: Option<PathBuf>, config: Option<Config>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;

        let store_path = dir.join(STORE_DIR_NAME);
        fs::create_dir_all(&store_path)?;

        let keys = KeyMaterial::generate();
        let key_path = dir.join(KEY_FILE_NAME);
        let pem = keys
            .to_pem()
            .map_err(|e| StateError::InvalidKey(e.to_string()))?;
        fs::write(&key_path, pem)?;

        let config = config.unwrap_or_default();
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, config.to_toml()?)?;

        Ok(Self {
            dir,
            key_path,
            store_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the dweb directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if !dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = dir.join(KEY_FILE_NAME);
        let store_path = dir.join(STORE_DIR_NAME);
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !store_path.exists() {
            return Err(StateError::MissingFile(format!("{STORE_DIR_NAME}/")));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            dir,
            key_path,
            store_path,
            config_path,
            config,
        })
    }

    /// Load the seeded key material from the key file
    pub fn load_keys(&self) -> Result<KeyMaterial, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        KeyMaterial::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }

    /// Rewrite the config file from `self.config`
    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, self.config.to_toml()?)?;
        Ok(())
    }

    /// A session over the filesystem store, with `dweb:/` names resolvable
    pub async fn session(&self) -> Result<Session, StateError> {
        let backend = FsBackend::open(&self.store_path)
            .await
            .map_err(|e| StateError::Store(e.into()))?;
        let session = Session::with_config(Arc::new(backend), self.config.clone());
        session.install_name_resolver();
        Ok(session)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("dweb directory not initialized. Run 'dweb init' first")]
    NotInitialized,

    #[error("dweb directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("store error: {0}")]
    Store(#[from] common::error::Error),

    #[error("config error: {0}")]
    Config(#[from] common::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
