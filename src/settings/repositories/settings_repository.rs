use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::settings::models::Settings;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    Path(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Repository seam for the settings document.
pub trait SettingsRepository: Send + Sync + 'static {
    /// Load the settings document; a missing file yields the defaults.
    fn load(&self) -> BoxFuture<'static, SettingsResult<Settings>>;

    /// Persist the settings document.
    fn save(&self, settings: Settings) -> BoxFuture<'static, SettingsResult<()>>;

    /// Where the document lives, for diagnostics.
    fn storage_path(&self) -> String;
}
