pub mod models;
pub mod repositories;
pub mod service;

pub use models::{ProviderKind, Settings};
pub use service::SettingsService;
