use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::models::{ProviderKind, Settings};
use super::repositories::SettingsRepository;

/// The one object that reads and writes settings.
///
/// Constructed once and passed to whoever needs configuration; mutators only
/// touch the in-memory document, [`SettingsService::save`] writes it out.
/// Unreadable files degrade to defaults, and write failures are logged and
/// otherwise ignored, so settings problems never take the app down.
pub struct SettingsService {
    repository: Arc<dyn SettingsRepository>,
    state: Mutex<Settings>,
}

impl SettingsService {
    pub async fn load(repository: Arc<dyn SettingsRepository>) -> Self {
        let settings = match repository.load().await {
            Ok(settings) => settings.normalized(),
            Err(err) => {
                warn!(
                    path = %repository.storage_path(),
                    error = %err,
                    "could not read settings, starting from defaults"
                );
                Settings::default()
            }
        };

        Self {
            repository,
            state: Mutex::new(settings),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.state.lock().clone()
    }

    pub fn selected_provider(&self) -> Option<ProviderKind> {
        self.state.lock().selected_provider
    }

    pub fn select_provider(&self, kind: ProviderKind) {
        self.state.lock().selected_provider = Some(kind);
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        self.state.lock().api_key(kind).map(str::to_string)
    }

    pub fn set_api_key(&self, kind: ProviderKind, key: String) {
        self.state.lock().api_keys.insert(kind, key);
    }

    pub fn conversations_dir(&self) -> Option<PathBuf> {
        self.state.lock().conversations_dir.clone()
    }

    pub fn set_conversations_dir(&self, dir: PathBuf) {
        self.state.lock().conversations_dir = Some(dir);
    }

    pub fn dark_mode(&self) -> bool {
        self.state.lock().dark_mode
    }

    pub fn set_dark_mode(&self, dark: bool) {
        self.state.lock().dark_mode = dark;
    }

    /// Persist the current document. Failures are deliberately swallowed.
    pub async fn save(&self) {
        let settings = self.snapshot();
        if let Err(err) = self.repository.save(settings).await {
            warn!(
                path = %self.repository.storage_path(),
                error = %err,
                "could not save settings"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::repositories::SettingsJsonRepository;

    async fn service_at(path: PathBuf) -> SettingsService {
        SettingsService::load(Arc::new(SettingsJsonRepository::with_path(path))).await
    }

    #[tokio::test]
    async fn test_first_run_starts_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_at(dir.path().join("settings.json")).await;

        assert!(service.selected_provider().is_none());
        assert!(service.dark_mode());
    }

    #[tokio::test]
    async fn test_mutations_round_trip_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let service = service_at(path.clone()).await;
        service.select_provider(ProviderKind::DeepSeek);
        service.set_api_key(ProviderKind::DeepSeek, "sk-prueba".to_string());
        service.set_dark_mode(false);
        service.set_conversations_dir(PathBuf::from("/tmp/conversaciones"));
        service.save().await;

        let reloaded = service_at(path).await;
        assert_eq!(reloaded.selected_provider(), Some(ProviderKind::DeepSeek));
        assert_eq!(
            reloaded.api_key(ProviderKind::DeepSeek).as_deref(),
            Some("sk-prueba")
        );
        assert!(!reloaded.dark_mode());
        assert_eq!(
            reloaded.conversations_dir(),
            Some(PathBuf::from("/tmp/conversaciones"))
        );
    }

    #[tokio::test]
    async fn test_corrupt_settings_degrade_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ roto").unwrap();

        let service = service_at(path).await;
        assert_eq!(service.snapshot(), Settings::default());
    }

    #[tokio::test]
    async fn test_legacy_key_is_visible_through_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"deepseek_api_key": "sk-legado"}"#).unwrap();

        let service = service_at(path).await;
        assert_eq!(
            service.api_key(ProviderKind::DeepSeek).as_deref(),
            Some("sk-legado")
        );
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the settings file should be makes the rename fail
        let path = dir.path().join("settings.json");
        std::fs::create_dir_all(&path).unwrap();

        let blocked = SettingsService {
            repository: Arc::new(SettingsJsonRepository::with_path(path)),
            state: Mutex::new(Settings::default()),
        };

        // must not panic or error
        blocked.save().await;
    }
}
