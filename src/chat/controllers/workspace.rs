use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::chat::models::ChatSession;
use crate::chat::repositories::{ConversationRepository, RepositoryError};
use crate::chat::services::provider::{ChatProvider, provider_for};
use crate::settings::{ProviderKind, SettingsService};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no provider selected")]
    NoProviderSelected,

    #[error("no API key stored for {0}")]
    MissingApiKey(ProviderKind),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Owns the set of open sessions (the tabs), the active provider and the
/// settings service. Sessions share one repository; switching providers
/// re-points every open session without touching message history.
pub struct Workspace {
    settings: Arc<SettingsService>,
    repository: Arc<dyn ConversationRepository>,
    provider: Arc<dyn ChatProvider>,
    sessions: Vec<ChatSession>,
    active: Option<String>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("sessions", &self.sessions.len())
            .field("active", &self.active)
            .finish()
    }
}

impl Workspace {
    /// Build a workspace from the configured provider. Fails when no provider
    /// is selected or its key is missing; the caller prompts and retries.
    pub fn new(
        settings: Arc<SettingsService>,
        repository: Arc<dyn ConversationRepository>,
    ) -> Result<Self, WorkspaceError> {
        let kind = settings
            .selected_provider()
            .ok_or(WorkspaceError::NoProviderSelected)?;
        let key = settings
            .api_key(kind)
            .ok_or(WorkspaceError::MissingApiKey(kind))?;

        info!(provider = %kind, "workspace using configured provider");

        Ok(Self {
            settings,
            repository,
            provider: provider_for(kind, key),
            sessions: Vec::new(),
            active: None,
        })
    }

    /// Open every stored conversation as a tab, creating a default chat when
    /// the folder is empty.
    pub async fn open_existing(&mut self) -> Result<(), WorkspaceError> {
        let mut names = self.repository.list().await?;
        if names.is_empty() {
            names.push(self.repository.create_new_chat().await?);
        }

        for name in names {
            if self.session(&name).is_none() {
                let session =
                    ChatSession::open(&name, self.repository.clone(), self.provider.clone()).await;
                self.sessions.push(session);
            }
        }

        if self.active.is_none() {
            self.active = self.sessions.first().map(|s| s.name());
        }

        Ok(())
    }

    /// Create and open a fresh `Chat_nuevo_<n>` tab, making it active.
    pub async fn new_chat(&mut self) -> Result<ChatSession, WorkspaceError> {
        let name = self.repository.create_new_chat().await?;
        let session =
            ChatSession::open(&name, self.repository.clone(), self.provider.clone()).await;
        self.sessions.push(session.clone());
        self.active = Some(name);
        Ok(session)
    }

    /// Open a conversation by name (loading or creating its file), making it
    /// active. Returns the existing tab when already open.
    pub async fn open(&mut self, name: &str) -> Result<ChatSession, WorkspaceError> {
        if let Some(session) = self.session(name) {
            self.active = Some(session.name());
            return Ok(session);
        }

        let session =
            ChatSession::open(name, self.repository.clone(), self.provider.clone()).await;
        self.sessions.push(session.clone());
        self.active = Some(session.name());
        Ok(session)
    }

    pub fn session(&self, name: &str) -> Option<ChatSession> {
        self.sessions.iter().find(|s| s.name() == name).cloned()
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// The active tab. When the stored name no longer resolves (the session
    /// renamed itself), falls back to the first tab.
    pub fn active(&self) -> Option<ChatSession> {
        self.active
            .as_deref()
            .and_then(|name| self.session(name))
            .or_else(|| self.sessions.first().cloned())
    }

    pub fn set_active(&mut self, name: &str) -> bool {
        if self.session(name).is_some() {
            self.active = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Drop a tab; the backing file stays on disk. An in-flight reply keeps
    /// running unobserved.
    pub fn close(&mut self, name: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.name() != name);
        let closed = self.sessions.len() < before;

        if closed && self.active.as_deref() == Some(name) {
            self.active = self.sessions.first().map(|s| s.name());
        }

        closed
    }

    /// Drop a tab and delete its backing file.
    pub async fn remove(&mut self, name: &str) -> Result<(), WorkspaceError> {
        self.close(name);
        self.repository.delete(name).await?;
        debug!(name, "conversation removed");
        Ok(())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Switch every open session to another provider and persist the choice.
    pub async fn switch_provider(&mut self, kind: ProviderKind) -> Result<(), WorkspaceError> {
        let key = self
            .settings
            .api_key(kind)
            .ok_or(WorkspaceError::MissingApiKey(kind))?;

        let provider = provider_for(kind, key);
        self.provider = provider.clone();
        for session in &self.sessions {
            session.set_provider(provider.clone());
        }

        info!(provider = %kind, "switched provider for all open sessions");

        self.settings.select_provider(kind);
        self.settings.save().await;
        Ok(())
    }

    /// Store a new key; when it belongs to the active provider, rebuild it and
    /// re-point the open sessions.
    pub async fn update_api_key(
        &mut self,
        kind: ProviderKind,
        key: String,
    ) -> Result<(), WorkspaceError> {
        self.settings.set_api_key(kind, key);
        self.settings.save().await;

        if self.settings.selected_provider() == Some(kind) {
            self.switch_provider(kind).await?;
        }
        Ok(())
    }

    pub fn dark_mode(&self) -> bool {
        self.settings.dark_mode()
    }

    /// Flip the theme flag and persist it.
    pub async fn toggle_dark_mode(&self) -> bool {
        let dark = !self.settings.dark_mode();
        self.settings.set_dark_mode(dark);
        self.settings.save().await;
        dark
    }
}
