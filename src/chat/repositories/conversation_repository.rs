use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::chat::models::Conversation;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Filename prefix marking a conversation that has not been renamed from its
/// first user message yet.
pub const NEW_CHAT_PREFIX: &str = "Chat_nuevo_";

/// Default name for the nth freshly created chat.
pub fn new_chat_name(index: u32) -> String {
    format!("{NEW_CHAT_PREFIX}{index}")
}

/// Outcome of renaming a conversation's backing file.
///
/// `suffix` is set when the requested name was taken and a numeric suffix was
/// appended to disambiguate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedConversation {
    pub name: String,
    pub suffix: Option<u32>,
}

/// Repository seam for conversation persistence.
///
/// Conversations are identified by name (the backing file's stem). A save is
/// always a full rewrite of the backing document.
pub trait ConversationRepository: Send + Sync + 'static {
    /// Names of all stored conversations, sorted.
    fn list(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>>;

    /// Load one conversation, accepting both the wrapped and the legacy
    /// bare-array document forms. `None` when no backing file exists.
    fn load(&self, name: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>>;

    /// Write the empty document for `name`, so the file exists from the moment
    /// a session is opened.
    fn create(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Allocate and create the first free `Chat_nuevo_<n>` conversation.
    fn create_new_chat(&self) -> BoxFuture<'static, RepositoryResult<String>>;

    /// Persist a conversation, replacing the previous document.
    fn save(
        &self,
        name: &str,
        conversation: Conversation,
    ) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Move `from` to `to_base`, appending `_<n>` (n counting from 1) while the
    /// target name is taken.
    fn rename(
        &self,
        from: &str,
        to_base: &str,
    ) -> BoxFuture<'static, RepositoryResult<RenamedConversation>>;

    /// Delete a conversation. Deleting a missing conversation is not an error.
    fn delete(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>>;
}
