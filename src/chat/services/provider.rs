use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chat_completions::{ChatGptProvider, DeepSeekProvider};
use crate::settings::ProviderKind;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// System prompt sent ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente útil y expresivo.";

/// Stream chunks emitted while a reply is being generated.
///
/// A stream ends with exactly one `Done` or one `Error`; nothing follows the
/// terminal chunk and failed streams are never retried.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Done,
    Error(String),
}

/// Type alias for response streams
pub type ResponseStream = BoxStream<'static, StreamChunk>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message in a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
}

impl TurnMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failures opening a stream. Mid-stream failures arrive as the terminal
/// [`StreamChunk::Error`] instead.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },
}

/// A chat-completion backend.
///
/// One implementation per provider; call sites never branch on the concrete
/// backend.
pub trait ChatProvider: Send + Sync + 'static {
    /// Display name, used as the author tag on committed replies.
    fn name(&self) -> &str;

    /// Open a streaming reply to the given role-tagged history.
    fn stream_reply(
        &self,
        messages: Vec<TurnMessage>,
    ) -> BoxFuture<'static, Result<ResponseStream, ProviderError>>;
}

/// Build the configured provider for a kind/key pair.
pub fn provider_for(kind: ProviderKind, api_key: String) -> Arc<dyn ChatProvider> {
    match kind {
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(api_key)),
        ProviderKind::ChatGpt => Arc::new(ChatGptProvider::new(api_key)),
    }
}
