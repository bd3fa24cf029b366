use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::conversation::{
    Conversation, ERROR_AUTHOR, StoredMessage, USER_AUTHOR, truncate_for_display,
};
use crate::chat::repositories::{ConversationRepository, NEW_CHAT_PREFIX};
use crate::chat::services::provider::{
    ChatProvider, DEFAULT_SYSTEM_PROMPT, StreamChunk, TurnMessage,
};

/// Events emitted while a session processes a reply.
///
/// `ReplyStarted` covers the "typing" phase before the first fragment arrives;
/// exactly one of `ReplyCompleted` / `ReplyFailed` ends each reply.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ReplyStarted { author: String },
    ReplyDelta { text: String },
    ReplyCompleted { message: StoredMessage },
    ReplyFailed { message: StoredMessage },
    Renamed { name: String, title: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a reply is already streaming for this session")]
    ReplyInProgress,
}

/// Controller for one conversation: owns its message history, is the sole
/// writer of its backing file, and runs at most one reply stream at a time.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    repository: Arc<dyn ConversationRepository>,
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<UnboundedSender<SessionEvent>>>,
}

struct SessionState {
    name: String,
    conversation: Conversation,
    provider: Arc<dyn ChatProvider>,
    renamed: bool,
    streaming: bool,
}

impl ChatSession {
    /// Open a conversation by name, creating the empty backing file when none
    /// exists yet. An unreadable file is a non-fatal warning: the session
    /// starts empty and in-memory state stays authoritative.
    pub async fn open(
        name: &str,
        repository: Arc<dyn ConversationRepository>,
        provider: Arc<dyn ChatProvider>,
    ) -> Self {
        let conversation = match repository.load(name).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                if let Err(err) = repository.create(name).await {
                    warn!(name, error = %err, "could not create conversation file");
                }
                Conversation::default()
            }
            Err(err) => {
                warn!(name, error = %err, "could not load conversation, starting empty");
                Conversation::default()
            }
        };

        Self {
            inner: Arc::new(SessionInner {
                repository,
                state: Mutex::new(SessionState {
                    name: name.to_string(),
                    conversation,
                    provider,
                    renamed: false,
                    streaming: false,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current backing-file name (changes once on the first rename).
    pub fn name(&self) -> String {
        self.inner.state.lock().name.clone()
    }

    /// Title shown on the tab: the stored title, falling back to the name.
    pub fn title(&self) -> String {
        let state = self.inner.state.lock();
        state
            .conversation
            .title
            .clone()
            .unwrap_or_else(|| state.name.clone())
    }

    /// Snapshot of the current message list.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.inner.state.lock().conversation.messages.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.state.lock().streaming
    }

    pub fn provider_name(&self) -> String {
        self.inner.state.lock().provider.name().to_string()
    }

    /// Re-point future requests at another provider. History is untouched.
    pub fn set_provider(&self, provider: Arc<dyn ChatProvider>) {
        self.inner.state.lock().provider = provider;
    }

    /// Receive session events. Dropping the receiver just stops listening;
    /// an in-flight reply keeps running to completion.
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Append a user message and stream the reply in a background task.
    ///
    /// Returns as soon as the worker is spawned; progress arrives via
    /// [`ChatSession::subscribe`]. At most one reply may be in flight.
    pub async fn send(&self, user_text: &str) -> Result<(), SessionError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Ok(());
        }

        let (provider, author, request) = {
            let mut state = self.inner.state.lock();
            if state.streaming {
                return Err(SessionError::ReplyInProgress);
            }

            state
                .conversation
                .push(StoredMessage::new(USER_AUTHOR, user_text));
            state.streaming = true;

            let provider = state.provider.clone();
            let author = provider.name().to_string();
            let request = build_request(&state.conversation);
            (provider, author, request)
        };

        self.maybe_rename(user_text).await;
        self.inner.persist().await;

        self.inner.emit(SessionEvent::ReplyStarted {
            author: author.clone(),
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            match provider.stream_reply(request).await {
                Ok(mut stream) => {
                    let mut reply = String::new();
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            StreamChunk::Text(text) => {
                                reply.push_str(&text);
                                inner.emit(SessionEvent::ReplyDelta { text });
                            }
                            StreamChunk::Done => break,
                            StreamChunk::Error(message) => {
                                inner.fail_reply(message).await;
                                return;
                            }
                        }
                    }
                    inner.commit_reply(&author, &reply).await;
                }
                Err(err) => inner.fail_reply(err.to_string()).await,
            }
        });

        Ok(())
    }

    /// Rename the backing file after the first user message, at most once per
    /// session. A failed rename still consumes the attempt.
    async fn maybe_rename(&self, user_text: &str) {
        let current = {
            let state = self.inner.state.lock();
            if state.renamed || !state.name.starts_with(NEW_CHAT_PREFIX) {
                return;
            }
            state.name.clone()
        };

        let (slug, title_base) = derive_chat_name(user_text);

        match self.inner.repository.rename(&current, &slug).await {
            Ok(renamed) => {
                let title = match renamed.suffix {
                    Some(n) => format!("{title_base} {n}"),
                    None => title_base,
                };

                debug!(from = %current, to = %renamed.name, "renamed conversation");

                {
                    let mut state = self.inner.state.lock();
                    state.name = renamed.name.clone();
                    state.conversation.title = Some(title.clone());
                    state.renamed = true;
                }

                self.inner.emit(SessionEvent::Renamed {
                    name: renamed.name,
                    title,
                });
            }
            Err(err) => {
                warn!(name = %current, error = %err, "could not rename conversation file");
                self.inner.state.lock().renamed = true;
            }
        }
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Rewrite the backing file. Failures are non-fatal: the in-memory
    /// conversation stays authoritative.
    async fn persist(&self) {
        let (name, conversation) = {
            let state = self.state.lock();
            (state.name.clone(), state.conversation.clone())
        };

        if let Err(err) = self.repository.save(&name, conversation).await {
            warn!(name = %name, error = %err, "could not save conversation");
        }
    }

    async fn commit_reply(&self, author: &str, reply: &str) {
        let message = {
            let mut state = self.state.lock();
            let message = StoredMessage::new(author, truncate_for_display(reply));
            state.conversation.push(message.clone());
            state.streaming = false;
            message
        };

        self.persist().await;
        self.emit(SessionEvent::ReplyCompleted { message });
    }

    async fn fail_reply(&self, error_text: String) {
        let message = {
            let mut state = self.state.lock();
            let message = StoredMessage::new(ERROR_AUTHOR, error_text);
            state.conversation.push(message.clone());
            state.streaming = false;
            message
        };

        self.persist().await;
        self.emit(SessionEvent::ReplyFailed { message });
    }
}

/// Role-tagged request for the provider: the system prompt plus the whole
/// history. Error entries never reach the API.
fn build_request(conversation: &Conversation) -> Vec<TurnMessage> {
    let mut request = Vec::with_capacity(conversation.message_count() + 1);
    request.push(TurnMessage::system(DEFAULT_SYSTEM_PROMPT));

    for message in &conversation.messages {
        match message.author.as_str() {
            USER_AUTHOR => request.push(TurnMessage::user(&message.text)),
            ERROR_AUTHOR => {}
            _ => request.push(TurnMessage::assistant(&message.text)),
        }
    }

    request
}

/// Derive (slug, title) for a rename from the first ~40 characters of a user
/// message: spaces become underscores and everything outside alphanumerics,
/// `_` and `-` is dropped.
fn derive_chat_name(text: &str) -> (String, String) {
    let title: String = text.trim().chars().take(40).collect();
    let slug: String = title
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if slug.is_empty() {
        ("Chat".to_string(), "Chat".to_string())
    } else {
        (slug, title)
    }
}
