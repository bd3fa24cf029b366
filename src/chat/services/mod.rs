pub mod chat_completions;
pub mod provider;

pub use chat_completions::{ChatGptProvider, DeepSeekProvider};
pub use provider::{
    ChatProvider, DEFAULT_SYSTEM_PROMPT, ProviderError, ResponseStream, Role, StreamChunk,
    TurnMessage, provider_for,
};
