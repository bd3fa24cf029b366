pub mod conversation;
pub mod session;

pub use conversation::{Conversation, StoredMessage};
pub use session::{ChatSession, SessionError, SessionEvent};
