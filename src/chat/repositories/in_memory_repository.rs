use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation_repository::{
    BoxFuture, ConversationRepository, RenamedConversation, new_chat_name,
};
use super::error::{RepositoryError, RepositoryResult};
use crate::chat::models::Conversation;

/// In-memory repository for conversations.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    conversations: Arc<Mutex<BTreeMap<String, Conversation>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn list(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>> {
        let conversations = self.conversations.clone();

        Box::pin(async move { Ok(conversations.lock().keys().cloned().collect()) })
    }

    fn load(&self, name: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let conversations = self.conversations.clone();
        let name = name.to_string();

        Box::pin(async move { Ok(conversations.lock().get(&name).cloned()) })
    }

    fn create(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let name = name.to_string();

        Box::pin(async move {
            conversations.lock().insert(name, Conversation::default());
            Ok(())
        })
    }

    fn create_new_chat(&self) -> BoxFuture<'static, RepositoryResult<String>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            let mut store = conversations.lock();
            let mut index = 1u32;
            loop {
                let name = new_chat_name(index);
                if !store.contains_key(&name) {
                    store.insert(name.clone(), Conversation::default());
                    return Ok(name);
                }
                index += 1;
            }
        })
    }

    fn save(
        &self,
        name: &str,
        conversation: Conversation,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let name = name.to_string();

        Box::pin(async move {
            conversations.lock().insert(name, conversation);
            Ok(())
        })
    }

    fn rename(
        &self,
        from: &str,
        to_base: &str,
    ) -> BoxFuture<'static, RepositoryResult<RenamedConversation>> {
        let conversations = self.conversations.clone();
        let from = from.to_string();
        let to_base = to_base.to_string();

        Box::pin(async move {
            let mut store = conversations.lock();

            let mut name = to_base.clone();
            let mut suffix = None;
            let mut n = 1u32;
            while store.contains_key(&name) {
                name = format!("{to_base}_{n}");
                suffix = Some(n);
                n += 1;
            }

            let conversation = store
                .remove(&from)
                .ok_or(RepositoryError::NotFound { name: from })?;
            store.insert(name.clone(), conversation);

            Ok(RenamedConversation { name, suffix })
        })
    }

    fn delete(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let name = name.to_string();

        Box::pin(async move {
            conversations.lock().remove(&name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::StoredMessage;
    use crate::chat::models::conversation::USER_AUTHOR;

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = InMemoryConversationRepository::new();

        let mut conversation = Conversation::default();
        conversation.title = Some("Prueba".to_string());
        conversation.push(StoredMessage::new(USER_AUTHOR, "Hola"));

        repo.save("prueba", conversation.clone()).await.unwrap();

        let loaded = repo.load("prueba").await.unwrap().unwrap();
        assert_eq!(loaded, conversation);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryConversationRepository::new();

        repo.save("uno", Conversation::default()).await.unwrap();
        repo.delete("uno").await.unwrap();

        assert!(repo.load("uno").await.unwrap().is_none());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_new_chat_indexes_from_one() {
        let repo = InMemoryConversationRepository::new();

        assert_eq!(repo.create_new_chat().await.unwrap(), "Chat_nuevo_1");
        assert_eq!(repo.create_new_chat().await.unwrap(), "Chat_nuevo_2");
    }

    #[tokio::test]
    async fn test_rename_resolves_collisions() {
        let repo = InMemoryConversationRepository::new();

        repo.save("Hola", Conversation::default()).await.unwrap();
        repo.save("Chat_nuevo_1", Conversation::default())
            .await
            .unwrap();

        let renamed = repo.rename("Chat_nuevo_1", "Hola").await.unwrap();
        assert_eq!(renamed.name, "Hola_1");
        assert_eq!(renamed.suffix, Some(1));
        assert_eq!(repo.list().await.unwrap(), vec!["Hola", "Hola_1"]);
    }
}
