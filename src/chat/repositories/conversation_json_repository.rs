use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::conversation_repository::{
    BoxFuture, ConversationRepository, RenamedConversation, new_chat_name,
};
use super::error::{RepositoryError, RepositoryResult};
use crate::chat::models::Conversation;

/// JSON file-based repository for conversations.
/// Stores each conversation as `<name>.json` inside the conversations folder.
pub struct ConversationJsonRepository {
    conversations_dir: PathBuf,
}

impl ConversationJsonRepository {
    pub fn new(conversations_dir: impl Into<PathBuf>) -> Self {
        Self {
            conversations_dir: conversations_dir.into(),
        }
    }

    fn conversation_path(&self, name: &str) -> PathBuf {
        self.conversations_dir.join(format!("{name}.json"))
    }
}

/// Full rewrite via temp file + rename, so a crash mid-write never leaves a
/// half-written conversation behind.
async fn write_document(
    dir: &Path,
    path: &Path,
    conversation: &Conversation,
) -> RepositoryResult<()> {
    tokio::fs::create_dir_all(dir).await?;

    let json = serde_json::to_string_pretty(conversation)?;

    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, path).await?;

    Ok(())
}

impl ConversationRepository for ConversationJsonRepository {
    fn list(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&conversations_dir).await?;

            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(&conversations_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) == Some("json")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    names.push(stem.to_string());
                }
            }

            names.sort();
            Ok(names)
        })
    }

    fn load(&self, name: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let path = self.conversation_path(name);

        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };

            let conversation: Conversation = serde_json::from_str(&contents)?;
            Ok(Some(conversation))
        })
    }

    fn create(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations_dir = self.conversations_dir.clone();
        let path = self.conversation_path(name);

        Box::pin(async move {
            write_document(&conversations_dir, &path, &Conversation::default()).await
        })
    }

    fn create_new_chat(&self) -> BoxFuture<'static, RepositoryResult<String>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&conversations_dir).await?;

            let mut index = 1u32;
            loop {
                let name = new_chat_name(index);
                let path = conversations_dir.join(format!("{name}.json"));
                if !tokio::fs::try_exists(&path).await? {
                    write_document(&conversations_dir, &path, &Conversation::default()).await?;
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
        let conversations_dir = self.conversations_dir.clone();
        let path = self.conversation_path(name);

        Box::pin(async move { write_document(&conversations_dir, &path, &conversation).await })
    }

    fn rename(
        &self,
        from: &str,
        to_base: &str,
    ) -> BoxFuture<'static, RepositoryResult<RenamedConversation>> {
        let conversations_dir = self.conversations_dir.clone();
        let from = from.to_string();
        let to_base = to_base.to_string();

        Box::pin(async move {
            let from_path = conversations_dir.join(format!("{from}.json"));

            let mut name = to_base.clone();
            let mut suffix = None;
            let mut n = 1u32;
            while tokio::fs::try_exists(conversations_dir.join(format!("{name}.json"))).await? {
                name = format!("{to_base}_{n}");
                suffix = Some(n);
                n += 1;
            }

            let to_path = conversations_dir.join(format!("{name}.json"));
            match tokio::fs::rename(&from_path, &to_path).await {
                Ok(()) => Ok(RenamedConversation { name, suffix }),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    Err(RepositoryError::NotFound { name: from })
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn delete(&self, name: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.conversation_path(name);

        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}
