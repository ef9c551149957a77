//! Per-user conversation persistence.
//!
//! One JSON file per user holds all of that user's conversations. Files are
//! rewritten wholesale each turn; a store-wide mutex serializes the
//! read-modify-write cycle and writes go through a temp file + rename so a
//! crash never leaves a half-written file behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::defaults::{MAX_PROMPT_HISTORY, MAX_STORED_MESSAGES};

pub const USER_ROLE: &str = "User";
pub const ASSISTANT_ROLE: &str = "Assistant";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConversations {
    pub user_id: String,
    pub conversations: HashMap<String, Conversation>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

pub struct ConversationStore {
    dir: PathBuf,
    // Serializes every read-modify-write cycle across users; files are small
    // and turns are infrequent enough that one lock suffices.
    lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create conversations dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        // user_id comes off the wire; keep it from escaping the directory.
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn load_user(&self, user_id: &str) -> UserConversations {
        let path = self.user_file(user_id);
        if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
            {
                Ok(data) => return data,
                Err(e) => {
                    tracing::error!("Error loading conversations for {user_id}: {e:#}");
                }
            }
        }
        UserConversations {
            user_id: user_id.to_string(),
            conversations: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    fn save_user(&self, data: &mut UserConversations) -> Result<()> {
        data.last_updated = Utc::now();
        let path = self.user_file(&data.user_id);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(data)?;
        std::fs::write(&tmp, raw)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub async fn create_conversation(&self, user_id: &str) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_user(user_id);
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        data.conversations.insert(
            conversation_id.clone(),
            Conversation {
                conversation_id: conversation_id.clone(),
                created_at: now,
                updated_at: now,
                title: "New Chat".to_string(),
                messages: Vec::new(),
            },
        );
        self.save_user(&mut data)?;
        Ok(conversation_id)
    }

    /// Append one message, creating the conversation when needed. Retains the
    /// last 50 messages and derives the title from the first user message.
    pub async fn append_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: &str,
        text: &str,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_user(user_id);
        let now = Utc::now();

        let conversation = data
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                conversation_id: conversation_id.to_string(),
                created_at: now,
                updated_at: now,
                title: "New Chat".to_string(),
                messages: Vec::new(),
            });

        conversation.messages.push(Message {
            role: role.to_string(),
            text: text.to_string(),
            timestamp: now,
        });
        if conversation.messages.len() > MAX_STORED_MESSAGES {
            let excess = conversation.messages.len() - MAX_STORED_MESSAGES;
            conversation.messages.drain(..excess);
        }
        conversation.updated_at = now;

        if conversation.title == "New Chat" {
            if let Some(first_user) = conversation
                .messages
                .iter()
                .find(|m| m.role == USER_ROLE)
            {
                conversation.title = first_user.text.chars().take(50).collect();
            }
        }

        self.save_user(&mut data)
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let _guard = self.lock.lock().await;
        let data = self.load_user(user_id);
        let mut summaries: Vec<ConversationSummary> = data
            .conversations
            .values()
            .map(|c| ConversationSummary {
                conversation_id: c.conversation_id.clone(),
                title: c.title.clone(),
                created_at: c.created_at,
                updated_at: c.updated_at,
                message_count: c.messages.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let _guard = self.lock.lock().await;
        let data = self.load_user(user_id);
        Ok(data.conversations.get(conversation_id).cloned())
    }

    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_user(user_id);
        let removed = data.conversations.remove(conversation_id).is_some();
        if removed {
            self.save_user(&mut data)?;
            tracing::info!("Deleted conversation {conversation_id} for user {user_id}");
        }
        Ok(removed)
    }

    /// Remove the user's whole conversation file.
    pub async fn clear_user(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.user_file(user_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            tracing::info!("Cleared chat history for user {user_id}");
        }
        Ok(())
    }

    /// Messages of one conversation; with no id, the most recently updated one.
    pub async fn messages(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<Vec<Message>> {
        let _guard = self.lock.lock().await;
        let data = self.load_user(user_id);
        match conversation_id {
            Some(id) => Ok(data
                .conversations
                .get(id)
                .map(|c| c.messages.clone())
                .unwrap_or_default()),
            None => {
                let mut conversations: Vec<&Conversation> = data.conversations.values().collect();
                conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                Ok(conversations
                    .first()
                    .map(|c| c.messages.clone())
                    .unwrap_or_default())
            }
        }
    }

    /// Last few turns formatted as "Role: text" lines for the prompt.
    pub async fn prompt_history(&self, user_id: &str, conversation_id: &str) -> Result<String> {
        let messages = self.messages(user_id, Some(conversation_id)).await?;
        let start = messages.len().saturating_sub(MAX_PROMPT_HISTORY);
        Ok(messages[start..]
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ConversationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn turn_appends_and_persists() {
        let (store, _dir) = store();
        let id = store.create_conversation("alice").await.unwrap();
        store.append_turn("alice", &id, USER_ROLE, "hi").await.unwrap();
        store.append_turn("alice", &id, ASSISTANT_ROLE, "hello!").await.unwrap();

        let conversation = store.get_conversation("alice", &id).await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, USER_ROLE);
        assert_eq!(conversation.title, "hi");
    }

    #[tokio::test]
    async fn retains_only_last_fifty_messages() {
        let (store, _dir) = store();
        let id = store.create_conversation("bob").await.unwrap();
        for i in 0..60 {
            store
                .append_turn("bob", &id, USER_ROLE, &format!("message {i}"))
                .await
                .unwrap();
        }
        let conversation = store.get_conversation("bob", &id).await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 50);
        assert_eq!(conversation.messages[0].text, "message 10");
    }

    #[tokio::test]
    async fn prompt_history_keeps_last_five() {
        let (store, _dir) = store();
        let id = store.create_conversation("carol").await.unwrap();
        for i in 0..8 {
            store
                .append_turn("carol", &id, USER_ROLE, &format!("m{i}"))
                .await
                .unwrap();
        }
        let history = store.prompt_history("carol", &id).await.unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "User: m3");
        assert_eq!(lines[4], "User: m7");
    }

    #[tokio::test]
    async fn list_sorted_most_recent_first() {
        let (store, _dir) = store();
        let first = store.create_conversation("dora").await.unwrap();
        let second = store.create_conversation("dora").await.unwrap();
        store.append_turn("dora", &first, USER_ROLE, "newer activity").await.unwrap();

        let summaries = store.list_conversations("dora").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].conversation_id, first);
        assert_eq!(summaries[0].message_count, 1);
        let _ = second;
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let (store, _dir) = store();
        let id = store.create_conversation("eve").await.unwrap();
        assert!(store.delete_conversation("eve", &id).await.unwrap());
        assert!(!store.delete_conversation("eve", &id).await.unwrap());

        let id = store.create_conversation("eve").await.unwrap();
        store.clear_user("eve").await.unwrap();
        assert!(store.get_conversation("eve", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_conversation_yields_no_messages() {
        let (store, _dir) = store();
        let messages = store.messages("frank", Some("nope")).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn user_ids_cannot_escape_the_directory() {
        let (store, dir) = store();
        store
            .append_turn("../sneaky", "c1", USER_ROLE, "hi")
            .await
            .unwrap();
        // The file lands inside the store directory, not a parent.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
