use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ ConversationStore, StoreError };
use crate::models::auth::IdentityPayload;
use crate::models::chat::Conversation;

/// In-process store for local runs and tests. Same contract as the Redis
/// backend, nothing survives a restart.
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    users: RwLock<HashMap<String, IdentityPayload>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(StoreError::Conflict(
                format!("Conversation id already exists: {}", conversation.id)
            ));
        }
        conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn replace(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(&conversation.id) {
            return Err(StoreError::Conflict(
                format!("No conversation to replace for id: {}", conversation.id)
            ));
        }
        conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(
            conversations
                .values()
                .filter(|conversation| conversation.user_id == user_id)
                .cloned()
                .collect()
        )
    }

    async fn upsert_user(&self, payload: &IdentityPayload) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        users.insert(payload.sub.clone(), payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatMessage, Role };

    fn conversation(id: &str, user_id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            user_id: user_id.to_string(),
            messages: vec![
                ChatMessage::new(Role::User, "hello"),
                ChatMessage::new(Role::Assistant, "hi there")
            ],
            last_timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = MemoryConversationStore::new();
        store.insert(&conversation("c1", "user1")).await.unwrap();

        let err = store.insert(&conversation("c1", "user1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn replace_requires_existing_record() {
        let store = MemoryConversationStore::new();
        let err = store.replace(&conversation("missing", "user1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.insert(&conversation("c1", "user1")).await.unwrap();
        let mut updated = conversation("c1", "user1");
        updated.last_timestamp = 1_700_000_999;
        store.replace(&updated).await.unwrap();

        let found = store.find("c1").await.unwrap().unwrap();
        assert_eq!(found.last_timestamp, 1_700_000_999);
    }

    #[tokio::test]
    async fn list_by_user_filters_on_owner() {
        let store = MemoryConversationStore::new();
        store.insert(&conversation("c1", "user1")).await.unwrap();
        store.insert(&conversation("c2", "user2")).await.unwrap();
        store.insert(&conversation("c3", "user1")).await.unwrap();

        let mut ids: Vec<String> = store
            .list_by_user("user1").await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "c3"]);

        assert!(store.list_by_user("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_user_is_stable_without_writes() {
        let store = MemoryConversationStore::new();
        store.insert(&conversation("c1", "user1")).await.unwrap();

        let first: Vec<String> = store
            .list_by_user("user1").await.unwrap()
            .into_iter().map(|c| c.id).collect();
        let second: Vec<String> = store
            .list_by_user("user1").await.unwrap()
            .into_iter().map(|c| c.id).collect();
        assert_eq!(first, second);
    }
}
