mod memory;
mod redis;

use async_trait::async_trait;
use log::info;
use std::fmt;
use std::sync::Arc;

use crate::cli::Args;
use crate::models::auth::IdentityPayload;
use crate::models::chat::Conversation;

#[derive(Debug)]
pub enum StoreError {
    /// Insert hit an existing id, or replace found no record to overwrite.
    Conflict(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(msg) => write!(f, "Store conflict: {}", msg),
            StoreError::Backend(msg) => write!(f, "Store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Durable keyed storage of conversation records. Records are written
/// wholesale; there is no partial update.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a brand-new conversation. Fails if the id already exists.
    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Overwrite an existing conversation keyed by its id. Fails if the
    /// record is missing.
    async fn replace(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Every conversation owned by `user_id`, in storage-native order.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError>;

    /// Insert-or-overwrite the verified identity payload, keyed by `sub`.
    async fn upsert_user(&self, payload: &IdentityPayload) -> Result<(), StoreError>;
}

pub fn create_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => {
            let store = redis::RedisConversationStore::new(args)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(memory::MemoryConversationStore::new())),
        other => Err(StoreError::Backend(
            format!("Unsupported conversation store type: {}", other)
        )),
    }
}

pub fn initialize_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, StoreError> {
    info!("Conversations will be stored in: {} at {}", args.store_type, args.store_url);
    create_conversation_store(args)
}

#[cfg(test)]
pub use memory::MemoryConversationStore;
