use async_trait::async_trait;
use log::error;
use redis::{ AsyncCommands, Client };

use super::{ ConversationStore, StoreError };
use crate::cli::Args;
use crate::models::auth::IdentityPayload;
use crate::models::chat::Conversation;

/// Redis layout: the record itself lives at `{prefix}conversation:{id}` as a
/// JSON blob, and `{prefix}user:{user_id}:conversations` is a set of ids
/// used to answer listings without scanning the keyspace.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(args: &Args) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(args.store_url.as_str())?,
            key_prefix: args.store_key_prefix.clone(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn conversation_key(&self, conversation_id: &str) -> String {
        format!("{}conversation:{}", self.key_prefix, conversation_id)
    }

    fn user_index_key(&self, user_id: &str) -> String {
        format!("{}user:{}:conversations", self.key_prefix, user_id)
    }

    fn user_key(&self, sub: &str) -> String {
        format!("{}user:{}", self.key_prefix, sub)
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.conversation_key(&conversation.id);
        let json = serde_json::to_string(conversation)?;

        let created: bool = conn.set_nx(&key, &json).await?;
        if !created {
            return Err(StoreError::Conflict(
                format!("Conversation id already exists: {}", conversation.id)
            ));
        }

        let _: i64 = conn
            .sadd(self.user_index_key(&conversation.user_id), &conversation.id)
            .await?;
        Ok(())
    }

    async fn replace(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.conversation_key(&conversation.id);
        let json = serde_json::to_string(conversation)?;

        // SET XX: only overwrite an existing record, never resurrect one.
        let updated: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if updated.is_none() {
            return Err(StoreError::Conflict(
                format!("No conversation to replace for id: {}", conversation.id)
            ));
        }
        Ok(())
    }

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(self.conversation_key(conversation_id)).await?;

        match json {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.smembers(self.user_index_key(user_id)).await?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in &ids {
            let json: Option<String> = conn.get(self.conversation_key(id)).await?;
            match json {
                Some(raw) => match serde_json::from_str::<Conversation>(&raw) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => {
                        error!("Error parsing stored conversation {}: {}", id, e);
                    }
                },
                None => {
                    error!("Indexed conversation {} has no record", id);
                }
            }
        }

        Ok(conversations)
    }

    async fn upsert_user(&self, payload: &IdentityPayload) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(payload)?;
        let _: () = conn.set(self.user_key(&payload.sub), &json).await?;
        Ok(())
    }
}
