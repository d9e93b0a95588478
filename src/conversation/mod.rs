use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::llm::{ ChatClient, GatewayError };
use crate::models::chat::{ ChatMessage, Conversation, Role };
use crate::store::{ ConversationStore, StoreError };

#[derive(Debug)]
pub enum ChatError {
    Validation(String),
    NotFound(String),
    Gateway(GatewayError),
    Store(StoreError),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Validation(msg) => write!(f, "{}", msg),
            ChatError::NotFound(id) => write!(f, "Failed to find conversation by ID: {}", id),
            ChatError::Gateway(e) => write!(f, "An error occurred in relation to the chat provider: {}", e),
            ChatError::Store(e) => write!(f, "Conversation store failure: {}", e),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Gateway(e) => Some(e),
            ChatError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GatewayError> for ChatError {
    fn from(err: GatewayError) -> Self {
        ChatError::Gateway(err)
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Store(err)
    }
}

/// Owns conversation lifecycle: creation, turn appending, history
/// reconstruction for completion calls, and the write-back of updated
/// records. The system prompt is reissued on every completion call and is
/// never part of the persisted history.
pub struct ConversationManager {
    chat_client: Arc<dyn ChatClient>,
    store: Arc<dyn ConversationStore>,
    system_prompt: String,
    // One guard per conversation id. An append holds its guard across the
    // whole read, completion, write chain so concurrent appends to the same
    // conversation cannot clobber each other.
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        store: Arc<dyn ConversationStore>,
        system_prompt: String,
    ) -> Self {
        Self {
            chat_client,
            store,
            system_prompt,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    fn system_message(&self) -> ChatMessage {
        ChatMessage::new(Role::System, self.system_prompt.clone())
    }

    async fn turn_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a new conversation from the user's first message. The record is
    /// only persisted once the completion call has succeeded.
    pub async fn create(
        &self,
        user_id: &str,
        initial_message: &str,
    ) -> Result<Conversation, ChatError> {
        if user_id.is_empty() {
            return Err(ChatError::Validation("User id must not be empty".to_string()));
        }
        if initial_message.is_empty() {
            return Err(ChatError::Validation("Message must not be empty".to_string()));
        }

        let prompt_messages = vec![
            self.system_message(),
            ChatMessage::new(Role::User, initial_message)
        ];
        let reply = self.chat_client.complete(&prompt_messages).await?;

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            messages: vec![
                ChatMessage::new(Role::User, initial_message),
                ChatMessage::new(Role::Assistant, reply)
            ],
            last_timestamp: Utc::now().timestamp(),
        };

        self.store.insert(&conversation).await?;
        info!("Created conversation {} for user {}", conversation.id, conversation.user_id);
        Ok(conversation)
    }

    /// Append one user turn and its assistant reply to an existing
    /// conversation. The completion call sees the entire persisted history
    /// behind a fresh system prompt; on success the whole record is
    /// rewritten with the new pair and timestamp.
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<Conversation, ChatError> {
        if conversation_id.is_empty() {
            return Err(ChatError::Validation("Conversation id must not be empty".to_string()));
        }
        if user_message.is_empty() {
            return Err(ChatError::Validation("Message must not be empty".to_string()));
        }

        let lock = self.turn_lock(conversation_id).await;
        let _guard = lock.lock().await;

        let mut conversation = self.store
            .find(conversation_id).await?
            .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;

        let mut prompt_messages = Vec::with_capacity(conversation.messages.len() + 2);
        prompt_messages.push(self.system_message());
        prompt_messages.extend(conversation.messages.iter().cloned());
        prompt_messages.push(ChatMessage::new(Role::User, user_message));

        let reply = self.chat_client.complete(&prompt_messages).await?;

        conversation.messages.push(ChatMessage::new(Role::User, user_message));
        conversation.messages.push(ChatMessage::new(Role::Assistant, reply));
        conversation.last_timestamp = Utc::now().timestamp();

        self.store.replace(&conversation).await?;
        Ok(conversation)
    }

    /// Every conversation owned by `user_id`. Empty is a normal answer, not
    /// an error; callers must not depend on ordering.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        if user_id.is_empty() {
            return Err(ChatError::Validation("User id must not be empty".to_string()));
        }
        Ok(self.store.list_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    use crate::store::MemoryConversationStore;

    struct ScriptedChatClient {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedChatClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChatClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GatewayError> {
            // Yield so concurrent callers interleave if nothing serializes them.
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.replies
                .lock().await
                .pop_front()
                .ok_or(GatewayError::EmptyResponse)
        }
    }

    struct FailingChatClient;

    #[async_trait]
    impl ChatClient for FailingChatClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GatewayError> {
            Err(GatewayError::Http("connection refused".to_string()))
        }
    }

    struct RecordingChatClient {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChatClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GatewayError> {
            self.calls.lock().await.push(messages.to_vec());
            Ok("ok".to_string())
        }
    }

    fn manager(
        chat_client: Arc<dyn ChatClient>,
        store: Arc<MemoryConversationStore>,
    ) -> ConversationManager {
        ConversationManager::new(chat_client, store, "stay calm and be kind".to_string())
    }

    #[tokio::test]
    async fn create_persists_one_user_assistant_pair() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(ScriptedChatClient::new(&["Try deep breathing."]), store.clone());

        let conversation = manager.create("user1", "I feel anxious").await.unwrap();

        assert_eq!(conversation.user_id, "user1");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(
            conversation.messages[0],
            ChatMessage::new(Role::User, "I feel anxious")
        );
        assert_eq!(
            conversation.messages[1],
            ChatMessage::new(Role::Assistant, "Try deep breathing.")
        );

        let stored = store.find(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.messages, conversation.messages);
    }

    #[tokio::test]
    async fn create_rejects_empty_inputs_before_any_call() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(ScriptedChatClient::new(&["unused"]), store.clone());

        let err = manager.create("", "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let err = manager.create("user1", "").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        assert!(store.list_by_user("user1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_during_create_persists_nothing() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(Arc::new(FailingChatClient), store.clone());

        let err = manager.create("user1", "I feel anxious").await.unwrap_err();
        assert!(matches!(err, ChatError::Gateway(_)));
        assert!(store.list_by_user("user1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_extends_history_without_rewriting_it() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(
            ScriptedChatClient::new(&["Try deep breathing.", "Let's try grounding."]),
            store.clone(),
        );

        let created = manager.create("user1", "I feel anxious").await.unwrap();
        let updated = manager.append_turn(&created.id, "It's not working").await.unwrap();

        assert_eq!(updated.messages.len(), 4);
        assert_eq!(&updated.messages[..2], &created.messages[..]);
        assert_eq!(
            updated.messages[3],
            ChatMessage::new(Role::Assistant, "Let's try grounding.")
        );
        assert!(updated.last_timestamp >= created.last_timestamp);

        let stored = store.find(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 4);
    }

    #[tokio::test]
    async fn append_on_unknown_id_is_not_found_and_creates_nothing() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(ScriptedChatClient::new(&["unused"]), store.clone());

        let err = manager.append_turn("nonexistent-id", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert!(store.find("nonexistent-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gateway_failure_during_append_leaves_record_untouched() {
        let store = Arc::new(MemoryConversationStore::new());
        let created = manager(ScriptedChatClient::new(&["Try deep breathing."]), store.clone())
            .create("user1", "I feel anxious").await
            .unwrap();

        let failing = manager(Arc::new(FailingChatClient), store.clone());
        let err = failing.append_turn(&created.id, "more").await.unwrap_err();
        assert!(matches!(err, ChatError::Gateway(_)));

        let stored = store.find(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.messages, created.messages);
        assert_eq!(stored.last_timestamp, created.last_timestamp);
    }

    #[tokio::test]
    async fn completion_sees_full_history_behind_a_fresh_system_prompt() {
        let store = Arc::new(MemoryConversationStore::new());
        let recorder = Arc::new(RecordingChatClient { calls: Mutex::new(Vec::new()) });
        let manager = manager(recorder.clone(), store.clone());

        let created = manager.create("user1", "first").await.unwrap();
        manager.append_turn(&created.id, "second").await.unwrap();

        let calls = recorder.calls.lock().await;
        assert_eq!(calls.len(), 2);

        assert_eq!(calls[0][0].role, Role::System);
        assert_eq!(calls[0][0].content, "stay calm and be kind");
        assert_eq!(calls[0].len(), 2);

        assert_eq!(calls[1][0].role, Role::System);
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[1][1], ChatMessage::new(Role::User, "first"));
        assert_eq!(calls[1][2], ChatMessage::new(Role::Assistant, "ok"));
        assert_eq!(calls[1][3], ChatMessage::new(Role::User, "second"));

        // The persisted record never carries the system prompt.
        let stored = store.find(&created.id).await.unwrap().unwrap();
        assert!(stored.messages.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn sequential_creates_use_distinct_ids() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(ScriptedChatClient::new(&["a", "b"]), store.clone());

        let first = manager.create("user1", "one").await.unwrap();
        let second = manager.create("user1", "two").await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list_by_user("user1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_conversation_both_land() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = Arc::new(manager(
            ScriptedChatClient::new(&["start", "reply one", "reply two"]),
            store.clone(),
        ));

        let created = manager.create("user1", "I feel anxious").await.unwrap();

        let (a, b) = {
            let m1 = manager.clone();
            let m2 = manager.clone();
            let id1 = created.id.clone();
            let id2 = created.id.clone();
            tokio::join!(
                tokio::spawn(async move { m1.append_turn(&id1, "turn A").await }),
                tokio::spawn(async move { m2.append_turn(&id2, "turn B").await })
            )
        };
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let stored = store.find(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 6);
        let user_contents: Vec<&str> = stored.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert!(user_contents.contains(&"turn A"));
        assert!(user_contents.contains(&"turn B"));
    }

    #[tokio::test]
    async fn list_by_user_returns_only_that_users_conversations() {
        let store = Arc::new(MemoryConversationStore::new());
        let manager = manager(ScriptedChatClient::new(&["a", "b", "c"]), store.clone());

        manager.create("user1", "one").await.unwrap();
        manager.create("user2", "two").await.unwrap();
        manager.create("user1", "three").await.unwrap();

        let listed = manager.list_by_user("user1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.user_id == "user1"));

        assert!(manager.list_by_user("unknown").await.unwrap().is_empty());
    }
}
