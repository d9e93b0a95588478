pub mod openai;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::cli::Args;
use crate::models::chat::ChatMessage;
use self::openai::OpenAIChatClient;

#[derive(Debug)]
pub enum GatewayError {
    /// The completion call did not finish within the configured deadline.
    Timeout,
    Http(String),
    EmptyResponse,
    InvalidResponse(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Timeout => write!(f, "Chat completion request timed out"),
            GatewayError::Http(msg) => write!(f, "Chat completion request failed: {}", msg),
            GatewayError::EmptyResponse => write!(f, "Chat completion returned no choices"),
            GatewayError::InvalidResponse(msg) =>
                write!(f, "Chat completion response was malformed: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Stateless adapter to an external completion service: given an ordered
/// message list, returns exactly one assistant reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GatewayError>;
}

pub fn new_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, GatewayError> {
    let client = OpenAIChatClient::from_args(args)?;
    Ok(Arc::new(client))
}
