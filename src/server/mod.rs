pub mod api;

use std::error::Error;
use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::conversation::ConversationManager;
use crate::speech::GoogleSpeechClient;
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConversationManager>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub speech: Arc<GoogleSpeechClient>,
    pub store: Arc<dyn ConversationStore>,
}

pub struct Server {
    addr: String,
    state: AppState,
}

impl Server {
    pub fn new(addr: String, state: AppState) -> Self {
        Self { addr, state }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.state.clone()).await
    }
}
