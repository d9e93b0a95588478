pub mod auth;
pub mod cli;
pub mod conversation;
pub mod llm;
pub mod models;
pub mod server;
pub mod speech;
pub mod store;

use auth::{ GoogleIdentityVerifier, IdentityVerifier };
use cli::Args;
use conversation::ConversationManager;
use llm::new_chat_client;
use log::info;
use server::{ AppState, Server };
use speech::GoogleSpeechClient;
use std::error::Error;
use std::sync::Arc;
use store::initialize_conversation_store;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Conversation Store Type: {}", args.store_type);
    info!("Conversation Store URL: {}", args.store_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Timeout: {}s", args.chat_timeout_secs);
    info!("Google SA Key Path: {}", args.google_sa_key_path);
    info!("-------------------------");

    let chat_client = new_chat_client(&args)?;
    let store = initialize_conversation_store(&args)?;
    let manager = Arc::new(ConversationManager::new(
        chat_client,
        store.clone(),
        args.system_prompt.clone(),
    ));
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(GoogleIdentityVerifier::from_args(&args));
    let speech = Arc::new(GoogleSpeechClient::from_args(&args));

    let state = AppState {
        manager,
        verifier,
        speech,
        store,
    };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state);
    server.run().await?;

    Ok(())
}
