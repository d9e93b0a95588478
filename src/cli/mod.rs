use clap::Parser;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful friend who is dealing with the user for a mental health application. \
You are giving them advice on how to feel better and seek treatment. Speak as if you can \
relate to the user. Offer advice to their situation and give them calls for action. \
Respond with 10-30 words. ";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Conversation Store Args ---
    /// Conversation store type (redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "redis")]
    pub store_type: String,

    /// Conversation store endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_URL", default_value = "redis://127.0.0.1:6379")]
    pub store_url: String,

    /// Prefix for conversation store keys.
    #[arg(long, env = "STORE_KEY_PREFIX", default_value = "solace:")]
    pub store_key_prefix: String,

    // --- Chat LLM Provider Args ---
    /// API Key for the chat completion provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Base URL for the chat completion endpoint
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let the adapter handle it if None
    pub chat_base_url: Option<String>,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-3.5-turbo-16k-0613")]
    pub chat_model: String,

    /// Per-request timeout for chat completion calls, in seconds.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "30")]
    pub chat_timeout_secs: u64,

    /// System instruction prepended to every chat completion call. Never persisted.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    // --- Google Identity / Speech Args ---
    /// OAuth client ID expected as the audience of login credentials.
    #[arg(long, env = "GOOGLE_CLIENT_ID", default_value = "")]
    pub google_client_id: String,

    /// Path to the Google service account key used for speech API calls.
    #[arg(long, env = "GOOGLE_SA_KEY_PATH", default_value = "service-account.json")]
    pub google_sa_key_path: String,

    // --- General App Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8080")]
    pub server_addr: String,
}
