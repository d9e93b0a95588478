use async_trait::async_trait;
use std::fmt;

use crate::cli::Args;
use crate::models::auth::IdentityPayload;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug)]
pub enum AuthError {
    InvalidToken(String),
    /// The token was issued for a different OAuth client.
    AudienceMismatch,
    Http(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidToken(msg) => write!(f, "Invalid identity token: {}", msg),
            AuthError::AudienceMismatch =>
                write!(f, "Identity token audience does not match this application"),
            AuthError::Http(msg) => write!(f, "Identity verification request failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Verifies a third-party identity token and yields the claims it carries.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<IdentityPayload, AuthError>;
}

pub struct GoogleIdentityVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleIdentityVerifier {
    pub fn new(client_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.google_client_id.clone())
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<IdentityPayload, AuthError> {
        let resp = self.http
            .get(TOKENINFO_URL)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(AuthError::InvalidToken(detail));
        }

        let payload = resp
            .json::<IdentityPayload>()
            .await
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if payload.sub.is_empty() {
            return Err(AuthError::InvalidToken("No subject in token payload".to_string()));
        }
        if payload.aud.as_deref() != Some(self.client_id.as_str()) {
            return Err(AuthError::AudienceMismatch);
        }

        Ok(payload)
    }
}
