use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{ ChatClient, GatewayError };
use crate::cli::Args;
use crate::models::chat::ChatMessage;

// Replies are spoken aloud by the client; keep them short and near-deterministic.
const TEMPERATURE: f32 = 0.05;
const MAX_TOKENS: u32 = 200;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let api_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| GatewayError::Http(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            http,
            model,
            base_url: api_url,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, GatewayError> {
        Self::new(
            args.chat_api_key.clone(),
            args.chat_model.clone(),
            args.chat_base_url.clone(),
            Duration::from_secs(args.chat_timeout_secs),
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GatewayError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self.http.post(&self.base_url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() { GatewayError::Timeout } else { GatewayError::Http(e.to_string()) }
            })?
            .error_for_status()
            .map_err(|e| GatewayError::Http(e.to_string()))?
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::InvalidResponse(e.to_string())
                }
            })?;

        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(GatewayError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn request_serializes_roles_lowercase() {
        let messages = vec![
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::User, "hello"),
        ];
        let req = OpenAIChatRequest {
            model: "gpt-3.5-turbo-16k-0613",
            messages: &messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo-16k-0613");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "hello");
        assert_eq!(value["max_tokens"], 200);
    }

    #[test]
    fn response_parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Try deep breathing."}}]}"#;
        let resp: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.choices[0].message.content, "Try deep breathing.");
    }
}
