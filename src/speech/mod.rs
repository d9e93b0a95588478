use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::AUTHORIZATION;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::path::Path;
use yup_oauth2::{ ServiceAccountAuthenticator, read_service_account_key };

use crate::cli::Args;

const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const STT_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";
const API_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const LANGUAGE_CODE: &str = "en-US";
const SSML_GENDER: &str = "NEUTRAL";
const AUDIO_ENCODING: &str = "MP3";
const SAMPLE_RATE_HERTZ: u32 = 16000;

#[derive(Debug)]
pub enum SpeechError {
    Auth(String),
    Http(String),
    InvalidResponse(String),
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechError::Auth(msg) => write!(f, "Speech API authentication failed: {}", msg),
            SpeechError::Http(msg) => write!(f, "Speech API request failed: {}", msg),
            SpeechError::InvalidResponse(msg) =>
                write!(f, "Speech API response was malformed: {}", msg),
        }
    }
}

impl std::error::Error for SpeechError {}

#[derive(Serialize)]
struct SynthesizeRequest {
    input: SynthesisInput,
    voice: VoiceSelection,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput {
    text: String,
}

#[derive(Serialize)]
struct VoiceSelection {
    #[serde(rename = "languageCode")]
    language_code: &'static str,
    #[serde(rename = "ssmlGender")]
    ssml_gender: &'static str,
}

#[derive(Serialize)]
struct AudioConfig {
    #[serde(rename = "audioEncoding")]
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

#[derive(Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
struct RecognitionConfig {
    encoding: &'static str,
    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,
    #[serde(rename = "languageCode")]
    language_code: &'static str,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Deserialize, Default)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Deserialize)]
struct RecognitionAlternative {
    transcript: String,
}

/// Stateless proxy to Google Cloud Text-to-Speech and Speech-to-Text.
pub struct GoogleSpeechClient {
    http: reqwest::Client,
    sa_key_path: String,
}

impl GoogleSpeechClient {
    pub fn new(sa_key_path: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            sa_key_path,
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.google_sa_key_path.clone())
    }

    async fn get_access_token(&self) -> Result<String, SpeechError> {
        let key = read_service_account_key(Path::new(&self.sa_key_path))
            .await
            .map_err(|e| SpeechError::Auth(
                format!("Failed to load SA key from {}: {}", self.sa_key_path, e)
            ))?;

        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| SpeechError::Auth(e.to_string()))?;

        let token = auth
            .token(&[API_SCOPE])
            .await
            .map_err(|e| SpeechError::Auth(e.to_string()))?;

        token.token()
            .ok_or_else(|| SpeechError::Auth("OAuth token was None".to_string()))
            .map(|t| t.to_string())
    }

    /// Render `text` as MP3 audio bytes.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let token = self.get_access_token().await?;
        let req = SynthesizeRequest {
            input: SynthesisInput { text: text.to_string() },
            voice: VoiceSelection {
                language_code: LANGUAGE_CODE,
                ssml_gender: SSML_GENDER,
            },
            audio_config: AudioConfig { audio_encoding: AUDIO_ENCODING },
        };

        let resp = self.http
            .post(TTS_URL)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(&req)
            .send()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                let body = resp
                    .json::<SynthesizeResponse>()
                    .await
                    .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
                BASE64.decode(body.audio_content)
                    .map_err(|e| SpeechError::InvalidResponse(
                        format!("audioContent was not valid base64: {}", e)
                    ))
            }
            s => {
                let err_body = resp.text().await.unwrap_or_default();
                Err(SpeechError::Http(format!("Unexpected status {}: {}", s, err_body)))
            }
        }
    }

    /// Transcribe base64-encoded MP3 audio. One line per recognized segment.
    pub async fn recognize(&self, audio_content: &str) -> Result<String, SpeechError> {
        let token = self.get_access_token().await?;
        let req = RecognizeRequest {
            config: RecognitionConfig {
                encoding: AUDIO_ENCODING,
                sample_rate_hertz: SAMPLE_RATE_HERTZ,
                language_code: LANGUAGE_CODE,
            },
            audio: RecognitionAudio { content: audio_content.to_string() },
        };

        let resp = self.http
            .post(STT_URL)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(&req)
            .send()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                let body = resp
                    .json::<RecognizeResponse>()
                    .await
                    .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
                Ok(join_transcripts(&body))
            }
            s => {
                let err_body = resp.text().await.unwrap_or_default();
                Err(SpeechError::Http(format!("Unexpected status {}: {}", s, err_body)))
            }
        }
    }
}

fn join_transcripts(response: &RecognizeResponse) -> String {
    response.results
        .iter()
        .filter_map(|result| result.alternatives.first())
        .map(|alt| alt.transcript.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_request_matches_api_shape() {
        let req = SynthesizeRequest {
            input: SynthesisInput { text: "hello".to_string() },
            voice: VoiceSelection {
                language_code: LANGUAGE_CODE,
                ssml_gender: SSML_GENDER,
            },
            audio_config: AudioConfig { audio_encoding: AUDIO_ENCODING },
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["input"]["text"], "hello");
        assert_eq!(value["voice"]["languageCode"], "en-US");
        assert_eq!(value["voice"]["ssmlGender"], "NEUTRAL");
        assert_eq!(value["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn recognize_request_matches_api_shape() {
        let req = RecognizeRequest {
            config: RecognitionConfig {
                encoding: AUDIO_ENCODING,
                sample_rate_hertz: SAMPLE_RATE_HERTZ,
                language_code: LANGUAGE_CODE,
            },
            audio: RecognitionAudio { content: "c29tZSBhdWRpbw==".to_string() },
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["config"]["encoding"], "MP3");
        assert_eq!(value["config"]["sampleRateHertz"], 16000);
        assert_eq!(value["config"]["languageCode"], "en-US");
        assert_eq!(value["audio"]["content"], "c29tZSBhdWRpbw==");
    }

    #[test]
    fn transcripts_join_first_alternatives_with_newlines() {
        let body = r#"{
            "results": [
                {"alternatives": [{"transcript": "first segment"}, {"transcript": "worse guess"}]},
                {"alternatives": [{"transcript": "second segment"}]},
                {"alternatives": []}
            ]
        }"#;
        let resp: RecognizeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(join_transcripts(&resp), "first segment\nsecond segment");
    }

    #[test]
    fn empty_recognition_yields_empty_transcript() {
        let resp: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(join_transcripts(&resp), "");
    }
}
