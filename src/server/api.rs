use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ State, Query },
    response::{ IntoResponse, Response },
    http::{ header, StatusCode },
};
use log::{ info, error };
use serde::Deserialize;
use std::error::Error;
use std::net::SocketAddr;
use tower_http::cors::{ Any, CorsLayer };

use crate::conversation::ChatError;
use super::AppState;

pub async fn start_http_server(
    addr: &str,
    state: AppState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/api/login", post(login_handler))
        .route("/api/createConversation", post(create_conversation_handler))
        .route("/api/message", post(message_handler))
        .route("/api/listConversations", get(list_conversations_handler))
        .route("/api/tts", get(tts_handler))
        .route("/api/stt", post(stt_handler))
        .layer(cors)
        .with_state(state);

    info!("HTTP server listening on: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn chat_error_response(err: ChatError) -> (StatusCode, String) {
    let status = match &err {
        // Missing records and gateway failures surface as 400s; clients
        // branch on the status class, not the body.
        ChatError::Validation(_) | ChatError::NotFound(_) | ChatError::Gateway(_) =>
            StatusCode::BAD_REQUEST,
        ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

async fn root_handler() -> StatusCode {
    StatusCode::OK
}

#[derive(Deserialize)]
struct LoginParams {
    credential: Option<String>,
}

async fn login_handler(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Response {
    let Some(credential) = params.credential.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Credential missing.").into_response();
    };

    let payload = match state.verifier.verify(&credential).await {
        Ok(payload) => payload,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    // The login answer does not depend on the profile write landing.
    if let Err(e) = state.store.upsert_user(&payload).await {
        error!("Failed to upsert user {}: {}", payload.sub, e);
    }

    Json(payload).into_response()
}

#[derive(Deserialize)]
struct CreateConversationParams {
    message: Option<String>,
    sub: Option<String>,
}

async fn create_conversation_handler(
    State(state): State<AppState>,
    Query(params): Query<CreateConversationParams>,
) -> Response {
    let Some(message) = params.message.filter(|m| !m.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"message\" parameter").into_response();
    };
    let Some(sub) = params.sub.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"sub\" parameter").into_response();
    };

    match state.manager.create(&sub, &message).await {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => {
            error!("createConversation failed: {}", e);
            chat_error_response(e).into_response()
        }
    }
}

#[derive(Deserialize)]
struct MessageParams {
    conversation: Option<String>,
    message: Option<String>,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(params): Query<MessageParams>,
) -> Response {
    let Some(conversation_id) = params.conversation.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"conversation\" parameter").into_response();
    };
    let Some(message) = params.message.filter(|m| !m.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"message\" parameter").into_response();
    };

    match state.manager.append_turn(&conversation_id, &message).await {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => {
            error!("message failed for conversation {}: {}", conversation_id, e);
            chat_error_response(e).into_response()
        }
    }
}

#[derive(Deserialize)]
struct ListConversationsParams {
    sub: Option<String>,
}

async fn list_conversations_handler(
    State(state): State<AppState>,
    Query(params): Query<ListConversationsParams>,
) -> Response {
    let Some(sub) = params.sub.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"sub\" parameter").into_response();
    };

    match state.manager.list_by_user(&sub).await {
        Ok(conversations) => Json(conversations).into_response(),
        Err(e) => {
            error!("listConversations failed: {}", e);
            chat_error_response(e).into_response()
        }
    }
}

#[derive(Deserialize)]
struct TtsParams {
    text: Option<String>,
}

async fn tts_handler(
    State(state): State<AppState>,
    Query(params): Query<TtsParams>,
) -> Response {
    let Some(text) = params.text.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing \"text\" parameter").into_response();
    };

    match state.speech.synthesize(&text).await {
        Ok(audio) => (
            [(header::CONTENT_TYPE, "audio/mpeg")],
            audio,
        ).into_response(),
        Err(e) => {
            error!("TTS synthesis failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "An error occurred at Google TTS.").into_response()
        }
    }
}

#[derive(Deserialize)]
struct SttRequest {
    #[serde(default, rename = "audioContent")]
    audio_content: Option<String>,
}

async fn stt_handler(
    State(state): State<AppState>,
    Json(body): Json<SttRequest>,
) -> Response {
    let Some(audio_content) = body.audio_content.filter(|a| !a.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing audio content.").into_response();
    };

    match state.speech.recognize(&audio_content).await {
        Ok(transcript) => transcript.into_response(),
        Err(e) => {
            error!("STT recognition failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "An error occurred at Google STT.").into_response()
        }
    }
}
