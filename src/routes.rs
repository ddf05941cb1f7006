use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::IllustratorError,
    models::{CharacterInput, DraftUpdate, IllustrationPrompt, PromptEdit, SessionField, SessionUpdate},
    orchestrator::Orchestrator,
    state::{Action, Session},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

type ApiResult<T> = Result<Json<T>, IllustratorError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(get_session).patch(update_session))
        .route("/api/session/:field", delete(clear_field))
        .route("/api/characters", post(add_character))
        .route("/api/characters/:id", put(update_character).delete(remove_character))
        .route("/api/characters/:id/edit", post(edit_character))
        .route("/api/draft", patch(update_draft))
        .route("/api/draft/submit", post(submit_draft))
        .route("/api/prompts/generate", post(generate_prompts))
        .route("/api/prompts/:id", patch(edit_prompt))
        .route("/api/prompts/:id/image", post(generate_image))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn get_session(State(state): State<AppState>) -> Json<Session> {
    Json(state.orchestrator.snapshot())
}

pub async fn update_session(State(state): State<AppState>, Json(body): Json<SessionUpdate>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::UpdateSession(body)).map(Json)
}

pub async fn clear_field(Path(field): Path<SessionField>, State(state): State<AppState>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::ClearField(field)).map(Json)
}

pub async fn add_character(State(state): State<AppState>, Json(body): Json<CharacterInput>) -> ApiResult<Session> {
    tracing::info!("👤 Adding character: {}", body.name);
    state.orchestrator
        .dispatch(Action::AddCharacter { name: body.name, description: body.description })
        .map(Json)
}

pub async fn update_character(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<CharacterInput>,
) -> ApiResult<Session> {
    state.orchestrator
        .dispatch(Action::UpdateCharacter { id, name: body.name, description: body.description })
        .map(Json)
}

pub async fn remove_character(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::RemoveCharacter(id)).map(Json)
}

pub async fn edit_character(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::EditCharacter(id)).map(Json)
}

pub async fn update_draft(State(state): State<AppState>, Json(body): Json<DraftUpdate>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::UpdateDraft(body)).map(Json)
}

pub async fn submit_draft(State(state): State<AppState>) -> ApiResult<Session> {
    state.orchestrator.dispatch(Action::SubmitDraft).map(Json)
}

/// Runs the whole batch before answering. The batch finishes even if the
/// client goes away.
pub async fn generate_prompts(State(state): State<AppState>) -> ApiResult<Session> {
    let ids = state.orchestrator.clone().run_batch().await?;
    tracing::info!("✅ Batch of {} prompts ready", ids.len());
    Ok(Json(state.orchestrator.snapshot()))
}

pub async fn edit_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<PromptEdit>,
) -> ApiResult<IllustrationPrompt> {
    state.orchestrator.dispatch(Action::EditPrompt { id, edit: body })?;
    state.orchestrator.prompt(id).map(Json).ok_or(IllustratorError::UnknownPrompt(id))
}

/// Image failures are reported on the returned item, not as an HTTP error.
pub async fn generate_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<IllustrationPrompt> {
    match state.orchestrator.clone().run_image(id).await {
        Ok(prompt) => Ok(Json(prompt)),
        Err(IllustratorError::UnknownPrompt(id)) => Err(IllustratorError::UnknownPrompt(id)),
        Err(_) => state.orchestrator.prompt(id).map(Json).ok_or(IllustratorError::UnknownPrompt(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{MemoryStore, Persistence},
        test_support::{FailingStore, ScriptedBackend},
    };
    use axum::{body::Body, http::{Request, StatusCode}};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(backend: Arc<ScriptedBackend>) -> (Router, Arc<Orchestrator>) {
        let persistence = Persistence::new(Arc::new(MemoryStore::default()));
        let session = persistence.restore().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(session, backend, persistence, String::new()));
        (router(AppState { orchestrator: orchestrator.clone() }), orchestrator)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn session_patch_and_clear() {
        let (app, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, body) = call(&app, "PATCH", "/api/session", Some(json!({"story": "Night falls", "numIllustrations": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["story"], "Night falls");
        assert_eq!(body["numIllustrations"], 2);
        assert_eq!(body["style"], "fantasy art, vibrant colors");

        let (status, body) = call(&app, "DELETE", "/api/session/numIllustrations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["numIllustrations"], 1);
    }

    #[tokio::test]
    async fn zero_count_is_bad_request() {
        let (app, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, body) = call(&app, "PATCH", "/api/session", Some(json!({"numIllustrations": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please request at least one illustration.");
    }

    #[tokio::test]
    async fn character_lifecycle_over_http() {
        let (app, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, body) = call(&app, "POST", "/api/characters", Some(json!({"name": "Mira", "description": "fox"}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["characters"][0]["id"].as_str().unwrap().to_string();

        let (_, body) = call(&app, "POST", &format!("/api/characters/{id}/edit"), None).await;
        assert_eq!(body["draft"]["name"], "Mira");
        assert_eq!(body["draft"]["editingId"], id.as_str());

        let (_, body) = call(&app, "PATCH", "/api/draft", Some(json!({"description": "silver fox"}))).await;
        assert_eq!(body["draft"]["description"], "silver fox");

        let (_, body) = call(&app, "POST", "/api/draft/submit", None).await;
        assert_eq!(body["characters"][0]["description"], "silver fox");
        assert_eq!(body["characters"][0]["id"], id.as_str());
        assert_eq!(body["message"], "Character updated successfully!");

        let (_, body) = call(&app, "DELETE", &format!("/api/characters/{id}"), None).await;
        assert_eq!(body["characters"], json!([]));
    }

    #[tokio::test]
    async fn blank_character_is_bad_request() {
        let (app, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, _) = call(&app, "POST", "/api/characters", Some(json!({"name": "", "description": "fox"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_batch_then_regenerate_one_item() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_prompts(Ok(vec!["A".into()]));
        backend.push_images(Err(IllustratorError::NoImageData));
        backend.push_images(Ok(vec!["data:image/png;base64,AAA".into()]));
        let (app, _) = app(backend);
        call(&app, "PATCH", "/api/session", Some(json!({"story": "Night falls", "numIllustrations": 1}))).await;

        let (status, body) = call(&app, "POST", "/api/prompts/generate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prompts"][0]["error"], "No image data received.");
        let id = body["prompts"][0]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "POST", &format!("/api/prompts/{id}/image"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imageUrls"], json!(["data:image/png;base64,AAA"]));
        assert_eq!(body["isLoading"], false);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn failed_prompt_generation_is_bad_gateway() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_prompts(Err(IllustratorError::Remote("API key not valid.".into())));
        let (app, orchestrator) = app(backend);
        call(&app, "PATCH", "/api/session", Some(json!({"story": "Night falls"}))).await;

        let (status, body) = call(&app, "POST", "/api/prompts/generate", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "API error: API key not valid.");
        assert_eq!(
            orchestrator.snapshot().prompt_error.as_deref(),
            Some("Failed to generate prompts: API error: API key not valid.")
        );
    }

    #[tokio::test]
    async fn unknown_prompt_is_not_found() {
        let (app, _) = app(Arc::new(ScriptedBackend::new()));
        let uri = format!("/api/prompts/{}/image", Uuid::new_v4());
        let (status, _) = call(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/prompts/{}", Uuid::new_v4());
        let (status, _) = call(&app, "PATCH", &uri, Some(json!({"promptText": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_write_is_a_server_error() {
        let persistence = Persistence::new(Arc::new(FailingStore));
        let orchestrator = Arc::new(Orchestrator::new(Session::default(), Arc::new(ScriptedBackend::new()), persistence, String::new()));
        let app = router(AppState { orchestrator: orchestrator.clone() });

        let (status, body) = call(&app, "PATCH", "/api/session", Some(json!({"story": "unsaved"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Storage error:"));
        assert_eq!(orchestrator.snapshot().config.story, "unsaved");
    }
}
