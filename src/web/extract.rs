//! Extraction of structured metrics from connected API payloads.

use axum::{
    extract::State, middleware::from_fn_with_state, routing::post, Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::generate_text;
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

const EXTRACT_INSTRUCTION: &str = "Extract exactly the fields per categories Visitor, Revenue, and Rating from this data API. Respond with a JSON object only, with numeric values. with summarize text too. ";

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub text: String,
}

/// POST /api/extract-api - Run the extraction prompt over connected API data
async fn extract_api(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    debug!("Running API extraction for user {}", user.id);

    let prompt = format!("{}{}", EXTRACT_INSTRUCTION, body.prompt);
    let text = generate_text(&state.llm, "You are a helpful assistant", &prompt).await?;

    // Cache the analysis on the organization blob so the settings page can
    // show it again without re-running the model. Best-effort: the caller
    // gets the text regardless.
    if let Err(e) = save_analysis(&state, user, &text) {
        warn!("Failed to cache API analysis for user {}: {:?}", user.id, e);
    }

    Ok(Json(ExtractResponse { text }))
}

fn save_analysis(
    state: &Arc<AppState>,
    user: AuthUser,
    text: &str,
) -> Result<(), crate::DBError> {
    let Some(organization) = state.db.get_organization_for_user(user.id)? else {
        return Ok(());
    };

    let summary = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("summary").and_then(|s| s.as_str()).map(String::from));

    let analysis = json!({
        "summary": summary,
        "result": text,
        "analyzedAt": Utc::now(),
    });

    state
        .db
        .merge_organization_data(organization.id, user.id, "apiAnalysis", analysis)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/extract-api",
            post(extract_api).layer(from_fn_with_state(state.clone(), require_user)),
        )
        .with_state(state)
}
