//! The event-organizer account context behind the assistant's prompt.

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::organizations::{NewOrganization, Organization};
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct UpsertOrganizationRequest {
    pub name: String,
    #[serde(default)]
    pub data_json: Option<Value>,
}

/// GET /api/organization - The caller's organization, 404 when none exists
async fn get_organization(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Organization>, ApiError> {
    state
        .db
        .get_organization_for_user(user.id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// POST /api/organization - Create the organization, or update its name and
/// context blob if one already exists
async fn upsert_organization(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpsertOrganizationRequest>,
) -> Result<Json<Organization>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest);
    }
    let data_json = body.data_json.unwrap_or_else(|| json!({}));

    match state.db.get_organization_for_user(user.id)? {
        Some(existing) => {
            debug!("Updating organization {} for user {}", existing.id, user.id);
            state
                .db
                .update_organization(existing.id, user.id, &body.name, &data_json)?;
        }
        None => {
            debug!("Creating organization for user {}", user.id);
            state.db.create_organization(NewOrganization {
                id: Uuid::new_v4(),
                user_id: user.id,
                name: body.name.clone(),
                data_json,
            })?;
        }
    }

    state
        .db
        .get_organization_for_user(user.id)?
        .map(Json)
        .ok_or(ApiError::InternalServerError)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/organization", get(get_organization))
        .route("/api/organization", post(upsert_organization))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}
