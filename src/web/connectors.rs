//! External API connector configuration and the data probe behind the
//! settings page.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::models::connectors::{ApiConnector, NewApiConnector};
use crate::models::organizations::Organization;
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ConnectorRequest {
    pub api_name: String,
    pub api_link: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// One successful probe of a configured endpoint.
#[derive(Debug, Serialize)]
pub struct ConnectorData {
    pub url: String,
    pub data: Value,
}

fn organization_for(
    state: &Arc<AppState>,
    user: AuthUser,
) -> Result<Organization, ApiError> {
    state
        .db
        .get_organization_for_user(user.id)?
        .ok_or(ApiError::OrganizationDataRequired)
}

fn validate_link(link: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(link).map_err(|_| ApiError::BadRequest)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::BadRequest);
    }
    Ok(())
}

/// GET /api/connectors - The organization's configured endpoints
async fn list_connectors(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ApiConnector>>, ApiError> {
    let organization = organization_for(&state, user)?;
    let connectors = state.db.list_connectors(organization.id)?;
    Ok(Json(connectors))
}

/// POST /api/connectors - Add an endpoint
async fn create_connector(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ConnectorRequest>,
) -> Result<Json<ApiConnector>, ApiError> {
    if body.api_name.trim().is_empty() {
        return Err(ApiError::BadRequest);
    }
    validate_link(&body.api_link)?;

    let organization = organization_for(&state, user)?;
    let connector = state.db.create_connector(NewApiConnector {
        id: Uuid::new_v4(),
        organization_id: organization.id,
        api_name: body.api_name,
        api_link: body.api_link,
        api_key: body.api_key.filter(|k| !k.is_empty()),
    })?;

    Ok(Json(connector))
}

/// POST /api/connectors/:id - Update an endpoint
async fn update_connector(
    State(state): State<Arc<AppState>>,
    Path(connector_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ConnectorRequest>,
) -> Result<Json<ApiConnector>, ApiError> {
    if body.api_name.trim().is_empty() {
        return Err(ApiError::BadRequest);
    }
    validate_link(&body.api_link)?;

    let organization = organization_for(&state, user)?;
    state.db.update_connector(
        connector_id,
        organization.id,
        &body.api_name,
        &body.api_link,
        body.api_key.as_deref().filter(|k| !k.is_empty()),
    )?;

    let connectors = state.db.list_connectors(organization.id)?;
    connectors
        .into_iter()
        .find(|c| c.id == connector_id)
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// DELETE /api/connectors/:id
async fn delete_connector(
    State(state): State<Arc<AppState>>,
    Path(connector_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let organization = organization_for(&state, user)?;
    let deleted = state.db.delete_connector(connector_id, organization.id)?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(Json(serde_json::json!({"id": connector_id, "deleted": true})))
}

/// GET /api/connectors/data - Fetch every configured endpoint and return
/// the JSON payloads that came back. Endpoints that fail are logged and
/// skipped so one broken API does not hide the rest.
async fn fetch_connector_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ConnectorData>>, ApiError> {
    let organization = organization_for(&state, user)?;
    let connectors = state.db.list_connectors(organization.id)?;

    let mut results = Vec::with_capacity(connectors.len());
    for connector in connectors {
        debug!("Probing connector '{}' at {}", connector.api_name, connector.api_link);

        let mut request = state.http.get(&connector.api_link);
        if let Some(key) = &connector.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(data) => results.push(ConnectorData {
                        url: connector.api_link,
                        data,
                    }),
                    Err(e) => warn!(
                        "Connector '{}' returned non-JSON payload: {:?}",
                        connector.api_name, e
                    ),
                }
            }
            Ok(response) => warn!(
                "Connector '{}' returned status {}",
                connector.api_name,
                response.status()
            ),
            Err(e) => warn!("Connector '{}' fetch failed: {:?}", connector.api_name, e),
        }
    }

    Ok(Json(results))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/connectors", get(list_connectors))
        .route("/api/connectors", post(create_connector))
        .route("/api/connectors/data", get(fetch_connector_data))
        .route("/api/connectors/:id", post(update_connector))
        .route("/api/connectors/:id", delete(delete_connector))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_validation_accepts_http_and_https() {
        assert!(validate_link("https://api.example.com/stats").is_ok());
        assert!(validate_link("http://localhost:8080/data").is_ok());
    }

    #[test]
    fn link_validation_rejects_other_schemes_and_garbage() {
        assert!(validate_link("ftp://example.com").is_err());
        assert!(validate_link("file:///etc/passwd").is_err());
        assert!(validate_link("not a url").is_err());
    }
}
