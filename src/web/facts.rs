//! Direct UI writes and reads for the visitor/revenue/rating fact tables.

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::models::facts::{NewRating, NewRevenue, NewVisitor, Rating, Revenue, Visitor};
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVisitorRequest {
    #[validate(length(min = 1))]
    pub page_visited: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRevenueRequest {
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[validate(length(min = 1))]
    pub source: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRatingRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

async fn list_visitors(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Visitor>>, ApiError> {
    Ok(Json(state.db.list_visitors(user.id)?))
}

async fn create_visitor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateVisitorRequest>,
) -> Result<Json<Visitor>, ApiError> {
    body.validate().map_err(|_| ApiError::BadRequest)?;
    let row = state.db.insert_visitor(NewVisitor {
        user_id: user.id,
        page_visited: body.page_visited,
    })?;
    Ok(Json(row))
}

async fn list_revenue(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Revenue>>, ApiError> {
    Ok(Json(state.db.list_revenue(user.id)?))
}

async fn create_revenue(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRevenueRequest>,
) -> Result<Json<Revenue>, ApiError> {
    body.validate().map_err(|_| ApiError::BadRequest)?;
    let row = state.db.insert_revenue(NewRevenue {
        user_id: user.id,
        amount: body.amount,
        source: body.source,
    })?;
    Ok(Json(row))
}

async fn list_ratings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Rating>>, ApiError> {
    Ok(Json(state.db.list_ratings(user.id)?))
}

async fn create_rating(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRatingRequest>,
) -> Result<Json<Rating>, ApiError> {
    body.validate().map_err(|_| ApiError::BadRequest)?;
    let row = state.db.insert_rating(NewRating {
        user_id: user.id,
        rating: body.rating,
        comment: body.comment,
    })?;
    Ok(Json(row))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/visitors", get(list_visitors))
        .route("/api/visitors", post(create_visitor))
        .route("/api/revenue", get(list_revenue))
        .route("/api/revenue", post(create_revenue))
        .route("/api/ratings", get(list_ratings))
        .route("/api/ratings", post(create_rating))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_request_range() {
        let ok = CreateRatingRequest {
            rating: 3,
            comment: None,
        };
        assert!(ok.validate().is_ok());

        let low = CreateRatingRequest {
            rating: 0,
            comment: None,
        };
        assert!(low.validate().is_err());
    }

    #[test]
    fn revenue_request_rejects_negative_amounts() {
        let bad = CreateRevenueRequest {
            amount: -10.0,
            source: "tickets".to_string(),
        };
        assert!(bad.validate().is_err());
    }
}
