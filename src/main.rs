use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use dotenv::dotenv;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod context_builder;
mod db;
mod jwt;
mod llm;
mod models;
mod web;

use config::Config;
pub use db::{DBConnection, DBError};
use llm::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JWT")]
    InvalidJwt,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad Request")]
    BadRequest,

    #[error("Missing message or chat ID")]
    MissingChatFields,

    #[error("Please add your event organization data first")]
    OrganizationDataRequired,

    #[error("Resource not found")]
    NotFound,

    #[error("Upstream model call failed")]
    UpstreamError,

    #[error("Internal server error")]
    InternalServerError,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ApiError::InvalidJwt => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::MissingChatFields => StatusCode::BAD_REQUEST,
            ApiError::OrganizationDataRequired => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::UpstreamError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                status: status.as_u16(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DBError> for ApiError {
    fn from(err: DBError) -> Self {
        if err.is_not_found() {
            return ApiError::NotFound;
        }
        error!("Database error: {:?}", err);
        ApiError::InternalServerError
    }
}

pub struct AppState {
    pub db: Arc<dyn DBConnection + Send + Sync>,
    pub config: Config,
    pub llm: LlmConfig,
    /// Plain JSON fetches (connector probing).
    pub http: reqwest::Client,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let db = db::setup_db(&config.database_url);

    let llm = LlmConfig {
        base_url: config.openai_api_base.clone(),
        api_key: config.openai_api_key.clone(),
        model: config.openai_model.clone(),
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to build HTTP client");

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        db,
        config,
        llm,
        http,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(web::chat::router(state.clone()))
        .merge(web::chats::router(state.clone()))
        .merge(web::extract::router(state.clone()))
        .merge(web::organizations::router(state.clone()))
        .merge(web::connectors::router(state.clone()))
        .merge(web::facts::router(state.clone()))
        .merge(web::analytics::router(state))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .expect("Failed to bind listen address");

    info!("eventdeck listening on {}", bind_address);

    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
