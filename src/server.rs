use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::{BusySlot, load_vendor};
use crate::config::Config;
use crate::error::Error;
use crate::fetcher::Fetcher;
use crate::ical::{CalendarEvent, IcsParser, Window};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub config_path: Arc<PathBuf>,
    pub fetcher: Arc<Fetcher>,
    pub parser: Arc<IcsParser>,
}

impl AppState {
    pub fn new(config: Config, config_path: PathBuf, fetcher: Fetcher) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: Arc::new(config_path),
            fetcher: Arc::new(fetcher),
            parser: Arc::new(IcsParser::new()),
        }
    }

    /// Snapshot of the current configuration
    pub fn current_config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload and validate the config file; the old config stays on failure
    pub fn reload_config(&self) -> crate::error::Result<()> {
        let config = Config::load(self.config_path.as_ref())?;
        config.validate()?;

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/vendors/{id}/events", get(get_events))
        .route("/vendors/{id}/busy", get(get_busy))
        .with_state(state)
}

/// `?from=...&to=...` as RFC 3339 instants
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl From<WindowQuery> for Window {
    fn from(query: WindowQuery) -> Self {
        Window {
            start: query.from,
            end: query.to,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyResponse {
    pub vendor: String,
    pub busy: Vec<BusySlot>,
    pub failed_sources: Vec<String>,
}

/// Handler for GET /vendors/{id}/events
async fn get_events(
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CalendarEvent>>, AppError> {
    let config = state.current_config();
    let result = load_vendor(&id, &config, &state.fetcher, &state.parser, query.into()).await?;

    Ok(Json(result.events))
}

/// Handler for GET /vendors/{id}/busy
async fn get_busy(
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
    State(state): State<AppState>,
) -> Result<Json<BusyResponse>, AppError> {
    let config = state.current_config();
    let result = load_vendor(&id, &config, &state.fetcher, &state.parser, query.into()).await?;

    Ok(Json(BusyResponse {
        busy: result.busy_slots(),
        failed_sources: result.errors.into_iter().map(|(url, _)| url).collect(),
        vendor: id,
    }))
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Internal(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::VendorNotFound(id) => AppError::NotFound(format!("Vendor '{}' not found", id)),
            other => AppError::Internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}
