//! HTTP API for the air-conditioning plant
//!
//! Provides REST endpoints for room control and status using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus-formatted metrics
//! - `PUT /ac/:room_id` - Control a room's unit (power on/off, adjust)
//! - `GET /ac/:room_id/status` - Long-poll the room's status
//! - `GET /admin/scheduler` - Operator snapshot of the scheduler queues
//!
//! ## Example
//!
//! ```rust,ignore
//! use climatizar::api::{create_router, AppState};
//!
//! let state = AppState::demo()?;
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ClimatizarError, Result};
use crate::intake::Intake;
use crate::metrics::MetricsCollector;
use crate::scheduler::types::{AdminSnapshot, Mode, Speed};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::status::{AcStatus, StatusQuery};
use crate::store::{FleetStore, Operation};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    intake: Arc<Intake>,
    status: Arc<StatusQuery>,
    scheduler: Arc<Scheduler>,
    store: Arc<FleetStore>,
    metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Assemble the state from already-built components
    #[must_use]
    pub fn new(
        intake: Arc<Intake>,
        status: Arc<StatusQuery>,
        scheduler: Arc<Scheduler>,
        store: Arc<FleetStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            intake,
            status,
            scheduler,
            store,
            metrics,
        }
    }

    /// In-memory state with rooms 101-110 provisioned and checked in
    ///
    /// # Errors
    ///
    /// Returns an error when seeding the in-memory store fails.
    pub fn demo() -> Result<Self> {
        let config = Config::default();
        let store = Arc::new(FleetStore::in_memory());
        for room_id in 101..=110 {
            store.provision_ac(room_id, 250)?;
            store.check_in(room_id)?;
        }
        let metrics = Arc::new(MetricsCollector::new());
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig::from(&config),
            Arc::clone(&store),
            Arc::clone(&metrics),
        ));
        let intake = Arc::new(Intake::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            config.clone(),
        ));
        let status = Arc::new(StatusQuery::new(Arc::clone(&store), &config));
        Ok(Self::new(intake, status, scheduler, store, metrics))
    }

    /// The scheduler behind this state
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The fleet store behind this state
    #[must_use]
    pub fn store(&self) -> &Arc<FleetStore> {
        &self.store
    }

    /// The metrics collector behind this state
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

/// Control request for a room's unit
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlRequest {
    /// 0 = power on, 1 = power off, 2 = adjust
    pub operation_type: u8,
    /// Operating mode ("cooling"/"heating"; "cool"/"heat" accepted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Fan speed ("high"/"medium"/"low")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// Target temperature in tenths of a degree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temp: Option<i32>,
}

/// Control response carrying the recorded operation row
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Human-readable outcome
    pub message: String,
    /// The operation row written for the command
    pub operation: Operation,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Stable machine-readable code
    pub code: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ac/:room_id", put(control_handler))
        .route("/ac/:room_id/status", get(status_handler))
        .route("/admin/scheduler", get(admin_handler))
        .with_state(state)
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Prometheus metrics handler
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.prometheus()
}

/// Control handler: dispatch on `operation_type`
async fn control_handler(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
    Json(req): Json<ControlRequest>,
) -> std::result::Result<Json<ControlResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.metrics.record_command();
    let outcome = dispatch_control(&state, room_id, &req);
    match outcome {
        Ok(operation) => Ok(Json(ControlResponse {
            message: format!("room {room_id}: command accepted"),
            operation,
        })),
        Err(err) => Err(error_response(&err)),
    }
}

fn dispatch_control(state: &AppState, room_id: i64, req: &ControlRequest) -> Result<Operation> {
    let mode = parse_field::<Mode>(req.mode.as_deref())?;
    let speed = parse_field::<Speed>(req.speed.as_deref())?;
    match req.operation_type {
        0 => state.intake.power_on(room_id, mode, speed, req.target_temp),
        1 => state.intake.power_off(room_id),
        2 => state.intake.adjust(room_id, mode, speed, req.target_temp),
        other => Err(ClimatizarError::InvalidParameter {
            reason: format!("unknown operation_type {other} (expected 0, 1 or 2)"),
        }),
    }
}

fn parse_field<T: std::str::FromStr<Err = ClimatizarError>>(
    raw: Option<&str>,
) -> Result<Option<T>> {
    raw.map(str::parse::<T>).transpose()
}

/// Long-poll status handler
async fn status_handler(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
) -> std::result::Result<Json<AcStatus>, (StatusCode, Json<ErrorResponse>)> {
    let Some(ac) = state.store.ac_for_room(room_id) else {
        return Err(error_response(&ClimatizarError::UnknownRoom { room_id }));
    };
    let Some(bill_id) = state.store.active_bill(room_id) else {
        return Err(error_response(&ClimatizarError::NoActiveBooking {
            room_id,
        }));
    };
    state.metrics.record_long_poll();
    match state.status.long_poll(room_id, bill_id).await {
        Some(status) => Ok(Json(status)),
        None => Err(error_response(&ClimatizarError::NotTracked {
            ac_id: ac.ac_id,
        })),
    }
}

/// Operator snapshot handler
async fn admin_handler(State(state): State<AppState>) -> Json<AdminSnapshot> {
    Json(state.scheduler.admin_snapshot())
}

fn error_response(err: &ClimatizarError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        ClimatizarError::UnknownRoom { .. } => StatusCode::NOT_FOUND,
        ClimatizarError::NoActiveBooking { .. } | ClimatizarError::NotTracked { .. } => {
            StatusCode::CONFLICT
        }
        ClimatizarError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        ClimatizarError::StorePersist { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}
