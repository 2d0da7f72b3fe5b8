//! Saga admin endpoints: start, inspect, retry and cancel.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use saga::{
    ExecutedStep, SagaId, SagaInstance, SagaOrchestrator, SagaQuery, SagaResult, SagaStatistics,
    SagaStatus, SagaStore, StepFailure, TriggeringEvent,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orchestrator: SagaOrchestrator<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartSagaRequest {
    pub saga_id: Option<String>,
    pub event_type: String,
    pub aggregate_id: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
pub struct ListSagasParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct SagaResponse {
    pub id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub attempt: u32,
    pub triggering_event: TriggeringEvent,
    pub executed_steps: Vec<ExecutedStep>,
    pub compensations: Vec<ExecutedStep>,
    pub failure: Option<StepFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SagaInstance> for SagaResponse {
    fn from(saga: SagaInstance) -> Self {
        Self {
            id: saga.id().to_string(),
            saga_type: saga.saga_type().to_string(),
            status: saga.status(),
            attempt: saga.attempt(),
            triggering_event: saga.triggering_event().clone(),
            executed_steps: saga.executed_steps().to_vec(),
            compensations: saga.compensations().to_vec(),
            failure: saga.failure().cloned(),
            created_at: saga.created_at(),
            updated_at: saga.updated_at(),
        }
    }
}

// -- Handlers --

/// POST /sagas: start a saga for the given event and wait for its outcome.
#[tracing::instrument(skip(state, req))]
pub async fn start<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StartSagaRequest>,
) -> Result<Json<SagaResult>, ApiError> {
    if req.event_type.trim().is_empty() {
        return Err(ApiError::BadRequest("event_type must not be empty".to_string()));
    }

    let mut event = TriggeringEvent::new(req.event_type, req.payload);
    if let Some(aggregate_id) = req.aggregate_id {
        event = event.with_aggregate_id(aggregate_id);
    }
    if let Some(correlation_id) = req.correlation_id {
        event = event.with_correlation_id(correlation_id);
    }

    let result = match req.saga_id {
        Some(id) => {
            let id = parse_saga_id(&id)?;
            state.orchestrator.start_with_id(id, event).await?
        }
        None => state.orchestrator.start(event).await?,
    };

    Ok(Json(result))
}

/// GET /sagas: list sagas, optionally filtered by status.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListSagasParams>,
) -> Result<Json<Vec<SagaResponse>>, ApiError> {
    let mut query = SagaQuery::new();
    if let Some(status) = params.status {
        let status = status
            .parse::<SagaStatus>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        query = query.status(status);
    }
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let sagas = state.orchestrator.list(query).await?;
    Ok(Json(sagas.into_iter().map(SagaResponse::from).collect()))
}

/// GET /sagas/stats: saga counts per status.
pub async fn stats<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<SagaStatistics>, ApiError> {
    Ok(Json(state.orchestrator.statistics().await?))
}

/// GET /sagas/{id}: current state of one saga.
#[tracing::instrument(skip(state))]
pub async fn get<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let saga = state.orchestrator.get_state(saga_id).await?;
    Ok(Json(saga.into()))
}

/// POST /sagas/{id}/retry: replay a saga from its first step.
#[tracing::instrument(skip(state))]
pub async fn retry<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResult>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    Ok(Json(state.orchestrator.retry(saga_id).await?))
}

/// POST /sagas/{id}/cancel: cancel a saga and compensate its steps.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResult>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    Ok(Json(state.orchestrator.cancel(saga_id).await?))
}

fn parse_saga_id(id: &str) -> Result<SagaId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid saga ID: {e}")))
}
