use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{Error, Result};
use crate::models::{
    estimate::EstimateLevel,
    fees::ManualEdit,
    view::{
        CancelAllResponse, EditFeeRequest, GasLimitRequest, NonceRequest, OpenSessionRequest,
        OpenSessionResponse, SelectLevelRequest, SessionView, SubmitResponse,
    },
};
use crate::services::session::SessionSnapshot;
use crate::utils::units::parse_gwei;

fn render(state: &AppState, snapshot: SessionSnapshot) -> Json<SessionView> {
    Json(SessionView::new(snapshot, &state.fiat_currency))
}

pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<Json<OpenSessionResponse>> {
    let mut options = state.options.clone();
    if let Some(level) = request.default_level {
        if !EstimateLevel::NETWORK.contains(&level) {
            return Err(Error::InvalidInput(format!(
                "Default level must be low, medium or high, got {}",
                level
            )));
        }
        options.default_level = level;
    }

    tracing::debug!("Opening session for transaction: {:?}", request.transaction);

    let (session, created) = state.registry.open(request.transaction, options).await?;
    let snapshot = session.view().await?;

    Ok(Json(OpenSessionResponse {
        created,
        session: SessionView::new(snapshot, &state.fiat_currency),
    }))
}

pub async fn view_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>> {
    let snapshot = state.registry.get(&id).await?.view().await?;
    Ok(render(&state, snapshot))
}

pub async fn select_level(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SelectLevelRequest>,
) -> Result<Json<SessionView>> {
    let session = state.registry.get(&id).await?;
    let snapshot = session.select_level(request.level).await?;
    Ok(render(&state, snapshot))
}

pub async fn edit_fee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<EditFeeRequest>,
) -> Result<Json<SessionView>> {
    let value = parse_gwei(&request.value)?;
    let session = state.registry.get(&id).await?;

    tracing::debug!("Session {} edits {} to {} gwei", id, request.field, request.value);

    let snapshot = session.edit(ManualEdit::Fee(request.field, value)).await?;
    Ok(render(&state, snapshot))
}

pub async fn edit_gas_limit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<GasLimitRequest>,
) -> Result<Json<SessionView>> {
    let session = state.registry.get(&id).await?;
    let snapshot = session.edit(ManualEdit::GasLimit(request.gas_limit)).await?;
    Ok(render(&state, snapshot))
}

pub async fn set_nonce(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<NonceRequest>,
) -> Result<Json<SessionView>> {
    let session = state.registry.get(&id).await?;
    let snapshot = session.set_custom_nonce(request.nonce).await?;
    Ok(render(&state, snapshot))
}

pub async fn confirm_anyway(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>> {
    let snapshot = state.registry.get(&id).await?.confirm_anyway().await?;
    Ok(render(&state, snapshot))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubmitResponse>> {
    let outcome = state.registry.submit(&id).await?;

    tracing::debug!("Submit outcome for {}: {:?}", id, outcome);

    Ok(Json(outcome.into()))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.registry.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.registry.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_all(State(state): State<Arc<AppState>>) -> Result<Json<CancelAllResponse>> {
    let cancelled = state.registry.cancel_all().await?;
    Ok(Json(CancelAllResponse { cancelled }))
}
