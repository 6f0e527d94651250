//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use foodshare_core::{
    Claim, ClaimId, ClaimStatus, Dashboard, Donation, DonationDraft, DonationId, DonationStatus,
    EventRecord, LifecycleManager,
};
use serde::{Deserialize, Serialize};

use crate::db::SqliteStore;
use crate::errors::Result;
use crate::session::Caller;

pub struct ApiState {
    pub manager: LifecycleManager,
    /// Present when the SQLite backend is active; used for health probes.
    pub sqlite: Option<SqliteStore>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/donations", get(list_donations).post(create_donation))
        .route(
            "/donations/:id",
            get(get_donation).put(edit_donation).delete(delete_donation),
        )
        .route("/donations/:id/claim", post(claim_donation))
        .route("/donations/:id/cancel", post(cancel_donation))
        .route("/donations/:id/complete", post(complete_donation))
        .route("/donations/:id/history", get(donation_history))
        .route("/claims/:id", patch(update_claim))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct BrowseParams {
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimStatusUpdate {
    pub status: ClaimStatus,
}

#[derive(Serialize)]
pub struct DonationsResponse {
    pub count: usize,
    pub donations: Vec<Donation>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub donation_id: DonationId,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> Result<Json<HealthResponse>> {
    let store = match &state.sqlite {
        Some(sqlite) => {
            sqlite.health_check().await?;
            "sqlite"
        }
        None => "local",
    };
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store,
    }))
}

/// `GET /donations?search=&status=`
///
/// The global browse list, newest first.
pub async fn list_donations(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<DonationsResponse>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<DonationStatus>)
        .transpose()?;
    let donations = state
        .manager
        .browse(status, params.search.as_deref())
        .await?;
    Ok(Json(DonationsResponse {
        count: donations.len(),
        donations,
    }))
}

/// `POST /donations`
pub async fn create_donation(
    State(state): State<Arc<ApiState>>,
    Caller(session): Caller,
    Json(draft): Json<DonationDraft>,
) -> Result<impl IntoResponse> {
    let donation = state.manager.create_donation(&session, &draft).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

/// `GET /donations/:id`
pub async fn get_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
) -> Result<Json<Donation>> {
    Ok(Json(state.manager.get_donation(id).await?))
}

/// `PUT /donations/:id`
pub async fn edit_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
    Caller(session): Caller,
    Json(draft): Json<DonationDraft>,
) -> Result<Json<Donation>> {
    Ok(Json(state.manager.edit_donation(&session, id, &draft).await?))
}

/// `DELETE /donations/:id`
pub async fn delete_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
    Caller(session): Caller,
) -> Result<StatusCode> {
    state.manager.delete_donation(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /donations/:id/claim`
pub async fn claim_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
    Caller(session): Caller,
) -> Result<impl IntoResponse> {
    let claim = state.manager.claim(&session, id).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// `POST /donations/:id/cancel`
pub async fn cancel_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
    Caller(session): Caller,
) -> Result<Json<Donation>> {
    Ok(Json(state.manager.cancel_donation(&session, id).await?))
}

/// `POST /donations/:id/complete`
///
/// Completes the donation's approved claim.
pub async fn complete_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<DonationId>,
    Caller(session): Caller,
) -> Result<Json<Claim>> {
    Ok(Json(state.manager.mark_completed(&session, id).await?))
}

/// `GET /donations/:id/history`
pub async fn donation_history(
    State(state): State<Arc<ApiState>>,
    Path(donation_id): Path<DonationId>,
) -> Result<Json<HistoryResponse>> {
    let events = state.manager.history(donation_id).await?;
    Ok(Json(HistoryResponse {
        donation_id,
        count: events.len(),
        events,
    }))
}

/// `PATCH /claims/:id` with `{"status": "approved" | "completed" | "cancelled"}`
pub async fn update_claim(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ClaimId>,
    Caller(session): Caller,
    Json(update): Json<ClaimStatusUpdate>,
) -> Result<Json<Claim>> {
    Ok(Json(
        state
            .manager
            .update_claim_status(&session, id, update.status)
            .await?,
    ))
}

/// `GET /dashboard?search=`
///
/// The caller's own listings and claims.
pub async fn dashboard(
    State(state): State<Arc<ApiState>>,
    Caller(session): Caller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Dashboard>> {
    Ok(Json(
        state
            .manager
            .dashboard(&session, params.search.as_deref())
            .await?,
    ))
}
