//! HTTP handlers for profile endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use super::dto::{
    HealthCheckRequest, ProfileListResponse, ProfileResponse, RegisterProfileRequest,
    ReleaseResponse,
};
use crate::adapters::http::{at_or_now, ApiError, BrokerAppState};
use crate::domain::foundation::{LeaseId, ProfileId};

/// GET /api/profiles
pub async fn list_profiles(
    State(state): State<BrokerAppState>,
) -> Result<impl IntoResponse, ApiError> {
    let profiles = state.broker.pool().list().await?;
    Ok(Json(ProfileListResponse {
        profiles: profiles.iter().map(ProfileResponse::from).collect(),
    }))
}

/// POST /api/profiles
pub async fn register_profile(
    State(state): State<BrokerAppState>,
    Json(request): Json<RegisterProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .broker
        .register_profile(
            &request.handle,
            request.max_daily_actions,
            at_or_now(request.at),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProfileResponse::from(&profile))))
}

/// POST /api/profiles/:id/health
pub async fn record_health(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<HealthCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .broker
        .profile_health(
            ProfileId::from_uuid(id),
            request.healthy,
            at_or_now(request.at),
        )
        .await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

/// POST /api/profiles/leases/:lease_id/release
pub async fn release_lease(
    State(state): State<BrokerAppState>,
    Path(lease_id): Path<Uuid>,
) -> impl IntoResponse {
    let released = state.broker.release_profile(LeaseId::from_uuid(lease_id));
    Json(ReleaseResponse { released })
}
