//! HTTP handlers for contact endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use super::dto::{
    ContactResponse, ExecutionStartedResponse, OutreachRequest, ProposalRequest, ReasonRequest,
    RelaunchCandidatesResponse, RelaunchParams, TagRequest, TimedRequest,
};
use crate::adapters::http::negotiation::NegotiationResponse;
use crate::adapters::http::{at_or_now, ApiError, BrokerAppState};
use crate::application::{Outreach, RelaunchQuery};
use crate::domain::exchange::Terms;
use crate::domain::foundation::{ContactId, Timestamp};

/// GET /api/contacts/:id
pub async fn get_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state.broker.contact(ContactId::from_uuid(id)).await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// GET /api/contacts/:id/negotiation
pub async fn get_negotiation(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.broker.negotiation(ContactId::from_uuid(id)).await?;
    Ok(Json(NegotiationResponse::from(&snapshot)))
}

/// POST /api/contacts/:id/outreach
pub async fn start_outreach(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<OutreachRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outreach = Outreach {
        terms: Terms::try_from(request.terms)?,
        message: request.message,
        video_url: request.video_url,
        at: at_or_now(request.at),
    };
    let snapshot = state
        .broker
        .start_outreach(ContactId::from_uuid(id), outreach)
        .await?;
    Ok(Json(NegotiationResponse::from(&snapshot)))
}

/// POST /api/contacts/:id/proposal
pub async fn propose_terms(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProposalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let terms = Terms::try_from(request.terms)?;
    let snapshot = state
        .broker
        .propose_terms(ContactId::from_uuid(id), terms, at_or_now(request.at))
        .await?;
    Ok(Json(NegotiationResponse::from(&snapshot)))
}

/// POST /api/contacts/:id/execution
pub async fn begin_execution(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TimedRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let (snapshot, profile) = state
        .broker
        .begin_execution(ContactId::from_uuid(id), request_time(body))
        .await?;
    Ok(Json(ExecutionStartedResponse {
        profile,
        negotiation: NegotiationResponse::from(&snapshot),
    }))
}

/// POST /api/contacts/:id/block
pub async fn block_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .broker
        .block_contact(
            ContactId::from_uuid(id),
            &request.reason,
            at_or_now(request.at),
        )
        .await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// POST /api/contacts/:id/unblock
pub async fn unblock_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TimedRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .broker
        .unblock_contact(ContactId::from_uuid(id), request_time(body))
        .await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// POST /api/contacts/:id/flag
pub async fn flag_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .broker
        .flag_contact(
            ContactId::from_uuid(id),
            &request.reason,
            at_or_now(request.at),
        )
        .await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// POST /api/contacts/:id/tags
pub async fn tag_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .broker
        .tag_contact(ContactId::from_uuid(id), &request.tag, at_or_now(request.at))
        .await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// DELETE /api/contacts/:id/tags
pub async fn untag_contact(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .broker
        .untag_contact(ContactId::from_uuid(id), &request.tag, at_or_now(request.at))
        .await?;
    Ok(Json(ContactResponse::from(&contact)))
}

/// GET /api/contacts/relaunch-candidates
pub async fn relaunch_candidates(
    State(state): State<BrokerAppState>,
    Query(params): Query<RelaunchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = RelaunchQuery {
        min_score: params.min_score,
        min_exchanges: params.min_exchanges,
        cooldown_days: params.cooldown_days,
        limit: params.limit,
    };
    let contacts = state
        .broker
        .relaunch_candidates(query, Timestamp::now())
        .await?;
    Ok(Json(RelaunchCandidatesResponse {
        candidates: contacts.iter().map(ContactResponse::from).collect(),
    }))
}

fn request_time(body: Option<Json<TimedRequest>>) -> Timestamp {
    at_or_now(body.and_then(|Json(request)| request.at))
}
