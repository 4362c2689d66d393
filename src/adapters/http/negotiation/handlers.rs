//! HTTP handlers for negotiation intake.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use super::dto::{
    ExchangeDetailResponse, ExecutionReportRequest, NegotiationResponse, OfferRequest,
    OfferResponse, VerificationRequest,
};
use crate::adapters::http::contacts::ContactResponse;
use crate::adapters::http::{at_or_now, ApiError, BrokerAppState};
use crate::application::{ExecutionReport, OfferEvent, VerificationReport};
use crate::domain::exchange::Terms;
use crate::domain::foundation::ExchangeId;

/// POST /api/offers
pub async fn receive_offer(
    State(state): State<BrokerAppState>,
    Json(request): Json<OfferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let offer = OfferEvent {
        platform: request.platform,
        external_user_id: request.external_user_id,
        display_name: request.display_name,
        group_context: request.group_context,
        message_text: request.message_text,
        extracted_terms: request.extracted_terms.map(Terms::try_from).transpose()?,
        video_urls: request.video_urls,
        at: at_or_now(request.at),
    };

    let outcome = state.broker.handle_offer(offer).await?;

    Ok(Json(OfferResponse {
        contact: ContactResponse::from(&outcome.contact),
        negotiation: NegotiationResponse::from(&outcome.negotiation),
    }))
}

/// GET /api/exchanges/:id
pub async fn get_exchange(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let exchange = state.broker.exchange(ExchangeId::from_uuid(id)).await?;
    Ok(Json(ExchangeDetailResponse::from(&exchange)))
}

/// POST /api/exchanges/:id/execution
pub async fn report_execution(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExecutionReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = ExecutionReport {
        exchange_id: ExchangeId::from_uuid(id),
        results: request.results,
        ban_detected: request.ban_detected,
        at: at_or_now(request.at),
    };
    let snapshot = state.broker.handle_execution_report(report).await?;
    Ok(Json(NegotiationResponse::from(&snapshot)))
}

/// POST /api/exchanges/:id/verification
pub async fn report_verification(
    State(state): State<BrokerAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<VerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = VerificationReport {
        exchange_id: ExchangeId::from_uuid(id),
        results: request.results,
        impossible: request.impossible,
        at: at_or_now(request.at),
    };
    let snapshot = state.broker.handle_verification(report).await?;
    Ok(Json(NegotiationResponse::from(&snapshot)))
}
