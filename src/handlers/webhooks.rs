use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::entities::sea_orm_active_enums::GatewayKind;
use crate::handlers::payments::{to_error_response, ApiError};
use crate::models::error::ErrorResponse;
use crate::models::payment::WebhookAckResponse;
use crate::AppState;

fn gateway_from_path(gateway: &str) -> Option<GatewayKind> {
    match gateway.to_ascii_lowercase().as_str() {
        "phonepe" => Some(GatewayKind::PhonePe),
        "razorpay" => Some(GatewayKind::Razorpay),
        _ => None,
    }
}

/// Gateway callback. The raw body is needed for signature checks, so it is
/// taken as bytes and decoded by the adapter.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAckResponse>, ApiError> {
    let kind = gateway_from_path(&gateway).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown gateway: {}", gateway),
            }),
        )
    })?;

    let outcome = state
        .payments
        .handle_webhook(kind, &headers, &body)
        .await
        .map_err(to_error_response)?;

    Ok(Json(match outcome {
        Some(outcome) => WebhookAckResponse {
            received: true,
            merchant_order_id: Some(outcome.merchant_order_id),
            status: Some(outcome.final_status),
            applied: outcome.applied,
        },
        None => WebhookAckResponse {
            received: true,
            merchant_order_id: None,
            status: None,
            applied: false,
        },
    }))
}
