use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::error::PaymentError;
use crate::models::error::ErrorResponse;
use crate::models::payment::{
    PaymentIntentResponse, PaymentStatusResponse, PurchaseSubscriptionRequest, WalletTopUpRequest,
};
use crate::AppState;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a service error onto the HTTP status and body the API returns
pub fn to_error_response(err: PaymentError) -> ApiError {
    let status = match &err {
        PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::Gateway(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        PaymentError::Consistency(_) | PaymentError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!(error = %err, "Payment request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

pub async fn purchase_subscription(
    State(state): State<AppState>,
    Json(payload): Json<PurchaseSubscriptionRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let intent = state
        .payments
        .open_subscription_purchase(payload.account_id, payload.plan_id, payload.code.as_deref())
        .await
        .map_err(to_error_response)?;

    Ok(Json(intent.into()))
}

pub async fn top_up_wallet(
    State(state): State<AppState>,
    Json(payload): Json<WalletTopUpRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let intent = state
        .payments
        .open_wallet_top_up(payload.account_id, payload.amount)
        .await
        .map_err(to_error_response)?;

    Ok(Json(intent.into()))
}

/// Client poll after returning from the gateway's checkout page
pub async fn check_payment_status(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let outcome = state
        .payments
        .reconcile_payment(&merchant_order_id)
        .await
        .map_err(to_error_response)?;

    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::GatewayError;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (PaymentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (PaymentError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (
                PaymentError::Gateway(GatewayError::InvalidResponse("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (PaymentError::Unauthorized("sig".into()), StatusCode::UNAUTHORIZED),
            (
                PaymentError::Consistency("pair".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let (status, Json(body)) = to_error_response(err);
            assert_eq!(status, expected);
            assert!(!body.error.is_empty());
        }
    }
}
