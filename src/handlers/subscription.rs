use axum::{
    extract::{Path, State},
    Json,
};

use crate::handlers::payments::{to_error_response, ApiError};
use crate::models::subscription::ActivePlanResponse;
use crate::AppState;

pub async fn get_active_plan(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
) -> Result<Json<ActivePlanResponse>, ApiError> {
    let view = state
        .payments
        .get_active_plan(account_id)
        .await
        .map_err(to_error_response)?;

    Ok(Json(view.into()))
}
