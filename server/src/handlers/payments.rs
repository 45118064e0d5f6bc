//! Settlement callbacks from the payment collaborator.

use axum::extract::{Path, State};
use axum::response::Response;

use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn confirm_payment<S: Store>(
    State(state): State<AppState<S>>,
    Path(handoff_id): Path<String>,
) -> Result<Response, AppError> {
    let order = state.bookings.confirm_payment(&handoff_id).await?;
    Ok(success(order, "Order confirmed"))
}

pub async fn fail_payment<S: Store>(
    State(state): State<AppState<S>>,
    Path(handoff_id): Path<String>,
) -> Result<Response, AppError> {
    let order = state.bookings.fail_payment(&handoff_id).await?;
    Ok(success(order, "Order failed"))
}
