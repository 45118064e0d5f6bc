use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::{BookingOutcome, BookingRequest, LineItem};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::success_with_status;

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub buyer_id: Uuid,
    /// Empty or missing books one free general-admission ticket.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

pub async fn create_booking<S: Store>(
    State(state): State<AppState<S>>,
    Path(occurrence_id): Path<Uuid>,
    Json(body): Json<CreateBookingBody>,
) -> Result<Response, AppError> {
    let outcome = state
        .bookings
        .initiate(BookingRequest {
            buyer_id: body.buyer_id,
            occurrence_id,
            line_items: body.line_items,
        })
        .await?;

    let (status, message) = match &outcome {
        BookingOutcome::Confirmed { .. } => (StatusCode::CREATED, "Booking confirmed"),
        BookingOutcome::PaymentRequired { .. } => (StatusCode::ACCEPTED, "Payment required"),
    };
    Ok(success_with_status(status, outcome, message))
}
