use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{check_in, confirm_payment, create_booking, fail_payment, health_check};
use crate::state::AppState;
use crate::store::Store;

pub fn create_routes<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/occurrences/:occurrence_id/bookings", post(create_booking::<S>))
        .route("/occurrences/:occurrence_id/check-ins", post(check_in::<S>))
        .route("/payments/:handoff_id/confirm", post(confirm_payment::<S>))
        .route("/payments/:handoff_id/fail", post(fail_payment::<S>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
}
