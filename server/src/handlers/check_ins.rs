use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::CheckInMethod;
use crate::services::{CheckInRequest, CheckInResult};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::{error, success};

#[derive(Debug, Deserialize)]
pub struct CheckInBody {
    pub scanned_code: String,
    pub operator_id: Option<Uuid>,
    #[serde(default = "default_method")]
    pub method: CheckInMethod,
    pub device_id: Option<String>,
    pub note: Option<String>,
}

fn default_method() -> CheckInMethod {
    CheckInMethod::QrScan
}

pub async fn check_in<S: Store>(
    State(state): State<AppState<S>>,
    Path(occurrence_id): Path<Uuid>,
    Json(body): Json<CheckInBody>,
) -> Result<Response, AppError> {
    let result = state
        .check_ins
        .attempt(CheckInRequest {
            scanned_code: body.scanned_code,
            occurrence_id,
            operator_id: body.operator_id,
            method: body.method,
            device_id: body.device_id,
            note: body.note,
        })
        .await?;

    Ok(match result {
        admitted @ CheckInResult::Admitted { .. } => success(admitted, "Checked in"),
        CheckInResult::Rejected {
            attempt_id,
            code,
            reasons,
            message,
        } => error(
            code.as_str(),
            message,
            Some(json!({ "attempt_id": attempt_id, "reasons": reasons })),
            StatusCode::CONFLICT,
        ),
    })
}
