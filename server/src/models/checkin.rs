use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_in_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    QrScan,
    ManualEntry,
    SelfService,
}

/// Fixed failure taxonomy reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInFailureCode {
    InvalidCode,
    WrongEvent,
    WrongOccurrenceForTicket,
    NotConfirmedStatus,
    MaxCheckInsReached,
    OperatorNotAuthorized,
}

impl CheckInFailureCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCode => "INVALID_CODE",
            Self::WrongEvent => "WRONG_EVENT",
            Self::WrongOccurrenceForTicket => "WRONG_OCCURRENCE_FOR_TICKET",
            Self::NotConfirmedStatus => "NOT_CONFIRMED_STATUS",
            Self::MaxCheckInsReached => "MAX_CHECK_INS_REACHED",
            Self::OperatorNotAuthorized => "OPERATOR_NOT_AUTHORIZED",
        }
    }

    /// Lower ranks win when several reasons apply to one attempt.
    pub fn precedence(self) -> u8 {
        match self {
            Self::InvalidCode => 0,
            Self::WrongEvent => 1,
            Self::WrongOccurrenceForTicket => 2,
            Self::NotConfirmedStatus => 3,
            Self::OperatorNotAuthorized => 4,
            Self::MaxCheckInsReached => 5,
        }
    }
}

impl std::fmt::Display for CheckInFailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of one attempt. Only `Success` counts toward a unit's
/// check-in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_in_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckInOutcome {
    Success,
    FailedInvalidCode,
    FailedWrongEvent,
    FailedWrongOccurrenceForTicket,
    FailedNotConfirmedStatus,
    FailedMaxCheckInsReached,
    FailedOperatorNotAuthorized,
}

impl CheckInOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn failure_code(self) -> Option<CheckInFailureCode> {
        match self {
            Self::Success => None,
            Self::FailedInvalidCode => Some(CheckInFailureCode::InvalidCode),
            Self::FailedWrongEvent => Some(CheckInFailureCode::WrongEvent),
            Self::FailedWrongOccurrenceForTicket => {
                Some(CheckInFailureCode::WrongOccurrenceForTicket)
            }
            Self::FailedNotConfirmedStatus => Some(CheckInFailureCode::NotConfirmedStatus),
            Self::FailedMaxCheckInsReached => Some(CheckInFailureCode::MaxCheckInsReached),
            Self::FailedOperatorNotAuthorized => Some(CheckInFailureCode::OperatorNotAuthorized),
        }
    }
}

impl From<CheckInFailureCode> for CheckInOutcome {
    fn from(code: CheckInFailureCode) -> Self {
        match code {
            CheckInFailureCode::InvalidCode => Self::FailedInvalidCode,
            CheckInFailureCode::WrongEvent => Self::FailedWrongEvent,
            CheckInFailureCode::WrongOccurrenceForTicket => Self::FailedWrongOccurrenceForTicket,
            CheckInFailureCode::NotConfirmedStatus => Self::FailedNotConfirmedStatus,
            CheckInFailureCode::MaxCheckInsReached => Self::FailedMaxCheckInsReached,
            CheckInFailureCode::OperatorNotAuthorized => Self::FailedOperatorNotAuthorized,
        }
    }
}

/// Append-only audit record of one scan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInAttempt {
    pub id: Uuid,
    /// `None` when the scanned code matched no ticket unit.
    pub ticket_unit_id: Option<Uuid>,
    pub occurrence_id: Uuid,
    pub scanned_code: String,
    pub method: CheckInMethod,
    pub operator_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub outcome: CheckInOutcome,
    pub note: Option<String>,
    pub attempted_at: DateTime<Utc>,
}
