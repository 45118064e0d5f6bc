//! Check-in write path.
//!
//! Each scan runs in one transaction holding the ticket unit's row lock.
//! The success count is read under that lock, so two scans racing for a
//! unit's last remaining check-in serialise and the second one observes the
//! first one's attempt row. Every scan that can be tied to an existing
//! occurrence or ticket unit leaves an attempt record, successful or not.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CheckInAttempt, CheckInFailureCode, CheckInMethod, CheckInOutcome, InvalidTransition,
    TicketUnit, TicketUnitStatus,
};
use crate::services::eligibility::{self, Eligibility, EligibilityInput, OperatorContext};
use crate::store::{AuthorizationLookup, Store, StoreError, StoreTx};
use crate::utils::clock::{Clock, SystemClock};

#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("storage failure")]
    Internal(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub scanned_code: String,
    pub occurrence_id: Uuid,
    pub operator_id: Option<Uuid>,
    pub method: CheckInMethod,
    pub device_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckInResult {
    Admitted {
        attempt_id: Uuid,
        ticket_unit_id: Uuid,
        first_check_in: bool,
        remaining_check_ins: i64,
    },
    Rejected {
        /// `None` only when nothing could be recorded.
        attempt_id: Option<Uuid>,
        code: CheckInFailureCode,
        reasons: Vec<CheckInFailureCode>,
        message: String,
    },
}

impl CheckInResult {
    pub fn failure_code(&self) -> Option<CheckInFailureCode> {
        match self {
            Self::Admitted { .. } => None,
            Self::Rejected { code, .. } => Some(*code),
        }
    }
}

pub struct CheckInService<S: Store> {
    store: S,
    authorization: Arc<dyn AuthorizationLookup>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> CheckInService<S> {
    pub fn new(store: S, authorization: Arc<dyn AuthorizationLookup>) -> Self {
        Self {
            store,
            authorization,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn operator_context(&self, user_id: Uuid) -> Result<OperatorContext, StoreError> {
        Ok(OperatorContext {
            user_id,
            is_platform_admin: self.authorization.is_platform_admin(user_id).await?,
            organizer_ids: self.authorization.organizer_ids_for(user_id).await?,
        })
    }

    pub async fn attempt(&self, request: CheckInRequest) -> Result<CheckInResult, CheckInError> {
        let operator = match request.operator_id {
            Some(user_id) => Some(self.operator_context(user_id).await?),
            None => None,
        };

        let mut tx = self.store.begin().await?;

        let code = request.scanned_code.trim();
        let unit = match tx.lock_unit_by_code(code).await? {
            Some(unit) => Some(unit),
            None => tx.lock_unit_by_reference(code).await?,
        };
        let occurrence = tx.occurrence(request.occurrence_id).await?;

        let (unit, occurrence) = match (unit, occurrence) {
            (Some(unit), Some(occurrence)) => (unit, occurrence),
            (None, None) => {
                return Err(CheckInError::NotFound(format!(
                    "occurrence {}",
                    request.occurrence_id
                )));
            }
            (unit, _) => {
                let result = self
                    .reject(&mut tx, &request, unit.as_ref(), 0, vec![CheckInFailureCode::InvalidCode])
                    .await?;
                tx.commit().await?;
                return Ok(result);
            }
        };

        let event = tx
            .event(occurrence.event_id)
            .await?
            .ok_or_else(|| CheckInError::NotFound(format!("event {}", occurrence.event_id)))?;

        let ticket_kind = match unit.ticket_kind_id {
            Some(kind_id) => tx.ticket_kind(kind_id).await?,
            None => None,
        };

        let successful_check_ins = tx.count_successful_check_ins(unit.id).await?;

        let decision = eligibility::evaluate(&EligibilityInput {
            unit: &unit,
            ticket_kind: ticket_kind.as_ref(),
            occurrence: &occurrence,
            event: &event,
            successful_check_ins,
            operator: operator.as_ref(),
        });

        let remaining_check_ins = match decision {
            Eligibility::Ineligible(reasons) => {
                let result = self
                    .reject(&mut tx, &request, Some(&unit), successful_check_ins, reasons)
                    .await?;
                tx.commit().await?;
                return Ok(result);
            }
            Eligibility::Eligible { remaining_check_ins } => remaining_check_ins,
        };

        // Decided before the new success row exists.
        let first_check_in = successful_check_ins == 0;

        let attempt = self.attempt_record(&request, Some(unit.id), CheckInOutcome::Success);
        tx.insert_check_in_attempt(&attempt).await?;

        if first_check_in && unit.status == TicketUnitStatus::Confirmed {
            let next = unit.status.transition(TicketUnitStatus::Used)?;
            tx.update_unit_status(unit.id, next).await?;
        }

        tx.commit().await?;

        let remaining_check_ins = remaining_check_ins - 1;
        tracing::info!(
            attempt_id = %attempt.id,
            ticket_unit_id = %unit.id,
            occurrence_id = %occurrence.id,
            first_check_in,
            remaining_check_ins,
            "Check-in admitted"
        );

        Ok(CheckInResult::Admitted {
            attempt_id: attempt.id,
            ticket_unit_id: unit.id,
            first_check_in,
            remaining_check_ins,
        })
    }

    fn attempt_record(
        &self,
        request: &CheckInRequest,
        ticket_unit_id: Option<Uuid>,
        outcome: CheckInOutcome,
    ) -> CheckInAttempt {
        CheckInAttempt {
            id: Uuid::new_v4(),
            ticket_unit_id,
            occurrence_id: request.occurrence_id,
            scanned_code: request.scanned_code.clone(),
            method: request.method,
            operator_id: request.operator_id,
            device_id: request.device_id.clone(),
            outcome,
            note: request.note.clone(),
            attempted_at: self.clock.now(),
        }
    }

    async fn reject(
        &self,
        tx: &mut S::Tx,
        request: &CheckInRequest,
        unit: Option<&TicketUnit>,
        successful_check_ins: i64,
        reasons: Vec<CheckInFailureCode>,
    ) -> Result<CheckInResult, StoreError> {
        let code = eligibility::primary_reason(&reasons).unwrap_or(CheckInFailureCode::InvalidCode);
        let attempt = self.attempt_record(request, unit.map(|u| u.id), CheckInOutcome::from(code));
        tx.insert_check_in_attempt(&attempt).await?;

        let message = rejection_message(&attempt, code, unit, successful_check_ins);
        tracing::info!(
            attempt_id = %attempt.id,
            code = code.as_str(),
            occurrence_id = %request.occurrence_id,
            ticket_unit_id = ?attempt.ticket_unit_id,
            "Check-in rejected"
        );

        Ok(CheckInResult::Rejected {
            attempt_id: Some(attempt.id),
            code,
            reasons,
            message,
        })
    }
}

/// Operator-facing text for a rejected attempt.
fn rejection_message(
    attempt: &CheckInAttempt,
    code: CheckInFailureCode,
    unit: Option<&TicketUnit>,
    successful_check_ins: i64,
) -> String {
    let ticket = unit.map_or(attempt.scanned_code.as_str(), |u| u.reference.as_str());
    match (code, unit) {
        (CheckInFailureCode::InvalidCode, None) => {
            format!("no ticket matches code {}", attempt.scanned_code)
        }
        (CheckInFailureCode::InvalidCode, Some(_)) => {
            format!("ticket {ticket} cannot be checked into an unknown occurrence")
        }
        (CheckInFailureCode::WrongEvent, _) => {
            format!("ticket {ticket} belongs to a different event")
        }
        (CheckInFailureCode::WrongOccurrenceForTicket, _) => {
            format!("ticket {ticket} is not valid for this occurrence")
        }
        (CheckInFailureCode::NotConfirmedStatus, Some(unit)) => {
            format!("ticket {ticket} is {}, not confirmed", unit.status.as_str())
        }
        (CheckInFailureCode::NotConfirmedStatus, None) => format!("ticket {ticket} is not confirmed"),
        (CheckInFailureCode::OperatorNotAuthorized, _) => match attempt.operator_id {
            Some(operator) => format!("operator {operator} may not check in tickets for this event"),
            None => "operator may not check in tickets for this event".to_string(),
        },
        (CheckInFailureCode::MaxCheckInsReached, Some(unit)) => format!(
            "ticket {ticket} already used {successful_check_ins} of {} check-ins",
            unit.max_check_ins
        ),
        (CheckInFailureCode::MaxCheckInsReached, None) => {
            format!("ticket {ticket} has no check-ins left")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attempt(operator_id: Option<Uuid>) -> CheckInAttempt {
        CheckInAttempt {
            id: Uuid::new_v4(),
            ticket_unit_id: None,
            occurrence_id: Uuid::new_v4(),
            scanned_code: "ZZZ".to_string(),
            method: CheckInMethod::QrScan,
            operator_id,
            device_id: None,
            outcome: CheckInOutcome::FailedInvalidCode,
            note: None,
            attempted_at: Utc::now(),
        }
    }

    fn unit() -> TicketUnit {
        TicketUnit {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            occurrence_id: Uuid::new_v4(),
            ticket_kind_id: None,
            code: "ABC".to_string(),
            reference: "ORD-0000ABCD-01".to_string(),
            price: 0,
            currency: "USD".to_string(),
            status: TicketUnitStatus::Used,
            max_check_ins: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_code_message() {
        let message = rejection_message(&attempt(None), CheckInFailureCode::InvalidCode, None, 0);
        assert_eq!(message, "no ticket matches code ZZZ");
    }

    #[test]
    fn test_quota_message_uses_reference() {
        let message =
            rejection_message(&attempt(None), CheckInFailureCode::MaxCheckInsReached, Some(&unit()), 1);
        assert_eq!(message, "ticket ORD-0000ABCD-01 already used 1 of 1 check-ins");
    }

    #[test]
    fn test_operator_message_names_operator() {
        let operator = Uuid::new_v4();
        let message = rejection_message(
            &attempt(Some(operator)),
            CheckInFailureCode::OperatorNotAuthorized,
            Some(&unit()),
            0,
        );
        assert!(message.contains(&operator.to_string()));
    }
}
