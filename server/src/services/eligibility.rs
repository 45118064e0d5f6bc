//! Pure check-in eligibility decision.
//!
//! Every rule is evaluated independently and all failures are reported, so
//! operator tooling can show the complete picture. The orchestrator picks
//! the single code it records with [`primary_reason`].

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{CheckInFailureCode, Event, Occurrence, TicketKind, TicketUnit};

/// Authorization facts about the scanning operator, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    pub user_id: Uuid,
    pub is_platform_admin: bool,
    pub organizer_ids: HashSet<Uuid>,
}

impl OperatorContext {
    pub fn may_check_in_for(&self, event: &Event) -> bool {
        self.is_platform_admin || self.organizer_ids.contains(&event.organizer_id)
    }
}

pub struct EligibilityInput<'a> {
    pub unit: &'a TicketUnit,
    /// The kind the unit was bought under, when it names one and it still exists.
    pub ticket_kind: Option<&'a TicketKind>,
    pub occurrence: &'a Occurrence,
    /// The event owning `occurrence`.
    pub event: &'a Event,
    pub successful_check_ins: i64,
    /// `None` for self-service check-in.
    pub operator: Option<&'a OperatorContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible { remaining_check_ins: i64 },
    Ineligible(Vec<CheckInFailureCode>),
}

pub fn evaluate(input: &EligibilityInput<'_>) -> Eligibility {
    let mut reasons = Vec::new();

    if let Some(operator) = input.operator {
        if !operator.may_check_in_for(input.event) {
            reasons.push(CheckInFailureCode::OperatorNotAuthorized);
        }
    }

    if input.unit.event_id != input.occurrence.event_id {
        reasons.push(CheckInFailureCode::WrongEvent);
    }

    if input.unit.ticket_kind_id.is_some() {
        let compatible = input.ticket_kind.is_some_and(|kind| {
            kind.event_id == input.occurrence.event_id
                && kind.is_valid_for_occurrence(input.occurrence.id)
        });
        if !compatible {
            reasons.push(CheckInFailureCode::WrongOccurrenceForTicket);
        }
    }

    if !input.unit.status.admits_check_in() {
        reasons.push(CheckInFailureCode::NotConfirmedStatus);
    }

    let allowed = i64::from(input.unit.max_check_ins);
    if input.successful_check_ins >= allowed {
        reasons.push(CheckInFailureCode::MaxCheckInsReached);
    }

    if reasons.is_empty() {
        Eligibility::Eligible {
            remaining_check_ins: allowed - input.successful_check_ins,
        }
    } else {
        Eligibility::Ineligible(reasons)
    }
}

/// invalid code > wrong event/occurrence > status > operator > quota
pub fn primary_reason(reasons: &[CheckInFailureCode]) -> Option<CheckInFailureCode> {
    reasons.iter().copied().min_by_key(|code| code.precedence())
}
