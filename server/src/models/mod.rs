pub mod checkin;
pub mod event;
pub mod organizer;
pub mod ticket;
pub mod transaction;
pub mod user;

use thiserror::Error;

pub use checkin::{CheckInAttempt, CheckInFailureCode, CheckInMethod, CheckInOutcome};
pub use event::{Event, Occurrence};
pub use organizer::OrganizerMember;
pub use ticket::{DiscountKind, MembershipDiscount, TicketKind, TicketUnit, TicketUnitStatus};
pub use transaction::{Order, OrderStatus};
pub use user::{Membership, MembershipLevel, MembershipStatus, User};

/// A lifecycle move the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}
