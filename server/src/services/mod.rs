pub mod booking;
pub mod checkin;
pub mod eligibility;
pub mod inventory;
pub mod pricing;

pub use booking::{BookingError, BookingOutcome, BookingRequest, BookingService, LineItem};
pub use checkin::{CheckInError, CheckInRequest, CheckInResult, CheckInService};
