//! Booking and check-in core for an event-ticketing platform.
//!
//! Two write paths live here: [`services::BookingService`] turns a cart into
//! one order plus one ticket unit per seat without overselling, and
//! [`services::CheckInService`] admits scanned tickets into an occurrence
//! while keeping an append-only audit trail of every attempt.

pub mod config;
pub mod handlers;
pub mod models;
pub mod payment;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
