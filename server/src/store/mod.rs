//! Storage seams for the booking and check-in write paths.
//!
//! Every orchestrator call runs inside one [`StoreTx`]. Dropping a
//! transaction without calling [`StoreTx::commit`] rolls it back, so an
//! early `?` return never leaves partial rows behind.
//!
//! Counters are never stored: remaining capacity and check-in totals are
//! derived by counting rows inside the same transaction that writes, after
//! taking the row lock on the contested ticket kind or ticket unit.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CheckInAttempt, Event, Membership, MembershipDiscount, MembershipLevel, Occurrence, Order,
    OrderStatus, TicketKind, TicketUnit, TicketUnitStatus,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[source] sqlx::Error),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A transactional storage engine.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One open transaction. `lock_*` methods hold an exclusive row lock on what
/// they return until commit or rollback.
#[async_trait]
pub trait StoreTx: Send {
    async fn occurrence(&mut self, id: Uuid) -> StoreResult<Option<Occurrence>>;

    async fn event(&mut self, id: Uuid) -> StoreResult<Option<Event>>;

    async fn ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>>;

    async fn lock_ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>>;

    /// Units of the kind in `pending_confirmation`, `confirmed` or `used`.
    async fn count_units_holding_inventory(&mut self, ticket_kind_id: Uuid) -> StoreResult<i64>;

    async fn membership_discount(
        &mut self,
        ticket_kind_id: Uuid,
        level: &MembershipLevel,
    ) -> StoreResult<Option<MembershipDiscount>>;

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn insert_ticket_unit(&mut self, unit: &TicketUnit) -> StoreResult<()>;

    async fn lock_order_by_handoff(&mut self, handoff_id: &str) -> StoreResult<Option<Order>>;

    async fn record_handoff(
        &mut self,
        order_id: Uuid,
        handoff_id: &str,
        redirect_url: &str,
    ) -> StoreResult<()>;

    async fn update_order_status(&mut self, order_id: Uuid, status: OrderStatus)
        -> StoreResult<()>;

    /// Removes an order together with its ticket units.
    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()>;

    async fn units_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<TicketUnit>>;

    async fn lock_unit_by_code(&mut self, code: &str) -> StoreResult<Option<TicketUnit>>;

    async fn lock_unit_by_reference(&mut self, reference: &str)
        -> StoreResult<Option<TicketUnit>>;

    async fn count_successful_check_ins(&mut self, ticket_unit_id: Uuid) -> StoreResult<i64>;

    async fn insert_check_in_attempt(&mut self, attempt: &CheckInAttempt) -> StoreResult<()>;

    async fn update_unit_status(
        &mut self,
        ticket_unit_id: Uuid,
        status: TicketUnitStatus,
    ) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}

/// Buyer membership collaborator used for pricing.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    /// The buyer's membership record, whatever its status. Callers decide
    /// whether it is active.
    async fn membership_of(&self, buyer_id: Uuid) -> StoreResult<Option<Membership>>;
}

/// Operator authorization collaborator used for check-in.
#[async_trait]
pub trait AuthorizationLookup: Send + Sync {
    async fn is_platform_admin(&self, user_id: Uuid) -> StoreResult<bool>;

    /// Organizers the user is an active staff member of.
    async fn organizer_ids_for(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>>;
}
