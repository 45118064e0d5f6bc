use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::MembershipLevel;
use super::InvalidTransition;

/// A sellable ticket category. Prices are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketKind {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub min_per_order: i32,
    pub max_per_order: Option<i32>,
    /// `None` means unlimited stock.
    pub total_capacity: Option<i32>,
    pub sales_start: Option<DateTime<Utc>>,
    pub sales_end: Option<DateTime<Utc>>,
    pub max_check_ins: Option<i32>,
    /// Occurrences this kind is restricted to. Empty means every occurrence
    /// of the event.
    pub occurrence_ids: Vec<Uuid>,
}

impl TicketKind {
    pub fn is_on_sale_at(&self, now: DateTime<Utc>) -> bool {
        self.sales_start.map_or(true, |start| start <= now)
            && self.sales_end.map_or(true, |end| now < end)
    }

    pub fn is_valid_for_occurrence(&self, occurrence_id: Uuid) -> bool {
        self.occurrence_ids.is_empty() || self.occurrence_ids.contains(&occurrence_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    /// Value is in minor currency units.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipDiscount {
    pub ticket_kind_id: Uuid,
    pub level: MembershipLevel,
    pub kind: DiscountKind,
    pub value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_unit_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketUnitStatus {
    PendingConfirmation,
    Confirmed,
    Used,
    Cancelled,
}

impl TicketUnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingConfirmation => "pending_confirmation",
            Self::Confirmed => "confirmed",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
        }
    }

    /// Units in these states occupy a slot of their kind's capacity.
    pub fn holds_inventory(self) -> bool {
        match self {
            Self::PendingConfirmation | Self::Confirmed | Self::Used => true,
            Self::Cancelled => false,
        }
    }

    pub fn admits_check_in(self) -> bool {
        match self {
            Self::Confirmed | Self::Used => true,
            Self::PendingConfirmation | Self::Cancelled => false,
        }
    }

    /// `pending_confirmation -> confirmed -> used`, with `cancelled`
    /// reachable from any non-terminal state.
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        match (self, next) {
            (Self::PendingConfirmation, Self::Confirmed)
            | (Self::Confirmed, Self::Used)
            | (Self::PendingConfirmation | Self::Confirmed, Self::Cancelled) => Ok(next),
            (
                Self::PendingConfirmation | Self::Confirmed | Self::Used | Self::Cancelled,
                Self::PendingConfirmation | Self::Confirmed | Self::Used | Self::Cancelled,
            ) => Err(InvalidTransition {
                entity: "ticket unit",
                from: self.as_str(),
                to: next.as_str(),
            }),
        }
    }
}

/// One physical, scannable ticket.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketUnit {
    pub id: Uuid,
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub event_id: Uuid,
    pub occurrence_id: Uuid,
    /// `None` for a free general-admission unit.
    pub ticket_kind_id: Option<Uuid>,
    pub code: String,
    /// Human-readable reference accepted by check-in as a legacy code.
    pub reference: String,
    /// Snapshot of the price charged, never recomputed.
    pub price: i64,
    pub currency: String,
    pub status: TicketUnitStatus,
    pub max_check_ins: i32,
    pub created_at: DateTime<Utc>,
}

/// Generates a scannable code for a new ticket unit.
pub fn generate_ticket_code() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}
