use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::InvalidTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Confirmed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// An order leaves `pending_payment` exactly once and never comes back.
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        match (self, next) {
            (Self::PendingPayment, Self::Confirmed | Self::Failed | Self::Cancelled) => Ok(next),
            (
                Self::PendingPayment | Self::Confirmed | Self::Failed | Self::Cancelled,
                Self::PendingPayment | Self::Confirmed | Self::Failed | Self::Cancelled,
            ) => Err(InvalidTransition {
                entity: "order",
                from: self.as_str(),
                to: next.as_str(),
            }),
        }
    }
}

/// Billing envelope for one checkout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub buyer_id: Uuid,
    pub occurrence_id: Uuid,
    pub currency: String,
    /// Sum of the unit prices at purchase time, in minor units.
    pub total_amount: i64,
    pub status: OrderStatus,
    pub handoff_id: Option<String>,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `ORD-` followed by sixteen upper-case hex digits taken from the low half
/// of the order id, which is random for v4 ids.
pub fn order_reference(order_id: Uuid) -> String {
    format!("ORD-{:016X}", order_id.as_u128() as u64)
}

/// Legacy per-unit reference: the order reference plus a two-digit position.
pub fn unit_reference(order_reference: &str, position: usize) -> String {
    format!("{order_reference}-{position:02}")
}
