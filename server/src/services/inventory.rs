//! Stock and per-order limit checks.
//!
//! Remaining capacity is derived from the number of units already holding
//! inventory, counted by the caller inside the transaction that will insert
//! the new units. There is no stored counter to decrement.

use crate::models::TicketKind;

use super::booking::ViolationReason;

/// Checks, in order: minimum per order, maximum per order, remaining stock.
/// The first failing rule is reported.
pub fn check(kind: &TicketKind, requested: u32, units_holding_inventory: i64) -> Result<(), ViolationReason> {
    let requested = i64::from(requested);

    if requested < i64::from(kind.min_per_order) {
        return Err(ViolationReason::BelowMinimum {
            minimum: kind.min_per_order,
        });
    }

    if let Some(maximum) = kind.max_per_order {
        if requested > i64::from(maximum) {
            return Err(ViolationReason::AboveMaximum { maximum });
        }
    }

    // No capacity configured: unlimited stock.
    if let Some(capacity) = kind.total_capacity {
        let remaining = (i64::from(capacity) - units_holding_inventory).max(0);
        if requested > remaining {
            return Err(ViolationReason::InsufficientStock { remaining });
        }
    }

    Ok(())
}
