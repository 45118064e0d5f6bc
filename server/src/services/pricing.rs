//! Authoritative unit pricing. Client-supplied prices are never consulted.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{DiscountKind, Membership, MembershipDiscount, MembershipLevel, TicketKind};
use crate::store::{StoreResult, StoreTx};

/// The level a membership prices at, if it is active at `now`.
pub fn active_level(membership: Option<&Membership>, now: DateTime<Utc>) -> Option<&MembershipLevel> {
    membership
        .filter(|m| m.is_active_at(now))
        .map(|m| &m.level)
}

/// Applies `discount` to `price`. The result is clamped to `0..=price`.
pub fn apply_discount(price: i64, discount: &MembershipDiscount) -> i64 {
    let discounted = match discount.kind {
        DiscountKind::Percentage => {
            let off = (Decimal::from(price) * discount.value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            price.saturating_sub(off.to_i64().unwrap_or(price))
        }
        DiscountKind::Fixed => {
            let off = discount
                .value
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            price.saturating_sub(off.to_i64().unwrap_or(price))
        }
    };
    discounted.clamp(0, price.max(0))
}

/// Unit price for `kind` given the discount matching the buyer's level, if any.
pub fn unit_price(kind: &TicketKind, discount: Option<&MembershipDiscount>) -> i64 {
    match discount {
        Some(discount) if discount.ticket_kind_id == kind.id => apply_discount(kind.price, discount),
        _ => kind.price,
    }
}

/// Resolves the price a buyer pays for one unit of `kind` inside `tx`.
pub async fn resolve<T: StoreTx>(
    tx: &mut T,
    kind: &TicketKind,
    membership: Option<&Membership>,
    now: DateTime<Utc>,
) -> StoreResult<i64> {
    let discount = match active_level(membership, now) {
        Some(level) => tx.membership_discount(kind.id, level).await?,
        None => None,
    };
    Ok(unit_price(kind, discount.as_ref()))
}
