//! Booking initiation and payment settlement.
//!
//! Initiation validates every line item, prices it, and writes one order
//! plus one ticket unit per seat in a single transaction. Paid orders are
//! committed first and the payment handoff is requested afterwards, outside
//! any open transaction; if the handoff cannot be obtained the order is
//! removed again by a compensating transaction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::BookingSettings;
use crate::models::transaction::{order_reference, unit_reference};
use crate::models::ticket::generate_ticket_code;
use crate::models::{
    InvalidTransition, Membership, Occurrence, Order, OrderStatus, TicketKind, TicketUnit,
    TicketUnitStatus,
};
use crate::payment::{HandoffLine, HandoffRequest, PaymentCollaborator};
use crate::services::{inventory, pricing};
use crate::store::{MembershipLookup, Store, StoreError, StoreTx};
use crate::utils::clock::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ViolationReason {
    InvalidQuantity,
    NotOnSale,
    NotValidForOccurrence,
    BelowMinimum { minimum: i32 },
    AboveMaximum { maximum: i32 },
    InsufficientStock { remaining: i64 },
    MixedCurrency { expected: String, found: String },
    ExceedsOrderLimit { limit: u32 },
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidQuantity => write!(f, "quantity must be at least 1"),
            Self::NotOnSale => write!(f, "not on sale"),
            Self::NotValidForOccurrence => write!(f, "not valid for occurrence"),
            Self::BelowMinimum { minimum } => write!(f, "below minimum of {minimum}"),
            Self::AboveMaximum { maximum } => write!(f, "above maximum of {maximum}"),
            Self::InsufficientStock { remaining } => {
                write!(f, "insufficient stock, {remaining} remaining")
            }
            Self::MixedCurrency { expected, found } => {
                write!(f, "mixed currency, expected {expected} but found {found}")
            }
            Self::ExceedsOrderLimit { limit } => {
                write!(f, "order exceeds the limit of {limit} tickets")
            }
        }
    }
}

/// A line-item rejection, addressable by ticket kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingViolation {
    pub ticket_kind_id: Uuid,
    #[serde(flatten)]
    pub reason: ViolationReason,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("booking rejected with {} violation(s)", .0.len())]
    Validation(Vec<BookingViolation>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("payment handoff unavailable: {0}")]
    PaymentHandoff(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("storage failure")]
    Internal(#[from] StoreError),
}

impl BookingError {
    /// `{ "<ticket kind id>": ["<message>", ...] }`
    pub fn violation_details(violations: &[BookingViolation]) -> Value {
        let mut details = Map::new();
        for violation in violations {
            let entry = details
                .entry(violation.ticket_kind_id.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(messages) = entry {
                messages.push(Value::String(violation.reason.to_string()));
            }
        }
        Value::Object(details)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
pub struct LineItem {
    pub ticket_kind_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub buyer_id: Uuid,
    pub occurrence_id: Uuid,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingOutcome {
    PaymentRequired {
        order_id: Uuid,
        reference: String,
        handoff_id: String,
        redirect_url: String,
        total_amount: i64,
        currency: String,
    },
    Confirmed {
        order_id: Uuid,
        reference: String,
        total_amount: i64,
        currency: String,
        ticket_codes: Vec<String>,
    },
}

impl BookingOutcome {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::PaymentRequired { order_id, .. } | Self::Confirmed { order_id, .. } => *order_id,
        }
    }
}

/// A validated, priced line item.
struct PricedLine {
    kind: Option<TicketKind>,
    quantity: u32,
    unit_price: i64,
}

impl PricedLine {
    fn max_check_ins(&self, default: i32) -> i32 {
        self.kind
            .as_ref()
            .and_then(|k| k.max_check_ins)
            .unwrap_or(default)
            .max(1)
    }
}

pub struct BookingService<S: Store> {
    store: S,
    payments: Arc<dyn PaymentCollaborator>,
    memberships: Arc<dyn MembershipLookup>,
    clock: Arc<dyn Clock>,
    settings: BookingSettings,
}

impl<S: Store> BookingService<S> {
    pub fn new(
        store: S,
        payments: Arc<dyn PaymentCollaborator>,
        memberships: Arc<dyn MembershipLookup>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            store,
            payments,
            memberships,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn initiate(&self, request: BookingRequest) -> Result<BookingOutcome, BookingError> {
        let now = self.clock.now();

        let zero_quantity: Vec<_> = request
            .line_items
            .iter()
            .filter(|item| item.quantity == 0)
            .map(|item| BookingViolation {
                ticket_kind_id: item.ticket_kind_id,
                reason: ViolationReason::InvalidQuantity,
            })
            .collect();

        // Duplicate kinds are summed. BTreeMap order doubles as the lock order.
        let mut quantities: BTreeMap<Uuid, u32> = BTreeMap::new();
        for item in &request.line_items {
            let entry = quantities.entry(item.ticket_kind_id).or_insert(0);
            *entry = entry.saturating_add(item.quantity);
        }

        // Resolved before the transaction opens; lookups must not run under it.
        let membership = self.memberships.membership_of(request.buyer_id).await?;

        let mut tx = self.store.begin().await?;

        let occurrence = tx
            .occurrence(request.occurrence_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("occurrence {}", request.occurrence_id)))?;

        if !zero_quantity.is_empty() {
            return Err(self.rejected(&request, zero_quantity));
        }

        // Bounds the units written per order regardless of kind capacity.
        let requested: u64 = quantities.values().map(|&q| u64::from(q)).sum();
        let limit = self.settings.max_units_per_order;
        if requested > u64::from(limit) {
            let violations = quantities
                .keys()
                .map(|&ticket_kind_id| BookingViolation {
                    ticket_kind_id,
                    reason: ViolationReason::ExceedsOrderLimit { limit },
                })
                .collect();
            return Err(self.rejected(&request, violations));
        }

        let lines = if quantities.is_empty() {
            vec![PricedLine {
                kind: None,
                quantity: 1,
                unit_price: 0,
            }]
        } else {
            self.validate_and_price(&mut tx, &request, &occurrence, &quantities, membership.as_ref(), now)
                .await?
        };

        let currency = lines
            .iter()
            .find_map(|line| line.kind.as_ref().map(|k| k.currency.clone()))
            .unwrap_or_else(|| self.settings.default_currency.clone());

        let total_amount = lines.iter().try_fold(0i64, |acc, line| {
            line.unit_price
                .checked_mul(i64::from(line.quantity))
                .and_then(|amount| acc.checked_add(amount))
        });
        let total_amount = total_amount.ok_or_else(|| {
            BookingError::Validation(
                quantities
                    .keys()
                    .map(|id| BookingViolation {
                        ticket_kind_id: *id,
                        reason: ViolationReason::InvalidQuantity,
                    })
                    .collect(),
            )
        })?;

        let (order_status, unit_status) = if total_amount > 0 {
            (OrderStatus::PendingPayment, TicketUnitStatus::PendingConfirmation)
        } else {
            (OrderStatus::Confirmed, TicketUnitStatus::Confirmed)
        };

        let order_id = Uuid::new_v4();
        let reference = order_reference(order_id);
        let order = Order {
            id: order_id,
            reference: reference.clone(),
            buyer_id: request.buyer_id,
            occurrence_id: occurrence.id,
            currency: currency.clone(),
            total_amount,
            status: order_status,
            handoff_id: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&order).await?;

        let mut ticket_codes = Vec::new();
        let mut position = 0usize;
        for line in &lines {
            for _ in 0..line.quantity {
                position += 1;
                let unit = TicketUnit {
                    id: Uuid::new_v4(),
                    order_id,
                    buyer_id: request.buyer_id,
                    event_id: occurrence.event_id,
                    occurrence_id: occurrence.id,
                    ticket_kind_id: line.kind.as_ref().map(|k| k.id),
                    code: generate_ticket_code(),
                    reference: unit_reference(&reference, position),
                    price: line.unit_price,
                    currency: currency.clone(),
                    status: unit_status,
                    max_check_ins: line.max_check_ins(self.settings.default_max_check_ins),
                    created_at: now,
                };
                tx.insert_ticket_unit(&unit).await?;
                ticket_codes.push(unit.code);
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            buyer_id = %request.buyer_id,
            occurrence_id = %occurrence.id,
            units = position,
            total_amount,
            currency = %currency,
            status = order_status.as_str(),
            "Booking created"
        );

        if total_amount == 0 {
            return Ok(BookingOutcome::Confirmed {
                order_id,
                reference,
                total_amount,
                currency,
                ticket_codes,
            });
        }

        let handoff_request = HandoffRequest {
            order_id,
            order_reference: reference.clone(),
            buyer_id: request.buyer_id,
            lines: lines
                .iter()
                .map(|line| HandoffLine {
                    ticket_kind_id: line.kind.as_ref().map(|k| k.id),
                    description: line
                        .kind
                        .as_ref()
                        .map_or_else(|| "General admission".to_string(), |k| k.name.clone()),
                    quantity: line.quantity,
                    unit_amount: line.unit_price,
                    currency: currency.clone(),
                })
                .collect(),
            success_callback: self.settings.payment_success_url.clone(),
            cancel_callback: self.settings.payment_cancel_url.clone(),
            metadata: BTreeMap::from([
                ("order_id".to_string(), order_id.to_string()),
                ("occurrence_id".to_string(), occurrence.id.to_string()),
            ]),
        };

        let handoff = match self.payments.create_handoff(handoff_request).await {
            Ok(handoff) => handoff,
            Err(err) => {
                tracing::warn!(order_id = %order_id, error = %err, "Payment handoff failed, discarding order");
                self.discard_order(order_id, &err.to_string()).await?;
                return Err(BookingError::PaymentHandoff(err.to_string()));
            }
        };

        if let Err(err) = self.record_handoff(order_id, &handoff.handoff_id, &handoff.redirect_url).await {
            tracing::error!(order_id = %order_id, error = ?err, "Failed to persist payment handoff");
            self.discard_order(order_id, &err.to_string()).await?;
            return Err(err.into());
        }

        tracing::info!(order_id = %order_id, handoff_id = %handoff.handoff_id, "Payment handoff recorded");

        Ok(BookingOutcome::PaymentRequired {
            order_id,
            reference,
            handoff_id: handoff.handoff_id,
            redirect_url: handoff.redirect_url,
            total_amount,
            currency,
        })
    }

    async fn validate_and_price(
        &self,
        tx: &mut S::Tx,
        request: &BookingRequest,
        occurrence: &Occurrence,
        quantities: &BTreeMap<Uuid, u32>,
        membership: Option<&Membership>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<PricedLine>, BookingError> {
        // Lock every kind up front, in id order, before reading any counts.
        let mut kinds: HashMap<Uuid, TicketKind> = HashMap::with_capacity(quantities.len());
        for &kind_id in quantities.keys() {
            let kind = tx
                .lock_ticket_kind(kind_id)
                .await?
                .filter(|k| k.event_id == occurrence.event_id)
                .ok_or_else(|| BookingError::NotFound(format!("ticket kind {kind_id}")))?;
            kinds.insert(kind_id, kind);
        }

        // Validate in the order the buyer listed the kinds, so the first
        // priced item fixes the order currency.
        let mut appearance: Vec<Uuid> = Vec::with_capacity(quantities.len());
        for item in &request.line_items {
            if !appearance.contains(&item.ticket_kind_id) {
                appearance.push(item.ticket_kind_id);
            }
        }

        let mut violations = Vec::new();
        let mut lines = Vec::with_capacity(appearance.len());
        let mut expected_currency: Option<String> = None;

        for kind_id in appearance {
            let (Some(kind), Some(&quantity)) = (kinds.remove(&kind_id), quantities.get(&kind_id))
            else {
                continue;
            };

            if !kind.is_on_sale_at(now) {
                violations.push(BookingViolation {
                    ticket_kind_id: kind_id,
                    reason: ViolationReason::NotOnSale,
                });
                continue;
            }

            if !kind.is_valid_for_occurrence(occurrence.id) {
                violations.push(BookingViolation {
                    ticket_kind_id: kind_id,
                    reason: ViolationReason::NotValidForOccurrence,
                });
                continue;
            }

            let holding = tx.count_units_holding_inventory(kind_id).await?;
            if let Err(reason) = inventory::check(&kind, quantity, holding) {
                violations.push(BookingViolation {
                    ticket_kind_id: kind_id,
                    reason,
                });
                continue;
            }

            match &expected_currency {
                Some(expected) if expected != &kind.currency => {
                    violations.push(BookingViolation {
                        ticket_kind_id: kind_id,
                        reason: ViolationReason::MixedCurrency {
                            expected: expected.clone(),
                            found: kind.currency.clone(),
                        },
                    });
                    continue;
                }
                Some(_) => {}
                None => expected_currency = Some(kind.currency.clone()),
            }

            let unit_price = pricing::resolve(&mut *tx, &kind, membership, now).await?;
            lines.push(PricedLine {
                kind: Some(kind),
                quantity,
                unit_price,
            });
        }

        if violations.is_empty() {
            Ok(lines)
        } else {
            Err(self.rejected(request, violations))
        }
    }

    fn rejected(&self, request: &BookingRequest, violations: Vec<BookingViolation>) -> BookingError {
        tracing::info!(
            buyer_id = %request.buyer_id,
            occurrence_id = %request.occurrence_id,
            violations = violations.len(),
            "Booking rejected"
        );
        BookingError::Validation(violations)
    }

    async fn record_handoff(
        &self,
        order_id: Uuid,
        handoff_id: &str,
        redirect_url: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.record_handoff(order_id, handoff_id, redirect_url).await?;
        tx.commit().await
    }

    /// Compensates a committed order whose handoff fell through. If this
    /// fails too, the pending order stays behind and both errors are logged.
    async fn discard_order(
        &self,
        order_id: Uuid,
        cause: &str,
    ) -> Result<(), StoreError> {
        let result: Result<(), StoreError> = async {
            let mut tx = self.store.begin().await?;
            tx.delete_order(order_id).await?;
            tx.commit().await
        }
        .await;

        if let Err(store_err) = &result {
            tracing::error!(
                order_id = %order_id,
                cause = %cause,
                error = ?store_err,
                "Failed to discard order, pending order left behind"
            );
        }
        result
    }

    /// Payment succeeded: the order and its units become confirmed.
    pub async fn confirm_payment(&self, handoff_id: &str) -> Result<Order, BookingError> {
        self.settle(handoff_id, OrderStatus::Confirmed, TicketUnitStatus::Confirmed)
            .await
    }

    /// Payment failed: the order fails and its units are cancelled, which
    /// returns them to the kind's capacity.
    pub async fn fail_payment(&self, handoff_id: &str) -> Result<Order, BookingError> {
        self.settle(handoff_id, OrderStatus::Failed, TicketUnitStatus::Cancelled)
            .await
    }

    async fn settle(
        &self,
        handoff_id: &str,
        order_status: OrderStatus,
        unit_status: TicketUnitStatus,
    ) -> Result<Order, BookingError> {
        let mut tx = self.store.begin().await?;

        let mut order = tx
            .lock_order_by_handoff(handoff_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("payment handoff {handoff_id}")))?;

        order.status = order.status.transition(order_status)?;
        tx.update_order_status(order.id, order.status).await?;

        let units = tx.units_for_order(order.id).await?;
        for unit in &units {
            let next = unit.status.transition(unit_status)?;
            tx.update_unit_status(unit.id, next).await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            handoff_id = %handoff_id,
            status = order.status.as_str(),
            units = units.len(),
            "Order settled"
        );

        Ok(order)
    }
}
