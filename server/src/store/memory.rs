//! In-memory store for tests and local runs.
//!
//! Transactions are fully serialised: `begin` takes the store-wide lock and
//! works on a private copy of the state, `commit` swaps the copy in, and a
//! dropped transaction simply discards it.
//!
//! The lookup traits take the same lock, so they must not be awaited while a
//! transaction from the same store is open on the current task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AuthorizationLookup, MembershipLookup, Store, StoreError, StoreResult, StoreTx};
use crate::models::{
    CheckInAttempt, Event, Membership, MembershipDiscount, MembershipLevel, Occurrence, Order,
    OrderStatus, OrganizerMember, TicketKind, TicketUnit, TicketUnitStatus, User,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    occurrences: HashMap<Uuid, Occurrence>,
    ticket_kinds: HashMap<Uuid, TicketKind>,
    discounts: Vec<MembershipDiscount>,
    users: HashMap<Uuid, User>,
    memberships: HashMap<Uuid, Membership>,
    organizer_members: Vec<OrganizerMember>,
    orders: HashMap<Uuid, Order>,
    order_references: HashMap<String, Uuid>,
    units: HashMap<Uuid, TicketUnit>,
    unit_codes: HashMap<String, Uuid>,
    unit_references: HashMap<String, Uuid>,
    attempts: Vec<CheckInAttempt>,
}

impl MemoryState {
    fn unit_by(&self, index: &HashMap<String, Uuid>, key: &str) -> Option<TicketUnit> {
        index.get(key).and_then(|id| self.units.get(id)).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses every later `begin` with [`StoreError::Unavailable`], the way
    /// a closed connection pool would. Open transactions are unaffected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn insert_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_occurrence(&self, occurrence: Occurrence) {
        self.state.lock().await.occurrences.insert(occurrence.id, occurrence);
    }

    /// Inserts or replaces a ticket kind.
    pub async fn upsert_ticket_kind(&self, kind: TicketKind) {
        self.state.lock().await.ticket_kinds.insert(kind.id, kind);
    }

    /// Inserts or replaces the discount for a (kind, level) pair.
    pub async fn upsert_discount(&self, discount: MembershipDiscount) {
        let mut state = self.state.lock().await;
        state
            .discounts
            .retain(|d| !(d.ticket_kind_id == discount.ticket_kind_id && d.level == discount.level));
        state.discounts.push(discount);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn upsert_membership(&self, membership: Membership) {
        self.state
            .lock()
            .await
            .memberships
            .insert(membership.user_id, membership);
    }

    pub async fn insert_organizer_member(&self, member: OrganizerMember) {
        self.state.lock().await.organizer_members.push(member);
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.values().cloned().collect()
    }

    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn units(&self) -> Vec<TicketUnit> {
        self.state.lock().await.units.values().cloned().collect()
    }

    pub async fn unit(&self, unit_id: Uuid) -> Option<TicketUnit> {
        self.state.lock().await.units.get(&unit_id).cloned()
    }

    pub async fn units_of_order(&self, order_id: Uuid) -> Vec<TicketUnit> {
        let mut units: Vec<_> = self
            .state
            .lock()
            .await
            .units
            .values()
            .filter(|u| u.order_id == order_id)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.reference.cmp(&b.reference));
        units
    }

    /// Attempts in insertion order.
    pub async fn attempts(&self) -> Vec<CheckInAttempt> {
        self.state.lock().await.attempts.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store closed".to_string()));
        }
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(MemoryTx { guard, working })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryTx {
    fn order_mut(&mut self, order_id: Uuid) -> StoreResult<&mut Order> {
        self.working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Conflict(format!("order {order_id} does not exist")))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn occurrence(&mut self, id: Uuid) -> StoreResult<Option<Occurrence>> {
        Ok(self.working.occurrences.get(&id).cloned())
    }

    async fn event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.working.events.get(&id).cloned())
    }

    async fn ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>> {
        Ok(self.working.ticket_kinds.get(&id).cloned())
    }

    async fn lock_ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>> {
        // The whole store is already held exclusively.
        self.ticket_kind(id).await
    }

    async fn count_units_holding_inventory(&mut self, ticket_kind_id: Uuid) -> StoreResult<i64> {
        let count = self
            .working
            .units
            .values()
            .filter(|u| u.ticket_kind_id == Some(ticket_kind_id) && u.status.holds_inventory())
            .count();
        Ok(count as i64)
    }

    async fn membership_discount(
        &mut self,
        ticket_kind_id: Uuid,
        level: &MembershipLevel,
    ) -> StoreResult<Option<MembershipDiscount>> {
        Ok(self
            .working
            .discounts
            .iter()
            .find(|d| d.ticket_kind_id == ticket_kind_id && &d.level == level)
            .cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        if self.working.order_references.contains_key(&order.reference) {
            return Err(StoreError::Conflict(format!(
                "order reference {} already exists",
                order.reference
            )));
        }
        self.working
            .order_references
            .insert(order.reference.clone(), order.id);
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_ticket_unit(&mut self, unit: &TicketUnit) -> StoreResult<()> {
        let state = &mut self.working;
        if state.units.contains_key(&unit.id) {
            return Err(StoreError::Conflict(format!("ticket unit {} already exists", unit.id)));
        }
        if state.unit_codes.contains_key(&unit.code) {
            return Err(StoreError::Conflict(format!(
                "ticket code {} already exists",
                unit.code
            )));
        }
        if state.unit_references.contains_key(&unit.reference) {
            return Err(StoreError::Conflict(format!(
                "ticket reference {} already exists",
                unit.reference
            )));
        }
        state.unit_codes.insert(unit.code.clone(), unit.id);
        state.unit_references.insert(unit.reference.clone(), unit.id);
        state.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn lock_order_by_handoff(&mut self, handoff_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.handoff_id.as_deref() == Some(handoff_id))
            .cloned())
    }

    async fn record_handoff(
        &mut self,
        order_id: Uuid,
        handoff_id: &str,
        redirect_url: &str,
    ) -> StoreResult<()> {
        let order = self.order_mut(order_id)?;
        order.handoff_id = Some(handoff_id.to_string());
        order.redirect_url = Some(redirect_url.to_string());
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> StoreResult<()> {
        let order = self.order_mut(order_id)?;
        order.status = status;
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()> {
        let state = &mut self.working;
        let unit_ids: Vec<Uuid> = state
            .units
            .values()
            .filter(|u| u.order_id == order_id)
            .map(|u| u.id)
            .collect();
        for unit_id in unit_ids {
            if let Some(unit) = state.units.remove(&unit_id) {
                state.unit_codes.remove(&unit.code);
                state.unit_references.remove(&unit.reference);
            }
        }
        if let Some(order) = state.orders.remove(&order_id) {
            state.order_references.remove(&order.reference);
        }
        Ok(())
    }

    async fn units_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<TicketUnit>> {
        let mut units: Vec<_> = self
            .working
            .units
            .values()
            .filter(|u| u.order_id == order_id)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(units)
    }

    async fn lock_unit_by_code(&mut self, code: &str) -> StoreResult<Option<TicketUnit>> {
        Ok(self.working.unit_by(&self.working.unit_codes, code))
    }

    async fn lock_unit_by_reference(
        &mut self,
        reference: &str,
    ) -> StoreResult<Option<TicketUnit>> {
        Ok(self.working.unit_by(&self.working.unit_references, reference))
    }

    async fn count_successful_check_ins(&mut self, ticket_unit_id: Uuid) -> StoreResult<i64> {
        let count = self
            .working
            .attempts
            .iter()
            .filter(|a| a.ticket_unit_id == Some(ticket_unit_id) && a.outcome.is_success())
            .count();
        Ok(count as i64)
    }

    async fn insert_check_in_attempt(&mut self, attempt: &CheckInAttempt) -> StoreResult<()> {
        self.working.attempts.push(attempt.clone());
        Ok(())
    }

    async fn update_unit_status(
        &mut self,
        ticket_unit_id: Uuid,
        status: TicketUnitStatus,
    ) -> StoreResult<()> {
        let unit = self.working.units.get_mut(&ticket_unit_id).ok_or_else(|| {
            StoreError::Conflict(format!("ticket unit {ticket_unit_id} does not exist"))
        })?;
        unit.status = status;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl MembershipLookup for MemoryStore {
    async fn membership_of(&self, buyer_id: Uuid) -> StoreResult<Option<Membership>> {
        Ok(self.state.lock().await.memberships.get(&buyer_id).cloned())
    }
}

#[async_trait]
impl AuthorizationLookup for MemoryStore {
    async fn is_platform_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .get(&user_id)
            .is_some_and(|u| u.is_platform_admin))
    }

    async fn organizer_ids_for(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        Ok(self
            .state
            .lock()
            .await
            .organizer_members
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .map(|m| m.organizer_id)
            .collect())
    }
}
