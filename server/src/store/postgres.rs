//! PostgreSQL store.
//!
//! Contested rows are taken with `SELECT ... FOR UPDATE` at the start of the
//! transaction: the ticket kind for inventory, the ticket unit for check-in.
//! Counts are plain indexed `COUNT(*)` queries run under that lock.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{AuthorizationLookup, MembershipLookup, Store, StoreResult, StoreTx};
use crate::models::{
    CheckInAttempt, Event, Membership, MembershipDiscount, MembershipLevel, Occurrence, Order,
    OrderStatus, TicketKind, TicketUnit, TicketUnitStatus,
};

const TICKET_KIND_COLUMNS: &str = "id, event_id, name, price, currency, min_per_order, \
     max_per_order, total_capacity, sales_start, sales_end, max_check_ins, occurrence_ids";

const ORDER_COLUMNS: &str = "id, reference, buyer_id, occurrence_id, currency, total_amount, \
     status, handoff_id, redirect_url, created_at, updated_at";

const TICKET_UNIT_COLUMNS: &str = "id, order_id, buyer_id, event_id, occurrence_id, \
     ticket_kind_id, code, reference, price, currency, status, max_check_ins, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn occurrence(&mut self, id: Uuid) -> StoreResult<Option<Occurrence>> {
        Ok(sqlx::query_as::<_, Occurrence>(
            "SELECT id, event_id, starts_at, ends_at, location FROM occurrences WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT id, organizer_id, title, created_at, updated_at FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>> {
        let sql = format!("SELECT {TICKET_KIND_COLUMNS} FROM ticket_kinds WHERE id = $1");
        Ok(sqlx::query_as::<_, TicketKind>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_ticket_kind(&mut self, id: Uuid) -> StoreResult<Option<TicketKind>> {
        let sql =
            format!("SELECT {TICKET_KIND_COLUMNS} FROM ticket_kinds WHERE id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, TicketKind>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn count_units_holding_inventory(&mut self, ticket_kind_id: Uuid) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ticket_units \
             WHERE ticket_kind_id = $1 \
               AND status IN ('pending_confirmation', 'confirmed', 'used')",
        )
        .bind(ticket_kind_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn membership_discount(
        &mut self,
        ticket_kind_id: Uuid,
        level: &MembershipLevel,
    ) -> StoreResult<Option<MembershipDiscount>> {
        Ok(sqlx::query_as::<_, MembershipDiscount>(
            "SELECT ticket_kind_id, level, kind, value FROM membership_discounts \
             WHERE ticket_kind_id = $1 AND level = $2",
        )
        .bind(ticket_kind_id)
        .bind(level.as_str())
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, reference, buyer_id, occurrence_id, currency, total_amount, \
             status, handoff_id, redirect_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order.id)
        .bind(&order.reference)
        .bind(order.buyer_id)
        .bind(order.occurrence_id)
        .bind(&order.currency)
        .bind(order.total_amount)
        .bind(order.status)
        .bind(&order.handoff_id)
        .bind(&order.redirect_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_ticket_unit(&mut self, unit: &TicketUnit) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ticket_units (id, order_id, buyer_id, event_id, occurrence_id, \
             ticket_kind_id, code, reference, price, currency, status, max_check_ins, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(unit.id)
        .bind(unit.order_id)
        .bind(unit.buyer_id)
        .bind(unit.event_id)
        .bind(unit.occurrence_id)
        .bind(unit.ticket_kind_id)
        .bind(&unit.code)
        .bind(&unit.reference)
        .bind(unit.price)
        .bind(&unit.currency)
        .bind(unit.status)
        .bind(unit.max_check_ins)
        .bind(unit.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_order_by_handoff(&mut self, handoff_id: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE handoff_id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(handoff_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn record_handoff(
        &mut self,
        order_id: Uuid,
        handoff_id: &str,
        redirect_url: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE orders SET handoff_id = $2, redirect_url = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(handoff_id)
        .bind(redirect_url)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()> {
        // ticket_units cascade.
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn units_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<TicketUnit>> {
        let sql = format!(
            "SELECT {TICKET_UNIT_COLUMNS} FROM ticket_units WHERE order_id = $1 \
             ORDER BY reference FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, TicketUnit>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn lock_unit_by_code(&mut self, code: &str) -> StoreResult<Option<TicketUnit>> {
        let sql =
            format!("SELECT {TICKET_UNIT_COLUMNS} FROM ticket_units WHERE code = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, TicketUnit>(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_unit_by_reference(
        &mut self,
        reference: &str,
    ) -> StoreResult<Option<TicketUnit>> {
        let sql = format!(
            "SELECT {TICKET_UNIT_COLUMNS} FROM ticket_units WHERE reference = $1 FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, TicketUnit>(&sql)
            .bind(reference)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn count_successful_check_ins(&mut self, ticket_unit_id: Uuid) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM check_in_attempts \
             WHERE ticket_unit_id = $1 AND outcome = 'success'",
        )
        .bind(ticket_unit_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn insert_check_in_attempt(&mut self, attempt: &CheckInAttempt) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO check_in_attempts (id, ticket_unit_id, occurrence_id, scanned_code, \
             method, operator_id, device_id, outcome, note, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(attempt.id)
        .bind(attempt.ticket_unit_id)
        .bind(attempt.occurrence_id)
        .bind(&attempt.scanned_code)
        .bind(attempt.method)
        .bind(attempt.operator_id)
        .bind(&attempt.device_id)
        .bind(attempt.outcome)
        .bind(&attempt.note)
        .bind(attempt.attempted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_unit_status(
        &mut self,
        ticket_unit_id: Uuid,
        status: TicketUnitStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE ticket_units SET status = $2 WHERE id = $1")
            .bind(ticket_unit_id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipLookup for PgStore {
    async fn membership_of(&self, buyer_id: Uuid) -> StoreResult<Option<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT user_id, level, status, expires_at FROM memberships WHERE user_id = $1",
        )
        .bind(buyer_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AuthorizationLookup for PgStore {
    async fn is_platform_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        let flag = sqlx::query_scalar::<_, bool>("SELECT is_platform_admin FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(flag.unwrap_or(false))
    }

    async fn organizer_ids_for(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT organizer_id FROM organizer_members WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}
