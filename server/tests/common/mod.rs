#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use boxoffice_server::config::BookingSettings;
use boxoffice_server::models::{
    DiscountKind, Event, Membership, MembershipDiscount, MembershipLevel, MembershipStatus,
    Occurrence, OrganizerMember, TicketKind, User,
};
use boxoffice_server::payment::{
    HandoffRequest, MockPaymentCollaborator, PaymentCollaborator, PaymentCollaboratorError,
    PaymentHandoff,
};
use boxoffice_server::services::{BookingService, CheckInService};
use boxoffice_server::store::MemoryStore;

/// One organizer running one event with a single occurrence.
pub struct Venue {
    pub store: MemoryStore,
    pub organizer_id: Uuid,
    pub event: Event,
    pub occurrence: Occurrence,
}

impl Venue {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let organizer_id = Uuid::new_v4();
        let event = event(organizer_id, "Summer Sessions");
        let occurrence = occurrence(event.id);
        store.insert_event(event.clone()).await;
        store.insert_occurrence(occurrence.clone()).await;
        Self {
            store,
            organizer_id,
            event,
            occurrence,
        }
    }

    /// A second, unrelated event with its own occurrence.
    pub async fn other_event(&self) -> (Event, Occurrence) {
        let event = event(Uuid::new_v4(), "Winter Sessions");
        let occurrence = occurrence(event.id);
        self.store.insert_event(event.clone()).await;
        self.store.insert_occurrence(occurrence.clone()).await;
        (event, occurrence)
    }

    pub async fn kind(&self, price: i64, total_capacity: Option<i32>) -> TicketKind {
        let kind = TicketKind {
            id: Uuid::new_v4(),
            event_id: self.event.id,
            name: "General".to_string(),
            price,
            currency: "USD".to_string(),
            min_per_order: 1,
            max_per_order: None,
            total_capacity,
            sales_start: None,
            sales_end: None,
            max_check_ins: None,
            occurrence_ids: Vec::new(),
        };
        self.store.upsert_ticket_kind(kind.clone()).await;
        kind
    }

    pub async fn percentage_discount(&self, kind: &TicketKind, level: &str, percent: i64) {
        self.store
            .upsert_discount(MembershipDiscount {
                ticket_kind_id: kind.id,
                level: MembershipLevel::new(level),
                kind: DiscountKind::Percentage,
                value: Decimal::from(percent),
            })
            .await;
    }

    pub async fn member(&self, level: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .upsert_membership(Membership {
                user_id,
                level: MembershipLevel::new(level),
                status: MembershipStatus::Active,
                expires_at: Some(Utc::now() + Duration::days(30)),
            })
            .await;
        user_id
    }

    pub async fn staff(&self) -> Uuid {
        let user_id = self.user(false).await;
        self.store
            .insert_organizer_member(OrganizerMember {
                organizer_id: self.organizer_id,
                user_id,
                is_active: true,
                created_at: Utc::now(),
            })
            .await;
        user_id
    }

    pub async fn user(&self, is_platform_admin: bool) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@boxoffice.test", Uuid::new_v4().simple()),
            is_platform_admin,
            created_at: Utc::now(),
        };
        let id = user.id;
        self.store.insert_user(user).await;
        id
    }

    pub fn bookings(&self) -> BookingService<MemoryStore> {
        self.bookings_with(Arc::new(MockPaymentCollaborator::default()))
    }

    pub fn bookings_with(&self, payments: Arc<dyn PaymentCollaborator>) -> BookingService<MemoryStore> {
        BookingService::new(
            self.store.clone(),
            payments,
            Arc::new(self.store.clone()),
            BookingSettings::default(),
        )
    }

    pub fn check_ins(&self) -> CheckInService<MemoryStore> {
        CheckInService::new(self.store.clone(), Arc::new(self.store.clone()))
    }
}

fn event(organizer_id: Uuid, title: &str) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        organizer_id,
        title: title.to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn occurrence(event_id: Uuid) -> Occurrence {
    Occurrence {
        id: Uuid::new_v4(),
        event_id,
        starts_at: Utc::now() + Duration::days(7),
        ends_at: None,
        location: Some("Main Hall".to_string()),
    }
}

/// Payment provider that is always down.
pub struct UnavailablePayments;

#[async_trait]
impl PaymentCollaborator for UnavailablePayments {
    async fn create_handoff(
        &self,
        _request: HandoffRequest,
    ) -> Result<PaymentHandoff, PaymentCollaboratorError> {
        Err(PaymentCollaboratorError::Unavailable("connection refused".to_string()))
    }
}

/// Payment provider that fails after the store has gone away, so the
/// compensating delete cannot run either.
pub struct StoreClosingPayments(pub MemoryStore);

#[async_trait]
impl PaymentCollaborator for StoreClosingPayments {
    async fn create_handoff(
        &self,
        _request: HandoffRequest,
    ) -> Result<PaymentHandoff, PaymentCollaboratorError> {
        self.0.close();
        Err(PaymentCollaboratorError::Unavailable("connection reset".to_string()))
    }
}
