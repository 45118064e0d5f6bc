mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use boxoffice_server::models::{
    CheckInFailureCode, CheckInMethod, CheckInOutcome, TicketUnit, TicketUnitStatus,
};
use boxoffice_server::services::{
    BookingRequest, CheckInError, CheckInRequest, CheckInResult, LineItem,
};

use boxoffice_server::utils::clock::FixedClock;

use common::Venue;

/// Books `quantity` free units of a fresh kind and returns them.
async fn confirmed_units(venue: &Venue, max_check_ins: Option<i32>, quantity: u32) -> Vec<TicketUnit> {
    let mut kind = venue.kind(0, None).await;
    kind.max_check_ins = max_check_ins;
    venue.store.upsert_ticket_kind(kind.clone()).await;

    let outcome = venue
        .bookings()
        .initiate(BookingRequest {
            buyer_id: Uuid::new_v4(),
            occurrence_id: venue.occurrence.id,
            line_items: vec![LineItem {
                ticket_kind_id: kind.id,
                quantity,
            }],
        })
        .await
        .unwrap();
    venue.store.units_of_order(outcome.order_id()).await
}

fn scan(code: &str, occurrence_id: Uuid, operator_id: Option<Uuid>) -> CheckInRequest {
    CheckInRequest {
        scanned_code: code.to_string(),
        occurrence_id,
        operator_id,
        method: CheckInMethod::QrScan,
        device_id: Some("gate-1".to_string()),
        note: None,
    }
}

#[tokio::test]
async fn test_first_scan_admits_and_marks_used() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 1).await.remove(0);

    let result = venue
        .check_ins()
        .attempt(scan(&unit.code, venue.occurrence.id, None))
        .await
        .unwrap();

    let CheckInResult::Admitted {
        ticket_unit_id,
        first_check_in,
        remaining_check_ins,
        ..
    } = result
    else {
        panic!("expected admission");
    };
    assert_eq!(ticket_unit_id, unit.id);
    assert!(first_check_in);
    assert_eq!(remaining_check_ins, 0);
    assert_eq!(
        venue.store.unit(unit.id).await.unwrap().status,
        TicketUnitStatus::Used
    );
}

#[tokio::test]
async fn test_second_scan_hits_quota_and_both_are_logged() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 1).await.remove(0);
    let check_ins = venue.check_ins();

    check_ins
        .attempt(scan(&unit.code, venue.occurrence.id, None))
        .await
        .unwrap();
    let second = check_ins
        .attempt(scan(&unit.code, venue.occurrence.id, None))
        .await
        .unwrap();

    assert_eq!(second.failure_code(), Some(CheckInFailureCode::MaxCheckInsReached));

    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].outcome, CheckInOutcome::Success);
    assert_eq!(attempts[1].outcome, CheckInOutcome::FailedMaxCheckInsReached);
    assert!(attempts.iter().all(|a| a.ticket_unit_id == Some(unit.id)));
}

#[tokio::test]
async fn test_multi_entry_ticket_stays_used_after_first_scan() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, Some(3), 1).await.remove(0);
    let check_ins = venue.check_ins();

    let mut remaining = Vec::new();
    for _ in 0..3 {
        match check_ins
            .attempt(scan(&unit.code, venue.occurrence.id, None))
            .await
            .unwrap()
        {
            CheckInResult::Admitted {
                remaining_check_ins,
                ..
            } => remaining.push(remaining_check_ins),
            other => panic!("unexpected rejection: {other:?}"),
        }
    }

    assert_eq!(remaining, vec![2, 1, 0]);
    assert_eq!(
        venue.store.unit(unit.id).await.unwrap().status,
        TicketUnitStatus::Used
    );
}

#[tokio::test]
async fn test_ticket_from_other_event_is_wrong_event() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 1).await.remove(0);
    let (_, elsewhere) = venue.other_event().await;

    let result = venue
        .check_ins()
        .attempt(scan(&unit.code, elsewhere.id, None))
        .await
        .unwrap();

    assert_eq!(result.failure_code(), Some(CheckInFailureCode::WrongEvent));

    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, CheckInOutcome::FailedWrongEvent);
    assert_eq!(attempts[0].occurrence_id, elsewhere.id);
    assert_eq!(
        venue.store.unit(unit.id).await.unwrap().status,
        TicketUnitStatus::Confirmed
    );
}

#[tokio::test]
async fn test_unknown_code_is_logged() {
    let venue = Venue::new().await;

    let result = venue
        .check_ins()
        .attempt(scan("NOPE", venue.occurrence.id, None))
        .await
        .unwrap();

    assert!(matches!(
        result,
        CheckInResult::Rejected {
            attempt_id: Some(_),
            code: CheckInFailureCode::InvalidCode,
            ..
        }
    ));
    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].ticket_unit_id, None);
    assert_eq!(attempts[0].scanned_code, "NOPE");
}

#[tokio::test]
async fn test_unknown_code_and_occurrence_is_not_found() {
    let venue = Venue::new().await;

    let err = venue
        .check_ins()
        .attempt(scan("NOPE", Uuid::new_v4(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckInError::NotFound(_)));
    assert!(venue.store.attempts().await.is_empty());
}

#[tokio::test]
async fn test_valid_code_at_unknown_occurrence_is_logged_against_the_unit() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 1).await.remove(0);
    let nowhere = Uuid::new_v4();

    let result = venue
        .check_ins()
        .attempt(scan(&unit.code, nowhere, None))
        .await
        .unwrap();

    assert!(matches!(
        result,
        CheckInResult::Rejected {
            attempt_id: Some(_),
            code: CheckInFailureCode::InvalidCode,
            ..
        }
    ));
    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].ticket_unit_id, Some(unit.id));
    assert_eq!(attempts[0].occurrence_id, nowhere);
    assert_eq!(attempts[0].outcome, CheckInOutcome::FailedInvalidCode);
    assert_eq!(
        venue.store.unit(unit.id).await.unwrap().status,
        TicketUnitStatus::Confirmed
    );
}

#[tokio::test]
async fn test_attempts_are_stamped_by_the_service_clock() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 1).await.remove(0);
    let doors_open = Utc::now() + Duration::days(7);
    let check_ins = venue
        .check_ins()
        .with_clock(Arc::new(FixedClock(doors_open)));

    check_ins
        .attempt(scan(&unit.code, venue.occurrence.id, None))
        .await
        .unwrap();
    check_ins
        .attempt(scan("NOPE", venue.occurrence.id, None))
        .await
        .unwrap();

    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.attempted_at == doors_open));
}

#[tokio::test]
async fn test_reference_is_accepted_in_place_of_code() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, None, 2).await.remove(1);

    let mut request = scan(&format!("  {}  ", unit.reference), venue.occurrence.id, None);
    request.method = CheckInMethod::ManualEntry;
    let result = venue.check_ins().attempt(request).await.unwrap();

    assert!(matches!(
        result,
        CheckInResult::Admitted { ticket_unit_id, .. } if ticket_unit_id == unit.id
    ));
    let attempts = venue.store.attempts().await;
    assert_eq!(attempts[0].method, CheckInMethod::ManualEntry);
}

#[tokio::test]
async fn test_pending_unit_is_not_admitted() {
    let venue = Venue::new().await;
    let kind = venue.kind(2_000, None).await;
    let outcome = venue
        .bookings()
        .initiate(BookingRequest {
            buyer_id: Uuid::new_v4(),
            occurrence_id: venue.occurrence.id,
            line_items: vec![LineItem {
                ticket_kind_id: kind.id,
                quantity: 1,
            }],
        })
        .await
        .unwrap();
    let unit = venue.store.units_of_order(outcome.order_id()).await.remove(0);

    let result = venue
        .check_ins()
        .attempt(scan(&unit.code, venue.occurrence.id, None))
        .await
        .unwrap();

    assert_eq!(result.failure_code(), Some(CheckInFailureCode::NotConfirmedStatus));
}

#[tokio::test]
async fn test_operator_must_belong_to_organizer() {
    let venue = Venue::new().await;
    let units = confirmed_units(&venue, None, 3).await;
    let check_ins = venue.check_ins();

    let stranger = venue.user(false).await;
    let rejected = check_ins
        .attempt(scan(&units[0].code, venue.occurrence.id, Some(stranger)))
        .await
        .unwrap();
    assert_eq!(
        rejected.failure_code(),
        Some(CheckInFailureCode::OperatorNotAuthorized)
    );

    let staff = venue.staff().await;
    let admitted = check_ins
        .attempt(scan(&units[1].code, venue.occurrence.id, Some(staff)))
        .await
        .unwrap();
    assert_eq!(admitted.failure_code(), None);

    let admin = venue.user(true).await;
    let admitted = check_ins
        .attempt(scan(&units[2].code, venue.occurrence.id, Some(admin)))
        .await
        .unwrap();
    assert_eq!(admitted.failure_code(), None);

    let attempts = venue.store.attempts().await;
    assert_eq!(attempts[0].operator_id, Some(stranger));
    assert_eq!(attempts[0].outcome, CheckInOutcome::FailedOperatorNotAuthorized);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scans_never_exceed_quota() {
    let venue = Venue::new().await;
    let unit = confirmed_units(&venue, Some(2), 1).await.remove(0);
    let check_ins = Arc::new(venue.check_ins());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let check_ins = Arc::clone(&check_ins);
            let mut request = scan(&unit.code, venue.occurrence.id, None);
            request.device_id = Some(format!("gate-{i}"));
            tokio::spawn(async move { check_ins.attempt(request).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if let CheckInResult::Admitted { .. } = handle.await.unwrap().unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 2);
    let attempts = venue.store.attempts().await;
    assert_eq!(attempts.len(), 8);
    assert_eq!(attempts.iter().filter(|a| a.outcome.is_success()).count(), 2);
}
