//! Loan lifecycle scenarios across services, stores and collaborators

use std::sync::Arc;

use campus_loans_server::{
    models::{
        loan::{LoanQuery, LoanStatus},
        notification::NotificationKind,
        user::Role,
    },
    services::devices::DeviceCatalogue,
    AppError,
};
use tokio::sync::Barrier;

use crate::common::{catalogue, device, harness, user, StaleCatalogue};

#[tokio::test]
async fn test_end_to_end_reserve_collect_return_with_waitlist() {
    let devices = Arc::new(StaleCatalogue::new(device("d", 1, 1)));
    let h = harness(devices.clone());

    h.services
        .waitlist
        .join(&user("u3", Role::Student), "d")
        .await
        .unwrap();

    let receipt = h.services.loans.reserve_device("u1", "d").await.unwrap();
    assert_eq!(devices.available(), 0);

    assert!(matches!(
        h.services.loans.reserve_device("u2", "d").await,
        Err(AppError::Conflict(_))
    ));

    h.services.loans.collect_device(receipt.loan_id).await.unwrap();
    let returned = h.services.loans.return_device(receipt.loan_id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(devices.available(), 1);

    let inbox = h.services.notifications.list_for_user("u3").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Available);
    assert!(!inbox[0].read);

    let types: Vec<_> = h
        .events
        .published()
        .iter()
        .map(|e| e.event_type.as_str())
        .collect();
    assert_eq!(
        types,
        vec!["device.reserved", "device.collected", "device.returned"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_of_one_device() {
    const CONTENDERS: usize = 16;

    let devices = Arc::new(StaleCatalogue::new(device("d", 1, 1)));
    let h = Arc::new(harness(devices.clone()));
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let mut tasks = Vec::new();
    for i in 0..CONTENDERS {
        let h = h.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            h.services
                .loans
                .reserve_device(&format!("u{}", i), "d")
                .await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, CONTENDERS - 1);

    let loans = h.repository.loans.get_by_device_id("d").await.unwrap();
    assert_eq!(loans.iter().filter(|l| l.is_active()).count(), 1);
    assert_eq!(devices.available(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reservations_of_different_devices() {
    let devices = catalogue(vec![device("d1", 1, 1), device("d2", 1, 1)]);
    let h = Arc::new(harness(devices.clone()));

    let first = {
        let h = h.clone();
        tokio::spawn(async move { h.services.loans.reserve_device("u1", "d1").await })
    };
    let second = {
        let h = h.clone();
        tokio::spawn(async move { h.services.loans.reserve_device("u2", "d2").await })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());

    for id in ["d1", "d2"] {
        let d = devices.get_device(id).await.unwrap().unwrap();
        assert_eq!(d.available_count, 0);
    }
}

#[tokio::test]
async fn test_sequential_second_reservation_is_refused() {
    let devices = catalogue(vec![device("d", 1, 1)]);
    let h = harness(devices);

    h.services.loans.reserve_device("u1", "d").await.unwrap();

    // inventory already reflects the first loan
    assert!(matches!(
        h.services.loans.reserve_device("u2", "d").await,
        Err(AppError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_waitlist_cascade_is_fifo_across_returns() {
    let devices = catalogue(vec![device("d", 1, 1)]);
    let h = harness(devices);

    for id in ["a", "b", "c"] {
        h.services
            .waitlist
            .join(&user(id, Role::Student), "d")
            .await
            .unwrap();
    }

    let notified = |id: &'static str| {
        let services = &h.services;
        async move {
            services
                .notifications
                .list_for_user(id)
                .await
                .unwrap()
                .iter()
                .any(|n| n.kind == NotificationKind::Available)
        }
    };

    let first = h.services.loans.reserve_device("u1", "d").await.unwrap();
    h.services.loans.collect_device(first.loan_id).await.unwrap();
    h.services.loans.return_device(first.loan_id).await.unwrap();

    assert!(notified("a").await);
    assert!(!notified("b").await);
    assert!(!notified("c").await);

    let second = h.services.loans.reserve_device("u1", "d").await.unwrap();
    h.services.loans.collect_device(second.loan_id).await.unwrap();
    h.services.loans.return_device(second.loan_id).await.unwrap();

    assert!(notified("b").await);
    assert!(!notified("c").await);

    let b = h.services.waitlist.get_user_waitlist("b").await.unwrap();
    assert!(b[0].notified);
    assert!(b[0].notified_at.is_some());
}

#[tokio::test]
async fn test_cancellation_authorization() {
    let devices = catalogue(vec![device("d", 1, 1)]);
    let h = harness(devices.clone());

    let receipt = h.services.loans.reserve_device("u1", "d").await.unwrap();

    assert!(matches!(
        h.services.loans.cancel_loan(receipt.loan_id, "u2").await,
        Err(AppError::Forbidden(_))
    ));
    let loan = h.services.loans.get_loan(receipt.loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Reserved);
    assert_eq!(
        devices.get_device("d").await.unwrap().unwrap().available_count,
        0
    );

    h.services.loans.collect_device(receipt.loan_id).await.unwrap();
    assert!(matches!(
        h.services.loans.cancel_loan(receipt.loan_id, "u1").await,
        Err(AppError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_list_loans_filters() {
    let devices = catalogue(vec![device("d1", 1, 1), device("d2", 1, 1)]);
    let h = harness(devices);

    let a = h.services.loans.reserve_device("u1", "d1").await.unwrap();
    h.services.loans.reserve_device("u2", "d2").await.unwrap();
    h.services.loans.collect_device(a.loan_id).await.unwrap();

    let all = h
        .services
        .loans
        .list_loans(&LoanQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let collected = h
        .services
        .loans
        .list_loans(&LoanQuery {
            status: Some(LoanStatus::Collected),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].id, a.loan_id);

    let by_device = h
        .services
        .loans
        .list_loans(&LoanQuery {
            device_id: Some("d2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_device.len(), 1);
    assert_eq!(by_device[0].user_id, "u2");
}
