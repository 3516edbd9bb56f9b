use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secret_guest::assignment::{
    ApplicationStatus, AssignmentEngine, AssignmentError, CycleOutcome, DrawConfig,
    InMemoryStore, Offer, OfferId, OfferStatus, UserId, UserProfile, WinnerSelector,
};
use secret_guest::config::WorkerConfig;
use uuid::Uuid;

fn offer(participants_limit: u32, expiration_at: DateTime<Utc>) -> Offer {
    Offer {
        id: OfferId::new(),
        hotel_id: Uuid::new_v4(),
        room_id: Uuid::new_v4(),
        location_id: Uuid::new_v4(),
        task: "Evaluate check-in and the spa".to_string(),
        check_in_at: expiration_at + chrono::Duration::days(3),
        check_out_at: expiration_at + chrono::Duration::days(4),
        expiration_at,
        participants_limit,
        status: OfferStatus::Created,
    }
}

fn profile(rating: i64, app_limit: u32) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        rating,
        app_limit,
    }
}

fn engine(store: &Arc<InMemoryStore>, seed: u64) -> AssignmentEngine<InMemoryStore> {
    let config = WorkerConfig {
        interval: Duration::from_secs(3600),
        ..WorkerConfig::default()
    };
    AssignmentEngine::new(
        Arc::clone(store),
        &config,
        WinnerSelector::seeded(DrawConfig::default(), seed),
    )
}

#[tokio::test]
async fn applicants_compete_and_one_winner_is_reported() {
    let store = Arc::new(InMemoryStore::new());
    let mut listed = offer(2, Utc::now() + chrono::Duration::hours(2));
    store.seed_offer(listed.clone());
    let applicants = [profile(10, 3), profile(10_000, 3), profile(50, 3)];
    for applicant in &applicants {
        store.seed_user(applicant.clone());
    }
    let engine = engine(&store, 42);

    let first = engine
        .admission
        .create_application(applicants[0].id, listed.id)
        .await
        .expect("first place");
    let second = engine
        .admission
        .create_application(applicants[1].id, listed.id)
        .await
        .expect("second place");
    let refused = engine
        .admission
        .create_application(applicants[2].id, listed.id)
        .await;
    assert!(matches!(
        refused,
        Err(AssignmentError::CapacityExceeded { limit: 2, .. })
    ));

    // Nothing to draw before the deadline.
    match engine.scheduler.trigger().await {
        CycleOutcome::Completed(report) => assert_eq!(report.scanned, 0),
        other => panic!("unexpected cycle outcome {other:?}"),
    }

    listed.expiration_at = Utc::now() - chrono::Duration::seconds(1);
    store.seed_offer(listed.clone());

    match engine.scheduler.trigger().await {
        CycleOutcome::Completed(report) => {
            assert_eq!(report.scanned, 1);
            assert_eq!(report.awarded, 1);
        }
        other => panic!("unexpected cycle outcome {other:?}"),
    }

    let report = store.report_for_offer(listed.id).expect("report created");
    assert!([first, second].contains(&report.application_id));
    assert_eq!(report.status, "created");
    let winner = store
        .application(report.application_id)
        .expect("winning application");
    assert_eq!(winner.status, ApplicationStatus::Accepted);
    assert_eq!(
        store.offer(listed.id).expect("offer").status,
        OfferStatus::Done
    );

    let late = engine
        .admission
        .create_application(applicants[2].id, listed.id)
        .await;
    assert!(matches!(late, Err(AssignmentError::OfferClosed(_))));
}

#[tokio::test]
async fn expired_offer_without_applicants_is_closed_quietly() {
    let store = Arc::new(InMemoryStore::new());
    let stale = offer(4, Utc::now() - chrono::Duration::minutes(10));
    store.seed_offer(stale.clone());
    let engine = engine(&store, 1);

    match engine.scheduler.trigger().await {
        CycleOutcome::Completed(report) => assert_eq!(report.no_applicants, 1),
        other => panic!("unexpected cycle outcome {other:?}"),
    }
    assert_eq!(
        store.offer(stale.id).expect("offer").status,
        OfferStatus::Done
    );
    assert_eq!(store.report_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_applicants_fill_exactly_the_offer() {
    let store = Arc::new(InMemoryStore::new());
    let listed = offer(3, Utc::now() + chrono::Duration::hours(1));
    store.seed_offer(listed.clone());
    let applicants: Vec<_> = (0..30).map(|rating| profile(rating * 7, 1)).collect();
    for applicant in &applicants {
        store.seed_user(applicant.clone());
    }
    let engine = engine(&store, 3);

    let mut tasks = Vec::new();
    for applicant in &applicants {
        let admission = Arc::clone(&engine.admission);
        let user_id = applicant.id;
        let offer_id = listed.id;
        tasks.push(tokio::spawn(async move {
            admission.create_application(user_id, offer_id).await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.expect("task joins").is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(store.applications_for_offer(listed.id).len(), 3);
}

#[tokio::test]
async fn scheduler_closes_offers_in_the_background() {
    let store = Arc::new(InMemoryStore::new());
    let mut listed = offer(1, Utc::now() + chrono::Duration::hours(1));
    let applicant = profile(500, 1);
    store.seed_offer(listed.clone());
    store.seed_user(applicant.clone());
    let engine = engine(&store, 8);
    let application_id = engine
        .admission
        .create_application(applicant.id, listed.id)
        .await
        .expect("admitted");

    listed.expiration_at = Utc::now() - chrono::Duration::seconds(1);
    store.seed_offer(listed.clone());

    engine.scheduler.start().expect("scheduler starts");
    tokio::time::timeout(Duration::from_secs(5), async {
        while store
            .offer(listed.id)
            .is_some_and(|offer| offer.status != OfferStatus::Done)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("offer closed by the first tick");
    engine.scheduler.stop().await.expect("scheduler stops");

    assert_eq!(
        store.application(application_id).expect("application").status,
        ApplicationStatus::Accepted
    );
    let info = engine
        .admission
        .get_user_app_limit_info(applicant.id)
        .await
        .expect("limit info");
    assert_eq!(info.active_count, 0);
}
