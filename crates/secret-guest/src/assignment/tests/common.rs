use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::assignment::admission::AdmissionController;
use crate::assignment::closer::{AssignmentCloser, ClosureConfig};
use crate::assignment::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, DrawCandidate, Offer,
    OfferId, OfferStatus, Report, UserAppLimitInfo, UserId, UserProfile,
};
use crate::assignment::memory::InMemoryStore;
use crate::assignment::scanner::ExpirationScanner;
use crate::assignment::scheduler::DrawWorker;
use crate::assignment::selector::{DrawConfig, WinnerSelector};
use crate::assignment::store::{ApplicationStore, OfferStore, ReportStore, StoreError};

pub(super) const STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub(super) fn offer_expiring_at(participants_limit: u32, expiration_at: DateTime<Utc>) -> Offer {
    Offer {
        id: OfferId::new(),
        hotel_id: Uuid::new_v4(),
        room_id: Uuid::new_v4(),
        location_id: Uuid::new_v4(),
        task: "Check breakfast service and room cleanliness".to_string(),
        check_in_at: expiration_at + chrono::Duration::days(7),
        check_out_at: expiration_at + chrono::Duration::days(9),
        expiration_at,
        participants_limit,
        status: OfferStatus::Created,
    }
}

pub(super) fn open_offer(participants_limit: u32) -> Offer {
    offer_expiring_at(participants_limit, Utc::now() + chrono::Duration::days(1))
}

pub(super) fn expired_offer(participants_limit: u32) -> Offer {
    offer_expiring_at(participants_limit, Utc::now() - chrono::Duration::minutes(5))
}

pub(super) fn user(rating: i64, app_limit: u32) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        rating,
        app_limit,
    }
}

pub(super) fn candidate(rating: i64) -> DrawCandidate {
    DrawCandidate {
        application_id: ApplicationId::new(),
        user_id: UserId::new(),
        rating,
        expiration_at: Utc::now(),
    }
}

pub(super) fn seeded_store(offer: &Offer, users: &[UserProfile]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.seed_offer(offer.clone());
    for user in users {
        store.seed_user(user.clone());
    }
    store
}

pub(super) fn admission<A>(store: Arc<A>) -> AdmissionController<A>
where
    A: ApplicationStore + 'static,
{
    AdmissionController::new(store, STORE_TIMEOUT)
}

/// Inserts an application directly, bypassing the controller.
pub(super) async fn apply(store: &InMemoryStore, user_id: UserId, offer_id: OfferId) -> Application {
    store
        .create_application(ApplicationDraft {
            id: ApplicationId::new(),
            user_id,
            offer_id,
            created_at: Utc::now(),
        })
        .await
        .expect("application admitted")
}

pub(super) fn closer<S>(store: Arc<S>, seed: u64, config: ClosureConfig) -> AssignmentCloser<S, S, S>
where
    S: OfferStore + ApplicationStore + ReportStore + 'static,
{
    AssignmentCloser::new(
        Arc::clone(&store),
        Arc::clone(&store),
        store,
        Arc::new(WinnerSelector::seeded(DrawConfig::default(), seed)),
        config,
        STORE_TIMEOUT,
    )
}

pub(super) fn worker<S>(store: Arc<S>, batch_size: usize) -> DrawWorker<S, S, S>
where
    S: OfferStore + ApplicationStore + ReportStore + 'static,
{
    let scanner = ExpirationScanner::new(Arc::clone(&store), batch_size, STORE_TIMEOUT);
    DrawWorker::new(scanner, closer(store, 7, ClosureConfig::default()))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store calls the flaky wrapper can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Fault {
    ListExpired,
    MarkOffer(OfferId, OfferStatus),
    LoadCandidates,
    CreateReport,
    AcceptApplication,
}

/// Wraps the in-memory store with injectable failures and latency.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryStore,
    faults: Mutex<HashSet<Fault>>,
    delay: Mutex<Option<Duration>>,
    in_flight_scans: AtomicUsize,
    pub(super) max_concurrent_scans: AtomicUsize,
    panic_next_scan: AtomicBool,
}

impl FlakyStore {
    pub(super) fn fail(&self, fault: Fault) {
        self.faults.lock().expect("fault mutex poisoned").insert(fault);
    }

    pub(super) fn heal(&self, fault: Fault) {
        self.faults.lock().expect("fault mutex poisoned").remove(&fault);
    }

    /// Makes the next expired-offer scan panic, as a buggy store would.
    pub(super) fn panic_on_next_scan(&self) {
        self.panic_next_scan.store(true, Ordering::SeqCst);
    }

    pub(super) fn slow_down(&self, delay: Duration) {
        *self.delay.lock().expect("delay mutex poisoned") = Some(delay);
    }

    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.lock().expect("fault mutex poisoned").contains(&fault) {
            return Err(StoreError::Unavailable(format!("injected {fault:?}")));
        }
        Ok(())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("delay mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OfferStore for FlakyStore {
    async fn get_expired_offers(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Offer>, StoreError> {
        if self.panic_next_scan.swap(false, Ordering::SeqCst) {
            panic!("injected scan panic");
        }
        let running = self.in_flight_scans.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_scans.fetch_max(running, Ordering::SeqCst);
        self.pause().await;
        self.in_flight_scans.fetch_sub(1, Ordering::SeqCst);
        self.check(Fault::ListExpired)?;
        self.inner.get_expired_offers(now, batch_size).await
    }

    async fn get_interrupted_offers(&self, batch_size: usize) -> Result<Vec<Offer>, StoreError> {
        self.inner.get_interrupted_offers(batch_size).await
    }

    async fn set_status(&self, offer_id: OfferId, status: OfferStatus) -> Result<(), StoreError> {
        self.check(Fault::MarkOffer(offer_id, status))?;
        OfferStore::set_status(&self.inner, offer_id, status).await
    }
}

#[async_trait]
impl ApplicationStore for FlakyStore {
    async fn create_application(
        &self,
        draft: ApplicationDraft,
    ) -> Result<Application, StoreError> {
        self.pause().await;
        self.inner.create_application(draft).await
    }

    async fn get_by_offer_for_draw(
        &self,
        offer_id: OfferId,
    ) -> Result<Vec<DrawCandidate>, StoreError> {
        self.check(Fault::LoadCandidates)?;
        self.inner.get_by_offer_for_draw(offer_id).await
    }

    async fn list_by_offer(&self, offer_id: OfferId) -> Result<Vec<Application>, StoreError> {
        self.inner.list_by_offer(offer_id).await
    }

    async fn set_status(
        &self,
        application_id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<(), StoreError> {
        if status == ApplicationStatus::Accepted {
            self.check(Fault::AcceptApplication)?;
        }
        ApplicationStore::set_status(&self.inner, application_id, status).await
    }

    async fn get_user_app_limit_info(
        &self,
        user_id: UserId,
    ) -> Result<UserAppLimitInfo, StoreError> {
        self.inner.get_user_app_limit_info(user_id).await
    }
}

#[async_trait]
impl ReportStore for FlakyStore {
    async fn create(&self, report: Report) -> Result<(), StoreError> {
        self.check(Fault::CreateReport)?;
        self.inner.create(report).await
    }

    async fn get_by_offer(&self, offer_id: OfferId) -> Result<Option<Report>, StoreError> {
        self.inner.get_by_offer(offer_id).await
    }
}
