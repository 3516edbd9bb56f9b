use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, DrawCandidate, Offer,
    OfferId, OfferStatus, Report, UserAppLimitInfo, UserId, UserProfile,
};
use super::store::{ApplicationStore, OfferStore, ReportStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    offers: HashMap<OfferId, Offer>,
    users: HashMap<UserId, UserProfile>,
    // Insertion order doubles as the draw walk order.
    applications: Vec<Application>,
    reports: HashMap<OfferId, Report>,
    // Offers deleted after being listed; writes against them break referential integrity.
    removed: HashSet<OfferId>,
}

impl Tables {
    fn participants_count(&self, offer_id: OfferId) -> usize {
        self.applications
            .iter()
            .filter(|application| application.offer_id == offer_id)
            .count()
    }

    fn active_count(&self, user_id: UserId) -> usize {
        self.applications
            .iter()
            .filter(|application| application.user_id == user_id && application.status.is_active())
            .count()
    }

    fn missing_offer(&self, offer_id: OfferId) -> StoreError {
        if self.removed.contains(&offer_id) {
            StoreError::OfferNotExist(offer_id)
        } else {
            StoreError::OfferNotFound(offer_id)
        }
    }
}

/// Process-local store backing every capability trait behind one exclusive lock.
///
/// Holding the lock across the whole admission check-and-insert serializes
/// concurrent admissions for the same offer and the same user.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn lock_for_seed(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers or replaces an offer; offer management lives outside this engine.
    pub fn seed_offer(&self, offer: Offer) {
        let mut tables = self.lock_for_seed();
        tables.removed.remove(&offer.id);
        tables.offers.insert(offer.id, offer);
    }

    pub fn seed_user(&self, user: UserProfile) {
        self.lock_for_seed().users.insert(user.id, user);
    }

    pub fn remove_user(&self, user_id: UserId) -> Option<UserProfile> {
        self.lock_for_seed().users.remove(&user_id)
    }

    pub fn set_rating(&self, user_id: UserId, rating: i64) -> bool {
        match self.lock_for_seed().users.get_mut(&user_id) {
            Some(user) => {
                user.rating = rating;
                true
            }
            None => false,
        }
    }

    pub fn remove_offer(&self, offer_id: OfferId) -> Option<Offer> {
        let mut tables = self.lock_for_seed();
        let removed = tables.offers.remove(&offer_id);
        if removed.is_some() {
            tables.removed.insert(offer_id);
        }
        removed
    }

    pub fn offer(&self, offer_id: OfferId) -> Option<Offer> {
        self.lock_for_seed().offers.get(&offer_id).cloned()
    }

    pub fn application(&self, application_id: ApplicationId) -> Option<Application> {
        self.lock_for_seed()
            .applications
            .iter()
            .find(|application| application.id == application_id)
            .cloned()
    }

    pub fn applications_for_offer(&self, offer_id: OfferId) -> Vec<Application> {
        self.lock_for_seed()
            .applications
            .iter()
            .filter(|application| application.offer_id == offer_id)
            .cloned()
            .collect()
    }

    pub fn report_for_offer(&self, offer_id: OfferId) -> Option<Report> {
        self.lock_for_seed().reports.get(&offer_id).cloned()
    }

    pub fn report_count(&self) -> usize {
        self.lock_for_seed().reports.len()
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn get_expired_offers(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Offer>, StoreError> {
        let tables = self.lock()?;
        let mut due: Vec<Offer> = tables
            .offers
            .values()
            .filter(|offer| offer.status == OfferStatus::Created && offer.is_expired_at(now))
            .cloned()
            .collect();
        due.sort_by_key(|offer| (offer.expiration_at, offer.id));
        due.truncate(batch_size);
        Ok(due)
    }

    async fn get_interrupted_offers(&self, batch_size: usize) -> Result<Vec<Offer>, StoreError> {
        let tables = self.lock()?;
        let mut stalled: Vec<Offer> = tables
            .offers
            .values()
            .filter(|offer| offer.status == OfferStatus::InProgress)
            .cloned()
            .collect();
        stalled.sort_by_key(|offer| (offer.expiration_at, offer.id));
        stalled.truncate(batch_size);
        Ok(stalled)
    }

    async fn set_status(&self, offer_id: OfferId, status: OfferStatus) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let Some(offer) = tables.offers.get_mut(&offer_id) else {
            return Err(tables.missing_offer(offer_id));
        };
        if !offer.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                offer_id,
                from: offer.status,
                to: status,
            });
        }
        offer.status = status;
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn create_application(
        &self,
        draft: ApplicationDraft,
    ) -> Result<Application, StoreError> {
        let mut tables = self.lock()?;

        let offer = tables
            .offers
            .get(&draft.offer_id)
            .ok_or_else(|| tables.missing_offer(draft.offer_id))?;
        if !offer.accepts_applications() {
            return Err(StoreError::OfferClosed(offer.id));
        }
        let participants_limit = offer.participants_limit;
        let expiration_at = offer.expiration_at;

        if tables.participants_count(draft.offer_id) >= participants_limit as usize {
            return Err(StoreError::CapacityExceeded {
                offer_id: draft.offer_id,
                limit: participants_limit,
            });
        }

        let app_limit = tables
            .users
            .get(&draft.user_id)
            .ok_or(StoreError::UserNotFound(draft.user_id))?
            .app_limit;
        if tables.active_count(draft.user_id) >= app_limit as usize {
            return Err(StoreError::QuotaExceeded {
                user_id: draft.user_id,
                limit: app_limit,
            });
        }

        if tables
            .applications
            .iter()
            .any(|application| application.id == draft.id)
        {
            return Err(StoreError::Conflict(format!("application {}", draft.id)));
        }

        let application = Application {
            id: draft.id,
            user_id: draft.user_id,
            offer_id: draft.offer_id,
            status: ApplicationStatus::Created,
            expiration_at,
            created_at: draft.created_at,
        };
        tables.applications.push(application.clone());
        Ok(application)
    }

    async fn get_by_offer_for_draw(
        &self,
        offer_id: OfferId,
    ) -> Result<Vec<DrawCandidate>, StoreError> {
        let tables = self.lock()?;
        // Inner join: applications whose applicant vanished are not drawable.
        let candidates = tables
            .applications
            .iter()
            .filter(|application| application.offer_id == offer_id)
            .filter_map(|application| {
                tables
                    .users
                    .get(&application.user_id)
                    .map(|user| DrawCandidate {
                        application_id: application.id,
                        user_id: application.user_id,
                        rating: user.rating,
                        expiration_at: application.expiration_at,
                    })
            })
            .collect();
        Ok(candidates)
    }

    async fn list_by_offer(&self, offer_id: OfferId) -> Result<Vec<Application>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .applications
            .iter()
            .filter(|application| application.offer_id == offer_id)
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        application_id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let application = tables
            .applications
            .iter_mut()
            .find(|application| application.id == application_id)
            .ok_or(StoreError::ApplicationNotFound(application_id))?;
        application.status = status;
        Ok(())
    }

    async fn get_user_app_limit_info(
        &self,
        user_id: UserId,
    ) -> Result<UserAppLimitInfo, StoreError> {
        let tables = self.lock()?;
        let user = tables
            .users
            .get(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;
        Ok(UserAppLimitInfo {
            limit: user.app_limit,
            active_count: tables.active_count(user_id) as u32,
        })
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn create(&self, report: Report) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.reports.contains_key(&report.offer_id) {
            return Err(StoreError::Conflict(format!(
                "report for offer {}",
                report.offer_id
            )));
        }
        tables.reports.insert(report.offer_id, report);
        Ok(())
    }

    async fn get_by_offer(&self, offer_id: OfferId) -> Result<Option<Report>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.reports.get(&offer_id).cloned())
    }
}
