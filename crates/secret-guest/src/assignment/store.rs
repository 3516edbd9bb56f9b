use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, DrawCandidate, Offer,
    OfferId, OfferStatus, Report, UserAppLimitInfo, UserId,
};

/// Offer persistence as seen by the scanner and the closer.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Offers still `created` whose deadline is at or before `now`, at most `batch_size`.
    async fn get_expired_offers(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Offer>, StoreError>;

    /// Offers left `in_progress` by a closure that never finished.
    async fn get_interrupted_offers(&self, batch_size: usize) -> Result<Vec<Offer>, StoreError>;

    /// Rejects backwards moves with `InvalidTransition`.
    async fn set_status(&self, offer_id: OfferId, status: OfferStatus) -> Result<(), StoreError>;
}

/// Application persistence, including the transactional admission check.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Checks offer capacity and user quota and inserts the row as one serialized unit.
    async fn create_application(&self, draft: ApplicationDraft)
        -> Result<Application, StoreError>;

    async fn get_by_offer_for_draw(&self, offer_id: OfferId)
        -> Result<Vec<DrawCandidate>, StoreError>;

    /// Every application of the offer, whether or not its applicant still exists.
    async fn list_by_offer(&self, offer_id: OfferId) -> Result<Vec<Application>, StoreError>;

    async fn set_status(
        &self,
        application_id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<(), StoreError>;

    async fn get_user_app_limit_info(&self, user_id: UserId)
        -> Result<UserAppLimitInfo, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fails with `Conflict` when the offer already has a report.
    async fn create(&self, report: Report) -> Result<(), StoreError>;

    async fn get_by_offer(&self, offer_id: OfferId) -> Result<Option<Report>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),
    #[error("offer {0} no longer exists")]
    OfferNotExist(OfferId),
    #[error("offer {0} is no longer accepting applications")]
    OfferClosed(OfferId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("offer {offer_id} reached its participants limit of {limit}")]
    CapacityExceeded { offer_id: OfferId, limit: u32 },
    #[error("user {user_id} reached the application limit of {limit}")]
    QuotaExceeded { user_id: UserId, limit: u32 },
    #[error("offer {offer_id} cannot move from {from} to {to}")]
    InvalidTransition {
        offer_id: OfferId,
        from: OfferStatus,
        to: OfferStatus,
    },
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Runs a store call under the caller-supplied deadline.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
