//! Secret guest assignment: admission against offer and user limits, expiration
//! scanning, rating-weighted winner draws, and offer closure.

pub mod admission;
pub mod closer;
pub mod domain;
pub mod memory;
pub mod router;
pub mod scanner;
pub mod scheduler;
pub mod selector;
pub mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use admission::AdmissionController;
pub use closer::{AssignmentCloser, Award, ClosureConfig, ClosureOutcome};
pub use domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, DrawCandidate, Offer,
    OfferId, OfferStatus, Report, ReportId, UserAppLimitInfo, UserId, UserProfile,
};
pub use memory::InMemoryStore;
pub use router::assignment_router;
pub use scanner::{ExpirationScanner, DEFAULT_BATCH_SIZE};
pub use scheduler::{CycleOutcome, CycleReport, DrawWorker, Scheduler, SchedulerError};
pub use selector::{DrawConfig, WinnerSelector};
pub use store::{ApplicationStore, OfferStore, ReportStore, StoreError};

use crate::config::WorkerConfig;

/// Caller-facing error taxonomy for admission and closure.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),
    #[error("offer {0} no longer exists")]
    OfferNotExist(OfferId),
    #[error("offer {0} is no longer accepting applications")]
    OfferClosed(OfferId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("offer {offer_id} has no free participant places (limit {limit})")]
    CapacityExceeded { offer_id: OfferId, limit: u32 },
    #[error("user {user_id} reached the application limit of {limit}")]
    QuotaExceeded { user_id: UserId, limit: u32 },
    #[error("offer has no applicants")]
    NoApplicants,
    #[error("winner selection failed: {0}")]
    SelectionFailed(String),
    #[error("offer {offer_id} cannot move from {from} to {to}")]
    InvalidTransition {
        offer_id: OfferId,
        from: OfferStatus,
        to: OfferStatus,
    },
    #[error("store failure: {0}")]
    TransientStoreFailure(#[source] StoreError),
}

impl AssignmentError {
    /// Business-rule refusals, as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AssignmentError::OfferNotFound(_)
                | AssignmentError::OfferNotExist(_)
                | AssignmentError::OfferClosed(_)
                | AssignmentError::UserNotFound(_)
                | AssignmentError::CapacityExceeded { .. }
                | AssignmentError::QuotaExceeded { .. }
        )
    }
}

impl From<StoreError> for AssignmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::OfferNotFound(id) => Self::OfferNotFound(id),
            StoreError::OfferNotExist(id) => Self::OfferNotExist(id),
            StoreError::OfferClosed(id) => Self::OfferClosed(id),
            StoreError::UserNotFound(id) => Self::UserNotFound(id),
            StoreError::CapacityExceeded { offer_id, limit } => {
                Self::CapacityExceeded { offer_id, limit }
            }
            StoreError::QuotaExceeded { user_id, limit } => Self::QuotaExceeded { user_id, limit },
            StoreError::InvalidTransition { offer_id, from, to } => {
                Self::InvalidTransition { offer_id, from, to }
            }
            other => Self::TransientStoreFailure(other),
        }
    }
}

/// Admission controller and draw scheduler wired to one store.
pub struct AssignmentEngine<S> {
    pub admission: Arc<AdmissionController<S>>,
    pub scheduler: Arc<Scheduler<S, S, S>>,
}

impl<S> AssignmentEngine<S>
where
    S: OfferStore + ApplicationStore + ReportStore + 'static,
{
    pub fn new(store: Arc<S>, config: &WorkerConfig, selector: WinnerSelector) -> Self {
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&store),
            config.store_timeout,
        ));
        let scanner = ExpirationScanner::new(
            Arc::clone(&store),
            config.batch_size,
            config.store_timeout,
        );
        let closer = AssignmentCloser::new(
            Arc::clone(&store),
            Arc::clone(&store),
            store,
            Arc::new(selector),
            config.closure,
            config.store_timeout,
        );
        let worker = Arc::new(DrawWorker::new(scanner, closer));
        let scheduler = Arc::new(Scheduler::new(worker, config.interval));

        Self {
            admission,
            scheduler,
        }
    }
}
