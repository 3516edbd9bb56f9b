use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::domain::{ApplicationDraft, ApplicationId, OfferId, UserAppLimitInfo, UserId};
use super::store::{bounded, ApplicationStore};
use super::AssignmentError;

/// Entry point for users applying to offers.
///
/// The capacity and quota checks run inside the store's transactional
/// `create_application`; this type owns identity generation, deadlines and
/// the mapping onto the caller-facing error taxonomy.
pub struct AdmissionController<A> {
    applications: Arc<A>,
    store_timeout: Duration,
}

impl<A> AdmissionController<A>
where
    A: ApplicationStore + 'static,
{
    pub fn new(applications: Arc<A>, store_timeout: Duration) -> Self {
        Self {
            applications,
            store_timeout,
        }
    }

    /// Records a new `created` application if both the offer and the user have room.
    pub async fn create_application(
        &self,
        user_id: UserId,
        offer_id: OfferId,
    ) -> Result<ApplicationId, AssignmentError> {
        let draft = ApplicationDraft {
            id: ApplicationId::new(),
            user_id,
            offer_id,
            created_at: Utc::now(),
        };

        let result = bounded(
            self.store_timeout,
            self.applications.create_application(draft),
        )
        .await;

        match result {
            Ok(application) => {
                info!(
                    application_id = %application.id,
                    %user_id,
                    %offer_id,
                    "application admitted"
                );
                Ok(application.id)
            }
            Err(err) => {
                let err = AssignmentError::from(err);
                if err.is_rejection() {
                    debug!(%user_id, %offer_id, reason = %err, "application rejected");
                } else {
                    warn!(%user_id, %offer_id, error = %err, "application admission failed");
                }
                Err(err)
            }
        }
    }

    pub async fn get_user_app_limit_info(
        &self,
        user_id: UserId,
    ) -> Result<UserAppLimitInfo, AssignmentError> {
        bounded(
            self.store_timeout,
            self.applications.get_user_app_limit_info(user_id),
        )
        .await
        .map_err(AssignmentError::from)
    }
}
