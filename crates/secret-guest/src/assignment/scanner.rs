use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::domain::Offer;
use super::store::{bounded, OfferStore};
use super::AssignmentError;

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Finds offers whose application window closed and that still await a draw.
pub struct ExpirationScanner<O> {
    offers: Arc<O>,
    batch_size: usize,
    store_timeout: Duration,
}

impl<O> ExpirationScanner<O>
where
    O: OfferStore + 'static,
{
    /// A zero batch size is raised to one so every scan makes progress.
    pub fn new(offers: Arc<O>, batch_size: usize, store_timeout: Duration) -> Self {
        Self {
            offers,
            batch_size: batch_size.max(1),
            store_timeout,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn get_expired_offers(&self) -> Result<Vec<Offer>, AssignmentError> {
        self.get_expired_offers_at(Utc::now()).await
    }

    pub async fn get_expired_offers_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Offer>, AssignmentError> {
        let offers = bounded(
            self.store_timeout,
            self.offers.get_expired_offers(now, self.batch_size),
        )
        .await?;
        Ok(offers)
    }

    /// Offers whose closure started but never reached `done`.
    pub async fn get_interrupted_offers(&self) -> Result<Vec<Offer>, AssignmentError> {
        let offers = bounded(
            self.store_timeout,
            self.offers.get_interrupted_offers(self.batch_size),
        )
        .await?;
        Ok(offers)
    }
}
