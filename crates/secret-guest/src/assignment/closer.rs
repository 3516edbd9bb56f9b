use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::domain::{
    ApplicationId, ApplicationStatus, DrawCandidate, Offer, OfferId, OfferStatus, Report,
    ReportId, UserId,
};
use super::selector::WinnerSelector;
use super::store::{bounded, ApplicationStore, OfferStore, ReportStore, StoreError};
use super::AssignmentError;

/// Policy knobs for closing an offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureConfig {
    /// Move every losing application to `declined` once the winner is accepted.
    /// Off by default: losers stay `created` and keep counting against quotas.
    pub decline_non_winners: bool,
}

/// What closing an offer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureOutcome {
    /// Nobody applied; the offer is `done` without a report.
    NoApplicants,
    Awarded(Award),
    /// The offer was already `done` when handed to the closer.
    AlreadyClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub report_id: ReportId,
    /// True when an earlier, interrupted closure had already drawn this winner.
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    MarkInProgress,
    LoadReport,
    LoadCandidates,
    CreateReport,
    AcceptWinner,
    DeclineLosers,
    MarkDone,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::MarkInProgress => "mark_in_progress",
            Step::LoadReport => "load_report",
            Step::LoadCandidates => "load_candidates",
            Step::CreateReport => "create_report",
            Step::AcceptWinner => "accept_winner",
            Step::DeclineLosers => "decline_losers",
            Step::MarkDone => "mark_done",
        }
    }
}

/// Applies the consequences of a draw to offer, application, and report state.
///
/// Closure is keyed by offer id and safe to re-run: `in_progress` marks a
/// closure underway, the report is unique per offer and written before the
/// winner is accepted, and `done` is written last. A re-run after a crash
/// finds the existing report and finishes the remaining steps without drawing
/// again.
pub struct AssignmentCloser<O, A, R> {
    offers: Arc<O>,
    applications: Arc<A>,
    reports: Arc<R>,
    selector: Arc<WinnerSelector>,
    config: ClosureConfig,
    store_timeout: Duration,
}

impl<O, A, R> AssignmentCloser<O, A, R>
where
    O: OfferStore + 'static,
    A: ApplicationStore + 'static,
    R: ReportStore + 'static,
{
    pub fn new(
        offers: Arc<O>,
        applications: Arc<A>,
        reports: Arc<R>,
        selector: Arc<WinnerSelector>,
        config: ClosureConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            offers,
            applications,
            reports,
            selector,
            config,
            store_timeout,
        }
    }

    pub async fn close_offer(&self, offer: &Offer) -> Result<ClosureOutcome, AssignmentError> {
        let offer_id = offer.id;
        match offer.status {
            OfferStatus::Done => return Ok(ClosureOutcome::AlreadyClosed),
            OfferStatus::Created => {
                self.step(
                    offer_id,
                    Step::MarkInProgress,
                    self.offers.set_status(offer_id, OfferStatus::InProgress),
                )
                .await?;
            }
            OfferStatus::InProgress => debug!(%offer_id, "resuming interrupted closure"),
        }

        let existing = self
            .step(
                offer_id,
                Step::LoadReport,
                self.reports.get_by_offer(offer_id),
            )
            .await?;

        let (report, resumed) = match existing {
            Some(report) => (report, true),
            None => {
                let candidates = self.load_candidates(offer_id).await?;
                if candidates.is_empty() {
                    self.step(
                        offer_id,
                        Step::MarkDone,
                        self.offers.set_status(offer_id, OfferStatus::Done),
                    )
                    .await?;
                    info!(%offer_id, "offer closed without applicants");
                    return Ok(ClosureOutcome::NoApplicants);
                }

                let winner = self.selector.select_candidate(&candidates).map_err(|err| {
                    error!(%offer_id, error = %err, "winner selection failed");
                    err
                })?;
                self.record_report(offer_id, Report::for_winner(offer_id, winner))
                    .await?
            }
        };

        self.step(
            offer_id,
            Step::AcceptWinner,
            self.applications
                .set_status(report.application_id, ApplicationStatus::Accepted),
        )
        .await?;

        if self.config.decline_non_winners {
            self.decline_losers(offer_id, report.application_id).await?;
        }

        self.step(
            offer_id,
            Step::MarkDone,
            self.offers.set_status(offer_id, OfferStatus::Done),
        )
        .await?;

        info!(
            %offer_id,
            application_id = %report.application_id,
            user_id = %report.user_id,
            resumed,
            "offer awarded"
        );

        Ok(ClosureOutcome::Awarded(Award {
            application_id: report.application_id,
            user_id: report.user_id,
            report_id: report.id,
            resumed,
        }))
    }

    async fn load_candidates(&self, offer_id: OfferId) -> Result<Vec<DrawCandidate>, AssignmentError> {
        self.step(
            offer_id,
            Step::LoadCandidates,
            self.applications.get_by_offer_for_draw(offer_id),
        )
        .await
    }

    /// Returns the stored report and whether it predates this call.
    async fn record_report(
        &self,
        offer_id: OfferId,
        report: Report,
    ) -> Result<(Report, bool), AssignmentError> {
        let created = bounded(self.store_timeout, self.reports.create(report.clone())).await;
        match created {
            Ok(()) => Ok((report, false)),
            Err(StoreError::Conflict(_)) => {
                // Another closer got there first; its draw stands.
                let stored = self
                    .step(
                        offer_id,
                        Step::LoadReport,
                        self.reports.get_by_offer(offer_id),
                    )
                    .await?;
                stored.map(|report| (report, true)).ok_or_else(|| {
                    AssignmentError::SelectionFailed(format!(
                        "report for offer {offer_id} conflicted but could not be loaded"
                    ))
                })
            }
            Err(err) => {
                error!(
                    %offer_id,
                    step = Step::CreateReport.label(),
                    error = %err,
                    "offer closure step failed"
                );
                Err(err.into())
            }
        }
    }

    /// Declines every other active application of the offer, including ones
    /// whose applicant profile is gone and so never entered the draw.
    async fn decline_losers(
        &self,
        offer_id: OfferId,
        winner: ApplicationId,
    ) -> Result<(), AssignmentError> {
        let applications = self
            .step(
                offer_id,
                Step::DeclineLosers,
                self.applications.list_by_offer(offer_id),
            )
            .await?;
        for loser in applications
            .iter()
            .filter(|application| application.id != winner && application.status.is_active())
        {
            self.step(
                offer_id,
                Step::DeclineLosers,
                self.applications
                    .set_status(loser.id, ApplicationStatus::Declined),
            )
            .await?;
        }
        Ok(())
    }

    async fn step<T, F>(&self, offer_id: OfferId, step: Step, call: F) -> Result<T, AssignmentError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        bounded(self.store_timeout, call).await.map_err(|err| {
            error!(
                %offer_id,
                step = step.label(),
                error = %err,
                "offer closure step failed"
            );
            AssignmentError::from(err)
        })
    }
}
