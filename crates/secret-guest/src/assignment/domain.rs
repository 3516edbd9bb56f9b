use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

identifier!(
    /// Identifier of a secret guest offer.
    OfferId
);
identifier!(
    /// Identifier of a user's application to an offer.
    ApplicationId
);
identifier!(
    /// Identifier of an applicant.
    UserId
);
identifier!(
    /// Identifier of the report created for a drawn winner.
    ReportId
);

/// Lifecycle of an offer. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Created,
    InProgress,
    Done,
}

impl OfferStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OfferStatus::Created => "created",
            OfferStatus::InProgress => "in_progress",
            OfferStatus::Done => "done",
        }
    }

    /// Staying in place is allowed so a resumed closure can re-apply a step.
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        next >= *self
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Created,
    Accepted,
    Declined,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Created => "created",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Declined => "declined",
        }
    }

    /// Applications in this state count against the applicant's quota.
    pub fn is_active(&self) -> bool {
        matches!(self, ApplicationStatus::Created)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A review task open for applications until `expiration_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub hotel_id: Uuid,
    pub room_id: Uuid,
    pub location_id: Uuid,
    pub task: String,
    pub check_in_at: DateTime<Utc>,
    pub check_out_at: DateTime<Utc>,
    pub expiration_at: DateTime<Utc>,
    pub participants_limit: u32,
    pub status: OfferStatus,
}

impl Offer {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_at <= now
    }

    pub fn accepts_applications(&self) -> bool {
        self.status == OfferStatus::Created
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub offer_id: OfferId,
    pub status: ApplicationStatus,
    /// Denormalized from the offer when the application is admitted.
    pub expiration_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request handed to the store's transactional admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationDraft {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub offer_id: OfferId,
    pub created_at: DateTime<Utc>,
}

/// The slice of a user this engine reads: reputation and personal quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub rating: i64,
    pub app_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAppLimitInfo {
    pub limit: u32,
    pub active_count: u32,
}

impl UserAppLimitInfo {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.active_count)
    }
}

/// An application joined with its applicant's rating at draw time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCandidate {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub rating: i64,
    pub expiration_at: DateTime<Utc>,
}

pub const REPORT_STATUS_CREATED: &str = "created";

/// Deliverable record for the drawn winner. Unique per offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub offer_id: OfferId,
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub expiration_at: DateTime<Utc>,
    pub status: String,
    pub text: String,
}

impl Report {
    pub fn for_winner(offer_id: OfferId, winner: &DrawCandidate) -> Self {
        Self {
            id: ReportId::new(),
            offer_id,
            application_id: winner.application_id,
            user_id: winner.user_id,
            expiration_at: winner.expiration_at,
            status: REPORT_STATUS_CREATED.to_string(),
            text: String::new(),
        }
    }
}
