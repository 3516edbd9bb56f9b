use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use secret_guest::assignment::{InMemoryStore, Offer, OfferId, OfferStatus, UserId, UserProfile};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Applicants seeded next to demo offers, by rating.
const DEMO_RATINGS: [i64; 5] = [0, 15, 60, 250, 2_000];
const DEMO_APP_LIMIT: u32 = 3;

pub(crate) fn offer_for_demo(participants_limit: u32, minutes_until_expiry: i64) -> Offer {
    let expiration_at = Utc::now() + chrono::Duration::minutes(minutes_until_expiry);
    Offer {
        id: OfferId::new(),
        hotel_id: Uuid::new_v4(),
        room_id: Uuid::new_v4(),
        location_id: Uuid::new_v4(),
        task: "Stay one night and report on check-in, room, and breakfast".to_string(),
        check_in_at: expiration_at + chrono::Duration::days(7),
        check_out_at: expiration_at + chrono::Duration::days(8),
        expiration_at,
        participants_limit,
        status: OfferStatus::Created,
    }
}

pub(crate) fn user_for_demo(rating: i64, app_limit: u32) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        rating,
        app_limit,
    }
}

/// Seeds offers expiring one minute apart plus a fixed pool of applicants.
pub(crate) fn seed_demo_data(store: &InMemoryStore, offers: usize) {
    if offers == 0 {
        return;
    }

    for index in 0..offers {
        let offer = offer_for_demo(DEMO_RATINGS.len() as u32, index as i64 + 1);
        info!(offer_id = %offer.id, expiration_at = %offer.expiration_at, "seeded demo offer");
        store.seed_offer(offer);
    }
    for rating in DEMO_RATINGS {
        let user = user_for_demo(rating, DEMO_APP_LIMIT);
        info!(user_id = %user.id, rating, "seeded demo applicant");
        store.seed_user(user);
    }
}
