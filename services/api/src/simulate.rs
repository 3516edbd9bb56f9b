use crate::infra::{offer_for_demo, user_for_demo};
use clap::Args;
use secret_guest::assignment::{
    AdmissionController, ApplicationStore, AssignmentCloser, ClosureConfig, ClosureOutcome,
    DrawCandidate, DrawConfig, InMemoryStore, OfferStatus, WinnerSelector,
};
use secret_guest::error::AppError;
use std::sync::Arc;
use std::time::Duration;

const STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub(crate) struct SimulateArgs {
    /// Comma-separated applicant ratings
    #[arg(long, value_delimiter = ',', default_value = "0,10,100,10000")]
    pub(crate) ratings: Vec<i64>,
    /// Number of draws used to estimate win frequencies
    #[arg(long, default_value_t = 10_000)]
    pub(crate) draws: usize,
    /// Seed for reproducible draws (entropy when omitted)
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Move losing applications to declined when the offer closes
    #[arg(long)]
    pub(crate) decline_losers: bool,
}

struct Tally {
    candidate: DrawCandidate,
    expected: f64,
    wins: usize,
}

pub(crate) async fn run_simulation(args: SimulateArgs) -> Result<(), AppError> {
    let SimulateArgs {
        ratings,
        draws,
        seed,
        decline_losers,
    } = args;

    let store = Arc::new(InMemoryStore::new());
    let offer = offer_for_demo(ratings.len() as u32, 30);
    store.seed_offer(offer.clone());

    let admission = AdmissionController::new(Arc::clone(&store), STORE_TIMEOUT);
    for rating in &ratings {
        let user = user_for_demo(*rating, 1);
        store.seed_user(user.clone());
        admission.create_application(user.id, offer.id).await?;
    }
    let candidates = store
        .get_by_offer_for_draw(offer.id)
        .await
        .map_err(secret_guest::assignment::AssignmentError::from)?;

    let config = DrawConfig::default();
    let selector = || match seed {
        Some(seed) => WinnerSelector::seeded(config, seed),
        None => WinnerSelector::new(config),
    };

    println!("Secret guest draw simulation");
    println!(
        "Offer {} with {} applicant(s), alpha {}, gamma {}",
        offer.id,
        candidates.len(),
        config.alpha,
        config.gamma
    );

    let closer = AssignmentCloser::new(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::new(selector()),
        ClosureConfig {
            decline_non_winners: decline_losers,
        },
        STORE_TIMEOUT,
    );
    match closer.close_offer(&offer).await? {
        ClosureOutcome::Awarded(award) => {
            let rating = candidates
                .iter()
                .find(|candidate| candidate.application_id == award.application_id)
                .map(|candidate| candidate.rating)
                .unwrap_or_default();
            println!(
                "Closed offer: winner {} (rating {}), report {}",
                award.user_id, rating, award.report_id
            );
        }
        ClosureOutcome::NoApplicants => println!("Closed offer: no applicants"),
        ClosureOutcome::AlreadyClosed => println!("Offer was already closed"),
    }
    let status = store
        .offer(offer.id)
        .map(|offer| offer.status)
        .unwrap_or(OfferStatus::Created);
    println!("Offer status: {status}");

    if candidates.is_empty() || draws == 0 {
        return Ok(());
    }

    let shares = config.shares(&candidates);
    let mut tallies: Vec<Tally> = candidates
        .into_iter()
        .zip(shares)
        .map(|(candidate, expected)| Tally {
            candidate,
            expected,
            wins: 0,
        })
        .collect();
    let pool: Vec<DrawCandidate> = tallies.iter().map(|tally| tally.candidate.clone()).collect();

    let sampler = selector();
    for _ in 0..draws {
        let winner = sampler.select(&pool)?;
        if let Some(tally) = tallies
            .iter_mut()
            .find(|tally| tally.candidate.application_id == winner)
        {
            tally.wins += 1;
        }
    }

    println!("\nWin frequencies over {draws} draws");
    println!(
        "  {:>8}  {:>12}  {:>9}  {:>9}",
        "rating", "contribution", "expected", "observed"
    );
    for tally in &tallies {
        println!(
            "  {:>8}  {:>12.4}  {:>8.2}%  {:>8.2}%",
            tally.candidate.rating,
            config.contribution(tally.candidate.rating),
            tally.expected * 100.0,
            tally.wins as f64 / draws as f64 * 100.0
        );
    }

    Ok(())
}
