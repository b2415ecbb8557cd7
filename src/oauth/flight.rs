//! Per-account single-flight refresh.
//!
//! Every account gets one guard and a generation counter. A caller snapshots
//! the generation (a [`FlightTicket`]) before it reads credentials. When its
//! request is rejected it takes the guard:
//!
//! - generation moved since the ticket: another refresh (or a sign-in
//!   overwrite) finished while this request was in flight, so the caller
//!   shares that outcome instead of starting its own
//! - generation unchanged: the caller refreshes, records the outcome and
//!   bumps the generation
//!
//! A call that starts after a failed refresh holds the new generation and
//! may refresh again. Different accounts never contend.

use super::TokenRefresh;
use crate::error::RefreshFailure;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Generation observed before a request was dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlightTicket(u64);

/// Result of a successful [`RefreshFlights::refresh_after_rejection`].
#[derive(Debug, PartialEq, Eq)]
pub enum FlightOutcome {
    /// This caller ran the refresh; carries the new access token.
    Refreshed(String),
    /// Another caller already replaced the stored tokens; re-read them.
    Joined,
}

#[derive(Default)]
struct Flight {
    generation: u64,
    last_outcome: Option<Result<(), RefreshFailure>>,
}

/// Single-flight coordinator shared by the gateway and the sign-in gate.
pub struct RefreshFlights {
    refresher: Arc<dyn TokenRefresh>,
    flights: DashMap<String, Arc<Mutex<Flight>>>,
}

impl RefreshFlights {
    pub fn new(refresher: Arc<dyn TokenRefresh>) -> Self {
        Self {
            refresher,
            flights: DashMap::new(),
        }
    }

    fn slot(&self, account_id: &str) -> Arc<Mutex<Flight>> {
        // Clone the Arc so the shard lock is released before any await
        Arc::clone(&self.flights.entry(account_id.to_string()).or_default())
    }

    /// Snapshots the account's generation. Waits for an in-flight refresh.
    pub async fn ticket(&self, account_id: &str) -> FlightTicket {
        let slot = self.slot(account_id);
        let flight = slot.lock().await;
        FlightTicket(flight.generation)
    }

    /// Refreshes after the platform rejected a token read under `ticket`.
    pub async fn refresh_after_rejection(
        &self,
        account_id: &str,
        ticket: FlightTicket,
    ) -> Result<FlightOutcome, RefreshFailure> {
        let slot = self.slot(account_id);
        let mut flight = slot.lock().await;

        if flight.generation != ticket.0 {
            debug!(account_id = %account_id, "Joining completed refresh");
            return match &flight.last_outcome {
                Some(Err(e)) => Err(e.clone()),
                _ => Ok(FlightOutcome::Joined),
            };
        }

        let outcome = self.refresher.refresh(account_id).await;

        flight.generation += 1;
        flight.last_outcome = Some(outcome.as_ref().map(|_| ()).map_err(Clone::clone));

        outcome.map(FlightOutcome::Refreshed)
    }

    /// Runs a credential overwrite under the account's guard.
    ///
    /// On success the generation is bumped, so requests rejected with the
    /// previous token re-read the stored one instead of refreshing.
    pub async fn exclusive<F, Fut, T, E>(&self, account_id: &str, write: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(account_id);
        let mut flight = slot.lock().await;

        let result = write().await;
        if result.is_ok() {
            flight.generation += 1;
            flight.last_outcome = Some(Ok(()));
        }

        result
    }
}
