//! [`BridgeCoordinator`] – admission and timed release.
//!
//! For every raw request the coordinator:
//!
//! 1. validates it ([`validate`]); a rejection is answered immediately with
//!    `{"error":"Invalid car request"}` and the ledger is left alone,
//! 2. admits the car into the shared [`CrossingLedger`], getting back the
//!    accumulated crossing time of everyone now on the bridge,
//! 3. spawns a release task that sleeps for that long, removes the car from
//!    the ledger and sends `{"id":"<car id>"}` through the connection's
//!    [`Notifier`].
//!
//! Releases are never cancelled.  A client that disconnects early simply
//! misses its notification; its car still leaves the ledger on time.

use std::sync::Arc;
use std::time::Duration;

use onelane_types::{CarRequest, DuplicatePolicy, Notification};
use tokio::task::JoinHandle;
use tracing::{debug, field, info, instrument, warn, Span};

use crate::ledger::CrossingLedger;
use crate::notifier::Notifier;
use crate::validator::validate;

// ────────────────────────────────────────────────────────────────────────────
// Admission outcome
// ────────────────────────────────────────────────────────────────────────────

/// What happened to a request handed to [`BridgeCoordinator::handle_request`].
#[derive(Debug)]
pub enum Admission {
    /// The request was invalid (or a duplicate under
    /// [`DuplicatePolicy::Reject`]); the client has been told.
    Rejected,
    /// The car is on the bridge and its release is scheduled.
    Admitted(ScheduledRelease),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// A pending release.
///
/// Dropping this value detaches the release task; it does not cancel it.
#[derive(Debug)]
pub struct ScheduledRelease {
    pub car_id: String,
    /// Time until the car leaves the bridge, measured from admission.
    pub delay: Duration,
    /// Completes once the car has been removed and its notifier called.
    pub handle: JoinHandle<()>,
}

// ────────────────────────────────────────────────────────────────────────────
// BridgeCoordinator
// ────────────────────────────────────────────────────────────────────────────

/// Shared entry point for every connection.
///
/// Cheap to clone; all clones share one [`CrossingLedger`].
#[derive(Debug, Clone, Default)]
pub struct BridgeCoordinator {
    ledger: Arc<CrossingLedger>,
    policy: DuplicatePolicy,
}

impl BridgeCoordinator {
    /// Create a coordinator with an empty ledger.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self::with_ledger(Arc::new(CrossingLedger::new()), policy)
    }

    /// Create a coordinator over an existing ledger.
    pub fn with_ledger(ledger: Arc<CrossingLedger>, policy: DuplicatePolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn ledger(&self) -> &Arc<CrossingLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Validate `raw`, admit the car and schedule its release.
    ///
    /// Every notification for this request, immediate or deferred, goes
    /// through `notifier`.  Runs inside a `handle_request` span whose
    /// `car_id` field is filled in once the payload parses.
    #[instrument(skip_all, fields(car_id = field::Empty))]
    pub async fn handle_request(&self, raw: &str, notifier: Arc<dyn Notifier>) -> Admission {
        match validate(raw) {
            Ok(car) => {
                Span::current().record("car_id", car.id.as_str());
                self.admit(car, notifier).await
            }
            Err(reason) => {
                debug!(reason = %reason, "rejected car request");
                reject(notifier.as_ref()).await;
                Admission::Rejected
            }
        }
    }

    async fn admit(&self, car: CarRequest, notifier: Arc<dyn Notifier>) -> Admission {
        let car_id = car.id.clone();
        let direction = car.direction;

        let accumulated = match self.ledger.admit(car, self.policy) {
            Ok(total) => total,
            Err(e) => {
                debug!(error = %e, "rejected car request");
                reject(notifier.as_ref()).await;
                return Admission::Rejected;
            }
        };

        let delay = crossing_delay(accumulated);
        info!(direction = %direction, delay_secs = accumulated, "car admitted");

        let handle = tokio::spawn(release_after(
            Arc::clone(&self.ledger),
            car_id.clone(),
            delay,
            notifier,
        ));

        Admission::Admitted(ScheduledRelease {
            car_id,
            delay,
            handle,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Convert an accumulated crossing time in seconds into a sleep duration.
///
/// Anything not strictly positive (including NaN) is no wait at all; sums
/// too large for a [`Duration`] saturate instead of panicking.
fn crossing_delay(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

async fn reject(notifier: &dyn Notifier) {
    if let Err(e) = notifier.notify(Notification::invalid_request()).await {
        warn!(error = %e, "could not deliver rejection");
    }
}

/// The `release` span is created inside the admitting `handle_request` span,
/// so an exported trace shows each car from admission to release.
#[instrument(name = "release", skip_all, fields(car_id = %car_id, delay_ms = delay.as_millis() as u64))]
async fn release_after(
    ledger: Arc<CrossingLedger>,
    car_id: String,
    delay: Duration,
    notifier: Arc<dyn Notifier>,
) {
    tokio::time::sleep(delay).await;

    match ledger.release(&car_id) {
        Some(_) => info!(remaining = ledger.len(), "car released"),
        None => warn!("release found no ledger entry; nothing removed"),
    }

    if let Err(e) = notifier.notify(Notification::released(car_id.as_str())).await {
        warn!(error = %e, "could not deliver release notification");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
