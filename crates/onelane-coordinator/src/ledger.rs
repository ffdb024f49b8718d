//! [`CrossingLedger`] – the cars currently on the bridge.
//!
//! The ledger is the only shared mutable state in the coordinator.  Every
//! operation takes the same [`Mutex`] exactly once, so:
//!
//! * **admit** appends a car *and* sums every crossing time in one critical
//!   section.  Two cars admitted at the same instant always see each other in
//!   a consistent order; neither can miss or double-count the other.
//! * **release** finds the first entry with a given id *and* removes it in one
//!   critical section.
//!
//! The lock is never held across an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use onelane_types::{BridgeError, CarRequest, DuplicatePolicy, LedgerEntry};

use crate::validator::check;

// ────────────────────────────────────────────────────────────────────────────
// CrossingLedger
// ────────────────────────────────────────────────────────────────────────────

/// Insertion-ordered list of admitted cars, guarded by a single lock.
///
/// # Example
///
/// ```
/// use onelane_coordinator::ledger::CrossingLedger;
/// use onelane_types::{CarRequest, Direction, DuplicatePolicy};
///
/// let ledger = CrossingLedger::new();
/// let car = |id: &str, time| CarRequest { id: id.into(), direction: Direction::Left, time };
///
/// assert_eq!(ledger.admit(car("A", 2.0), DuplicatePolicy::Allow).unwrap(), 2.0);
/// assert_eq!(ledger.admit(car("B", 3.0), DuplicatePolicy::Allow).unwrap(), 5.0);
///
/// ledger.release("A");
/// assert_eq!(ledger.accumulated_time(), 3.0);
/// ```
#[derive(Debug, Default)]
pub struct CrossingLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl CrossingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `car` and return the accumulated crossing time (seconds) of
    /// every car now on the bridge, including `car` itself.
    ///
    /// A car that breaks the field rules ([`check`]) is refused with
    /// [`BridgeError::InvalidRequest`]; one bad time would otherwise poison
    /// the sum for every later car.
    ///
    /// Under [`DuplicatePolicy::Reject`] a car whose id is already present is
    /// refused with [`BridgeError::DuplicateCar`] and the ledger is left as it
    /// was.  The presence check happens under the same lock as the append.
    pub fn admit(&self, car: CarRequest, policy: DuplicatePolicy) -> Result<f64, BridgeError> {
        check(&car)?;
        let mut entries = self.lock();

        if policy == DuplicatePolicy::Reject && entries.iter().any(|e| e.car.id == car.id) {
            return Err(BridgeError::DuplicateCar(car.id));
        }

        entries.push(LedgerEntry {
            car,
            admitted_at: Utc::now(),
        });

        Ok(sum_times(&entries))
    }

    /// Remove the first entry whose id equals `id`.
    ///
    /// Returns the removed car, or `None` when no entry matches; in that case
    /// the ledger is not touched.
    pub fn release(&self, id: &str) -> Option<CarRequest> {
        let mut entries = self.lock();
        let index = entries.iter().position(|e| e.car.id == id)?;
        Some(entries.remove(index).car)
    }

    /// Sum of the crossing times of every car currently on the bridge.
    pub fn accumulated_time(&self) -> f64 {
        sum_times(&self.lock())
    }

    /// Whether a car with this id is currently on the bridge.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|e| e.car.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current entries in admission order.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.lock().clone()
    }

    // A panic elsewhere cannot leave the Vec half-mutated, so a poisoned lock
    // still guards a consistent ledger.
    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sum_times(entries: &[LedgerEntry]) -> f64 {
    entries.iter().map(|e| e.car.time).sum()
}
