//! Request validation.
//!
//! [`validate`] turns a raw text frame into a [`CarRequest`] or explains why
//! it cannot.  It is a pure function: no I/O, no shared state, safe to call
//! from any number of connections at once.

use onelane_types::{CarRequest, InvalidRequest};

/// Parse and check a raw payload.
///
/// Rules:
///
/// | Field | Accepted |
/// |---|---|
/// | `id` | any non-empty string |
/// | `direction` | `"left"` or `"right"` |
/// | `time` | finite number ≥ 0 (zero means "release immediately") |
///
/// Missing fields, unknown directions and non-JSON input all come back as
/// [`InvalidRequest::Malformed`].
pub fn validate(raw: &str) -> Result<CarRequest, InvalidRequest> {
    let car: CarRequest =
        serde_json::from_str(raw).map_err(|e| InvalidRequest::Malformed(e.to_string()))?;
    check(&car)?;
    Ok(car)
}

/// The field rules alone, for cars that did not come off the wire.
///
/// [`CrossingLedger::admit`](crate::ledger::CrossingLedger::admit) runs this
/// too, so nothing reaches the ledger without passing it.
pub fn check(car: &CarRequest) -> Result<(), InvalidRequest> {
    if car.id.is_empty() {
        return Err(InvalidRequest::EmptyId);
    }
    if !car.time.is_finite() {
        return Err(InvalidRequest::NonFiniteTime);
    }
    if car.time < 0.0 {
        return Err(InvalidRequest::NegativeTime(car.time));
    }
    Ok(())
}
