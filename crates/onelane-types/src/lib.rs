//! `onelane-types` – shared wire types and the workspace error taxonomy.
//!
//! Everything that crosses a crate boundary lives here: the inbound
//! [`CarRequest`], the outbound [`Notification`] frames, the ledger's
//! [`LedgerEntry`] snapshot type, the [`DuplicatePolicy`] knob, and the
//! [`BridgeError`] / [`InvalidRequest`] error enums.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message sent back to a client whose request could not be admitted.
///
/// The wire never says *why* a request was rejected; the precise
/// [`InvalidRequest`] reason is only logged.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid car request";

/// Travel direction of a car on the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// A car asking for passage over the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarRequest {
    /// Client-chosen identifier, echoed back in the release notification.
    pub id: String,
    pub direction: Direction,
    /// Crossing time in seconds.
    pub time: f64,
}

/// A car currently on the bridge, as recorded by the crossing ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub car: CarRequest,
    pub admitted_at: DateTime<Utc>,
}

/// Outbound frames sent to a connected client.
///
/// Serialises to exactly `{"error": "..."}` or `{"id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    /// The request was rejected; nothing was admitted.
    Error { error: String },
    /// The car with this id has finished crossing.
    Released { id: String },
}

impl Notification {
    /// The generic rejection frame.
    pub fn invalid_request() -> Self {
        Notification::Error {
            error: INVALID_REQUEST_MESSAGE.to_string(),
        }
    }

    pub fn released(id: impl Into<String>) -> Self {
        Notification::Released { id: id.into() }
    }

    /// Render the notification as a JSON text frame.
    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

/// What to do when a car arrives with an id that is already on the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Admit it anyway; a release removes the first entry with that id.
    #[default]
    Allow,
    /// Reject it with the generic invalid-request frame.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DuplicatePolicy::Allow),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(format!("unknown duplicate-id policy: {other}")),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Allow => write!(f, "allow"),
            DuplicatePolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Why a raw payload was not accepted as a [`CarRequest`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidRequest {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("car id must not be empty")]
    EmptyId,

    #[error("crossing time must not be negative (got {0})")]
    NegativeTime(f64),

    #[error("crossing time must be finite")]
    NonFiniteTime,
}

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid car request: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    #[error("Car {0} is already crossing")]
    DuplicateCar(String),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
