//! `onelane-coordinator` – The Bridge Crossing Coordinator
//!
//! Admits cars onto a single-lane bridge, works out how long each one has to
//! wait, and tells the originating client when its car is across.
//!
//! # Modules
//!
//! - [`validator`] – [`validate`][validator::validate]: pure parse-and-check
//!   of a raw text payload into a [`CarRequest`][onelane_types::CarRequest].
//! - [`ledger`] – [`CrossingLedger`][ledger::CrossingLedger]: the one shared,
//!   lock-guarded list of cars currently on the bridge.  Admission appends and
//!   sums in a single critical section.
//! - [`notifier`] – [`Notifier`][notifier::Notifier]: the capability a
//!   connection hands in so the coordinator can talk back to it, plus the
//!   channel-backed [`ChannelNotifier`][notifier::ChannelNotifier].
//! - [`coordinator`] – [`BridgeCoordinator`][coordinator::BridgeCoordinator]:
//!   ties the three together and schedules one release task per admitted car.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use onelane_coordinator::{BridgeCoordinator, ChannelNotifier};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = BridgeCoordinator::default();
//!     let (notifier, mut rx) = ChannelNotifier::new();
//!
//!     coordinator
//!         .handle_request(r#"{"id":"A","direction":"left","time":2}"#, Arc::new(notifier))
//!         .await;
//!
//!     // Two seconds later: {"id":"A"}
//!     let released = rx.recv().await;
//!     println!("{released:?}");
//! }
//! ```

pub mod coordinator;
pub mod ledger;
pub mod notifier;
pub mod validator;

pub use coordinator::{Admission, BridgeCoordinator, ScheduledRelease};
pub use ledger::CrossingLedger;
pub use notifier::{ChannelNotifier, Notifier};
pub use validator::{check, validate};
