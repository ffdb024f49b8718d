//! `onelane-server` – the connection layer around the bridge coordinator.
//!
//! Boots a small HTTP + WebSocket server (default port `3000`) that:
//!
//! 1. **Upgrades** requests on the WebSocket path (default `/ws`) and feeds
//!    every text frame to the shared [`BridgeCoordinator`], answering through
//!    a per-connection [`ChannelNotifier`].
//!
//! 2. **Serves** two plain HTTP routes:
//!    - `GET /` – a plain-text greeting.
//!    - `GET /ledger` – the cars currently on the bridge as JSON.
//!
//! It also owns [`telemetry::init_tracing`], which wires up `tracing` with an
//! optional OTLP exporter for the binary.
//!
//! # Usage
//!
//! ```rust,no_run
//! use onelane_coordinator::BridgeCoordinator;
//! use onelane_server::BridgeServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     BridgeServer::new(BridgeCoordinator::default())
//!         .run()
//!         .await
//!         .expect("bridge server failed");
//! }
//! ```
//!
//! [`BridgeCoordinator`]: onelane_coordinator::BridgeCoordinator
//! [`ChannelNotifier`]: onelane_coordinator::ChannelNotifier

pub mod server;
pub mod telemetry;

pub use server::{BoundServer, BridgeServer, DEFAULT_PORT, DEFAULT_WS_PATH};
pub use telemetry::{init_tracing, TracerProviderGuard};
