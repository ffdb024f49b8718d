//! The talk-back capability.
//!
//! The coordinator never touches sockets.  Whoever hands it a request also
//! hands it a [`Notifier`] bound to the originating connection; the release
//! task keeps that notifier alive for as long as the car is crossing.

use async_trait::async_trait;
use onelane_types::{BridgeError, Notification};
use tokio::sync::mpsc;

/// Sends a [`Notification`] back to one client.
///
/// # Contract
///
/// * Delivery is best-effort.  A closed connection is reported as
///   [`BridgeError::DeliveryFailure`]; callers log it and move on.
/// * Implementations must not block on slow peers for long, since release
///   tasks await `notify` directly.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), BridgeError>;
}

/// A [`Notifier`] backed by an unbounded Tokio channel.
///
/// The connection layer owns the receiving half and forwards each
/// notification to its socket.  Once the receiver is dropped every further
/// `notify` fails with [`BridgeError::DeliveryFailure`].
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier together with the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), BridgeError> {
        self.tx
            .send(notification)
            .map_err(|_| BridgeError::DeliveryFailure("receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notification::released("A")).await.unwrap();
        notifier.notify(Notification::invalid_request()).await.unwrap();

        assert_eq!(rx.recv().await, Some(Notification::released("A")));
        assert_eq!(rx.recv().await, Some(Notification::invalid_request()));
    }

    #[tokio::test]
    async fn closed_receiver_is_a_delivery_failure() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);

        assert!(notifier.is_closed());
        let err = notifier.notify(Notification::released("A")).await.unwrap_err();
        assert!(matches!(err, BridgeError::DeliveryFailure(_)));
    }
}
