//! Change notifications from the entity cache to the distributor.

use serde::{Deserialize, Serialize};
use switchyard_core::ResourceKind;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One collection changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// The collection that was reloaded.
    pub resource: ResourceKind,
}

/// Sending half of the notification channel.
///
/// Sending never blocks. When the channel is full the notification is
/// dropped: one already queued causes a full recompile that reads the
/// then-current collections.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: mpsc::Sender<Notification>,
}

/// Create a bounded notification channel.
pub fn channel(buffer: usize) -> (Notifier, mpsc::Receiver<Notification>) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    (Notifier { sender }, receiver)
}

impl Notifier {
    /// Announce that `resource` was reloaded. Returns whether it was queued.
    pub fn notify(&self, resource: ResourceKind) -> bool {
        match self.sender.try_send(Notification { resource }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(kind = %resource, "notification channel full, coalescing");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind = %resource, "notification receiver gone");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_coalesces() {
        let (notifier, mut rx) = channel(1);
        assert!(notifier.notify(ResourceKind::Route));
        assert!(!notifier.notify(ResourceKind::Cluster));

        assert_eq!(rx.try_recv().unwrap().resource, ResourceKind::Route);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_does_not_panic() {
        let (notifier, rx) = channel(4);
        drop(rx);
        assert!(!notifier.notify(ResourceKind::Listener));
    }

    #[test]
    fn notification_wire_form() {
        let json = serde_json::to_string(&Notification {
            resource: ResourceKind::Cluster,
        })
        .unwrap();
        assert_eq!(json, r#"{"resource":"cluster"}"#);
    }
}
