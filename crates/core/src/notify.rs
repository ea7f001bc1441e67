//! Outbound notification seam.
//!
//! Delivery (email/SMS) is an external collaborator; the core only decides
//! who is told what, and when. [`Notifier::notify`] is fire-and-forget: the
//! boolean result reports whether the collaborator accepted the message,
//! and no operation fails because a notification did not go out.

use serde::{Deserialize, Serialize};

/// Categories of outbound notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Referral,
    Dispatch,
    Arrival,
    Emergency,
}

impl NotificationKind {
    /// Subject line the delivery collaborator puts on the message.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Referral => "New Patient Referral",
            Self::Dispatch => "Ambulance Dispatched",
            Self::Arrival => "Patient Arrival Notification",
            Self::Emergency => "Emergency Alert",
        }
    }
}

/// Capability to hand a message to the delivery collaborator.
pub trait Notifier: Send + Sync {
    /// Returns true when the message was accepted for delivery.
    fn notify(&self, recipient: &str, message: &str, kind: NotificationKind) -> bool;
}

/// Notifier that records messages in the service log instead of delivering
/// them. The default wiring when no delivery collaborator is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, message: &str, kind: NotificationKind) -> bool {
        tracing::info!(
            recipient,
            subject = kind.subject(),
            message,
            "notification prepared"
        );
        true
    }
}
