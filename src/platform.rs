//! Boundary to the device: calls, alarms, media keys, radios.
//!
//! The assistant never performs these side effects itself. It hands the
//! routed [`LocalAction`] to a [`DevicePlatform`] and speaks based on the
//! outcome.

use tracing::info;

use crate::intent::LocalAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    /// Done; the assistant speaks its usual confirmation.
    Done,
    /// Done, and the platform has something to say instead (e.g. a message it read out).
    Say(String),
    /// Could not be done here. The reason is spoken to the user.
    Unavailable(String),
}

pub trait DevicePlatform: Send + Sync {
    fn perform(&self, action: &LocalAction) -> PlatformOutcome;
}

/// Desktop stand-in: logs each action and reports success.
#[derive(Debug, Default)]
pub struct LoggingPlatform;

impl DevicePlatform for LoggingPlatform {
    fn perform(&self, action: &LocalAction) -> PlatformOutcome {
        info!("Device action: {action:?}");
        match action {
            LocalAction::ReadLastMessage => {
                PlatformOutcome::Unavailable("Okunacak WhatsApp mesajı yok".into())
            }
            _ => PlatformOutcome::Done,
        }
    }
}
