//! Events the framework itself publishes on the [`EventBus`](crate::EventBus).
//!
//! Each one travels as a [`PlatformEvent::Custom`] named after the event, with
//! the serialized struct as its payload. Listeners register for the name and
//! decode the payload with [`LifecycleEvent::from_event`]:
//!
//! ```text
//! bot_on_ready_boot            ReadyEvent, once per runtime, before any event
//! ├── bot_on_command           CommandEvent, a handler is about to run
//! ├── bot_on_response          ResponseEvent, a handler produced a response
//! ├── bot_on_exception         ExceptionEvent, the user was told what went wrong
//! └── bot_on_uncaught_exception FaultEvent, a handler failed or panicked
//! ```

use anvil_core::{MessageRef, PlatformEvent, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A typed framework event.
pub trait LifecycleEvent: Serialize + DeserializeOwned {
    /// Name the event is published under.
    const NAME: &'static str;

    fn into_event(self) -> PlatformEvent {
        let payload = serde_json::to_value(&self).unwrap_or_else(|e| {
            warn!(event = Self::NAME, error = %e, "Failed to serialize lifecycle payload");
            Value::Null
        });
        PlatformEvent::Custom {
            name: Self::NAME.to_string(),
            payload,
        }
    }

    /// Decodes `event` if it is this kind of lifecycle event.
    fn from_event(event: &PlatformEvent) -> Option<Self> {
        match event {
            PlatformEvent::Custom { name, payload } if name == Self::NAME => {
                serde_json::from_value(payload.clone()).ok()
            }
            _ => None,
        }
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// The runtime is about to process its first event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub self_id: Option<UserId>,
    pub invoker: String,
    /// Every registered command name, hidden ones included.
    pub commands: Vec<String>,
}

impl LifecycleEvent for ReadyEvent {
    const NAME: &'static str = "bot_on_ready_boot";
}

// ============================================================================
// Dispatch
// ============================================================================

/// An invocation matched and its handler is about to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub command: String,
    #[serde(default)]
    pub shortcut: Option<String>,
    pub author: UserId,
    pub message: MessageRef,
    pub variant: usize,
    /// The invocation text with shortcuts expanded.
    pub content: String,
}

impl LifecycleEvent for CommandEvent {
    const NAME: &'static str = "bot_on_command";
}

/// A handler returned a response. Published before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub command: String,
    pub author: UserId,
    pub message: MessageRef,
    /// The response mode name, e.g. `normal` or `wait`.
    pub mode: String,
    pub content: String,
}

impl LifecycleEvent for ResponseEvent {
    const NAME: &'static str = "bot_on_response";
}

/// An invocation was refused with a message for the user: bad syntax, a
/// failed check, denied access or a user error from the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEvent {
    /// `None` when no command was resolved, e.g. a shortcut that did not match.
    #[serde(default)]
    pub command: Option<String>,
    pub author: UserId,
    pub message: MessageRef,
    pub reason: String,
}

impl LifecycleEvent for ExceptionEvent {
    const NAME: &'static str = "bot_on_exception";
}

/// A handler returned an internal error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub command: String,
    pub author: UserId,
    pub message: MessageRef,
    pub error: String,
}

impl LifecycleEvent for FaultEvent {
    const NAME: &'static str = "bot_on_uncaught_exception";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_carries_name_and_payload() {
        let event = FaultEvent {
            command: "crn".into(),
            author: UserId::new("u1"),
            message: MessageRef::new("c1", "m1"),
            error: "boom".into(),
        }
        .into_event();

        assert_eq!(event.name(), "bot_on_uncaught_exception");
        let decoded = FaultEvent::from_event(&event).unwrap();
        assert_eq!(decoded.error, "boom");
        assert!(ExceptionEvent::from_event(&event).is_none());
    }

    #[test]
    fn test_optional_fields_default_when_missing() {
        let event = PlatformEvent::Custom {
            name: "bot_on_exception".into(),
            payload: serde_json::json!({
                "author": "u1",
                "message": {"channel": "c1", "id": "m1"},
                "reason": "Invalid syntax"
            }),
        };
        let decoded = ExceptionEvent::from_event(&event).unwrap();
        assert_eq!(decoded.command, None);
        assert_eq!(decoded.reason, "Invalid syntax");
    }
}
