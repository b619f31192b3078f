//! Event listeners and the demo's own settings.
//!
//! ```toml
//! [plugins.course_bot]
//! show_edited_messages = true
//! owner_channel = "owners"
//! ```

use anvil::core::MessageEdit;
use anvil::framework::{LifecycleEvent, ReadyEvent};
use anvil::prelude::*;
use serde::Deserialize;
use tracing::info;

pub const PLUGIN: &str = "course_bot";

/// The `plugins.course_bot` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CourseBotConfig {
    /// Log every edit users make to their messages.
    pub show_edited_messages: bool,
    /// Channel `notify` relays messages to.
    pub owner_channel: String,
}

impl Default for CourseBotConfig {
    fn default() -> Self {
        Self {
            show_edited_messages: false,
            owner_channel: "owners".to_string(),
        }
    }
}

/// Registers the demo's listeners on the runtime's bus.
pub fn register(runtime: &AnvilRuntime, settings: &CourseBotConfig) {
    let bus = runtime.bus();

    bus.listen(ReadyEvent::NAME, |event: PlatformEvent| async move {
        if let Some(ready) = ReadyEvent::from_event(&event) {
            info!(
                invoker = %ready.invoker,
                commands = %ready.commands.join(", "),
                "Course bot booted"
            );
        }
    });

    if settings.show_edited_messages {
        let own_id = runtime.driver().platform().self_id().cloned();
        bus.listen("message_edit", move |event: PlatformEvent| {
            let line = match &event {
                PlatformEvent::MessageEdit(edit) => describe_edit(edit, own_id.as_ref()),
                _ => None,
            };
            async move {
                if let Some(line) = line {
                    info!("{line}");
                }
            }
        });
    }
}

/// The log line for an edit, or `None` for the bot's own messages.
fn describe_edit(edit: &MessageEdit, own_id: Option<&UserId>) -> Option<String> {
    if own_id == Some(&edit.before.author) {
        return None;
    }
    Some(format!(
        "Somebody edited their message from '{}' to '{}'.",
        edit.before.content, edit.after.content
    ))
}
