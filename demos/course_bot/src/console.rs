//! A terminal standing in for a chat platform.
//!
//! Every line typed on stdin becomes a message in the `console` channel.
//! Lines starting with `/` drive the rest of the platform by hand:
//!
//! | Input | Event |
//! |-------|-------|
//! | `/edit <in-id> <text>` | edits an earlier message |
//! | `/react <out-id> <control>` | activates a control on a bot message |
//! | `/help [command]` | lists commands, or describes one |
//! | `/quit` | stops reading input |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anvil::core::{IncomingMessage, MessageEdit, ReactionEvent};
use anvil::prelude::*;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const CHANNEL: &str = "console";
pub const BOT_ID: &str = "course-bot";

// ============================================================================
// Platform
// ============================================================================

/// Prints every platform call to stdout.
pub struct ConsolePlatform {
    self_id: UserId,
    next_id: AtomicU64,
}

impl ConsolePlatform {
    pub fn new() -> Self {
        Self {
            self_id: UserId::new(BOT_ID),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for ConsolePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    fn self_id(&self) -> Option<&UserId> {
        Some(&self.self_id)
    }

    async fn send(
        &self,
        channel: &ChannelId,
        content: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageRef> {
        let id = format!("out-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let voice = if options.speak_aloud { " (aloud)" } else { "" };
        println!("[{id}]{voice} {content}");
        Ok(MessageRef::new(channel.clone(), id))
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> PlatformResult<()> {
        println!("[{} edited] {content}", message.id);
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> PlatformResult<()> {
        println!("[{} deleted]", message.id);
        Ok(())
    }

    async fn attach_controls(&self, message: &MessageRef, buttons: &[Button]) -> PlatformResult<()> {
        let controls: Vec<String> = buttons
            .iter()
            .map(|b| format!("{} {}", b.label, b.id))
            .collect();
        println!("[{} controls] {}", message.id, controls.join("  "));
        Ok(())
    }

    async fn detach_controls(&self, message: &MessageRef) -> PlatformResult<()> {
        println!("[{} controls removed]", message.id);
        Ok(())
    }
}

// ============================================================================
// Input
// ============================================================================

/// One parsed line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Edit { id: &'a str, text: &'a str },
    React { id: &'a str, control: &'a str },
    Help(Option<&'a str>),
    Quit,
    Invalid(&'static str),
}

fn parse(line: &str) -> Input<'_> {
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "edit" => match rest.split_once(' ') {
            Some((id, text)) => Input::Edit {
                id,
                text: text.trim_start(),
            },
            None => Input::Invalid("usage: /edit <in-id> <text>"),
        },
        "react" => match rest.split_once(' ') {
            Some((id, control)) if !control.trim().is_empty() => Input::React {
                id,
                control: control.trim(),
            },
            _ => Input::Invalid("usage: /react <out-id> <control>"),
        },
        "help" => Input::Help((!rest.is_empty()).then_some(rest)),
        "quit" => Input::Quit,
        _ => Input::Invalid("unknown console command"),
    }
}

/// Reads stdin until `/quit` or end of input, feeding events to `events`.
///
/// Dropping the sender on return lets the runtime loop finish.
pub async fn read_input(runtime: AnvilRuntime, user: String, events: mpsc::Sender<PlatformEvent>) {
    let author = UserId::new(user);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: HashMap<String, IncomingMessage> = HashMap::new();
    let mut next_id = 1u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                break;
            }
        };

        let event = match parse(line.trim_end()) {
            Input::Message(text) => {
                let id = format!("in-{next_id}");
                next_id += 1;
                let message = IncomingMessage {
                    message: MessageRef::new(CHANNEL, id.as_str()),
                    author: author.clone(),
                    guild: None,
                    content: text.to_string(),
                    attachments: Vec::new(),
                };
                println!("({id})");
                history.insert(id, message.clone());
                PlatformEvent::Message(message)
            }
            Input::Edit { id, text } => {
                let Some(before) = history.get(id).cloned() else {
                    println!("no message {id}");
                    continue;
                };
                let after = IncomingMessage {
                    content: text.to_string(),
                    ..before.clone()
                };
                history.insert(id.to_string(), after.clone());
                PlatformEvent::MessageEdit(MessageEdit { before, after })
            }
            Input::React { id, control } => PlatformEvent::ReactionAdd(ReactionEvent {
                message: MessageRef::new(CHANNEL, id),
                user: author.clone(),
                control: control.to_string(),
            }),
            Input::Help(None) => {
                println!("Commands: {}", runtime.dispatcher().visible_commands().join(", "));
                continue;
            }
            Input::Help(Some(name)) => {
                match runtime.dispatcher().help(name) {
                    Some(help) => println!("{help}"),
                    None => println!("no command named {name}"),
                }
                continue;
            }
            Input::Quit => break,
            Input::Invalid(usage) => {
                println!("{usage}");
                continue;
            }
        };

        debug!(kind = event.name(), "Console event");
        if events.send(event).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_input() {
        assert_eq!(parse("!crn pending"), Input::Message("!crn pending"));
        assert_eq!(
            parse("/edit in-2 !mycommand  myoption"),
            Input::Edit {
                id: "in-2",
                text: "!mycommand  myoption"
            }
        );
        assert_eq!(
            parse("/react out-1 clear"),
            Input::React {
                id: "out-1",
                control: "clear"
            }
        );
        assert_eq!(parse("/help"), Input::Help(None));
        assert_eq!(parse("/help crn"), Input::Help(Some("crn")));
        assert_eq!(parse("/quit"), Input::Quit);
        assert!(matches!(parse("/react out-1"), Input::Invalid(_)));
        assert!(matches!(parse("/frobnicate"), Input::Invalid(_)));
    }

    #[tokio::test]
    async fn test_console_platform_numbers_messages() {
        let platform = ConsolePlatform::new();
        let channel = ChannelId::new(CHANNEL);
        let first = platform.send(&channel, "a", &SendOptions::default()).await.unwrap();
        let second = platform.send(&channel, "b", &SendOptions::default()).await.unwrap();
        assert_eq!(first.id, "out-1");
        assert_eq!(second.id, "out-2");
        assert_eq!(platform.self_id(), Some(&UserId::new(BOT_ID)));
    }
}
