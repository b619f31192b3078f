//! The demo commands.
//!
//! | Command | Shows |
//! |---------|-------|
//! | `mycommand` | option and argument shapes, NORMAL, PERMANENT and ACTIVE responses |
//! | `myothercommand` | keywords, EXPIRE, and variant order deciding the match |
//! | `wait` | WAIT for the author's next message |
//! | `crn` | validation, a shortcut, and an INTERACTIVE listing |
//! | `notify` | a handler that talks to the platform itself |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anvil::core::ReactionEvent;
use anvil::prelude::*;
use parking_lot::Mutex;

/// Builds the registry of every demo command.
pub fn registry(courses: CourseBook, owners: Owners) -> anyhow::Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    registry.register(mycommand_blueprint()?, mycommand)?;
    registry.register(myothercommand_blueprint()?, myothercommand)?;
    registry.register(Blueprint::new("wait", vec![Variant::new().doc("Waits for your next message.")])?, wait)?;

    let courses = Arc::new(courses);
    registry.register_with_shortcuts(
        crn_blueprint()?,
        move |ctx: InvocationContext, matched: MatchResult| {
            let courses = courses.clone();
            async move { courses.crn(ctx, matched).await }
        },
        vec![
            Shortcut::new("watch", "watch {department} {number} {crn}")
                .arg(Arg::single("department"))
                .arg(Arg::single("number"))
                .arg(Arg::single("crn")),
        ],
    )?;

    let owners = Arc::new(owners);
    registry.register(
        Blueprint::builder("notify")
            .description("Sends a message to the bot owners.")
            .variant(Variant::new().arg(Arg::merged("message")).doc("What to tell them."))
            .build()?,
        move |ctx: InvocationContext, matched: MatchResult| {
            let owners = owners.clone();
            async move { owners.notify(ctx, matched).await }
        },
    )?;
    Ok(registry)
}

// ============================================================================
// mycommand
// ============================================================================

fn mycommand_blueprint() -> anyhow::Result<Blueprint> {
    let blueprint = Blueprint::builder("mycommand")
        .description("Shows off the blueprint grammar.")
        .variant(Variant::new().opt(Opt::new("myoption")).doc("Calls the first subcommand."))
        .variant(
            Variant::new()
                .opt(Opt::new("custom").optional())
                .opt(Opt::new("attached").attached("parameter").optional())
                .doc("Optional flags, one with an attached parameter."),
        )
        .variant(
            Variant::new()
                .opt(Opt::new("trailing"))
                .arg(Arg::split("arguments").additional("more"))
                .doc("Collects trailing arguments into a list."),
        )
        .variant(
            Variant::new()
                .opt(Opt::new("grouped"))
                .arg(Arg::merged("text"))
                .doc("Keeps trailing text as one argument. Not editable."),
        )
        .variant(
            Variant::new()
                .opt(Opt::new("complex").attached("value"))
                .opt(Opt::new("other").attached("value").optional())
                .arg(Arg::split_optional("arguments"))
                .doc("Mixes attached options and trailing arguments."),
        )
        .variant(
            Variant::new()
                .opt(Opt::new("marquee"))
                .arg(Arg::merged("text").validate(
                    |text| text.as_str().is_some_and(|t| t.chars().count() <= 100),
                    "Marquee text is limited to 100 characters.",
                ))
                .doc("Scrolls the text across the message. Very slow."),
        )
        .build()?;
    Ok(blueprint)
}

async fn mycommand(_ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
    let response = match matched.variant_index {
        0 => Response::new("You called the first subcommand!"),
        1 => {
            let mut content = String::new();
            if matched.has_option("custom") {
                content.push_str("You included the \"custom\" flag!\n");
            }
            if let Some(parameter) = matched.option("attached") {
                content.push_str(&format!("The attached parameter: {parameter}\n"));
            }
            if matched.options.is_empty() {
                content.push_str("You didn't use either flag...\nFor help, try `/help mycommand`");
            }
            Response::new(content)
        }
        2 => Response::new(format!(
            "The list of trailing arguments: {:?}",
            list(&matched, 0)
        )),
        3 => Response::permanent(format!(
            "You can't edit your command here.\nSingle grouped argument: {}",
            matched.arg_str(0).unwrap_or_default()
        )),
        4 => {
            let mut content = format!(
                "The argument attached to the complex option: {}",
                matched.option("complex").unwrap_or_default()
            );
            if let Some(other) = matched.option("other") {
                content.push_str(&format!("\nThe other option has attached: {other}"));
            }
            content.push_str(&format!("\nLastly, the trailing arguments: {:?}", list(&matched, 0)));
            Response::new(content)
        }
        5 => {
            let text = matched.arg_str(0).unwrap_or_default().to_string();
            Response::active("Setting up marquee...", move |message: ActiveMessage| {
                marquee(message, text.clone())
            })
        }
        index => return Err(CommandError::internal(format!("unknown mycommand variant {index}"))),
    };
    Ok(response)
}

fn list(matched: &MatchResult, index: usize) -> Vec<String> {
    matched
        .arg(index)
        .and_then(Capture::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

const MARQUEE_WIDTH: usize = 20;
const MARQUEE_PASSES: usize = 3;

/// Every frame of the marquee for `text`, one edit each.
fn marquee_frames(text: &str) -> Vec<String> {
    let padding = " ".repeat(MARQUEE_WIDTH);
    let padded: Vec<char> = format!("{padding}{text}{padding}").chars().collect();
    let steps = padded.len() - MARQUEE_WIDTH;
    (0..MARQUEE_PASSES)
        .flat_map(|_| 0..steps)
        .map(|offset| {
            let window: String = padded[offset..offset + MARQUEE_WIDTH].iter().collect();
            format!("`|{window}|`")
        })
        .collect()
}

async fn marquee(message: ActiveMessage, text: String) -> InteractionResult<()> {
    for frame in marquee_frames(&text) {
        message.edit(frame).await?;
    }
    message.edit(text).await
}

// ============================================================================
// myothercommand
// ============================================================================

fn myothercommand_blueprint() -> anyhow::Result<Blueprint> {
    let blueprint = Blueprint::builder("myothercommand")
        .description("Checks your input against the command's keywords.")
        // Listed first: the keyword checker below accepts any input.
        .variant(
            Variant::new()
                .opt(Opt::new("secret"))
                .opt(Opt::new("keyword"))
                .doc("Only matches both keywords."),
        )
        .variant(Variant::new().arg(Arg::merged_optional("text")).doc("Keyword checker."))
        .build()?;
    Ok(blueprint)
}

async fn myothercommand(ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
    let mut content = match matched.variant_index {
        0 => "You found the secret variant! Order does not matter, try `keyword secret`.\n".to_string(),
        1 => keyword_check(&ctx, &matched),
        _ => return Err(CommandError::internal("myothercommand matched an unknown variant")),
    };
    content.push_str("This message will self destruct in 15 seconds.");
    Ok(Response::expire_target(content, Duration::from_secs(15), ExpireTarget::Response))
}

fn keyword_check(ctx: &InvocationContext, matched: &MatchResult) -> String {
    let text = matched.arg_str(0).unwrap_or_default();
    if text.is_empty() {
        "You didn't say anything...\n".to_string()
    } else if matched.is_keyword(text) {
        format!("This is your input: {text}\nYour input was in the list of keywords!\n")
    } else {
        let keywords: Vec<&str> = ctx.keywords.iter().map(String::as_str).collect();
        format!(
            "This is your input: {text}\nYour input was not in the list of keywords. They are: {}\n",
            keywords.join(", ")
        )
    }
}

// ============================================================================
// wait
// ============================================================================

async fn wait(ctx: InvocationContext, _matched: MatchResult) -> Result<Response, CommandError> {
    let author = ctx.author.clone();
    let spec = WaitSpec::new("message", move |event: &PlatformEvent| {
        event.author() == Some(&author)
    })
    .timeout(Duration::from_secs(30));
    Ok(Response::wait(format!("Say something, {}.", ctx.author), spec, reply_received))
}

async fn reply_received(result: Option<PlatformEvent>, message: ActiveMessage) -> InteractionResult<()> {
    let edit = match result.as_ref().and_then(PlatformEvent::as_message) {
        None => "You took too long to respond...".to_string(),
        Some(reply) if !reply.content.is_empty() => {
            let quoted: String = reply.content.chars().take(100).collect();
            format!("You replied with \"{quoted}\"")
        }
        Some(_) => "You did not reply with any content text!".to_string(),
    };
    message.edit(edit).await
}

// ============================================================================
// crn
// ============================================================================

fn crn_blueprint() -> anyhow::Result<Blueprint> {
    let blueprint = Blueprint::builder("crn")
        .description("UIUC course explorer tools.")
        .variant(Variant::new().opt(Opt::new("pending")).doc("Lists courses you are waiting on."))
        .variant(
            Variant::new()
                .opt(Opt::new("watch"))
                .arg(Arg::single("department code"))
                .arg(Arg::single("course number"))
                .arg(Arg::single("crn").validate(is_crn, "A CRN is a five digit number."))
                .doc("Monitors a CRN and lets you know if it opens up."),
        )
        .variant(
            Variant::new()
                .opt(Opt::new("course"))
                .arg(Arg::single("department code"))
                .arg(Arg::single("course number"))
                .doc("Shows details on the given course."),
        )
        .build()?;
    Ok(blueprint)
}

fn is_crn(value: &Capture) -> bool {
    value
        .as_str()
        .is_some_and(|crn| crn.len() == 5 && crn.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Watch {
    department: String,
    number: String,
    crn: String,
}

/// Watched CRNs per user, and where the course explorer lives.
pub struct CourseBook {
    year: u16,
    semester: String,
    watches: Mutex<BTreeMap<UserId, Vec<Watch>>>,
}

impl CourseBook {
    pub fn new(year: u16, semester: impl Into<String>) -> Self {
        Self {
            year,
            semester: semester.into().to_lowercase(),
            watches: Mutex::default(),
        }
    }

    fn course_url(&self, department: &str, number: &str) -> String {
        format!(
            "http://courses.illinois.edu/cisapp/explorer/schedule/{}/{}/{department}/{number}.xml?mode=detail",
            self.year, self.semester
        )
    }

    fn listing(&self, user: &UserId) -> String {
        let watches = self.watches.lock();
        match watches.get(user) {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|w| format!("{} {} (CRN {})", w.department, w.number, w.crn))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "You are not watching any courses.".to_string(),
        }
    }

    async fn crn(
        self: Arc<Self>,
        ctx: InvocationContext,
        matched: MatchResult,
    ) -> Result<Response, CommandError> {
        match matched.variant_index {
            0 => {
                let author = ctx.author.clone();
                let courses = self.clone();
                Ok(Response::interactive(
                    self.listing(&ctx.author),
                    vec![Button::new("clear", "🗑"), Button::new("done", "✅")],
                    move |reaction: ReactionEvent, message: ActiveMessage| {
                        pending_control(courses.clone(), author.clone(), reaction, message)
                    },
                )
                .interaction_timeout(Duration::from_secs(60)))
            }
            1 => {
                let watch = Watch {
                    department: matched.arg_str(0).unwrap_or_default().to_uppercase(),
                    number: matched.arg_str(1).unwrap_or_default().to_string(),
                    crn: matched.arg_str(2).unwrap_or_default().to_string(),
                };
                let mut watches = self.watches.lock();
                let list = watches.entry(ctx.author.clone()).or_default();
                if list.iter().any(|w| w.crn == watch.crn) {
                    return Err(CommandError::user(format!(
                        "You are already watching CRN {}.",
                        watch.crn
                    )));
                }
                let content = format!(
                    "Watching {} {} (CRN {}). You will be notified if it opens up.",
                    watch.department, watch.number, watch.crn
                );
                list.push(watch);
                Ok(Response::new(content))
            }
            2 => {
                let department = matched.arg_str(0).unwrap_or_default().to_uppercase();
                let number = matched.arg_str(1).unwrap_or_default();
                Ok(Response::new(format!(
                    "{department} {number}: {}",
                    self.course_url(&department, number)
                )))
            }
            index => Err(CommandError::internal(format!("unknown crn variant {index}"))),
        }
    }
}

async fn pending_control(
    courses: Arc<CourseBook>,
    author: UserId,
    reaction: ReactionEvent,
    message: ActiveMessage,
) -> InteractionResult<Interaction> {
    if reaction.user != author {
        return Ok(Interaction::Continue);
    }
    match reaction.control.as_str() {
        "clear" => {
            let removed = courses
                .watches
                .lock()
                .remove(&author)
                .map_or(0, |list| list.len());
            message
                .edit(format!("Stopped watching {removed} course(s)."))
                .await?;
            Ok(Interaction::Stop)
        }
        "done" => Ok(Interaction::Stop),
        _ => Ok(Interaction::Continue),
    }
}

// ============================================================================
// notify
// ============================================================================

/// Where `notify` relays messages to.
pub struct Owners {
    platform: BoxedPlatform,
    channel: ChannelId,
}

impl Owners {
    pub fn new(platform: BoxedPlatform, channel: impl Into<ChannelId>) -> Self {
        Self {
            platform,
            channel: channel.into(),
        }
    }

    async fn notify(&self, ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
        let text = matched.arg_str(0).unwrap_or_default();
        let origin = ctx
            .guild
            .as_ref()
            .map_or_else(|| "a direct message".to_string(), ToString::to_string);
        let note = format!("{} from {origin}: {text}", ctx.author);
        self.platform
            .send(&self.channel, &note, &SendOptions::default())
            .await
            .map_err(CommandError::internal)?;
        Ok(Response::new("Notified the owners with your message!"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil::core::testing::{PlatformCall, RecordingPlatform};
    use anvil::core::{IncomingMessage, Invocation};

    fn commands(platform: Arc<RecordingPlatform>, semester: &str) -> CommandRegistry {
        registry(CourseBook::new(2026, semester), Owners::new(platform, "owners")).unwrap()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(commands(RecordingPlatform::new(), "Fall"))
    }

    async fn run(dispatcher: &Dispatcher, text: &str) -> Response {
        let invocation = Invocation::new("student", MessageRef::new("console", "in-1"), text);
        dispatcher.dispatch(&invocation).await.unwrap()
    }

    #[tokio::test]
    async fn test_mycommand_variants() {
        let dispatcher = dispatcher();

        let first = run(&dispatcher, "mycommand myoption").await;
        assert_eq!(first.content, "You called the first subcommand!");

        let flags = run(&dispatcher, "mycommand attached \"two words\" custom").await;
        assert_eq!(
            flags.content,
            "You included the \"custom\" flag!\nThe attached parameter: two words\n"
        );

        let trailing = run(&dispatcher, "mycommand trailing a b c").await;
        assert_eq!(trailing.content, "The list of trailing arguments: [\"a\", \"b\", \"c\"]");

        let grouped = run(&dispatcher, "mycommand grouped keep  this").await;
        assert_eq!(grouped.mode.name(), "permanent");
        assert!(grouped.content.ends_with("keep  this"));

        let marquee = run(&dispatcher, "mycommand marquee hello").await;
        assert_eq!(marquee.mode.name(), "active");
    }

    #[tokio::test]
    async fn test_myothercommand_variant_order() {
        let dispatcher = dispatcher();
        let secret = run(&dispatcher, "myothercommand keyword secret").await;
        assert!(secret.content.starts_with("You found the secret variant!"));
        assert_eq!(secret.mode.name(), "expire");

        let keyword = run(&dispatcher, "myothercommand SECRET").await;
        assert!(keyword.content.contains("was in the list of keywords"));

        let other = run(&dispatcher, "myothercommand secret keyword please").await;
        assert!(other.content.starts_with("This is your input: secret keyword please\n"));
        assert!(other.content.ends_with("self destruct in 15 seconds."));
    }

    #[tokio::test]
    async fn test_notify_relays_to_owners() {
        let platform = RecordingPlatform::new();
        let dispatcher = Dispatcher::new(commands(platform.clone(), "fall"));
        let invocation = Invocation::new("student", MessageRef::new("console", "in-1"), "notify the  bot is down")
            .with_guild("siebel");

        let response = dispatcher.dispatch(&invocation).await.unwrap();
        assert_eq!(response.content, "Notified the owners with your message!");
        assert_eq!(platform.sent(), vec!["student from siebel: the  bot is down"]);
        assert!(matches!(
            &platform.calls()[0],
            PlatformCall::Send { message, .. } if message.channel == ChannelId::new("owners")
        ));
    }

    #[tokio::test]
    async fn test_notify_failure_is_internal() {
        let platform = RecordingPlatform::new();
        platform.fail_next_send(PlatformError::NotConnected);
        let dispatcher = Dispatcher::new(commands(platform.clone(), "fall"));

        let response = run(&dispatcher, "notify hello").await;
        assert_eq!(response.content, anvil::framework::INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_crn_watch_and_shortcut() {
        let dispatcher = dispatcher();

        let watched = run(&dispatcher, "crn watch cs 225 12345").await;
        assert_eq!(
            watched.content,
            "Watching CS 225 (CRN 12345). You will be notified if it opens up."
        );

        let again = run(&dispatcher, "watch cs 225 12345").await;
        assert_eq!(again.content, "You are already watching CRN 12345.");

        let invalid = run(&dispatcher, "crn watch cs 225 12").await;
        assert_eq!(invalid.content, "A CRN is a five digit number.");

        let pending = run(&dispatcher, "crn pending").await;
        assert_eq!(pending.content, "CS 225 (CRN 12345)");
        assert_eq!(pending.mode.name(), "interactive");
    }

    #[tokio::test]
    async fn test_crn_course_url() {
        let response = run(&dispatcher(), "crn course math 241").await;
        assert_eq!(
            response.content,
            "MATH 241: http://courses.illinois.edu/cisapp/explorer/schedule/2026/fall/MATH/241.xml?mode=detail"
        );
    }

    fn runtime(platform: Arc<RecordingPlatform>) -> AnvilRuntime {
        AnvilRuntime::builder()
            .config(AnvilConfig::default())
            .init_logging(false)
            .platform(platform.clone())
            .commands(commands(platform, "fall"))
            .build()
            .unwrap()
    }

    fn said(id: &str, content: &str) -> PlatformEvent {
        PlatformEvent::Message(IncomingMessage {
            message: MessageRef::new("console", id),
            author: UserId::new("student"),
            guild: None,
            content: content.to_string(),
            attachments: Vec::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_quotes_the_reply() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        let delivered = runtime.handle_event(said("in-1", "!wait")).await.unwrap().unwrap();
        runtime.handle_event(said("in-2", "hi there")).await.unwrap();
        delivered.follow_up.unwrap().join().await;

        assert_eq!(
            platform.edits_of(&delivered.message),
            vec!["You replied with \"hi there\"".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        let delivered = runtime.handle_event(said("in-1", "!wait")).await.unwrap().unwrap();
        delivered.follow_up.unwrap().join().await;

        assert_eq!(
            platform.edits_of(&delivered.message),
            vec!["You took too long to respond...".to_string()]
        );
    }

    #[test]
    fn test_marquee_frames() {
        let frames = marquee_frames("hi");
        assert_eq!(frames.len(), MARQUEE_PASSES * 22);
        assert_eq!(frames[0], format!("`|{}|`", " ".repeat(20)));
        assert_eq!(frames[19],format!("`|{}hi{}|`", " ", " ".repeat(17)));
    }
}
