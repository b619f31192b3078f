//! The command registry.
//!
//! Built once at startup: every command is a [`Blueprint`] bound to a
//! [`CommandHandler`], optionally with [`Shortcut`]s. Command and shortcut
//! names share one case-insensitive namespace.
//!
//! A shortcut is a textual rewrite applied before matching. Its own small
//! argument list is matched against the words after the shortcut name, and
//! the captures fill the `{placeholder}`s of its template. The filled template
//! becomes the argument text of the target command:
//!
//! ```rust,ignore
//! // "!pending" runs "crn pending"; "!watch 12345" runs "crn watch 12345"
//! registry.register_with_shortcuts(
//!     crn_blueprint,
//!     crn_handler,
//!     vec![
//!         Shortcut::new("pending", "pending"),
//!         Shortcut::new("watch", "watch {crn}").arg(Arg::single("crn")),
//!     ],
//! )?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anvil_core::{
    Arg, Blueprint, Capture, MatchFailure, TokenStream, Variant, match_tokens, tokenize,
};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::handler::CommandHandler;

// =============================================================================
// Shortcuts
// =============================================================================

/// A named rewrite into a full invocation of its command.
#[derive(Debug, Clone)]
pub struct Shortcut {
    name: String,
    template: String,
    args: Vec<Arg>,
}

impl Shortcut {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            args: Vec::new(),
        }
    }

    /// Declares the next argument of the shortcut.
    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

/// A shortcut validated against its command.
struct CompiledShortcut {
    template: String,
    blueprint: Blueprint,
}

impl CompiledShortcut {
    fn compile(shortcut: Shortcut) -> RegistryResult<Self> {
        let variant = shortcut
            .args
            .iter()
            .cloned()
            .fold(Variant::new(), Variant::arg);
        let blueprint = Blueprint::new(&shortcut.name, vec![variant])?;

        for placeholder in placeholders(&shortcut.template) {
            if !shortcut.args.iter().any(|arg| arg.name() == placeholder) {
                return Err(RegistryError::UnknownPlaceholder {
                    shortcut: shortcut.name,
                    placeholder: placeholder.to_string(),
                });
            }
        }

        Ok(Self {
            template: shortcut.template,
            blueprint,
        })
    }

    /// Fills the template from `tokens`, or explains why they do not fit.
    fn expand(&self, tokens: &TokenStream) -> Result<String, MatchFailure> {
        let matched = match_tokens(&self.blueprint, tokens)?;
        let args = self.blueprint.variants()[0].args();
        let values: HashMap<&str, String> = args
            .iter()
            .zip(&matched.positional)
            .map(|(arg, capture)| (arg.name(), render(capture)))
            .collect();
        Ok(fill(&self.template, &values))
    }
}

/// Names between `{` and `}` in `template`, in order.
fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        names.push(&rest[open + 1..open + close]);
        rest = &rest[open + close + 1..];
    }
    names
}

fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        if let Some(value) = values.get(name) {
            out.push_str(value);
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Renders a capture back into invocation text that tokenizes to the same
/// words.
fn render(capture: &Capture) -> String {
    match capture {
        Capture::Absent => String::new(),
        Capture::Single(word) => quote(word),
        Capture::List(words) => words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" "),
        // Merged captures keep their raw text, quotes included.
        Capture::Merged(text) => text.clone(),
    }
}

fn quote(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

// =============================================================================
// Registry
// =============================================================================

/// A registered command.
pub struct CommandEntry {
    blueprint: Blueprint,
    handler: Arc<dyn CommandHandler>,
    shortcuts: Vec<String>,
}

impl CommandEntry {
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    /// Names of the shortcuts that expand into this command.
    pub fn shortcuts(&self) -> &[String] {
        &self.shortcuts
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.blueprint.name())
            .field("shortcuts", &self.shortcuts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Command(usize),
    Shortcut { command: usize, shortcut: usize },
}

/// A command resolved from invocation text.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub entry: &'a CommandEntry,
    /// The shortcut that was expanded, if any.
    pub shortcut: Option<&'a str>,
    /// The invocation text after expansion, command name included.
    pub content: String,
    /// The tokens after the command name.
    pub arguments: TokenStream,
}

/// Commands and shortcuts by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<CommandEntry>,
    shortcuts: Vec<CompiledShortcut>,
    index: HashMap<String, Target>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        blueprint: Blueprint,
        handler: impl CommandHandler,
    ) -> RegistryResult<()> {
        self.register_with_shortcuts(blueprint, handler, Vec::new())
    }

    /// Registers a command together with shortcuts that expand into it.
    ///
    /// Nothing is registered if any name is taken or any shortcut is invalid.
    pub fn register_with_shortcuts(
        &mut self,
        blueprint: Blueprint,
        handler: impl CommandHandler,
        shortcuts: Vec<Shortcut>,
    ) -> RegistryResult<()> {
        let name = blueprint.name().to_string();
        let mut names = vec![name.clone()];
        let mut compiled = Vec::with_capacity(shortcuts.len());
        for shortcut in shortcuts {
            let shortcut_name = shortcut.name.to_lowercase();
            if names.contains(&shortcut_name) {
                return Err(RegistryError::DuplicateName(shortcut_name));
            }
            names.push(shortcut_name);
            compiled.push(CompiledShortcut::compile(shortcut)?);
        }
        if let Some(taken) = names.iter().find(|n| self.index.contains_key(n.as_str())) {
            return Err(RegistryError::DuplicateName(taken.clone()));
        }

        let command = self.commands.len();
        self.index.insert(name.clone(), Target::Command(command));
        for (shortcut_name, shortcut) in names[1..].iter().zip(compiled) {
            self.index.insert(
                shortcut_name.clone(),
                Target::Shortcut {
                    command,
                    shortcut: self.shortcuts.len(),
                },
            );
            self.shortcuts.push(shortcut);
        }

        debug!(command = %name, shortcuts = names.len() - 1, "Registered command");
        self.commands.push(CommandEntry {
            blueprint,
            handler: Arc::new(handler),
            shortcuts: names[1..].to_vec(),
        });
        Ok(())
    }

    /// Looks up a command by name. Shortcut names do not resolve here.
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        match self.index.get(&name.to_lowercase()) {
            Some(Target::Command(index)) => self.commands.get(*index),
            _ => None,
        }
    }

    /// Whether `name` is a registered command or shortcut.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Registered commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandEntry> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Resolves the leading word of `text` to a command, expanding shortcuts.
    ///
    /// Returns `None` if the word names nothing. A shortcut whose own
    /// arguments do not fit yields the failure.
    pub fn resolve(&self, text: &str) -> Option<Result<Resolved<'_>, MatchFailure>> {
        let tokens = tokenize(text);
        let head = tokens.get(0)?.to_lowercase();
        match *self.index.get(&head)? {
            Target::Command(index) => {
                let entry = &self.commands[index];
                let rest = tokens.raw_from(1);
                let content = if rest.is_empty() {
                    entry.blueprint.name().to_string()
                } else {
                    format!("{} {}", entry.blueprint.name(), rest)
                };
                Some(Ok(Resolved {
                    entry,
                    shortcut: None,
                    content,
                    arguments: tokens.skip(1),
                }))
            }
            Target::Shortcut { command, shortcut } => {
                let entry = &self.commands[command];
                let expanded = match self.shortcuts[shortcut].expand(&tokens.skip(1)) {
                    Ok(expanded) => expanded,
                    Err(failure) => return Some(Err(failure)),
                };
                let shortcut_name = entry
                    .shortcuts
                    .iter()
                    .find(|n| **n == head)
                    .map(String::as_str);
                debug!(shortcut = %head, expanded = %expanded, "Expanded shortcut");
                let content = format!("{} {}", entry.blueprint.name(), expanded);
                Some(Ok(Resolved {
                    entry,
                    shortcut: shortcut_name,
                    content: content.trim_end().to_string(),
                    arguments: tokenize(&expanded),
                }))
            }
        }
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}
