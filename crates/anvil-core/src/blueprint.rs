//! Command blueprints.
//!
//! A [`Blueprint`] is the immutable description of every syntax a command
//! accepts. It is an ordered list of [`Variant`]s; each variant is an ordered
//! list of [`Opt`]ions followed by an ordered list of [`Arg`]uments and an
//! optional [`Attachment`] requirement.
//!
//! Variants are tried in declaration order and the first one that accepts the
//! input wins. A more general variant declared earlier shadows any later
//! variant it covers; ordering them is the command author's job.
//!
//! ```rust,ignore
//! use anvil_core::{Arg, Blueprint, Opt, Variant};
//!
//! let blueprint = Blueprint::builder("mycommand")
//!     .description("Demonstrates the blueprint grammar.")
//!     .variant(Variant::new().opt(Opt::new("myoption")).doc("A bare option."))
//!     .variant(
//!         Variant::new()
//!             .opt(Opt::new("custom").optional())
//!             .opt(Opt::new("attached").attached("attached value").optional()),
//!     )
//!     .variant(Variant::new().arg(Arg::split("trailing").additional("more")))
//!     .build()?;
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{BlueprintError, BlueprintResult};
use crate::matcher::Capture;

// =============================================================================
// Options
// =============================================================================

/// A named flag. Bare, or followed by exactly one attached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opt {
    name: String,
    attached: Option<String>,
    optional: bool,
}

impl Opt {
    /// A required bare option.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attached: None,
            optional: false,
        }
    }

    /// Requires one value after the option name; `label` is shown in usage.
    pub fn attached(mut self, label: impl Into<String>) -> Self {
        self.attached = Some(label.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attached_label(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    pub fn takes_value(&self) -> bool {
        self.attached.is_some()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    fn usage(&self) -> String {
        let body = match &self.attached {
            Some(label) => format!("{} <{}>", self.name, label),
            None => self.name.clone(),
        };
        if self.optional {
            format!("({body})")
        } else {
            body
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// A predicate over a captured argument value.
///
/// Returning `Err(message)` ends matching for the whole invocation with that
/// message; later variants are not tried.
pub trait ArgCheck: Send + Sync + 'static {
    fn check(&self, value: &Capture) -> Result<(), String>;
}

impl<F> ArgCheck for F
where
    F: Fn(&Capture) -> Result<(), String> + Send + Sync + 'static,
{
    fn check(&self, value: &Capture) -> Result<(), String> {
        self(value)
    }
}

/// A boolean predicate paired with a fixed failure message.
struct Predicate<P> {
    predicate: P,
    message: String,
}

impl<P> ArgCheck for Predicate<P>
where
    P: Fn(&Capture) -> bool + Send + Sync + 'static,
{
    fn check(&self, value: &Capture) -> Result<(), String> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(self.message.clone())
        }
    }
}

/// How an argument captures tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// Exactly one token.
    Single,
    /// Every remaining token as a list.
    Split {
        /// Minimum number of tokens when the argument is required.
        min: usize,
        /// Usage label for the tokens after the first.
        additional: Option<String>,
    },
    /// Every remaining token as one string, original spacing intact.
    Merged,
}

impl ArgKind {
    /// Split and merged arguments consume the rest of the input.
    pub fn is_trailing(&self) -> bool {
        !matches!(self, Self::Single)
    }
}

/// A positional capture.
#[derive(Clone)]
pub struct Arg {
    name: String,
    kind: ArgKind,
    optional: bool,
    check: Option<Arc<dyn ArgCheck>>,
}

impl Arg {
    fn with_kind(name: impl Into<String>, kind: ArgKind, optional: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            optional,
            check: None,
        }
    }

    /// A required single-token argument.
    pub fn single(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Single, false)
    }

    /// A required list of one or more trailing tokens.
    pub fn split(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ArgKind::Split {
                min: 1,
                additional: None,
            },
            false,
        )
    }

    /// A list of zero or more trailing tokens.
    pub fn split_optional(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ArgKind::Split {
                min: 0,
                additional: None,
            },
            true,
        )
    }

    /// All trailing tokens as one non-empty string.
    pub fn merged(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Merged, false)
    }

    /// All trailing tokens as one string, possibly empty.
    pub fn merged_optional(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Merged, true)
    }

    /// Marks the argument optional.
    ///
    /// An absent optional single argument captures [`Capture::Absent`].
    pub fn optional(mut self) -> Self {
        self.optional = true;
        if let ArgKind::Split { min, .. } = &mut self.kind {
            *min = 0;
        }
        self
    }

    /// Sets the minimum token count of a required split argument.
    ///
    /// Has no effect on other kinds.
    pub fn min(mut self, count: usize) -> Self {
        if let ArgKind::Split { min, .. } = &mut self.kind
            && !self.optional
        {
            *min = count.max(1);
        }
        self
    }

    /// Names the tokens after the first of a split argument in usage output.
    pub fn additional(mut self, label: impl Into<String>) -> Self {
        if let ArgKind::Split { additional, .. } = &mut self.kind {
            *additional = Some(label.into());
        }
        self
    }

    /// Attaches a check evaluated against the captured value.
    pub fn check(mut self, check: impl ArgCheck) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    /// Attaches a boolean check that fails with `message`.
    pub fn validate<P>(self, predicate: P, message: impl Into<String>) -> Self
    where
        P: Fn(&Capture) -> bool + Send + Sync + 'static,
    {
        self.check(Predicate {
            predicate,
            message: message.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ArgKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn run_check(&self, value: &Capture) -> Result<(), String> {
        match &self.check {
            Some(check) => check.check(value),
            None => Ok(()),
        }
    }

    fn usage(&self) -> String {
        let wrap = |s: &str| {
            if self.optional {
                format!("[{s}]")
            } else {
                format!("<{s}>")
            }
        };
        match &self.kind {
            ArgKind::Single | ArgKind::Merged => wrap(&self.name),
            ArgKind::Split {
                additional: Some(more),
                ..
            } => format!("{} [{}] ...", wrap(&self.name), more),
            ArgKind::Split { .. } => format!("{} ...", wrap(&self.name)),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arg")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("has_check", &self.check.is_some())
            .finish()
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// A file attachment requirement on the invoking message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    optional: bool,
}

impl Attachment {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

// =============================================================================
// Variants
// =============================================================================

/// One concrete syntax of a command.
#[derive(Debug, Clone, Default)]
pub struct Variant {
    options: Vec<Opt>,
    args: Vec<Arg>,
    attachment: Option<Attachment>,
    doc: Option<String>,
}

impl Variant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opt(mut self, opt: Opt) -> Self {
        self.options.push(opt);
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// One-line description shown in help output.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn options(&self) -> &[Opt] {
        &self.options
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn attachment_requirement(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn get_doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Renders the usage line for this variant under `command`.
    pub fn usage(&self, command: &str) -> String {
        let mut parts = vec![command.to_string()];
        parts.extend(self.options.iter().map(Opt::usage));
        parts.extend(self.args.iter().map(Arg::usage));
        if let Some(attachment) = &self.attachment {
            if attachment.optional {
                parts.push(format!("[attachment: {}]", attachment.name));
            } else {
                parts.push(format!("<attachment: {}>", attachment.name));
            }
        }
        parts.join(" ")
    }

    fn validate(&mut self, index: usize) -> BlueprintResult<()> {
        let mut seen = HashSet::new();
        for opt in &mut self.options {
            if opt.name.is_empty() || opt.name.chars().any(char::is_whitespace) {
                return Err(BlueprintError::InvalidOption {
                    variant: index,
                    option: opt.name.clone(),
                });
            }
            opt.name = opt.name.to_lowercase();
            if !seen.insert(opt.name.clone()) {
                return Err(BlueprintError::DuplicateOption {
                    variant: index,
                    option: opt.name.clone(),
                });
            }
        }

        let last = self.args.len().saturating_sub(1);
        for (position, arg) in self.args.iter().enumerate() {
            if arg.kind.is_trailing() && position != last {
                return Err(BlueprintError::TrailingNotLast {
                    variant: index,
                    argument: arg.name.clone(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Blueprint
// =============================================================================

/// Every syntax a command accepts, in match order.
#[derive(Debug, Clone)]
pub struct Blueprint {
    name: String,
    description: String,
    variants: Vec<Variant>,
    keywords: BTreeSet<String>,
    hidden: bool,
    min_privilege: u8,
}

impl Blueprint {
    pub fn builder(name: impl Into<String>) -> BlueprintBuilder {
        BlueprintBuilder {
            name: name.into(),
            description: String::new(),
            variants: Vec::new(),
            hidden: false,
            min_privilege: 0,
        }
    }

    /// Shorthand for a blueprint with no metadata.
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> BlueprintResult<Self> {
        variants
            .into_iter()
            .fold(Self::builder(name), BlueprintBuilder::variant)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Every option name declared by any variant.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    /// Hidden commands are left out of help listings.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Minimum privilege level an access policy should require.
    pub fn min_privilege(&self) -> u8 {
        self.min_privilege
    }

    /// One usage line per variant, in declaration order.
    pub fn usage(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.usage(&self.name)).collect()
    }
}

/// Builder for [`Blueprint`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct BlueprintBuilder {
    name: String,
    description: String,
    variants: Vec<Variant>,
    hidden: bool,
    min_privilege: u8,
}

impl BlueprintBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn min_privilege(mut self, level: u8) -> Self {
        self.min_privilege = level;
        self
    }

    /// Validates every variant and freezes the blueprint.
    pub fn build(mut self) -> BlueprintResult<Blueprint> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(BlueprintError::InvalidName(self.name));
        }
        for (index, variant) in self.variants.iter_mut().enumerate() {
            variant.validate(index)?;
        }
        let keywords = self
            .variants
            .iter()
            .flat_map(|v| v.options.iter().map(|o| o.name.clone()))
            .collect();

        Ok(Blueprint {
            name: self.name.to_lowercase(),
            description: self.description,
            variants: self.variants,
            keywords,
            hidden: self.hidden,
            min_privilege: self.min_privilege,
        })
    }
}
