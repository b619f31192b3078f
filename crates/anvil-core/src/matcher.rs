//! Matching input tokens against a [`Blueprint`].
//!
//! For each variant in declaration order:
//!
//! 1. Leading tokens are consumed as options, in any order. An attached
//!    option also consumes the token after it. A required option that never
//!    appears rejects the variant.
//! 2. The remaining tokens are consumed by the arguments in order. Split and
//!    merged arguments take everything left.
//! 3. Leftover tokens reject the variant.
//!
//! The first variant that survives has its argument checks run. A failing
//! check ends matching with [`MatchFailure::Validation`]; it does not fall
//! through to later variants.
//!
//! Matching is a pure function of the blueprint, the tokens and the
//! attachment count.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use tracing::trace;

use crate::blueprint::{ArgKind, Blueprint, Variant};
use crate::error::MatchFailure;
use crate::token::TokenStream;

/// The value captured by one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// An optional single argument with no token to take.
    Absent,
    Single(String),
    List(Vec<String>),
    Merged(String),
}

impl Capture {
    /// The text of a single or merged capture.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(s) | Self::Merged(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Parses a single or merged capture.
    pub fn parse<T: FromStr>(&self) -> Option<T> {
        self.as_str().and_then(|s| s.parse().ok())
    }
}

/// An option present in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// A bare option.
    Present,
    /// An option with its attached value.
    Attached(String),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Present => None,
            Self::Attached(value) => Some(value),
        }
    }
}

/// The structured result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the matching variant in declaration order.
    pub variant_index: usize,
    /// Options that appeared, keyed by declared name.
    pub options: BTreeMap<String, OptionValue>,
    /// One capture per declared argument, in order.
    pub positional: Vec<Capture>,
    /// Every option keyword of the blueprint.
    pub raw_keywords: BTreeSet<String>,
}

impl MatchResult {
    pub fn has_option(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    /// The value attached to `name`, if it appeared with one.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(OptionValue::as_str)
    }

    pub fn arg(&self, index: usize) -> Option<&Capture> {
        self.positional.get(index)
    }

    /// The text of argument `index` if it is a single or merged capture.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.arg(index).and_then(Capture::as_str)
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.raw_keywords.contains(&word.to_lowercase())
    }
}

/// Matches `tokens` against `blueprint`, assuming no attachments.
pub fn match_tokens(blueprint: &Blueprint, tokens: &TokenStream) -> Result<MatchResult, MatchFailure> {
    match_with_attachments(blueprint, tokens, 0)
}

/// Matches `tokens` against `blueprint` for a message carrying `attachments`
/// attachments.
pub fn match_with_attachments(
    blueprint: &Blueprint,
    tokens: &TokenStream,
    attachments: usize,
) -> Result<MatchResult, MatchFailure> {
    if blueprint.variants().is_empty() {
        return Err(MatchFailure::NoVariants {
            command: blueprint.name().to_string(),
        });
    }

    for (index, variant) in blueprint.variants().iter().enumerate() {
        let Some((options, positional)) = try_variant(variant, tokens, attachments) else {
            trace!(command = blueprint.name(), variant = index, "Variant rejected");
            continue;
        };

        for (arg, capture) in variant.args().iter().zip(&positional) {
            if let Err(message) = arg.run_check(capture) {
                return Err(MatchFailure::Validation {
                    argument: arg.name().to_string(),
                    message,
                });
            }
        }

        return Ok(MatchResult {
            variant_index: index,
            options,
            positional,
            raw_keywords: blueprint.keywords().clone(),
        });
    }

    Err(MatchFailure::SyntaxMismatch {
        command: blueprint.name().to_string(),
        usage: blueprint.usage(),
    })
}

fn try_variant(
    variant: &Variant,
    tokens: &TokenStream,
    attachments: usize,
) -> Option<(BTreeMap<String, OptionValue>, Vec<Capture>)> {
    if let Some(required) = variant.attachment_requirement()
        && !required.is_optional()
        && attachments == 0
    {
        return None;
    }

    let words = tokens.tokens();
    let mut cursor = 0;
    let mut options = BTreeMap::new();

    while let Some(token) = words.get(cursor) {
        let lowered = token.text.to_lowercase();
        let Some(opt) = variant
            .options()
            .iter()
            .find(|o| o.name() == lowered && !options.contains_key(o.name()))
        else {
            break;
        };

        if opt.takes_value() {
            let value = words.get(cursor + 1)?;
            options.insert(
                opt.name().to_string(),
                OptionValue::Attached(value.text.clone()),
            );
            cursor += 2;
        } else {
            options.insert(opt.name().to_string(), OptionValue::Present);
            cursor += 1;
        }
    }

    if variant
        .options()
        .iter()
        .any(|o| !o.is_optional() && !options.contains_key(o.name()))
    {
        return None;
    }

    let mut positional = Vec::with_capacity(variant.args().len());
    for arg in variant.args() {
        match arg.kind() {
            ArgKind::Single => match words.get(cursor) {
                Some(token) => {
                    positional.push(Capture::Single(token.text.clone()));
                    cursor += 1;
                }
                None if arg.is_optional() => positional.push(Capture::Absent),
                None => return None,
            },
            ArgKind::Split { min, .. } => {
                let rest: Vec<String> = words[cursor..].iter().map(|t| t.text.clone()).collect();
                let required = if arg.is_optional() { 0 } else { *min };
                if rest.len() < required {
                    return None;
                }
                cursor = words.len();
                positional.push(Capture::List(rest));
            }
            ArgKind::Merged => {
                let raw = tokens.raw_from(cursor);
                if raw.is_empty() && !arg.is_optional() {
                    return None;
                }
                cursor = words.len();
                positional.push(Capture::Merged(raw.to_string()));
            }
        }
    }

    if cursor < words.len() {
        return None;
    }

    Some((options, positional))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Arg, Attachment, Opt};
    use crate::token::tokenize;

    fn words(input: &[&str]) -> TokenStream {
        TokenStream::from_words(input)
    }

    fn demo_blueprint() -> Blueprint {
        Blueprint::builder("mycommand")
            .variant(Variant::new().opt(Opt::new("myoption")))
            .variant(
                Variant::new()
                    .opt(Opt::new("custom").optional())
                    .opt(Opt::new("attached").attached("attached value").optional()),
            )
            .variant(Variant::new().opt(Opt::new("trailing")).arg(Arg::split("args").additional("more")))
            .variant(Variant::new().opt(Opt::new("grouped")).arg(Arg::merged("text")))
            .variant(
                Variant::new()
                    .opt(Opt::new("complex").attached("x"))
                    .opt(Opt::new("other").attached("y").optional())
                    .arg(Arg::single("a1"))
                    .arg(Arg::split_optional("a2")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_attached_option_scenario() {
        let result = match_tokens(&demo_blueprint(), &words(&["attached", "hello"])).unwrap();
        assert_eq!(result.variant_index, 1);
        assert_eq!(result.options.len(), 1);
        assert_eq!(result.option("attached"), Some("hello"));
        assert!(result.positional.is_empty());
    }

    #[test]
    fn test_complex_scenario() {
        let result = match_tokens(
            &demo_blueprint(),
            &words(&["complex", "foo", "bar", "baz", "qux"]),
        )
        .unwrap();
        assert_eq!(result.variant_index, 4);
        assert_eq!(result.option("complex"), Some("foo"));
        assert_eq!(
            result.positional,
            vec![
                Capture::Single("bar".into()),
                Capture::List(vec!["baz".into(), "qux".into()]),
            ]
        );
    }

    #[test]
    fn test_options_in_any_order() {
        let blueprint = demo_blueprint();
        let a = match_tokens(&blueprint, &words(&["custom", "attached", "v"])).unwrap();
        let b = match_tokens(&blueprint, &words(&["attached", "v", "CUSTOM"])).unwrap();
        assert_eq!(a, b);
        assert!(a.has_option("custom"));
        let c = match_tokens(
            &blueprint,
            &words(&["other", "o", "complex", "c", "first"]),
        )
        .unwrap();
        assert_eq!(c.variant_index, 4);
        assert_eq!(c.option("other"), Some("o"));
        assert_eq!(c.positional[1], Capture::List(vec![]));
    }

    #[test]
    fn test_attached_option_missing_value_falls_through() {
        let err = match_tokens(&demo_blueprint(), &words(&["complex"])).unwrap_err();
        assert!(matches!(err, MatchFailure::SyntaxMismatch { .. }));
    }

    #[test]
    fn test_required_option_absent_is_mismatch() {
        let blueprint = Blueprint::new(
            "watch",
            vec![Variant::new().opt(Opt::new("watch")).arg(Arg::single("crn"))],
        )
        .unwrap();
        let err = match_tokens(&blueprint, &words(&["12345"])).unwrap_err();
        match err {
            MatchFailure::SyntaxMismatch { command, usage } => {
                assert_eq!(command, "watch");
                assert_eq!(usage, vec!["watch watch <crn>"]);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_required_single_absent_is_mismatch() {
        let blueprint = Blueprint::new(
            "course",
            vec![
                Variant::new()
                    .opt(Opt::new("course"))
                    .arg(Arg::single("department code"))
                    .arg(Arg::single("course number")),
            ],
        )
        .unwrap();
        assert!(match_tokens(&blueprint, &words(&["course", "CS"])).is_err());
        let ok = match_tokens(&blueprint, &words(&["course", "CS", "225"])).unwrap();
        assert_eq!(ok.arg_str(1), Some("225"));
        assert_eq!(ok.arg(1).and_then(Capture::parse::<u32>), Some(225));
    }

    #[test]
    fn test_optional_single_absent_captures_absent() {
        let blueprint = Blueprint::new(
            "opt",
            vec![Variant::new().arg(Arg::single("a")).arg(Arg::single("b").optional())],
        )
        .unwrap();
        let result = match_tokens(&blueprint, &words(&["x"])).unwrap();
        assert_eq!(result.positional, vec![Capture::Single("x".into()), Capture::Absent]);
    }

    #[test]
    fn test_leftover_tokens_reject_variant() {
        let blueprint = Blueprint::new(
            "one",
            vec![
                Variant::new().arg(Arg::single("only")),
                Variant::new().arg(Arg::split("many")),
            ],
        )
        .unwrap();
        let result = match_tokens(&blueprint, &words(&["a", "b"])).unwrap();
        assert_eq!(result.variant_index, 1);
    }

    #[test]
    fn test_split_minimum_count() {
        let blueprint = Blueprint::new("pair", vec![Variant::new().arg(Arg::split("items").min(2))]).unwrap();
        assert!(match_tokens(&blueprint, &words(&["one"])).is_err());
        assert!(match_tokens(&blueprint, &words(&["one", "two"])).is_ok());
    }

    #[test]
    fn test_split_required_needs_one_token() {
        let result = match_tokens(&demo_blueprint(), &words(&["trailing"]));
        assert!(result.is_err());
        let ok = match_tokens(&demo_blueprint(), &words(&["trailing", "a", "b"])).unwrap();
        assert_eq!(ok.variant_index, 2);
        assert_eq!(ok.arg(0).and_then(Capture::as_list).map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_merged_keeps_original_spacing() {
        let stream = tokenize("grouped  hello    big   world").skip(0);
        let result = match_tokens(&demo_blueprint(), &stream).unwrap();
        assert_eq!(result.variant_index, 3);
        assert_eq!(result.arg_str(0), Some("hello    big   world"));
    }

    #[test]
    fn test_merged_optional_accepts_nothing() {
        let blueprint = Blueprint::new(
            "myothercommand",
            vec![Variant::new().arg(Arg::merged_optional("text"))],
        )
        .unwrap();
        let result = match_tokens(&blueprint, &words(&[])).unwrap();
        assert_eq!(result.positional, vec![Capture::Merged(String::new())]);
        let required = Blueprint::new("m", vec![Variant::new().arg(Arg::merged("text"))]).unwrap();
        assert!(match_tokens(&required, &words(&[])).is_err());
    }

    #[test]
    fn test_check_failure_is_terminal() {
        let blueprint = Blueprint::new(
            "num",
            vec![
                Variant::new().arg(Arg::single("n").validate(
                    |c| c.parse::<u32>().is_some(),
                    "That is not a number.",
                )),
                Variant::new().arg(Arg::single("anything")),
            ],
        )
        .unwrap();
        let err = match_tokens(&blueprint, &words(&["abc"])).unwrap_err();
        assert_eq!(
            err,
            MatchFailure::Validation {
                argument: "n".into(),
                message: "That is not a number.".into()
            }
        );
        assert!(match_tokens(&blueprint, &words(&["7"])).is_ok());
    }

    #[test]
    fn test_check_closure_receives_capture() {
        let blueprint = Blueprint::new(
            "list",
            vec![Variant::new().arg(Arg::split("items").check(|c: &Capture| {
                match c.as_list() {
                    Some(items) if items.len() <= 2 => Ok(()),
                    _ => Err("Too many items.".to_string()),
                }
            }))],
        )
        .unwrap();
        assert!(match_tokens(&blueprint, &words(&["a", "b"])).is_ok());
        let err = match_tokens(&blueprint, &words(&["a", "b", "c"])).unwrap_err();
        assert_eq!(err.display_message(), "Too many items.");
    }

    #[test]
    fn test_zero_variants_fails_immediately() {
        let blueprint = Blueprint::new("empty", vec![]).unwrap();
        assert_eq!(
            match_tokens(&blueprint, &words(&[])).unwrap_err(),
            MatchFailure::NoVariants {
                command: "empty".into()
            }
        );
    }

    #[test]
    fn test_earlier_general_variant_shadows_later() {
        let blueprint = Blueprint::new(
            "shadow",
            vec![
                Variant::new().arg(Arg::split_optional("anything")),
                Variant::new().arg(Arg::single("unreachable")),
            ],
        )
        .unwrap();
        for input in [&[][..], &["one"][..], &["one", "two"][..]] {
            let result = match_tokens(&blueprint, &words(input)).unwrap();
            assert_eq!(result.variant_index, 0);
        }
    }

    #[test]
    fn test_matching_is_deterministic() {
        let blueprint = demo_blueprint();
        let stream = words(&["complex", "a", "b", "c"]);
        let first = match_tokens(&blueprint, &stream).unwrap();
        for _ in 0..10 {
            assert_eq!(match_tokens(&blueprint, &stream).unwrap(), first);
        }
    }

    #[test]
    fn test_required_attachment() {
        let blueprint = Blueprint::new(
            "upload",
            vec![Variant::new().arg(Arg::single("name")).attachment(Attachment::required("file"))],
        )
        .unwrap();
        assert!(match_with_attachments(&blueprint, &words(&["pic"]), 0).is_err());
        assert!(match_with_attachments(&blueprint, &words(&["pic"]), 1).is_ok());
    }

    #[test]
    fn test_repeated_option_token_becomes_argument() {
        let blueprint = Blueprint::new(
            "rep",
            vec![Variant::new().opt(Opt::new("flag")).arg(Arg::single("value"))],
        )
        .unwrap();
        let result = match_tokens(&blueprint, &words(&["flag", "flag"])).unwrap();
        assert_eq!(result.arg_str(0), Some("flag"));
    }

    #[test]
    fn test_keywords_exposed_on_result() {
        let result = match_tokens(&demo_blueprint(), &words(&["myoption"])).unwrap();
        assert!(result.is_keyword("Complex"));
        assert!(!result.is_keyword("hello"));
    }
}
