//! Shell-like tokenization of invocation text.
//!
//! Tokens remember their byte span in the source text so that a merged
//! capture can be rebuilt from the raw input with its original whitespace.

/// A single token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The unquoted token text.
    pub text: String,
    /// Byte offset of the first character (including an opening quote).
    pub start: usize,
    /// Byte offset one past the last character (including a closing quote).
    pub end: usize,
}

/// Tokens together with the text they were split from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    source: String,
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Builds a stream from pre-split words, joined by single spaces.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = String::new();
        let mut tokens = Vec::new();
        for word in words {
            if !source.is_empty() {
                source.push(' ');
            }
            let start = source.len();
            source.push_str(word.as_ref());
            tokens.push(Token {
                text: word.as_ref().to_string(),
                start,
                end: source.len(),
            });
        }
        Self { source, tokens }
    }

    /// The text the tokens were split from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|t| t.text.as_str())
    }

    /// Returns the unquoted token texts.
    pub fn words(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    /// Raw source text covering tokens `index..`, quotes and spacing intact.
    ///
    /// Returns an empty string when `index` is past the last token.
    pub fn raw_from(&self, index: usize) -> &str {
        match (self.tokens.get(index), self.tokens.last()) {
            (Some(first), Some(last)) => &self.source[first.start..last.end],
            _ => "",
        }
    }

    /// Drops the first `count` tokens, rebasing the source on what remains.
    pub fn skip(&self, count: usize) -> TokenStream {
        let Some(first) = self.tokens.get(count) else {
            return TokenStream::default();
        };
        let offset = first.start;
        let tokens = self.tokens[count..]
            .iter()
            .map(|t| Token {
                text: t.text.clone(),
                start: t.start - offset,
                end: t.end - offset,
            })
            .collect();
        TokenStream {
            source: self.source[offset..].to_string(),
            tokens,
        }
    }
}

/// Splits `input` into tokens.
///
/// Handles:
/// - Whitespace-separated words
/// - Single and double quoted strings (an empty pair yields an empty token)
/// - Backslash escapes inside double quotes
///
/// An unterminated quote extends to the end of the input.
pub fn tokenize(input: &str) -> TokenStream {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start: Option<usize> = None;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for (idx, ch) in input.char_indices() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                start.get_or_insert(idx);
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                start.get_or_insert(idx);
                in_double_quote = !in_double_quote;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if let Some(token_start) = start.take() {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        start: token_start,
                        end: idx,
                    });
                }
            }
            _ => {
                start.get_or_insert(idx);
                current.push(ch);
            }
        }
    }

    if let Some(token_start) = start {
        tokens.push(Token {
            text: current,
            start: token_start,
            end: input.len(),
        });
    }

    TokenStream {
        source: input.to_string(),
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_simple() {
        let stream = tokenize("mycommand hello world");
        assert_eq!(stream.words(), vec!["mycommand", "hello", "world"]);
    }

    #[test]
    fn test_tokenize_quoted() {
        let stream = tokenize(r#"say "hello world" test"#);
        assert_eq!(stream.words(), vec!["say", "hello world", "test"]);
    }

    #[test]
    fn test_tokenize_mixed_quotes() {
        let stream = tokenize(r#"cmd "double's quote" 'single"s quote'"#);
        assert_eq!(
            stream.words(),
            vec!["cmd", "double's quote", r#"single"s quote"#]
        );
    }

    #[test]
    fn test_tokenize_escape_in_double_quotes() {
        let stream = tokenize(r#"cmd "a \"b\" c""#);
        assert_eq!(stream.words(), vec!["cmd", r#"a "b" c"#]);
    }

    #[test]
    fn test_tokenize_empty_quotes_yield_token() {
        let stream = tokenize(r#"cmd "" x"#);
        assert_eq!(stream.words(), vec!["cmd", "", "x"]);
    }

    #[test]
    fn test_tokenize_whitespace_only() {
        assert!(tokenize("   \t \n ").is_empty());
    }

    #[test]
    fn test_raw_from_keeps_spacing() {
        let stream = tokenize("grouped  some   text \"quoted\" ");
        assert_eq!(stream.raw_from(1), "some   text \"quoted\"");
        assert_eq!(stream.raw_from(9), "");
    }

    #[test]
    fn test_skip_rebases_spans() {
        let stream = tokenize("cmd  one   two").skip(1);
        assert_eq!(stream.source(), "one   two");
        assert_eq!(stream.words(), vec!["one", "two"]);
        assert_eq!(stream.raw_from(0), "one   two");
        assert!(tokenize("cmd").skip(1).is_empty());
    }

    #[test]
    fn test_from_words() {
        let stream = TokenStream::from_words(["attached", "hello"]);
        assert_eq!(stream.source(), "attached hello");
        assert_eq!(stream.raw_from(1), "hello");
    }
}
