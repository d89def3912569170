//! Utterance template tokenizer
//!
//! Templates such as `book a table for {count} people` are split once, at
//! load time, into alternating literal and slot tokens.

use crate::text::{normalize, normalize_literal};

/// One piece of an utterance template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, lowercased with whitespace runs collapsed
    Literal(String),
    /// `{name}` placeholder
    Slot(String),
}

/// A parsed utterance template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    normalized: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Tokenize a template string
    ///
    /// An opening brace without a closing one is kept as literal text.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            push_literal(&mut tokens, &rest[..open]);
            tokens.push(Token::Slot(rest[open + 1..close].trim().to_string()));
            rest = &rest[close + 1..];
        }
        push_literal(&mut tokens, rest);

        Self {
            source: source.to_string(),
            normalized: normalize(source),
            tokens,
        }
    }

    /// The template as written in the manifest
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The whole template, normalized, for exact comparison
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Literal/slot tokens in order
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether the template contains any placeholder
    #[must_use]
    pub fn has_slots(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, Token::Slot(_)))
    }

    /// Placeholder names in order of appearance
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Slot(name) => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }
}

fn push_literal(tokens: &mut Vec<Token>, text: &str) {
    let literal = normalize_literal(text);
    if !literal.trim().is_empty() {
        tokens.push(Token::Literal(literal));
    }
}
