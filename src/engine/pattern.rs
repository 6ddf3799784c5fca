//! Trigger pattern compilation.
//!
//! A trigger's source text (`+ i am # years old`) is compiled once, at load
//! time, into a flat token sequence that the matcher walks word by word:
//!
//! ```text
//! "[please] tell me (a joke|a story) about *{weight=5}"
//!
//!  Optional[please] Literal(tell) Literal(me) Alternation[a joke | a story]
//!  Literal(about)   Wildcard(*)
//!  weight = 5
//!  flags  = OPTIONAL | ALTERNATION | STAR
//! ```
//!
//! Token kinds:
//!
//! | source        | token                  | captured |
//! |---------------|------------------------|----------|
//! | `word`        | `Literal`              | no       |
//! | `*`           | `Wildcard(Star)`       | yes      |
//! | `#`           | `Wildcard(Number)`     | yes      |
//! | `_`           | `Wildcard(Alpha)`      | yes      |
//! | `(a\|b c)`    | `Alternation`          | yes      |
//! | `[a\|b]`      | `Optional`             | no       |
//! | `[*]`         | `Optional` (any words) | no       |
//! | `(@arr)`      | `Alternation` of array | yes      |
//! | `[@arr]`      | `Optional` of array    | no       |
//!
//! `{weight=N}` may appear anywhere and is lifted out of the token stream.
//! Anything else in braces or angle brackets is rejected: triggers only speak
//! the grammar above.
//!
//! ## Invariants
//!
//! - Literal words are lowercased and stripped with the same punctuation rule
//!   as input, so the matcher compares like with like.
//! - A compiled [`Pattern`] never changes after `compile` returns.
//! - `min_words[i]` is the smallest number of input words `tokens[i..]` can
//!   consume; the matcher uses it to keep wildcards from starving later tokens.

use super::normalize::Normalizer;
use crate::error::CompileError;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Which kinds of token a pattern contains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PatternFlags: u8 {
        const STAR        = 1 << 0;
        const NUMBER      = 1 << 1;
        const ALPHA       = 1 << 2;
        const OPTIONAL    = 1 << 3;
        const ALTERNATION = 1 << 4;
        /// Every token is a `*` wildcard.
        const CATCH_ALL   = 1 << 5;
    }
}

impl PatternFlags {
    /// Any capturing wildcard (`*`, `#`, `_`).
    pub const WILDCARDS: PatternFlags =
        PatternFlags::STAR.union(PatternFlags::NUMBER).union(PatternFlags::ALPHA);
}

/// The three wildcard sigils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WildcardKind {
    /// `*`: any words.
    Star,
    /// `#`: numeric words.
    Number,
    /// `_`: alphabetic words.
    Alpha,
}

impl WildcardKind {
    fn from_sigil(c: char) -> Option<Self> {
        match c {
            '*' => Some(WildcardKind::Star),
            '#' => Some(WildcardKind::Number),
            '_' => Some(WildcardKind::Alpha),
            _ => None,
        }
    }

    pub fn sigil(self) -> char {
        match self {
            WildcardKind::Star => '*',
            WildcardKind::Number => '#',
            WildcardKind::Alpha => '_',
        }
    }

    /// Whether a single input word may be consumed by this wildcard.
    pub fn accepts(self, word: &str) -> bool {
        match self {
            WildcardKind::Star => true,
            WildcardKind::Number => !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()),
            WildcardKind::Alpha => !word.is_empty() && word.chars().all(char::is_alphabetic),
        }
    }
}

/// One alternative of an optional group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalAlt {
    Words(Vec<String>),
    /// `[*]`: one or more arbitrary words.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Wildcard(WildcardKind),
    Alternation(Vec<Vec<String>>),
    Optional(Vec<OptionalAlt>),
}

impl Token {
    fn min_width(&self) -> usize {
        match self {
            Token::Literal(_) | Token::Wildcard(_) => 1,
            Token::Alternation(alts) => alts.iter().map(Vec::len).min().unwrap_or(1),
            Token::Optional(_) => 0,
        }
    }
}

/// Everything a pattern may refer to while compiling.
#[derive(Debug, Clone, Copy)]
pub struct CompileEnv<'a> {
    pub arrays: &'a BTreeMap<String, Vec<String>>,
    pub normalizer: &'a Normalizer,
}

/// A compiled trigger pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    tokens: Vec<Token>,
    weight: u32,
    flags: PatternFlags,
    min_words: Vec<usize>,
}

impl Pattern {
    /// Compile `raw` into a token sequence.
    pub fn compile(raw: &str, env: &CompileEnv<'_>) -> Result<Self, CompileError> {
        let raw = raw.trim();
        let (text, weight) = extract_weight(raw)?;

        if let Some(tag) = find_tag(&text) {
            return Err(CompileError::UnknownTag { tag, text: raw.to_string() });
        }

        let tokens = tokenize(&text, raw, env)?;
        if tokens.is_empty() {
            return Err(CompileError::Empty);
        }

        let mut flags = PatternFlags::empty();
        for token in &tokens {
            match token {
                Token::Literal(_) => {}
                Token::Wildcard(WildcardKind::Star) => flags |= PatternFlags::STAR,
                Token::Wildcard(WildcardKind::Number) => flags |= PatternFlags::NUMBER,
                Token::Wildcard(WildcardKind::Alpha) => flags |= PatternFlags::ALPHA,
                Token::Alternation(_) => flags |= PatternFlags::ALTERNATION,
                Token::Optional(_) => flags |= PatternFlags::OPTIONAL,
            }
        }
        if tokens.iter().all(|t| matches!(t, Token::Wildcard(WildcardKind::Star))) {
            flags |= PatternFlags::CATCH_ALL;
        }

        let mut min_words = vec![0; tokens.len() + 1];
        for i in (0..tokens.len()).rev() {
            min_words[i] = min_words[i + 1] + tokens[i].min_width();
        }

        Ok(Pattern { raw: raw.to_string(), tokens, weight, flags, min_words })
    }

    /// Source text as written (including any weight tag).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// `{weight=N}` value, 0 when absent.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    /// Wildcard plus optional-group tokens.
    pub fn wildcard_count(&self) -> usize {
        self.tokens.iter().filter(|t| matches!(t, Token::Wildcard(_) | Token::Optional(_))).count()
    }

    /// Literal words plus required alternations.
    pub fn literal_count(&self) -> usize {
        self.tokens.iter().filter(|t| matches!(t, Token::Literal(_) | Token::Alternation(_))).count()
    }

    /// True for the reserved catch-all trigger, a lone `*`.
    pub fn is_bare_star(&self) -> bool {
        matches!(self.tokens.as_slice(), [Token::Wildcard(WildcardKind::Star)])
    }

    /// Minimum words `tokens[index..]` needs.
    pub(crate) fn min_words_from(&self, index: usize) -> usize {
        self.min_words.get(index).copied().unwrap_or(0)
    }
}

fn extract_weight(raw: &str) -> Result<(String, u32), CompileError> {
    let re = crate::regex!(r"\{weight=([^}]*)\}");
    let mut weight = None;
    for caps in re.captures_iter(raw) {
        let value = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let parsed = value
            .parse::<u32>()
            .map_err(|_| CompileError::InvalidWeight { value: value.to_string(), text: raw.to_string() })?;
        weight.get_or_insert(parsed);
    }
    Ok((re.replace_all(raw, " ").into_owned(), weight.unwrap_or(0)))
}

fn find_tag(text: &str) -> Option<String> {
    let re = crate::regex!(r"\{[^}]*\}?|<[^>]*>?|\}|>");
    re.find(text).map(|m| m.as_str().to_string())
}

fn tokenize(text: &str, raw: &str, env: &CompileEnv<'_>) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => flush_word(&mut word, &mut tokens, raw, env)?,
            '(' | '[' => {
                flush_word(&mut word, &mut tokens, raw, env)?;
                let close = if c == '(' { ')' } else { ']' };
                let mut body = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == close {
                        closed = true;
                        break;
                    }
                    if matches!(inner, '(' | '[' | ')' | ']') {
                        return Err(CompileError::Unbalanced { open: c, text: raw.to_string() });
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(CompileError::Unbalanced { open: c, text: raw.to_string() });
                }
                tokens.push(compile_group(c, &body, raw, env)?);
            }
            ')' => return Err(CompileError::Unbalanced { open: '(', text: raw.to_string() }),
            ']' => return Err(CompileError::Unbalanced { open: '[', text: raw.to_string() }),
            _ => word.push(c),
        }
    }
    flush_word(&mut word, &mut tokens, raw, env)?;

    Ok(tokens)
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>, raw: &str, env: &CompileEnv<'_>) -> Result<(), CompileError> {
    if word.is_empty() {
        return Ok(());
    }
    let w = std::mem::take(word);

    let mut chars = w.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(kind) = WildcardKind::from_sigil(c) {
            tokens.push(Token::Wildcard(kind));
            return Ok(());
        }
    }

    if let Some(sigil) = w.chars().find(|c| WildcardKind::from_sigil(*c).is_some()) {
        return Err(CompileError::EmbeddedWildcard { sigil, text: raw.to_string() });
    }

    let literal = env.normalizer.strip_word(&w);
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(())
}

fn compile_group(open: char, body: &str, raw: &str, env: &CompileEnv<'_>) -> Result<Token, CompileError> {
    let optional = open == '[';
    let trimmed = body.trim();

    let alternatives: Vec<String> = if let Some(name) = trimmed.strip_prefix('@') {
        let name = name.trim();
        env.arrays
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownArray { name: name.to_string(), text: raw.to_string() })?
    } else {
        trimmed.split('|').map(|alt| alt.trim().to_string()).collect()
    };

    let mut words_alts: Vec<Vec<String>> = Vec::new();
    let mut any = false;
    for alt in &alternatives {
        if optional && alt == "*" {
            any = true;
            continue;
        }
        let mut words = Vec::new();
        for w in alt.split_whitespace() {
            if let Some(sigil) = w.chars().find(|c| WildcardKind::from_sigil(*c).is_some()) {
                return Err(CompileError::EmbeddedWildcard { sigil, text: raw.to_string() });
            }
            let literal = env.normalizer.strip_word(w);
            if !literal.is_empty() {
                words.push(literal);
            }
        }
        if !words.is_empty() && !words_alts.contains(&words) {
            words_alts.push(words);
        }
    }

    if optional {
        let mut alts: Vec<OptionalAlt> = words_alts.into_iter().map(OptionalAlt::Words).collect();
        if any {
            alts.push(OptionalAlt::Any);
        }
        if alts.is_empty() {
            return Err(CompileError::EmptyGroup { text: raw.to_string() });
        }
        Ok(Token::Optional(alts))
    } else {
        if words_alts.is_empty() {
            return Err(CompileError::EmptyGroup { text: raw.to_string() });
        }
        Ok(Token::Alternation(words_alts))
    }
}
