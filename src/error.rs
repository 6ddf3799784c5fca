//! Error and diagnostic types.
//!
//! The engine separates failures by how far they are allowed to travel:
//!
//! ```text
//! CompileError ──┐
//! SyntaxError  ──┴─▶ LoadError   rejects one source, published rules untouched
//! ConfigError        bad Options (TOML or regex)
//! MacroError         raised by a subroutine, rendered as empty text
//! Diagnostic         recoverable problems met while rendering one reply
//! Abort              ends the current turn (redirect depth exceeded)
//! ```
//!
//! Nothing here is ever turned into a panic: the worst a user sees is one of
//! the configured fallback sentences.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed trigger pattern or reply body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("empty pattern")]
    Empty,

    #[error("unbalanced '{open}' in \"{text}\"")]
    Unbalanced { open: char, text: String },

    #[error("empty group in \"{text}\"")]
    EmptyGroup { text: String },

    #[error("unknown tag '{tag}' in pattern \"{text}\"")]
    UnknownTag { tag: String, text: String },

    #[error("invalid weight '{value}' in \"{text}\"")]
    InvalidWeight { value: String, text: String },

    #[error("unknown array '@{name}' in \"{text}\"")]
    UnknownArray { name: String, text: String },

    #[error("wildcard '{sigil}' must stand alone in \"{text}\"")]
    EmbeddedWildcard { sigil: char, text: String },

    #[error("unterminated {tag} in \"{text}\"")]
    Unterminated { tag: &'static str, text: String },

    #[error("malformed condition \"{text}\"")]
    MalformedCondition { text: String },
}

/// A rule source that could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin} line {line}: {message}")]
    Syntax { origin: String, line: usize, message: String },

    #[error("{origin} line {line}: {source}")]
    Compile {
        origin: String,
        line: usize,
        #[source]
        source: CompileError,
    },

    #[error("object '{name}' rejected by the '{language}' handler: {source}")]
    Object {
        name: String,
        language: String,
        #[source]
        source: MacroError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure reported by a subroutine or language handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("{0}")]
    Failed(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("no handler for language '{0}'")]
    NoHandler(String),
}

/// Invalid [`Options`](crate::Options).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid punctuation pattern: {0}")]
    Punctuation(#[from] regex::Error),
}

/// A recoverable problem met while rendering a reply.
///
/// Diagnostics never stop rendering; the offending tag renders as empty text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("<star{index}> requested but only {available} captured")]
    WildcardIndexOutOfRange { index: usize, available: usize },

    #[error("history index {index} outside 1..=9")]
    HistoryIndexOutOfRange { index: usize },

    #[error("object macro '{0}' is not defined")]
    UndefinedMacro(String),

    #[error("object macro '{name}' failed: {source}")]
    MacroFailed {
        name: String,
        #[source]
        source: MacroError,
    },

    #[error("'{value}' is not a number (variable '{name}')")]
    NotANumber { name: String, value: String },

    #[error("division by zero (variable '{name}')")]
    DivisionByZero { name: String },

    #[error("redirect depth {depth} exceeded")]
    RedirectDepthExceeded { depth: usize },

    #[error("topic '{0}' does not exist, falling back to 'random'")]
    UnknownTopic(String),
}

/// Ends the current turn early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum Abort {
    #[error("redirect depth {0} exceeded")]
    DeepRecursion(usize),
}
