//! A rule-based reply engine.
//!
//! Rules are written in a small line-oriented language: triggers (`+`) with
//! wildcards and optionals, reply bodies (`-`) with tags such as `<star>` or
//! `<get name>`, conditions (`*`), redirects (`@`), previous-reply constraints
//! (`%`) and topics that include or inherit each other.
//!
//! ```
//! use parley::Engine;
//!
//! let engine = Engine::new();
//! engine.load_str("demo", &parley::rive![
//!     "+ my name is *",
//!     "- <set name=<formal>>Nice to meet you, <get name>.",
//!     "",
//!     "+ what is my name",
//!     "- You are <get name>.",
//! ]).unwrap();
//!
//! assert_eq!(engine.reply("u1", "My name is Ada Lovelace"), "Nice to meet you, Ada Lovelace.");
//! assert_eq!(engine.reply("u1", "What is my name?"), "You are Ada Lovelace.");
//! ```

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod object;
mod session;
mod source;

pub use api::{Engine, Options, ReplyDetails, ReplyVerbose, TopicSummary, TriggerSummary};
pub use engine::{DEFAULT_PUNCTUATION, MatchStep, Matched, Normalizer, ReplyMetrics, TriggerId};
pub use error::{CompileError, ConfigError, Diagnostic, LoadError, MacroError};
pub use object::{MacroCall, MacroHandler, MacroRegistry, Subroutine};
pub use session::{
    DEFAULT_TOPIC, HISTORY_DEPTH, History, MemoryStore, SessionStore, UNDEF_SENTINEL, UNDEFINED, UserState,
};
pub use source::{Definitions, Line, ObjectDecl, RuleSource, SourceParser, TopicDecl, TriggerDecl};

#[cfg(test)]
mod tests;
