//! Matching and rendering engine.
//!
//! This module is the internal core behind [`crate::Engine`]. The public type
//! owns loading, sessions and locking; everything here is plain data plus pure
//! functions over it, split into focused submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! Loading compiles rule sources into one immutable snapshot; replying reads
//! that snapshot and the state of a single user:
//!
//! ```text
//! RuleSource* ──▶ CompiledRules::build                   (compiled_rules.rs)
//!                   - Normalizer from ! sub + options      (normalize.rs)
//!                   - Pattern::compile per trigger          (pattern.rs)
//!                   - Template / Condition per reply        (template.rs)
//!                   - TopicGraph: topics, includes, inherits (topics.rs)
//!                   - sort_all: one ordered list per topic  (sorter.rs)
//!                               │
//!                               v
//! message ──▶ Resolver::respond                          (resolve.rs)
//!               - normalize, pick the user's topic
//!               - find_match: previous band, ordinary, catch-all (matcher.rs)
//!               - redirect / conditions / weighted reply
//!               - render nodes, call macros, follow {@...}
//!                               │
//!                               v
//!                     String + ReplyMetrics              (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `normalize.rs`: lowercasing, punctuation stripping, word substitutions.
//! - `pattern.rs`: trigger syntax to a token list plus sort statistics.
//! - `template.rs`: reply bodies, conditions and their tags as a node tree.
//! - `topics.rs`: topic arena and trigger pool resolution.
//! - `sorter.rs`: the total order triggers are tried in.
//! - `matcher.rs`: backtracking wildcard matching.
//! - `compiled_rules.rs`: builds the snapshot from parsed sources.
//! - `resolve.rs`: turns a match into reply text.
//! - `metrics.rs`: timing and per-step detail for verbose replies.
//!
//! ## Invariants
//!
//! - Nothing in a [`CompiledRules`] changes after `build`.
//! - Two engines loaded with the same sources sort every topic identically.
//! - A reply never panics on bad rule content; problems become diagnostics.
//!
//! ## Debugging
//!
//! Set `PARLEY_LOG=parley=trace` to see matcher and resolver traces.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/normalize.rs"]
mod normalize;
#[path = "engine/pattern.rs"]
mod pattern;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/sorter.rs"]
mod sorter;
#[path = "engine/template.rs"]
mod template;
#[path = "engine/topics.rs"]
mod topics;

pub use compiled_rules::CompiledRules;
pub use metrics::{MatchStep, ReplyMetrics};
pub use normalize::{DEFAULT_PUNCTUATION, Normalizer};
pub(crate) use resolve::Resolver;
pub use resolve::Matched;
pub use sorter::category;
pub use topics::TriggerId;
