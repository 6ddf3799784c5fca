//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: everything derived from
//! the loaded rule sources that a reply only ever reads.
//!
//! Replying is split into two phases:
//!
//! 1. **Compile** (this module): merge every [`RuleSource`] into one
//!    [`CompiledRules`] snapshot: definitions, the normalizer, the topic graph
//!    and the per-topic sort order.
//! 2. **Reply** (see `resolve.rs`): normalize the input, match it against the
//!    user's topic (`matcher.rs`) and render the winning trigger.
//!
//! ```text
//! RuleSource ─┐
//! RuleSource ─┼─▶ definitions ─▶ Normalizer ─┐
//! RuleSource ─┘        │                     ▼
//!                      └──── arrays ──▶ Pattern::compile ─▶ TopicGraph ─▶ sort_all
//! ```
//!
//! ## Invariants
//!
//! - A snapshot is never mutated after `build` returns; reloads build a new one.
//! - Sources are merged in load order, so a later `! var` or `! sub` overrides an
//!   earlier one and a later trigger with the same pattern extends the earlier one.
//! - Topic `random` always exists.
//! - `sorted` has an entry for every topic in `graph`.

use super::normalize::Normalizer;
use super::pattern::{CompileEnv, Pattern};
use super::sorter::{SortedTopic, sort_all};
use super::template::{Condition, Template};
use super::topics::{TopicGraph, TopicId, Trigger};
use crate::error::{ConfigError, LoadError};
use crate::session::{DEFAULT_TOPIC, UNDEF_SENTINEL};
use crate::source::{Line, RuleSource};
use crate::Options;
use std::collections::BTreeMap;

/// Immutable, shareable result of compiling every loaded source.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub(crate) graph: TopicGraph,
    pub(crate) sorted: BTreeMap<TopicId, SortedTopic>,
    pub(crate) normalizer: Normalizer,
    pub(crate) bot_vars: BTreeMap<String, String>,
    pub(crate) globals: BTreeMap<String, String>,
    pub(crate) arrays: BTreeMap<String, Vec<String>>,
    pub(crate) version: Option<String>,
}

impl Default for CompiledRules {
    fn default() -> Self {
        let mut graph = TopicGraph::new();
        graph.add_topic(DEFAULT_TOPIC);
        let sorted = sort_all(&graph);
        CompiledRules {
            graph,
            sorted,
            normalizer: Normalizer::default(),
            bot_vars: BTreeMap::new(),
            globals: BTreeMap::new(),
            arrays: BTreeMap::new(),
            version: None,
        }
    }
}

impl CompiledRules {
    /// Snapshot with no rules (only an empty `random` topic).
    pub fn empty(options: &Options) -> Result<Self, ConfigError> {
        let normalizer = Normalizer::new(&options.punctuation, options.substitutions.iter())?;
        Ok(CompiledRules { normalizer, ..Self::default() })
    }

    /// Compile `sources` (in load order) into one snapshot.
    pub fn build(sources: &[RuleSource], options: &Options) -> Result<Self, LoadError> {
        let mut subs: BTreeMap<String, String> = BTreeMap::new();
        let mut bot_vars = BTreeMap::new();
        let mut globals = BTreeMap::new();
        let mut arrays = BTreeMap::new();
        let mut version = None;

        for source in sources {
            let defs = &source.definitions;
            if defs.version.is_some() {
                version.clone_from(&defs.version);
            }
            merge(&mut subs, &defs.subs);
            merge(&mut bot_vars, &defs.vars);
            merge(&mut globals, &defs.globals);
            for (name, items) in &defs.arrays {
                arrays.insert(name.clone(), items.clone());
            }
        }
        for (key, value) in &options.substitutions {
            subs.insert(key.to_lowercase(), value.clone());
        }

        let normalizer = Normalizer::new(&options.punctuation, subs.iter()).map_err(ConfigError::from)?;
        let env = CompileEnv { arrays: &arrays, normalizer: &normalizer };

        let mut graph = TopicGraph::new();
        graph.add_topic(DEFAULT_TOPIC);

        for source in sources {
            let origin = source.origin.as_str();
            for decl in &source.topics {
                let topic = graph.add_topic(&decl.name);
                for name in &decl.includes {
                    let other = graph.add_topic(name);
                    graph.include(topic, other);
                }
                for name in &decl.inherits {
                    let other = graph.add_topic(name);
                    graph.inherit(topic, other);
                }

                for t in &decl.triggers {
                    let pattern = compile_pattern(&t.pattern, origin, &env)?;
                    let previous = t.previous.as_ref().map(|p| compile_pattern(p, origin, &env)).transpose()?;

                    let mut trigger = Trigger::new(pattern, previous);
                    for reply in &t.replies {
                        trigger.replies.push(compile_template(reply, origin)?);
                    }
                    for condition in &t.conditions {
                        trigger.conditions.push(
                            Condition::parse(&condition.text).map_err(|source| LoadError::Compile {
                                origin: origin.to_string(),
                                line: condition.line,
                                source,
                            })?,
                        );
                    }
                    trigger.redirect = t.redirect.as_ref().map(|r| compile_template(r, origin)).transpose()?;
                    graph.add_trigger(topic, trigger);
                }
            }
        }

        let sorted = sort_all(&graph);
        tracing::info!(
            sources = sources.len(),
            topics = sorted.len(),
            triggers = graph.trigger_count(),
            substitutions = normalizer.substitution_count(),
            "compiled rules"
        );

        Ok(CompiledRules { graph, sorted, normalizer, bot_vars, globals, arrays, version })
    }

    pub fn graph(&self) -> &TopicGraph {
        &self.graph
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Sorted triggers of a topic by name.
    pub fn sorted(&self, topic: &str) -> Option<&SortedTopic> {
        self.graph.topic_id(topic).and_then(|id| self.sorted.get(&id))
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.graph.topic_id(topic).is_some()
    }

    pub fn bot_var(&self, name: &str) -> Option<&str> {
        self.bot_vars.get(name).map(String::as_str)
    }

    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(String::as_str)
    }

    pub fn array(&self, name: &str) -> Option<&[String]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Apply `name = value` definitions; `<undef>` removes an earlier one.
fn merge(into: &mut BTreeMap<String, String>, defs: &[(String, String)]) {
    for (name, value) in defs {
        if value == UNDEF_SENTINEL {
            into.remove(name);
        } else {
            into.insert(name.clone(), value.clone());
        }
    }
}

fn compile_pattern(line: &Line, origin: &str, env: &CompileEnv<'_>) -> Result<Pattern, LoadError> {
    Pattern::compile(&line.text, env).map_err(|source| LoadError::Compile { origin: origin.to_string(), line: line.line, source })
}

fn compile_template(line: &Line, origin: &str) -> Result<Template, LoadError> {
    Template::parse(&line.text).map_err(|source| LoadError::Compile { origin: origin.to_string(), line: line.line, source })
}
