//! Topic graph.
//!
//! Topics and triggers live in two flat arenas addressed by [`TopicId`] and
//! [`TriggerId`]. Edges between topics (`includes`, `inherits`) are stored as
//! ids, so cycles are just data: resolution walks them with a visited set.
//!
//! ```text
//! > topic dragons includes sports inherits random
//!
//!   dragons ──includes──▶ sports        same priority tier as dragons
//!      │
//!      └──inherits──▶ random            searched after every dragons/sports trigger
//! ```
//!
//! ## Pool resolution
//!
//! `resolve_trigger_pool(topic)` flattens the graph into the list of triggers
//! the sorter ranks:
//!
//! 1. the topic's own triggers, in insertion order;
//! 2. each included topic's triggers, recursively, at the same level;
//! 3. then, one level deeper, every topic inherited by anything collected so
//!    far, and so on.
//!
//! Each [`PoolEntry`] remembers its inherit depth and whether it came in
//! through an include; the sorter uses both as tie-breakers. A topic reached a
//! second time within one resolution is skipped.

use super::pattern::Pattern;
use super::template::{Condition, Template};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(usize);

impl TriggerId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A compiled trigger and everything it can answer with.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub pattern: Pattern,
    /// `%` constraint on the bot's previous reply.
    pub previous: Option<Pattern>,
    pub replies: Vec<Template>,
    pub conditions: Vec<Condition>,
    /// `@` target; wins over replies and conditions.
    pub redirect: Option<Template>,
    topic: TopicId,
}

impl Trigger {
    pub fn new(pattern: Pattern, previous: Option<Pattern>) -> Self {
        Trigger {
            pattern,
            previous,
            replies: Vec::new(),
            conditions: Vec::new(),
            redirect: None,
            topic: TopicId(0),
        }
    }

    /// Topic that declared this trigger.
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    fn same_key(&self, other: &Trigger) -> bool {
        self.pattern.raw() == other.pattern.raw()
            && self.previous.as_ref().map(Pattern::raw) == other.previous.as_ref().map(Pattern::raw)
    }
}

#[derive(Debug, Clone)]
pub struct Topic {
    name: String,
    triggers: Vec<TriggerId>,
    includes: Vec<TopicId>,
    inherits: Vec<TopicId>,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triggers(&self) -> &[TriggerId] {
        &self.triggers
    }

    pub fn includes(&self) -> &[TopicId] {
        &self.includes
    }

    pub fn inherits(&self) -> &[TopicId] {
        &self.inherits
    }
}

/// One trigger reachable from a topic, with how it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub trigger: TriggerId,
    /// Topic the trigger was declared in.
    pub source: TopicId,
    /// Number of `inherits` edges followed to reach `source`.
    pub depth: usize,
    /// Reached through at least one `includes` edge.
    pub included: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TopicGraph {
    topics: Vec<Topic>,
    by_name: HashMap<String, TopicId>,
    triggers: Vec<Trigger>,
}

impl TopicGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `name`, creating the topic if needed.
    pub fn add_topic(&mut self, name: &str) -> TopicId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TopicId(self.topics.len());
        self.topics.push(Topic { name: name.to_string(), triggers: Vec::new(), includes: Vec::new(), inherits: Vec::new() });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Add `trigger` to `topic`.
    ///
    /// A trigger with the same pattern and `%` constraint already in the topic
    /// absorbs the new one: replies and conditions are appended and a redirect
    /// replaces the old one. Returns the id that now holds the trigger.
    pub fn add_trigger(&mut self, topic: TopicId, mut trigger: Trigger) -> TriggerId {
        let existing = self.topics[topic.0].triggers.iter().copied().find(|id| self.triggers[id.0].same_key(&trigger));

        if let Some(id) = existing {
            let target = &mut self.triggers[id.0];
            target.replies.append(&mut trigger.replies);
            target.conditions.append(&mut trigger.conditions);
            if trigger.redirect.is_some() {
                target.redirect = trigger.redirect;
            }
            tracing::debug!(topic = %self.topics[topic.0].name, pattern = target.pattern.raw(), "merged duplicate trigger");
            return id;
        }

        trigger.topic = topic;
        let id = TriggerId(self.triggers.len());
        self.triggers.push(trigger);
        self.topics[topic.0].triggers.push(id);
        id
    }

    /// `topic` includes `other`.
    pub fn include(&mut self, topic: TopicId, other: TopicId) {
        push_unique(&mut self.topics[topic.0].includes, other);
    }

    /// `topic` inherits `other`.
    pub fn inherit(&mut self, topic: TopicId, other: TopicId) {
        push_unique(&mut self.topics[topic.0].inherits, other);
    }

    pub fn topic_id(&self, name: &str) -> Option<TopicId> {
        self.by_name.get(name).copied()
    }

    pub fn topic(&self, id: TopicId) -> &Topic {
        &self.topics[id.0]
    }

    pub fn topics(&self) -> impl Iterator<Item = (TopicId, &Topic)> {
        self.topics.iter().enumerate().map(|(i, t)| (TopicId(i), t))
    }

    pub fn trigger(&self, id: TriggerId) -> &Trigger {
        &self.triggers[id.0]
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Every trigger `topic` can answer with, in resolution order.
    pub fn resolve_trigger_pool(&self, topic: TopicId) -> Vec<PoolEntry> {
        let mut visited = HashSet::new();
        let mut pool = Vec::new();
        let mut level = vec![topic];
        let mut depth = 0;

        while !level.is_empty() {
            let mut parents = Vec::new();
            for id in level {
                self.collect(id, depth, false, &mut visited, &mut pool, &mut parents);
            }
            level = parents;
            depth += 1;
        }

        pool
    }

    fn collect(
        &self,
        id: TopicId,
        depth: usize,
        included: bool,
        visited: &mut HashSet<TopicId>,
        pool: &mut Vec<PoolEntry>,
        parents: &mut Vec<TopicId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let topic = &self.topics[id.0];
        pool.extend(topic.triggers.iter().map(|&trigger| PoolEntry { trigger, source: id, depth, included }));
        for &inc in &topic.includes {
            self.collect(inc, depth, true, visited, pool, parents);
        }
        parents.extend_from_slice(&topic.inherits);
    }
}

fn push_unique(list: &mut Vec<TopicId>, id: TopicId) {
    if !list.contains(&id) {
        list.push(id);
    }
}
