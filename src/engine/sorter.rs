//! Trigger ordering.
//!
//! For every topic the sorter turns the resolved trigger pool into the exact
//! order the matcher tries triggers in. The order is total and depends only on
//! the rule set, so the same input always reaches the same trigger.
//!
//! Triggers with a `%` constraint form their own band, tried before the rest.
//! Inside each band entries are compared by this key, first difference wins:
//!
//! ```text
//!  1. {weight=N}            higher first
//!  2. inherit depth         own topic before inherited ones
//!  3. category              0 literal / alternation only
//!                           1 contains * # _
//!                           2 contains [optional]
//!                           3 only * (catch-all)
//!  4. included              own triggers before included ones
//!  5. wildcard count        fewer first
//!  6. literal count         more first
//!  7. pool position         declaration order
//! ```
//!
//! The last key makes the sort total, so `sort_by` stability is not even
//! needed; it is stable anyway.

use super::pattern::{Pattern, PatternFlags};
use super::topics::{PoolEntry, TopicGraph, TopicId};
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

/// Match order for one topic.
#[derive(Debug, Clone, Default)]
pub struct SortedTopic {
    /// Triggers with a `%` constraint, tried first.
    pub previous: Vec<PoolEntry>,
    /// Everything else.
    pub ordinary: Vec<PoolEntry>,
    /// First bare `*` trigger in the pool; answers when nothing else does.
    pub catch_all: Option<PoolEntry>,
}

impl SortedTopic {
    /// All entries in the order the matcher tries them.
    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> {
        self.previous.iter().chain(self.ordinary.iter())
    }

    pub fn len(&self) -> usize {
        self.previous.len() + self.ordinary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Category rank of a pattern (lower is tried first).
pub fn category(pattern: &Pattern) -> u8 {
    let flags = pattern.flags();
    if flags.contains(PatternFlags::CATCH_ALL) {
        3
    } else if flags.contains(PatternFlags::OPTIONAL) {
        2
    } else if flags.intersects(PatternFlags::WILDCARDS) {
        1
    } else {
        0
    }
}

type SortKey = (Reverse<u32>, usize, u8, bool, usize, Reverse<usize>, usize);

fn sort_key(pattern: &Pattern, entry: &PoolEntry, position: usize) -> SortKey {
    (
        Reverse(pattern.weight()),
        entry.depth,
        category(pattern),
        entry.included,
        pattern.wildcard_count(),
        Reverse(pattern.literal_count()),
        position,
    )
}

/// Order a resolved pool.
pub fn sort_pool(graph: &TopicGraph, pool: &[PoolEntry]) -> SortedTopic {
    let mut previous: Vec<(SortKey, PoolEntry)> = Vec::new();
    let mut ordinary: Vec<(SortKey, PoolEntry)> = Vec::new();

    for (position, entry) in pool.iter().enumerate() {
        let trigger = graph.trigger(entry.trigger);
        let key = sort_key(&trigger.pattern, entry, position);
        if trigger.previous.is_some() {
            previous.push((key, *entry));
        } else {
            ordinary.push((key, *entry));
        }
    }

    previous.sort_by(compare);
    ordinary.sort_by(compare);

    let ordinary: Vec<PoolEntry> = ordinary.into_iter().map(|(_, e)| e).collect();
    let catch_all = ordinary.iter().copied().find(|e| graph.trigger(e.trigger).pattern.is_bare_star());

    SortedTopic { previous: previous.into_iter().map(|(_, e)| e).collect(), ordinary, catch_all }
}

fn compare(a: &(SortKey, PoolEntry), b: &(SortKey, PoolEntry)) -> Ordering {
    a.0.cmp(&b.0)
}

/// Sort every topic in the graph.
pub fn sort_all(graph: &TopicGraph) -> BTreeMap<TopicId, SortedTopic> {
    graph
        .topics()
        .map(|(id, topic)| {
            let sorted = sort_pool(graph, &graph.resolve_trigger_pool(id));
            tracing::trace!(topic = topic.name(), triggers = sorted.len(), "sorted topic");
            (id, sorted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalize::Normalizer;
    use crate::engine::pattern::CompileEnv;
    use crate::engine::topics::Trigger;

    fn graph(patterns: &[(&str, Option<&str>)]) -> (TopicGraph, TopicId) {
        let arrays = BTreeMap::new();
        let normalizer = Normalizer::default();
        let env = CompileEnv { arrays: &arrays, normalizer: &normalizer };
        let mut g = TopicGraph::new();
        let random = g.add_topic("random");
        for (raw, prev) in patterns {
            let previous = prev.map(|p| Pattern::compile(p, &env).unwrap());
            g.add_trigger(random, Trigger::new(Pattern::compile(raw, &env).unwrap(), previous));
        }
        (g, random)
    }

    fn order(g: &TopicGraph, sorted: &SortedTopic) -> Vec<String> {
        sorted.iter().map(|e| g.trigger(e.trigger).pattern.raw().to_string()).collect()
    }

    #[test]
    fn specific_before_general() {
        let (g, random) = graph(&[
            ("*", None),
            ("[please] help", None),
            ("i am *", None),
            ("i am #", None),
            ("i am * years old", None),
            ("hello bot", None),
            ("hello", None),
            ("(hi|hey)", None),
        ]);
        let sorted = sort_pool(&g, &g.resolve_trigger_pool(random));
        assert_eq!(
            order(&g, &sorted),
            vec!["hello bot", "hello", "(hi|hey)", "i am * years old", "i am *", "i am #", "[please] help", "*"]
        );
        assert_eq!(sorted.catch_all.map(|e| e.trigger), Some(sorted.ordinary[7].trigger));
    }

    #[test]
    fn weight_dominates_and_previous_band_is_first() {
        let (g, random) = graph(&[
            ("hello", None),
            ("*{weight=10}", None),
            ("*", Some("who is there")),
        ]);
        let sorted = sort_pool(&g, &g.resolve_trigger_pool(random));
        assert_eq!(order(&g, &sorted), vec!["*", "*{weight=10}", "hello"]);
        assert_eq!(sorted.previous.len(), 1);
        let catch_all = sorted.catch_all.map(|e| g.trigger(e.trigger).pattern.raw().to_string());
        assert_eq!(catch_all.as_deref(), Some("*{weight=10}"));
    }

    #[test]
    fn inherited_triggers_come_last() {
        let (mut g, random) = graph(&[("hello", None)]);
        let arrays = BTreeMap::new();
        let normalizer = Normalizer::default();
        let env = CompileEnv { arrays: &arrays, normalizer: &normalizer };
        let child = g.add_topic("child");
        g.add_trigger(child, Trigger::new(Pattern::compile("*", &env).unwrap(), None));
        g.inherit(child, random);

        let sorted = sort_pool(&g, &g.resolve_trigger_pool(child));
        assert_eq!(order(&g, &sorted), vec!["*", "hello"]);
    }

    #[test]
    fn included_triggers_share_the_local_tier() {
        let (mut g, random) = graph(&[("hello", None), ("hello *", None)]);
        let arrays = BTreeMap::new();
        let normalizer = Normalizer::default();
        let env = CompileEnv { arrays: &arrays, normalizer: &normalizer };
        let room = g.add_topic("room");
        g.add_trigger(room, Trigger::new(Pattern::compile("*", &env).unwrap(), None));
        g.add_trigger(room, Trigger::new(Pattern::compile("hello *", &env).unwrap(), None));
        g.include(room, random);

        let sorted = sort_pool(&g, &g.resolve_trigger_pool(room));
        assert_eq!(order(&g, &sorted), vec!["hello", "hello *", "hello *", "*"]);
        assert!(!sorted.ordinary[1].included);
        assert!(sorted.ordinary[2].included);
    }

    #[test]
    fn sorting_is_repeatable() {
        let (g, random) = graph(&[("a *", None), ("* a", None), ("a b", None), ("b a", None), ("[x] *", None)]);
        let pool = g.resolve_trigger_pool(random);
        let first = order(&g, &sort_pool(&g, &pool));
        for _ in 0..5 {
            assert_eq!(order(&g, &sort_pool(&g, &pool)), first);
        }
        assert_eq!(sort_all(&g).len(), 1);
    }
}
