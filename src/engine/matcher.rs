//! Trigger matching.
//!
//! The matcher walks a topic's sorted triggers and returns the first one whose
//! pattern consumes the whole normalized input. Each pattern is matched with
//! an explicit depth-first search over partial matches:
//!
//! ```text
//! pattern: i am * years old          input: i am 25 years old
//!
//! (tok 0, word 0) ─i─▶ (1,1) ─am─▶ (2,2) ─*─┬─▶ (3,5) "25 years old"   fails at 'years'
//!                                           ├─▶ (3,4) "25 years"       fails at 'years'
//!                                           └─▶ (3,3) "25" ─years─▶ (4,4) ─old─▶ (5,5) ✓
//! ```
//!
//! Wildcards try their longest span first and back off one word at a time.
//! A span never eats words the remaining tokens need (see
//! `Pattern::min_words_from`). A `(token, word)` state that was already
//! expanded is skipped: captures do not influence what can follow, so a state
//! that failed once fails again.
//!
//! ## Bands
//!
//! 1. `%` triggers, only when their constraint matches the normalized last
//!    reply; its captures become `<botstar>`s.
//! 2. Ordinary triggers.
//! 3. The topic's bare `*` trigger, which is also the only thing that answers
//!    an empty input.

use super::pattern::{OptionalAlt, Pattern, Token};
use super::sorter::SortedTopic;
use super::topics::{PoolEntry, TopicGraph};
use std::collections::HashSet;

/// Partially matched pattern: `next_idx` tokens consumed, `position` words
/// consumed, `stars` holding the captures so far.
struct PartialMatch {
    next_idx: usize,
    position: usize,
    stars: Vec<String>,
}

/// Match `pattern` against `words`, returning the captures on success.
pub fn match_pattern(pattern: &Pattern, words: &[String]) -> Option<Vec<String>> {
    let tokens = pattern.tokens();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut stack = vec![PartialMatch { next_idx: 0, position: 0, stars: Vec::new() }];

    while let Some(m) = stack.pop() {
        if m.next_idx == tokens.len() {
            if m.position == words.len() {
                return Some(m.stars);
            }
            continue;
        }
        if !seen.insert((m.next_idx, m.position)) {
            continue;
        }

        let remaining = words.len() - m.position;
        let reserve = pattern.min_words_from(m.next_idx + 1);
        let rest = &words[m.position..];

        // Children are pushed least preferred first so the preferred one pops next.
        match &tokens[m.next_idx] {
            Token::Literal(word) => {
                if rest.first() == Some(word) {
                    stack.push(PartialMatch { next_idx: m.next_idx + 1, position: m.position + 1, stars: m.stars });
                }
            }
            Token::Wildcard(kind) => {
                let max = remaining.saturating_sub(reserve);
                let span = rest.iter().take(max).take_while(|w| kind.accepts(w)).count();
                for len in 1..=span {
                    let mut stars = m.stars.clone();
                    stars.push(rest[..len].join(" "));
                    stack.push(PartialMatch { next_idx: m.next_idx + 1, position: m.position + len, stars });
                }
            }
            Token::Alternation(alts) => {
                for alt in alts.iter().rev() {
                    if rest.starts_with(alt) {
                        let mut stars = m.stars.clone();
                        stars.push(alt.join(" "));
                        stack.push(PartialMatch { next_idx: m.next_idx + 1, position: m.position + alt.len(), stars });
                    }
                }
            }
            Token::Optional(alts) => {
                stack.push(PartialMatch { next_idx: m.next_idx + 1, position: m.position, stars: m.stars.clone() });
                for alt in alts.iter().rev() {
                    match alt {
                        OptionalAlt::Words(alt) => {
                            if rest.starts_with(alt) {
                                stack.push(PartialMatch {
                                    next_idx: m.next_idx + 1,
                                    position: m.position + alt.len(),
                                    stars: m.stars.clone(),
                                });
                            }
                        }
                        OptionalAlt::Any => {
                            for len in 1..=remaining.saturating_sub(reserve) {
                                stack.push(PartialMatch {
                                    next_idx: m.next_idx + 1,
                                    position: m.position + len,
                                    stars: m.stars.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    None
}

/// The winning trigger of one match attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub entry: PoolEntry,
    pub stars: Vec<String>,
    /// Captures of the `%` constraint.
    pub botstars: Vec<String>,
    pub used_previous: bool,
    /// Triggers tried, including the winner.
    pub tried: usize,
}

/// Find the first trigger in `sorted` that matches `words`.
///
/// `last_reply` is the normalized previous bot reply, checked against `%`
/// constraints.
pub fn find_match(graph: &TopicGraph, sorted: &SortedTopic, words: &[String], last_reply: &[String]) -> Option<MatchOutcome> {
    let mut tried = 0;

    for entry in &sorted.previous {
        let trigger = graph.trigger(entry.trigger);
        let Some(previous) = &trigger.previous else {
            continue;
        };
        tried += 1;
        let Some(botstars) = match_pattern(previous, last_reply) else {
            continue;
        };
        if let Some(stars) = match_pattern(&trigger.pattern, words) {
            tracing::debug!(pattern = trigger.pattern.raw(), previous = previous.raw(), "matched with previous");
            return Some(MatchOutcome { entry: *entry, stars, botstars, used_previous: true, tried });
        }
    }

    for entry in &sorted.ordinary {
        tried += 1;
        let trigger = graph.trigger(entry.trigger);
        if let Some(stars) = match_pattern(&trigger.pattern, words) {
            tracing::debug!(pattern = trigger.pattern.raw(), tried, "matched");
            return Some(MatchOutcome { entry: *entry, stars, botstars: Vec::new(), used_previous: false, tried });
        }
    }

    sorted.catch_all.map(|entry| {
        tracing::debug!("falling back to catch-all");
        MatchOutcome { entry, stars: vec![words.join(" ")], botstars: Vec::new(), used_previous: false, tried }
    })
}
