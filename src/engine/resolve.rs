//! Reply resolution.
//!
//! Matching produces a [`MatchOutcome`]: which trigger won and what its
//! wildcards captured. Resolution turns that into reply text by:
//!
//! - following the trigger's `@` redirect, if it has one;
//! - otherwise evaluating its conditions top to bottom;
//! - otherwise picking one reply body (weighted random);
//! - rendering the chosen template against the captures and the user's state.
//!
//! ## Where this fits
//!
//! `Engine::reply` creates one [`Resolver`] per turn and calls
//! [`Resolver::respond`]. Redirects (`@`, `{@...}`, `<@>`) re-enter the same
//! resolver through `reply_to`, one level deeper each time:
//!
//! ```text
//! respond ──▶ find ──▶ render_trigger ──▶ render ──┐
//!                ▲                                  │ redirect
//!                └─────────── reply_to(depth + 1) ◀─┘
//! ```
//!
//! Going deeper than `Options::max_depth` returns [`Abort::DeepRecursion`],
//! which unwinds every level through `?`; the engine turns it into the
//! configured fallback reply.
//!
//! Everything else that can go wrong while rendering (a missing capture, an
//! unknown macro, a non-numeric `<add>`) is a [`Diagnostic`]: logged, kept for
//! `reply_verbose`, rendered as empty text.

use super::compiled_rules::CompiledRules;
use super::matcher::{MatchOutcome, find_match};
use super::metrics::{MatchStep, ReplyMetrics};
use super::template::{MathOp, Node, Template};
use super::topics::TriggerId;
use crate::error::{Abort, Diagnostic};
use crate::object::{CallFailure, MacroCall, MacroRegistry};
use crate::session::{DEFAULT_TOPIC, UNDEFINED, UserState};
use crate::Options;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use std::time::{Duration, Instant};

/// Wildcard captures visible to a template.
#[derive(Debug, Clone, Copy)]
struct Captures<'c> {
    stars: &'c [String],
    botstars: &'c [String],
}

/// The trigger that answered the user's own message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub trigger: TriggerId,
    pub pattern: String,
    pub topic: String,
    pub stars: Vec<String>,
    pub botstars: Vec<String>,
    pub used_previous: bool,
}

/// Per-turn reply renderer.
pub(crate) struct Resolver<'a> {
    rules: &'a CompiledRules,
    macros: &'a MacroRegistry,
    options: &'a Options,
    rng: StdRng,
    deadline: Option<Instant>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Redirect targets followed, in order.
    pub(crate) redirects: Vec<String>,
    pub(crate) metrics: ReplyMetrics,
    /// Trigger that answered the user's own message.
    pub(crate) matched: Option<Matched>,
    /// Time spent in nested matching, subtracted from render time.
    nested: Duration,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(rules: &'a CompiledRules, macros: &'a MacroRegistry, options: &'a Options, rng: StdRng) -> Self {
        let deadline = options.macro_timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        Resolver {
            rules,
            macros,
            options,
            rng,
            deadline,
            diagnostics: Vec::new(),
            redirects: Vec::new(),
            metrics: ReplyMetrics::default(),
            matched: None,
            nested: Duration::ZERO,
        }
    }

    /// Answer the user's own message.
    ///
    /// The matching trigger, if any, is left in `self.matched` even when the
    /// turn aborts.
    pub(crate) fn respond(&mut self, user: &mut UserState, message: &str) -> Result<String, Abort> {
        let start = Instant::now();
        let Some(outcome) = self.find(user, message, 0) else {
            self.metrics.total = start.elapsed();
            return Ok(self.options.no_match_reply.clone());
        };

        let rules = self.rules;
        let trigger = rules.graph.trigger(outcome.entry.trigger);
        self.matched = Some(Matched {
            trigger: outcome.entry.trigger,
            pattern: trigger.pattern.raw().to_string(),
            topic: rules.graph.topic(outcome.entry.source).name().to_string(),
            stars: outcome.stars.clone(),
            botstars: outcome.botstars.clone(),
            used_previous: outcome.used_previous,
        });

        let render_start = Instant::now();
        let reply = self.render_trigger(user, &outcome, 0);
        self.metrics.render = render_start.elapsed().saturating_sub(self.nested);
        self.metrics.total = start.elapsed();

        reply
    }

    /// Normalize `text` and match it in the user's current topic.
    fn find(&mut self, user: &mut UserState, text: &str, depth: usize) -> Option<MatchOutcome> {
        let start = Instant::now();
        let rules = self.rules;

        let sorted = match rules.sorted(user.topic()) {
            Some(sorted) => sorted,
            None => {
                self.diagnose(Diagnostic::UnknownTopic(user.topic().to_string()));
                user.set_topic(DEFAULT_TOPIC);
                rules.sorted(DEFAULT_TOPIC)?
            }
        };

        let words = rules.normalizer.words(text);
        let last_reply = rules.normalizer.words(user.reply(1).unwrap_or(UNDEFINED));
        let outcome = find_match(&rules.graph, sorted, &words, &last_reply);

        let tried = outcome.as_ref().map_or(sorted.len(), |o| o.tried);
        let duration = start.elapsed();
        self.metrics.matching += duration;
        self.metrics.triggers_tried += tried;
        self.metrics.steps.push(MatchStep {
            input: words.join(" "),
            topic: user.topic().to_string(),
            matched: outcome.as_ref().map(|o| rules.graph.trigger(o.entry.trigger).pattern.raw().to_string()),
            tried,
            duration,
            depth,
        });
        if outcome.is_none() {
            tracing::debug!(input = %words.join(" "), topic = user.topic(), "no trigger matched");
        }
        outcome
    }

    /// Resolve a redirect target one level deeper.
    fn reply_to(&mut self, user: &mut UserState, text: &str, depth: usize) -> Result<String, Abort> {
        if depth > self.options.max_depth {
            self.diagnose(Diagnostic::RedirectDepthExceeded { depth: self.options.max_depth });
            return Err(Abort::DeepRecursion(depth));
        }
        self.redirects.push(text.to_string());
        tracing::debug!(redirect = text, depth, "following redirect");

        let start = Instant::now();
        let outcome = self.find(user, text, depth);
        self.nested += start.elapsed();

        match outcome {
            Some(outcome) => self.render_trigger(user, &outcome, depth),
            None => Ok(self.options.no_match_reply.clone()),
        }
    }

    fn render_trigger(&mut self, user: &mut UserState, outcome: &MatchOutcome, depth: usize) -> Result<String, Abort> {
        let rules = self.rules;
        let trigger = rules.graph.trigger(outcome.entry.trigger);
        let caps = Captures { stars: &outcome.stars, botstars: &outcome.botstars };

        if let Some(redirect) = &trigger.redirect {
            let target = self.render(redirect, caps, user, depth)?;
            return self.reply_to(user, target.trim(), depth + 1);
        }

        for condition in &trigger.conditions {
            let left = self.render(&condition.left, caps, user, depth)?;
            let right = self.render(&condition.right, caps, user, depth)?;
            if condition.op.holds(&left, &right) {
                tracing::trace!(condition = condition.source(), "condition held");
                return self.render(&condition.body, caps, user, depth);
            }
        }

        match self.pick(&trigger.replies) {
            Some(reply) => self.render(reply, caps, user, depth),
            None => Ok(self.options.no_reply_found.clone()),
        }
    }

    /// Weighted choice among reply bodies; weight 0 counts as 1. Weights are
    /// summed as `u64` so any pair of `u32` weights fits.
    fn pick<'t>(&mut self, replies: &'t [Template]) -> Option<&'t Template> {
        match replies.len() {
            0 => None,
            1 => replies.first(),
            n => match WeightedIndex::new(replies.iter().map(|r| u64::from(r.weight().max(1)))) {
                Ok(dist) => replies.get(dist.sample(&mut self.rng)),
                Err(_) => replies.get(self.rng.gen_range(0..n)),
            },
        }
    }

    fn render(&mut self, template: &Template, caps: Captures<'_>, user: &mut UserState, depth: usize) -> Result<String, Abort> {
        let mut out = String::new();
        for node in template.nodes() {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Star { index, bot } => {
                    let list = if *bot { caps.botstars } else { caps.stars };
                    match index.checked_sub(1).and_then(|i| list.get(i)) {
                        Some(star) => out.push_str(star),
                        None => self.diagnose(Diagnostic::WildcardIndexOutOfRange { index: *index, available: list.len() }),
                    }
                }
                Node::Input(index) | Node::Reply(index) => {
                    let entry = if matches!(node, Node::Input(_)) { user.input(*index) } else { user.reply(*index) };
                    match entry {
                        Some(text) => out.push_str(text),
                        None => self.diagnose(Diagnostic::HistoryIndexOutOfRange { index: *index }),
                    }
                }
                Node::Get(name) => out.push_str(user.get(name)),
                Node::Set { name, value } => {
                    let value = self.render(value, caps, user, depth)?;
                    user.set(name.as_str(), value);
                }
                Node::Math { op, name, value } => {
                    let value = self.render(value, caps, user, depth)?;
                    self.apply_math(user, *op, name, &value);
                }
                Node::Bot(name) => out.push_str(self.rules.bot_var(name).unwrap_or(UNDEFINED)),
                Node::Env(name) => out.push_str(self.rules.global(name).unwrap_or(UNDEFINED)),
                Node::Id => out.push_str(user.id()),
                Node::Call(body) => {
                    let line = self.render(body, caps, user, depth)?;
                    out.push_str(&self.call(user, &line));
                }
                Node::Random(alts) => {
                    if !alts.is_empty() {
                        let i = self.rng.gen_range(0..alts.len());
                        out.push_str(&self.render(&alts[i], caps, user, depth)?);
                    }
                }
                Node::Redirect(target) => {
                    let target = self.render(target, caps, user, depth)?;
                    out.push_str(&self.reply_to(user, target.trim(), depth + 1)?);
                }
                Node::Topic(name) => user.set_topic(name.as_str()),
                Node::Format { case, body } => {
                    let text = self.render(body, caps, user, depth)?;
                    out.push_str(&case.apply(&text));
                }
            }
        }
        Ok(out)
    }

    fn call(&mut self, user: &mut UserState, line: &str) -> String {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            self.diagnose(Diagnostic::UndefinedMacro(String::new()));
            return String::new();
        };
        let mut call = MacroCall { name, args: parts.map(str::to_string).collect(), user, deadline: self.deadline };

        match self.macros.call(&mut call) {
            Ok(text) => text,
            Err(CallFailure::Undefined) => {
                self.diagnose(Diagnostic::UndefinedMacro(name.to_string()));
                String::new()
            }
            Err(CallFailure::Failed(source)) => {
                self.diagnose(Diagnostic::MacroFailed { name: name.to_string(), source });
                String::new()
            }
        }
    }

    fn apply_math(&mut self, user: &mut UserState, op: MathOp, name: &str, value: &str) {
        let current = match user.get(name) {
            UNDEFINED => "0",
            other => other,
        };
        let Ok(lhs) = current.trim().parse::<f64>() else {
            let value = current.to_string();
            self.diagnose(Diagnostic::NotANumber { name: name.to_string(), value });
            return;
        };
        let Ok(rhs) = value.trim().parse::<f64>() else {
            self.diagnose(Diagnostic::NotANumber { name: name.to_string(), value: value.to_string() });
            return;
        };

        let result = match op {
            MathOp::Add => lhs + rhs,
            MathOp::Sub => lhs - rhs,
            MathOp::Mult => lhs * rhs,
            MathOp::Div => {
                if rhs == 0.0 {
                    self.diagnose(Diagnostic::DivisionByZero { name: name.to_string() });
                    return;
                }
                lhs / rhs
            }
        };
        user.set(name, format_number(result));
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(%diagnostic, "reply diagnostic");
        self.diagnostics.push(diagnostic);
    }
}

/// Whole numbers print without a decimal point.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 { format!("{}", v as i64) } else { v.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceParser;
    use rand::SeedableRng;

    fn rules(text: &str) -> CompiledRules {
        let source = SourceParser::default().parse("test", text).unwrap();
        CompiledRules::build(&[source], &Options::default()).unwrap()
    }

    fn respond(rules: &CompiledRules, macros: &MacroRegistry, user: &mut UserState, message: &str) -> (String, Vec<Diagnostic>) {
        let options = Options::default();
        let mut resolver = Resolver::new(rules, macros, &options, StdRng::seed_from_u64(7));
        let reply = match resolver.respond(user, message) {
            Ok(reply) => reply,
            Err(Abort::DeepRecursion(_)) => options.deep_recursion_reply.clone(),
        };
        user.record_turn(message, &reply);
        (reply, resolver.diagnostics)
    }

    #[test]
    fn stars_and_variables() {
        let r = rules(&crate::rive![
            "+ my name is *",
            "- <set name=<formal>>Nice to meet you, <get name>.",
            "+ what is my name",
            "- Your name is <get name>, id <id>.",
            "+ who am i",
            "- <get nobody>",
        ]);
        let macros = MacroRegistry::new();
        let mut user = UserState::new("u1");

        assert_eq!(respond(&r, &macros, &mut user, "my name is noah smith").0, "Nice to meet you, Noah Smith.");
        assert_eq!(respond(&r, &macros, &mut user, "What is my name?").0, "Your name is Noah Smith, id u1.");
        assert_eq!(respond(&r, &macros, &mut user, "who am i").0, "undefined");
    }

    #[test]
    fn math_and_diagnostics() {
        let r = rules(&crate::rive![
            "+ count",
            "- <add hits=1><mult hits=2>hits=<get hits>",
            "+ broken",
            "- [<star2>]<sub hits=abc><div hits=0>",
        ]);
        let macros = MacroRegistry::new();
        let mut user = UserState::new("u2");

        assert_eq!(respond(&r, &macros, &mut user, "count").0, "hits=2");
        assert_eq!(respond(&r, &macros, &mut user, "count").0, "hits=6");

        let (reply, diags) = respond(&r, &macros, &mut user, "broken");
        assert_eq!(reply, "[]");
        assert_eq!(
            diags,
            vec![
                Diagnostic::WildcardIndexOutOfRange { index: 2, available: 0 },
                Diagnostic::NotANumber { name: "hits".into(), value: "abc".into() },
                Diagnostic::DivisionByZero { name: "hits".into() },
            ]
        );
        assert_eq!(user.get("hits"), "6");
    }

    #[test]
    fn history_tags() {
        let r = rules("+ echo\n- <input1>|<input2>|<reply1>");
        let macros = MacroRegistry::new();
        let mut user = UserState::new("u3");
        assert_eq!(respond(&r, &macros, &mut user, "echo").0, "undefined|undefined|undefined");
        assert_eq!(respond(&r, &macros, &mut user, "echo").0, "echo|undefined|undefined|undefined|undefined");
    }

    #[test]
    fn redirects_and_deep_recursion() {
        let r = rules(&crate::rive![
            "+ hello",
            "- Hi there!",
            "+ hey",
            "@ hello",
            "+ say hi to *",
            "- <star> says: {@hello}",
            "+ loop",
            "@ loop",
        ]);
        let macros = MacroRegistry::new();
        let mut user = UserState::new("u4");
        assert_eq!(respond(&r, &macros, &mut user, "hey").0, "Hi there!");
        assert_eq!(respond(&r, &macros, &mut user, "say hi to bob").0, "bob says: Hi there!");

        let (reply, diags) = respond(&r, &macros, &mut user, "loop");
        assert_eq!(reply, "ERR: Deep Recursion Detected");
        assert!(diags.contains(&Diagnostic::RedirectDepthExceeded { depth: 50 }));
    }

    #[test]
    fn macros_topics_and_fallbacks() {
        let r = rules(&crate::rive![
            "+ reverse *",
            "- <call>reverse <star></call>",
            "+ missing",
            "- [<call>nothing here</call>]",
            "+ enter",
            "- {topic=room}Entered.",
            "+ silent",
            "> topic room",
            "+ *",
            "- In the room.",
            "< topic",
        ]);
        let mut macros = MacroRegistry::new();
        macros.set_subroutine(
            "reverse",
            std::sync::Arc::new(|call: &mut MacroCall<'_>| -> Result<String, crate::MacroError> {
                Ok(call.args.join(" ").chars().rev().collect())
            }),
        );
        let mut user = UserState::new("u5");

        assert_eq!(respond(&r, &macros, &mut user, "reverse abc def").0, "fed cba");
        let (reply, diags) = respond(&r, &macros, &mut user, "missing");
        assert_eq!(reply, "[]");
        assert_eq!(diags, vec![Diagnostic::UndefinedMacro("nothing".into())]);

        assert_eq!(respond(&r, &macros, &mut user, "silent").0, "ERR: No Reply Found");
        assert_eq!(respond(&r, &macros, &mut user, "enter").0, "Entered.");
        assert_eq!(user.topic(), "room");
        assert_eq!(respond(&r, &macros, &mut user, "anything").0, "In the room.");

        user.set_topic("nowhere");
        let (reply, diags) = respond(&r, &macros, &mut user, "blah");
        assert_eq!(reply, "ERR: No Reply Matched");
        assert_eq!(diags, vec![Diagnostic::UnknownTopic("nowhere".into())]);
        assert_eq!(user.topic(), "random");
    }

    #[test]
    fn maximal_reply_weights_still_pick() {
        let r = rules("+ hi\n- a{weight=4294967295}\n- b{weight=4294967295}\n- c{weight=4294967295}");
        let macros = MacroRegistry::new();
        let mut user = UserState::new("u6");
        for _ in 0..10 {
            let (reply, diags) = respond(&r, &macros, &mut user, "hi");
            assert!(["a", "b", "c"].contains(&reply.as_str()), "unexpected {reply:?}");
            assert!(diags.is_empty());
        }
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(6.0), "6");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
    }
}
