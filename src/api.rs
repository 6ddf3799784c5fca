use crate::engine::{CompiledRules, Matched, ReplyMetrics, Resolver, category};
use crate::error::{Abort, ConfigError, Diagnostic, LoadError};
use crate::object::{MacroHandler, MacroRegistry, Subroutine};
use crate::session::{History, LAST_MATCH_VAR, MemoryStore, SessionStore, UNDEFINED, lock_user};
use crate::source::{RuleSource, SourceParser};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

/// Engine configuration.
///
/// Every field has a default, so a TOML document only needs the keys it
/// changes:
///
/// ```
/// let options = parley::Options::from_toml_str(r#"
///     max_depth = 10
///     no_match_reply = "Hmm?"
///
///     [substitutions]
///     "what's" = "what is"
/// "#).unwrap();
/// assert_eq!(options.max_depth, 10);
/// assert_eq!(options.deep_recursion_reply, "ERR: Deep Recursion Detected");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Maximum redirect depth before a turn is aborted.
    pub max_depth: usize,
    /// Reply when no trigger matches.
    pub no_match_reply: String,
    /// Reply when the matched trigger has nothing to say.
    pub no_reply_found: String,
    /// Reply when `max_depth` is exceeded.
    pub deep_recursion_reply: String,
    /// Regex of characters stripped from input words.
    pub punctuation: String,
    /// Word substitutions applied on top of `! sub` definitions.
    pub substitutions: BTreeMap<String, String>,
    /// Deadline handed to object macros, in milliseconds.
    pub macro_timeout_ms: Option<u64>,
    /// Seed for reply selection; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// File extensions picked up by `load_directory`.
    pub extensions: Vec<String>,
    /// Unknown commands in rule text are errors instead of warnings.
    pub strict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_depth: 50,
            no_match_reply: "ERR: No Reply Matched".to_string(),
            no_reply_found: "ERR: No Reply Found".to_string(),
            deep_recursion_reply: "ERR: Deep Recursion Detected".to_string(),
            punctuation: crate::engine::DEFAULT_PUNCTUATION.to_string(),
            substitutions: BTreeMap::new(),
            macro_timeout_ms: None,
            seed: None,
            extensions: vec!["rive".to_string()],
            strict: false,
        }
    }
}

impl Options {
    /// Parse options from TOML and validate them.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: Options = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        regex::Regex::new(&self.punctuation)?;
        Ok(())
    }
}

/// Read-only view of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSummary {
    pub pattern: String,
    /// Topic that declared the trigger.
    pub topic: String,
    pub previous: Option<String>,
    pub replies: Vec<String>,
    pub conditions: Vec<String>,
    pub redirect: Option<String>,
    pub weight: u32,
    /// Sort category: 0 literal, 1 wildcard, 2 optional, 3 catch-all.
    pub category: u8,
}

/// Read-only view of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub name: String,
    pub includes: Vec<String>,
    pub inherits: Vec<String>,
    /// Own triggers in declaration order.
    pub triggers: Vec<TriggerSummary>,
}

/// Additional details returned by [`Engine::reply_verbose`].
#[derive(Debug, Clone)]
pub struct ReplyDetails {
    /// User's topic after the turn.
    pub topic: String,
    /// Trigger that answered the message itself (not a redirect target).
    pub matched: Option<Matched>,
    /// Redirect targets followed, in order.
    pub redirects: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// The turn ended on the redirect depth guard.
    pub aborted: bool,
    pub metrics: ReplyMetrics,
}

/// Result from [`Engine::reply_verbose`].
#[derive(Debug, Clone)]
pub struct ReplyVerbose {
    pub message: String,
    pub reply: String,
    pub elapsed: Duration,
    pub details: ReplyDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    File(PathBuf),
    Inline(String),
}

#[derive(Debug, Clone)]
struct LoadedSource {
    origin: Origin,
    parsed: RuleSource,
}

/// The reply engine.
///
/// One engine serves many users from many threads: replies run against an
/// immutable rule snapshot and only lock the state of the user they answer.
///
/// # Example
/// ```
/// use parley::Engine;
///
/// let engine = Engine::new();
/// engine
///     .load_str("greetings", &parley::rive![
///         "+ hello bot",
///         "- Hello, human!",
///     ])
///     .unwrap();
///
/// assert_eq!(engine.reply("alice", "Hello, bot!"), "Hello, human!");
/// assert_eq!(engine.last_match("alice").as_deref(), Some("hello bot"));
/// ```
pub struct Engine {
    options: Options,
    rules: RwLock<Arc<CompiledRules>>,
    sources: Mutex<Vec<LoadedSource>>,
    macros: RwLock<Arc<MacroRegistry>>,
    sessions: Arc<dyn SessionStore>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("sources", &self.source_names())
            .field("macros", &*read(&self.macros))
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with default options and in-memory sessions.
    pub fn new() -> Self {
        Self::assemble(Options::default(), CompiledRules::default(), Arc::new(MemoryStore::new()))
    }

    pub fn with_options(options: Options) -> Result<Self, ConfigError> {
        Self::with_store(options, Arc::new(MemoryStore::new()))
    }

    /// Engine backed by a caller-provided session store.
    pub fn with_store(options: Options, sessions: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
        options.validate()?;
        let rules = CompiledRules::empty(&options)?;
        Ok(Self::assemble(options, rules, sessions))
    }

    fn assemble(options: Options, rules: CompiledRules, sessions: Arc<dyn SessionStore>) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Engine {
            options,
            rules: RwLock::new(Arc::new(rules)),
            sources: Mutex::new(Vec::new()),
            macros: RwLock::new(Arc::new(MacroRegistry::new())),
            sessions,
            rng: Mutex::new(rng),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn parser(&self) -> SourceParser {
        SourceParser::new(self.options.strict)
    }

    // --- Loading -----------------------------------------------------------

    /// Load rule text; `name` identifies it in errors.
    pub fn load_str(&self, name: &str, text: &str) -> Result<(), LoadError> {
        let parsed = self.parser().parse(name, text)?;
        self.add_sources(vec![LoadedSource { origin: Origin::Inline(name.to_string()), parsed }])
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let source = self.read_file(path.as_ref())?;
        self.add_sources(vec![source])
    }

    /// Load every file in `dir` whose extension is in `Options::extensions`,
    /// in path order. Returns how many files were loaded.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Result<usize, LoadError> {
        let dir = dir.as_ref();
        let io = |source| LoadError::Io { path: dir.to_path_buf(), source };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            let wanted = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.options.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
            if wanted && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let sources = paths.iter().map(|p| self.read_file(p)).collect::<Result<Vec<_>, _>>()?;
        let count = sources.len();
        self.add_sources(sources)?;
        Ok(count)
    }

    /// Re-read every file-backed source and rebuild the rules. Inline sources
    /// are kept as they are. On error the current rules stay in place.
    pub fn reload(&self) -> Result<(), LoadError> {
        let mut sources = lock(&self.sources);
        let mut fresh = Vec::with_capacity(sources.len());
        for source in sources.iter() {
            match &source.origin {
                Origin::File(path) => fresh.push(self.read_file(path)?),
                Origin::Inline(_) => fresh.push(source.clone()),
            }
        }

        let parsed: Vec<RuleSource> = fresh.iter().map(|s| s.parsed.clone()).collect();
        let compiled = CompiledRules::build(&parsed, &self.options)?;
        self.load_objects(&fresh)?;
        *sources = fresh;
        self.publish(compiled);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<LoadedSource, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        let parsed = self.parser().parse(&path.display().to_string(), &text)?;
        Ok(LoadedSource { origin: Origin::File(path.to_path_buf()), parsed })
    }

    fn add_sources(&self, new: Vec<LoadedSource>) -> Result<(), LoadError> {
        let mut sources = lock(&self.sources);
        let parsed: Vec<RuleSource> = sources.iter().chain(new.iter()).map(|s| s.parsed.clone()).collect();
        let compiled = CompiledRules::build(&parsed, &self.options)?;
        self.load_objects(&new)?;
        sources.extend(new);
        self.publish(compiled);
        Ok(())
    }

    fn load_objects(&self, sources: &[LoadedSource]) -> Result<(), LoadError> {
        let objects: Vec<_> = sources.iter().flat_map(|s| s.parsed.objects.iter()).collect();
        if objects.is_empty() {
            return Ok(());
        }

        let mut slot = write(&self.macros);
        let registry = Arc::make_mut(&mut slot);
        for object in objects {
            if !registry.has_handler(&object.language) {
                tracing::warn!(object = %object.name, language = %object.language, "no handler for object language; skipping");
                continue;
            }
            registry.load_object(&object.name, &object.language, &object.code).map_err(|source| LoadError::Object {
                name: object.name.clone(),
                language: object.language.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn publish(&self, compiled: CompiledRules) {
        *write(&self.rules) = Arc::new(compiled);
    }

    fn snapshot(&self) -> Arc<CompiledRules> {
        read(&self.rules).clone()
    }

    /// Origins of every loaded source, in load order.
    pub fn source_names(&self) -> Vec<String> {
        lock(&self.sources)
            .iter()
            .map(|s| match &s.origin {
                Origin::File(path) => path.display().to_string(),
                Origin::Inline(name) => name.clone(),
            })
            .collect()
    }

    // --- Replying ----------------------------------------------------------

    /// Reply to `message` from `user`.
    pub fn reply(&self, user: &str, message: &str) -> String {
        self.reply_verbose(user, message).reply
    }

    /// Reply and return what happened along the way.
    pub fn reply_verbose(&self, user: &str, message: &str) -> ReplyVerbose {
        let rules = self.snapshot();
        let macros = read(&self.macros).clone();
        let rng = StdRng::seed_from_u64(lock(&self.rng).next_u64());

        let slot = self.sessions.user(user);
        let mut state = lock_user(&slot);

        let mut resolver = Resolver::new(&rules, &macros, &self.options, rng);
        let (reply, aborted) = match resolver.respond(&mut state, message) {
            Ok(reply) => (reply, false),
            Err(Abort::DeepRecursion(depth)) => {
                tracing::warn!(user, message, depth, "redirect depth exceeded");
                (self.options.deep_recursion_reply.clone(), true)
            }
        };

        match &resolver.matched {
            Some(matched) => state.set(LAST_MATCH_VAR, matched.pattern.as_str()),
            None => state.delete(LAST_MATCH_VAR),
        }
        state.record_turn(message, &reply);

        tracing::debug!(user, message, reply = %reply, "reply");
        let metrics = resolver.metrics;
        ReplyVerbose {
            message: message.to_string(),
            reply,
            elapsed: metrics.total,
            details: ReplyDetails {
                topic: state.topic().to_string(),
                matched: resolver.matched,
                redirects: resolver.redirects,
                diagnostics: resolver.diagnostics,
                aborted,
                metrics,
            },
        }
    }

    // --- Macros ------------------------------------------------------------

    pub fn set_subroutine(&self, name: &str, subroutine: impl Subroutine + 'static) {
        Arc::make_mut(&mut write(&self.macros)).set_subroutine(name, Arc::new(subroutine));
    }

    pub fn remove_subroutine(&self, name: &str) -> bool {
        Arc::make_mut(&mut write(&self.macros)).remove_subroutine(name)
    }

    /// Register the handler for `> object NAME language` blocks. Objects are
    /// handed over as sources load, so register handlers first.
    pub fn set_handler(&self, language: &str, handler: impl MacroHandler + 'static) {
        Arc::make_mut(&mut write(&self.macros)).set_handler(language.to_lowercase(), Arc::new(handler));
    }

    // --- User variables ----------------------------------------------------

    /// A user variable; `undefined` when unset or for an unknown user.
    pub fn uservar(&self, user: &str, name: &str) -> String {
        match self.sessions.existing(user) {
            Some(slot) => lock_user(&slot).get(name).to_string(),
            None => UNDEFINED.to_string(),
        }
    }

    /// All variables of a known user.
    pub fn uservars(&self, user: &str) -> Option<BTreeMap<String, String>> {
        self.sessions.existing(user).map(|slot| lock_user(&slot).vars().clone())
    }

    /// Set a user variable, creating the user if needed. `<undef>` deletes.
    pub fn set_uservar(&self, user: &str, name: &str, value: &str) {
        lock_user(&self.sessions.user(user)).set(name, value);
    }

    /// Set several variables at once.
    pub fn set_uservars<I, K, V>(&self, user: &str, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let slot = self.sessions.user(user);
        let mut state = lock_user(&slot);
        for (name, value) in vars {
            state.set(name, value);
        }
    }

    /// Input and reply history of a known user, newest first.
    pub fn history(&self, user: &str) -> Option<(History, History)> {
        let slot = self.sessions.existing(user)?;
        let state = lock_user(&slot);
        Some((state.input_history().clone(), state.reply_history().clone()))
    }

    /// Raw pattern of the trigger that answered `user`'s last message.
    pub fn last_match(&self, user: &str) -> Option<String> {
        let slot = self.sessions.existing(user)?;
        let state = lock_user(&slot);
        match state.last_match() {
            UNDEFINED => None,
            pattern => Some(pattern.to_string()),
        }
    }

    pub fn users(&self) -> BTreeSet<String> {
        self.sessions.user_ids()
    }

    // --- Introspection -----------------------------------------------------

    pub fn topics(&self) -> Vec<TopicSummary> {
        let rules = self.snapshot();
        let graph = rules.graph();
        graph
            .topics()
            .map(|(_, topic)| TopicSummary {
                name: topic.name().to_string(),
                includes: topic.includes().iter().map(|&id| graph.topic(id).name().to_string()).collect(),
                inherits: topic.inherits().iter().map(|&id| graph.topic(id).name().to_string()).collect(),
                triggers: topic.triggers().iter().map(|&id| summarize(&rules, id)).collect(),
            })
            .collect()
    }

    /// Triggers of `topic` in match order, `None` for an unknown topic.
    pub fn sorted_triggers(&self, topic: &str) -> Option<Vec<TriggerSummary>> {
        let rules = self.snapshot();
        let sorted = rules.sorted(topic)?;
        Some(sorted.iter().map(|entry| summarize(&rules, entry.trigger)).collect())
    }

    /// Version declared by `! version`, if any.
    pub fn version(&self) -> Option<String> {
        self.snapshot().version().map(str::to_string)
    }
}

fn summarize(rules: &CompiledRules, id: crate::engine::TriggerId) -> TriggerSummary {
    let graph = rules.graph();
    let trigger = graph.trigger(id);
    TriggerSummary {
        pattern: trigger.pattern.raw().to_string(),
        topic: graph.topic(trigger.topic()).name().to_string(),
        previous: trigger.previous.as_ref().map(|p| p.raw().to_string()),
        replies: trigger.replies.iter().map(|r| r.source().to_string()).collect(),
        conditions: trigger.conditions.iter().map(|c| c.source().to_string()).collect(),
        redirect: trigger.redirect.as_ref().map(|r| r.source().to_string()),
        weight: trigger.pattern.weight(),
        category: category(&trigger.pattern),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MacroCall;
    use std::io::Write;

    fn engine(text: &str) -> Engine {
        let engine = Engine::with_options(Options { seed: Some(1), ..Options::default() }).unwrap();
        engine.load_str("test", text).unwrap();
        engine
    }

    #[test]
    fn options_from_toml() {
        let options = Options::from_toml_str("max_depth = 5\nseed = 42\nextensions = [\"rive\", \"rs\"]").unwrap();
        assert_eq!(options.max_depth, 5);
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.extensions.len(), 2);
        assert_eq!(options.no_match_reply, "ERR: No Reply Matched");

        assert!(matches!(Options::from_toml_str("max_depth = \"x\""), Err(ConfigError::Toml(_))));
        assert!(matches!(Options::from_toml_str("bogus = 1"), Err(ConfigError::Toml(_))));
        assert!(matches!(Options::from_toml_str("punctuation = \"[\""), Err(ConfigError::Punctuation(_))));
    }

    #[test]
    fn reply_records_history_and_last_match() {
        let e = engine("+ hello\n- Hi!");
        assert_eq!(e.reply("u", "hello"), "Hi!");
        assert_eq!(e.last_match("u").as_deref(), Some("hello"));
        assert_eq!(e.reply("u", "nothing here"), "ERR: No Reply Matched");
        assert_eq!(e.last_match("u"), None);
        assert_eq!(e.uservar("u", "topic"), "random");
        assert_eq!(e.users().into_iter().collect::<Vec<_>>(), vec!["u".to_string()]);
    }

    #[test]
    fn verbose_reports_redirects_and_metrics() {
        let e = engine("+ hi\n@ hello\n+ hello\n- Hello!");
        let out = e.reply_verbose("u", "hi");
        assert_eq!(out.reply, "Hello!");
        assert_eq!(out.details.matched.as_ref().map(|m| m.pattern.as_str()), Some("hi"));
        assert_eq!(out.details.redirects, vec!["hello".to_string()]);
        assert_eq!(out.details.metrics.steps.len(), 2);
        assert_eq!(out.details.metrics.steps[1].depth, 1);
        assert!(!out.details.aborted);
        assert_eq!(out.elapsed, out.details.metrics.total);
    }

    #[test]
    fn failed_load_keeps_published_rules() {
        let e = engine("+ hello\n- Hi!");
        assert!(e.load_str("bad", "+ oops (\n- x").is_err());
        assert_eq!(e.reply("u", "hello"), "Hi!");
        assert_eq!(e.source_names(), vec!["test".to_string()]);
    }

    #[test]
    fn later_sources_extend_earlier_ones() {
        let e = engine("+ hello\n- Hi!");
        e.load_str("more", "+ bye\n- Bye!").unwrap();
        assert_eq!(e.reply("u", "bye"), "Bye!");
        assert_eq!(e.reply("u", "hello"), "Hi!");
    }

    #[test]
    fn user_variable_api() {
        let e = engine("+ what is my name\n- <get name>");
        e.set_uservar("u", "name", "Aiden");
        assert_eq!(e.reply("u", "what is my name"), "Aiden");

        e.set_uservars("u", [("name", "Bea"), ("age", "30")]);
        let vars = e.uservars("u").unwrap();
        assert_eq!(vars.get("age").map(String::as_str), Some("30"));
        assert_eq!(e.uservar("u", "name"), "Bea");
        e.set_uservar("u", "age", "<undef>");
        assert_eq!(e.uservar("u", "age"), "undefined");
        assert_eq!(e.uservar("ghost", "name"), "undefined");
        assert!(e.uservars("ghost").is_none());
    }

    #[test]
    fn subroutines_and_introspection() {
        let e = engine(&crate::rive![
            "+ shout *",
            "- <call>shout <star></call>",
            "> topic sports includes games inherits random",
            "+ score",
            "- 2-1",
            "< topic",
        ]);
        e.set_subroutine("shout", |call: &mut MacroCall<'_>| -> Result<String, crate::MacroError> {
            Ok(call.args.join(" ").to_uppercase())
        });
        assert_eq!(e.reply("u", "shout hi there"), "HI THERE");
        assert!(e.remove_subroutine("shout"));
        assert_eq!(e.reply("u", "shout hi"), "");

        let topics = e.topics();
        let sports = topics.iter().find(|t| t.name == "sports").unwrap();
        assert_eq!(sports.includes, vec!["games".to_string()]);
        assert_eq!(sports.inherits, vec!["random".to_string()]);
        assert_eq!(sports.triggers[0].replies, vec!["2-1".to_string()]);

        let sorted = e.sorted_triggers("sports").unwrap();
        let patterns: Vec<&str> = sorted.iter().map(|t| t.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["score", "shout *"]);
        assert_eq!(sorted[1].topic, "random");
        assert!(e.sorted_triggers("nope").is_none());
    }

    #[test]
    fn files_directories_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rive");
        std::fs::write(&path, "+ hello\n- First.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "+ ignored\n- x").unwrap();
        std::fs::write(dir.path().join("b.rive"), "+ bye\n- Bye.").unwrap();

        let e = Engine::new();
        assert_eq!(e.load_directory(dir.path()).unwrap(), 2);
        assert_eq!(e.reply("u", "hello"), "First.");
        assert_eq!(e.reply("u", "ignored"), "ERR: No Reply Matched");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "+ hello\n- Second.").unwrap();
        e.reload().unwrap();
        assert_eq!(e.reply("u", "hello"), "Second.");

        assert!(matches!(e.load_file(dir.path().join("missing.rive")), Err(LoadError::Io { .. })));
    }

    #[test]
    fn concurrent_turns_for_one_user_are_serialized() {
        const THREADS: usize = 8;
        const TURNS: usize = 25;
        let e = Arc::new(engine("+ count\n- <add n=1>ok"));

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let e = Arc::clone(&e);
                scope.spawn(move || {
                    for _ in 0..TURNS {
                        assert_eq!(e.reply("shared", "count"), "ok");
                    }
                });
            }
        });

        assert_eq!(e.uservar("shared", "n"), (THREADS * TURNS).to_string());
        let (inputs, replies) = e.history("shared").unwrap();
        assert_eq!(inputs.len(), 9);
        assert!(replies.iter().all(|r| r == "ok"));
    }

    #[test]
    fn concurrent_users_keep_separate_histories() {
        let e = Arc::new(engine("+ echo *\n- said <star>"));
        let users: Vec<String> = (0..6).map(|i| format!("user{i}")).collect();

        std::thread::scope(|scope| {
            for user in &users {
                let e = Arc::clone(&e);
                scope.spawn(move || {
                    for turn in 0..12 {
                        e.reply(user, &format!("echo {user} {turn}"));
                    }
                });
            }
        });

        assert!(e.history("nobody").is_none());
        for user in &users {
            let (inputs, replies) = e.history(user).unwrap();
            assert_eq!(inputs.len(), 9);
            assert_eq!(replies.len(), 9);
            assert_eq!(inputs.get(1), Some(format!("echo {user} 11").as_str()));
            assert_eq!(inputs.get(9), Some(format!("echo {user} 3").as_str()));
            assert_eq!(replies.get(1), Some(format!("said {user} 11").as_str()));
            assert!(inputs.iter().all(|m| m.starts_with(&format!("echo {user} "))));
        }
        assert_eq!(e.users().len(), users.len());
    }
}
