//! Per-user conversation state.
//!
//! Every user the engine talks to owns one [`UserState`]: a bag of string
//! variables (the current topic lives there too), the last nine inputs and the
//! last nine replies. States are handed out by a [`SessionStore`], which keys
//! them per user so that:
//!
//! - calls for different users never wait on each other, and
//! - calls for the same user are serialized for the whole turn (the engine
//!   holds that user's lock from matching to the history update).
//!
//! ```text
//! MemoryStore
//!   RwLock<HashMap<id, Arc<Mutex<UserState>>>>
//!       │ read lock only long enough to clone the Arc
//!       ▼
//!   Mutex<UserState>  ← held for one reply() turn
//! ```
//!
//! The store is a trait so a host can back it with something persistent; the
//! engine only relies on the contract documented on [`SessionStore`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Value reported for anything that was never set.
pub const UNDEFINED: &str = "undefined";

/// Number of inputs and replies remembered per user.
pub const HISTORY_DEPTH: usize = 9;

/// Topic every new user starts in.
pub const DEFAULT_TOPIC: &str = "random";

/// Writing this value through [`UserState::set`] deletes the variable.
pub const UNDEF_SENTINEL: &str = "<undef>";

pub(crate) const TOPIC_VAR: &str = "topic";
pub(crate) const LAST_MATCH_VAR: &str = "__lastmatch__";

/// Fixed-depth history, newest entry first.
///
/// Always holds exactly [`HISTORY_DEPTH`] entries; slots that have not been
/// filled yet read as [`UNDEFINED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    entries: VecDeque<String>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        History { entries: std::iter::repeat_n(UNDEFINED.to_string(), HISTORY_DEPTH).collect() }
    }

    /// Push `text` to the front, dropping the oldest entry.
    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push_front(text.into());
        self.entries.truncate(HISTORY_DEPTH);
    }

    /// Entry at a 1-based `index` (1 is the most recent).
    pub fn get(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.entries.get(index - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries newest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Everything the engine remembers about one user.
#[derive(Debug, Clone)]
pub struct UserState {
    id: String,
    vars: BTreeMap<String, String>,
    input: History,
    reply: History,
}

impl UserState {
    /// Create the state for a user seen for the first time.
    pub fn new(id: impl Into<String>) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(TOPIC_VAR.to_string(), DEFAULT_TOPIC.to_string());
        UserState { id: id.into(), vars, input: History::new(), reply: History::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read a variable; unset variables read as [`UNDEFINED`].
    pub fn get(&self, name: &str) -> &str {
        self.vars.get(name).map(String::as_str).unwrap_or(UNDEFINED)
    }

    /// Write a variable. Writing [`UNDEF_SENTINEL`] deletes it instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if value == UNDEF_SENTINEL {
            self.vars.remove(&name);
        } else {
            self.vars.insert(name, value);
        }
    }

    pub fn delete(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// The user's current topic, [`DEFAULT_TOPIC`] when unset.
    pub fn topic(&self) -> &str {
        self.vars.get(TOPIC_VAR).map(String::as_str).unwrap_or(DEFAULT_TOPIC)
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.vars.insert(TOPIC_VAR.to_string(), topic.into());
    }

    /// Raw pattern of the trigger matched by the last turn.
    pub fn last_match(&self) -> &str {
        self.get(LAST_MATCH_VAR)
    }

    /// One of the last nine inputs, `index` in `1..=9`.
    pub fn input(&self, index: usize) -> Option<&str> {
        self.input.get(index)
    }

    /// One of the last nine replies, `index` in `1..=9`.
    pub fn reply(&self, index: usize) -> Option<&str> {
        self.reply.get(index)
    }

    pub fn input_history(&self) -> &History {
        &self.input
    }

    pub fn reply_history(&self) -> &History {
        &self.reply
    }

    pub(crate) fn record_turn(&mut self, input: &str, reply: &str) {
        self.input.push(input);
        self.reply.push(reply);
    }
}

/// Storage for [`UserState`]s.
///
/// Contract relied on by the engine:
///
/// - `user` creates the state on first contact and returns the same slot for
///   the same id afterwards (states are never dropped implicitly);
/// - the returned slots are independent, so locking one user's state never
///   blocks another user.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// The slot for `id`, created if needed.
    fn user(&self, id: &str) -> Arc<Mutex<UserState>>;

    /// The slot for `id` if the user has been seen.
    fn existing(&self, id: &str) -> Option<Arc<Mutex<UserState>>>;

    /// Every known user id, sorted.
    fn user_ids(&self) -> BTreeSet<String>;
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, Arc<Mutex<UserState>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn user(&self, id: &str) -> Arc<Mutex<UserState>> {
        if let Some(slot) = self.existing(id) {
            return slot;
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        users.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(UserState::new(id)))).clone()
    }

    fn existing(&self, id: &str) -> Option<Arc<Mutex<UserState>>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    fn user_ids(&self) -> BTreeSet<String> {
        self.users.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }
}

/// Lock a user slot, recovering the state if a previous holder panicked.
pub(crate) fn lock_user(slot: &Mutex<UserState>) -> MutexGuard<'_, UserState> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
