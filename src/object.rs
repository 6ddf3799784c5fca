//! Object macros.
//!
//! Reply bodies call out to host code with `<call>name arg1 arg2</call>`. The
//! engine resolves `name` against a [`MacroRegistry`]:
//!
//! ```text
//! <call>reverse <star></call>
//!        │
//!        ▼
//! MacroRegistry
//!   subroutines: name ─▶ Arc<dyn Subroutine>        native Rust code
//!   objects:     name ─▶ language                   from `> object` blocks
//!   handlers:    language ─▶ Arc<dyn MacroHandler>  guest-language bridge
//! ```
//!
//! Native subroutines win over objects of the same name. Any closure of the
//! right shape is a [`Subroutine`]:
//!
//! ```
//! use parley::{Engine, MacroCall, MacroError};
//!
//! let engine = Engine::new();
//! engine.set_subroutine("shout", |call: &mut MacroCall<'_>| -> Result<String, MacroError> {
//!     Ok(call.args.join(" ").to_uppercase())
//! });
//! ```
//!
//! Subroutines receive the caller's state by `&mut` and may change variables
//! (including `topic`); those writes are visible to the rest of the reply.

use crate::error::MacroError;
use crate::session::UserState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// One invocation of an object macro.
#[derive(Debug)]
pub struct MacroCall<'a> {
    pub name: &'a str,
    pub args: Vec<String>,
    pub user: &'a mut UserState,
    /// When set, the subroutine should give up (with
    /// [`MacroError::DeadlineExceeded`]) once this instant has passed. The
    /// engine does not enforce it.
    pub deadline: Option<Instant>,
}

impl MacroCall<'_> {
    /// Whether the deadline, if any, has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A native object macro.
pub trait Subroutine: Send + Sync {
    fn call(&self, call: &mut MacroCall<'_>) -> Result<String, MacroError>;
}

impl<F> Subroutine for F
where
    F: Fn(&mut MacroCall<'_>) -> Result<String, MacroError> + Send + Sync,
{
    fn call(&self, call: &mut MacroCall<'_>) -> Result<String, MacroError> {
        self(call)
    }
}

/// Bridge to a guest language that runs `> object NAME LANGUAGE` blocks.
pub trait MacroHandler: Send + Sync {
    /// Receive the source of one object at load time.
    fn load(&self, name: &str, code: &str) -> Result<(), MacroError>;

    /// Run a previously loaded object.
    fn call(&self, call: &mut MacroCall<'_>) -> Result<String, MacroError>;
}

/// Why a call did not produce text.
#[derive(Debug)]
pub(crate) enum CallFailure {
    Undefined,
    Failed(MacroError),
}

#[derive(Default, Clone)]
pub struct MacroRegistry {
    subroutines: HashMap<String, Arc<dyn Subroutine>>,
    handlers: HashMap<String, Arc<dyn MacroHandler>>,
    /// Object name to language, filled by `> object` blocks.
    objects: HashMap<String, String>,
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut subroutines: Vec<&String> = self.subroutines.keys().collect();
        subroutines.sort();
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("MacroRegistry")
            .field("subroutines", &subroutines)
            .field("handlers", &handlers)
            .field("objects", &self.objects)
            .finish()
    }
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subroutine(&mut self, name: impl Into<String>, subroutine: Arc<dyn Subroutine>) {
        self.subroutines.insert(name.into(), subroutine);
    }

    pub fn remove_subroutine(&mut self, name: &str) -> bool {
        self.subroutines.remove(name).is_some()
    }

    pub fn set_handler(&mut self, language: impl Into<String>, handler: Arc<dyn MacroHandler>) {
        self.handlers.insert(language.into(), handler);
    }

    pub fn has_handler(&self, language: &str) -> bool {
        self.handlers.contains_key(language)
    }

    /// Hand an object's code to its language handler.
    pub fn load_object(&mut self, name: &str, language: &str, code: &str) -> Result<(), MacroError> {
        let handler = self.handlers.get(language).ok_or_else(|| MacroError::NoHandler(language.to_string()))?;
        handler.load(name, code)?;
        self.objects.insert(name.to_string(), language.to_string());
        Ok(())
    }

    /// Whether `name` can be called.
    pub fn is_defined(&self, name: &str) -> bool {
        self.subroutines.contains_key(name) || self.objects.contains_key(name)
    }

    pub(crate) fn call(&self, call: &mut MacroCall<'_>) -> Result<String, CallFailure> {
        if let Some(subroutine) = self.subroutines.get(call.name) {
            return subroutine.call(call).map_err(CallFailure::Failed);
        }
        let handler = self
            .objects
            .get(call.name)
            .and_then(|language| self.handlers.get(language))
            .ok_or(CallFailure::Undefined)?;
        handler.call(call).map_err(CallFailure::Failed)
    }
}
