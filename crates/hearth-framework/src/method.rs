//! Verbs, per-verb method definitions and the endpoint table.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseVerbError;
use crate::exchange::Exchange;
use crate::hooks::{FnHandler, Handler, HookFuture};

// =============================================================================
// Verb
// =============================================================================

/// HTTP verbs a route can bind handlers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
        Verb::Head,
        Verb::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ParseVerbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseVerbError(s.to_string()))
    }
}

// =============================================================================
// MethodDefinition
// =============================================================================

/// What a route does for one verb: an optional handler function plus
/// free-form attributes that hooks may inspect (for example an
/// `"auth_required"` flag read by a before-hook).
#[derive(Clone)]
pub struct MethodDefinition {
    verb: Verb,
    function: Option<Arc<dyn Handler>>,
    attributes: Map<String, Value>,
}

impl MethodDefinition {
    /// A definition with no handler; dispatching to it is rejected as
    /// method-not-allowed.
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            function: None,
            attributes: Map::new(),
        }
    }

    /// Binds an async closure as the handler.
    pub fn function<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a PathArgs) -> HookFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.handler(FnHandler(f))
    }

    /// Binds a [`Handler`] implementation.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.function = Some(Arc::new(handler));
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn handler_fn(&self) -> Option<&Arc<dyn Handler>> {
        self.function.as_ref()
    }

    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }

    pub fn get_attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("verb", &self.verb)
            .field("has_function", &self.has_function())
            .field("attributes", &self.attributes)
            .finish()
    }
}

// =============================================================================
// EndpointDefinition
// =============================================================================

/// Verb-to-definition table of a route.
#[derive(Debug, Clone, Default)]
pub struct EndpointDefinition {
    methods: HashMap<Verb, MethodDefinition>,
}

impl EndpointDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the definition for its verb.
    pub fn insert(&mut self, method: MethodDefinition) {
        self.methods.insert(method.verb(), method);
    }

    pub fn get(&self, verb: Verb) -> Option<&MethodDefinition> {
        self.methods.get(&verb)
    }

    /// Verbs with a bound handler, in [`Verb::ALL`] order.
    pub fn allowed(&self) -> Vec<Verb> {
        Verb::ALL
            .into_iter()
            .filter(|verb| self.get(*verb).is_some_and(MethodDefinition::has_function))
            .collect()
    }
}

// =============================================================================
// PathArgs
// =============================================================================

/// Arguments extracted from the request path by the surrounding router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl PathArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }
}
