//! View composers
//!
//! A composer is a callback bound to one or more view names (or `*` glob
//! patterns) that runs right before a matching view renders. It receives the
//! view's data and may add to or override it:
//!
//! ```rust,ignore
//! service.register_component("profile.*", |view: &mut ViewData| {
//!     view.with("user", current_user());
//! })?;
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use minijinja::value::{Value, ValueKind};
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Callback run before a matching view renders
pub type ComposerCallback = Arc<dyn Fn(&mut ViewData) + Send + Sync>;

/// Handle returned for each pattern bound by a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComposerId(u64);

/// One or more view names or patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPatterns(Vec<String>);

impl ViewPatterns {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for ViewPatterns {
    fn from(pattern: &str) -> Self {
        Self(vec![pattern.to_string()])
    }
}

impl From<String> for ViewPatterns {
    fn from(pattern: String) -> Self {
        Self(vec![pattern])
    }
}

impl From<Vec<String>> for ViewPatterns {
    fn from(patterns: Vec<String>) -> Self {
        Self(patterns)
    }
}

impl From<Vec<&str>> for ViewPatterns {
    fn from(patterns: Vec<&str>) -> Self {
        Self(patterns.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ViewPatterns {
    fn from(patterns: [&str; N]) -> Self {
        Self(patterns.iter().map(|p| p.to_string()).collect())
    }
}

/// Data handed to a view, as seen by composers
#[derive(Debug, Clone, Default)]
pub struct ViewData {
    name: String,
    values: IndexMap<String, Value>,
}

impl ViewData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: IndexMap::new(),
        }
    }

    /// Name of the view being rendered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a value, replacing any previous one under `key`
    pub fn with(&mut self, key: impl Into<String>, value: impl Serialize) -> &mut Self {
        self.values.insert(key.into(), Value::from_serialize(&value));
        self
    }

    /// Set an already converted template value
    pub fn with_value(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Copy every entry of a map value into this data, overriding clashes
    ///
    /// `undefined` and `none` count as an empty map.
    pub fn extend_from_value(&mut self, value: &Value) -> std::result::Result<(), minijinja::Error> {
        if value.is_undefined() || value.is_none() {
            return Ok(());
        }

        if value.kind() != ValueKind::Map {
            return Err(minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("view data must be a map, got {}", value.kind()),
            ));
        }

        for key in value.try_iter()? {
            let item = value.get_item(&key)?;
            let key = match key.as_str() {
                Some(s) => s.to_string(),
                None => key.to_string(),
            };
            self.values.insert(key, item);
        }

        Ok(())
    }

    /// Copy entries from another map, overriding clashes
    pub fn extend(&mut self, values: &IndexMap<String, Value>) {
        for (key, value) in values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// The render context for this data
    pub fn to_value(&self) -> Value {
        Value::from_serialize(&self.values)
    }
}

struct Binding {
    id: ComposerId,
    pattern: glob::Pattern,
    callback: ComposerCallback,
}

/// Ordered set of composer bindings
#[derive(Default)]
pub struct ComposerRegistry {
    bindings: Vec<Binding>,
    next_id: u64,
}

impl fmt::Debug for ComposerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposerRegistry")
            .field(
                "patterns",
                &self.bindings.iter().map(|b| b.pattern.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ComposerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` to every pattern, returning one handle per pattern
    pub fn register<F>(&mut self, views: ViewPatterns, callback: F) -> Result<Vec<ComposerId>>
    where
        F: Fn(&mut ViewData) + Send + Sync + 'static,
    {
        let patterns = views
            .iter()
            .map(|view| {
                glob::Pattern::new(view).map_err(|e| EngineError::InvalidPattern {
                    pattern: view.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let callback: ComposerCallback = Arc::new(callback);
        let ids = patterns
            .into_iter()
            .map(|pattern| {
                self.next_id += 1;
                let id = ComposerId(self.next_id);
                self.bindings.push(Binding {
                    id,
                    pattern,
                    callback: Arc::clone(&callback),
                });
                id
            })
            .collect();

        Ok(ids)
    }

    /// Remove a binding, returning whether it existed
    pub fn forget(&mut self, id: ComposerId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.id != id);
        before != self.bindings.len()
    }

    /// Run every composer bound to `data.name()`, in registration order
    pub fn compose(&self, data: &mut ViewData) {
        let name = data.name().to_string();
        for binding in self.bindings.iter().filter(|b| b.pattern.matches(&name)) {
            (binding.callback)(data);
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
