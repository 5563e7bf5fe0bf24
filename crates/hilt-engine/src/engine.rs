//! MiniJinja environment wiring
//!
//! Views are loaded lazily through a loader that resolves the name with the
//! shared [`ViewFinder`], expands directives, and keeps the compiled result
//! in the cache directory. Components are rendered by the `component` filter
//! and included views by the `include_view` function. Both apply view
//! composers before rendering the target view.
//!
//! The bundled error view is compiled with the built-in directives only and
//! never sees shared values or composers.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hilt_core::{CompiledCache, ViewFinder};
use indexmap::IndexMap;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, State, UndefinedBehavior, Value};
use once_cell::sync::Lazy;

use crate::compiler::DirectiveRegistry;
use crate::composer::{ComposerRegistry, ViewData};
use crate::error::TemplateError;

/// Name of the bundled diagnostic view
pub const ERROR_VIEW: &str = "hilt::error";

const ERROR_VIEW_SOURCE: &str = include_str!("../views/error.hilt.html");

static ERROR_VIEW_COMPILED: Lazy<String> =
    Lazy::new(|| DirectiveRegistry::new().compile(ERROR_VIEW_SOURCE));

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between a view service and the environments it creates
#[derive(Debug, Clone)]
pub(crate) struct EngineState {
    pub(crate) finder: Arc<RwLock<ViewFinder>>,
    pub(crate) directives: Arc<RwLock<DirectiveRegistry>>,
    pub(crate) composers: Arc<RwLock<ComposerRegistry>>,
    pub(crate) shared: Arc<RwLock<IndexMap<String, Value>>>,
    pub(crate) cache: CompiledCache,
}

impl EngineState {
    pub(crate) fn new(finder: ViewFinder, cache: CompiledCache) -> Self {
        Self {
            finder: Arc::new(RwLock::new(finder)),
            directives: Arc::new(RwLock::new(DirectiveRegistry::new())),
            composers: Arc::new(RwLock::new(ComposerRegistry::new())),
            shared: Arc::new(RwLock::new(IndexMap::new())),
            cache,
        }
    }

    /// Same registries, different search paths
    pub(crate) fn with_finder(&self, finder: ViewFinder) -> Self {
        Self {
            finder: Arc::new(RwLock::new(finder)),
            ..self.clone()
        }
    }

    /// Loader entry point: resolve, compile (or reuse the cache) and return source
    fn load_view(&self, name: &str) -> Result<Option<String>, Error> {
        if name == ERROR_VIEW {
            return Ok(Some(ERROR_VIEW_COMPILED.clone()));
        }

        let Some(path) = read(&self.finder).find(name) else {
            return Ok(None);
        };

        let directives = read(&self.directives);
        let fingerprint = directives.fingerprint();

        if let Some(compiled) = self.cache.load(&path, &fingerprint) {
            tracing::debug!("Using compiled view for {} ({})", name, path.display());
            return Ok(Some(compiled));
        }

        let source = std::fs::read_to_string(&path).map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read view {}", path.display()),
            )
            .with_source(e)
        })?;

        let compiled = directives.compile(&source);
        self.cache.store(&path, &fingerprint, &compiled).map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("could not write compiled view for {}", path.display()),
            )
            .with_source(e)
        })?;

        tracing::debug!("Compiled view {} from {}", name, path.display());
        Ok(Some(compiled))
    }

    /// Build the data for a view: shared values, then `merge_data`, then `data`
    pub(crate) fn view_data(
        &self,
        name: &str,
        data: &Value,
        merge_data: &Value,
    ) -> Result<ViewData, Error> {
        let mut view = ViewData::new(name);
        if name != ERROR_VIEW {
            view.extend(&read(&self.shared));
        }
        view.extend_from_value(merge_data)?;
        view.extend_from_value(data)?;
        Ok(view)
    }

    pub(crate) fn compose(&self, view: &mut ViewData) {
        if view.name() != ERROR_VIEW {
            read(&self.composers).compose(view);
        }
    }

    /// Compose `view` and render it inside the template being evaluated
    fn render_nested(&self, state: &State, mut view: ViewData) -> Result<Value, Error> {
        self.compose(&mut view);
        let rendered = state
            .env()
            .get_template(view.name())?
            .render(view.to_value())?;
        Ok(Value::from_safe_string(rendered))
    }

    fn render_component(
        &self,
        state: &State,
        slot: Value,
        name: &str,
        data: Option<Value>,
    ) -> Result<Value, Error> {
        let mut view = self.view_data(name, &data.unwrap_or(Value::UNDEFINED), &Value::UNDEFINED)?;
        view.with_value("slot", Value::from_safe_string(slot.to_string()));
        self.render_nested(state, view)
    }

    /// Render `name` with the including view's variables plus `data`
    fn render_include(&self, state: &State, name: &str, data: Option<Value>) -> Result<Value, Error> {
        let mut view = ViewData::new(name);
        let globals: IndexMap<&str, Value> = state.env().globals().collect();

        for var in state.known_variables() {
            if var == "loop" {
                continue;
            }
            let Some(value) = state.lookup(&var) else {
                continue;
            };
            if globals.get(&*var) == Some(&value) {
                continue;
            }
            view.with_value(var.into_owned(), value);
        }

        view.extend_from_value(&data.unwrap_or(Value::UNDEFINED))?;
        self.render_nested(state, view)
    }

    /// File and source of a view, for error reporting
    fn source_of(&self, name: &str) -> (Option<PathBuf>, String) {
        if name == ERROR_VIEW {
            return (None, ERROR_VIEW_SOURCE.to_string());
        }

        match read(&self.finder).find(name) {
            Some(path) => {
                let source = std::fs::read_to_string(&path).unwrap_or_default();
                (Some(path), source)
            }
            None => (None, String::new()),
        }
    }

    /// Map a MiniJinja failure to a source-mapped template error
    ///
    /// The error is attributed to the innermost view MiniJinja reports,
    /// falling back to the view being rendered.
    pub(crate) fn template_error(&self, err: Error, view: &str, data: &ViewData) -> TemplateError {
        let name = err.name().unwrap_or(view).to_string();
        let (path, source) = self.source_of(&name);
        let available: Vec<String> = data.keys().map(str::to_string).collect();
        TemplateError::from_minijinja(err, &name, path, &source, &available)
    }
}

/// Create a configured MiniJinja environment over `state`
pub(crate) fn create_environment(state: EngineState, strict_mode: bool) -> Environment<'static> {
    let mut env = Environment::new();

    if strict_mode {
        env.set_undefined_behavior(UndefinedBehavior::Strict);
    } else {
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
    }

    env.set_auto_escape_callback(|_| AutoEscape::Html);

    let loader = state.clone();
    env.set_loader(move |name| loader.load_view(name));

    let components = state.clone();
    env.add_filter(
        "component",
        move |env_state: &State, slot: Value, name: String, data: Option<Value>| {
            components.render_component(env_state, slot, &name, data)
        },
    );

    env.add_function(
        "include_view",
        move |env_state: &State, name: String, data: Option<Value>| {
            state.render_include(env_state, &name, data)
        },
    );

    env
}
