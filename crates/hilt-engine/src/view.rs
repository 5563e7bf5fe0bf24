//! Resolved views ready to render

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use minijinja::{Environment, Value};
use serde::Serialize;

use crate::composer::ViewData;
use crate::engine::{ERROR_VIEW, EngineState, read};
use crate::error::{EngineError, Result};
use crate::suggestions::suggest_view_name;

/// A view whose name resolved to a file, with its data
///
/// Composers run when [`render`](View::render) is called, so values they
/// set win over the data given here.
#[derive(Debug)]
pub struct View<'a> {
    name: String,
    path: Option<PathBuf>,
    data: ViewData,
    state: EngineState,
    env: Cow<'a, Environment<'static>>,
}

impl<'a> View<'a> {
    pub(crate) fn resolve(
        name: &str,
        state: EngineState,
        env: Cow<'a, Environment<'static>>,
        data: &Value,
        merge_data: &Value,
    ) -> Result<Self> {
        let path = if name == ERROR_VIEW {
            None
        } else {
            let finder = read(&state.finder);
            match finder.find(name) {
                Some(path) => Some(path),
                None => {
                    return Err(EngineError::ViewNotFound {
                        name: name.to_string(),
                        searched: finder.searched_locations(name),
                        suggestion: suggest_view_name(name, &finder.available_views()),
                    });
                }
            }
        };

        let data = state
            .view_data(name, data, merge_data)
            .map_err(|e| EngineError::InvalidData {
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            path,
            data,
            state,
            env,
        })
    }

    /// Add a value to the view's data
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.data.with(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the view resolved to (`None` for the bundled error view)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn data(&self) -> &ViewData {
        &self.data
    }

    /// Run the view's composers and render it
    pub fn render(&self) -> Result<String> {
        let mut data = self.data.clone();
        self.state.compose(&mut data);

        let template = self
            .env
            .get_template(&self.name)
            .map_err(|e| self.state.template_error(e, &self.name, &data))?;

        let rendered = template
            .render(data.to_value())
            .map_err(|e| self.state.template_error(e, &self.name, &data))?;

        Ok(rendered)
    }
}
