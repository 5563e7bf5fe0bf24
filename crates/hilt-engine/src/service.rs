//! The view service: search paths, cache directory and MiniJinja environment

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use hilt_core::{
    CacheDir, CompiledCache, CoreError, DEFAULT_CACHE_MODE, ServiceConfig, ViewFinder, ViewPaths,
};
use minijinja::{Environment, Value};
use serde::Serialize;

use crate::composer::{ComposerId, ViewData, ViewPatterns};
use crate::engine::{EngineState, create_environment, read, write};
use crate::error::Result;
use crate::error_page::{ErrorPage, Traceable};
use crate::view::View;

/// View service builder
#[derive(Debug, Clone)]
pub struct ViewServiceBuilder {
    view_paths: Vec<PathBuf>,
    cache_path: Option<PathBuf>,
    file_extensions: Vec<String>,
    cache_mode: u32,
    strict_mode: bool,
}

impl Default for ViewServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewServiceBuilder {
    pub fn new() -> Self {
        Self {
            view_paths: Vec::new(),
            cache_path: None,
            file_extensions: Vec::new(),
            cache_mode: DEFAULT_CACHE_MODE,
            strict_mode: true,
        }
    }

    /// Append a search path
    pub fn view_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.view_paths.push(path.into());
        self
    }

    /// Append several search paths, keeping their order
    pub fn view_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.view_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Recognised extensions, tried in order (defaults to `hilt.html`)
    pub fn file_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Permissions for a cache directory that has to be created
    pub fn cache_mode(mut self, mode: u32) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Build the service
    pub fn build(self) -> Result<ViewService> {
        if self.view_paths.is_empty() {
            return Err(CoreError::EmptyViewPaths.into());
        }

        let cache_dir = CacheDir::resolve(self.cache_path.as_deref(), self.cache_mode)?;
        tracing::debug!("Using cache directory {}", cache_dir.path().display());

        let finder = ViewFinder::new(ViewPaths::new(self.view_paths), self.file_extensions);
        let state = EngineState::new(finder, CompiledCache::new(&cache_dir));
        let env = create_environment(state.clone(), self.strict_mode);

        Ok(ViewService {
            env,
            state,
            cache_dir,
            strict_mode: self.strict_mode,
        })
    }
}

/// Renders named views from an ordered list of search paths
///
/// Views are MiniJinja templates extended with `@directives`. Compiled views
/// are kept in the cache directory and recompiled when the source changes or
/// the set of directives does.
#[derive(Debug)]
pub struct ViewService {
    env: Environment<'static>,
    state: EngineState,
    cache_dir: CacheDir,
    strict_mode: bool,
}

impl ViewService {
    /// Create a service over `view_paths`
    ///
    /// Fails when `view_paths` is empty or the cache directory cannot be
    /// created or written to. Without `cache_path` a directory under the
    /// system temp dir is used, and the process-wide override wins over both.
    pub fn new<I, P>(
        view_paths: I,
        cache_path: Option<&Path>,
        file_extensions: Option<Vec<String>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut builder = Self::builder().view_paths(view_paths);
        if let Some(path) = cache_path {
            builder = builder.cache_path(path);
        }
        if let Some(extensions) = file_extensions {
            builder = builder.file_extensions(extensions);
        }
        builder.build()
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .view_paths(config.view_paths.iter().cloned())
            .file_extensions(config.file_extensions.iter().cloned())
            .cache_mode(config.cache_mode);
        if let Some(path) = &config.cache_path {
            builder = builder.cache_path(path);
        }
        builder.build()
    }

    pub fn builder() -> ViewServiceBuilder {
        ViewServiceBuilder::new()
    }

    /// Resolve `name` and prepare it for rendering
    ///
    /// `data` wins over `merge_data` on key clashes, and both win over
    /// shared values.
    pub fn make_view(
        &self,
        name: &str,
        data: impl Serialize,
        merge_data: impl Serialize,
    ) -> Result<View<'_>> {
        View::resolve(
            name,
            self.state.clone(),
            Cow::Borrowed(&self.env),
            &Value::from_serialize(&data),
            &Value::from_serialize(&merge_data),
        )
    }

    /// Like [`make_view`](Self::make_view) with extra search paths for this call only
    ///
    /// Each of `extra_paths` is prepended in turn, so they take precedence
    /// over the stored paths and the last one wins. They are not kept: a later
    /// call without them will not see views that only they provide.
    pub fn make_view_with_paths<I, P>(
        &self,
        name: &str,
        data: impl Serialize,
        merge_data: impl Serialize,
        extra_paths: I,
    ) -> Result<View<'static>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let finder = read(&self.state.finder).with_prepended(extra_paths);
        let state = self.state.with_finder(finder);
        let env = create_environment(state.clone(), self.strict_mode);

        View::resolve(
            name,
            state,
            Cow::Owned(env),
            &Value::from_serialize(&data),
            &Value::from_serialize(&merge_data),
        )
    }

    /// Render `name` with `data`
    pub fn render(&self, name: &str, data: impl Serialize) -> Result<String> {
        self.make_view(name, data, ())?.render()
    }

    /// Whether `name` resolves in the current search paths
    pub fn exists(&self, name: &str) -> bool {
        read(&self.state.finder).find(name).is_some()
    }

    /// Install or replace a directive
    ///
    /// The handler receives the text between the directive's parentheses and
    /// returns the template source to put in its place.
    pub fn register_directive<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        write(&self.state.directives).register(name, handler);
        self.env.clear_templates();
        tracing::debug!("Registered directive @{}", name);
    }

    /// Make `@alias(data) ... @endalias` render the `component` view
    pub fn register_component_directive(&mut self, component: &str, alias: &str) {
        write(&self.state.directives).register_component(component, alias);
        self.env.clear_templates();
        tracing::debug!("Registered component directive @{} for {}", alias, component);
    }

    /// Bind a view composer to one or more view names or patterns
    pub fn register_component<F>(
        &mut self,
        views: impl Into<ViewPatterns>,
        callback: F,
    ) -> Result<Vec<ComposerId>>
    where
        F: Fn(&mut ViewData) + Send + Sync + 'static,
    {
        write(&self.state.composers).register(views.into(), callback)
    }

    /// Remove a composer binding, returning whether it existed
    pub fn forget_component(&mut self, id: ComposerId) -> bool {
        write(&self.state.composers).forget(id)
    }

    /// Add a search path at the front (`prepend`) or at the end of the list
    pub fn add_view_path(&mut self, path: impl Into<PathBuf>, prepend: bool) {
        let path = path.into();
        {
            let mut finder = write(&self.state.finder);
            if prepend {
                finder.prepend_location(&path);
            } else {
                finder.add_location(&path);
            }
        }
        self.env.clear_templates();
        tracing::debug!(
            "Added view path {} ({})",
            path.display(),
            if prepend { "prepended" } else { "appended" }
        );
    }

    /// Add several search paths
    ///
    /// When prepending, the new paths keep their relative order ahead of the
    /// existing ones.
    pub fn add_view_paths<I, P>(&mut self, paths: I, prepend: bool)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if prepend {
            for path in paths.into_iter().rev() {
                self.add_view_path(path, true);
            }
        } else {
            for path in paths {
                self.add_view_path(path, false);
            }
        }
    }

    /// Register hint paths for `namespace::view` names
    pub fn add_namespace<I, P>(&mut self, namespace: &str, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        write(&self.state.finder).add_namespace(namespace, paths);
        self.env.clear_templates();
    }

    /// Make a value available to every view
    pub fn share(&mut self, key: impl Into<String>, value: impl Serialize) {
        write(&self.state.shared).insert(key.into(), Value::from_serialize(&value));
    }

    pub fn view_paths(&self) -> Vec<PathBuf> {
        read(&self.state.finder).paths().to_vec()
    }

    pub fn cache_path(&self) -> &Path {
        self.cache_dir.path()
    }

    pub fn file_extensions(&self) -> Vec<String> {
        read(&self.state.finder).extensions().to_vec()
    }

    /// Every view name reachable through the search paths
    pub fn available_views(&self) -> Vec<String> {
        read(&self.state.finder).available_views()
    }

    /// Remove compiled views from the cache directory
    pub fn clear_compiled(&mut self) -> Result<usize> {
        let removed = self.state.cache.clear()?;
        self.env.clear_templates();
        tracing::debug!("Removed {} compiled views", removed);
        Ok(removed)
    }

    /// An error page for `error`, rendered with this service
    pub fn error_handler<'a, E>(&'a self, error: E) -> ErrorPage<'a>
    where
        E: Traceable + 'a,
    {
        let mut page = ErrorPage::new(self);
        page.set_error(error);
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use minijinja::context;
    use std::fs;
    use tempfile::TempDir;

    fn service_with(views: &[(&str, &str)]) -> (TempDir, ViewService) {
        let root = TempDir::new().unwrap();
        let view_dir = root.path().join("views");
        for (name, content) in views {
            let path = view_dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::create_dir_all(&view_dir).unwrap();

        let cache = root.path().join("cache");
        let service = ViewService::new([&view_dir], Some(cache.as_path()), None).unwrap();
        (root, service)
    }

    #[test]
    fn test_empty_view_paths() {
        let err = ViewService::new(Vec::<PathBuf>::new(), None, None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_render_with_data() {
        let (_root, service) = service_with(&[("hello.hilt.html", "Hello {{ name }}!")]);
        let out = service.render("hello", context! { name => "World" }).unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[test]
    fn test_data_wins_over_merge_data() {
        let (_root, service) = service_with(&[("v.hilt.html", "{{ a }}{{ b }}")]);
        let out = service
            .make_view("v", context! { a => 1 }, context! { a => 2, b => 3 })
            .unwrap()
            .render()
            .unwrap();
        assert_eq!(out, "13");
    }

    #[test]
    fn test_shared_data() {
        let (_root, mut service) = service_with(&[("v.hilt.html", "{{ site }}")]);
        service.share("site", "hilt");
        assert_eq!(service.render("v", ()).unwrap(), "hilt");
    }

    #[test]
    fn test_nested_view_name() {
        let (_root, service) = service_with(&[("admin/users/index.hilt.html", "users")]);
        assert!(service.exists("admin.users.index"));
        assert_eq!(service.render("admin.users.index", ()).unwrap(), "users");
    }

    #[test]
    fn test_view_not_found_has_suggestion() {
        let (_root, service) = service_with(&[("basic.hilt.html", "x")]);
        let err = service.make_view("basik", (), ()).unwrap_err();

        match err {
            EngineError::ViewNotFound {
                name,
                searched,
                suggestion,
            } => {
                assert_eq!(name, "basik");
                assert_eq!(searched.len(), 1);
                assert_eq!(suggestion.as_deref(), Some("Did you mean `basic`?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_register_directive_recompiles() {
        let (_root, mut service) = service_with(&[("d.hilt.html", "@stamp")]);
        service.register_directive("stamp", |_| "one".to_string());
        assert_eq!(service.render("d", ()).unwrap(), "one");

        service.register_directive("stamp", |_| "two".to_string());
        assert_eq!(service.render("d", ()).unwrap(), "two");
    }

    #[test]
    fn test_add_view_paths_prepend_keeps_order() {
        let (root, mut service) = service_with(&[]);
        let original = service.view_paths();

        service.add_view_paths([root.path().join("a"), root.path().join("b")], true);

        let paths = service.view_paths();
        assert_eq!(paths[0], root.path().join("a"));
        assert_eq!(paths[1], root.path().join("b"));
        assert_eq!(paths[2], original[0]);
    }

    #[test]
    fn test_namespace() {
        let (root, mut service) = service_with(&[]);
        let vendor = root.path().join("vendor");
        fs::create_dir_all(&vendor).unwrap();
        fs::write(vendor.join("widget.hilt.html"), "vendor widget").unwrap();

        assert!(!service.exists("pkg::widget"));
        service.add_namespace("pkg", [&vendor]);
        assert_eq!(service.render("pkg::widget", ()).unwrap(), "vendor widget");
    }

    #[test]
    fn test_lenient_mode() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("v.hilt.html"), "[{{ missing }}]").unwrap();

        let service = ViewService::builder()
            .view_path(root.path())
            .cache_path(root.path().join("cache"))
            .strict(false)
            .build()
            .unwrap();

        assert_eq!(service.render("v", ()).unwrap(), "[]");
    }

    #[test]
    fn test_custom_extension() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("page.html"), "plain").unwrap();

        let service = ViewService::new(
            [root.path()],
            Some(root.path().join("cache").as_path()),
            Some(vec![".html".to_string()]),
        )
        .unwrap();

        assert_eq!(service.file_extensions(), vec!["html".to_string()]);
        assert_eq!(service.render("page", ()).unwrap(), "plain");
    }

    #[test]
    fn test_from_config() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("page.txt"), "from config").unwrap();

        let mut config = ServiceConfig::new([root.path()]);
        config.cache_path = Some(root.path().join("cache"));
        config.file_extensions = vec!["txt".to_string()];

        let service = ViewService::from_config(&config).unwrap();
        assert_eq!(service.cache_path(), root.path().join("cache"));
        assert_eq!(service.render("page", ()).unwrap(), "from config");
    }

    #[test]
    fn test_clear_compiled() {
        let (_root, mut service) = service_with(&[("a.hilt.html", "a"), ("b.hilt.html", "b")]);
        service.render("a", ()).unwrap();
        service.render("b", ()).unwrap();

        assert_eq!(service.clear_compiled().unwrap(), 2);
        assert_eq!(service.render("a", ()).unwrap(), "a");
    }
}
