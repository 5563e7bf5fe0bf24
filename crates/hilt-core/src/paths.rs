//! View search paths and name resolution
//!
//! A view name is resolved against an ordered list of directories. Dots in the
//! name map to directory separators and each recognised file extension is
//! tried in order, so `alias.source` resolves to `alias/source.hilt.html` in
//! the first directory that contains it.
//!
//! Names of the form `namespace::view.name` are resolved only against the
//! hint paths registered for that namespace.
//!
//! A name can never leave its search directory: names with empty segments
//! (`..etc.passwd`, `a..b`, `.hidden`), a leading separator or a drive
//! prefix resolve to nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Extension used when the caller does not provide any
pub const DEFAULT_EXTENSION: &str = "hilt.html";

/// Separator between a namespace and the view name
pub const NAMESPACE_DELIMITER: &str = "::";

/// Ordered list of directories consulted when resolving a view
///
/// Earlier entries take precedence. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewPaths(Vec<PathBuf>);

impl ViewPaths {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }

    /// Add a path with the lowest precedence
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.0.push(path.into());
    }

    /// Add a path with the highest precedence
    pub fn prepend(&mut self, path: impl Into<PathBuf>) {
        self.0.insert(0, path.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

impl<'a> IntoIterator for &'a ViewPaths {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Resolves view names to files on disk
#[derive(Debug, Clone)]
pub struct ViewFinder {
    paths: ViewPaths,
    extensions: Vec<String>,
    hints: BTreeMap<String, Vec<PathBuf>>,
}

impl ViewFinder {
    /// Create a finder over `paths`, trying `extensions` in order
    ///
    /// An empty extension list falls back to [`DEFAULT_EXTENSION`].
    pub fn new(paths: ViewPaths, extensions: Vec<String>) -> Self {
        let extensions = if extensions.is_empty() {
            vec![DEFAULT_EXTENSION.to_string()]
        } else {
            extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect()
        };

        Self {
            paths,
            extensions,
            hints: BTreeMap::new(),
        }
    }

    pub fn paths(&self) -> &ViewPaths {
        &self.paths
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn add_location(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path);
    }

    pub fn prepend_location(&mut self, path: impl Into<PathBuf>) {
        self.paths.prepend(path);
    }

    /// Register hint paths for `namespace::` view names
    pub fn add_namespace<I, P>(&mut self, namespace: &str, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.hints
            .entry(namespace.to_string())
            .or_default()
            .extend(paths.into_iter().map(Into::into));
    }

    /// A copy of this finder with `paths` prepended one after the other
    ///
    /// Each path goes in front of the ones before it, so the last path has
    /// the highest precedence: `["x", "y"]` on `["a"]` gives `["y", "x", "a"]`.
    pub fn with_prepended<I, P>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut finder = self.clone();
        for path in paths {
            finder.paths.prepend(path);
        }
        finder
    }

    /// Resolve a view name to the first matching file
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        let (dirs, view) = self.locations_for(name)?;

        for dir in dirs {
            for candidate in self.candidate_files(view) {
                let path = dir.join(&candidate);
                if path.is_file() {
                    return Some(path);
                }
            }
        }

        None
    }

    /// Directories consulted for `name`, in lookup order
    pub fn searched_locations(&self, name: &str) -> Vec<PathBuf> {
        self.locations_for(name)
            .map(|(dirs, _)| dirs.to_vec())
            .unwrap_or_default()
    }

    /// Every view name reachable through the plain (non-namespaced) paths
    pub fn available_views(&self) -> Vec<String> {
        let mut names = Vec::new();

        for dir in &self.paths {
            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(dir) else {
                    continue;
                };
                if let Some(name) = self.view_name_for(rel) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }

        names
    }

    fn locations_for<'a>(&'a self, name: &'a str) -> Option<(&'a [PathBuf], &'a str)> {
        let (dirs, view) = match name.split_once(NAMESPACE_DELIMITER) {
            Some((namespace, view)) => (self.hints.get(namespace)?.as_slice(), view),
            None => (self.paths.as_slice(), name),
        };

        if !is_relative_view(view) {
            tracing::debug!("Rejected view name {:?}", name);
            return None;
        }
        Some((dirs, view))
    }

    fn candidate_files(&self, view: &str) -> impl Iterator<Item = String> + '_ {
        let stem = view.replace('.', "/");
        self.extensions
            .iter()
            .map(move |ext| format!("{}.{}", stem, ext))
    }

    fn view_name_for(&self, rel: &Path) -> Option<String> {
        let rel = rel.to_string_lossy().replace('\\', "/");
        self.extensions.iter().find_map(|ext| {
            rel.strip_suffix(&format!(".{}", ext))
                .map(|stem| stem.replace('/', "."))
        })
    }
}

/// Whether `view` maps to a path that stays below its search directory
fn is_relative_view(view: &str) -> bool {
    !view.is_empty()
        && view
            .split(['.', '/', '\\'])
            .all(|segment| !segment.is_empty() && !segment.contains(':'))
}
