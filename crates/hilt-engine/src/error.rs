//! Engine error types with source-mapped diagnostics

use std::path::PathBuf;

use hilt_core::CoreError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::suggestions::{extract_quoted, suggest_undefined_variable, suggest_unknown_filter};

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    /// Invalid construction arguments (view paths, cache directory)
    #[error(transparent)]
    #[diagnostic(code(hilt::config))]
    Config(#[from] CoreError),

    /// The view name does not resolve in the current search paths
    #[error("View [{name}] not found")]
    #[diagnostic(code(hilt::view_not_found))]
    ViewNotFound {
        name: String,
        searched: Vec<PathBuf>,
        #[help]
        suggestion: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("Invalid view data: {message}")]
    #[diagnostic(code(hilt::view_data))]
    InvalidData { message: String },

    #[error("Invalid view pattern `{pattern}`: {message}")]
    #[diagnostic(code(hilt::composer::pattern))]
    InvalidPattern { pattern: String, message: String },

    #[error("No error set on the error page")]
    #[diagnostic(code(hilt::error_page::unset))]
    ErrorNotSet,

    /// The error handed to the error page lacks a required field
    #[error("No {field} found in error object")]
    #[diagnostic(code(hilt::error_page::context))]
    MissingErrorContext { field: &'static str },

    /// The source file of a presented error cannot be read
    #[error("Could not read source file {}: {source}", path.display())]
    #[diagnostic(code(hilt::error_page::source))]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(e) if e.is_configuration())
    }

    pub fn is_view_not_found(&self) -> bool {
        matches!(self, Self::ViewNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kind for categorizing template errors
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    TemplateNotFound,
    Other,
}

/// Template compile or render failure with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(hilt::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// View the error occurred in
    pub view: String,

    /// Resolved file of that view, if it lives on disk
    pub path: Option<PathBuf>,

    /// 1-based line in the view
    pub line: Option<usize>,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,

    /// Full engine report, including the chain of included views
    pub trace: String,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `available` lists the data keys the view had, for "did you mean" hints.
    pub fn from_minijinja(
        err: minijinja::Error,
        view: &str,
        path: Option<PathBuf>,
        source: &str,
        available: &[String],
    ) -> Self {
        let kind = categorize_minijinja_error(&err);
        let message = err.to_string();
        let line = err.line();
        let span = line.and_then(|line_num| calculate_span(source, line_num));
        let trace = format_trace(&err);
        let suggestion = generate_suggestion(&err, kind, &trace, available);

        let display_name = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| view.to_string());

        Self {
            message,
            kind,
            view: view.to_string(),
            path,
            line,
            src: NamedSource::new(display_name, source.to_string()),
            span,
            suggestion,
            trace,
        }
    }

    /// Create a simple error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            trace: message.clone(),
            message,
            kind: TemplateErrorKind::Other,
            view: String::new(),
            path: None,
            line: None,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::TemplateNotFound => TemplateErrorKind::TemplateNotFound,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

/// Detailed display plus the chain of underlying causes
fn format_trace(err: &minijinja::Error) -> String {
    let mut trace = format!("{:#}", err);
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        trace.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    trace
}

/// Extract the expression on the error line of MiniJinja's detailed display
///
/// The marked line looks like `   8 >   Hello {{ nmae }}`.
fn extract_expression_from_display(display: &str) -> Option<String> {
    display
        .lines()
        .filter(|line| line.trim_start().contains(" > ") || line.trim_start().starts_with("> "))
        .find_map(|line| {
            let start = line.find("{{")?;
            let end = line[start..].find("}}")?;
            let expr = line[start + 2..start + end].trim();
            let expr = expr.split('|').next().unwrap_or(expr).trim();
            (!expr.is_empty()).then(|| expr.to_string())
        })
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

fn generate_suggestion(
    err: &minijinja::Error,
    kind: TemplateErrorKind,
    detailed: &str,
    available: &[String],
) -> Option<String> {
    let msg = err.to_string();

    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let expr = extract_expression_from_display(detailed)?;
            let root = expr.split(['.', '[', '(']).next().unwrap_or(&expr).trim();
            suggest_undefined_variable(root, available)
        }
        TemplateErrorKind::UnknownFilter => {
            extract_quoted(&msg).and_then(|name| suggest_unknown_filter(&name))
        }
        TemplateErrorKind::SyntaxError => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements, `{# #}` for comments, and that every `@if`/`@foreach`/component directive is closed"
                .to_string(),
        ),
        TemplateErrorKind::TemplateNotFound => Some(
            "Included views are resolved against the same view paths. Check the name and the configured paths."
                .to_string(),
        ),
        _ => None,
    }
}
