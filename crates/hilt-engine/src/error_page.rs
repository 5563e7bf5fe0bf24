//! HTML diagnostic page for rendering failures
//!
//! An [`ErrorPage`] reads the failing file, cuts the lines around the error,
//! and renders the bundled `hilt::error` view with the message, location,
//! stack trace and the service's search paths.

use std::backtrace::Backtrace;
use std::io::Write;
use std::panic::Location;
use std::path::PathBuf;

use serde::Serialize;

use crate::engine::ERROR_VIEW;
use crate::error::{EngineError, Result, TemplateError};
use crate::service::ViewService;

/// Read-only access to the parts of an error the page displays
///
/// Each accessor returns `None` when the error does not carry that piece.
pub trait Traceable {
    fn message(&self) -> Option<String>;
    fn file(&self) -> Option<PathBuf>;
    /// 1-based line in [`file`](Traceable::file)
    fn line(&self) -> Option<usize>;
    fn trace(&self) -> Option<String>;
}

impl<T: Traceable + ?Sized> Traceable for &T {
    fn message(&self) -> Option<String> {
        (**self).message()
    }

    fn file(&self) -> Option<PathBuf> {
        (**self).file()
    }

    fn line(&self) -> Option<usize> {
        (**self).line()
    }

    fn trace(&self) -> Option<String> {
        (**self).trace()
    }
}

impl Traceable for TemplateError {
    fn message(&self) -> Option<String> {
        Some(self.message.clone())
    }

    fn file(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn line(&self) -> Option<usize> {
        self.line
    }

    fn trace(&self) -> Option<String> {
        Some(self.trace.clone())
    }
}

impl Traceable for EngineError {
    fn message(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn file(&self) -> Option<PathBuf> {
        match self {
            Self::Template(err) => err.file(),
            Self::SourceUnreadable { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    fn line(&self) -> Option<usize> {
        match self {
            Self::Template(err) => err.line,
            _ => None,
        }
    }

    fn trace(&self) -> Option<String> {
        match self {
            Self::Template(err) => err.trace(),
            other => Some(error_chain(other)),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    trace
}

/// A plain error record for failures that did not come from a view
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    message: String,
    file: Option<PathBuf>,
    line: Option<usize>,
    trace: Option<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Record the caller's location and a backtrace
    #[track_caller]
    pub fn capture(message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            message: message.into(),
            file: Some(PathBuf::from(location.file())),
            line: Some(location.line() as usize),
            trace: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// Message and cause chain of any error, without a location
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            message: err.to_string(),
            file: None,
            line: None,
            trace: Some(error_chain(err)),
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

impl Traceable for ErrorReport {
    fn message(&self) -> Option<String> {
        Some(self.message.clone())
    }

    fn file(&self) -> Option<PathBuf> {
        self.file.clone()
    }

    fn line(&self) -> Option<usize> {
        self.line
    }

    fn trace(&self) -> Option<String> {
        self.trace.clone()
    }
}

/// The trimmed lines around an error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeSnippet {
    pub before: String,
    pub current: String,
    pub after: String,
}

impl CodeSnippet {
    /// Lines `line - 1`, `line` and `line + 1` of `lines` (1-based)
    ///
    /// Lines outside the file come back empty.
    pub fn extract(lines: &[&str], line: usize) -> Self {
        let at = |number: usize| {
            number
                .checked_sub(1)
                .and_then(|index| lines.get(index))
                .map(|text| text.trim().to_string())
                .unwrap_or_default()
        };

        Self {
            before: at(line.saturating_sub(1)),
            current: at(line),
            after: at(line + 1),
        }
    }
}

#[derive(Serialize)]
struct ErrorContext {
    message: String,
    line: usize,
    source: String,
    code: CodeSnippet,
    stacktrace: String,
    view_paths: String,
    cache_path: String,
}

/// Renders an error as an HTML page with the service that raised it
pub struct ErrorPage<'a> {
    service: &'a ViewService,
    error: Option<Box<dyn Traceable + 'a>>,
}

impl<'a> ErrorPage<'a> {
    pub fn new(service: &'a ViewService) -> Self {
        Self {
            service,
            error: None,
        }
    }

    pub fn set_error(&mut self, error: impl Traceable + 'a) -> &mut Self {
        self.error = Some(Box::new(error));
        self
    }

    pub fn error(&self) -> Option<&(dyn Traceable + 'a)> {
        self.error.as_deref()
    }

    /// Render the page
    ///
    /// Fails before touching the filesystem when the error lacks a message,
    /// line, file or stack trace.
    pub fn render(&self) -> Result<String> {
        let error = self.error().ok_or(EngineError::ErrorNotSet)?;

        let message = error
            .message()
            .filter(|m| !m.trim().is_empty())
            .ok_or(EngineError::MissingErrorContext { field: "message" })?;
        let line = error
            .line()
            .filter(|l| *l >= 1)
            .ok_or(EngineError::MissingErrorContext { field: "line" })?;
        let file = error
            .file()
            .filter(|f| !f.as_os_str().is_empty())
            .ok_or(EngineError::MissingErrorContext { field: "file" })?;
        let stacktrace = error
            .trace()
            .filter(|t| !t.trim().is_empty())
            .ok_or(EngineError::MissingErrorContext {
                field: "stack trace",
            })?;

        let content =
            std::fs::read_to_string(&file).map_err(|source| EngineError::SourceUnreadable {
                path: file.clone(),
                source,
            })?;
        let lines: Vec<&str> = content.lines().collect();

        let view_paths: Vec<String> = self
            .service
            .view_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        let context = ErrorContext {
            message,
            line,
            source: file.display().to_string(),
            code: CodeSnippet::extract(&lines, line),
            stacktrace,
            view_paths: view_paths.join("\n"),
            cache_path: self.service.cache_path().display().to_string(),
        };

        tracing::debug!("Rendering error page for {}:{}", file.display(), line);
        self.service.make_view(ERROR_VIEW, &context, ())?.render()
    }

    /// Render the page into `out`
    pub fn write_to(&self, mut out: impl Write) -> Result<()> {
        let html = self.render()?;
        out.write_all(html.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Render the page to standard output
    pub fn print(&self) -> Result<()> {
        self.write_to(std::io::stdout().lock())
    }
}
