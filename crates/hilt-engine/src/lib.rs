//! Hilt Engine - MiniJinja view service
//!
//! This crate renders named views from ordered search paths with:
//! - `@directives` expanded before MiniJinja compiles a view
//! - Component directives and view composers
//! - A process-wide service for hosts without explicit wiring
//! - HTML error pages and "did you mean" suggestions

pub mod compiler;
pub mod composer;
mod engine;
pub mod error;
pub mod error_page;
pub mod global;
pub mod service;
pub mod suggestions;
pub mod view;

pub use compiler::{DirectiveHandler, DirectiveRegistry};
pub use composer::{ComposerId, ViewData, ViewPatterns};
pub use engine::ERROR_VIEW;
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use error_page::{CodeSnippet, ErrorPage, ErrorReport, Traceable};
pub use global::GlobalViewService;
pub use service::{ViewService, ViewServiceBuilder};
pub use view::View;

pub use hilt_core::{ServiceConfig, set_cache_path_override};
