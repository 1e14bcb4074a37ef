pub use crate::config::EngineConfig;
pub use crate::diagnostics::{ErrorContext, ErrorType, TemplateError};
pub use crate::engine::Engine;
pub use crate::runtime::{Context, OutputSink, Value};
pub use crate::template::Template;

pub mod ast;
pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod introspect;
pub mod macros;
pub mod runtime;
pub mod syntax;
pub mod template;
