//!
//! Unified, `miette`-based diagnostics for the Vellum engine.
//!
//! Every failure produced while compiling or rendering a template is a
//! [`TemplateError`]. Errors carry an [`ErrorContext`]: the template source
//! (for labelled reports), the byte span, the template/line/column location,
//! an optional help text and the trail of enclosing macro calls and nested
//! templates the error unwound through.
//!
//! # Error Construction Macros
//!
//! - `err_msg!(Variant, "format {}", args)` for errors without a position.
//! - `err_at!(Variant, message, position)` for errors tied to a node.
//! - `err_at!(Variant, message, position, source)` to also attach the source
//!   text so the report can label the offending span.
//!
//! Construct `TemplateError` values through these macros rather than by hand;
//! the `Parse` and `Compile` variants are the exceptions, built only by the
//! parser and template init.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::ast::{Position, Span};

/// Constructs a `TemplateError` variant with a formatted message and no position.
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::TemplateError::$variant {
            message: format!($fmt $(, $arg)*),
            ctx: $crate::diagnostics::ErrorContext::none(),
        }
    };
}

/// Constructs a `TemplateError` variant pointing at a node position, optionally
/// attaching the template source for labelled reports.
#[macro_export]
macro_rules! err_at {
    ($variant:ident, $msg:expr, $pos:expr) => {
        $crate::TemplateError::$variant {
            message: $msg.to_string(),
            ctx: $crate::diagnostics::ErrorContext::at($pos),
        }
    };
    ($variant:ident, $msg:expr, $pos:expr, $source:expr) => {
        $crate::TemplateError::$variant {
            message: $msg.to_string(),
            ctx: $crate::diagnostics::ErrorContext::at($pos).with_source($source),
        }
    };
}

pub type SourceArc = Arc<NamedSource<String>>;

/// Type-safe error classification, mostly used by tests and the CLI exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Malformed template grammar.
    Parse,
    /// Structurally valid template rejected while initialising its nodes.
    Init,
    /// Generic render failure (bad operand, invalid assignment, ...).
    Render,
    /// Reference that does not resolve, under strict mode.
    UndefinedReference,
    /// Member lookup or invocation failure on a value.
    Dispatch,
    /// Macro call depth or `#parse` depth exceeded.
    RecursionLimit,
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// No loader could provide the requested resource.
    ResourceNotFound,
    /// Output sink or loader I/O failure.
    Io,
    /// Invalid engine configuration.
    Config,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Parse => "parse",
            ErrorType::Init => "init",
            ErrorType::Render => "render",
            ErrorType::UndefinedReference => "undefined_reference",
            ErrorType::Dispatch => "dispatch",
            ErrorType::RecursionLimit => "recursion_limit",
            ErrorType::DivisionByZero => "division_by_zero",
            ErrorType::ResourceNotFound => "resource_not_found",
            ErrorType::Io => "io",
            ErrorType::Config => "config",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template name, 1-based line and 1-based column of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub template: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.template, self.line, self.column)
    }
}

impl From<&Position> for Location {
    fn from(pos: &Position) -> Self {
        Self {
            template: Arc::clone(&pos.template),
            line: pos.line,
            column: pos.column,
        }
    }
}

/// One enclosing scope an error travelled through while unwinding.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub description: String,
    pub location: Location,
}

/// Minimal, composable error context for diagnostics.
#[derive(Debug, Default)]
pub struct ErrorContext {
    /// The source text of the template the error points into (if known).
    pub source: Option<SourceArc>,
    /// The byte span inside `source`.
    pub span: Option<Span>,
    /// Template/line/column of the failure.
    pub location: Option<Location>,
    /// An optional help message.
    pub help: Option<String>,
    /// Enclosing macro calls and nested templates, innermost first.
    pub trail: Vec<TraceFrame>,
}

impl ErrorContext {
    /// Returns an empty error context.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a context pointing at a node position.
    pub fn at(pos: &Position) -> Self {
        Self {
            source: None,
            span: Some(pos.span),
            location: Some(Location::from(pos)),
            help: None,
            trail: vec![],
        }
    }

    pub fn with_source(mut self, source: &SourceArc) -> Self {
        self.source = Some(Arc::clone(source));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Renders ` at template:line:column` or nothing when no location is known.
    pub fn at_suffix(&self) -> String {
        match &self.location {
            Some(loc) => format!(" at {loc}"),
            None => String::new(),
        }
    }
}

/// Unified error type for all Vellum failure modes.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Parse error{}: {message} (found `{token}`)", .ctx.at_suffix())]
    Parse {
        message: String,
        token: String,
        ctx: ErrorContext,
    },
    #[error("Init error{}: {message}", .ctx.at_suffix())]
    Init { message: String, ctx: ErrorContext },
    #[error("{} errors while compiling template '{template}'; first: {}", .errors.len(), first_message(.errors))]
    Compile {
        template: String,
        errors: Vec<TemplateError>,
    },
    #[error("Render error{}: {message}", .ctx.at_suffix())]
    Render { message: String, ctx: ErrorContext },
    #[error("Undefined reference{}: {message}", .ctx.at_suffix())]
    UndefinedReference { message: String, ctx: ErrorContext },
    #[error("Dispatch error{}: {message}", .ctx.at_suffix())]
    Dispatch { message: String, ctx: ErrorContext },
    #[error("Recursion limit exceeded{}: {message}", .ctx.at_suffix())]
    RecursionLimit { message: String, ctx: ErrorContext },
    #[error("Division by zero{}: {message}", .ctx.at_suffix())]
    DivisionByZero { message: String, ctx: ErrorContext },
    #[error("Resource not found{}: {message}", .ctx.at_suffix())]
    ResourceNotFound { message: String, ctx: ErrorContext },
    #[error("I/O error{}: {message}", .ctx.at_suffix())]
    Io { message: String, ctx: ErrorContext },
    #[error("Configuration error: {message}")]
    Config { message: String, ctx: ErrorContext },
}

fn first_message(errors: &[TemplateError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_default()
}

impl TemplateError {
    fn ctx(&self) -> Option<&ErrorContext> {
        match self {
            TemplateError::Parse { ctx, .. }
            | TemplateError::Init { ctx, .. }
            | TemplateError::Render { ctx, .. }
            | TemplateError::UndefinedReference { ctx, .. }
            | TemplateError::Dispatch { ctx, .. }
            | TemplateError::RecursionLimit { ctx, .. }
            | TemplateError::DivisionByZero { ctx, .. }
            | TemplateError::ResourceNotFound { ctx, .. }
            | TemplateError::Io { ctx, .. }
            | TemplateError::Config { ctx, .. } => Some(ctx),
            TemplateError::Compile { .. } => None,
        }
    }

    fn ctx_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            TemplateError::Parse { ctx, .. }
            | TemplateError::Init { ctx, .. }
            | TemplateError::Render { ctx, .. }
            | TemplateError::UndefinedReference { ctx, .. }
            | TemplateError::Dispatch { ctx, .. }
            | TemplateError::RecursionLimit { ctx, .. }
            | TemplateError::DivisionByZero { ctx, .. }
            | TemplateError::ResourceNotFound { ctx, .. }
            | TemplateError::Io { ctx, .. }
            | TemplateError::Config { ctx, .. } => Some(ctx),
            TemplateError::Compile { .. } => None,
        }
    }

    /// Returns the type-safe classification of this error.
    ///
    /// A `Compile` aggregate reports the type of its first error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            TemplateError::Parse { .. } => ErrorType::Parse,
            TemplateError::Init { .. } => ErrorType::Init,
            TemplateError::Compile { errors, .. } => errors
                .first()
                .map(TemplateError::error_type)
                .unwrap_or(ErrorType::Init),
            TemplateError::Render { .. } => ErrorType::Render,
            TemplateError::UndefinedReference { .. } => ErrorType::UndefinedReference,
            TemplateError::Dispatch { .. } => ErrorType::Dispatch,
            TemplateError::RecursionLimit { .. } => ErrorType::RecursionLimit,
            TemplateError::DivisionByZero { .. } => ErrorType::DivisionByZero,
            TemplateError::ResourceNotFound { .. } => ErrorType::ResourceNotFound,
            TemplateError::Io { .. } => ErrorType::Io,
            TemplateError::Config { .. } => ErrorType::Config,
        }
    }

    /// The human-readable message, without location decoration.
    pub fn message(&self) -> String {
        match self {
            TemplateError::Parse { message, .. }
            | TemplateError::Init { message, .. }
            | TemplateError::Render { message, .. }
            | TemplateError::UndefinedReference { message, .. }
            | TemplateError::Dispatch { message, .. }
            | TemplateError::RecursionLimit { message, .. }
            | TemplateError::DivisionByZero { message, .. }
            | TemplateError::ResourceNotFound { message, .. }
            | TemplateError::Io { message, .. }
            | TemplateError::Config { message, .. } => message.clone(),
            TemplateError::Compile { errors, .. } => first_message(errors),
        }
    }

    /// Template/line/column of the failure, if the error is tied to a node.
    pub fn location(&self) -> Option<&Location> {
        match self {
            TemplateError::Compile { errors, .. } => errors.first().and_then(|e| e.location()),
            other => other.ctx().and_then(|c| c.location.as_ref()),
        }
    }

    /// The offending token text of a syntax error.
    pub fn token(&self) -> Option<&str> {
        match self {
            TemplateError::Parse { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Enclosing scopes recorded while the error unwound, innermost first.
    pub fn trail(&self) -> &[TraceFrame] {
        self.ctx().map(|c| c.trail.as_slice()).unwrap_or(&[])
    }

    /// Attaches `source` if the error does not carry one yet.
    pub fn with_source(mut self, source: &SourceArc) -> Self {
        if let Some(ctx) = self.ctx_mut() {
            if ctx.source.is_none() {
                ctx.source = Some(Arc::clone(source));
            }
        }
        self
    }

    /// Records an enclosing scope while unwinding.
    pub fn within(mut self, description: impl Into<String>, pos: &Position) -> Self {
        if let Some(ctx) = self.ctx_mut() {
            ctx.trail.push(TraceFrame {
                description: description.into(),
                location: Location::from(pos),
            });
        }
        self
    }
}

impl Diagnostic for TemplateError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("vellum::{}", self.error_type())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let ctx = self.ctx()?;
        let mut lines = Vec::new();
        if let Some(help) = &ctx.help {
            lines.push(help.clone());
        }
        for frame in &ctx.trail {
            lines.push(format!("in {} at {}", frame.description, frame.location));
        }
        if lines.is_empty() {
            None
        } else {
            Some(Box::new(lines.join("\n")))
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.ctx()?
            .source
            .as_ref()
            .map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let ctx = self.ctx()?;
        ctx.source.as_ref()?;
        let span = ctx.span?;
        let len = if span.end > span.start {
            span.end - span.start
        } else {
            1
        };
        let label = LabeledSpan::new(Some(self.message()), span.start, len);
        Some(Box::new(std::iter::once(label)))
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        match self {
            TemplateError::Compile { errors, .. } => Some(Box::new(
                errors.iter().map(|e| e as &dyn Diagnostic),
            )),
            _ => None,
        }
    }
}

impl From<std::fmt::Error> for TemplateError {
    fn from(_: std::fmt::Error) -> Self {
        err_msg!(Io, "formatting into the output sink failed")
    }
}

/// Builds a `NamedSource` for a template.
pub fn named_source(name: &str, text: &str) -> SourceArc {
    Arc::new(NamedSource::new(name, text.to_string()))
}
