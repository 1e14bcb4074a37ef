//! Runtime: values, contexts and the render walk.
//!
//! A render owns a [`RenderContext`] layered over the caller's [`Context`];
//! nodes write through an [`OutputSink`] and report control flow as a
//! [`Flow`] value instead of unwinding.

pub mod context;
pub mod eval;
pub mod ops;
pub mod render;
pub mod value;

use std::fmt;
use std::io;

use crate::ast::BreakScope;
use crate::diagnostics::TemplateError;
use crate::err_msg;

pub use context::{Context, RenderContext};
pub use value::{ListRef, MapRef, Value};

// ============================================================================
// OUTPUT
// ============================================================================

/// Destination of rendered text.
pub trait OutputSink {
    fn emit(&mut self, text: &str) -> Result<(), TemplateError>;
}

impl OutputSink for String {
    fn emit(&mut self, text: &str) -> Result<(), TemplateError> {
        self.push_str(text);
        Ok(())
    }
}

/// Adapts any `fmt::Write`.
pub struct FmtSink<W: fmt::Write>(pub W);

impl<W: fmt::Write> OutputSink for FmtSink<W> {
    fn emit(&mut self, text: &str) -> Result<(), TemplateError> {
        Ok(self.0.write_str(text)?)
    }
}

/// Adapts any `io::Write`, e.g. a locked stdout or a file.
pub struct IoSink<W: io::Write>(pub W);

impl<W: io::Write> OutputSink for IoSink<W> {
    fn emit(&mut self, text: &str) -> Result<(), TemplateError> {
        self.0
            .write_all(text.as_bytes())
            .map_err(|e| err_msg!(Io, "writing rendered output failed: {}", e))
    }
}

// ============================================================================
// CONTROL FLOW
// ============================================================================

/// What a rendered node tells its enclosing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// `#break`, travelling up to the first scope that answers to it.
    Break(BreakScope),
    /// `#stop`: ends the whole render successfully.
    Stop,
}

impl Flow {
    /// Whether a loop absorbs this flow.
    pub(crate) fn ends_foreach(&self) -> bool {
        matches!(self, Flow::Break(BreakScope::Innermost | BreakScope::Foreach))
    }

    /// Whether a macro call absorbs this flow.
    pub(crate) fn ends_macro(&self) -> bool {
        matches!(self, Flow::Break(BreakScope::Innermost | BreakScope::Macro))
    }

    /// Whether a template (top level or `#parse`) absorbs this flow.
    pub(crate) fn ends_template(&self) -> bool {
        matches!(self, Flow::Break(BreakScope::Innermost | BreakScope::Template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_collect_text() {
        let mut s = String::new();
        s.emit("a").unwrap();
        s.emit("b").unwrap();
        assert_eq!(s, "ab");

        let mut io = IoSink(Vec::new());
        io.emit("x").unwrap();
        assert_eq!(io.0, b"x");

        let mut f = FmtSink(String::new());
        f.emit("y").unwrap();
        assert_eq!(f.0, "y");
    }

    #[test]
    fn break_scopes_stop_at_matching_constructs() {
        let macro_break = Flow::Break(BreakScope::Macro);
        assert!(!macro_break.ends_foreach());
        assert!(macro_break.ends_macro());
        assert!(Flow::Break(BreakScope::Innermost).ends_template());
        assert!(!Flow::Stop.ends_template());
    }
}
