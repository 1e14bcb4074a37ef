//! Compiled templates.
//!
//! A [`Template`] exists only once its source has parsed and every node has
//! passed init; it is immutable afterwards and shared as `Arc<Template>`
//! across renders and threads.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::{Block, BreakScope, Expr, ExprKind, MacroCall, Node, NodeKind, Reference, SegmentKind};
use crate::config::SpaceGobbling;
use crate::diagnostics::{SourceArc, TemplateError};
use crate::err_at;
use crate::macros::MacroTable;
use crate::syntax;

#[derive(Debug)]
pub struct Template {
    name: Arc<str>,
    root: Block,
    macros: MacroTable,
    source: SourceArc,
}

impl Template {
    /// Parses and initialises `text`.
    ///
    /// Syntax errors stop at the first one. Init problems are collected over
    /// the whole tree and reported together as a `Compile` error when there
    /// is more than one.
    pub fn compile(
        name: impl Into<Arc<str>>,
        text: &str,
        gobbling: SpaceGobbling,
    ) -> Result<Template, TemplateError> {
        let name = name.into();
        let parsed = syntax::parse(text, &name, gobbling)?;

        let mut init = Init::default();
        init.block(&parsed.root, false);
        let Init { macros, mut errors, .. } = init;

        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0).with_source(&parsed.source)),
            _ => {
                return Err(TemplateError::Compile {
                    template: name.to_string(),
                    errors: errors
                        .into_iter()
                        .map(|e| e.with_source(&parsed.source))
                        .collect(),
                })
            }
        }

        debug!(template = %name, macros = macros.len(), "template initialised");
        Ok(Template {
            name,
            root: parsed.root,
            macros,
            source: parsed.source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn root(&self) -> &Block {
        &self.root
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn source(&self) -> &SourceArc {
        &self.source
    }
}

// ============================================================================
// INIT
// ============================================================================

#[derive(Default)]
struct Init {
    macros: MacroTable,
    errors: Vec<TemplateError>,
    /// Depth of interpolated strings around the current node.
    in_string: usize,
}

impl Init {
    fn block(&mut self, block: &Block, in_macro: bool) {
        for node in block.iter() {
            self.node(node, in_macro);
        }
    }

    fn node(&mut self, node: &Node, in_macro: bool) {
        match &node.kind {
            NodeKind::Text(_)
            | NodeKind::Escaped(_)
            | NodeKind::Raw(_)
            | NodeKind::Comment => {}
            NodeKind::Stop | NodeKind::Break(_) if self.in_string > 0 => {
                self.errors.push(err_at!(
                    Init,
                    "#stop and #break cannot be used inside a string literal",
                    &node.pos
                ));
            }
            NodeKind::Stop => {}
            NodeKind::Reference(r) => self.reference(r, in_macro),
            NodeKind::If { branches, otherwise } => {
                for branch in branches {
                    self.expr(&branch.condition, in_macro);
                    self.block(&branch.body, in_macro);
                }
                if let Some(otherwise) = otherwise {
                    self.block(otherwise, in_macro);
                }
            }
            NodeKind::Foreach {
                iterable,
                body,
                otherwise,
                ..
            } => {
                self.expr(iterable, in_macro);
                self.block(body, in_macro);
                if let Some(otherwise) = otherwise {
                    self.block(otherwise, in_macro);
                }
            }
            NodeKind::Set { target, value } => {
                if let Some(last) = target.segments.last() {
                    if let SegmentKind::Method { name, .. } = &last.kind {
                        self.errors.push(err_at!(
                            Init,
                            format!(
                                "cannot assign to the method call '{name}(...)' in '{}'",
                                target.literal
                            ),
                            &last.pos
                        ));
                    }
                }
                self.reference(target, in_macro);
                self.expr(value, in_macro);
            }
            NodeKind::MacroDef(def) => {
                if in_macro {
                    self.errors.push(err_at!(
                        Init,
                        format!("macro #{} is defined inside another macro", def.name),
                        &node.pos
                    ));
                    return;
                }
                let mut seen = HashSet::new();
                for param in &def.params {
                    if !seen.insert(param.name.as_str()) {
                        self.errors.push(err_at!(
                            Init,
                            format!(
                                "macro #{} declares parameter ${} twice",
                                def.name, param.name
                            ),
                            &param.pos
                        ));
                    }
                    if let Some(default) = &param.default {
                        self.expr(default, true);
                    }
                }
                self.block(&def.body, true);
                if let Some(previous) = self.macros.insert(Arc::clone(def)) {
                    warn!(
                        name = %def.name,
                        first = %previous.pos,
                        again = %def.pos,
                        "macro redefined; the later definition wins"
                    );
                }
            }
            NodeKind::MacroCall(call) => self.macro_call(call, in_macro),
            NodeKind::Parse(expr) | NodeKind::Evaluate(expr) => self.expr(expr, in_macro),
            NodeKind::Include(exprs) => {
                for expr in exprs {
                    self.expr(expr, in_macro);
                }
            }
            NodeKind::Break(BreakScope::Unknown(label)) => {
                self.errors.push(err_at!(
                    Init,
                    format!(
                        "#break(${label}) names no enclosing scope; use $foreach, $macro or $template"
                    ),
                    &node.pos
                ));
            }
            NodeKind::Break(_) => {}
        }
    }

    fn macro_call(&mut self, call: &MacroCall, in_macro: bool) {
        let mut named = HashSet::new();
        for arg in &call.args {
            if let ExprKind::BareWord(word) = &arg.value.kind {
                self.errors.push(err_at!(
                    Init,
                    format!(
                        "argument '{word}' of #{} looks like an undeclared variable; write ${word} or quote it",
                        call.name
                    ),
                    &arg.value.pos
                ));
            } else {
                self.expr(&arg.value, in_macro);
            }
            if let Some(name) = &arg.name {
                if !named.insert(name.as_str()) {
                    self.errors.push(err_at!(
                        Init,
                        format!("argument '{name}' passed twice to #{}", call.name),
                        &arg.value.pos
                    ));
                }
            }
        }
        if let Some(body) = &call.body {
            self.block(body, in_macro);
        }
    }

    fn reference(&mut self, reference: &Reference, in_macro: bool) {
        for segment in &reference.segments {
            match &segment.kind {
                SegmentKind::Property(_) => {}
                SegmentKind::Method { args, .. } => {
                    for arg in args {
                        self.expr(arg, in_macro);
                    }
                }
                SegmentKind::Index(index) => self.expr(index, in_macro),
            }
        }
    }

    fn expr(&mut self, expr: &Expr, in_macro: bool) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::BareWord(_) => {}
            ExprKind::Interpolated(block) => {
                self.in_string += 1;
                self.block(block, in_macro);
                self.in_string -= 1;
            }
            ExprKind::Reference(r) => self.reference(r, in_macro),
            ExprKind::List(items) => {
                for item in items {
                    self.expr(item, in_macro);
                }
            }
            ExprKind::Map(entries) => {
                for (key, value) in entries {
                    self.expr(key, in_macro);
                    self.expr(value, in_macro);
                }
            }
            ExprKind::Range(from, to) => {
                self.expr(from, in_macro);
                self.expr(to, in_macro);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand, in_macro),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs, in_macro);
                self.expr(rhs, in_macro);
            }
        }
    }
}
