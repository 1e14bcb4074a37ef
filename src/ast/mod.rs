//! AST module for Vellum templates
//!
//! This module provides the typed node hierarchy produced by the parser:
//! statement-like [`Node`]s that write to the output sink, and [`Expr`]s that
//! evaluate to values. Every node and expression carries a [`Position`] for
//! diagnostics. The tree owns its children; macro definitions are shared via
//! `Arc` so template macro tables can point at them without copying bodies.

// ============================================================================
// IMPORTS
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::macros::MacroDefinition;

// ============================================================================
// SOURCE LOCATIONS
// ============================================================================

/// Represents a byte span in the template source.
///
/// # Examples
///
/// ```rust
/// use vellum::ast::Span;
/// let span = Span { start: 0, end: 5 };
/// assert_eq!(span.len(), 5);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a node came from: template name, 1-based line/column and byte span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub template: Arc<str>,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.template, self.line, self.column)
    }
}

// ============================================================================
// STATEMENT NODES
// ============================================================================

/// An ordered run of nodes: a template body, a branch, a loop body.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Position,
}

/// The statement-level node kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    /// Literal template text, written verbatim.
    Text(String),
    /// `\$ref` or `\#directive`: the escaped construct, written without the backslash.
    Escaped(String),
    /// `#[[ ... ]]#` content.
    Raw(String),
    /// `## ...` or `#* ... *#`; renders nothing.
    Comment,
    /// A reference rendered into the output.
    Reference(Reference),
    If {
        branches: Vec<Branch>,
        otherwise: Option<Block>,
    },
    Foreach {
        var: String,
        iterable: Expr,
        body: Block,
        otherwise: Option<Block>,
    },
    Set {
        target: Reference,
        value: Expr,
    },
    MacroDef(Arc<MacroDefinition>),
    MacroCall(MacroCall),
    Parse(Expr),
    Include(Vec<Expr>),
    Evaluate(Expr),
    Stop,
    Break(BreakScope),
}

impl NodeKind {
    /// Short name used in diagnostics and logs.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Text(_) => "text",
            NodeKind::Escaped(_) => "escape",
            NodeKind::Raw(_) => "raw",
            NodeKind::Comment => "comment",
            NodeKind::Reference(_) => "reference",
            NodeKind::If { .. } => "#if",
            NodeKind::Foreach { .. } => "#foreach",
            NodeKind::Set { .. } => "#set",
            NodeKind::MacroDef(_) => "#macro",
            NodeKind::MacroCall(_) => "macro call",
            NodeKind::Parse(_) => "#parse",
            NodeKind::Include(_) => "#include",
            NodeKind::Evaluate(_) => "#evaluate",
            NodeKind::Stop => "#stop",
            NodeKind::Break(_) => "#break",
        }
    }
}

/// One `#if` / `#elseif` arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub condition: Expr,
    pub body: Block,
}

/// `#name(args)` or `#@name(args) body #end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroCall {
    pub name: String,
    pub args: Vec<MacroArg>,
    pub body: Option<Block>,
    /// The call's source text, written back when no macro of that name exists.
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroArg {
    /// `Some` for `name=value` arguments.
    pub name: Option<String>,
    pub value: Expr,
}

/// Which scope a `#break` leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BreakScope {
    /// Bare `#break`: the innermost foreach, macro or template.
    Innermost,
    Foreach,
    Macro,
    Template,
    /// A label no scope answers to; rejected during init.
    Unknown(String),
}

impl BreakScope {
    pub fn from_label(label: &str) -> Self {
        match label {
            "foreach" => BreakScope::Foreach,
            "macro" => BreakScope::Macro,
            "template" => BreakScope::Template,
            other => BreakScope::Unknown(other.to_string()),
        }
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    /// A double-quoted string containing references or directives.
    Interpolated(Block),
    Reference(Reference),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    /// `[a..b]`, inclusive on both ends.
    Range(Box<Expr>, Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// An unquoted identifier in macro-call argument position; rejected during init.
    BareWord(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

// ============================================================================
// REFERENCES
// ============================================================================

/// `$root.segment(...)[...]`, resolved left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    pub root: String,
    /// `$!name`: renders nothing instead of its literal text when null.
    pub quiet: bool,
    pub segments: Vec<Segment>,
    /// The reference exactly as written, for the null fallback.
    pub literal: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub pos: Position,
    #[serde(skip)]
    id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SegmentKind {
    Property(String),
    Method { name: String, args: Vec<Expr> },
    Index(Expr),
}

static NEXT_SEGMENT_ID: AtomicUsize = AtomicUsize::new(0);

impl Segment {
    /// A segment with a process-unique id. Ids are never reused, even after
    /// the tree holding the segment is dropped.
    pub fn new(kind: SegmentKind, pos: Position) -> Self {
        Segment {
            kind,
            pos,
            id: NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identity used to key per-render dispatch caches.
    pub fn node_id(&self) -> usize {
        self.id
    }
}
