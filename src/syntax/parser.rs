//! Vellum Parser
//!
//! Converts template source into a [`Block`] of nodes with source positions,
//! then applies the configured space-gobbling policy. The parser is purely
//! syntactic: macro tables, argument checks and `#break` labels are handled by
//! template init.

use std::sync::Arc;

use once_cell::sync::Lazy;
use pest::error::{Error, ErrorVariant, InputLocation};
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use tracing::debug;

use crate::ast::{
    BinaryOp, Block, Branch, BreakScope, Expr, ExprKind, Literal, MacroArg, MacroCall, Node,
    NodeKind, Position, Reference, Segment, SegmentKind, Span, UnaryOp,
};
use crate::config::SpaceGobbling;
use crate::diagnostics::{named_source, ErrorContext, SourceArc, TemplateError};
use crate::macros::{MacroDefinition, MacroParam};
use crate::syntax::gobble::{self, Markers};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct VellumParser;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::op_eq, Assoc::Left) | Op::infix(Rule::op_ne, Assoc::Left))
        .op(Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
        .op(Op::prefix(Rule::op_not) | Op::prefix(Rule::op_neg))
});

// ============================================================================
// PUBLIC API
// ============================================================================

/// A successfully parsed template body together with its labelled source.
#[derive(Debug)]
pub struct Parsed {
    pub root: Block,
    pub source: SourceArc,
}

/// Parses `text` as the template `name`, applying `gobbling` to the result.
///
/// Syntax errors carry the template name, line, column, a message and the
/// offending token.
pub fn parse(text: &str, name: &Arc<str>, gobbling: SpaceGobbling) -> Result<Parsed, TemplateError> {
    let source = named_source(name, text);
    let lines = LineIndex::new(text);
    let mut builder = Builder {
        name: Arc::clone(name),
        lines: &lines,
        offsets: Vec::new(),
        markers: Markers::default(),
        source: Arc::clone(&source),
    };

    let mut root = VellumParser::parse(Rule::template, text)
        .map_err(|e| builder.convert_error(e, text))
        .and_then(|pairs| builder.build_template(pairs))
        .map_err(|e| e.with_source(&source))?;

    gobble::apply(&mut root, text, &builder.markers, gobbling);
    debug!(template = %name, nodes = root.nodes.len(), ?gobbling, "parsed template");
    Ok(Parsed { root, source })
}

// ============================================================================
// LINE INDEX
// ============================================================================

/// Byte offset to 1-based line/column lookup over the whole template.
struct LineIndex<'s> {
    text: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(text: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn line_col(&self, offset: usize) -> (usize, usize) {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let column = self.text[self.starts[line]..offset].chars().count() + 1;
        (line + 1, column)
    }
}

// ============================================================================
// AST BUILDER
// ============================================================================

struct Builder<'s> {
    name: Arc<str>,
    lines: &'s LineIndex<'s>,
    /// Template offset of each byte of the parsed input, for string
    /// interpolation. Empty when the input is the template itself.
    offsets: Vec<usize>,
    markers: Markers,
    source: SourceArc,
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, TemplateError> {
    pairs.next().ok_or_else(|| TemplateError::Parse {
        message: format!("malformed template: missing {what}"),
        token: String::new(),
        ctx: ErrorContext::none(),
    })
}

impl<'s> Builder<'s> {
    /// Maps an offset in the parsed input to an offset in the template.
    fn absolute(&self, local: usize) -> usize {
        match (self.offsets.get(local), self.offsets.last()) {
            (Some(&at), _) => at,
            (None, Some(&end)) => end,
            (None, None) => local,
        }
    }

    fn span(&self, span: pest::Span<'_>) -> Span {
        Span {
            start: self.absolute(span.start()),
            end: self.absolute(span.end()),
        }
    }

    fn pos(&self, span: pest::Span<'_>) -> Position {
        let span = self.span(span);
        let (line, column) = self.lines.line_col(span.start);
        Position {
            template: Arc::clone(&self.name),
            line,
            column,
            span,
        }
    }

    fn syntax_error(&self, message: impl Into<String>, pair: &Pair<'_, Rule>) -> TemplateError {
        TemplateError::Parse {
            message: message.into(),
            token: pair.as_str().chars().take(16).collect(),
            ctx: ErrorContext::at(&self.pos(pair.as_span())),
        }
    }

    fn build_template(&mut self, mut pairs: Pairs<'_, Rule>) -> Result<Block, TemplateError> {
        let template = next_pair(&mut pairs, "template")?;
        let block = next_pair(&mut template.into_inner(), "template body")?;
        self.build_block(block)
    }

    fn build_block(&mut self, pair: Pair<'_, Rule>) -> Result<Block, TemplateError> {
        let mut nodes: Vec<Node> = Vec::new();
        for child in pair.into_inner() {
            let node = self.build_node(child)?;
            push_node(&mut nodes, node);
        }
        Ok(Block::new(nodes))
    }

    fn build_node(&mut self, pair: Pair<'_, Rule>) -> Result<Node, TemplateError> {
        let pos = self.pos(pair.as_span());
        let span = pos.span;

        let kind = match pair.as_rule() {
            Rule::text | Rule::stray => NodeKind::Text(pair.as_str().to_string()),

            Rule::line_comment | Rule::block_comment => {
                self.markers.line(span);
                NodeKind::Comment
            }

            Rule::unterminated => {
                let what = if pair.as_str() == "#*" {
                    "unterminated block comment: missing '*#'"
                } else {
                    "unterminated raw block: missing ']]#'"
                };
                return Err(self.syntax_error(what, &pair));
            }

            Rule::raw_block => {
                let content = next_pair(&mut pair.into_inner(), "raw content")?;
                NodeKind::Raw(content.as_str().to_string())
            }

            Rule::escaped => NodeKind::Escaped(pair.as_str()[1..].to_string()),

            Rule::reference => NodeKind::Reference(self.build_reference(pair)?),

            Rule::if_directive => self.build_if(pair)?,
            Rule::foreach_directive => self.build_foreach(pair)?,

            Rule::set_directive => {
                self.markers.line(span);
                let mut inner = pair.into_inner();
                let target = self.build_reference(next_pair(&mut inner, "#set target")?)?;
                let value = self.build_expr(next_pair(&mut inner, "#set value")?)?;
                NodeKind::Set { target, value }
            }

            Rule::macro_directive => self.build_macro_definition(pair, &pos)?,

            Rule::parse_directive => {
                let expr = next_pair(&mut pair.into_inner(), "#parse argument")?;
                NodeKind::Parse(self.build_expr(expr)?)
            }

            Rule::include_directive => {
                let args = pair
                    .into_inner()
                    .map(|p| self.build_expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                NodeKind::Include(args)
            }

            Rule::evaluate_directive => {
                let expr = next_pair(&mut pair.into_inner(), "#evaluate argument")?;
                NodeKind::Evaluate(self.build_expr(expr)?)
            }

            Rule::stop_directive => {
                self.markers.line(span);
                NodeKind::Stop
            }

            Rule::break_directive => {
                self.markers.line(span);
                match pair.into_inner().next() {
                    Some(label) => NodeKind::Break(BreakScope::from_label(label.as_str())),
                    None => NodeKind::Break(BreakScope::Innermost),
                }
            }

            Rule::block_macro_call => {
                let literal = pair.as_str().to_string();
                let mut inner = pair.into_inner();
                let head = next_pair(&mut inner, "block macro call")?;
                let head_span = self.span(head.as_span());
                let (name, args) = self.build_call_head(head)?;
                let body = self.build_block(next_pair(&mut inner, "block macro body")?)?;
                let end = next_pair(&mut inner, "#end")?;
                self.close_region(head_span, &end);
                NodeKind::MacroCall(MacroCall {
                    name,
                    args,
                    body: Some(body),
                    literal,
                })
            }

            Rule::macro_call => {
                let literal = pair.as_str().to_string();
                let (name, args) = self.build_call_head(pair)?;
                NodeKind::MacroCall(MacroCall {
                    name,
                    args,
                    body: None,
                    literal,
                })
            }

            rule => {
                return Err(self.syntax_error(format!("unsupported construct: {rule:?}"), &pair));
            }
        };

        Ok(Node { kind, pos })
    }

    fn close_region(&mut self, head: Span, end: &Pair<'_, Rule>) {
        let end = self.span(end.as_span());
        self.markers.line(head);
        self.markers.line(end);
        self.markers.region(head, end);
    }

    fn build_if(&mut self, pair: Pair<'_, Rule>) -> Result<NodeKind, TemplateError> {
        let mut inner = pair.into_inner();
        let head = next_pair(&mut inner, "#if condition")?;
        let head_span = self.span(head.as_span());
        let condition = self.build_expr(next_pair(&mut head.into_inner(), "#if condition")?)?;
        let body = self.build_block(next_pair(&mut inner, "#if body")?)?;

        let mut branches = vec![Branch { condition, body }];
        let mut otherwise = None;
        for part in inner {
            match part.as_rule() {
                Rule::elseif_branch => {
                    let mut parts = part.into_inner();
                    let head = next_pair(&mut parts, "#elseif")?;
                    self.markers.line(self.span(head.as_span()));
                    let condition =
                        self.build_expr(next_pair(&mut head.into_inner(), "#elseif condition")?)?;
                    let body = self.build_block(next_pair(&mut parts, "#elseif body")?)?;
                    branches.push(Branch { condition, body });
                }
                Rule::else_branch => otherwise = Some(self.build_else(part)?),
                Rule::end_marker => self.close_region(head_span, &part),
                rule => return Err(self.syntax_error(format!("unexpected {rule:?} in #if"), &part)),
            }
        }
        Ok(NodeKind::If {
            branches,
            otherwise,
        })
    }

    fn build_else(&mut self, pair: Pair<'_, Rule>) -> Result<Block, TemplateError> {
        let mut parts = pair.into_inner();
        let head = next_pair(&mut parts, "#else")?;
        self.markers.line(self.span(head.as_span()));
        self.build_block(next_pair(&mut parts, "#else body")?)
    }

    fn build_foreach(&mut self, pair: Pair<'_, Rule>) -> Result<NodeKind, TemplateError> {
        let mut inner = pair.into_inner();
        let head = next_pair(&mut inner, "#foreach")?;
        let head_span = self.span(head.as_span());
        let mut head_parts = head.into_inner();
        let var = next_pair(&mut head_parts, "loop variable")?;
        let var = next_pair(&mut var.into_inner(), "loop variable name")?
            .as_str()
            .to_string();
        let iterable = self.build_expr(next_pair(&mut head_parts, "#foreach collection")?)?;
        let body = self.build_block(next_pair(&mut inner, "#foreach body")?)?;

        let mut otherwise = None;
        for part in inner {
            match part.as_rule() {
                Rule::else_branch => otherwise = Some(self.build_else(part)?),
                Rule::end_marker => self.close_region(head_span, &part),
                rule => {
                    return Err(self.syntax_error(format!("unexpected {rule:?} in #foreach"), &part))
                }
            }
        }
        Ok(NodeKind::Foreach {
            var,
            iterable,
            body,
            otherwise,
        })
    }

    fn build_macro_definition(
        &mut self,
        pair: Pair<'_, Rule>,
        pos: &Position,
    ) -> Result<NodeKind, TemplateError> {
        let mut inner = pair.into_inner();
        let head = next_pair(&mut inner, "#macro")?;
        let head_span = self.span(head.as_span());
        let mut head_parts = head.into_inner();
        let name = next_pair(&mut head_parts, "macro name")?.as_str().to_string();

        let mut params = Vec::new();
        for param in head_parts {
            let param_pos = self.pos(param.as_span());
            let mut parts = param.into_inner();
            let param_name = next_pair(&mut parts, "parameter name")?.as_str().to_string();
            let default = parts.next().map(|p| self.build_expr(p)).transpose()?;
            params.push(MacroParam {
                name: param_name,
                default,
                pos: param_pos,
            });
        }

        let body = self.build_block(next_pair(&mut inner, "#macro body")?)?;
        let end = next_pair(&mut inner, "#end")?;
        self.close_region(head_span, &end);

        Ok(NodeKind::MacroDef(Arc::new(MacroDefinition {
            name,
            params,
            body,
            template: Arc::clone(&self.name),
            source: Arc::clone(&self.source),
            pos: pos.clone(),
        })))
    }

    fn build_call_head(
        &self,
        pair: Pair<'_, Rule>,
    ) -> Result<(String, Vec<MacroArg>), TemplateError> {
        let mut inner = pair.into_inner();
        let name = next_pair(&mut inner, "macro name")?.as_str().to_string();
        let args_pair = next_pair(&mut inner, "macro arguments")?;

        let mut args = Vec::new();
        for arg in args_pair.into_inner() {
            match arg.as_rule() {
                Rule::named_arg => {
                    let mut parts = arg.into_inner();
                    let arg_name = next_pair(&mut parts, "argument name")?.as_str().to_string();
                    let value = self.build_arg_value(next_pair(&mut parts, "argument value")?)?;
                    args.push(MacroArg {
                        name: Some(arg_name),
                        value,
                    });
                }
                Rule::positional_arg => {
                    let value = self.build_arg_value(next_pair(&mut arg.into_inner(), "argument")?)?;
                    args.push(MacroArg { name: None, value });
                }
                rule => return Err(self.syntax_error(format!("unexpected {rule:?} in macro call"), &arg)),
            }
        }
        Ok((name, args))
    }

    fn build_arg_value(&self, pair: Pair<'_, Rule>) -> Result<Expr, TemplateError> {
        if pair.as_rule() == Rule::bare_word {
            return Ok(Expr {
                kind: ExprKind::BareWord(pair.as_str().to_string()),
                pos: self.pos(pair.as_span()),
            });
        }
        self.build_primary(pair)
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    fn build_reference(&self, pair: Pair<'_, Rule>) -> Result<Reference, TemplateError> {
        let pos = self.pos(pair.as_span());
        let literal = pair.as_str().to_string();
        let mut quiet = false;
        let mut root = String::new();
        let mut segments = Vec::new();

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::quiet => quiet = true,
                Rule::formal => {
                    for inner in part.into_inner() {
                        self.reference_part(inner, &mut root, &mut segments)?;
                    }
                }
                _ => self.reference_part(part, &mut root, &mut segments)?,
            }
        }

        Ok(Reference {
            root,
            quiet,
            segments,
            literal,
            pos,
        })
    }

    fn reference_part(
        &self,
        pair: Pair<'_, Rule>,
        root: &mut String,
        segments: &mut Vec<Segment>,
    ) -> Result<(), TemplateError> {
        let pos = self.pos(pair.as_span());
        let kind = match pair.as_rule() {
            Rule::ident => {
                *root = pair.as_str().to_string();
                return Ok(());
            }
            Rule::property => {
                let name = next_pair(&mut pair.into_inner(), "property name")?;
                SegmentKind::Property(name.as_str().to_string())
            }
            Rule::method_call => {
                let mut inner = pair.into_inner();
                let name = next_pair(&mut inner, "method name")?.as_str().to_string();
                let args = inner
                    .map(|p| self.build_expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                SegmentKind::Method { name, args }
            }
            Rule::index => {
                let expr = next_pair(&mut pair.into_inner(), "index expression")?;
                SegmentKind::Index(self.build_expr(expr)?)
            }
            rule => return Err(self.syntax_error(format!("unexpected {rule:?} in reference"), &pair)),
        };
        segments.push(Segment::new(kind, pos));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn build_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr, TemplateError> {
        PRATT
            .map_primary(|p| self.build_primary(p))
            .map_prefix(|op, operand| {
                let operand = operand?;
                let pos = self.join(&self.pos(op.as_span()), &operand.pos);
                Ok(fold_prefix(op.as_rule(), operand, pos))
            })
            .map_infix(|lhs, op, rhs| {
                let (lhs, rhs) = (lhs?, rhs?);
                let op = binary_op(op.as_rule());
                let pos = self.join(&lhs.pos, &rhs.pos);
                Ok(Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    pos,
                })
            })
            .parse(pair.into_inner())
    }

    fn join(&self, first: &Position, last: &Position) -> Position {
        Position {
            span: Span {
                start: first.span.start,
                end: last.span.end,
            },
            ..first.clone()
        }
    }

    fn build_primary(&self, pair: Pair<'_, Rule>) -> Result<Expr, TemplateError> {
        let pos = self.pos(pair.as_span());
        let kind = match pair.as_rule() {
            Rule::expr => return self.build_expr(pair),
            Rule::number => ExprKind::Literal(self.build_number(&pair)?),
            Rule::boolean => ExprKind::Literal(Literal::Bool(pair.as_str() == "true")),
            Rule::null_lit => ExprKind::Literal(Literal::Null),
            Rule::sq_string => {
                let inner = next_pair(&mut pair.into_inner(), "string content")?;
                ExprKind::Literal(Literal::Str(Arc::from(inner.as_str().replace("''", "'"))))
            }
            Rule::dq_string => {
                let inner = next_pair(&mut pair.into_inner(), "string content")?;
                self.build_dq_string(inner)?
            }
            Rule::range => {
                let mut inner = pair.into_inner();
                let from = self.build_expr(next_pair(&mut inner, "range start")?)?;
                let to = self.build_expr(next_pair(&mut inner, "range end")?)?;
                ExprKind::Range(Box::new(from), Box::new(to))
            }
            Rule::list => ExprKind::List(
                pair.into_inner()
                    .map(|p| self.build_expr(p))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Rule::map => {
                let mut entries = Vec::new();
                for entry in pair.into_inner() {
                    let mut kv = entry.into_inner();
                    let key = self.build_expr(next_pair(&mut kv, "map key")?)?;
                    let value = self.build_expr(next_pair(&mut kv, "map value")?)?;
                    entries.push((key, value));
                }
                ExprKind::Map(entries)
            }
            Rule::reference => ExprKind::Reference(self.build_reference(pair)?),
            Rule::bare_word => ExprKind::BareWord(pair.as_str().to_string()),
            rule => return Err(self.syntax_error(format!("unexpected {rule:?} in expression"), &pair)),
        };
        Ok(Expr { kind, pos })
    }

    fn build_number(&self, pair: &Pair<'_, Rule>) -> Result<Literal, TemplateError> {
        let text = pair.as_str();
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| self.syntax_error("invalid float literal", pair))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| self.syntax_error("integer literal out of range", pair))
        }
    }

    /// Double-quoted strings are templates of their own when they contain `$` or `#`.
    fn build_dq_string(&self, inner: Pair<'_, Rule>) -> Result<ExprKind, TemplateError> {
        let (content, origins) = unescape_quotes(inner.as_str());
        if !content.contains(['$', '#']) {
            return Ok(ExprKind::Literal(Literal::Str(Arc::from(content))));
        }

        let start = inner.as_span().start();
        let mut sub = Builder {
            name: Arc::clone(&self.name),
            lines: self.lines,
            offsets: origins.iter().map(|&at| self.absolute(start + at)).collect(),
            markers: Markers::default(),
            source: Arc::clone(&self.source),
        };
        let pairs = VellumParser::parse(Rule::template, &content)
            .map_err(|e| sub.convert_error(e, &content))?;
        let block = sub.build_template(pairs)?;

        if block.iter().all(|n| matches!(n.kind, NodeKind::Text(_))) {
            let text: String = block
                .iter()
                .filter_map(|n| match &n.kind {
                    NodeKind::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect();
            return Ok(ExprKind::Literal(Literal::Str(Arc::from(text))));
        }
        Ok(ExprKind::Interpolated(block))
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    fn convert_error(&self, error: Error<Rule>, input: &str) -> TemplateError {
        let local = match error.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let token = offending_token(input, local);
        let message = match &error.variant {
            ErrorVariant::ParsingError { positives, .. } => describe_expected(positives),
            ErrorVariant::CustomError { message } => message.clone(),
        };

        let start = self.absolute(local);
        let end = if local >= input.len() {
            start
        } else {
            self.absolute((local + token.len()).min(input.len()))
        };
        let (line, column) = self.lines.line_col(start);
        let pos = Position {
            template: Arc::clone(&self.name),
            line,
            column,
            span: Span { start, end },
        };
        TemplateError::Parse {
            message,
            token,
            ctx: ErrorContext::at(&pos),
        }
    }
}

/// Appends a node, merging adjacent text so gobbling sees whole runs.
fn push_node(nodes: &mut Vec<Node>, node: Node) {
    if let (Some(prev), NodeKind::Text(next)) = (nodes.last_mut(), &node.kind) {
        if let NodeKind::Text(prev_text) = &mut prev.kind {
            if prev.pos.span.end == node.pos.span.start {
                prev_text.push_str(next);
                prev.pos.span.end = node.pos.span.end;
                return;
            }
        }
    }
    nodes.push(node);
}

fn fold_prefix(rule: Rule, operand: Expr, pos: Position) -> Expr {
    let kind = match (rule, operand.kind) {
        (Rule::op_neg, ExprKind::Literal(Literal::Int(n))) if n != i64::MIN => {
            ExprKind::Literal(Literal::Int(-n))
        }
        (Rule::op_neg, ExprKind::Literal(Literal::Float(f))) => ExprKind::Literal(Literal::Float(-f)),
        (rule, kind) => {
            let op = if rule == Rule::op_not {
                UnaryOp::Not
            } else {
                UnaryOp::Neg
            };
            ExprKind::Unary {
                op,
                operand: Box::new(Expr {
                    kind,
                    pos: operand.pos,
                }),
            }
        }
    };
    Expr { kind, pos }
}

fn binary_op(rule: Rule) -> BinaryOp {
    match rule {
        Rule::op_or => BinaryOp::Or,
        Rule::op_and => BinaryOp::And,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_le => BinaryOp::Le,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_ge => BinaryOp::Ge,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        _ => BinaryOp::Mod,
    }
}

/// Collapses `\"` to `"`, recording for each byte of the result (and its
/// end) the offset it came from.
fn unescape_quotes(raw: &str) -> (String, Vec<usize>) {
    let mut content = String::with_capacity(raw.len());
    let mut origins = Vec::with_capacity(raw.len() + 1);
    let mut chars = raw.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some((_, '"'))) {
            chars.next();
            content.push('"');
            origins.push(at);
            continue;
        }
        content.push(c);
        origins.extend(at..at + c.len_utf8());
    }
    origins.push(raw.len());
    (content, origins)
}

fn offending_token(input: &str, offset: usize) -> String {
    match input.get(offset..) {
        Some(rest) if !rest.is_empty() => {
            let token: String = rest
                .chars()
                .take_while(|c| !c.is_whitespace())
                .take(16)
                .collect();
            if token.is_empty() {
                rest.chars().take(1).collect()
            } else {
                token
            }
        }
        _ => "end of input".to_string(),
    }
}

fn describe_expected(positives: &[Rule]) -> String {
    let closes_block = [
        Rule::end_marker,
        Rule::else_branch,
        Rule::else_head,
        Rule::elseif_branch,
        Rule::elseif_head,
    ];
    if positives.iter().any(|r| closes_block.contains(r)) {
        return "missing #end for an open block directive".to_string();
    }
    if positives.contains(&Rule::EOI) {
        return "#end, #else or #elseif without an open block directive".to_string();
    }

    let mut expected: Vec<&'static str> = Vec::new();
    for rule in positives {
        let description = describe_rule(*rule);
        if !expected.contains(&description) {
            expected.push(description);
        }
    }
    if expected.is_empty() {
        "syntax error".to_string()
    } else {
        format!("expected {}", expected.join(" or "))
    }
}

fn describe_rule(rule: Rule) -> &'static str {
    match rule {
        Rule::expr
        | Rule::op_not
        | Rule::op_neg
        | Rule::range
        | Rule::list
        | Rule::map
        | Rule::dq_string
        | Rule::sq_string
        | Rule::number
        | Rule::boolean
        | Rule::null_lit
        | Rule::bare_word => "an expression",
        Rule::reference | Rule::quiet | Rule::formal => "a reference",
        Rule::op_or
        | Rule::op_and
        | Rule::op_eq
        | Rule::op_ne
        | Rule::op_lt
        | Rule::op_le
        | Rule::op_gt
        | Rule::op_ge
        | Rule::op_add
        | Rule::op_sub
        | Rule::op_mul
        | Rule::op_div
        | Rule::op_mod => "an operator",
        Rule::method_call | Rule::property | Rule::index => "a property, method or index",
        Rule::ident | Rule::macro_name => "a name",
        Rule::loop_var => "a loop variable",
        Rule::macro_param => "a macro parameter",
        Rule::named_arg | Rule::positional_arg | Rule::macro_args => "a macro argument",
        Rule::dq_inner | Rule::sq_inner => "a closing quote",
        Rule::map_entry => "a map entry",
        _ => "valid template syntax",
    }
}
