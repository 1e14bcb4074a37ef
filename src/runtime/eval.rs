//! Expression evaluation and reference resolution.
//!
//! ## Strict references
//!
//! With `strict_references` off, anything that does not resolve quietly
//! becomes null: an undefined variable, a member missing on its receiver, a
//! null in the middle of a chain, an ambiguous overload (logged). With it on,
//! those are errors, with two exceptions:
//!
//! - bare references inside `#if`/`#elseif` conditions, also under `!`, `&&`,
//!   `||`, `==` and `!=` (`#if($user && $user.admin)` stays legal);
//! - quiet references, `$!name`.
//!
//! A member that resolves but fails when invoked is always an error.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Position, Reference, Segment, SegmentKind, UnaryOp};
use crate::diagnostics::TemplateError;
use crate::err_at;
use crate::introspect::{DispatchFailure, MemberKind};
use crate::runtime::{ops, RenderContext, Value};

impl RenderContext<'_> {
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, TemplateError> {
        self.eval_with(expr, false)
    }

    /// Evaluates an `#if`/`#elseif` condition to its truthiness.
    pub fn eval_condition(&mut self, expr: &Expr) -> Result<bool, TemplateError> {
        Ok(self.eval_with(expr, true)?.is_truthy())
    }

    fn eval_with(&mut self, expr: &Expr, lenient: bool) -> Result<Value, TemplateError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal_value(lit)),
            ExprKind::Interpolated(block) => {
                let mut text = String::new();
                self.render_block(block, &mut text)?;
                Ok(Value::from(text))
            }
            ExprKind::Reference(r) => self.resolve(r, lenient),
            ExprKind::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(values))
            }
            ExprKind::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?.to_string();
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(Arc::new(RwLock::new(map))))
            }
            ExprKind::Range(from, to) => {
                let (from, to) = self.range_bounds(from, to, &expr.pos)?;
                self.check_range_size(from, to, &expr.pos)?;
                Ok(Value::list(range_values(from, to).map(Value::Int).collect()))
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(Value::Bool(!self.eval_with(operand, lenient)?.is_truthy())),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let value = self.eval(operand)?;
                self.check_operand(&value, "-", operand)?;
                ops::negate(&value, &expr.pos)
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                if !self.eval_with(lhs, lenient)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_with(rhs, lenient)?.is_truthy()))
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                if self.eval_with(lhs, lenient)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_with(rhs, lenient)?.is_truthy()))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
                let l = self.eval_with(lhs, lenient && equality)?;
                let r = self.eval_with(rhs, lenient && equality)?;
                if !equality {
                    self.check_operand(&l, op.symbol(), lhs)?;
                    self.check_operand(&r, op.symbol(), rhs)?;
                }
                ops::binary(*op, &l, &r, &expr.pos)
            }
            ExprKind::BareWord(word) => Err(err_at!(
                Render,
                format!("'{word}' is not a value; write ${word} or quote it"),
                &expr.pos
            )),
        }
    }

    /// Evaluates the bounds of `[from..to]`.
    pub(crate) fn range_bounds(
        &mut self,
        from: &Expr,
        to: &Expr,
        pos: &Position,
    ) -> Result<(i64, i64), TemplateError> {
        let from = self.eval(from)?;
        let to = self.eval(to)?;
        match (from.as_int(), to.as_int()) {
            (Some(from), Some(to)) => Ok((from, to)),
            _ => Err(err_at!(
                Render,
                format!(
                    "range bounds must be integers, found {} and {}",
                    from.type_name(),
                    to.type_name()
                ),
                pos
            )),
        }
    }

    /// Ranges built as lists hold at most `range_max_size` elements.
    pub(crate) fn check_range_size(&self, from: i64, to: i64, pos: &Position) -> Result<(), TemplateError> {
        let max = self.config().range_max_size;
        if from.abs_diff(to) >= max as u64 {
            return Err(err_at!(
                Render,
                format!("range [{from}..{to}] exceeds the limit of {max} elements"),
                pos
            ));
        }
        Ok(())
    }

    /// Strict mode refuses null operands of arithmetic and ordering.
    fn check_operand(&self, value: &Value, op: &str, operand: &Expr) -> Result<(), TemplateError> {
        if value.is_null() && self.strict() {
            return Err(err_at!(
                Render,
                format!("null operand of '{op}'"),
                &operand.pos
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    /// Resolves a reference left to right.
    ///
    /// `lenient` marks condition context, where a bare undefined reference is
    /// simply false.
    pub fn resolve(&mut self, r: &Reference, lenient: bool) -> Result<Value, TemplateError> {
        let exempt = r.quiet || (lenient && r.segments.is_empty());
        self.walk(r, &r.segments, exempt)
    }

    fn walk(&mut self, r: &Reference, segments: &[Segment], exempt: bool) -> Result<Value, TemplateError> {
        let strict = self.strict() && !exempt;
        let Some(mut current) = self.get(&r.root) else {
            if strict {
                return Err(err_at!(
                    UndefinedReference,
                    format!("variable ${} is not defined", r.root),
                    &r.pos
                ));
            }
            return Ok(Value::Null);
        };

        for segment in segments {
            if current.is_null() {
                if strict {
                    return Err(err_at!(
                        UndefinedReference,
                        format!(
                            "cannot access {} on a null value in '{}'",
                            describe(segment),
                            r.literal
                        ),
                        &segment.pos
                    ));
                }
                return Ok(Value::Null);
            }
            current = match &segment.kind {
                SegmentKind::Property(name) => {
                    self.member(&current, segment, MemberKind::Get, name, &[], strict)?
                }
                SegmentKind::Method { name, args } => {
                    let args = args
                        .iter()
                        .map(|arg| self.eval(arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.member(&current, segment, MemberKind::Method, name, &args, strict)?
                }
                SegmentKind::Index(index) => {
                    let index = self.eval(index)?;
                    self.index(&current, &index, segment, strict)?
                }
            };
        }
        Ok(current)
    }

    /// Dispatches a member request on `receiver` through the caches.
    fn member(
        &mut self,
        receiver: &Value,
        segment: &Segment,
        kind: MemberKind,
        name: &str,
        args: &[Value],
        strict: bool,
    ) -> Result<Value, TemplateError> {
        let plan = match self.plan_for(segment.node_id(), receiver, kind, name, args) {
            Ok(plan) => plan,
            Err(DispatchFailure::NotFound(message)) => {
                if strict {
                    return Err(err_at!(Dispatch, message, &segment.pos));
                }
                return Ok(Value::Null);
            }
            Err(DispatchFailure::Ambiguous(message)) => {
                if strict {
                    return Err(err_at!(Dispatch, message, &segment.pos));
                }
                warn!(at = %segment.pos, "{message}");
                return Ok(Value::Null);
            }
        };
        self.services
            .introspector
            .invoke(&plan, receiver, name, args)
            .map_err(|e| {
                err_at!(
                    Dispatch,
                    format!("{}.{} failed: {}", receiver.type_name(), plan.member, e),
                    &segment.pos
                )
            })
    }

    /// `receiver[index]`: positional on lists and strings (negative counts
    /// from the end), keyed on maps, `get(index)` on anything else.
    fn index(
        &mut self,
        receiver: &Value,
        index: &Value,
        segment: &Segment,
        strict: bool,
    ) -> Result<Value, TemplateError> {
        let found = match (receiver, index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.read();
                position(*i, items.len()).map(|at| items[at].clone())
            }
            (Value::String(s), Value::Int(i)) => {
                let len = s.chars().count();
                position(*i, len).and_then(|at| s.chars().nth(at)).map(|c| Value::from(c.to_string()))
            }
            (Value::Map(map), key) => {
                return Ok(map.read().get(&key.to_string()).cloned().unwrap_or_default());
            }
            _ => {
                return self.member(
                    receiver,
                    segment,
                    MemberKind::Method,
                    "get",
                    std::slice::from_ref(index),
                    strict,
                );
            }
        };
        match found {
            Some(value) => Ok(value),
            None if strict => Err(err_at!(
                Render,
                format!("index {index} is out of bounds for {}", receiver.type_name()),
                &segment.pos
            )),
            None => Ok(Value::Null),
        }
    }

    // ------------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------------

    /// `#set(target = value)`.
    pub fn assign(&mut self, target: &Reference, value: Value) -> Result<(), TemplateError> {
        let Some((last, prefix)) = target.segments.split_last() else {
            if value.is_null() && self.strict() {
                warn!(at = %target.pos, "#set of {} to null removes the variable", target.literal);
            }
            self.put(&target.root, value);
            return Ok(());
        };

        let strict = self.strict();
        let receiver = self.walk(target, prefix, false)?;
        if receiver.is_null() {
            if strict {
                return Err(err_at!(
                    UndefinedReference,
                    format!("cannot assign '{}': its receiver is null", target.literal),
                    &last.pos
                ));
            }
            warn!(at = %last.pos, "#set skipped: the receiver of {} is null", target.literal);
            return Ok(());
        }

        match &last.kind {
            SegmentKind::Property(name) => match &receiver {
                Value::Map(map) => {
                    let mut map = map.write();
                    if value.is_null() {
                        map.shift_remove(name);
                    } else {
                        map.insert(name.clone(), value);
                    }
                    Ok(())
                }
                _ => {
                    let args = [value];
                    self.member(&receiver, last, MemberKind::Set, name, &args, strict)
                        .map(drop)
                }
            },
            SegmentKind::Index(index) => {
                let index = self.eval(index)?;
                match (&receiver, &index) {
                    (Value::List(items), Value::Int(i)) => {
                        let mut items = items.write();
                        let len = items.len();
                        match position(*i, len) {
                            Some(at) => {
                                items[at] = value;
                                Ok(())
                            }
                            None => Err(err_at!(
                                Render,
                                format!("index {i} is out of bounds for a list of size {len}"),
                                &last.pos
                            )),
                        }
                    }
                    (Value::Map(map), key) => {
                        map.write().insert(key.to_string(), value);
                        Ok(())
                    }
                    _ => {
                        let args = [index, value];
                        self.member(&receiver, last, MemberKind::Method, "put", &args, strict)
                            .map(drop)
                    }
                }
            }
            SegmentKind::Method { name, .. } => Err(err_at!(
                Render,
                format!("cannot assign to the method call '{name}(...)'"),
                &last.pos
            )),
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::String(Arc::clone(s)),
    }
}

/// `[from..to]`, inclusive, counting down when `from > to`. Lazy, so a
/// capped `#foreach` never materialises the whole range.
pub(crate) fn range_values(from: i64, to: i64) -> impl Iterator<Item = i64> {
    let step = if from <= to { 1 } else { -1 };
    std::iter::successors(Some(from), move |&n| (n != to).then(|| n + step))
}

/// Maps a possibly negative index onto `0..len`.
fn position(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let at = if index < 0 { len + index } else { index };
    (0..len).contains(&at).then_some(at as usize)
}

fn describe(segment: &Segment) -> String {
    match &segment.kind {
        SegmentKind::Property(name) => format!("'.{name}'"),
        SegmentKind::Method { name, .. } => format!("'.{name}(...)'"),
        SegmentKind::Index(_) => "an index".to_string(),
    }
}
