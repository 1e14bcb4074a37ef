//! Operator semantics for template expressions.
//!
//! Integers stay integers (checked, overflow is an error), any float operand
//! promotes the operation to float, and `+` concatenates as soon as one side
//! is a string. Null operands short-circuit to null; strict mode rejects them
//! before they get here.

use std::cmp::Ordering;

use crate::ast::{BinaryOp, Position};
use crate::diagnostics::TemplateError;
use crate::err_at;
use crate::runtime::Value;

/// Equality as `==` sees it.
///
/// Null equals only null, numbers compare numerically across integer and
/// float, and values of different kinds compare by their rendered text.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_float() == b.as_float()
        }
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(_), Value::Object(_)) | (Value::List(_), Value::List(_))
        | (Value::Map(_), Value::Map(_)) => a == b || a.to_string() == b.to_string(),
        _ => a.to_string() == b.to_string(),
    }
}

/// Ordering for `<`, `<=`, `>` and `>=`; `None` when the kinds do not compare.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_float()?.partial_cmp(&b.as_float()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Applies a non-logical binary operator. `&&` and `||` short-circuit in the
/// evaluator and never reach this function.
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value, pos: &Position) -> Result<Value, TemplateError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => relational(op, lhs, rhs, pos),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, lhs, rhs, pos)
        }
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
    }
}

fn relational(op: BinaryOp, lhs: &Value, rhs: &Value, pos: &Position) -> Result<Value, TemplateError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Bool(false));
    }
    let Some(ordering) = compare(lhs, rhs) else {
        return Err(err_at!(
            Render,
            format!(
                "cannot compare {} with {} using '{}'",
                lhs.type_name(),
                rhs.type_name(),
                op.symbol()
            ),
            pos
        ));
    };
    let result = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value, pos: &Position) -> Result<Value, TemplateError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Add && (matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_))) {
        return Ok(Value::string(format!("{lhs}{rhs}")));
    }

    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b, pos),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (lhs.as_float().unwrap_or(0.0), rhs.as_float().unwrap_or(0.0));
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        _ => Err(err_at!(
            Render,
            format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            ),
            pos
        )),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64, pos: &Position) -> Result<Value, TemplateError> {
    if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Mod) {
        return Err(err_at!(
            DivisionByZero,
            format!("{a} {} 0", op.symbol()),
            pos
        ));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.map(Value::Int).ok_or_else(|| {
        err_at!(
            Render,
            format!("integer overflow in {a} {} {b}", op.symbol()),
            pos
        )
    })
}

/// Unary minus.
pub fn negate(value: &Value, pos: &Position) -> Result<Value, TemplateError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| err_at!(Render, format!("integer overflow in -({n})"), pos)),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(err_at!(
            Render,
            format!("cannot negate {}", other.type_name()),
            pos
        )),
    }
}
