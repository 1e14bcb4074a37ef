//! Member resolution with overload scoring and a shared resolution cache.
//!
//! Resolutions are cached by (receiver type, member kind, member name,
//! argument-kind signature). Types are assumed stable for the lifetime of an
//! engine, so entries are never invalidated; new receiver types add entries.
//!
//! ## Overload scoring
//!
//! Each argument is scored against its parameter and the totals compared:
//!
//! | match                                   | score |
//! |-----------------------------------------|-------|
//! | exact kind                              | 4     |
//! | integer widened to float                | 3     |
//! | any value to `Any`, null to a nullable  | 2     |
//! | each argument absorbed by varargs       | 1     |
//!
//! A mismatching argument disqualifies the candidate. The highest total
//! wins; between equal totals a fixed-arity candidate beats a varargs one,
//! and any other tie is an ambiguity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::{descriptor_for, property_accessor, InvocationError, MethodSpec, ParamType, TypeDescriptor, TypeKey};
use crate::runtime::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Get,
    Set,
}

/// How a resolved member is reached from the original request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `$x.name(args)`.
    Method,
    /// `$x.name` through `getName()` or `isName()`.
    Getter,
    /// `$x.name` through `get("name")`.
    KeyedGet,
    /// `#set($x.name = v)` through `setName(v)`.
    Setter,
    /// `#set($x.name = v)` through `put("name", v)`.
    KeyedPut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    None,
    IntToFloat,
}

/// A resolved member plus the argument conversions to apply before calling it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub access: Access,
    pub member: String,
    pub index: usize,
    pub coercions: Vec<Coercion>,
    /// Position from which trailing arguments are packed into a list.
    pub varargs_from: Option<usize>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The receiver has no member answering the request.
    NotFound(String),
    /// Several overloads score the same.
    Ambiguous(String),
}

impl DispatchFailure {
    pub fn message(&self) -> &str {
        match self {
            DispatchFailure::NotFound(m) | DispatchFailure::Ambiguous(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    receiver: TypeKey,
    kind: MemberKind,
    name: String,
    signature: Vec<TypeKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Resolves and invokes members; shared by every render of an engine.
#[derive(Debug, Default)]
pub struct Introspector {
    cache: RwLock<HashMap<ResolutionKey, Arc<DispatchPlan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Introspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.read().len(),
        }
    }

    /// Resolves a member request against the runtime type of `receiver`.
    ///
    /// For `Get`, `args` is empty; for `Set`, it holds the assigned value.
    pub fn resolve(
        &self,
        receiver: &Value,
        kind: MemberKind,
        name: &str,
        args: &[Value],
    ) -> Result<Arc<DispatchPlan>, DispatchFailure> {
        let key = ResolutionKey {
            receiver: receiver.type_key(),
            kind,
            name: name.to_string(),
            signature: args.iter().map(Value::type_key).collect(),
        };

        // Fast path: check read lock first
        if let Some(plan) = self.cache.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(plan));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let desc = descriptor_for(receiver).ok_or_else(|| {
            DispatchFailure::NotFound(format!("null has no member '{name}'"))
        })?;
        let plan = Arc::new(resolve_uncached(desc, &key)?);
        trace!(receiver = desc.name(), member = %plan.member, ?kind, "resolved member");

        // Double-check in case another thread resolved while we were scoring
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(key).or_insert(plan)))
    }

    /// Calls the member `plan` points at.
    ///
    /// `args` are the request's values: call arguments for methods, nothing
    /// for reads, the assigned value for writes.
    pub fn invoke(
        &self,
        plan: &DispatchPlan,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let desc = descriptor_for(receiver)
            .ok_or_else(|| InvocationError::new(format!("cannot invoke '{name}' on null")))?;
        let method = desc.method(plan.index).ok_or_else(|| {
            InvocationError::new(format!("{} has no member #{}", desc.name(), plan.index))
        })?;

        let mut call_args: Vec<Value> = match plan.access {
            Access::Method | Access::Getter | Access::Setter => args.to_vec(),
            Access::KeyedGet => vec![Value::from(name)],
            Access::KeyedPut => {
                let mut v = vec![Value::from(name)];
                v.extend(args.iter().cloned());
                v
            }
        };
        for (arg, coercion) in call_args.iter_mut().zip(&plan.coercions) {
            if let (Coercion::IntToFloat, Value::Int(n)) = (coercion, &*arg) {
                *arg = Value::Float(*n as f64);
            }
        }
        if let Some(from) = plan.varargs_from {
            let rest = call_args.split_off(from.min(call_args.len()));
            call_args.push(Value::list(rest));
        }
        method.call(receiver, &call_args)
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

fn resolve_uncached(desc: &TypeDescriptor, key: &ResolutionKey) -> Result<DispatchPlan, DispatchFailure> {
    let name = key.name.as_str();
    match key.kind {
        MemberKind::Method => best_overload(desc, name, &key.signature, Access::Method)?
            .ok_or_else(|| not_found(desc, name, &key.signature)),
        MemberKind::Get => {
            for prefix in ["get", "is"] {
                let accessor = property_accessor(prefix, name);
                if let Some(plan) = best_overload(desc, &accessor, &[], Access::Getter)? {
                    return Ok(plan);
                }
            }
            best_overload(desc, "get", &[TypeKey::String], Access::KeyedGet)?.ok_or_else(|| {
                DispatchFailure::NotFound(format!("{} has no property '{}'", desc.name(), name))
            })
        }
        MemberKind::Set => {
            let accessor = property_accessor("set", name);
            if let Some(plan) = best_overload(desc, &accessor, &key.signature, Access::Setter)? {
                return Ok(plan);
            }
            let mut put_sig = vec![TypeKey::String];
            put_sig.extend(key.signature.iter().copied());
            best_overload(desc, "put", &put_sig, Access::KeyedPut)?.ok_or_else(|| {
                DispatchFailure::NotFound(format!(
                    "{} has no writable property '{}'",
                    desc.name(),
                    name
                ))
            })
        }
    }
}

fn not_found(desc: &TypeDescriptor, name: &str, signature: &[TypeKey]) -> DispatchFailure {
    if desc.overloads(name).is_empty() {
        DispatchFailure::NotFound(format!("{} has no method '{}'", desc.name(), name))
    } else {
        DispatchFailure::NotFound(format!(
            "no overload of {}.{} accepts {}",
            desc.name(),
            name,
            describe_signature(signature)
        ))
    }
}

fn describe_signature(signature: &[TypeKey]) -> String {
    let kinds: Vec<String> = signature.iter().map(|k| format!("{k:?}")).collect();
    format!("({})", kinds.join(", "))
}

/// Scores every overload of `name`; `Ok(None)` when none is applicable.
fn best_overload(
    desc: &TypeDescriptor,
    name: &str,
    signature: &[TypeKey],
    access: Access,
) -> Result<Option<DispatchPlan>, DispatchFailure> {
    let mut best: Option<(DispatchPlan, bool)> = None;
    let mut tied = false;

    for &index in desc.overloads(name) {
        let Some(method) = desc.method(index) else {
            continue;
        };
        let Some((score, coercions, varargs_from)) = score_candidate(method, signature) else {
            continue;
        };
        let fixed = varargs_from.is_none();
        let plan = DispatchPlan {
            access,
            member: name.to_string(),
            index,
            coercions,
            varargs_from,
            score,
        };

        match &best {
            None => best = Some((plan, fixed)),
            Some((current, current_fixed)) => {
                if score > current.score || (score == current.score && fixed && !current_fixed) {
                    best = Some((plan, fixed));
                    tied = false;
                } else if score == current.score && fixed == *current_fixed {
                    tied = true;
                }
            }
        }
    }

    if tied {
        return Err(DispatchFailure::Ambiguous(format!(
            "ambiguous call to {}.{} with {}",
            desc.name(),
            name,
            describe_signature(signature)
        )));
    }
    Ok(best.map(|(plan, _)| plan))
}

fn score_candidate(method: &MethodSpec, args: &[TypeKey]) -> Option<(u32, Vec<Coercion>, Option<usize>)> {
    let fixed = method.params.len();
    if args.len() < fixed || (args.len() > fixed && method.varargs.is_none()) {
        return None;
    }

    let mut total = 0;
    let mut coercions = Vec::with_capacity(args.len());
    for (param, arg) in method.params.iter().zip(args) {
        let (score, coercion) = score_argument(param, arg)?;
        total += score;
        coercions.push(coercion);
    }

    let varargs_from = match method.varargs {
        Some(param) => {
            for arg in &args[fixed..] {
                let (_, coercion) = score_argument(&param, arg)?;
                total += 1;
                coercions.push(coercion);
            }
            Some(fixed)
        }
        None => None,
    };
    Some((total, coercions, varargs_from))
}

fn score_argument(param: &ParamType, arg: &TypeKey) -> Option<(u32, Coercion)> {
    let exact = matches!(
        (param, arg),
        (ParamType::Bool, TypeKey::Bool)
            | (ParamType::Int, TypeKey::Int)
            | (ParamType::Float, TypeKey::Float)
            | (ParamType::String, TypeKey::String)
            | (ParamType::List, TypeKey::List)
            | (ParamType::Map, TypeKey::Map)
    );
    match (param, arg) {
        _ if exact => Some((4, Coercion::None)),
        (ParamType::Host(want), TypeKey::Host(have)) if want == have => Some((4, Coercion::None)),
        (ParamType::Float, TypeKey::Int) => Some((3, Coercion::IntToFloat)),
        (param, TypeKey::Null) if param.is_nullable() => Some((2, Coercion::None)),
        (ParamType::Any, _) => Some((2, Coercion::None)),
        _ => None,
    }
}
