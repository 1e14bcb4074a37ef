//! Descriptors for the built-in value kinds.
//!
//! Method names follow the host-collection conventions template authors
//! expect (`$s.length()`, `$list.size()`, `$map.keySet()`). String positions
//! count characters.

use once_cell::sync::Lazy;

use super::{InvocationError, TypeDescriptor, TypeKey};
use crate::runtime::ops::loose_eq;
use crate::runtime::Value;

use super::ParamType::{Any, Float, Int, List, String as Str};

pub fn descriptor(key: TypeKey) -> Option<&'static TypeDescriptor> {
    match key {
        TypeKey::String => Some(&STRING),
        TypeKey::List => Some(&LIST),
        TypeKey::Map => Some(&MAP),
        TypeKey::Int => Some(&INTEGER),
        TypeKey::Float => Some(&FLOAT),
        TypeKey::Bool => Some(&BOOLEAN),
        TypeKey::Null | TypeKey::Host(_) => None,
    }
}

fn fail(message: impl Into<String>) -> InvocationError {
    InvocationError::new(message)
}

fn text(v: &Value) -> Result<&str, InvocationError> {
    v.as_str()
        .ok_or_else(|| fail(format!("expected a String, got {}", v.type_name())))
}

fn int(v: &Value) -> Result<i64, InvocationError> {
    v.as_int()
        .ok_or_else(|| fail(format!("expected an Integer, got {}", v.type_name())))
}

fn float(v: &Value) -> Result<f64, InvocationError> {
    v.as_float()
        .ok_or_else(|| fail(format!("expected a number, got {}", v.type_name())))
}

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Null)
}

fn char_index(chars: usize, index: i64, what: &str) -> Result<usize, InvocationError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i <= chars)
        .ok_or_else(|| fail(format!("{what} {index} out of range for length {chars}")))
}

fn substring(s: &str, from: i64, to: Option<i64>) -> Result<Value, InvocationError> {
    let chars: Vec<char> = s.chars().collect();
    let start = char_index(chars.len(), from, "begin index")?;
    let end = match to {
        Some(to) => char_index(chars.len(), to, "end index")?,
        None => chars.len(),
    };
    if start > end {
        return Err(fail(format!("begin index {start} is after end index {end}")));
    }
    Ok(Value::from(chars[start..end].iter().collect::<String>()))
}

fn position(haystack: &str, needle: &str) -> Value {
    match haystack.find(needle) {
        Some(byte) => Value::from(haystack[..byte].chars().count()),
        None => Value::Int(-1),
    }
}

// ============================================================================
// STRING
// ============================================================================

static STRING: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("String")
        .method("length", vec![], |s, _| Ok(Value::from(text(s)?.chars().count())))
        .method("isEmpty", vec![], |s, _| Ok(Value::from(text(s)?.is_empty())))
        .method("toUpperCase", vec![], |s, _| Ok(Value::from(text(s)?.to_uppercase())))
        .method("toLowerCase", vec![], |s, _| Ok(Value::from(text(s)?.to_lowercase())))
        .method("trim", vec![], |s, _| Ok(Value::from(text(s)?.trim())))
        .method("toString", vec![], |s, _| Ok(s.clone()))
        .method("contains", vec![Str], |s, a| Ok(Value::from(text(s)?.contains(text(&a[0])?))))
        .method("startsWith", vec![Str], |s, a| {
            Ok(Value::from(text(s)?.starts_with(text(&a[0])?)))
        })
        .method("endsWith", vec![Str], |s, a| Ok(Value::from(text(s)?.ends_with(text(&a[0])?))))
        .method("indexOf", vec![Str], |s, a| Ok(position(text(s)?, text(&a[0])?)))
        .method("indexOf", vec![Str, Int], |s, a| {
            let s = text(s)?;
            let from = usize::try_from(int(&a[1])?).unwrap_or(0);
            let skipped: usize = s.chars().take(from).map(char::len_utf8).sum();
            Ok(match position(&s[skipped..], text(&a[0])?) {
                Value::Int(-1) => Value::Int(-1),
                Value::Int(n) => Value::Int(n + from as i64),
                other => other,
            })
        })
        .method("substring", vec![Int], |s, a| substring(text(s)?, int(&a[0])?, None))
        .method("substring", vec![Int, Int], |s, a| {
            substring(text(s)?, int(&a[0])?, Some(int(&a[1])?))
        })
        .method("charAt", vec![Int], |s, a| {
            let index = int(&a[0])?;
            usize::try_from(index)
                .ok()
                .and_then(|i| text(s).ok()?.chars().nth(i))
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| fail(format!("index {index} out of range")))
        })
        .method("replace", vec![Str, Str], |s, a| {
            Ok(Value::from(text(s)?.replace(text(&a[0])?, text(&a[1])?)))
        })
        .method("split", vec![Str], |s, a| {
            let sep = text(&a[0])?;
            let parts: Vec<Value> = if sep.is_empty() {
                text(s)?.chars().map(|c| Value::from(c.to_string())).collect()
            } else {
                text(s)?.split(sep).map(Value::from).collect()
            };
            Ok(Value::list(parts))
        })
        .method("concat", vec![Str], |s, a| Ok(Value::from(format!("{}{}", text(s)?, text(&a[0])?))))
        .method("equals", vec![Any], |s, a| Ok(Value::from(s == &a[0])))
        .method("equalsIgnoreCase", vec![Str], |s, a| {
            Ok(Value::from(text(s)?.to_lowercase() == text(&a[0])?.to_lowercase()))
        })
        .method("compareTo", vec![Str], |s, a| {
            Ok(Value::Int(text(s)?.cmp(text(&a[0])?) as i64))
        })
        .build()
});

// ============================================================================
// LIST
// ============================================================================

fn with_list<R>(v: &Value, f: impl FnOnce(&mut Vec<Value>) -> Result<R, InvocationError>) -> Result<R, InvocationError> {
    match v {
        Value::List(l) => f(&mut l.write()),
        other => Err(fail(format!("expected a List, got {}", other.type_name()))),
    }
}

/// Copies the items out so comparisons never run under the list's lock.
fn snapshot(v: &Value) -> Result<Vec<Value>, InvocationError> {
    match v {
        Value::List(l) => Ok(l.read().clone()),
        other => Err(fail(format!("expected a List, got {}", other.type_name()))),
    }
}

fn list_index(len: usize, index: i64, inclusive: bool) -> Result<usize, InvocationError> {
    let limit = if inclusive { len } else { len.saturating_sub(1) };
    usize::try_from(index)
        .ok()
        .filter(|i| *i <= limit && (inclusive || len > 0))
        .ok_or_else(|| fail(format!("index {index} out of bounds for length {len}")))
}

static LIST: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("List")
        .method("size", vec![], |l, _| with_list(l, |v| Ok(Value::from(v.len()))))
        .method("isEmpty", vec![], |l, _| with_list(l, |v| Ok(Value::from(v.is_empty()))))
        .method("get", vec![Int], |l, a| {
            let index = int(&a[0])?;
            with_list(l, |v| Ok(v[list_index(v.len(), index, false)?].clone()))
        })
        .method("contains", vec![Any], |l, a| {
            Ok(Value::from(snapshot(l)?.iter().any(|x| loose_eq(x, &a[0]))))
        })
        .method("indexOf", vec![Any], |l, a| {
            Ok(snapshot(l)?
                .iter()
                .position(|x| loose_eq(x, &a[0]))
                .map_or(Value::Int(-1), Value::from))
        })
        .method("add", vec![Any], |l, a| {
            let item = a[0].clone();
            with_list(l, |v| {
                v.push(item);
                Ok(Value::Bool(true))
            })
        })
        .method("add", vec![Int, Any], |l, a| {
            let (index, item) = (int(&a[0])?, a[1].clone());
            with_list(l, |v| {
                let at = list_index(v.len(), index, true)?;
                v.insert(at, item);
                Ok(Value::Null)
            })
        })
        .method("set", vec![Int, Any], |l, a| {
            let (index, item) = (int(&a[0])?, a[1].clone());
            with_list(l, |v| {
                let at = list_index(v.len(), index, false)?;
                Ok(std::mem::replace(&mut v[at], item))
            })
        })
        .method("addAll", vec![List], |l, a| {
            let items = match &a[0] {
                Value::List(other) => other.read().clone(),
                other => return Err(fail(format!("expected a List, got {}", other.type_name()))),
            };
            with_list(l, |v| {
                let changed = !items.is_empty();
                v.extend(items);
                Ok(Value::from(changed))
            })
        })
        .method("remove", vec![Int], |l, a| {
            let index = int(&a[0])?;
            with_list(l, |v| Ok(v.remove(list_index(v.len(), index, false)?)))
        })
        .method("remove", vec![Any], |l, a| {
            match snapshot(l)?.iter().position(|x| loose_eq(x, &a[0])) {
                Some(i) => with_list(l, |v| {
                    if i < v.len() {
                        v.remove(i);
                    }
                    Ok(Value::Bool(true))
                }),
                None => Ok(Value::Bool(false)),
            }
        })
        .method("clear", vec![], |l, _| {
            with_list(l, |v| {
                v.clear();
                Ok(Value::Null)
            })
        })
        .method("subList", vec![Int, Int], |l, a| {
            let (from, to) = (int(&a[0])?, int(&a[1])?);
            with_list(l, |v| {
                let start = list_index(v.len(), from, true)?;
                let end = list_index(v.len(), to, true)?;
                if start > end {
                    return Err(fail(format!("fromIndex {start} > toIndex {end}")));
                }
                Ok(Value::list(v[start..end].to_vec()))
            })
        })
        .iterate(|l| match l {
            Value::List(items) => Some(items.read().clone()),
            _ => None,
        })
        .build()
});

// ============================================================================
// MAP
// ============================================================================

fn with_map<R>(
    v: &Value,
    f: impl FnOnce(&mut indexmap::IndexMap<String, Value>) -> Result<R, InvocationError>,
) -> Result<R, InvocationError> {
    match v {
        Value::Map(m) => f(&mut m.write()),
        other => Err(fail(format!("expected a Map, got {}", other.type_name()))),
    }
}

static MAP: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Map")
        .method("size", vec![], |m, _| with_map(m, |e| Ok(Value::from(e.len()))))
        .method("isEmpty", vec![], |m, _| with_map(m, |e| Ok(Value::from(e.is_empty()))))
        .method("get", vec![Any], |m, a| {
            let key = a[0].to_string();
            with_map(m, |e| Ok(e.get(&key).cloned().unwrap_or_default()))
        })
        .method("put", vec![Str, Any], |m, a| {
            let (key, value) = (a[0].to_string(), a[1].clone());
            with_map(m, |e| Ok(e.insert(key, value).unwrap_or_default()))
        })
        .method("containsKey", vec![Any], |m, a| {
            let key = a[0].to_string();
            with_map(m, |e| Ok(Value::from(e.contains_key(&key))))
        })
        .method("containsValue", vec![Any], |m, a| {
            let values: Vec<Value> = with_map(m, |e| Ok(e.values().cloned().collect()))?;
            Ok(Value::from(values.iter().any(|v| loose_eq(v, &a[0]))))
        })
        .method("remove", vec![Any], |m, a| {
            let key = a[0].to_string();
            with_map(m, |e| Ok(e.shift_remove(&key).unwrap_or_default()))
        })
        .method("keySet", vec![], |m, _| {
            with_map(m, |e| Ok(Value::list(e.keys().map(|k| Value::from(k.as_str())).collect())))
        })
        .method("values", vec![], |m, _| with_map(m, |e| Ok(Value::list(e.values().cloned().collect()))))
        .method("entrySet", vec![], |m, _| {
            with_map(m, |e| {
                Ok(Value::list(
                    e.iter()
                        .map(|(k, v)| Value::map([("key", Value::from(k.as_str())), ("value", v.clone())]))
                        .collect(),
                ))
            })
        })
        .build()
});

// ============================================================================
// NUMBERS AND BOOLEANS
// ============================================================================

static INTEGER: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Integer")
        .method("intValue", vec![], |n, _| Ok(Value::Int(int(n)?)))
        .method("longValue", vec![], |n, _| Ok(Value::Int(int(n)?)))
        .method("doubleValue", vec![], |n, _| Ok(Value::Float(float(n)?)))
        .method("toString", vec![], |n, _| Ok(Value::from(n.to_string())))
        .method("compareTo", vec![Int], |n, a| Ok(Value::Int(int(n)?.cmp(&int(&a[0])?) as i64)))
        .method("equals", vec![Any], |n, a| Ok(Value::from(n == &a[0])))
        .build()
});

static FLOAT: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Float")
        .method("intValue", vec![], |n, _| Ok(Value::Int(float(n)? as i64)))
        .method("longValue", vec![], |n, _| Ok(Value::Int(float(n)? as i64)))
        .method("doubleValue", vec![], |n, _| Ok(Value::Float(float(n)?)))
        .method("toString", vec![], |n, _| Ok(Value::from(n.to_string())))
        .method("isNaN", vec![], |n, _| Ok(Value::from(float(n)?.is_nan())))
        .method("isInfinite", vec![], |n, _| Ok(Value::from(float(n)?.is_infinite())))
        .method("compareTo", vec![Float], |n, a| {
            let (x, y) = (float(n)?, float(&a[0])?);
            Ok(Value::Int(x.total_cmp(&y) as i64))
        })
        .method("equals", vec![Any], |n, a| Ok(Value::from(n == &a[0])))
        .build()
});

static BOOLEAN: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Boolean")
        .method("booleanValue", vec![], |b, _| Ok(b.clone()))
        .method("toString", vec![], |b, _| Ok(Value::from(b.to_string())))
        .method("equals", vec![Any], |b, a| Ok(Value::from(b == arg(a, 0))))
        .build()
});
