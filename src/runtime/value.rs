use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::introspect::{HostObject, TypeKey};

pub type ListRef = Arc<RwLock<Vec<Value>>>;
pub type MapRef = Arc<RwLock<IndexMap<String, Value>>>;

/// Represents a value flowing through a render.
///
/// Lists and maps have reference semantics, like the host collections they
/// stand in for: `#set($b = $a)` then `$b.add(1)` is visible through `$a`.
///
/// # Examples
///
/// ```rust
/// use vellum::Value;
/// let n = Value::from(3);
/// assert_eq!(n.type_name(), "Integer");
/// assert_eq!(Value::from(1.0).to_string(), "1.0");
/// assert!(Value::default().is_null());
/// ```
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    List(ListRef),
    Map(MapRef),
    Object(Arc<dyn HostObject>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn object<T: HostObject>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Arc::from(text.as_ref()))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Object(o) => o.descriptor().name(),
        }
    }

    /// The runtime type used to key dispatch resolution.
    pub fn type_key(&self) -> TypeKey {
        match self {
            Value::Null => TypeKey::Null,
            Value::Bool(_) => TypeKey::Bool,
            Value::Int(_) => TypeKey::Int,
            Value::Float(_) => TypeKey::Float,
            Value::String(_) => TypeKey::String,
            Value::List(_) => TypeKey::List,
            Value::Map(_) => TypeKey::Map,
            Value::Object(o) => TypeKey::Host(Any::type_id(o.as_any())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        match self {
            Value::Object(o) => o.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Truthiness: booleans as is, null false, empty string/list/map false,
    /// zero false; host objects decide through their descriptor, else true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.read().is_empty(),
            Value::Map(m) => !m.read().is_empty(),
            Value::Object(o) => o.descriptor().truthiness(self).unwrap_or(true),
        }
    }

    /// A snapshot of the items `#foreach` visits, or `None` when the value is
    /// not iterable. Maps yield `(key, value)` pairs.
    pub fn iteration_items(&self) -> Option<Vec<(Option<String>, Value)>> {
        match self {
            Value::Null => Some(Vec::new()),
            Value::List(l) => Some(l.read().iter().map(|v| (None, v.clone())).collect()),
            Value::Map(m) => Some(
                m.read()
                    .iter()
                    .map(|(k, v)| (Some(k.clone()), v.clone()))
                    .collect(),
            ),
            Value::Object(o) => o
                .descriptor()
                .iterate(self)
                .map(|items| items.into_iter().map(|v| (None, v)).collect()),
            _ => None,
        }
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => {
                Value::map(entries.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    fn fmt_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
        if x.is_nan() {
            f.write_str("NaN")
        } else if x.is_infinite() {
            f.write_str(if x > 0.0 { "Infinity" } else { "-Infinity" })
        } else if x.fract() == 0.0 && x.abs() < 1e16 {
            write!(f, "{x:.1}")
        } else {
            write!(f, "{x}")
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => Value::fmt_float(f, *x),
            Value::String(s) => f.write_str(s),
            Value::List(l) => {
                f.write_str("[")?;
                for (i, item) in l.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::Object(o) => f.write_str(&o.display()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::List(l) => f.debug_list().entries(l.read().iter()).finish(),
            Value::Map(m) => f.debug_map().entries(m.read().iter()).finish(),
            Value::Object(o) => write!(f, "Object({o:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_host_conventions() {
        assert_eq!(Value::from(2.0).to_string(), "2.0");
        assert_eq!(Value::from(0.25).to_string(), "0.25");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(
            Value::map([("a", Value::from(1)), ("b", Value::from("x"))]).to_string(),
            "{a=1, b=x}"
        );
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn truthiness_table() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(!Value::map(Vec::<(String, Value)>::new()).is_truthy());
        assert!(Value::from("false").is_truthy());
        assert!(Value::from(-1).is_truthy());
    }

    #[test]
    fn lists_share_storage() {
        let a = Value::from(vec![1]);
        let b = a.clone();
        if let Value::List(l) = &b {
            l.write().push(Value::from(2));
        }
        assert_eq!(a.to_string(), "[1, 2]");
    }

    #[test]
    fn json_conversion() {
        let v = Value::from_json(serde_json::json!({"n": 1, "f": 1.5, "l": [true, null]}));
        match &v {
            Value::Map(m) => {
                let m = m.read();
                assert_eq!(m.get("n"), Some(&Value::Int(1)));
                assert_eq!(m.get("f"), Some(&Value::Float(1.5)));
                assert_eq!(m.get("l").map(|l| l.to_string()), Some("[true, null]".into()));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn null_iterates_zero_times() {
        assert_eq!(Value::Null.iteration_items().map(|i| i.len()), Some(0));
        assert!(Value::from(3).iteration_items().is_none());
    }
}
