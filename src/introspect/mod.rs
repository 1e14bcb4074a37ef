//! Host-value introspection.
//!
//! Values of unknown static type are inspected through [`TypeDescriptor`]s:
//! a name, a table of invocable methods with typed parameter lists, and
//! optional iteration and truthiness hooks. Built-in value kinds publish
//! descriptors of their own (see [`builtins`]) so the [`Introspector`]
//! resolves members uniformly for every receiver.
//!
//! Host types opt in by implementing [`HostObject`]:
//!
//! ```rust
//! use std::any::Any;
//! use once_cell::sync::Lazy;
//! use vellum::introspect::{HostObject, ParamType, TypeDescriptor};
//! use vellum::Value;
//!
//! #[derive(Debug)]
//! struct User { name: String }
//!
//! static USER: Lazy<TypeDescriptor> = Lazy::new(|| {
//!     TypeDescriptor::for_host::<User>("User")
//!         .getter("name", |u| Value::from(u.name.as_str()))
//!         .method("greet", vec![ParamType::String], |u, args| {
//!             Ok(Value::from(format!("{}, {}", args[0], u.name)))
//!         })
//!         .build()
//! });
//!
//! impl HostObject for User {
//!     fn descriptor(&self) -> &TypeDescriptor { &USER }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//! ```

pub mod builtins;
pub mod resolver;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::runtime::Value;

pub use resolver::{Access, Coercion, DispatchFailure, DispatchPlan, DispatchStats, Introspector, MemberKind};

/// A value supplied by the host application.
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &TypeDescriptor;

    fn as_any(&self) -> &dyn Any;

    /// Text written when the object itself is rendered.
    fn display(&self) -> String {
        format!("{self:?}")
    }
}

/// Failure raised by a member while it runs.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InvocationError(pub String);

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ============================================================================
// TYPE KEYS AND PARAMETERS
// ============================================================================

/// The runtime type of a value, as far as dispatch is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
    Host(TypeId),
}

/// Declared parameter type of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
    Host(TypeId),
    Any,
}

impl ParamType {
    pub fn host<T: HostObject>() -> Self {
        ParamType::Host(TypeId::of::<T>())
    }

    /// Whether a null argument may bind to this parameter.
    pub fn is_nullable(&self) -> bool {
        !matches!(self, ParamType::Bool | ParamType::Int | ParamType::Float)
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, InvocationError> + Send + Sync>;
type IterateHook = Arc<dyn Fn(&Value) -> Option<Vec<Value>> + Send + Sync>;
type TruthyHook = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One invocable member.
#[derive(Clone)]
pub struct MethodSpec {
    pub name: String,
    pub params: Vec<ParamType>,
    /// Type of trailing arguments absorbed into a list, if the method takes varargs.
    pub varargs: Option<ParamType>,
    invoke: Invoker,
}

impl MethodSpec {
    pub fn call(&self, receiver: &Value, args: &[Value]) -> Result<Value, InvocationError> {
        (self.invoke)(receiver, args)
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("varargs", &self.varargs)
            .finish()
    }
}

pub struct TypeDescriptor {
    name: String,
    methods: Vec<MethodSpec>,
    by_name: HashMap<String, Vec<usize>>,
    iterate: Option<IterateHook>,
    truthy: Option<TruthyHook>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl TypeDescriptor {
    /// Starts a descriptor whose methods receive the raw receiver value.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            desc: TypeDescriptor {
                name: name.into(),
                methods: Vec::new(),
                by_name: HashMap::new(),
                iterate: None,
                truthy: None,
            },
        }
    }

    /// Starts a descriptor for a host type; methods receive `&T`.
    pub fn for_host<T: HostObject>(name: impl Into<String>) -> HostDescriptorBuilder<T> {
        HostDescriptorBuilder {
            inner: Self::builder(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    pub fn method(&self, index: usize) -> Option<&MethodSpec> {
        self.methods.get(index)
    }

    /// Indices of the overloads named `name`.
    pub fn overloads(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iterate(&self, receiver: &Value) -> Option<Vec<Value>> {
        self.iterate.as_ref().and_then(|hook| hook(receiver))
    }

    pub fn truthiness(&self, receiver: &Value) -> Option<bool> {
        self.truthy.as_ref().map(|hook| hook(receiver))
    }
}

pub struct DescriptorBuilder {
    desc: TypeDescriptor,
}

impl DescriptorBuilder {
    pub fn method<F>(self, name: &str, params: Vec<ParamType>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.add(name, params, None, Arc::new(f))
    }

    pub fn varargs_method<F>(self, name: &str, params: Vec<ParamType>, varargs: ParamType, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.add(name, params, Some(varargs), Arc::new(f))
    }

    pub fn iterate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<Vec<Value>> + Send + Sync + 'static,
    {
        self.desc.iterate = Some(Arc::new(f));
        self
    }

    pub fn truthy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.desc.truthy = Some(Arc::new(f));
        self
    }

    fn add(mut self, name: &str, params: Vec<ParamType>, varargs: Option<ParamType>, invoke: Invoker) -> Self {
        let index = self.desc.methods.len();
        self.desc.methods.push(MethodSpec {
            name: name.to_string(),
            params,
            varargs,
            invoke,
        });
        self.desc
            .by_name
            .entry(name.to_string())
            .or_default()
            .push(index);
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.desc
    }
}

/// Typed front end over [`DescriptorBuilder`] for host objects.
pub struct HostDescriptorBuilder<T> {
    inner: DescriptorBuilder,
    _marker: PhantomData<fn(&T)>,
}

fn receiver<T: HostObject>(value: &Value) -> Result<&T, InvocationError> {
    value.downcast_ref::<T>().ok_or_else(|| {
        InvocationError::new(format!(
            "receiver is a {}, not a {}",
            value.type_name(),
            std::any::type_name::<T>()
        ))
    })
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl<T: HostObject> HostDescriptorBuilder<T> {
    pub fn method<F>(mut self, name: &str, params: Vec<ParamType>, f: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.inner = self
            .inner
            .method(name, params, move |this, args| f(receiver::<T>(this)?, args));
        self
    }

    pub fn varargs_method<F>(mut self, name: &str, params: Vec<ParamType>, varargs: ParamType, f: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.inner = self.inner.varargs_method(name, params, varargs, move |this, args| {
            f(receiver::<T>(this)?, args)
        });
        self
    }

    /// Registers `getName()` for property `name`.
    pub fn getter<F>(self, property: &str, f: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let name = format!("get{}", capitalize(property));
        self.method(&name, vec![], move |this, _| Ok(f(this)))
    }

    /// Registers `setName(value)` for property `name`.
    pub fn setter<F>(self, property: &str, param: ParamType, f: F) -> Self
    where
        F: Fn(&T, &Value) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        let name = format!("set{}", capitalize(property));
        self.method(&name, vec![param], move |this, args| {
            f(this, args.first().unwrap_or(&Value::Null))?;
            Ok(Value::Null)
        })
    }

    pub fn iterate<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        self.inner = self
            .inner
            .iterate(move |value| value.downcast_ref::<T>().map(&f));
        self
    }

    pub fn truthy<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.inner = self
            .inner
            .truthy(move |value| value.downcast_ref::<T>().map_or(true, &f));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.inner.build()
    }
}

pub(crate) fn property_accessor(prefix: &str, property: &str) -> String {
    format!("{prefix}{}", capitalize(property))
}

/// The descriptor answering for `value`, if it has members at all.
pub fn descriptor_for(value: &Value) -> Option<&TypeDescriptor> {
    match value {
        Value::Null => None,
        Value::Object(o) => Some(o.descriptor()),
        other => builtins::descriptor(other.type_key()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::any::Any;

    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    use super::*;

    /// A small host type used across the dispatch tests.
    #[derive(Debug)]
    pub struct Person {
        pub name: Mutex<String>,
        pub age: i64,
    }

    impl Person {
        pub fn value(name: &str, age: i64) -> Value {
            Value::object(Person {
                name: Mutex::new(name.to_string()),
                age,
            })
        }
    }

    static PERSON: Lazy<TypeDescriptor> = Lazy::new(|| {
        TypeDescriptor::for_host::<Person>("Person")
            .getter("name", |p| Value::from(p.name.lock().clone()))
            .getter("age", |p| Value::from(p.age))
            .setter("name", ParamType::String, |p, v| {
                *p.name.lock() = v.to_string();
                Ok(())
            })
            .method("describe", vec![ParamType::Int], |p, args| {
                Ok(Value::from(format!("int {} for {}", args[0], p.name.lock())))
            })
            .method("describe", vec![ParamType::Float], |_, args| {
                Ok(Value::from(format!("float {}", args[0])))
            })
            .method("describe", vec![ParamType::String], |_, args| {
                Ok(Value::from(format!("string {}", args[0])))
            })
            .varargs_method("join", vec![ParamType::String], ParamType::Any, |_, args| {
                Ok(Value::from(format!("{}{}", args[0], args[1])))
            })
            .method("pick", vec![ParamType::Any, ParamType::Int], |_, _| Ok(Value::from("any,int")))
            .method("pick", vec![ParamType::Int, ParamType::Any], |_, _| Ok(Value::from("int,any")))
            .method("fail", vec![], |_, _| Err(InvocationError::new("boom")))
            .truthy(|p| p.age > 0)
            .build()
    });

    impl HostObject for Person {
        fn descriptor(&self) -> &TypeDescriptor {
            &PERSON
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn display(&self) -> String {
            format!("Person({})", self.name.lock())
        }
    }
}
