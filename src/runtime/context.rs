//! Variable scopes.
//!
//! [`Context`] is what callers fill before a render and read back after it.
//! [`RenderContext`] is private to a single render: a stack of frames over the
//! caller's context, plus the template and macro stacks and a per-node
//! dispatch cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::ast::Position;
use crate::config::EngineConfig;
use crate::diagnostics::TemplateError;
use crate::engine::Services;
use crate::err_at;
use crate::err_msg;
use crate::introspect::{DispatchPlan, MemberKind, TypeKey};
use crate::macros::MacroDefinition;
use crate::runtime::Value;
use crate::template::Template;

/// A caller-facing set of named values.
///
/// A context may wrap an inner one: reads fall through to it, writes never
/// reach it. Wrapping is how one shared base context serves many renders.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use vellum::{Context, Value};
///
/// let mut base = Context::new();
/// base.put("site", "docs");
/// let mut page = Context::wrap(Arc::new(base));
/// page.put("title", "Intro");
/// assert_eq!(page.get("site"), Some(&Value::from("docs")));
/// assert_eq!(page.keys(), vec!["site".to_string(), "title".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: im::HashMap<String, Value>,
    inner: Option<Arc<Context>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap(inner: Arc<Context>) -> Self {
        Self {
            values: im::HashMap::new(),
            inner: Some(inner),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            Some(value) => Some(value),
            None => self.inner.as_ref()?.get(key),
        }
    }

    /// Binds `key`, returning the previous local value. Putting null removes
    /// the local binding.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        match value.into() {
            Value::Null => self.values.remove(&key),
            value => self.values.insert(key, value),
        }
    }

    /// Builder-style `put`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Every visible key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&mut keys);
        keys.into_iter().collect()
    }

    fn collect_keys(&self, keys: &mut BTreeSet<String>) {
        keys.extend(self.values.keys().cloned());
        if let Some(inner) = &self.inner {
            inner.collect_keys(keys);
        }
    }

    /// Builds a context from a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, TemplateError> {
        match json {
            serde_json::Value::Object(entries) => Ok(entries
                .into_iter()
                .fold(Context::new(), |ctx, (k, v)| ctx.with(k, Value::from_json(v)))),
            other => Err(err_msg!(
                Config,
                "context data must be a JSON object, found {}",
                json_kind(&other)
            )),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ============================================================================
// RENDER CONTEXT
// ============================================================================

pub(crate) type Frame = im::HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    node: usize,
    kind: MemberKind,
    name: String,
    receiver: TypeKey,
    signature: Vec<TypeKey>,
}

/// State of one render.
pub struct RenderContext<'a> {
    user: &'a mut Context,
    frames: Vec<Frame>,
    templates: Vec<Arc<Template>>,
    macro_stack: Vec<String>,
    plans: HashMap<PlanKey, Arc<DispatchPlan>>,
    pub(crate) services: &'a Services,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(user: &'a mut Context, services: &'a Services) -> Self {
        Self {
            user,
            frames: Vec::new(),
            templates: Vec::new(),
            macro_stack: Vec::new(),
            plans: HashMap::new(),
            services,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn strict(&self) -> bool {
        self.services.config.strict_references
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    /// Looks `name` up from the innermost frame out to the caller's context.
    /// A null bound in a frame hides outer bindings of the same name.
    pub fn get(&self, name: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return (!value.is_null()).then(|| value.clone());
            }
        }
        self.user.get(name).cloned()
    }

    /// Binds `name` in the current frame. Null unbinds it: inside a frame the
    /// name then reads as undefined, at the top level it leaves the context.
    pub fn put(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => {
                self.user.put(name, value);
            }
        }
    }

    /// The binding of `name` in the current frame only.
    pub(crate) fn local(&self, name: &str) -> Option<Value> {
        match self.frames.last() {
            Some(frame) => frame.get(name).cloned(),
            None => self.user.values.get(name).cloned(),
        }
    }

    /// Puts back a binding saved with [`RenderContext::local`].
    pub(crate) fn restore(&mut self, name: &str, saved: Option<Value>) {
        match saved {
            Some(value) => self.put(name, value),
            None => match self.frames.last_mut() {
                Some(frame) => {
                    frame.remove(name);
                }
                None => {
                    self.user.remove(name);
                }
            },
        }
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Runs `f` inside a fresh frame seeded with `bindings`.
    pub(crate) fn with_frame<R>(&mut self, bindings: Frame, f: impl FnOnce(&mut Self) -> R) -> R {
        self.frames.push(bindings);
        let result = f(self);
        self.frames.pop();
        result
    }

    /// Runs `f` with `template` on top of the template stack.
    pub(crate) fn with_template<R>(
        &mut self,
        template: Arc<Template>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.templates.push(template);
        let result = f(self);
        self.templates.pop();
        result
    }

    /// Runs `f` with `name` on the macro stack, failing once the stack is
    /// `macro_max_depth` deep.
    pub(crate) fn with_macro<R>(
        &mut self,
        name: &str,
        pos: &Position,
        f: impl FnOnce(&mut Self) -> Result<R, TemplateError>,
    ) -> Result<R, TemplateError> {
        let max = self.services.config.macro_max_depth;
        if self.macro_stack.len() >= max {
            return Err(err_at!(
                RecursionLimit,
                format!(
                    "macro #{name} exceeds the maximum call depth of {max} (stack: {})",
                    self.macro_stack.join(" > ")
                ),
                pos
            ));
        }
        self.macro_stack.push(name.to_string());
        let result = f(self);
        self.macro_stack.pop();
        result
    }

    pub fn template_depth(&self) -> usize {
        self.templates.len()
    }

    pub fn current_template(&self) -> Option<&Arc<Template>> {
        self.templates.last()
    }

    /// Finds a macro in the template stack, innermost first, then in the
    /// engine's library.
    pub fn lookup_macro(&self, name: &str) -> Option<Arc<MacroDefinition>> {
        self.templates
            .iter()
            .rev()
            .find_map(|t| t.macros().get(name))
            .or_else(|| self.services.library.get(name))
    }

    // ------------------------------------------------------------------------
    // Per-node dispatch cache
    // ------------------------------------------------------------------------

    /// Resolves a member for the AST node `node`, reusing this render's plan
    /// before asking the engine-wide introspector.
    pub(crate) fn plan_for(
        &mut self,
        node: usize,
        receiver: &Value,
        kind: MemberKind,
        name: &str,
        args: &[Value],
    ) -> Result<Arc<DispatchPlan>, crate::introspect::DispatchFailure> {
        let key = PlanKey {
            node,
            kind,
            name: name.to_string(),
            receiver: receiver.type_key(),
            signature: args.iter().map(Value::type_key).collect(),
        };
        if let Some(plan) = self.plans.get(&key) {
            return Ok(Arc::clone(plan));
        }
        let plan = self
            .services
            .introspector
            .resolve(receiver, kind, name, args)?;
        self.plans.insert(key, Arc::clone(&plan));
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_context_is_read_through_and_write_isolated() {
        let base = Arc::new(Context::new().with("a", 1).with("b", 2));
        let mut ctx = Context::wrap(Arc::clone(&base));
        ctx.put("a", 10);
        assert_eq!(ctx.get("a"), Some(&Value::Int(10)));
        assert_eq!(ctx.get("b"), Some(&Value::Int(2)));
        assert_eq!(base.get("a"), Some(&Value::Int(1)));
        assert!(ctx.contains_key("b"));
        assert_eq!(ctx.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn null_put_unbinds() {
        let mut ctx = Context::new().with("a", 1);
        ctx.put("a", Value::Null);
        assert!(!ctx.contains_key("a"));
        assert_eq!(ctx.remove("a"), None);
    }

    #[test]
    fn json_must_be_an_object() {
        let ctx = Context::from_json(serde_json::json!({"n": [1, 2]})).unwrap();
        assert_eq!(ctx.get("n").map(|v| v.to_string()), Some("[1, 2]".into()));
        assert!(Context::from_json(serde_json::json!([1])).is_err());
    }
}
