//! # Velocimacros
//!
//! `#macro(name $a $b="default") ... #end` defines a macro; `#name(1 2)` and
//! `#@name(...) body #end` call it.
//!
//! Definitions are collected while a template initialises into its
//! [`MacroTable`]. Macros that every template can call live in the engine's
//! [`MacroLibrary`], filled from the configured library templates and from
//! [`crate::Engine::register_macro_library`].
//!
//! At render time a call looks the name up along the template stack,
//! innermost template first, and then in the library. See [`invoke`] for the
//! calling convention.

mod invoke;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::ast::{Block, Expr, Position};
use crate::diagnostics::SourceArc;

pub(crate) use invoke::invoke;

/// One declared parameter: `$name` or `$name = default`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroParam {
    pub name: String,
    /// Evaluated inside the macro frame when the call omits the argument.
    pub default: Option<Expr>,
    pub pos: Position,
}

/// A parsed `#macro` directive.
#[derive(Debug, Clone, Serialize)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Block,
    /// Name of the defining template.
    pub template: Arc<str>,
    #[serde(skip_serializing)]
    pub source: SourceArc,
    pub pos: Position,
}

impl PartialEq for MacroDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.params == other.params
            && self.body == other.body
            && self.template == other.template
            && self.pos == other.pos
    }
}

impl MacroDefinition {
    pub fn param(&self, name: &str) -> Option<&MacroParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// TABLES
// ============================================================================

/// The macros one template defines.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, Arc<MacroDefinition>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def`, returning the definition it replaced.
    pub fn insert(&mut self, def: Arc<MacroDefinition>) -> Option<Arc<MacroDefinition>> {
        self.macros.insert(def.name.clone(), def)
    }

    pub fn get(&self, name: &str) -> Option<Arc<MacroDefinition>> {
        self.macros.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MacroDefinition>> {
        self.macros.values()
    }
}

/// Engine-wide macros. Libraries registered later override earlier ones.
#[derive(Debug, Default)]
pub struct MacroLibrary {
    macros: RwLock<HashMap<String, Arc<MacroDefinition>>>,
    libraries: RwLock<Vec<String>>,
}

impl MacroLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every macro of `table`, loaded from the library template `library`.
    pub fn register(&self, library: &str, table: &MacroTable) {
        let mut macros = self.macros.write();
        for def in table.iter() {
            if let Some(previous) = macros.insert(def.name.clone(), Arc::clone(def)) {
                debug!(
                    name = %def.name,
                    from = %previous.template,
                    to = library,
                    "library macro overridden"
                );
            }
        }
        self.libraries.write().push(library.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Arc<MacroDefinition>> {
        self.macros.read().get(name).cloned()
    }

    /// Names of the registered library templates, in registration order.
    pub fn libraries(&self) -> Vec<String> {
        self.libraries.read().clone()
    }
}
