//! Macro calls at render time.
//!
//! Arguments are evaluated in the caller's scope, then bound in a fresh frame:
//! named arguments by name, the rest by position, defaults for what is left
//! (evaluated in the new frame, so a default may use earlier parameters), and
//! null for parameters with neither. A block call renders its body in the
//! caller's scope first and binds the text as `$bodyContent`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::{MacroCall, Node};
use crate::diagnostics::TemplateError;
use crate::err_at;
use crate::macros::MacroDefinition;
use crate::runtime::context::Frame;
use crate::runtime::{Flow, OutputSink, RenderContext, Value};

pub(crate) fn invoke(
    ctx: &mut RenderContext<'_>,
    node: &Node,
    call: &MacroCall,
    out: &mut dyn OutputSink,
) -> Result<Flow, TemplateError> {
    let Some(def) = ctx.lookup_macro(&call.name) else {
        if ctx.strict() {
            return Err(err_at!(
                Render,
                format!("no macro named #{} is defined", call.name),
                &node.pos
            ));
        }
        warn!(at = %node.pos, name = %call.name, "undefined macro; writing the call as text");
        out.emit(&call.literal)?;
        return Ok(Flow::Continue);
    };

    let mut positional = Vec::new();
    let mut named = HashMap::new();
    for arg in &call.args {
        let value = ctx.eval(&arg.value)?;
        match &arg.name {
            Some(name) if def.param(name).is_none() => {
                return Err(err_at!(
                    Render,
                    format!("macro #{} has no parameter named '{name}'", def.name),
                    &arg.value.pos
                ));
            }
            Some(name) => {
                named.insert(name.as_str(), value);
            }
            None => positional.push(value),
        }
    }

    let unnamed = def
        .params
        .iter()
        .filter(|p| !named.contains_key(p.name.as_str()))
        .count();
    if positional.len() > unnamed {
        let message = format!(
            "macro #{} takes {} argument(s) but {} were passed",
            def.name,
            def.params.len(),
            positional.len() + named.len()
        );
        if ctx.strict() {
            return Err(err_at!(Render, message, &node.pos));
        }
        debug!(at = %node.pos, "{message}; extra arguments ignored");
    }

    let body_content = match &call.body {
        Some(body) => {
            let mut text = String::new();
            if ctx.render_block(body, &mut text)? == Flow::Stop {
                return Ok(Flow::Stop);
            }
            Some(Value::from(text))
        }
        None => None,
    };

    let flow = ctx.with_macro(&def.name, &node.pos, |ctx| {
        ctx.with_frame(Frame::new(), |ctx| {
            bind(ctx, &def, positional, named, body_content)?;
            ctx.render_block(&def.body, out)
        })
    });
    let flow = flow.map_err(|e| {
        e.with_source(&def.source)
            .within(format!("macro #{}", def.name), &node.pos)
    })?;

    Ok(if flow.ends_macro() { Flow::Continue } else { flow })
}

fn bind(
    ctx: &mut RenderContext<'_>,
    def: &Arc<MacroDefinition>,
    positional: Vec<Value>,
    mut named: HashMap<&str, Value>,
    body_content: Option<Value>,
) -> Result<(), TemplateError> {
    let mut positional = positional.into_iter();
    for param in &def.params {
        let value = match named.remove(param.name.as_str()) {
            Some(value) => value,
            None => match positional.next() {
                Some(value) => value,
                None => match &param.default {
                    Some(default) => ctx.eval(default)?,
                    None => Value::Null,
                },
            },
        };
        ctx.put(&param.name, value);
    }
    if let Some(body) = body_content {
        ctx.put("bodyContent", body);
    }
    Ok(())
}
