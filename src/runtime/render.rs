//! The render walk.
//!
//! Every node writes to the sink and answers with a [`Flow`]. Blocks stop at
//! the first non-`Continue` flow and hand it to their parent, which either
//! absorbs it (a loop absorbs `#break($foreach)`) or passes it on.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::{Block, Expr, ExprKind, Node, NodeKind, Reference};
use crate::diagnostics::TemplateError;
use crate::err_at;
use crate::macros;
use crate::runtime::context::Frame;
use crate::runtime::eval::range_values;
use crate::runtime::{Flow, OutputSink, RenderContext, Value};
use crate::template::Template;

impl RenderContext<'_> {
    /// Renders `template` as the outermost template of this render. Nested
    /// breaks end it early and `#stop` ends it successfully.
    pub fn render_template(
        &mut self,
        template: Arc<Template>,
        out: &mut dyn OutputSink,
    ) -> Result<(), TemplateError> {
        let current = Arc::clone(&template);
        self.with_template(template, |ctx| ctx.render_block(current.root(), out))
            .map(drop)
            .map_err(|e| e.with_source(current.source()))
    }

    pub fn render_block(&mut self, block: &Block, out: &mut dyn OutputSink) -> Result<Flow, TemplateError> {
        for node in block.iter() {
            match self.render_node(node, out)? {
                Flow::Continue => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Continue)
    }

    fn render_node(&mut self, node: &Node, out: &mut dyn OutputSink) -> Result<Flow, TemplateError> {
        match &node.kind {
            NodeKind::Text(text) | NodeKind::Escaped(text) | NodeKind::Raw(text) => out.emit(text)?,
            NodeKind::Comment | NodeKind::MacroDef(_) => {}
            NodeKind::Reference(r) => self.render_reference(r, out)?,
            NodeKind::If { branches, otherwise } => {
                for branch in branches {
                    if self.eval_condition(&branch.condition)? {
                        return self.render_block(&branch.body, out);
                    }
                }
                if let Some(otherwise) = otherwise {
                    return self.render_block(otherwise, out);
                }
            }
            NodeKind::Foreach {
                var,
                iterable,
                body,
                otherwise,
            } => return self.render_foreach(var, iterable, body, otherwise.as_ref(), out),
            NodeKind::Set { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            NodeKind::MacroCall(call) => return macros::invoke(self, node, call, out),
            NodeKind::Parse(arg) => return self.render_parse(node, arg, out),
            NodeKind::Include(args) => self.render_include(node, args, out)?,
            NodeKind::Evaluate(arg) => return self.render_evaluate(node, arg, out),
            NodeKind::Stop => return Ok(Flow::Stop),
            NodeKind::Break(scope) => return Ok(Flow::Break(scope.clone())),
        }
        Ok(Flow::Continue)
    }

    fn render_reference(&mut self, r: &Reference, out: &mut dyn OutputSink) -> Result<(), TemplateError> {
        match self.resolve(r, false)? {
            Value::Null if r.quiet => Ok(()),
            Value::Null => out.emit(&r.literal),
            value => out.emit(&value.to_string()),
        }
    }

    // ------------------------------------------------------------------------
    // #foreach
    // ------------------------------------------------------------------------

    fn render_foreach(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &Block,
        otherwise: Option<&Block>,
        out: &mut dyn OutputSink,
    ) -> Result<Flow, TemplateError> {
        let cap = self.config().foreach_max_loops;
        let items: Vec<(Option<String>, Value)> = match &iterable.kind {
            ExprKind::Range(from, to) => {
                let (from, to) = self.range_bounds(from, to, &iterable.pos)?;
                if cap.is_none() {
                    self.check_range_size(from, to, &iterable.pos)?;
                }
                range_values(from, to)
                    .take(cap.unwrap_or(usize::MAX))
                    .map(|n| (None, Value::Int(n)))
                    .collect()
            }
            _ => {
                let collection = self.eval(iterable)?;
                let Some(mut items) = collection.iteration_items() else {
                    let message = format!("cannot iterate over a {}", collection.type_name());
                    if self.strict() {
                        return Err(err_at!(Render, message, &iterable.pos));
                    }
                    warn!(at = %iterable.pos, "{message}; #foreach skipped");
                    return Ok(Flow::Continue);
                };
                if let Some(max) = cap {
                    items.truncate(max);
                }
                items
            }
        };
        if items.is_empty() {
            return match otherwise {
                Some(otherwise) => self.render_block(otherwise, out),
                None => Ok(Flow::Continue),
            };
        }

        let saved_var = self.local(var);
        let saved_status = self.local("foreach");
        let parent = self.get("foreach").unwrap_or_default();
        let result = self.foreach_items(var, items, parent, body, out);
        self.restore(var, saved_var);
        self.restore("foreach", saved_status);
        result
    }

    fn foreach_items(
        &mut self,
        var: &str,
        items: Vec<(Option<String>, Value)>,
        parent: Value,
        body: &Block,
        out: &mut dyn OutputSink,
    ) -> Result<Flow, TemplateError> {
        let count = items.len();
        for (index, (key, item)) in items.into_iter().enumerate() {
            let mut status = vec![
                ("index", Value::from(index)),
                ("count", Value::from(index + 1)),
                ("hasNext", Value::Bool(index + 1 < count)),
                ("first", Value::Bool(index == 0)),
                ("last", Value::Bool(index + 1 == count)),
                ("parent", parent.clone()),
            ];
            if let Some(key) = key {
                status.push(("key", Value::from(key)));
            }
            self.put("foreach", Value::map(status));
            self.put(var, item);

            match self.render_block(body, out)? {
                Flow::Continue => {}
                flow if flow.ends_foreach() => break,
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------------
    // #parse, #include, #evaluate
    // ------------------------------------------------------------------------

    /// Loads, caches and renders another template in a fresh frame.
    fn render_parse(&mut self, node: &Node, arg: &Expr, out: &mut dyn OutputSink) -> Result<Flow, TemplateError> {
        let name = self.resource_name(arg, "#parse")?;
        let max = self.config().parse_max_depth;
        if self.template_depth() >= max {
            return Err(err_at!(
                RecursionLimit,
                format!("#parse('{name}') exceeds the maximum nesting depth of {max}"),
                &node.pos
            ));
        }

        let template = self
            .services
            .cache
            .get(&name)
            .map_err(|e| e.within(format!("#parse('{name}')"), &node.pos))?;
        let current = Arc::clone(&template);
        let flow = self
            .with_template(template, |ctx| {
                ctx.with_frame(Frame::new(), |ctx| ctx.render_block(current.root(), out))
            })
            .map_err(|e| {
                e.with_source(current.source())
                    .within(format!("#parse('{name}')"), &node.pos)
            })?;
        Ok(if flow.ends_template() { Flow::Continue } else { flow })
    }

    /// Writes resources verbatim, without parsing them.
    fn render_include(&mut self, node: &Node, args: &[Expr], out: &mut dyn OutputSink) -> Result<(), TemplateError> {
        for arg in args {
            let name = self.resource_name(arg, "#include")?;
            let text = self
                .services
                .cache
                .load_text(&name)
                .map_err(|e| e.within(format!("#include('{name}')"), &node.pos))?;
            out.emit(&text)?;
        }
        Ok(())
    }

    /// Renders a string as a template in the current frame.
    fn render_evaluate(&mut self, node: &Node, arg: &Expr, out: &mut dyn OutputSink) -> Result<Flow, TemplateError> {
        let text = match self.eval(arg)? {
            Value::Null => return Ok(Flow::Continue),
            value => value.to_string(),
        };
        let name = format!("#evaluate at {}", node.pos);
        let template = Template::compile(name, &text, self.config().space_gobbling)
            .map_err(|e| e.within("#evaluate", &node.pos))?;
        let template = Arc::new(template);
        let current = Arc::clone(&template);
        self.with_template(template, |ctx| ctx.render_block(current.root(), out))
            .map_err(|e| e.with_source(current.source()).within("#evaluate", &node.pos))
    }

    /// Evaluates a resource argument, resolving `./` and `../` against the
    /// template currently rendering.
    fn resource_name(&mut self, arg: &Expr, directive: &str) -> Result<String, TemplateError> {
        let name = match self.eval(arg)? {
            Value::Null => {
                return Err(err_at!(
                    Render,
                    format!("{directive} argument evaluates to null"),
                    &arg.pos
                ))
            }
            value => value.to_string(),
        };
        let resolved = match self.current_template() {
            Some(current) if name.starts_with("./") || name.starts_with("../") => {
                relative_to(current.name(), &name)
            }
            _ => name,
        };
        debug!(resource = %resolved, "{directive}");
        Ok(resolved)
    }
}

/// Joins `name` onto the directory of `current` and folds `.`/`..` segments.
/// Leading `..` that climb above the root are kept for the loader to reject.
fn relative_to(current: &str, name: &str) -> String {
    let mut parts: Vec<&str> = current.split('/').collect();
    parts.pop();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::relative_to;

    #[test]
    fn relative_names_resolve_against_the_current_template() {
        assert_eq!(relative_to("pages/home.vm", "./part.vm"), "pages/part.vm");
        assert_eq!(relative_to("pages/a/home.vm", "../part.vm"), "pages/part.vm");
        assert_eq!(relative_to("home.vm", "./part.vm"), "part.vm");
        assert_eq!(relative_to("home.vm", "../part.vm"), "../part.vm");
    }
}
