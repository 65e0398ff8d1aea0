/*
 * directives.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `#set`, `#foreach`, macro calls, `#include` and `#parse`.

use std::collections::HashMap;

use super::{Flow, Renderer};
use crate::ast::{
    Accessor, Block, Expr, Foreach, ForeachBody, ForeachSections, IncludeDirective, MacroCall,
    NodeId, ParseDirective, SetDirective,
};
use crate::context::Context;
use crate::error::{VtlError, VtlResult};
use crate::macros::MacroEntry;
use crate::template::Template;
use crate::value::Value;

/// Bindings of the loop variable, counter and has-next flag.
struct LoopVars {
    var: String,
    counter: String,
    has_next: String,
    initial: i32,
}

impl LoopVars {
    fn bind(&self, ctx: &mut Context, item: Value, index: usize, count: usize) {
        let offset = i32::try_from(index).unwrap_or(i32::MAX);
        ctx.put(self.var.clone(), item);
        ctx.put(self.counter.clone(), Value::Int(self.initial.saturating_add(offset)));
        ctx.put(self.has_next.clone(), Value::Bool(index + 1 < count));
    }

    fn names(&self) -> [&str; 3] {
        [&self.var, &self.counter, &self.has_next]
    }
}

impl Renderer<'_> {
    /// `#set($ref = expr)`. A null right-hand side leaves the context alone.
    pub(super) fn render_set(&mut self, set: &SetDirective, ctx: &mut Context) -> VtlResult<()> {
        let Some(value) = self.evaluate(&set.rhs, ctx)? else {
            let log = self
                .events
                .as_ref()
                .is_none_or(|hooks| hooks.should_log_null_set(&set.lhs.literal, &set.rhs_literal));
            if log {
                self.warn(
                    "null-set",
                    format!(
                        "right-hand side of #set is null, {} = {} not assigned",
                        set.lhs.literal, set.rhs_literal
                    ),
                    set.pos,
                );
            }
            return Ok(());
        };

        let lhs = &set.lhs;
        let Some((last, prefix)) = lhs.chain.split_last() else {
            ctx.put(lhs.root.clone(), value);
            return Ok(());
        };

        let Some(target) = self.resolve(lhs, prefix, ctx, None)? else {
            self.error(
                "set-failed",
                format!("left-hand side of {} resolves to null", lhs.literal),
                set.pos,
            );
            return Ok(());
        };
        match last {
            Accessor::Identifier { id, name, pos } => {
                self.set_property(lhs, &target, *id, name, value, *pos)
            }
            Accessor::Method { pos, .. } => {
                self.error(
                    "set-failed",
                    format!("cannot assign to method call {}", lhs.literal),
                    *pos,
                );
                Ok(())
            }
        }
    }

    /// `#foreach`. The loop variable, counter and has-next flag shadow any
    /// outer binding for the duration of the loop and are restored after.
    pub(super) fn render_foreach(
        &mut self,
        foreach: &Foreach,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        let source = self.evaluate(&foreach.iterable, ctx)?;
        let source = match &self.events {
            Some(hooks) => hooks.reference_insert(&[], &foreach.iterable_literal, source),
            None => source,
        };
        let items = match source.as_ref().map(|value| (value, value.iter_values())) {
            None => {
                self.warn(
                    "not-iterable",
                    format!("#foreach source {} is null", foreach.iterable_literal),
                    foreach.pos,
                );
                return self.render_without_items(&foreach.body, ctx, out);
            }
            Some((value, None)) => {
                self.warn(
                    "not-iterable",
                    format!(
                        "#foreach source {} is a {}, which cannot be iterated",
                        foreach.iterable_literal,
                        value.type_of()
                    ),
                    foreach.pos,
                );
                return self.render_without_items(&foreach.body, ctx, out);
            }
            Some((_, Some(items))) => items,
        };

        let config = self.services.config();
        let vars = LoopVars {
            var: foreach.var.clone(),
            counter: config.foreach_counter_name.clone(),
            has_next: config.foreach_has_next_name.clone(),
            initial: config.foreach_counter_initial_value,
        };
        let saved: Vec<(String, Option<Value>)> = vars
            .names()
            .into_iter()
            .map(|name| (name.to_string(), ctx.get_local(name).cloned()))
            .collect();

        let result = match &foreach.body {
            ForeachBody::Raw(body) | ForeachBody::Simple(body) => {
                self.loop_simple(body, &vars, items, ctx, out)
            }
            ForeachBody::Sectioned(sections) => {
                self.loop_sectioned(sections, &vars, items, ctx, out)
            }
        };

        for (name, value) in saved {
            match value {
                Some(value) => ctx.put(name, value),
                None => ctx.remove(&name),
            };
        }
        result
    }

    /// A source that yields nothing at all still gets its `#nodata` section.
    fn render_without_items(
        &mut self,
        body: &ForeachBody,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        match body {
            ForeachBody::Sectioned(sections) => {
                self.render_loop_blocks(&[&sections.nodata], ctx, out)
            }
            ForeachBody::Raw(_) | ForeachBody::Simple(_) => Ok(Flow::Continue),
        }
    }

    fn loop_simple(
        &mut self,
        body: &Block,
        vars: &LoopVars,
        items: Vec<Value>,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        let count = items.len();
        for (index, item) in items.into_iter().enumerate() {
            vars.bind(ctx, item, index, count);
            match self.render_block(body, ctx, out)? {
                Flow::Continue => {}
                Flow::Break { .. } => break,
                Flow::Stop => return Ok(Flow::Stop),
            }
        }
        Ok(Flow::Continue)
    }

    /// Per element: `#between` (not before the first), `#before`, `#odd` or
    /// `#even`, `#each`, `#after`. `#beforeall` and `#afterall` wrap the
    /// elements; an empty source renders `#nodata` only.
    fn loop_sectioned(
        &mut self,
        sections: &ForeachSections,
        vars: &LoopVars,
        items: Vec<Value>,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        if items.is_empty() {
            return self.render_loop_blocks(&[&sections.nodata], ctx, out);
        }

        let count = items.len();
        let mut processed = 0;
        let mut flow = self.render_loop_blocks(&[&sections.beforeall], ctx, out)?;
        if flow == Flow::Continue {
            for (index, item) in items.into_iter().enumerate() {
                vars.bind(ctx, item, index, count);
                processed += 1;
                let parity = if index % 2 == 0 {
                    &sections.odd
                } else {
                    &sections.even
                };
                let mut blocks = Vec::with_capacity(5);
                if index > 0 {
                    blocks.push(&sections.between);
                }
                blocks.extend([&sections.before, parity, &sections.each, &sections.after]);
                flow = self.render_loop_blocks(&blocks, ctx, out)?;
                if flow != Flow::Continue {
                    break;
                }
            }
        }

        match flow {
            Flow::Stop => Ok(Flow::Stop),
            Flow::Continue | Flow::Break { .. } if processed > 0 => {
                self.render_loop_blocks(&[&sections.afterall], ctx, out)
            }
            Flow::Continue | Flow::Break { .. } => Ok(Flow::Continue),
        }
    }

    /// Render blocks in order, stopping at the first control flow.
    fn render_loop_blocks(
        &mut self,
        blocks: &[&Block],
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        for block in blocks {
            let flow = self.render_block(block, ctx, out)?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    /// `#name(args)`. Unknown macros render as their literal text.
    pub(super) fn render_macro_call(
        &mut self,
        call: &MacroCall,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        let Some(entry) = self.services.get_velocimacro(&call.name, &self.namespace) else {
            out.push_str(&call.literal);
            return Ok(Flow::Continue);
        };

        if entry.params().len() != call.args.len() {
            self.error(
                "macro-arity",
                format!(
                    "velocimacro #{} takes {} argument(s), called with {}",
                    call.name,
                    entry.params().len(),
                    call.args.len()
                ),
                call.pos,
            );
            out.push_str(&call.literal);
            return Ok(Flow::Continue);
        }

        let max_depth = self.services.config().velocimacro_max_depth;
        if self.macro_depth >= max_depth {
            return Err(VtlError::MacroDepthExceeded {
                name: call.name.clone(),
                max_depth,
            });
        }

        let body = self.services.macro_body(&entry)?;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.evaluate(arg, ctx)?);
        }
        let literals = self.call_site_literals(&entry, call, &body);

        let saved: Vec<(String, Option<Value>)> = entry
            .params()
            .iter()
            .map(|param| (param.clone(), ctx.get_local(param).cloned()))
            .collect();
        for (param, value) in entry.params().iter().zip(args) {
            match value {
                Some(value) => ctx.put(param.clone(), value),
                None => ctx.remove(param),
            };
        }

        let previous_cache = std::mem::replace(&mut self.cache, body.cache().clone());
        let previous_source =
            std::mem::replace(&mut self.source, entry.source_template().to_string());
        self.literals.push(literals);
        self.macro_depth += 1;

        let result = self.render_block(body.root(), ctx, out);

        self.macro_depth -= 1;
        self.literals.pop();
        self.source = previous_source;
        self.cache = previous_cache;
        for (param, value) in saved {
            match value {
                Some(value) => ctx.put(param, value),
                None => ctx.remove(&param),
            };
        }
        result
    }

    /// Literal text for null references to macro parameters: the argument
    /// as written at the call site, followed by the rest of the chain.
    fn call_site_literals(
        &self,
        entry: &MacroEntry,
        call: &MacroCall,
        body: &Template,
    ) -> HashMap<NodeId, String> {
        let outer = self.literals.last();
        let by_param: HashMap<&str, String> = entry
            .params()
            .iter()
            .zip(call.args.iter().zip(&call.arg_literals))
            .map(|(param, (arg, literal))| {
                let literal = match arg {
                    Expr::Reference(reference) => outer
                        .and_then(|map| map.get(&reference.id))
                        .cloned()
                        .unwrap_or_else(|| literal.clone()),
                    _ => literal.clone(),
                };
                (param.as_str(), literal)
            })
            .collect();

        let mut literals = HashMap::new();
        body.root().walk_references(&mut |reference| {
            if let Some(literal) = by_param.get(reference.root.as_str()) {
                literals.insert(reference.id, format!("{literal}{}", reference.chain_literal));
            }
        });
        literals
    }

    /// `#include(a, b, ...)` writes each named resource verbatim.
    pub(super) fn render_include(
        &mut self,
        include: &IncludeDirective,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<()> {
        for arg in &include.args {
            let Some(name) = self.evaluate(arg, ctx)? else {
                self.error("include-null", "#include argument is null".to_string(), include.pos);
                continue;
            };
            let content = self.services.get_content(&name.to_string())?;
            out.push_str(&content);
        }
        Ok(())
    }

    /// `#parse(name)` renders another template in the current context.
    pub(super) fn render_parse(
        &mut self,
        parse: &ParseDirective,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<Flow> {
        let Some(name) = self.evaluate(&parse.arg, ctx)? else {
            self.error("parse-null", "#parse argument is null".to_string(), parse.pos);
            return Ok(Flow::Continue);
        };
        let name = name.to_string();

        let max_depth = self.services.config().parse_directive_max_depth;
        if self.parse_depth >= max_depth {
            return Err(VtlError::ParseDepthExceeded { name, max_depth });
        }

        let template = self.services.get_template(&name)?;
        let previous_cache = std::mem::replace(&mut self.cache, template.cache().clone());
        let previous_source = std::mem::replace(&mut self.source, template.name().to_string());
        let previous_namespace =
            std::mem::replace(&mut self.namespace, template.name().to_string());
        self.literals.push(HashMap::new());
        self.parse_depth += 1;

        let result = self.render_block(template.root(), ctx, out);

        self.parse_depth -= 1;
        self.literals.pop();
        self.namespace = previous_namespace;
        self.source = previous_source;
        self.cache = previous_cache;
        result
    }
}
