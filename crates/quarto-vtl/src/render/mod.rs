/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template rendering.
//!
//! A [`Renderer`] walks an initialized tree against one [`Context`], writing
//! to a string buffer. It holds everything that belongs to one merge: the
//! diagnostics collected so far, the macro and `#parse` nesting depth, and
//! the resolution cache of the tree currently being walked. The tree itself
//! is only ever read, so any number of renderers may walk the same template
//! concurrently.
//!
//! Control flow (`#break`, `#stop`) is returned as a [`Flow`] value from every
//! node instead of unwinding.

mod directives;
mod expr;
mod reference;

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Block, Node, NodeId, SourcePos};
use crate::context::Context;
use crate::diagnostics::DiagnosticCollector;
use crate::error::{VtlError, VtlResult};
use crate::events::EventHooks;
use crate::services::RuntimeServices;
use crate::template::{ResolutionCache, Template};
use crate::value::Value;

/// What rendering should do after a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Continue,
    /// Leave the innermost `#foreach`.
    Break { template: String, pos: SourcePos },
    /// End the whole merge.
    Stop,
}

pub(crate) struct Renderer<'s> {
    services: &'s RuntimeServices,
    /// Template that owns the nodes being rendered, for diagnostics.
    source: String,
    /// Template whose macro namespace is searched first.
    namespace: String,
    cache: Arc<ResolutionCache>,
    diagnostics: DiagnosticCollector,
    macro_depth: usize,
    parse_depth: usize,
    /// Literal text used for null references inside macro bodies, keyed by
    /// the node id of the reference. One map per macro or `#parse` level.
    literals: Vec<HashMap<NodeId, String>>,
    events: Option<Arc<EventHooks>>,
    /// Set when a `#stop` ran inside an interpolated string.
    stopped: bool,
}

/// Render `template` against `ctx`, appending to `out`.
pub(crate) fn merge(
    services: &RuntimeServices,
    template: &Template,
    ctx: &mut Context,
    out: &mut String,
) -> VtlResult<DiagnosticCollector> {
    let mut renderer = Renderer::new(services, template, ctx.events().cloned());
    match renderer.render_block(template.root(), ctx, out)? {
        Flow::Break { template, pos } => Err(VtlError::BreakOutsideLoop {
            template,
            line: pos.line,
            column: pos.column,
        }),
        Flow::Continue | Flow::Stop => Ok(renderer.diagnostics),
    }
}

impl<'s> Renderer<'s> {
    fn new(
        services: &'s RuntimeServices,
        template: &Template,
        events: Option<Arc<EventHooks>>,
    ) -> Self {
        Self {
            services,
            source: template.name().to_string(),
            namespace: template.name().to_string(),
            cache: template.cache().clone(),
            diagnostics: DiagnosticCollector::new(),
            macro_depth: 0,
            parse_depth: 0,
            literals: vec![HashMap::new()],
            events,
            stopped: false,
        }
    }

    fn render_block(&mut self, block: &Block, ctx: &mut Context, out: &mut String) -> VtlResult<Flow> {
        for node in &block.nodes {
            let flow = self.render_node(node, ctx, out)?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
            if self.stopped {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn render_node(&mut self, node: &Node, ctx: &mut Context, out: &mut String) -> VtlResult<Flow> {
        match node {
            Node::Text(text) => out.push_str(text),

            Node::Reference(reference) => self.render_reference(reference, ctx, out)?,

            Node::Set(set) => self.render_set(set, ctx)?,

            Node::If(directive) => {
                for (condition, body) in &directive.branches {
                    if is_truthy(self.evaluate(condition, ctx)?.as_ref()) {
                        return self.render_block(body, ctx, out);
                    }
                }
                if let Some(body) = &directive.else_block {
                    return self.render_block(body, ctx, out);
                }
            }

            Node::Foreach(foreach) => return self.render_foreach(foreach, ctx, out),

            Node::Break(pos) => {
                return Ok(Flow::Break {
                    template: self.source.clone(),
                    pos: *pos,
                });
            }

            Node::Stop(_) => return Ok(Flow::Stop),

            Node::MacroCall(call) => return self.render_macro_call(call, ctx, out),

            Node::Include(include) => self.render_include(include, ctx, out)?,

            Node::Parse(parse) => return self.render_parse(parse, ctx, out),

            // Definitions are registered when the template is initialized.
            Node::MacroDef(_) | Node::Section(_) => {}
        }
        Ok(Flow::Continue)
    }

    /// Render a block into a fresh string. A `#stop` inside it ends the merge
    /// once the node holding the block finishes. A `#break` cannot reach a loop
    /// from inside a value and is an error.
    fn render_to_string(&mut self, block: &Block, ctx: &mut Context) -> VtlResult<String> {
        let mut out = String::new();
        match self.render_block(block, ctx, &mut out)? {
            Flow::Continue => {}
            Flow::Stop => self.stopped = true,
            Flow::Break { template, pos } => {
                return Err(VtlError::BreakOutsideLoop {
                    template,
                    line: pos.line,
                    column: pos.column,
                });
            }
        }
        Ok(out)
    }

    fn warn(&mut self, code: &'static str, message: String, pos: SourcePos) {
        tracing::warn!(
            template = %self.source,
            line = pos.line,
            column = pos.column,
            code,
            "{message}"
        );
        self.diagnostics.warn_at(code, message, &self.source, pos);
    }

    fn error(&mut self, code: &'static str, message: String, pos: SourcePos) {
        tracing::error!(
            template = %self.source,
            line = pos.line,
            column = pos.column,
            code,
            "{message}"
        );
        self.diagnostics.error_at(code, message, &self.source, pos);
    }
}

/// Null and `false` are false, every other value is true.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}
