/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parsed, initialized templates.
//!
//! A [`Template`] owns its AST and a [`ResolutionCache`] side-table. The AST
//! is never touched after initialization, so one template can be merged from
//! many threads at once; the only shared mutable state is the cache, which
//! is a concurrent map keyed by node id.

use std::sync::Arc;

use dashmap::DashMap;

use crate::ast::{
    Block, Expr, ForeachBody, ForeachSections, MacroDef, Node, NodeId, SectionKind, StringLiteral,
};
use crate::introspect::ValueType;
use crate::invoke::{MethodData, PropertyData, SetterData};

/// A resolved member, as cached at one node.
#[derive(Debug, Clone)]
pub(crate) enum Member {
    Property(Arc<PropertyData>),
    Method(Arc<MethodData>),
    Setter(Arc<SetterData>),
}

#[derive(Debug)]
struct CachedMember {
    target: ValueType,
    args: Vec<Option<ValueType>>,
    member: Member,
}

/// Member resolutions memoized per AST node.
///
/// An entry is only reused when the runtime type of the target and the
/// argument types match what was observed when it was stored; otherwise the
/// node re-resolves and overwrites the entry. Concurrent renders may race to
/// store an entry, and either result is valid.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<NodeId, CachedMember>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(
        &self,
        id: NodeId,
        target: &ValueType,
        args: &[Option<ValueType>],
    ) -> Option<Member> {
        let entry = self.entries.get(&id)?;
        (entry.target == *target && entry.args == args).then(|| entry.member.clone())
    }

    pub(crate) fn insert(
        &self,
        id: NodeId,
        target: ValueType,
        args: Vec<Option<ValueType>>,
        member: Member,
    ) {
        self.entries.insert(
            id,
            CachedMember {
                target,
                args,
                member,
            },
        );
    }

    /// Number of nodes with a cached resolution.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed and initialized template.
#[derive(Debug)]
pub struct Template {
    name: String,
    root: Block,
    cache: Arc<ResolutionCache>,
}

impl Template {
    /// Initialize a freshly parsed tree.
    ///
    /// `#foreach` bodies are split into their sections and the macro
    /// definitions found anywhere in the tree are returned for registration.
    pub(crate) fn init(name: impl Into<String>, mut root: Block) -> (Self, Vec<MacroDef>) {
        let mut macros = Vec::new();
        init_block(&mut root, &mut macros);
        let template = Self {
            name: name.into(),
            root,
            cache: Arc::new(ResolutionCache::new()),
        };
        (template, macros)
    }

    /// Template name, also the macro namespace of its inline macros.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Block {
        &self.root
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }
}

fn init_block(block: &mut Block, macros: &mut Vec<MacroDef>) {
    for node in &mut block.nodes {
        init_node(node, macros);
    }
}

fn init_node(node: &mut Node, macros: &mut Vec<MacroDef>) {
    match node {
        Node::MacroDef(def) => macros.push(def.clone()),
        Node::Set(set) => init_expr(&mut set.rhs, macros),
        Node::If(directive) => {
            for (condition, body) in &mut directive.branches {
                init_expr(condition, macros);
                init_block(body, macros);
            }
            if let Some(body) = &mut directive.else_block {
                init_block(body, macros);
            }
        }
        Node::Foreach(foreach) => {
            init_expr(&mut foreach.iterable, macros);
            let raw = std::mem::replace(&mut foreach.body, ForeachBody::Simple(Block::default()));
            foreach.body = match raw {
                ForeachBody::Raw(mut body) => {
                    init_block(&mut body, macros);
                    split_sections(body)
                }
                done => done,
            };
        }
        Node::MacroCall(call) => {
            for arg in &mut call.args {
                init_expr(arg, macros);
            }
        }
        Node::Text(_)
        | Node::Reference(_)
        | Node::Section(_)
        | Node::Break(_)
        | Node::Stop(_)
        | Node::Include(_)
        | Node::Parse(_) => {}
    }
}

fn init_expr(expr: &mut Expr, macros: &mut Vec<MacroDef>) {
    match expr {
        Expr::Str(StringLiteral {
            interpolated: Some(block),
            ..
        }) => init_block(block, macros),
        Expr::ObjectArray(items) => {
            for item in items {
                init_expr(item, macros);
            }
        }
        Expr::Map(entries) => {
            for (key, value) in entries {
                init_expr(key, macros);
                init_expr(value, macros);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            init_expr(lhs, macros);
            init_expr(rhs, macros);
        }
        Expr::Not(inner) => init_expr(inner, macros),
        _ => {}
    }
}

/// Partition a loop body at its top-level section markers. Content before
/// the first marker belongs to `#each`.
fn split_sections(body: Block) -> ForeachBody {
    if !body.nodes.iter().any(|n| matches!(n, Node::Section(_))) {
        return ForeachBody::Simple(body);
    }

    let mut sections = ForeachSections::default();
    let mut current = SectionKind::Each;
    for node in body.nodes {
        match node {
            Node::Section(marker) => current = marker.kind,
            other => sections.block_mut(current).nodes.push(other),
        }
    }
    ForeachBody::Sectioned(Box::new(sections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn init(source: &str) -> (Template, Vec<MacroDef>) {
        Template::init("t.vm", parse(source, "t.vm").unwrap())
    }

    fn foreach_body(template: &Template) -> &ForeachBody {
        match &template.root().nodes[0] {
            Node::Foreach(foreach) => &foreach.body,
            other => panic!("expected #foreach, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_foreach_body() {
        let (template, _) = init("#foreach($i in $xs)$i#end");
        assert!(matches!(foreach_body(&template), ForeachBody::Simple(_)));
    }

    #[test]
    fn test_sectioned_foreach_body() {
        let (template, _) = init("#foreach($i in $xs)lead#odd o#even e#between ,#end");
        let ForeachBody::Sectioned(sections) = foreach_body(&template) else {
            panic!("expected sectioned body");
        };
        assert_eq!(sections.each.nodes, vec![Node::Text("lead".to_string())]);
        assert_eq!(sections.odd.nodes, vec![Node::Text(" o".to_string())]);
        assert_eq!(sections.even.nodes, vec![Node::Text(" e".to_string())]);
        assert_eq!(sections.between.nodes, vec![Node::Text(" ,".to_string())]);
        assert!(sections.nodata.is_empty());
    }

    #[test]
    fn test_nested_foreach_is_initialized() {
        let (template, _) =
            init("#foreach($i in $xs)#foreach($j in $ys)#odd x#end#end");
        let ForeachBody::Simple(outer) = foreach_body(&template) else {
            panic!("expected simple outer body");
        };
        match &outer.nodes[0] {
            Node::Foreach(inner) => assert!(matches!(inner.body, ForeachBody::Sectioned(_))),
            other => panic!("expected inner #foreach, got {other:?}"),
        }
    }

    #[test]
    fn test_collects_macro_definitions() {
        let (_, macros) = init("#macro(a)A#end#if(true)#macro(b $x)B#end#end");
        let names: Vec<&str> = macros.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_cache_is_keyed_by_observed_types() {
        let cache = ResolutionCache::new();
        let method = Arc::new(crate::invoke::PropertyData::map_entry("k"));
        cache.insert(NodeId(3), ValueType::Map, Vec::new(), Member::Property(method));
        assert!(cache.get(NodeId(3), &ValueType::Map, &[]).is_some());
        assert!(cache.get(NodeId(3), &ValueType::String, &[]).is_none());
        assert!(cache.get(NodeId(4), &ValueType::Map, &[]).is_none());
        assert_eq!(cache.len(), 1);
    }
}
