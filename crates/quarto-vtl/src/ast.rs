/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! The tree is built once by the parser and never changes shape afterwards.
//! Nodes that resolve host members carry a [`NodeId`], which keys the
//! per-template resolution cache instead of storing state in the node.

use std::fmt;

/// Line and column (both 1-based) of a node in its template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}, column {}]", self.line, self.column)
    }
}

/// Identity of a node within one parsed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A sequence of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visit every reference in the block, including those nested in
    /// expressions, directive bodies and interpolated strings.
    pub fn walk_references<'a>(&'a self, visit: &mut impl FnMut(&'a Reference)) {
        for node in &self.nodes {
            node.walk_references(visit);
        }
    }
}

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, written as-is.
    Text(String),

    /// `$name`, `$!name`, `${name}` with optional `.member` chain.
    Reference(Reference),

    /// `#set($ref = expr)`
    Set(SetDirective),

    /// `#if(...) ... #elseif(...) ... #else ... #end`
    If(IfDirective),

    /// `#foreach($item in expr) ... #end`
    Foreach(Foreach),

    /// A section marker such as `#odd` inside a `#foreach` body.
    Section(SectionMarker),

    /// `#break`
    Break(SourcePos),

    /// `#stop`
    Stop(SourcePos),

    /// `#macro(name $a $b) ... #end`
    MacroDef(MacroDef),

    /// `#name(args)`, resolved against the macro manager when rendered.
    MacroCall(MacroCall),

    /// `#include(name)`
    Include(IncludeDirective),

    /// `#parse(name)`
    Parse(ParseDirective),
}

impl Node {
    fn walk_references<'a>(&'a self, visit: &mut impl FnMut(&'a Reference)) {
        match self {
            Node::Reference(reference) => reference.walk_references(visit),
            Node::Set(set) => {
                set.lhs.walk_references(visit);
                set.rhs.walk_references(visit);
            }
            Node::If(directive) => {
                for (condition, body) in &directive.branches {
                    condition.walk_references(visit);
                    body.walk_references(visit);
                }
                if let Some(body) = &directive.else_block {
                    body.walk_references(visit);
                }
            }
            Node::Foreach(foreach) => {
                foreach.iterable.walk_references(visit);
                for block in foreach.body.blocks() {
                    block.walk_references(visit);
                }
            }
            Node::MacroCall(call) => {
                for arg in &call.args {
                    arg.walk_references(visit);
                }
            }
            Node::Include(include) => {
                for arg in &include.args {
                    arg.walk_references(visit);
                }
            }
            Node::Parse(parse) => parse.arg.walk_references(visit),
            Node::Text(_)
            | Node::Section(_)
            | Node::Break(_)
            | Node::Stop(_)
            | Node::MacroDef(_) => {}
        }
    }
}

/// How a reference renders when its value is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `$name`: renders its literal text and logs a warning.
    Normal,
    /// `${name}`: like `Normal` with braces in the literal.
    Formal,
    /// `$!name` or `$!{name}`: renders nothing.
    Quiet,
    /// Something that looked like a reference but is not resolvable.
    /// Always renders its literal text.
    Runt,
}

/// A variable reference with an optional member chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: NodeId,
    pub kind: ReferenceKind,
    /// Variable name without `$`.
    pub root: String,
    pub chain: Vec<Accessor>,
    /// Source text of the reference, without leading backslashes.
    pub literal: String,
    /// Source text of the member chain, e.g. `.name.length()`.
    pub chain_literal: String,
    /// Number of backslashes directly before the `$`.
    pub escapes: usize,
    pub pos: SourcePos,
}

impl Reference {
    /// An odd number of backslashes escapes the reference.
    pub fn is_escaped(&self) -> bool {
        self.escapes % 2 == 1
    }

    fn walk_references<'a>(&'a self, visit: &mut impl FnMut(&'a Reference)) {
        visit(self);
        for accessor in &self.chain {
            if let Accessor::Method { args, .. } = accessor {
                for arg in args {
                    arg.walk_references(visit);
                }
            }
        }
    }
}

/// One step of a reference chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    /// `.name`
    Identifier {
        id: NodeId,
        name: String,
        pos: SourcePos,
    },
    /// `.name(args)`
    Method {
        id: NodeId,
        name: String,
        args: Vec<Expr>,
        pos: SourcePos,
    },
}

impl Accessor {
    pub fn id(&self) -> NodeId {
        match self {
            Accessor::Identifier { id, .. } | Accessor::Method { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Accessor::Identifier { name, .. } | Accessor::Method { name, .. } => name,
        }
    }

    pub fn pos(&self) -> SourcePos {
        match self {
            Accessor::Identifier { pos, .. } | Accessor::Method { pos, .. } => *pos,
        }
    }
}

/// `#set($lhs = rhs)`
#[derive(Debug, Clone, PartialEq)]
pub struct SetDirective {
    pub lhs: Reference,
    pub rhs: Expr,
    /// Source text of the right-hand side.
    pub rhs_literal: String,
    pub pos: SourcePos,
}

/// `#if` with its `#elseif` branches and optional `#else`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfDirective {
    pub branches: Vec<(Expr, Block)>,
    pub else_block: Option<Block>,
    pub pos: SourcePos,
}

/// `#foreach($var in iterable)`
#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    /// Loop variable name without `$`.
    pub var: String,
    pub iterable: Expr,
    /// Source text of the iterable expression.
    pub iterable_literal: String,
    pub body: ForeachBody,
    pub pos: SourcePos,
}

/// Body of a `#foreach`, before and after initialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeachBody {
    /// As parsed, section markers still inline.
    Raw(Block),
    /// No section markers: the whole body renders once per element.
    Simple(Block),
    /// Body partitioned by section markers.
    Sectioned(Box<ForeachSections>),
}

impl ForeachBody {
    /// Every block of the body, in no particular order.
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            ForeachBody::Raw(block) | ForeachBody::Simple(block) => vec![block],
            ForeachBody::Sectioned(sections) => vec![
                &sections.each,
                &sections.between,
                &sections.odd,
                &sections.even,
                &sections.nodata,
                &sections.beforeall,
                &sections.afterall,
                &sections.before,
                &sections.after,
            ],
        }
    }
}

/// The named buckets of a sectioned `#foreach`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeachSections {
    pub each: Block,
    pub between: Block,
    pub odd: Block,
    pub even: Block,
    pub nodata: Block,
    pub beforeall: Block,
    pub afterall: Block,
    pub before: Block,
    pub after: Block,
}

impl ForeachSections {
    pub fn block_mut(&mut self, kind: SectionKind) -> &mut Block {
        match kind {
            SectionKind::Each => &mut self.each,
            SectionKind::Between => &mut self.between,
            SectionKind::Odd => &mut self.odd,
            SectionKind::Even => &mut self.even,
            SectionKind::NoData => &mut self.nodata,
            SectionKind::BeforeAll => &mut self.beforeall,
            SectionKind::AfterAll => &mut self.afterall,
            SectionKind::Before => &mut self.before,
            SectionKind::After => &mut self.after,
        }
    }
}

/// Section marker directives recognised inside `#foreach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Each,
    Between,
    Odd,
    Even,
    NoData,
    BeforeAll,
    AfterAll,
    Before,
    After,
}

impl SectionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "each" => SectionKind::Each,
            "between" => SectionKind::Between,
            "odd" => SectionKind::Odd,
            "even" => SectionKind::Even,
            "nodata" => SectionKind::NoData,
            "beforeall" => SectionKind::BeforeAll,
            "afterall" => SectionKind::AfterAll,
            "before" => SectionKind::Before,
            "after" => SectionKind::After,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionMarker {
    pub kind: SectionKind,
    pub pos: SourcePos,
}

/// `#macro(name $params...)` with its unparsed body.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    /// Parameter names without `$`.
    pub params: Vec<String>,
    pub body_text: String,
    /// Position of the first character of the body.
    pub body_pos: SourcePos,
    pub pos: SourcePos,
}

/// `#name(args...)`
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub name: String,
    pub args: Vec<Expr>,
    /// Source text of each argument.
    pub arg_literals: Vec<String>,
    /// Source text of the whole call.
    pub literal: String,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub args: Vec<Expr>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseDirective {
    pub arg: Expr,
    pub pos: SourcePos,
}

/// An expression inside directive arguments or method calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(StringLiteral),
    Reference(Reference),
    /// `[a, b, c]`
    ObjectArray(Vec<Expr>),
    /// `[start..end]`
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        pos: SourcePos,
    },
    /// `{key: value, ...}`
    Map(Vec<(Expr, Expr)>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: SourcePos,
    },
    Not(Box<Expr>),
}

impl Expr {
    fn walk_references<'a>(&'a self, visit: &mut impl FnMut(&'a Reference)) {
        match self {
            Expr::Reference(reference) => reference.walk_references(visit),
            Expr::Str(StringLiteral {
                interpolated: Some(block),
                ..
            }) => block.walk_references(visit),
            Expr::ObjectArray(items) => {
                for item in items {
                    item.walk_references(visit);
                }
            }
            Expr::Range { start, end, .. } => {
                start.walk_references(visit);
                end.walk_references(visit);
            }
            Expr::Map(entries) => {
                for (key, value) in entries {
                    key.walk_references(visit);
                    value.walk_references(visit);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk_references(visit);
                rhs.walk_references(visit);
            }
            Expr::Not(inner) => inner.walk_references(visit),
            Expr::Bool(_) | Expr::Int(_) | Expr::Long(_) | Expr::Double(_) | Expr::Str(_) => {}
        }
    }
}

/// A quoted string. Double-quoted strings containing `$` or `#` are parsed
/// as templates and rendered on evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub text: String,
    pub interpolated: Option<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}
