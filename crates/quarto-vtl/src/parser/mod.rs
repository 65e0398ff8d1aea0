/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! A hand-written recursive-descent parser producing the [`ast`](crate::ast)
//! tree directly from the source text. Directive structure is handled here;
//! expressions live in [`expr`].
//!
//! A single line break directly after a built-in directive (`#set`, `#if`,
//! `#else`, `#end`, `#foreach`, `#break`, ...) is consumed, so directives on
//! lines of their own leave no blank lines behind.

mod cursor;
mod expr;

use crate::ast::{
    Accessor, Block, Foreach, ForeachBody, IfDirective, IncludeDirective, MacroCall, MacroDef,
    Node, NodeId, ParseDirective, Reference, ReferenceKind, SectionKind, SectionMarker,
    SetDirective, SourcePos,
};
use crate::error::{VtlError, VtlResult};
use cursor::Cursor;

/// Parse template source into a block of nodes.
pub fn parse(source: &str, template_name: &str) -> VtlResult<Block> {
    parse_at(source, template_name, SourcePos::new(1, 1))
}

/// Parse a fragment of `template_name` whose first character sits at
/// `start`, such as a macro body.
pub fn parse_at(source: &str, template_name: &str, start: SourcePos) -> VtlResult<Block> {
    let mut parser = Parser::new(Cursor::at(source, start), template_name, 0);
    let (block, terminator) = parser.parse_block(&[])?;
    match terminator {
        None => Ok(block),
        Some(term) => Err(parser.error_at(term.pos, format!("unexpected #{}", term.name))),
    }
}

/// A block-closing directive found while parsing a block.
#[derive(Debug)]
struct Terminator {
    name: String,
    pos: SourcePos,
    /// Byte offset of the `#`.
    offset: usize,
}

pub(crate) struct Parser<'a> {
    cur: Cursor<'a>,
    template: &'a str,
    next_id: u32,
    loop_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(cur: Cursor<'a>, template: &'a str, next_id: u32) -> Self {
        Self {
            cur,
            template,
            next_id,
            loop_depth: 0,
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn error_at(&self, pos: SourcePos, message: impl Into<String>) -> VtlError {
        VtlError::Parse {
            template: self.template.to_string(),
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> VtlError {
        self.error_at(self.cur.pos(), message)
    }

    fn expect_char(&mut self, c: char) -> VtlResult<()> {
        if self.cur.eat_char(c) {
            Ok(())
        } else {
            match self.cur.peek() {
                Some(found) => Err(self.error(format!("expected '{c}', found '{found}'"))),
                None => Err(self.error(format!("expected '{c}', found end of input"))),
            }
        }
    }

    /// Parse nodes until end of input or one of the `stop` directives.
    fn parse_block(&mut self, stop: &[&str]) -> VtlResult<(Block, Option<Terminator>)> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.cur.peek() {
            match c {
                '\\' => self.parse_backslashes(&mut nodes, &mut text)?,
                '$' => match self.try_reference(0)? {
                    Some(reference) => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(Node::Reference(reference));
                    }
                    None => {
                        self.cur.bump();
                        text.push('$');
                    }
                },
                '#' => {
                    if let Some(term) = self.parse_hash(&mut nodes, &mut text, stop)? {
                        flush_text(&mut nodes, &mut text);
                        return Ok((Block::new(nodes), Some(term)));
                    }
                }
                _ => {
                    self.cur.bump();
                    text.push(c);
                }
            }
        }

        flush_text(&mut nodes, &mut text);
        Ok((Block::new(nodes), None))
    }

    /// A run of backslashes, possibly escaping the reference or directive
    /// that follows.
    fn parse_backslashes(&mut self, nodes: &mut Vec<Node>, text: &mut String) -> VtlResult<()> {
        let mut count = 0;
        while self.cur.eat_char('\\') {
            count += 1;
        }

        match self.cur.peek() {
            Some('$') => match self.try_reference(count)? {
                Some(reference) => {
                    flush_text(nodes, text);
                    nodes.push(Node::Reference(reference));
                }
                None => push_backslashes(text, count),
            },
            Some('#') if self.directive_follows() => {
                if count % 2 == 1 {
                    push_backslashes(text, count - 1);
                    self.cur.bump();
                    text.push('#');
                } else {
                    push_backslashes(text, count);
                }
            }
            _ => push_backslashes(text, count),
        }
        Ok(())
    }

    fn directive_follows(&self) -> bool {
        match self.cur.peek_nth(1) {
            Some('{') => self.cur.peek_nth(2).is_some_and(cursor::is_ident_start),
            Some(c) => cursor::is_ident_start(c),
            None => false,
        }
    }

    /// Try to parse a reference at `$`. Leaves the cursor untouched and
    /// returns `None` if no identifier follows.
    fn try_reference(&mut self, escapes: usize) -> VtlResult<Option<Reference>> {
        let saved = self.cur;
        let pos = self.cur.pos();
        let start = self.cur.offset();
        self.cur.bump();

        let quiet = self.cur.eat_char('!');
        let formal = self.cur.eat_char('{');
        let Some(root) = self.cur.read_identifier() else {
            self.cur = saved;
            return Ok(None);
        };

        let chain_start = self.cur.offset();
        let chain = self.parse_chain()?;
        let chain_literal = self.cur.slice(chain_start, self.cur.offset()).to_string();

        let kind = if formal && !self.cur.eat_char('}') {
            ReferenceKind::Runt
        } else if quiet {
            ReferenceKind::Quiet
        } else if formal {
            ReferenceKind::Formal
        } else {
            ReferenceKind::Normal
        };

        Ok(Some(Reference {
            id: self.next_id(),
            kind,
            root,
            chain,
            literal: self.cur.slice(start, self.cur.offset()).to_string(),
            chain_literal,
            escapes,
            pos,
        }))
    }

    /// `.name` and `.name(args)` steps after a reference root.
    fn parse_chain(&mut self) -> VtlResult<Vec<Accessor>> {
        let mut chain = Vec::new();
        while self.cur.peek() == Some('.') && self.cur.peek_nth(1).is_some_and(cursor::is_ident_start)
        {
            self.cur.bump();
            let pos = self.cur.pos();
            let Some(name) = self.cur.read_identifier() else {
                break;
            };
            if self.cur.eat_char('(') {
                let args = self.parse_call_args()?;
                chain.push(Accessor::Method {
                    id: self.next_id(),
                    name,
                    args,
                    pos,
                });
            } else {
                chain.push(Accessor::Identifier {
                    id: self.next_id(),
                    name,
                    pos,
                });
            }
        }
        Ok(chain)
    }

    /// Comma separated expressions up to and including `)`.
    fn parse_call_args(&mut self) -> VtlResult<Vec<crate::ast::Expr>> {
        let mut args = Vec::new();
        self.cur.skip_ws();
        if self.cur.eat_char(')') {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.cur.skip_ws();
            if self.cur.eat_char(',') {
                continue;
            }
            self.expect_char(')')?;
            return Ok(args);
        }
    }

    /// Anything starting with `#`: comments, directives, macro calls, or
    /// plain text.
    fn parse_hash(
        &mut self,
        nodes: &mut Vec<Node>,
        text: &mut String,
        stop: &[&str],
    ) -> VtlResult<Option<Terminator>> {
        if self.cur.starts_with("##") {
            self.cur.skip_line();
            return Ok(None);
        }
        if self.cur.starts_with("#*") {
            let pos = self.cur.pos();
            match self.cur.rest().find("*#") {
                Some(end) => {
                    let target = self.cur.offset() + end + 2;
                    while self.cur.offset() < target {
                        self.cur.bump();
                    }
                }
                None => return Err(self.error_at(pos, "unterminated #* comment")),
            }
            return Ok(None);
        }
        if self.cur.starts_with("#[[") {
            let pos = self.cur.pos();
            let Some(end) = self.cur.rest().find("]]#") else {
                return Err(self.error_at(pos, "unterminated #[[ block"));
            };
            let body_start = self.cur.offset() + 3;
            let body_end = self.cur.offset() + end;
            text.push_str(self.cur.slice(body_start, body_end));
            while self.cur.offset() < body_end + 3 {
                self.cur.bump();
            }
            return Ok(None);
        }

        let saved = self.cur;
        let pos = self.cur.pos();
        let offset = self.cur.offset();
        self.cur.bump();
        let braced = self.cur.eat_char('{');
        let name = match self.cur.read_identifier() {
            Some(name) if !braced || self.cur.eat_char('}') => name,
            _ => {
                self.cur = saved;
                self.cur.bump();
                text.push('#');
                return Ok(None);
            }
        };

        match name.as_str() {
            "end" | "else" | "elseif" => {
                if !stop.contains(&name.as_str()) {
                    return Err(self.error_at(pos, format!("unexpected #{name}")));
                }
                if name != "elseif" {
                    self.cur.gobble_newline();
                }
                return Ok(Some(Terminator { name, pos, offset }));
            }
            "set" => {
                flush_text(nodes, text);
                let set = self.parse_set(pos)?;
                nodes.push(Node::Set(set));
            }
            "if" => {
                flush_text(nodes, text);
                let directive = self.parse_if(pos)?;
                nodes.push(Node::If(directive));
                return Ok(None);
            }
            "foreach" => {
                flush_text(nodes, text);
                let foreach = self.parse_foreach(pos)?;
                nodes.push(Node::Foreach(foreach));
                return Ok(None);
            }
            "break" => {
                flush_text(nodes, text);
                nodes.push(Node::Break(pos));
            }
            "stop" => {
                flush_text(nodes, text);
                nodes.push(Node::Stop(pos));
            }
            "macro" => {
                flush_text(nodes, text);
                let def = self.parse_macro_def(pos)?;
                nodes.push(Node::MacroDef(def));
                return Ok(None);
            }
            "include" => {
                flush_text(nodes, text);
                self.open_paren()?;
                let args = self.parse_call_args()?;
                nodes.push(Node::Include(IncludeDirective { args, pos }));
            }
            "parse" => {
                flush_text(nodes, text);
                self.open_paren()?;
                self.cur.skip_ws();
                let arg = self.parse_expr()?;
                self.cur.skip_ws();
                self.expect_char(')')?;
                nodes.push(Node::Parse(ParseDirective { arg, pos }));
            }
            other => {
                if self.loop_depth > 0 {
                    if let Some(kind) = SectionKind::from_name(other) {
                        flush_text(nodes, text);
                        nodes.push(Node::Section(SectionMarker { kind, pos }));
                        self.cur.gobble_newline();
                        return Ok(None);
                    }
                }

                let before_paren = self.cur;
                self.cur.skip_blanks();
                if !self.cur.eat_char('(') {
                    self.cur = before_paren;
                    text.push_str(self.cur.slice(offset, self.cur.offset()));
                    return Ok(None);
                }
                flush_text(nodes, text);
                let call = self.parse_macro_call(name, pos, offset)?;
                nodes.push(Node::MacroCall(call));
                return Ok(None);
            }
        }

        self.cur.gobble_newline();
        Ok(None)
    }

    /// Optional blanks, then `(`.
    fn open_paren(&mut self) -> VtlResult<()> {
        self.cur.skip_blanks();
        self.expect_char('(')
    }

    fn parse_set(&mut self, pos: SourcePos) -> VtlResult<SetDirective> {
        self.open_paren()?;
        self.cur.skip_ws();
        if self.cur.peek() != Some('$') {
            return Err(self.error("#set requires a reference on the left-hand side"));
        }
        let Some(lhs) = self.try_reference(0)? else {
            return Err(self.error("#set requires a reference on the left-hand side"));
        };
        self.cur.skip_ws();
        self.expect_char('=')?;
        self.cur.skip_ws();
        let rhs_start = self.cur.offset();
        let rhs = self.parse_expr()?;
        let rhs_literal = self.cur.slice(rhs_start, self.cur.offset()).trim().to_string();
        self.cur.skip_ws();
        self.expect_char(')')?;
        Ok(SetDirective {
            lhs,
            rhs,
            rhs_literal,
            pos,
        })
    }

    fn parse_condition(&mut self) -> VtlResult<crate::ast::Expr> {
        self.open_paren()?;
        self.cur.skip_ws();
        let condition = self.parse_expr()?;
        self.cur.skip_ws();
        self.expect_char(')')?;
        self.cur.gobble_newline();
        Ok(condition)
    }

    fn parse_if(&mut self, pos: SourcePos) -> VtlResult<IfDirective> {
        let mut branches = Vec::new();
        let mut else_block = None;

        let mut condition = self.parse_condition()?;
        loop {
            let (body, term) = self.parse_block(&["elseif", "else", "end"])?;
            branches.push((condition, body));
            match term.as_ref().map(|t| t.name.as_str()) {
                Some("elseif") => condition = self.parse_condition()?,
                Some("else") => {
                    let (body, term) = self.parse_block(&["end"])?;
                    if term.is_none() {
                        return Err(self.error_at(pos, "missing #end for #if"));
                    }
                    else_block = Some(body);
                    break;
                }
                Some(_) => break,
                None => return Err(self.error_at(pos, "missing #end for #if")),
            }
        }

        Ok(IfDirective {
            branches,
            else_block,
            pos,
        })
    }

    fn parse_foreach(&mut self, pos: SourcePos) -> VtlResult<Foreach> {
        self.open_paren()?;
        self.cur.skip_ws();
        self.expect_char('$')?;
        let braced = self.cur.eat_char('{');
        let Some(var) = self.cur.read_identifier() else {
            return Err(self.error("expected loop variable name"));
        };
        if braced {
            self.expect_char('}')?;
        }
        self.cur.skip_ws();
        if !self.cur.eat_word("in") {
            return Err(self.error("expected 'in' in #foreach"));
        }
        self.cur.skip_ws();
        let iterable_start = self.cur.offset();
        let iterable = self.parse_expr()?;
        let iterable_literal = self
            .cur
            .slice(iterable_start, self.cur.offset())
            .trim()
            .to_string();
        self.cur.skip_ws();
        self.expect_char(')')?;
        self.cur.gobble_newline();

        self.loop_depth += 1;
        let parsed = self.parse_block(&["end"]);
        self.loop_depth -= 1;
        let (body, term) = parsed?;
        if term.is_none() {
            return Err(self.error_at(pos, "missing #end for #foreach"));
        }

        Ok(Foreach {
            var,
            iterable,
            iterable_literal,
            body: ForeachBody::Raw(body),
            pos,
        })
    }

    fn parse_macro_def(&mut self, pos: SourcePos) -> VtlResult<MacroDef> {
        self.open_paren()?;
        self.cur.skip_ws();
        let Some(name) = self.cur.read_identifier() else {
            return Err(self.error("expected macro name"));
        };

        let mut params = Vec::new();
        loop {
            self.cur.skip_ws();
            if self.cur.eat_char(',') {
                continue;
            }
            if self.cur.eat_char(')') {
                break;
            }
            self.expect_char('$')?;
            match self.cur.read_identifier() {
                Some(param) => params.push(param),
                None => return Err(self.error("expected macro parameter name")),
            }
        }
        self.cur.gobble_newline();

        let body_start = self.cur.offset();
        let body_pos = self.cur.pos();
        let (_, term) = self.parse_block(&["end"])?;
        let Some(term) = term else {
            return Err(self.error_at(pos, format!("missing #end for #macro {name}")));
        };
        let body_text = self.cur.slice(body_start, term.offset).to_string();

        Ok(MacroDef {
            name,
            params,
            body_text,
            body_pos,
            pos,
        })
    }

    /// Arguments of `#name(...)`. The opening parenthesis is consumed.
    /// Arguments may be separated by commas or whitespace.
    fn parse_macro_call(&mut self, name: String, pos: SourcePos, start: usize) -> VtlResult<MacroCall> {
        let mut args = Vec::new();
        let mut arg_literals = Vec::new();
        loop {
            self.cur.skip_ws();
            if self.cur.eat_char(')') {
                break;
            }
            if self.cur.eat_char(',') {
                continue;
            }
            if self.cur.is_eof() {
                return Err(self.error_at(pos, format!("unterminated call of #{name}")));
            }
            let arg_start = self.cur.offset();
            args.push(self.parse_expr()?);
            arg_literals.push(self.cur.slice(arg_start, self.cur.offset()).to_string());
        }
        Ok(MacroCall {
            name,
            args,
            arg_literals,
            literal: self.cur.slice(start, self.cur.offset()).to_string(),
            pos,
        })
    }

    /// Parse a nested template embedded in the current source, such as the
    /// contents of an interpolated string. Node ids continue the sequence of
    /// the enclosing tree.
    fn parse_nested(&mut self, source: &str, start: SourcePos) -> VtlResult<Block> {
        let mut nested = Parser::new(Cursor::at(source, start), self.template, self.next_id);
        let (block, terminator) = nested.parse_block(&[])?;
        self.next_id = nested.next_id;
        match terminator {
            None => Ok(block),
            Some(term) => Err(self.error_at(term.pos, format!("unexpected #{}", term.name))),
        }
    }
}

fn flush_text(nodes: &mut Vec<Node>, text: &mut String) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

fn push_backslashes(text: &mut String, count: usize) {
    text.extend(std::iter::repeat_n('\\', count));
}
