/*
 * expr.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression grammar for directive arguments and method calls.
//!
//! Lowest to highest precedence: `||`, `&&`, equality, relational,
//! additive, multiplicative, unary, primary. Word forms (`or`, `and`,
//! `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `not`) are accepted alongside the
//! symbols.

use super::Parser;
use crate::ast::{BinaryOp, Expr, SourcePos, StringLiteral};
use crate::error::VtlResult;

impl Parser<'_> {
    pub(super) fn parse_expr(&mut self) -> VtlResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            if self.cur.eat("||") || self.cur.eat_word("or") {
                self.cur.skip_ws();
                let rhs = self.parse_and()?;
                lhs = binary(BinaryOp::Or, lhs, rhs, pos);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_equality()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            if self.cur.eat("&&") || self.cur.eat_word("and") {
                self.cur.skip_ws();
                let rhs = self.parse_equality()?;
                lhs = binary(BinaryOp::And, lhs, rhs, pos);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_equality(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            let op = if self.cur.eat("==") || self.cur.eat_word("eq") {
                BinaryOp::Eq
            } else if self.cur.eat("!=") || self.cur.eat_word("ne") {
                BinaryOp::Ne
            } else {
                return Ok(lhs);
            };
            self.cur.skip_ws();
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs, pos);
        }
    }

    fn parse_relational(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            let op = if self.cur.eat("<=") || self.cur.eat_word("le") {
                BinaryOp::Le
            } else if self.cur.eat(">=") || self.cur.eat_word("ge") {
                BinaryOp::Ge
            } else if self.cur.eat("<") || self.cur.eat_word("lt") {
                BinaryOp::Lt
            } else if self.cur.eat(">") || self.cur.eat_word("gt") {
                BinaryOp::Gt
            } else {
                return Ok(lhs);
            };
            self.cur.skip_ws();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs, pos);
        }
    }

    fn parse_additive(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            let op = if self.cur.eat_char('+') {
                BinaryOp::Add
            } else if self.cur.eat_char('-') {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            self.cur.skip_ws();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs, pos);
        }
    }

    fn parse_multiplicative(&mut self) -> VtlResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.cur.skip_ws();
            let pos = self.cur.pos();
            let op = if self.cur.eat_char('*') {
                BinaryOp::Mul
            } else if self.cur.eat_char('/') {
                BinaryOp::Div
            } else if self.cur.eat_char('%') {
                BinaryOp::Mod
            } else {
                return Ok(lhs);
            };
            self.cur.skip_ws();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs, pos);
        }
    }

    fn parse_unary(&mut self) -> VtlResult<Expr> {
        self.cur.skip_ws();
        if self.cur.peek() == Some('!') && self.cur.peek_nth(1) != Some('=') {
            self.cur.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.cur.eat_word("not") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.cur.peek() == Some('-') {
            if self.cur.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                return self.parse_number();
            }
            let pos = self.cur.pos();
            self.cur.bump();
            let inner = self.parse_unary()?;
            return Ok(binary(BinaryOp::Sub, Expr::Int(0), inner, pos));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> VtlResult<Expr> {
        self.cur.skip_ws();
        match self.cur.peek() {
            Some('$') => match self.try_reference(0)? {
                Some(reference) => Ok(Expr::Reference(reference)),
                None => Err(self.error("expected reference name after '$'")),
            },
            Some('"') => self.parse_string('"', true),
            Some('\'') => self.parse_string('\'', false),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some('[') => self.parse_list_or_range(),
            Some('{') => self.parse_map(),
            Some('(') => {
                self.cur.bump();
                let inner = self.parse_expr()?;
                self.cur.skip_ws();
                self.expect_char(')')?;
                Ok(inner)
            }
            _ if self.cur.eat_word("true") => Ok(Expr::Bool(true)),
            _ if self.cur.eat_word("false") => Ok(Expr::Bool(false)),
            Some(c) => Err(self.error(format!("unexpected '{c}' in expression"))),
            None => Err(self.error("unexpected end of input in expression")),
        }
    }

    /// A quoted string. `\<quote>` escapes the quote character. Double quoted
    /// strings containing `$` or `#` are parsed as templates.
    fn parse_string(&mut self, quote: char, interpolate: bool) -> VtlResult<Expr> {
        let open = self.cur.pos();
        self.cur.bump();
        let content_pos = self.cur.pos();
        let mut text = String::new();
        loop {
            match self.cur.bump() {
                None => return Err(self.error_at(open, "unterminated string literal")),
                Some('\\') if self.cur.peek() == Some(quote) => {
                    self.cur.bump();
                    text.push(quote);
                }
                Some(c) if c == quote => break,
                Some(c) => text.push(c),
            }
        }

        let interpolated = if interpolate && (text.contains('$') || text.contains('#')) {
            Some(self.parse_nested(&text, content_pos)?)
        } else {
            None
        };
        Ok(Expr::Str(StringLiteral { text, interpolated }))
    }

    fn parse_number(&mut self) -> VtlResult<Expr> {
        let pos = self.cur.pos();
        let start = self.cur.offset();
        self.cur.eat_char('-');
        while self.cur.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.cur.bump();
        }
        let is_float =
            self.cur.peek() == Some('.') && self.cur.peek_nth(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.cur.bump();
            while self.cur.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.cur.bump();
            }
        }

        let literal = self.cur.slice(start, self.cur.offset());
        if is_float {
            return literal
                .parse::<f64>()
                .map(Expr::Double)
                .map_err(|e| self.error_at(pos, format!("invalid number '{literal}': {e}")));
        }
        if let Ok(n) = literal.parse::<i32>() {
            return Ok(Expr::Int(n));
        }
        literal
            .parse::<i64>()
            .map(Expr::Long)
            .map_err(|e| self.error_at(pos, format!("invalid number '{literal}': {e}")))
    }

    /// `[a, b]` or `[start..end]`.
    fn parse_list_or_range(&mut self) -> VtlResult<Expr> {
        let pos = self.cur.pos();
        self.cur.bump();
        self.cur.skip_ws();
        if self.cur.eat_char(']') {
            return Ok(Expr::ObjectArray(Vec::new()));
        }

        let first = self.parse_expr()?;
        self.cur.skip_ws();
        if self.cur.eat("..") {
            self.cur.skip_ws();
            let end = self.parse_expr()?;
            self.cur.skip_ws();
            self.expect_char(']')?;
            return Ok(Expr::Range {
                start: Box::new(first),
                end: Box::new(end),
                pos,
            });
        }

        let mut items = vec![first];
        loop {
            self.cur.skip_ws();
            if self.cur.eat_char(']') {
                return Ok(Expr::ObjectArray(items));
            }
            self.expect_char(',')?;
            self.cur.skip_ws();
            items.push(self.parse_expr()?);
        }
    }

    /// `{key: value, ...}`
    fn parse_map(&mut self) -> VtlResult<Expr> {
        self.cur.bump();
        let mut entries = Vec::new();
        loop {
            self.cur.skip_ws();
            if self.cur.eat_char('}') {
                return Ok(Expr::Map(entries));
            }
            if !entries.is_empty() {
                self.expect_char(',')?;
                self.cur.skip_ws();
            }
            let key = self.parse_expr()?;
            self.cur.skip_ws();
            self.expect_char(':')?;
            self.cur.skip_ws();
            let value = self.parse_expr()?;
            entries.push((key, value));
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, pos: SourcePos) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        pos,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, Expr, Node, SetDirective};
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn rhs(source: &str) -> Expr {
        let block = parse(&format!("#set($x = {source})"), "expr.vm").unwrap();
        match block.nodes.into_iter().next() {
            Some(Node::Set(SetDirective { rhs, .. })) => rhs,
            other => panic!("expected #set, got {other:?}"),
        }
    }

    fn op(expr: &Expr) -> BinaryOp {
        match expr {
            Expr::Binary { op, .. } => *op,
            other => panic!("expected binary expression, got {other:?}"),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(rhs("42"), Expr::Int(42));
        assert_eq!(rhs("-7"), Expr::Int(-7));
        assert_eq!(rhs("3000000000"), Expr::Long(3_000_000_000));
        assert_eq!(rhs("2.5"), Expr::Double(2.5));
        assert_eq!(rhs("true"), Expr::Bool(true));
        match rhs("'single $x'") {
            Expr::Str(s) => {
                assert_eq!(s.text, "single $x");
                assert!(s.interpolated.is_none());
            }
            other => panic!("expected string, got {other:?}"),
        }
        match rhs("\"hi $name\"") {
            Expr::Str(s) => assert!(s.interpolated.is_some()),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = rhs("1 + 2 * 3");
        assert_eq!(op(&expr), BinaryOp::Add);
        let Expr::Binary { rhs: right, .. } = &expr else {
            unreachable!()
        };
        assert_eq!(op(right), BinaryOp::Mul);

        let expr = rhs("$a == 1 || $b && !$c");
        assert_eq!(op(&expr), BinaryOp::Or);
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(op(&rhs("$a eq $b")), BinaryOp::Eq);
        assert_eq!(op(&rhs("$a ne $b")), BinaryOp::Ne);
        assert_eq!(op(&rhs("$a lt 3 and $b ge 4")), BinaryOp::And);
        assert!(matches!(rhs("not $a"), Expr::Not(_)));
    }

    #[test]
    fn test_lists_ranges_maps() {
        assert!(matches!(rhs("[1..10]"), Expr::Range { .. }));
        assert!(matches!(rhs("[$a..-2]"), Expr::Range { .. }));
        match rhs("[1, 'two', [3]]") {
            Expr::ObjectArray(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {other:?}"),
        }
        assert_eq!(rhs("[]"), Expr::ObjectArray(Vec::new()));
        match rhs("{'a': 1, 'b': $x}") {
            Expr::Map(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_unary_minus_on_reference() {
        let expr = rhs("-$n");
        assert_eq!(op(&expr), BinaryOp::Sub);
    }

    #[test]
    fn test_errors() {
        assert!(parse("#set($x = )", "t").is_err());
        assert!(parse("#set($x = 'open)", "t").is_err());
        assert!(parse("#set($x = [1, 2)", "t").is_err());
    }
}
