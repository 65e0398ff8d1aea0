/*
 * cursor.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Character cursor with line/column tracking.

use crate::ast::SourcePos;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    #[cfg(test)]
    pub(crate) fn new(src: &'a str) -> Self {
        Self::at(src, SourcePos::new(1, 1))
    }

    /// A cursor whose first character sits at `start` in some outer source.
    pub(crate) fn at(src: &'a str, start: SourcePos) -> Self {
        Self {
            src,
            offset: 0,
            line: start.line,
            column: start.column,
        }
    }

    pub(crate) fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.src[from..to]
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.offset >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub(crate) fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub(crate) fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat(&mut self, s: &str) -> bool {
        if !self.starts_with(s) {
            return false;
        }
        for _ in s.chars() {
            self.bump();
        }
        true
    }

    /// Consume a keyword that is not followed by an identifier character.
    pub(crate) fn eat_word(&mut self, word: &str) -> bool {
        if !self.starts_with(word) {
            return false;
        }
        let boundary = self.rest()[word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_ident_char(c));
        boundary && self.eat(word)
    }

    /// Skip spaces, tabs and line breaks.
    pub(crate) fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.bump();
        }
    }

    /// Skip spaces and tabs only.
    pub(crate) fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    /// Consume one line break (`\n` or `\r\n`) if it comes next.
    pub(crate) fn gobble_newline(&mut self) {
        if !self.eat("\r\n") {
            self.eat_char('\n');
        }
    }

    /// Consume everything up to and including the next `\n`.
    pub(crate) fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    pub(crate) fn at_ident_start(&self) -> bool {
        self.peek().is_some_and(is_ident_start)
    }

    pub(crate) fn read_identifier(&mut self) -> Option<String> {
        if !self.at_ident_start() {
            return None;
        }
        let start = self.offset;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        Some(self.src[start..self.offset].to_string())
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions() {
        let mut cur = Cursor::new("ab\ncd");
        cur.bump();
        cur.bump();
        assert_eq!(cur.pos(), SourcePos::new(1, 3));
        cur.bump();
        assert_eq!(cur.pos(), SourcePos::new(2, 1));
    }

    #[test]
    fn test_eat_word_needs_boundary() {
        let mut cur = Cursor::new("android");
        assert!(!cur.eat_word("and"));
        let mut cur = Cursor::new("and $x");
        assert!(cur.eat_word("and"));
        assert_eq!(cur.rest(), " $x");
    }

    #[test]
    fn test_gobble_newline() {
        let mut cur = Cursor::new("\r\nx");
        cur.gobble_newline();
        assert_eq!(cur.rest(), "x");
        let mut cur = Cursor::new("x");
        cur.gobble_newline();
        assert_eq!(cur.rest(), "x");
    }
}
