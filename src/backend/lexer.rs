//! Lexer for expression and generated-context source.
//!
//! Converts source text into a token vector using direct dispatch on the
//! first character. Errors are accumulated as diagnostics rather than
//! aborting the scan, so one compile reports every bad token it finds.

use crate::error::Diagnostic;
use crate::span::Span;

use super::token::{Token, TokenKind};

/// Lexer over a source string.
pub struct Lexer<'src> {
    source: &'src str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: u32,
    col: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            line: 1,
            col: 1,
            diagnostics: Vec::new(),
        }
    }

    /// Scan the whole source, returning all tokens (Eof-terminated) and any
    /// diagnostics.
    pub fn scan(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    // =========================================
    // Cursor primitives
    // =========================================

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let &(_, c) = self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    // =========================================
    // Scanning
    // =========================================

    fn scan_token(&mut self) -> Token {
        self.skip_trivia();

        let start_line = self.line;
        let start_col = self.col;
        let start_offset = self.byte_offset();

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::point(start_line, start_col));
        };

        let kind = match c {
            '"' => return self.scan_string(start_line, start_col),
            c if c.is_ascii_digit() => return self.scan_number(start_line, start_col),
            '.' if self.peek_next().is_some_and(|n| n.is_ascii_digit()) => {
                return self.scan_number(start_line, start_col);
            }
            c if is_ident_start(c) => return self.scan_identifier(start_line, start_col),
            _ => self.scan_operator(start_line, start_col),
        };

        let len = (self.byte_offset() - start_offset) as u32;
        match kind {
            Some(kind) => Token::new(kind, Span::new(start_line, start_col, len)),
            // Error already recorded; keep scanning from the next char.
            None => self.scan_token(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                // Line comments appear in rendered context source.
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, line: u32, col: u32) -> Token {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => text.push(other),
                    None => {
                        self.diagnostics.push(Diagnostic::new(
                            "E0002",
                            "unterminated string literal",
                            Span::point(line, col),
                        ));
                        return Token::new(TokenKind::Eof, Span::point(self.line, self.col));
                    }
                },
                Some(c) => text.push(c),
                None => {
                    self.diagnostics.push(Diagnostic::new(
                        "E0002",
                        "unterminated string literal",
                        Span::point(line, col),
                    ));
                    return Token::new(TokenKind::Eof, Span::point(self.line, self.col));
                }
            }
        }
        let len = (text.len() + 2) as u32;
        Token::new(TokenKind::Str(text), Span::new(line, col, len))
    }

    fn scan_number(&mut self, line: u32, col: u32) -> Token {
        let start = self.byte_offset();

        // Hex literal
        if self.peek() == Some('0') && matches!(self.peek_next(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let text = &self.source[start..self.byte_offset()];
            let span = Span::new(line, col, text.len() as u32);
            return match i64::from_str_radix(&text[2..], 16) {
                Ok(value) => Token::new(TokenKind::Int(value), span),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::new(
                        "E0003",
                        format!("invalid numeric literal '{text}'"),
                        span,
                    ));
                    Token::new(TokenKind::Int(0), span)
                }
            };
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.pos + 1;
            if matches!(
                self.chars.get(lookahead).map(|&(_, c)| c),
                Some('+') | Some('-')
            ) {
                lookahead += 1;
            }
            if self
                .chars
                .get(lookahead)
                .is_some_and(|&(_, c)| c.is_ascii_digit())
            {
                is_float = true;
                while self.pos < lookahead {
                    self.advance();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.source[start..self.byte_offset()];
        let span = Span::new(line, col, text.len() as u32);
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => Token::new(TokenKind::Float(value), span),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::new(
                        "E0003",
                        format!("invalid numeric literal '{text}'"),
                        span,
                    ));
                    Token::new(TokenKind::Float(0.0), span)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Token::new(TokenKind::Int(value), span),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::new(
                        "E0003",
                        format!("invalid numeric literal '{text}'"),
                        span,
                    ));
                    Token::new(TokenKind::Int(0), span)
                }
            }
        }
    }

    fn scan_identifier(&mut self, line: u32, col: u32) -> Token {
        let start = self.byte_offset();
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = &self.source[start..self.byte_offset()];
        let span = Span::new(line, col, text.len() as u32);
        let kind = TokenKind::lookup_keyword(text)
            .unwrap_or_else(|| TokenKind::Ident(text.to_owned()));
        Token::new(kind, span)
    }

    fn scan_operator(&mut self, line: u32, col: u32) -> Option<TokenKind> {
        let c = self.advance()?;
        let two = |lexer: &mut Self, next: char, yes: TokenKind, no: TokenKind| {
            if lexer.peek() == Some(next) {
                lexer.advance();
                yes
            } else {
                no
            }
        };
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => two(self, '=', TokenKind::BangEq, TokenKind::Bang),
            '<' => two(self, '=', TokenKind::LtEq, TokenKind::Lt),
            '>' => two(self, '=', TokenKind::GtEq, TokenKind::Gt),
            '=' if self.peek() == Some('=') => {
                self.advance();
                TokenKind::EqEq
            }
            '&' if self.peek() == Some('&') => {
                self.advance();
                TokenKind::AmpAmp
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                TokenKind::PipePipe
            }
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => {
                self.diagnostics.push(Diagnostic::new(
                    "E0001",
                    format!("unexpected character '{other}'"),
                    Span::new(line, col, other.len_utf8() as u32),
                ));
                return None;
            }
        };
        Some(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = Lexer::new(source).scan();
        assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_arithmetic() {
        assert_eq!(
            kinds("1 + 2.5"),
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Float(2.5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("true x_1 class"),
            vec![
                TokenKind::True,
                TokenKind::Ident("x_1".into()),
                TokenKind::Class,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn scans_two_char_operators() {
        assert_eq!(
            kinds("a && b || c == d != e <= f >= g"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::AmpAmp,
                TokenKind::Ident("b".into()),
                TokenKind::PipePipe,
                TokenKind::Ident("c".into()),
                TokenKind::EqEq,
                TokenKind::Ident("d".into()),
                TokenKind::BangEq,
                TokenKind::Ident("e".into()),
                TokenKind::LtEq,
                TokenKind::Ident("f".into()),
                TokenKind::GtEq,
                TokenKind::Ident("g".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn hex_literal() {
        assert_eq!(kinds("0xFF"), vec![TokenKind::Int(255), TokenKind::Eof]);
    }

    #[test]
    fn scientific_notation() {
        assert_eq!(
            kinds("1e3"),
            vec![TokenKind::Float(1000.0), TokenKind::Eof]
        );
    }

    #[test]
    fn line_comments_are_trivia() {
        assert_eq!(
            kinds("// header\n42"),
            vec![TokenKind::Int(42), TokenKind::Eof]
        );
    }

    #[test]
    fn every_bad_character_is_reported() {
        let (_, diagnostics) = Lexer::new("1 @ 2 # 3").scan();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.code == "E0001"));
    }

    #[test]
    fn unterminated_string_is_reported() {
        let (_, diagnostics) = Lexer::new("\"abc").scan();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, "E0002");
    }
}
