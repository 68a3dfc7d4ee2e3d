//! Parser for expression and generated-context source.
//!
//! A source unit is zero or more `class` declarations followed by an
//! optional expression body. Expressions use precedence climbing; class
//! members resynchronize at `;` after an error so one compile can report
//! several bad declarations.

use crate::error::Diagnostic;
use crate::span::Span;
use crate::value::ValueType;

use super::ast::{
    BinaryOp, ClassDecl, DeclField, DeclType, Expr, Literal, MethodDecl, UnaryOp,
};
use super::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Parsed unit body before assembly into a
/// [`CompiledUnit`](super::ast::CompiledUnit).
pub struct ParsedUnit {
    pub classes: Vec<ClassDecl>,
    pub body: Option<Expr>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Parse the whole unit, returning what parsed and all diagnostics.
    pub fn parse_unit(mut self) -> (ParsedUnit, Vec<Diagnostic>) {
        let mut classes = Vec::new();
        while self.check(&TokenKind::Class) {
            if let Some(class) = self.parse_class() {
                classes.push(class);
            } else {
                break;
            }
        }

        let body = if self.check(&TokenKind::Eof) {
            None
        } else {
            let expr = self.parse_expr(0);
            if expr.is_some() && !self.check(&TokenKind::Eof) {
                let token = self.peek().clone();
                self.error(format!(
                    "expected end of input, found {}",
                    token.kind.describe()
                ), token.span);
            }
            expr
        };

        (ParsedUnit { classes, body }, self.diagnostics)
    }

    // =========================================
    // Token helpers
    // =========================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let token = self.peek().clone();
            self.error(
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
                token.span,
            );
            None
        }
    }

    fn expect_ident(&mut self) -> Option<(String, Span)> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Some((name, span))
            }
            other => {
                let span = self.peek().span;
                self.error(
                    format!("expected identifier, found {}", other.describe()),
                    span,
                );
                None
            }
        }
    }

    fn error(&mut self, message: String, span: Span) {
        self.diagnostics.push(Diagnostic::new("E0101", message, span));
    }

    // =========================================
    // Declarations
    // =========================================

    fn parse_class(&mut self) -> Option<ClassDecl> {
        self.expect(&TokenKind::Class)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields: Vec<DeclField> = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            if self.check(&TokenKind::Fn) {
                if let Some(method) = self.parse_method() {
                    methods.push(method);
                } else {
                    self.sync_to_semicolon();
                }
            } else if let Some((field, name_span)) = self.parse_field() {
                if fields.iter().any(|f| f.name == field.name) {
                    self.diagnostics.push(Diagnostic::new(
                        "E0104",
                        format!("duplicate field '{}' in class '{name}'", field.name),
                        name_span,
                    ));
                }
                fields.push(field);
            } else {
                self.sync_to_semicolon();
            }
        }
        self.expect(&TokenKind::RBrace)?;

        Some(ClassDecl {
            name,
            fields,
            methods,
        })
    }

    fn parse_method(&mut self) -> Option<MethodDecl> {
        self.expect(&TokenKind::Fn)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident()?;
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semicolon)?;
        Some(MethodDecl { name, params })
    }

    /// Parse one field declaration, returning it with the span of its name
    /// so duplicate reports point at the field itself.
    fn parse_field(&mut self) -> Option<(DeclField, Span)> {
        let (keyword, span) = self.expect_ident()?;
        let Some(base) = ValueType::from_keyword(&keyword) else {
            self.diagnostics.push(Diagnostic::new(
                "E0105",
                format!("unknown type keyword '{keyword}'"),
                span,
            ));
            return None;
        };
        let is_list = if self.eat(&TokenKind::LBracket) {
            self.expect(&TokenKind::RBracket)?;
            true
        } else {
            false
        };
        let (name, name_span) = self.expect_ident()?;
        self.expect(&TokenKind::Semicolon)?;
        Some((
            DeclField {
                name,
                ty: DeclType { base, is_list },
            },
            name_span,
        ))
    }

    fn sync_to_semicolon(&mut self) {
        while !self.check(&TokenKind::Semicolon)
            && !self.check(&TokenKind::RBrace)
            && !self.check(&TokenKind::Eof)
        {
            self.advance();
        }
        self.eat(&TokenKind::Semicolon);
    }

    // =========================================
    // Expressions (precedence climbing)
    // =========================================

    fn parse_expr(&mut self, min_precedence: u8) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;

        while let Some(op) = binary_op(&self.peek().kind) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(precedence + 1)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span());
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (name, name_span) = self.expect_ident()?;
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    let span = expr.span().merge(name_span);
                    expr = Expr::Call {
                        receiver: Some(Box::new(expr)),
                        name,
                        args,
                        span,
                    };
                } else {
                    let span = expr.span().merge(name_span);
                    expr = Expr::Member {
                        receiver: Box::new(expr),
                        name,
                        span,
                    };
                }
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Int(value),
                    span: token.span,
                })
            }
            TokenKind::Float(value) => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Float(value),
                    span: token.span,
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Str(value),
                    span: token.span,
                })
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Bool(true),
                    span: token.span,
                })
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Bool(false),
                    span: token.span,
                })
            }
            TokenKind::Null => {
                self.advance();
                Some(Expr::Literal {
                    value: Literal::Null,
                    span: token.span,
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Some(Expr::Call {
                        receiver: None,
                        name,
                        args,
                        span: token.span,
                    })
                } else {
                    Some(Expr::Ident {
                        name,
                        span: token.span,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(&TokenKind::RParen)?;
                Some(inner)
            }
            other => {
                self.error(
                    format!("expected expression, found {}", other.describe()),
                    token.span,
                );
                None
            }
        }
    }

    fn parse_args(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some(args)
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Rem),
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::LtEq => Some(BinaryOp::LtEq),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::GtEq => Some(BinaryOp::GtEq),
        TokenKind::EqEq => Some(BinaryOp::Eq),
        TokenKind::BangEq => Some(BinaryOp::NotEq),
        TokenKind::AmpAmp => Some(BinaryOp::And),
        TokenKind::PipePipe => Some(BinaryOp::Or),
        _ => None,
    }
}

/// Fold constant subtrees bottom-up. Folds that would fault at runtime
/// (overflow, division by zero) are left unfolded so evaluation reports
/// them.
pub fn fold_constants(expr: Expr) -> Expr {
    match expr {
        Expr::Unary { op, operand, span } => {
            let operand = fold_constants(*operand);
            if let Expr::Literal { value, .. } = &operand {
                match (op, value) {
                    (UnaryOp::Neg, Literal::Int(i)) => {
                        if let Some(folded) = i.checked_neg() {
                            return Expr::Literal {
                                value: Literal::Int(folded),
                                span,
                            };
                        }
                    }
                    (UnaryOp::Neg, Literal::Float(f)) => {
                        return Expr::Literal {
                            value: Literal::Float(-f),
                            span,
                        };
                    }
                    (UnaryOp::Not, Literal::Bool(b)) => {
                        return Expr::Literal {
                            value: Literal::Bool(!b),
                            span,
                        };
                    }
                    _ => {}
                }
            }
            Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            }
        }
        Expr::Binary { op, lhs, rhs, span } => {
            let lhs = fold_constants(*lhs);
            let rhs = fold_constants(*rhs);
            if let (Expr::Literal { value: a, .. }, Expr::Literal { value: b, .. }) = (&lhs, &rhs) {
                if let Some(folded) = fold_binary(op, a, b) {
                    return Expr::Literal {
                        value: folded,
                        span,
                    };
                }
            }
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            }
        }
        Expr::Member {
            receiver,
            name,
            span,
        } => Expr::Member {
            receiver: Box::new(fold_constants(*receiver)),
            name,
            span,
        },
        Expr::Call {
            receiver,
            name,
            args,
            span,
        } => Expr::Call {
            receiver: receiver.map(|r| Box::new(fold_constants(*r))),
            name,
            args: args.into_iter().map(fold_constants).collect(),
            span,
        },
        other => other,
    }
}

fn fold_binary(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
    use Literal::{Bool, Float, Int};
    match (op, a, b) {
        (BinaryOp::Add, Int(x), Int(y)) => x.checked_add(*y).map(Int),
        (BinaryOp::Sub, Int(x), Int(y)) => x.checked_sub(*y).map(Int),
        (BinaryOp::Mul, Int(x), Int(y)) => x.checked_mul(*y).map(Int),
        (BinaryOp::Div, Int(x), Int(y)) => x.checked_div(*y).map(Int),
        (BinaryOp::Rem, Int(x), Int(y)) => x.checked_rem(*y).map(Int),
        (BinaryOp::Add, Float(x), Float(y)) => Some(Float(x + y)),
        (BinaryOp::Sub, Float(x), Float(y)) => Some(Float(x - y)),
        (BinaryOp::Mul, Float(x), Float(y)) => Some(Float(x * y)),
        (BinaryOp::Div, Float(x), Float(y)) => Some(Float(x / y)),
        (BinaryOp::And, Bool(x), Bool(y)) => Some(Bool(*x && *y)),
        (BinaryOp::Or, Bool(x), Bool(y)) => Some(Bool(*x || *y)),
        _ => None,
    }
}
