//! Owned AST for expressions and generated-context declarations.
//!
//! Nodes are fully owned and serde-serializable: compiled units outlive the
//! compile call that produced them and are persisted to the on-disk artifact
//! cache.

use serde::{Deserialize, Serialize};

use crate::span::Span;
use crate::value::{Value, ValueType};

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// The runtime value of this literal.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Unit,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators, in precedence groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinaryOp {
    /// Left binding power for precedence climbing; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    /// A bare identifier: a context field, a registered type name, or an
    /// unqualified static member.
    Ident {
        name: String,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// Member access `receiver.name`.
    Member {
        receiver: Box<Expr>,
        name: String,
        span: Span,
    },
    /// Method call `receiver.name(args)`, or a free call when `receiver`
    /// is `None`.
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. } => *span,
        }
    }
}

/// Declared type of a context field: a base value type, optionally a list
/// (only the reserved bookkeeping fields are lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclType {
    pub base: ValueType,
    pub is_list: bool,
}

impl DeclType {
    pub fn scalar(base: ValueType) -> Self {
        Self {
            base,
            is_list: false,
        }
    }

    pub fn list(base: ValueType) -> Self {
        Self {
            base,
            is_list: true,
        }
    }
}

/// A field declaration inside a generated class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclField {
    pub name: String,
    pub ty: DeclType,
}

/// A method declaration inside a generated class (signature only; the
/// refresh-then-run bodies are supplied by the runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<String>,
}

/// A generated class declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub fields: Vec<DeclField>,
    pub methods: Vec<MethodDecl>,
}

impl ClassDecl {
    pub fn field(&self, name: &str) -> Option<&DeclField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Output of one backend compile: zero or more class declarations and an
/// optional expression body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub name: String,
    pub classes: Vec<ClassDecl>,
    pub body: Option<Expr>,
}

impl CompiledUnit {
    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }
}
