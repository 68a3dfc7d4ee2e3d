//! Unified error types for expression hosting.
//!
//! Error hierarchy:
//!
//! ```text
//! ExprError (top-level wrapper)
//! ├── ConfigError   - Registration/configuration errors (never retried)
//! ├── CompileError  - Front-end rejection, aggregating all diagnostics
//! ├── InvokeError   - Wrong/missing instance shape at call time
//! └── RuntimeError  - Evaluation faults (type mismatch, bad arguments)
//! ```
//!
//! Each phase-specific error can be handled directly or converted to
//! [`ExprError`] for unified handling. All errors are fatal to the operation
//! that raised them, never to the process; the only implicit retry anywhere
//! is lazy recompilation (a failed compile is not cached).

use thiserror::Error;

use crate::span::Span;
use crate::value::ValueType;

/// Result alias for the top-level error wrapper.
pub type ExprResult<T> = Result<T, ExprError>;

/// Top-level error wrapper for all expression-hosting phases.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Where a generated context field came from.
///
/// Used to name both sides of an ambiguous-field-name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    Symbol,
    Property,
    Field,
    Variable,
    Reserved,
}

impl std::fmt::Display for FieldOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldOrigin::Symbol => "symbol",
            FieldOrigin::Property => "instance property",
            FieldOrigin::Field => "instance field",
            FieldOrigin::Variable => "variable",
            FieldOrigin::Reserved => "reserved field",
        };
        f.write_str(s)
    }
}

/// Registration and configuration errors.
///
/// Always reported synchronously at the call that caused them; the caller
/// must fix registration order or content.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An expression string was empty or whitespace-only.
    #[error("expression text must not be empty")]
    EmptyExpression,

    /// A symbol was registered with the meta-type "a type itself".
    /// Types go through type registration, not symbol registration.
    #[error("symbol '{name}' declares the meta-type; register it as a type instead")]
    TypeAsSymbol { name: String },

    /// Two context field sources resolved to the same field name.
    #[error(
        "ambiguous context field '{name}' on '{declaring}': {first} collides with {second}"
    )]
    AmbiguousFieldName {
        name: String,
        declaring: String,
        first: FieldOrigin,
        second: FieldOrigin,
    },

    /// A symbol lookup by name found nothing.
    #[error("symbol '{name}' is not registered")]
    SymbolNotFound { name: String },
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable identifier, e.g. `E0102`.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Where in the source unit the problem is.
    pub span: Span,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.span, self.message)
    }
}

/// The front-end rejected an expression or a generated source unit.
///
/// Aggregates every error-severity diagnostic from one compile; warnings
/// never appear here and never block success.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("compilation of '{unit}' failed:\n{}", format_diagnostics(diagnostics))]
pub struct CompileError {
    /// Name of the unit that failed to compile.
    pub unit: String,
    /// All error-severity diagnostics, in source order.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(unit: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            unit: unit.into(),
            diagnostics,
        }
    }
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The instance supplied at invocation time does not match the compiled
/// context shape. Surfaced as-is, never translated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    /// The context mirrors members but no instance was supplied.
    #[error("expression context mirrors members of '{instance_type}' but no instance was supplied")]
    MissingInstance { instance_type: String },

    /// The supplied instance does not expose a mirrored member.
    #[error("instance of '{instance_type}' does not expose member '{member}'")]
    MissingMember {
        instance_type: String,
        member: String,
    },
}

/// Evaluation faults raised while running a compiled expression body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// An operand or result had the wrong type.
    #[error("type mismatch: expected {expected}, got {actual}{}", context_suffix(context))]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
        context: String,
    },

    /// A member access or method call found nothing on the receiver.
    #[error("value of type {receiver} has no member '{member}'")]
    UnknownMember { receiver: ValueType, member: String },

    /// A registered type name was used where a value is required.
    #[error("type '{name}' cannot be used as a value")]
    TypeAsValue { name: String },

    /// A method was called with the wrong number or types of arguments.
    #[error("bad arguments to '{method}': {detail}")]
    BadArguments { method: String, detail: String },

    /// Integer division or remainder by zero.
    #[error("integer division by zero")]
    DivisionByZero,

    /// A host static member getter or method reported failure.
    #[error("host member '{member}' failed: {detail}")]
    HostFailure { member: String, detail: String },
}

impl RuntimeError {
    /// Convenience constructor for type mismatches without extra context.
    pub fn mismatch(expected: ValueType, actual: ValueType) -> Self {
        RuntimeError::TypeMismatch {
            expected,
            actual,
            context: String::new(),
        }
    }
}

fn context_suffix(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" ({context})")
    }
}
