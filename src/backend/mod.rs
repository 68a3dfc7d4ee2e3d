//! The runtime compile backend.
//!
//! [`Compiler::compile`] is a pure function of (source text, references,
//! options) to a [`CompiledUnit`]: it lexes and parses one source unit,
//! resolves every name in the expression body against the supplied
//! references, and aggregates all error-severity diagnostics into a single
//! [`CompileError`]. It holds no state and caches nothing; artifact caching
//! belongs to the registry.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

use std::sync::Arc;

use crate::error::{CompileError, Diagnostic};
use crate::type_info::TypeInfo;
use crate::value::ValueType;

use ast::{CompiledUnit, Expr};
use lexer::Lexer;
use parser::{Parser, fold_constants};

/// What kind of unit a compile is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    /// Declarations only (generated context source).
    #[default]
    Library,
    /// An expression body, possibly preceded by declarations.
    Expression,
}

/// Compile settings.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Fold constant subtrees (on by default).
    pub optimize: bool,
    pub kind: UnitKind,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            kind: UnitKind::Library,
        }
    }
}

impl CompileOptions {
    pub fn expression() -> Self {
        Self {
            optimize: true,
            kind: UnitKind::Expression,
        }
    }
}

/// The set of referenced types and context fields a unit is compiled
/// against.
#[derive(Default, Clone)]
pub struct CompileRefs {
    /// Fields of the context the expression body evaluates inside.
    pub context_fields: Vec<(String, ValueType)>,
    /// All registered types (usable as `Type.member` receivers).
    pub types: Vec<Arc<TypeInfo>>,
    /// Subset whose static members resolve without qualification.
    pub static_types: Vec<Arc<TypeInfo>>,
}

impl CompileRefs {
    /// Whether the context exposes a field of this name.
    pub fn has_context_field(&self, name: &str) -> bool {
        self.context_fields.iter().any(|(n, _)| n == name)
    }

    /// Find a registered type by name.
    pub fn type_named(&self, name: &str) -> Option<&Arc<TypeInfo>> {
        self.types.iter().find(|t| t.name() == name)
    }

    /// Find an unqualified static property across the static-access types.
    pub fn find_static_property(&self, name: &str) -> Option<&crate::type_info::StaticProperty> {
        self.static_types
            .iter()
            .find_map(|t| t.static_property(name))
    }

    /// Find an unqualified static method across the static-access types.
    pub fn find_static_method(&self, name: &str) -> Option<&crate::type_info::StaticMethod> {
        self.static_types.iter().find_map(|t| t.static_method(name))
    }

    fn unqualified_static_property(&self, name: &str) -> bool {
        self.find_static_property(name).is_some()
    }

    fn unqualified_static_method(&self, name: &str) -> bool {
        self.find_static_method(name).is_some()
    }
}

/// Stateless compile entry point.
pub struct Compiler;

impl Compiler {
    /// Compile one source unit.
    ///
    /// Fails with a [`CompileError`] carrying every error-severity
    /// diagnostic; warnings do not block. Never caches.
    pub fn compile(
        source: &str,
        refs: &CompileRefs,
        options: CompileOptions,
        unit_name: &str,
    ) -> Result<CompiledUnit, CompileError> {
        let (tokens, mut diagnostics) = Lexer::new(source).scan();
        let (parsed, mut parse_diags) = Parser::new(tokens).parse_unit();
        diagnostics.append(&mut parse_diags);

        match options.kind {
            UnitKind::Expression if parsed.body.is_none() && diagnostics.is_empty() => {
                diagnostics.push(Diagnostic::new(
                    "E0106",
                    "unit has no expression body",
                    crate::span::Span::point(1, 1),
                ));
            }
            UnitKind::Library => {
                if let Some(body) = &parsed.body {
                    diagnostics.push(Diagnostic::new(
                        "E0106",
                        "library unit must not contain an expression body",
                        body.span(),
                    ));
                }
            }
            _ => {}
        }

        if let Some(body) = &parsed.body {
            resolve_names(body, refs, &mut diagnostics);
        }

        if !diagnostics.is_empty() {
            return Err(CompileError::new(unit_name, diagnostics));
        }

        let body = if options.optimize {
            parsed.body.map(fold_constants)
        } else {
            parsed.body
        };

        Ok(CompiledUnit {
            name: unit_name.to_owned(),
            classes: parsed.classes,
            body,
        })
    }
}

/// Check every identifier in the body against the references.
///
/// Resolution order for a bare identifier: context field, then registered
/// type name, then unqualified static member of a static-access type.
/// Member existence on runtime values is left to evaluation; member
/// existence on type names is checked here because statics are fully known
/// at compile time.
fn resolve_names(expr: &Expr, refs: &CompileRefs, diagnostics: &mut Vec<Diagnostic>) {
    match expr {
        Expr::Literal { .. } => {}
        Expr::Ident { name, span } => {
            if !refs.has_context_field(name)
                && refs.type_named(name).is_none()
                && !refs.unqualified_static_property(name)
            {
                diagnostics.push(Diagnostic::new(
                    "E0102",
                    format!("unknown identifier '{name}'"),
                    *span,
                ));
            }
        }
        Expr::Unary { operand, .. } => resolve_names(operand, refs, diagnostics),
        Expr::Binary { lhs, rhs, .. } => {
            resolve_names(lhs, refs, diagnostics);
            resolve_names(rhs, refs, diagnostics);
        }
        Expr::Member {
            receiver,
            name,
            span,
        } => {
            if let Some(type_name) = static_receiver(receiver, refs) {
                let ty = refs.type_named(type_name).cloned();
                if let Some(ty) = ty {
                    if ty.static_property(name).is_none() {
                        diagnostics.push(Diagnostic::new(
                            "E0103",
                            format!("type '{}' has no static member '{name}'", ty.name()),
                            *span,
                        ));
                    }
                }
            } else {
                resolve_names(receiver, refs, diagnostics);
            }
        }
        Expr::Call {
            receiver,
            name,
            args,
            span,
        } => {
            match receiver {
                None => {
                    if !refs.unqualified_static_method(name) {
                        diagnostics.push(Diagnostic::new(
                            "E0102",
                            format!("unknown function '{name}'"),
                            *span,
                        ));
                    }
                }
                Some(receiver) => {
                    if let Some(type_name) = static_receiver(receiver, refs) {
                        let ty = refs.type_named(type_name).cloned();
                        if let Some(ty) = ty {
                            if ty.static_method(name).is_none() {
                                diagnostics.push(Diagnostic::new(
                                    "E0103",
                                    format!(
                                        "type '{}' has no static method '{name}'",
                                        ty.name()
                                    ),
                                    *span,
                                ));
                            }
                        }
                    } else {
                        resolve_names(receiver, refs, diagnostics);
                    }
                }
            }
            for arg in args {
                resolve_names(arg, refs, diagnostics);
            }
        }
    }
}

/// If the receiver is a bare identifier naming a registered type (and not
/// shadowed by a context field), return the type name.
fn static_receiver<'a>(receiver: &'a Expr, refs: &CompileRefs) -> Option<&'a str> {
    if let Expr::Ident { name, .. } = receiver {
        if !refs.has_context_field(name) && refs.type_named(name).is_some() {
            return Some(name);
        }
    }
    None
}
