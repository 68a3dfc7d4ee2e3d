//! Runtime expression hosting over dynamically generated contexts.
//!
//! Host applications register types, static-access types, and named symbols
//! into a [`TypeRegistry`]; each expression then compiles against a
//! generated context record mirroring the registered symbols, the members
//! of an instance-parameter type, and any declared variables. Compiled
//! context types are cached by the content hash of their rendered source,
//! in memory and optionally on disk, so identical registry state never
//! compiles twice.
//!
//! ## Modules
//!
//! - [`value`]: The dynamic value model and host-object bridge
//! - [`type_info`]: Declarative host type descriptions and variable sources
//! - [`symbols`]: The named symbol table
//! - [`registry`]: Type/symbol registry and context-shape cache
//! - [`context`]: Generated context shapes and live context instances
//! - [`backend`]: The expression front-end (lexer, parser, resolver)
//! - [`eval`]: The tree-walking evaluator
//! - [`artifact`]: Content-hash-keyed compiled-artifact cache
//! - [`compiler`]: The [`ExpressionCompiler`] façade
//!
//! ## Example
//!
//! ```
//! use exprhost::{ExpressionCompiler, Value};
//!
//! let compiler = ExpressionCompiler::new("1 + 1")?;
//! assert_eq!(compiler.execute_function()?, Value::Int(2));
//! # Ok::<(), exprhost::ExprError>(())
//! ```

pub mod artifact;
pub mod backend;
pub mod compiler;
pub mod context;
pub mod error;
pub mod eval;
pub mod hash;
pub mod registry;
pub mod span;
pub mod static_access;
pub mod symbols;
pub mod type_info;
pub mod value;

pub use artifact::{ArtifactCache, DEFAULT_CACHE_DIR};
pub use compiler::ExpressionCompiler;
pub use context::{Context, ContextField, ContextShape};
pub use error::{
    CompileError, ConfigError, Diagnostic, ExprError, ExprResult, FieldOrigin, InvokeError,
    RuntimeError,
};
pub use hash::{ContentHash, TypeHash};
pub use registry::TypeRegistry;
pub use span::Span;
pub use static_access::StaticAccessor;
pub use symbols::{RegisterOutcome, Symbol, SymbolTable};
pub use type_info::{
    MemberFlags, StaticMethod, StaticProperty, StaticValue, TypeInfo, TypeInfoBuilder,
    VariableContext, VariableSource,
};
pub use value::{FromValue, HostObject, IntoValue, ObjectRef, Value, ValueType};
