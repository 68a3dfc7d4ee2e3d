//! The expression compiler façade.
//!
//! [`ExpressionCompiler`] owns one expression string and the configuration
//! it compiles under: a registry, an instance-parameter type, an optional
//! variable source, and a declared result type. Compilation is lazy and
//! memoized; the first `execute_*` call (or an explicit [`compile`])
//! compiles the expression against a generated context shape and snapshots
//! everything execution needs. A failed compile is never cached, so the
//! next access retries after the caller fixes registration. Configuration
//! changes after a successful compile do not recompile.
//!
//! Every execution gets a fresh context instance and refreshes mirrored
//! members and variables before the body runs, so host-side mutation
//! between invocations is always observed.
//!
//! [`compile`]: ExpressionCompiler::compile

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::ast::Expr;
use crate::backend::{CompileOptions, CompileRefs, Compiler};
use crate::error::{ConfigError, ExprError, ExprResult, RuntimeError};
use crate::eval::{EvalScope, evaluate};
use crate::registry::TypeRegistry;
use crate::type_info::{TypeInfo, VariableSource};
use crate::value::{FromValue, HostObject, Value, ValueType};

/// Unit name expression diagnostics are reported against.
const EXPR_UNIT_NAME: &str = "expression";

/// Everything one execution needs, snapshotted at compile time.
struct CompiledExpr {
    body: Expr,
    refs: CompileRefs,
    registry: Arc<TypeRegistry>,
    instance_type: Arc<TypeInfo>,
    variables: Option<Arc<dyn VariableSource>>,
    result: ValueType,
}

/// One expression plus the configuration it compiles and executes under.
pub struct ExpressionCompiler {
    source: String,
    registry: Arc<TypeRegistry>,
    instance_type: Arc<TypeInfo>,
    variables: Option<Arc<dyn VariableSource>>,
    result: ValueType,
    compiled: Mutex<Option<Arc<CompiledExpr>>>,
}

impl ExpressionCompiler {
    /// Create a compiler for one expression.
    ///
    /// Defaults: a fresh private registry, the empty placeholder instance
    /// type, no variables, and an undeclared result type (the body's value
    /// is returned as-is).
    pub fn new(source: impl Into<String>) -> Result<Self, ConfigError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(ConfigError::EmptyExpression);
        }
        Ok(Self {
            source,
            registry: Arc::new(TypeRegistry::new()),
            instance_type: TypeInfo::unit(),
            variables: None,
            result: ValueType::Unit,
            compiled: Mutex::new(None),
        })
    }

    /// The expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The registry compilation resolves against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Use a shared registry instead of the private default.
    pub fn set_registry(&mut self, registry: Arc<TypeRegistry>) -> &mut Self {
        self.registry = registry;
        self
    }

    /// Declare the instance-parameter type whose members the context
    /// mirrors. Auto-registered into the registry at compile time.
    pub fn set_instance_type(&mut self, ty: Arc<TypeInfo>) -> &mut Self {
        self.instance_type = ty;
        self
    }

    /// Attach a variable source; each declared variable becomes a context
    /// field.
    pub fn set_variables(&mut self, variables: Arc<dyn VariableSource>) -> &mut Self {
        self.variables = Some(variables);
        self
    }

    /// Declare the result type; the body's value is coerced to it on every
    /// function execution.
    pub fn set_result_type(&mut self, result: ValueType) -> &mut Self {
        self.result = result;
        self
    }

    /// Whether a successful compile has been memoized.
    pub fn is_compiled(&self) -> bool {
        self.compiled.lock().is_some()
    }

    /// Compile now instead of on first execution.
    pub fn compile(&self) -> ExprResult<()> {
        self.compiled_state().map(|_| ())
    }

    fn compiled_state(&self) -> ExprResult<Arc<CompiledExpr>> {
        let mut slot = self.compiled.lock();
        if let Some(state) = slot.as_ref() {
            return Ok(state.clone());
        }

        self.registry.register_type(self.instance_type.clone());
        let shape = self.registry.context_shape(
            self.result,
            &self.instance_type,
            self.variables.as_deref(),
        )?;
        let refs = self.registry.compile_refs(Some(&shape));
        let source = render_unit(&self.source, &self.registry.imports(), shape.module());
        let unit = Compiler::compile(&source, &refs, CompileOptions::expression(), EXPR_UNIT_NAME)?;
        let Some(body) = unit.body.clone() else {
            // Expression-kind compiles always produce a body or an error.
            return Err(ConfigError::EmptyExpression.into());
        };

        debug!(
            context = shape.module(),
            instance = self.instance_type.name(),
            "expression compiled"
        );
        let state = Arc::new(CompiledExpr {
            body,
            refs,
            registry: self.registry.clone(),
            instance_type: self.instance_type.clone(),
            variables: self.variables.clone(),
            result: self.result,
        });
        *slot = Some(state.clone());
        Ok(state)
    }

    fn run(&self, instance: Option<&dyn HostObject>) -> ExprResult<Value> {
        let compiled = self.compiled_state()?;
        let mut context = compiled.registry.new_context(
            compiled.result,
            &compiled.instance_type,
            compiled.variables.as_deref(),
        )?;
        let value = context.run_function(instance, compiled.variables.as_deref(), |ctx| {
            let scope = EvalScope {
                context: ctx,
                refs: &compiled.refs,
            };
            evaluate(&compiled.body, &scope).map_err(ExprError::from)
        })?;
        if compiled.result == ValueType::Unit {
            return Ok(value);
        }
        value.coerce_to(compiled.result).map_err(ExprError::from)
    }

    /// Compile if needed, refresh a fresh context, run for side effects.
    pub fn execute_action(&self) -> ExprResult<()> {
        self.run(None).map(|_| ())
    }

    /// Action execution against a live instance.
    pub fn execute_action_on(&self, instance: &dyn HostObject) -> ExprResult<()> {
        self.run(Some(instance)).map(|_| ())
    }

    /// Compile if needed, refresh a fresh context, return the body's value.
    pub fn execute_function(&self) -> ExprResult<Value> {
        self.run(None)
    }

    /// Function execution against a live instance.
    pub fn execute_function_on(&self, instance: &dyn HostObject) -> ExprResult<Value> {
        self.run(Some(instance))
    }

    /// Function execution with typed extraction of the result.
    pub fn execute_function_as<T: FromValue>(&self) -> ExprResult<T> {
        let value = self.execute_function()?;
        extract(&value, self.result)
    }

    /// Typed function execution against a live instance.
    pub fn execute_function_on_as<T: FromValue>(
        &self,
        instance: &dyn HostObject,
    ) -> ExprResult<T> {
        let value = self.execute_function_on(instance)?;
        extract(&value, self.result)
    }
}

fn extract<T: FromValue>(value: &Value, declared: ValueType) -> ExprResult<T> {
    T::from_value(value).ok_or_else(|| {
        RuntimeError::TypeMismatch {
            expected: declared,
            actual: value.value_type(),
            context: "result extraction".into(),
        }
        .into()
    })
}

/// Render the compilation unit: a reference header naming the modules in
/// scope, then the expression verbatim.
fn render_unit(expression: &str, imports: &[String], context_module: &str) -> String {
    let mut out = String::new();
    let _ = write!(out, "// refs: {}", imports.join(", "));
    let _ = writeln!(out, " | context: {context_module}");
    out.push_str(expression);
    out.push('\n');
    out
}
