use std::sync::Arc;

use exprhost::{
    CompileError, ConfigError, ExprError, ExpressionCompiler, HostObject, InvokeError,
    RuntimeError, TypeInfo, TypeRegistry, Value, ValueType, VariableContext,
};

#[test]
fn test_boolean_literal() {
    let compiler = ExpressionCompiler::new("true").unwrap();
    assert_eq!(compiler.execute_function().unwrap(), Value::Bool(true));
}

#[test]
fn test_integer_arithmetic() {
    let compiler = ExpressionCompiler::new("1 + 1").unwrap();
    assert_eq!(compiler.execute_function().unwrap(), Value::Int(2));
}

#[test]
fn test_empty_expression_rejected() {
    assert!(matches!(
        ExpressionCompiler::new(""),
        Err(ConfigError::EmptyExpression)
    ));
    assert!(matches!(
        ExpressionCompiler::new(" \t\n"),
        Err(ConfigError::EmptyExpression)
    ));
}

#[test]
fn test_variables_multiply() {
    let vars = Arc::new(VariableContext::new(Value::Float(f64::NAN)));
    vars.set("x", Value::Float(10.0));
    vars.set("y", Value::Float(20.0));

    let mut compiler = ExpressionCompiler::new("x * y").unwrap();
    compiler.set_variables(vars.clone());
    assert_eq!(compiler.execute_function().unwrap(), Value::Float(200.0));
}

#[test]
fn test_removed_variable_falls_back_to_default() {
    let vars = Arc::new(VariableContext::new(Value::Float(f64::NAN)));
    vars.set("x", Value::Float(10.0));
    vars.set("y", Value::Float(20.0));

    let mut compiler = ExpressionCompiler::new("x * y").unwrap();
    compiler.set_variables(vars.clone());
    assert_eq!(compiler.execute_function().unwrap(), Value::Float(200.0));

    vars.remove("y");
    match compiler.execute_function().unwrap() {
        Value::Float(f) => assert!(f.is_nan()),
        other => panic!("expected float, got {other:?}"),
    }
}

struct Document {
    title: String,
    revision: i64,
}

impl HostObject for Document {
    fn type_name(&self) -> &str {
        "Document"
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        match name {
            "title" => Some(Value::Str(self.title.clone())),
            "revision" => Some(Value::Int(self.revision)),
            _ => None,
        }
    }
}

fn document_type() -> Arc<TypeInfo> {
    TypeInfo::builder("Document")
        .module("docs")
        .property("title", ValueType::Str)
        .property("revision", ValueType::Int)
        .build()
}

#[test]
fn test_instance_refresh_observes_mutation() {
    let mut compiler = ExpressionCompiler::new("title.substring(0, 5).to_upper()").unwrap();
    compiler.set_instance_type(document_type());

    let mut doc = Document {
        title: "draft proposal".into(),
        revision: 1,
    };
    assert_eq!(
        compiler.execute_function_on(&doc).unwrap(),
        Value::Str("DRAFT".into())
    );

    doc.title = "final proposal".into();
    assert_eq!(
        compiler.execute_function_on(&doc).unwrap(),
        Value::Str("FINAL".into())
    );
}

#[test]
fn test_mixed_members_and_symbols() {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register_symbol("min_revision", ValueType::Int, Value::Int(3))
        .unwrap();

    let mut compiler =
        ExpressionCompiler::new("revision >= min_revision && title.len() > 0").unwrap();
    compiler.set_registry(registry.clone());
    compiler.set_instance_type(document_type());

    let doc = Document {
        title: "spec".into(),
        revision: 2,
    };
    assert_eq!(
        compiler.execute_function_on(&doc).unwrap(),
        Value::Bool(false)
    );

    registry.set_symbol_value("min_revision", Value::Int(2)).unwrap();
    assert_eq!(
        compiler.execute_function_on(&doc).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_missing_instance_surfaces_invoke_error() {
    let mut compiler = ExpressionCompiler::new("revision + 1").unwrap();
    compiler.set_instance_type(document_type());
    let err = compiler.execute_function().unwrap_err();
    assert!(matches!(
        err,
        ExprError::Invoke(InvokeError::MissingInstance { .. })
    ));
}

#[test]
fn test_instance_missing_member_surfaces_invoke_error() {
    struct Hollow;
    impl HostObject for Hollow {
        fn type_name(&self) -> &str {
            "Hollow"
        }
        fn get_member(&self, _name: &str) -> Option<Value> {
            None
        }
    }

    let mut compiler = ExpressionCompiler::new("revision + 1").unwrap();
    compiler.set_instance_type(document_type());
    let err = compiler.execute_function_on(&Hollow).unwrap_err();
    assert!(matches!(
        err,
        ExprError::Invoke(InvokeError::MissingMember { .. })
    ));
}

#[test]
fn test_compile_error_aggregates_diagnostics() {
    let compiler = ExpressionCompiler::new("missing_a + missing_b").unwrap();
    let err = compiler.execute_function().unwrap_err();
    match err {
        ExprError::Compile(CompileError { diagnostics, .. }) => {
            assert_eq!(diagnostics.len(), 2);
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn test_failed_compile_retries_after_fix() {
    let registry = Arc::new(TypeRegistry::new());
    let mut compiler = ExpressionCompiler::new("rate * 2.0").unwrap();
    compiler.set_registry(registry.clone());

    assert!(compiler.execute_function().is_err());
    assert!(!compiler.is_compiled());

    registry
        .register_symbol("rate", ValueType::Float, Value::Float(0.5))
        .unwrap();
    assert_eq!(compiler.execute_function().unwrap(), Value::Float(1.0));
    assert!(compiler.is_compiled());
}

#[test]
fn test_static_type_members() {
    let registry = Arc::new(TypeRegistry::new());
    let math = TypeInfo::builder("Math")
        .module("math")
        .constant("pi", Value::Float(std::f64::consts::PI))
        .static_method("round", |args| match args {
            [value] => {
                let x = value.as_f64().ok_or_else(|| RuntimeError::BadArguments {
                    method: "round".into(),
                    detail: "expected a number".into(),
                })?;
                Ok(Value::Float(x.round()))
            }
            _ => Err(RuntimeError::BadArguments {
                method: "round".into(),
                detail: "expected one argument".into(),
            }),
        })
        .build();
    registry.register_static_type(math);

    let mut compiler = ExpressionCompiler::new("round(Math.pi)").unwrap();
    compiler.set_registry(registry.clone());
    assert_eq!(compiler.execute_function().unwrap(), Value::Float(3.0));
}

#[test]
fn test_result_type_widens_integer() {
    let mut compiler = ExpressionCompiler::new("2 * 3").unwrap();
    compiler.set_result_type(ValueType::Float);
    assert_eq!(compiler.execute_function().unwrap(), Value::Float(6.0));
}

#[test]
fn test_result_type_mismatch_is_runtime_error() {
    let mut compiler = ExpressionCompiler::new("\"text\"").unwrap();
    compiler.set_result_type(ValueType::Int);
    let err = compiler.execute_function().unwrap_err();
    assert!(matches!(
        err,
        ExprError::Runtime(RuntimeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_typed_extraction() {
    let compiler = ExpressionCompiler::new("\"ab\" + \"cd\"").unwrap();
    let text: String = compiler.execute_function_as().unwrap();
    assert_eq!(text, "abcd");

    let compiler = ExpressionCompiler::new("10 % 4").unwrap();
    let n: i64 = compiler.execute_function_as().unwrap();
    assert_eq!(n, 2);
}

#[test]
fn test_division_by_zero() {
    let compiler = ExpressionCompiler::new("1 / 0").unwrap();
    let err = compiler.execute_function().unwrap_err();
    assert!(matches!(
        err,
        ExprError::Runtime(RuntimeError::DivisionByZero)
    ));
}

#[test]
fn test_comparison_chain() {
    let vars = Arc::new(VariableContext::new(Value::Float(0.0)));
    vars.set("load", Value::Float(0.85));

    let mut compiler = ExpressionCompiler::new("load > 0.5 && load <= 0.9").unwrap();
    compiler.set_variables(vars);
    assert_eq!(compiler.execute_function().unwrap(), Value::Bool(true));
}
