//! Tree-walking evaluator for compiled expression bodies.
//!
//! Evaluates an [`Expr`] against an [`EvalScope`]: a live context plus the
//! compile references (registered types and static-access types) the body
//! was resolved against. Numeric arithmetic promotes `int` to `float` when
//! either side is a float; `&&`/`||` short-circuit; `+` concatenates
//! strings. Method dispatch tries built-in primitive methods first, then
//! host-object methods.

use crate::backend::CompileRefs;
use crate::backend::ast::{BinaryOp, Expr, UnaryOp};
use crate::context::Context;
use crate::error::RuntimeError;
use crate::value::{Value, ValueType};

/// Everything an expression body can see while evaluating.
pub struct EvalScope<'a> {
    pub context: &'a Context,
    pub refs: &'a CompileRefs,
}

/// Evaluate an expression body within a scope.
pub fn evaluate(expr: &Expr, scope: &EvalScope<'_>) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Literal { value, .. } => Ok(value.to_value()),
        Expr::Ident { name, .. } => eval_ident(name, scope),
        Expr::Unary { op, operand, .. } => {
            let value = evaluate(operand, scope)?;
            eval_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs, .. } => eval_binary(*op, lhs, rhs, scope),
        Expr::Member { receiver, name, .. } => {
            if let Some(ty) = static_type_receiver(receiver, scope) {
                let property = scope
                    .refs
                    .type_named(ty)
                    .and_then(|t| t.static_property(name))
                    .ok_or_else(|| RuntimeError::UnknownMember {
                        receiver: ValueType::TypeRef,
                        member: name.clone(),
                    })?;
                return Ok(property.value.get());
            }
            let value = evaluate(receiver, scope)?;
            match &value {
                Value::Object(object) => {
                    object
                        .get_member(name)
                        .ok_or_else(|| RuntimeError::UnknownMember {
                            receiver: ValueType::Object,
                            member: name.clone(),
                        })
                }
                other => Err(RuntimeError::UnknownMember {
                    receiver: other.value_type(),
                    member: name.clone(),
                }),
            }
        }
        Expr::Call {
            receiver,
            name,
            args,
            ..
        } => {
            let args: Vec<Value> = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<_, _>>()?;
            match receiver {
                None => {
                    let method = scope.refs.find_static_method(name).ok_or_else(|| {
                        RuntimeError::UnknownMember {
                            receiver: ValueType::TypeRef,
                            member: name.clone(),
                        }
                    })?;
                    (method.func)(&args)
                }
                Some(receiver) => {
                    if let Some(ty) = static_type_receiver(receiver, scope) {
                        let method = scope
                            .refs
                            .type_named(ty)
                            .and_then(|t| t.static_method(name))
                            .ok_or_else(|| RuntimeError::UnknownMember {
                                receiver: ValueType::TypeRef,
                                member: name.clone(),
                            })?;
                        return (method.func)(&args);
                    }
                    let value = evaluate(receiver, scope)?;
                    if let Some(result) = value.invoke_builtin(name, &args) {
                        return result;
                    }
                    if let Value::Object(object) = &value {
                        if let Some(result) = object.invoke(name, &args) {
                            return result;
                        }
                    }
                    Err(RuntimeError::UnknownMember {
                        receiver: value.value_type(),
                        member: name.clone(),
                    })
                }
            }
        }
    }
}

fn eval_ident(name: &str, scope: &EvalScope<'_>) -> Result<Value, RuntimeError> {
    if let Some(value) = scope.context.get(name) {
        return Ok(value.clone());
    }
    if let Some(property) = scope.refs.find_static_property(name) {
        return Ok(property.value.get());
    }
    if scope.refs.type_named(name).is_some() {
        return Err(RuntimeError::TypeAsValue {
            name: name.to_owned(),
        });
    }
    // The resolver rejects unknown identifiers at compile time; reaching
    // this path means the context shape changed underneath the body.
    Err(RuntimeError::UnknownMember {
        receiver: ValueType::Object,
        member: name.to_owned(),
    })
}

/// A call/member receiver that names a registered type rather than a
/// context field.
fn static_type_receiver<'e>(receiver: &'e Expr, scope: &EvalScope<'_>) -> Option<&'e str> {
    if let Expr::Ident { name, .. } = receiver {
        if scope.context.get(name).is_none() && scope.refs.type_named(name).is_some() {
            return Some(name);
        }
    }
    None
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, RuntimeError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(RuntimeError::mismatch(
            ValueType::Float,
            other.value_type(),
        )),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, other) => Err(RuntimeError::mismatch(
            ValueType::Bool,
            other.value_type(),
        )),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &EvalScope<'_>,
) -> Result<Value, RuntimeError> {
    // Short-circuit forms evaluate the right side conditionally.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = expect_bool(evaluate(lhs, scope)?)?;
        return match (op, left) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(expect_bool(evaluate(rhs, scope)?)?)),
        };
    }

    let left = evaluate(lhs, scope)?;
    let right = evaluate(rhs, scope)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Add => eval_add(left, right),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            eval_arith(op, left, right)
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            eval_compare(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn expect_bool(value: Value) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RuntimeError::mismatch(
            ValueType::Bool,
            other.value_type(),
        )),
    }
}

fn eval_add(left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (left, right) => {
            let (a, b) = numeric_pair("+", left, right)?;
            Ok(Value::Float(a + b))
        }
    }
}

fn eval_arith(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
            BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            BinaryOp::Div => a
                .checked_div(b)
                .map(Value::Int)
                .ok_or(RuntimeError::DivisionByZero),
            BinaryOp::Rem => a
                .checked_rem(b)
                .map(Value::Int)
                .ok_or(RuntimeError::DivisionByZero),
            _ => unreachable!(),
        };
    }
    let symbol = match op {
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        _ => unreachable!(),
    };
    let (a, b) = numeric_pair(symbol, left, right)?;
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}

fn eval_compare(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
        let result = match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::GtEq => a >= b,
            _ => unreachable!(),
        };
        return Ok(Value::Bool(result));
    }
    let symbol = match op {
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        _ => unreachable!(),
    };
    let (a, b) = numeric_pair(symbol, left, right)?;
    let result = match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn numeric_pair(op: &str, left: Value, right: Value) -> Result<(f64, f64), RuntimeError> {
    let a = left.as_f64().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: ValueType::Float,
        actual: left.value_type(),
        context: format!("left operand of '{op}'"),
    })?;
    let b = right.as_f64().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: ValueType::Float,
        actual: right.value_type(),
        context: format!("right operand of '{op}'"),
    })?;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{CompileOptions, Compiler};
    use crate::registry::TypeRegistry;
    use crate::type_info::TypeInfo;

    fn eval_with(registry: &TypeRegistry, source: &str) -> Result<Value, RuntimeError> {
        let instance = TypeInfo::unit();
        let shape = registry
            .context_shape(ValueType::Unit, &instance, None)
            .unwrap();
        let refs = registry.compile_refs(Some(&shape));
        let unit = Compiler::compile(source, &refs, CompileOptions::expression(), "test")
            .unwrap_or_else(|e| panic!("{e}"));
        let context = registry
            .new_context(ValueType::Unit, &instance, None)
            .unwrap();
        let scope = EvalScope {
            context: &context,
            refs: &refs,
        };
        evaluate(unit.body.as_ref().unwrap(), &scope)
    }

    fn eval(source: &str) -> Value {
        eval_with(&TypeRegistry::new(), source).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval("7 % 3"), Value::Int(1));
    }

    #[test]
    fn mixed_numerics_promote() {
        assert_eq!(eval("1 + 0.5"), Value::Float(1.5));
        assert_eq!(eval("3 / 2.0"), Value::Float(1.5));
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(eval("3 / 2"), Value::Int(1));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = eval_with(&TypeRegistry::new(), "1 / 0").unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero);
    }

    #[test]
    fn float_division_by_zero_follows_ieee() {
        assert_eq!(eval("1.0 / 0.0"), Value::Float(f64::INFINITY));
    }

    #[test]
    fn string_concat_and_compare() {
        assert_eq!(eval("\"ab\" + \"cd\""), Value::Str("abcd".into()));
        assert_eq!(eval("\"ab\" < \"b\""), Value::Bool(true));
    }

    #[test]
    fn short_circuit_skips_rhs() {
        // The right side would fault if evaluated.
        assert_eq!(eval("false && (1 / 0 == 0)"), Value::Bool(false));
        assert_eq!(eval("true || (1 / 0 == 0)"), Value::Bool(true));
    }

    #[test]
    fn builtin_methods_chain() {
        assert_eq!(eval("\"  pad  \".trim().len()"), Value::Int(3));
        assert_eq!(
            eval("\"hello world\".substring(0, 5).to_upper()"),
            Value::Str("HELLO".into())
        );
    }

    #[test]
    fn symbols_resolve_through_context() {
        let registry = TypeRegistry::new();
        registry
            .register_symbol("gain", ValueType::Float, Value::Float(2.5))
            .unwrap();
        assert_eq!(eval_with(&registry, "gain * 2").unwrap(), Value::Float(5.0));
    }

    #[test]
    fn static_members_resolve() {
        let registry = TypeRegistry::new();
        let math = TypeInfo::builder("Math")
            .module("math")
            .constant("pi", Value::Float(std::f64::consts::PI))
            .static_method("max", |args| match (&args[0], &args[1]) {
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a.max(*b))),
                (a, b) => {
                    let a = a.as_f64().unwrap_or(f64::NAN);
                    let b = b.as_f64().unwrap_or(f64::NAN);
                    Ok(Value::Float(a.max(b)))
                }
            })
            .build();
        registry.register_static_type(math);

        assert_eq!(
            eval_with(&registry, "Math.pi > 3.0").unwrap(),
            Value::Bool(true)
        );
        // Unqualified access through the static-access set.
        assert_eq!(
            eval_with(&registry, "max(1.0, 2.0)").unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            eval_with(&registry, "pi < 4.0").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn host_object_members_dispatch() {
        struct Point;
        impl crate::value::HostObject for Point {
            fn type_name(&self) -> &str {
                "Point"
            }
            fn get_member(&self, name: &str) -> Option<Value> {
                match name {
                    "x" => Some(Value::Float(3.0)),
                    "y" => Some(Value::Float(4.0)),
                    _ => None,
                }
            }
            fn invoke(
                &self,
                name: &str,
                _args: &[Value],
            ) -> Option<Result<Value, RuntimeError>> {
                match name {
                    "norm" => Some(Ok(Value::Float(5.0))),
                    _ => None,
                }
            }
        }

        let registry = TypeRegistry::new();
        registry
            .register_symbol("p", ValueType::Object, Value::Object(Arc::new(Point)))
            .unwrap();
        assert_eq!(
            eval_with(&registry, "p.x + p.y").unwrap(),
            Value::Float(7.0)
        );
        assert_eq!(eval_with(&registry, "p.norm()").unwrap(), Value::Float(5.0));
        let err = eval_with(&registry, "p.z").unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownMember { .. }));
    }

    #[test]
    fn type_name_as_value_faults() {
        let registry = TypeRegistry::new();
        registry.register_type(TypeInfo::builder("Marker").module("m").build());
        let err = eval_with(&registry, "Marker == Marker").unwrap_err();
        assert!(matches!(err, RuntimeError::TypeAsValue { .. }));
    }
}
