//! Dynamic value model.
//!
//! [`Value`] is the boxed, dynamically typed value that flows between the
//! host, the registry, and the evaluator. [`ValueType`] is its type tag,
//! also used to declare symbol and context-field types.
//!
//! Host-side extraction goes through [`FromValue`]/[`IntoValue`], so callers
//! write `compiler.execute_function_as::<i64>(...)` instead of matching on
//! the enum.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// A host-visible object, the reflection substitute for instance parameters
/// and object-typed values.
///
/// `get_member` returns `None` for members the object does not expose;
/// `invoke` returns `None` for methods it does not have. Both are resolved
/// by name at call time.
pub trait HostObject: Send + Sync {
    /// The registered type name of this object.
    fn type_name(&self) -> &str;

    /// Read a public member by name.
    fn get_member(&self, name: &str) -> Option<Value>;

    /// Invoke a public method by name. `None` means "no such method".
    fn invoke(&self, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
        let _ = (name, args);
        None
    }
}

/// Shared handle to a host object value.
pub type ObjectRef = Arc<dyn HostObject>;

/// Type tag for [`Value`].
///
/// `TypeRef` is the meta-type "a type itself": it exists only so symbol
/// registration can reject it (types go through type registration) and so
/// the resolver can talk about identifiers that name registered types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Object,
    TypeRef,
}

impl ValueType {
    /// Keyword used when rendering generated context source.
    pub fn keyword(self) -> &'static str {
        match self {
            ValueType::Unit => "unit",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "string",
            ValueType::Object => "object",
            ValueType::TypeRef => "typeref",
        }
    }

    /// Look up a type tag by its source keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "unit" => Some(ValueType::Unit),
            "bool" => Some(ValueType::Bool),
            "int" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "string" => Some(ValueType::Str),
            "object" => Some(ValueType::Object),
            "typeref" => Some(ValueType::TypeRef),
            _ => None,
        }
    }

    /// Whether a value of type `actual` is acceptable where `self` is
    /// required. `Int` widens to `Float`; nothing else coerces.
    pub fn accepts(self, actual: ValueType) -> bool {
        self == actual || (self == ValueType::Float && actual == ValueType::Int)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A dynamically typed value.
#[derive(Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjectRef),
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Default value for a declared type, used to seed unpopulated context
    /// slots.
    pub fn default_for(ty: ValueType) -> Value {
        match ty {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str => Value::Str(String::new()),
            _ => Value::Unit,
        }
    }

    /// Numeric view as f64, widening ints.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Coerce into the required type, widening `Int` to `Float` only.
    pub fn coerce_to(self, required: ValueType) -> Result<Value, RuntimeError> {
        let actual = self.value_type();
        if actual == required {
            return Ok(self);
        }
        match (self, required) {
            (Value::Int(i), ValueType::Float) => Ok(Value::Float(i as f64)),
            _ => Err(RuntimeError::mismatch(required, actual)),
        }
    }

    /// Invoke a built-in method on a primitive value.
    ///
    /// Returns `None` when the receiver type has no method of that name, so
    /// the caller can fall through to host-object dispatch.
    pub fn invoke_builtin(
        &self,
        name: &str,
        args: &[Value],
    ) -> Option<Result<Value, RuntimeError>> {
        match self {
            Value::Str(s) => builtin_str(s, name, args),
            Value::Float(f) => builtin_float(*f, name, args),
            Value::Int(i) => builtin_int(*i, name, args),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => write!(f, "Object({})", o.type_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Object(o) => write!(f, "<{}>", o.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ============================================================================
// Host-side conversions
// ============================================================================

/// Extract a typed value out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

/// Box a typed value into a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_owned())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

// ============================================================================
// Built-in methods on primitive values
// ============================================================================

fn arity(method: &str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::BadArguments {
            method: method.to_owned(),
            detail: format!("expected {expected} argument(s), got {}", args.len()),
        })
    }
}

fn int_arg(method: &str, args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(Value::Int(i)) => Ok(*i),
        Some(other) => Err(RuntimeError::BadArguments {
            method: method.to_owned(),
            detail: format!("argument {index} must be int, got {}", other.value_type()),
        }),
        None => Err(RuntimeError::BadArguments {
            method: method.to_owned(),
            detail: format!("missing argument {index}"),
        }),
    }
}

fn str_arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a str, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(RuntimeError::BadArguments {
            method: method.to_owned(),
            detail: format!("argument {index} must be string, got {}", other.value_type()),
        }),
        None => Err(RuntimeError::BadArguments {
            method: method.to_owned(),
            detail: format!("missing argument {index}"),
        }),
    }
}

fn builtin_str(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let result = match name {
        "len" => arity(name, args, 0).map(|()| Value::Int(s.chars().count() as i64)),
        "substring" => arity(name, args, 2).and_then(|()| {
            let start = int_arg(name, args, 0)?;
            let len = int_arg(name, args, 1)?;
            if start < 0 || len < 0 {
                return Err(RuntimeError::BadArguments {
                    method: name.to_owned(),
                    detail: "start and length must be non-negative".into(),
                });
            }
            let taken: String = s
                .chars()
                .skip(start as usize)
                .take(len as usize)
                .collect();
            Ok(Value::Str(taken))
        }),
        "contains" => arity(name, args, 1)
            .and_then(|()| Ok(Value::Bool(s.contains(str_arg(name, args, 0)?)))),
        "starts_with" => arity(name, args, 1)
            .and_then(|()| Ok(Value::Bool(s.starts_with(str_arg(name, args, 0)?)))),
        "ends_with" => arity(name, args, 1)
            .and_then(|()| Ok(Value::Bool(s.ends_with(str_arg(name, args, 0)?)))),
        "to_upper" => arity(name, args, 0).map(|()| Value::Str(s.to_uppercase())),
        "to_lower" => arity(name, args, 0).map(|()| Value::Str(s.to_lowercase())),
        "trim" => arity(name, args, 0).map(|()| Value::Str(s.trim().to_owned())),
        _ => return None,
    };
    Some(result)
}

fn builtin_float(f: f64, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let result = match name {
        "abs" => arity(name, args, 0).map(|()| Value::Float(f.abs())),
        "floor" => arity(name, args, 0).map(|()| Value::Float(f.floor())),
        "ceil" => arity(name, args, 0).map(|()| Value::Float(f.ceil())),
        "sqrt" => arity(name, args, 0).map(|()| Value::Float(f.sqrt())),
        "is_nan" => arity(name, args, 0).map(|()| Value::Bool(f.is_nan())),
        "to_int" => arity(name, args, 0).map(|()| Value::Int(f as i64)),
        _ => return None,
    };
    Some(result)
}

fn builtin_int(i: i64, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let result = match name {
        "abs" => arity(name, args, 0).map(|()| Value::Int(i.wrapping_abs())),
        "to_float" => arity(name, args, 0).map(|()| Value::Float(i as f64)),
        "min" => arity(name, args, 1)
            .and_then(|()| Ok(Value::Int(i.min(int_arg(name, args, 0)?)))),
        "max" => arity(name, args, 1)
            .and_then(|()| Ok(Value::Int(i.max(int_arg(name, args, 0)?)))),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_widens_int_to_float() {
        let widened = Value::Int(3).coerce_to(ValueType::Float).unwrap();
        assert_eq!(widened, Value::Float(3.0));
    }

    #[test]
    fn coerce_rejects_narrowing() {
        assert!(Value::Float(3.5).coerce_to(ValueType::Int).is_err());
        assert!(Value::Str("x".into()).coerce_to(ValueType::Bool).is_err());
    }

    #[test]
    fn substring_matches_char_semantics() {
        let v = Value::Str("hello world".into());
        let out = v
            .invoke_builtin("substring", &[Value::Int(0), Value::Int(5)])
            .unwrap()
            .unwrap();
        assert_eq!(out, Value::Str("hello".into()));
    }

    #[test]
    fn unknown_builtin_falls_through() {
        let v = Value::Int(1);
        assert!(v.invoke_builtin("frobnicate", &[]).is_none());
    }

    #[test]
    fn builtin_arity_is_checked() {
        let v = Value::Str("abc".into());
        let err = v.invoke_builtin("len", &[Value::Int(1)]).unwrap();
        assert!(err.is_err());
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(i64::from_value(&Value::Int(7)), Some(7));
        assert_eq!(f64::from_value(&Value::Int(7)), Some(7.0));
        assert_eq!(bool::from_value(&Value::Int(7)), None);
    }
}
