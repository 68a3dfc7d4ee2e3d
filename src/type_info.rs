//! Declarative host type descriptions.
//!
//! Rust has no runtime reflection, so the members the original system
//! discovered by reflecting an instance-parameter type are declared here as
//! data: a [`TypeInfo`] lists the public properties, fields, and static
//! members of one host type, and is registered into a
//! [`TypeRegistry`](crate::registry::TypeRegistry).
//!
//! The live side of the same coin is [`HostObject`](crate::value::HostObject):
//! a `TypeInfo` says what members exist, the object supplies their current
//! values when a context is refreshed.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::RuntimeError;
use crate::hash::TypeHash;
use crate::value::{Value, ValueType};

bitflags! {
    /// Member visibility flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemberFlags: u8 {
        /// Excluded from generated expression contexts.
        const HIDDEN = 0b0000_0001;
    }
}

/// A public gettable/settable instance property.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: ValueType,
    pub flags: MemberFlags,
}

/// A public instance field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: ValueType,
    pub flags: MemberFlags,
}

/// How a static property produces its value.
#[derive(Clone)]
pub enum StaticValue {
    /// A constant, captured at registration.
    Const(Value),
    /// A getter evaluated on every access.
    Getter(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl StaticValue {
    pub fn get(&self) -> Value {
        match self {
            StaticValue::Const(v) => v.clone(),
            StaticValue::Getter(f) => f(),
        }
    }
}

impl fmt::Debug for StaticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticValue::Const(v) => write!(f, "Const({v:?})"),
            StaticValue::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

/// A public static property or constant.
#[derive(Debug, Clone)]
pub struct StaticProperty {
    pub name: String,
    pub ty: ValueType,
    pub value: StaticValue,
}

/// Signature type for static method bindings.
pub type StaticFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// A public static method.
#[derive(Clone)]
pub struct StaticMethod {
    pub name: String,
    pub func: StaticFn,
}

impl fmt::Debug for StaticMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticMethod({})", self.name)
    }
}

/// Description of one host type: its name, owning module, and public
/// members.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    name: String,
    module: String,
    properties: Vec<PropertyInfo>,
    fields: Vec<FieldInfo>,
    statics: Vec<StaticProperty>,
    static_methods: Vec<StaticMethod>,
}

impl TypeInfo {
    /// Start building a type description.
    pub fn builder(name: impl Into<String>) -> TypeInfoBuilder {
        TypeInfoBuilder {
            info: TypeInfo {
                name: name.into(),
                module: "host".into(),
                properties: Vec::new(),
                fields: Vec::new(),
                statics: Vec::new(),
                static_methods: Vec::new(),
            },
        }
    }

    /// The empty placeholder type used when a compiler has no instance
    /// parameter.
    pub fn unit() -> Arc<TypeInfo> {
        Arc::new(TypeInfo {
            name: "Unit".into(),
            module: "core".into(),
            properties: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            static_methods: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Deterministic identity of this type, derived from its name.
    pub fn type_hash(&self) -> TypeHash {
        TypeHash::from_name(&self.name)
    }

    pub fn properties(&self) -> &[PropertyInfo] {
        &self.properties
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn statics(&self) -> &[StaticProperty] {
        &self.statics
    }

    pub fn static_methods(&self) -> &[StaticMethod] {
        &self.static_methods
    }

    /// Whether this type mirrors no members into a context (the shape of the
    /// placeholder instance type).
    pub fn is_empty_shape(&self) -> bool {
        self.visible_properties().next().is_none() && self.visible_fields().next().is_none()
    }

    /// Instance properties not hidden from expressions.
    pub fn visible_properties(&self) -> impl Iterator<Item = &PropertyInfo> {
        self.properties
            .iter()
            .filter(|p| !p.flags.contains(MemberFlags::HIDDEN))
    }

    /// Instance fields not hidden from expressions.
    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields
            .iter()
            .filter(|f| !f.flags.contains(MemberFlags::HIDDEN))
    }

    /// Look up a static property by name.
    pub fn static_property(&self, name: &str) -> Option<&StaticProperty> {
        self.statics.iter().find(|s| s.name == name)
    }

    /// Look up a static method by name.
    pub fn static_method(&self, name: &str) -> Option<&StaticMethod> {
        self.static_methods.iter().find(|m| m.name == name)
    }
}

/// Builder for [`TypeInfo`].
pub struct TypeInfoBuilder {
    info: TypeInfo,
}

impl TypeInfoBuilder {
    /// Set the owning module (library/namespace provenance).
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.info.module = module.into();
        self
    }

    /// Add a public instance property.
    pub fn property(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.info.properties.push(PropertyInfo {
            name: name.into(),
            ty,
            flags: MemberFlags::empty(),
        });
        self
    }

    /// Add an instance property hidden from expressions.
    pub fn hidden_property(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.info.properties.push(PropertyInfo {
            name: name.into(),
            ty,
            flags: MemberFlags::HIDDEN,
        });
        self
    }

    /// Add a public instance field.
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.info.fields.push(FieldInfo {
            name: name.into(),
            ty,
            flags: MemberFlags::empty(),
        });
        self
    }

    /// Add an instance field hidden from expressions.
    pub fn hidden_field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.info.fields.push(FieldInfo {
            name: name.into(),
            ty,
            flags: MemberFlags::HIDDEN,
        });
        self
    }

    /// Add a static constant.
    pub fn constant(mut self, name: impl Into<String>, value: Value) -> Self {
        let ty = value.value_type();
        self.info.statics.push(StaticProperty {
            name: name.into(),
            ty,
            value: StaticValue::Const(value),
        });
        self
    }

    /// Add a static property backed by a getter.
    pub fn static_getter(
        mut self,
        name: impl Into<String>,
        ty: ValueType,
        getter: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.info.statics.push(StaticProperty {
            name: name.into(),
            ty,
            value: StaticValue::Getter(Arc::new(getter)),
        });
        self
    }

    /// Add a static method.
    pub fn static_method(
        mut self,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        self.info.static_methods.push(StaticMethod {
            name: name.into(),
            func: Arc::new(func),
        });
        self
    }

    pub fn build(self) -> Arc<TypeInfo> {
        Arc::new(self.info)
    }
}

// ============================================================================
// Variable sources
// ============================================================================

/// A dynamic name→value mapping consulted at context-generation and
/// context-population time.
///
/// `names` is the declared shape (a name may be declared without a live
/// value; its type is then `None` and the registry-wide default variable
/// type applies). `value` returns the live value, `None` when absent, in
/// which case `default_value` is substituted during population.
pub trait VariableSource: Send + Sync {
    /// Declared variable names with the type of their live value, if any.
    fn names(&self) -> Vec<(String, Option<ValueType>)>;

    /// Current live value for a declared name.
    fn value(&self, name: &str) -> Option<Value>;

    /// Value substituted for declared names with no live value.
    fn default_value(&self) -> Value;
}

struct VariableState {
    declared: FxHashSet<String>,
    live: FxHashMap<String, Value>,
}

/// Mutable, shareable [`VariableSource`] backed by a locked map.
///
/// One context shape generated from a `VariableContext` can be reused across
/// expressions that read different subsets of the declared variables;
/// removing a live value does not change the shape, only the populated
/// value.
pub struct VariableContext {
    state: RwLock<VariableState>,
    default_value: Value,
}

impl VariableContext {
    /// Create an empty variable context with the given default value.
    pub fn new(default_value: Value) -> Self {
        Self {
            state: RwLock::new(VariableState {
                declared: FxHashSet::default(),
                live: FxHashMap::default(),
            }),
            default_value,
        }
    }

    /// Declare a variable without giving it a live value.
    pub fn declare(&self, name: impl Into<String>) {
        self.state.write().declared.insert(name.into());
    }

    /// Declare a variable and set its live value.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut state = self.state.write();
        state.declared.insert(name.clone());
        state.live.insert(name, value);
    }

    /// Remove a variable's live value, keeping its declaration.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.state.write().live.remove(name)
    }

    /// Current live value, if any.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.state.read().live.get(name).cloned()
    }
}

impl VariableSource for VariableContext {
    fn names(&self) -> Vec<(String, Option<ValueType>)> {
        let state = self.state.read();
        let mut names: Vec<_> = state
            .declared
            .iter()
            .map(|name| {
                let ty = state.live.get(name).map(Value::value_type);
                (name.clone(), ty)
            })
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    fn value(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn default_value(&self) -> Value {
        self.default_value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_members_are_filtered() {
        let info = TypeInfo::builder("Rocket")
            .property("speed", ValueType::Float)
            .hidden_property("secret", ValueType::Str)
            .field("stage", ValueType::Int)
            .hidden_field("internal", ValueType::Bool)
            .build();
        let props: Vec<_> = info.visible_properties().map(|p| p.name.as_str()).collect();
        let fields: Vec<_> = info.visible_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(props, vec!["speed"]);
        assert_eq!(fields, vec!["stage"]);
    }

    #[test]
    fn unit_type_has_empty_shape() {
        assert!(TypeInfo::unit().is_empty_shape());
    }

    #[test]
    fn static_lookup_by_name() {
        let info = TypeInfo::builder("Math")
            .constant("pi", Value::Float(std::f64::consts::PI))
            .static_method("abs", |args| {
                args[0].clone().coerce_to(ValueType::Float)
            })
            .build();
        assert!(info.static_property("pi").is_some());
        assert!(info.static_method("abs").is_some());
        assert!(info.static_property("tau").is_none());
    }

    #[test]
    fn variable_context_keeps_declaration_after_remove() {
        let vars = VariableContext::new(Value::Float(f64::NAN));
        vars.set("x", Value::Float(10.0));
        vars.set("y", Value::Float(20.0));
        vars.remove("y");

        let names = vars.names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], ("x".into(), Some(ValueType::Float)));
        assert_eq!(names[1], ("y".into(), None));
        assert!(vars.value("y").is_none());
    }
}
