//! Generated context shapes and live context instances.
//!
//! A [`ContextShape`] is the synthesized record type an expression evaluates
//! against: one field per registered symbol, per visible instance member of
//! the instance-parameter type, and per declared variable, plus the three
//! reserved bookkeeping fields. The shape is rendered as source text, so its
//! content hash is deterministic for identical registry state. That hash
//! keys the compiled-artifact cache and names the generated module.
//!
//! A [`Context`] is one live instance of a shape. A fresh instance is
//! produced for every execution; its entry points refresh the mirrored
//! slots from the live instance and variable source before running the
//! expression body, so member mutations between invocations are always
//! observed.

use std::fmt::Write as _;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::backend::ast::CompiledUnit;
use crate::error::{ConfigError, FieldOrigin, InvokeError, RuntimeError};
use crate::hash::ContentHash;
use crate::type_info::{TypeInfo, VariableSource};
use crate::value::{HostObject, Value, ValueType};

/// Fixed name of the generated context class.
pub const CONTEXT_CLASS: &str = "Globals";

/// Reserved bookkeeping field listing mirrored property names.
pub const RESERVED_PROPERTIES: &str = "__expression_properties";
/// Reserved bookkeeping field listing mirrored field names.
pub const RESERVED_FIELDS: &str = "__expression_fields";
/// Reserved bookkeeping field listing declared variable names.
pub const RESERVED_VARIABLES: &str = "__expression_variables";

/// Fixed entry method running a side-effecting body after refresh.
pub const ENTRY_ACTION: &str = "refresh_run_action";
/// Fixed entry method running a value-producing body after refresh.
pub const ENTRY_FUNCTION: &str = "refresh_run_function";

/// One field of a generated context, with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextField {
    pub name: String,
    pub ty: ValueType,
    pub origin: FieldOrigin,
}

/// The inputs a shape is generated from, snapshotted from registry state.
pub(crate) struct ShapeSpec<'a> {
    /// Registered symbols, sorted by name for hash determinism.
    pub symbols: &'a [(String, ValueType)],
    pub instance: &'a TypeInfo,
    /// Declared variables, sorted by name, types already defaulted.
    pub variables: &'a [(String, ValueType)],
    pub result: ValueType,
}

/// A generated context type: field layout, bookkeeping lists, rendered
/// source, and the compiled unit backing it.
#[derive(Debug)]
pub struct ContextShape {
    fields: Vec<ContextField>,
    index: FxHashMap<String, usize>,
    property_names: Vec<String>,
    field_names: Vec<String>,
    variable_names: Vec<String>,
    source: String,
    hash: ContentHash,
    module: String,
    instance_type: String,
    result: ValueType,
    unit: Arc<CompiledUnit>,
}

impl ContextShape {
    pub fn fields(&self) -> &[ContextField] {
        &self.fields
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// The rendered source this shape was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Content hash of the rendered source.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// The hashed module name the generated class lives in.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn result_type(&self) -> ValueType {
        self.result
    }

    /// The compiled unit backing this shape.
    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    pub fn field_named(&self, name: &str) -> Option<&ContextField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Field (name, type) pairs, as compile references.
    pub fn field_types(&self) -> Vec<(String, ValueType)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.ty))
            .collect()
    }
}

/// Collect fields, reject duplicates, and render the deterministic source
/// for a shape. Pure; no compilation happens here.
pub(crate) fn build_shape_source(
    spec: &ShapeSpec<'_>,
) -> Result<(Vec<ContextField>, String), ConfigError> {
    let mut fields: Vec<ContextField> = Vec::new();
    let mut seen: FxHashMap<String, FieldOrigin> = FxHashMap::default();
    let declaring = spec.instance.name().to_owned();

    let push = |fields: &mut Vec<ContextField>,
                seen: &mut FxHashMap<String, FieldOrigin>,
                name: &str,
                ty: ValueType,
                origin: FieldOrigin|
     -> Result<(), ConfigError> {
        if let Some(&first) = seen.get(name) {
            return Err(ConfigError::AmbiguousFieldName {
                name: name.to_owned(),
                declaring: declaring.clone(),
                first,
                second: origin,
            });
        }
        seen.insert(name.to_owned(), origin);
        fields.push(ContextField {
            name: name.to_owned(),
            ty,
            origin,
        });
        Ok(())
    };

    for (name, ty) in spec.symbols {
        push(&mut fields, &mut seen, name, *ty, FieldOrigin::Symbol)?;
    }
    for reserved in [RESERVED_PROPERTIES, RESERVED_FIELDS, RESERVED_VARIABLES] {
        push(
            &mut fields,
            &mut seen,
            reserved,
            ValueType::Str,
            FieldOrigin::Reserved,
        )?;
    }
    for prop in spec.instance.visible_properties() {
        push(
            &mut fields,
            &mut seen,
            &prop.name,
            prop.ty,
            FieldOrigin::Property,
        )?;
    }
    for field in spec.instance.visible_fields() {
        push(
            &mut fields,
            &mut seen,
            &field.name,
            field.ty,
            FieldOrigin::Field,
        )?;
    }
    for (name, ty) in spec.variables {
        push(&mut fields, &mut seen, name, *ty, FieldOrigin::Variable)?;
    }

    let source = render_source(spec, &fields);
    Ok((fields, source))
}

/// Render the shape as source text. The rendering is fully deterministic:
/// identical registry state always produces byte-identical text, which is
/// what makes the content hash a safe artifact-cache key across process
/// restarts.
fn render_source(spec: &ShapeSpec<'_>, fields: &[ContextField]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// generated context for result={} instance={}",
        spec.result.keyword(),
        spec.instance.name()
    );
    let _ = writeln!(out, "class {CONTEXT_CLASS} {{");
    for field in fields {
        match field.origin {
            FieldOrigin::Reserved => {
                let _ = writeln!(out, "    string[] {};", field.name);
            }
            _ => {
                let _ = writeln!(out, "    {} {};", field.ty.keyword(), field.name);
            }
        }
    }
    let _ = writeln!(out, "    fn {ENTRY_ACTION}(instance);");
    let _ = writeln!(out, "    fn {ENTRY_FUNCTION}(instance);");
    out.push_str("}\n");
    out
}

/// Assemble a [`ContextShape`] from its parts once the unit has compiled.
pub(crate) fn assemble_shape(
    spec: &ShapeSpec<'_>,
    fields: Vec<ContextField>,
    source: String,
    hash: ContentHash,
    unit: Arc<CompiledUnit>,
) -> ContextShape {
    let index = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.clone(), i))
        .collect();
    let pick = |origin: FieldOrigin| {
        fields
            .iter()
            .filter(|f| f.origin == origin)
            .map(|f| f.name.clone())
            .collect::<Vec<_>>()
    };
    ContextShape {
        property_names: pick(FieldOrigin::Property),
        field_names: pick(FieldOrigin::Field),
        variable_names: pick(FieldOrigin::Variable),
        index,
        fields,
        module: hash.module_name(),
        source,
        hash,
        instance_type: spec.instance.name().to_owned(),
        result: spec.result,
        unit,
    }
}

/// A live instance of a generated context.
///
/// Not reusable across instance-parameter values: the registry produces a
/// fresh one per execution even though the shape is cached.
pub struct Context {
    shape: Arc<ContextShape>,
    slots: Vec<Value>,
}

impl Context {
    /// Instantiate a context with default-valued slots.
    pub(crate) fn new(shape: Arc<ContextShape>) -> Self {
        let slots = shape
            .fields
            .iter()
            .map(|f| Value::default_for(f.ty))
            .collect();
        Self { shape, slots }
    }

    pub fn shape(&self) -> &Arc<ContextShape> {
        &self.shape
    }

    /// Read a field slot by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.shape.index.get(name).map(|&i| &self.slots[i])
    }

    /// Write a field slot by name, checking the declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let Some(&i) = self.shape.index.get(name) else {
            return Err(RuntimeError::UnknownMember {
                receiver: ValueType::Object,
                member: name.to_owned(),
            });
        };
        let declared = self.shape.fields[i].ty;
        self.slots[i] = value.coerce_to(declared)?;
        Ok(())
    }

    /// Refresh mirrored slots from the live instance and variable source.
    ///
    /// Mirrored properties and fields require an instance; a missing
    /// instance or member surfaces as an [`InvokeError`], untranslated.
    /// Declared variables take their live value, or the source's default
    /// value when absent.
    pub fn refresh(
        &mut self,
        instance: Option<&dyn HostObject>,
        variables: Option<&dyn VariableSource>,
    ) -> Result<(), InvokeError> {
        let mirrored: Vec<String> = self
            .shape
            .property_names
            .iter()
            .chain(self.shape.field_names.iter())
            .cloned()
            .collect();
        if !mirrored.is_empty() {
            let Some(instance) = instance else {
                return Err(InvokeError::MissingInstance {
                    instance_type: self.shape.instance_type.clone(),
                });
            };
            for name in &mirrored {
                let value =
                    instance
                        .get_member(name)
                        .ok_or_else(|| InvokeError::MissingMember {
                            instance_type: instance.type_name().to_owned(),
                            member: name.clone(),
                        })?;
                let i = self.shape.index[name.as_str()];
                let declared = self.shape.fields[i].ty;
                // A host member of the wrong type is an invocation-shape
                // problem, reported against the member name.
                self.slots[i] =
                    value
                        .coerce_to(declared)
                        .map_err(|_| InvokeError::MissingMember {
                            instance_type: instance.type_name().to_owned(),
                            member: name.clone(),
                        })?;
            }
        }

        if let Some(variables) = variables {
            let names = self.shape.variable_names.clone();
            for name in names {
                let value = variables
                    .value(&name)
                    .unwrap_or_else(|| variables.default_value());
                let i = self.shape.index[name.as_str()];
                self.slots[i] = value;
            }
        }
        Ok(())
    }

    /// Refresh, then run a side-effecting body.
    pub fn run_action<E>(
        &mut self,
        instance: Option<&dyn HostObject>,
        variables: Option<&dyn VariableSource>,
        body: impl FnOnce(&Context) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<InvokeError>,
    {
        self.refresh(instance, variables)?;
        body(self)
    }

    /// Refresh, then run a value-producing body.
    pub fn run_function<E>(
        &mut self,
        instance: Option<&dyn HostObject>,
        variables: Option<&dyn VariableSource>,
        body: impl FnOnce(&Context) -> Result<Value, E>,
    ) -> Result<Value, E>
    where
        E: From<InvokeError>,
    {
        self.refresh(instance, variables)?;
        body(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompileOptions, CompileRefs, Compiler};
    use crate::type_info::VariableContext;

    fn spec_shape(
        symbols: &[(String, ValueType)],
        instance: &TypeInfo,
        variables: &[(String, ValueType)],
    ) -> Result<Arc<ContextShape>, ConfigError> {
        let spec = ShapeSpec {
            symbols,
            instance,
            variables,
            result: ValueType::Float,
        };
        let (fields, source) = build_shape_source(&spec)?;
        let hash = ContentHash::of(&source);
        let unit = Compiler::compile(&source, &CompileRefs::default(), CompileOptions::default(), "ctx")
            .expect("generated source must compile");
        Ok(Arc::new(assemble_shape(
            &spec,
            fields,
            source,
            hash,
            Arc::new(unit),
        )))
    }

    fn sym(name: &str, ty: ValueType) -> (String, ValueType) {
        (name.to_owned(), ty)
    }

    #[test]
    fn rendered_source_is_deterministic() {
        let instance = TypeInfo::builder("Probe")
            .property("depth", ValueType::Float)
            .build();
        let symbols = vec![sym("gain", ValueType::Float)];
        let a = spec_shape(&symbols, &instance, &[]).unwrap();
        let b = spec_shape(&symbols, &instance, &[]).unwrap();
        assert_eq!(a.source(), b.source());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn generated_source_parses_as_a_class() {
        let instance = TypeInfo::builder("Probe")
            .property("depth", ValueType::Float)
            .field("serial", ValueType::Str)
            .build();
        let symbols = vec![sym("gain", ValueType::Float)];
        let vars = vec![sym("x", ValueType::Float)];
        let shape = spec_shape(&symbols, &instance, &vars).unwrap();

        let class = shape.unit().class(CONTEXT_CLASS).expect("Globals class");
        assert!(class.field("gain").is_some());
        assert!(class.field(RESERVED_PROPERTIES).is_some());
        assert!(class.field("depth").is_some());
        assert!(class.field("serial").is_some());
        assert!(class.field("x").is_some());
        assert_eq!(class.methods.len(), 2);
    }

    #[test]
    fn duplicate_symbol_and_property_is_ambiguous() {
        let instance = TypeInfo::builder("Probe")
            .property("gain", ValueType::Float)
            .build();
        let symbols = vec![sym("gain", ValueType::Float)];
        let err = spec_shape(&symbols, &instance, &[]).unwrap_err();
        match err {
            ConfigError::AmbiguousFieldName {
                name,
                first,
                second,
                ..
            } => {
                assert_eq!(name, "gain");
                assert_eq!(first, FieldOrigin::Symbol);
                assert_eq!(second, FieldOrigin::Property);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn reserved_name_collision_is_ambiguous() {
        let instance = TypeInfo::unit();
        let symbols = vec![sym(RESERVED_VARIABLES, ValueType::Str)];
        let err = spec_shape(&symbols, &instance, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousFieldName { .. }));
    }

    #[test]
    fn hidden_members_never_reach_the_shape() {
        let instance = TypeInfo::builder("Probe")
            .property("depth", ValueType::Float)
            .hidden_property("secret", ValueType::Str)
            .build();
        let shape = spec_shape(&[], &instance, &[]).unwrap();
        assert!(shape.field_named("depth").is_some());
        assert!(shape.field_named("secret").is_none());
    }

    #[test]
    fn refresh_requires_instance_for_mirrored_members() {
        let instance = TypeInfo::builder("Probe")
            .property("depth", ValueType::Float)
            .build();
        let shape = spec_shape(&[], &instance, &[]).unwrap();
        let mut ctx = Context::new(shape);
        let err = ctx.refresh(None, None).unwrap_err();
        assert!(matches!(err, InvokeError::MissingInstance { .. }));
    }

    #[test]
    fn refresh_substitutes_variable_default() {
        let instance = TypeInfo::unit();
        let vars_decl = vec![sym("x", ValueType::Float), sym("y", ValueType::Float)];
        let shape = spec_shape(&[], &instance, &vars_decl).unwrap();

        let vars = VariableContext::new(Value::Float(f64::NAN));
        vars.set("x", Value::Float(10.0));
        vars.declare("y");

        let mut ctx = Context::new(shape);
        ctx.refresh(None, Some(&vars)).unwrap();
        assert_eq!(ctx.get("x"), Some(&Value::Float(10.0)));
        match ctx.get("y") {
            Some(Value::Float(y)) => assert!(y.is_nan()),
            other => panic!("expected float slot, got {other:?}"),
        }
    }
}
