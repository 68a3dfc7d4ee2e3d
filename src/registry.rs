//! The type and symbol registry.
//!
//! [`TypeRegistry`] owns the registered host types, the static-access
//! subset, and the symbol table, and caches generated context shapes per
//! (result type, instance type) key. It is safe to share process-wide:
//! registries are commonly long-lived singletons consulted by many
//! expression compilations at once.
//!
//! Cache discipline: the shape cache is cleared whenever the symbol table's
//! name→type associations change (new name, or changed type of an existing
//! name). Value-only symbol updates leave cached shapes untouched; shapes
//! depend on declarations, not values. Shape generation runs outside the
//! lock; when two threads race to generate the same key, the first insert
//! wins and both adopt the canonical entry.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::artifact::ArtifactCache;
use crate::backend::{CompileOptions, CompileRefs, Compiler, UnitKind};
use crate::context::{
    Context, ContextShape, ShapeSpec, assemble_shape, build_shape_source, CONTEXT_CLASS,
};
use crate::error::{ConfigError, ExprResult};
use crate::hash::{ContentHash, TypeHash};
use crate::symbols::{RegisterOutcome, Symbol, SymbolTable};
use crate::type_info::{TypeInfo, VariableSource};
use crate::value::{Value, ValueType};

/// Baseline modules every compilation references, regardless of registered
/// types: the core value model and the host bridge.
const BASELINE_MODULES: [&str; 2] = ["core", "host"];

#[derive(Clone)]
struct RegistryState {
    types: FxHashMap<TypeHash, Arc<TypeInfo>>,
    static_types: FxHashSet<TypeHash>,
    symbols: SymbolTable,
    shapes: FxHashMap<(ValueType, TypeHash), Arc<ContextShape>>,
    default_variable_type: ValueType,
}

/// Registry of host types, static-access types, and named symbols, with a
/// cache of generated context shapes.
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
    artifacts: Arc<ArtifactCache>,
}

impl TypeRegistry {
    /// Registry with a private in-memory artifact cache.
    pub fn new() -> Self {
        Self::with_artifact_cache(Arc::new(ArtifactCache::in_memory()))
    }

    /// Registry sharing the given (usually process-wide) artifact cache.
    pub fn with_artifact_cache(artifacts: Arc<ArtifactCache>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                types: FxHashMap::default(),
                static_types: FxHashSet::default(),
                symbols: SymbolTable::new(),
                shapes: FxHashMap::default(),
                default_variable_type: ValueType::Float,
            }),
            artifacts,
        }
    }

    /// The artifact cache this registry compiles into.
    pub fn artifact_cache(&self) -> &Arc<ArtifactCache> {
        &self.artifacts
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a host type. Idempotent; returns whether it was newly
    /// added.
    pub fn register_type(&self, ty: Arc<TypeInfo>) -> bool {
        let hash = ty.type_hash();
        self.state.write().types.insert(hash, ty).is_none()
    }

    /// Register a type for unqualified static member access. Auto-registers
    /// the type; returns whether the static flag was newly added.
    pub fn register_static_type(&self, ty: Arc<TypeInfo>) -> bool {
        let hash = ty.type_hash();
        let mut state = self.state.write();
        state.types.entry(hash).or_insert(ty);
        state.static_types.insert(hash)
    }

    /// Register a symbol. Clears the shape cache only when the name→type
    /// association changed.
    pub fn register_symbol(
        &self,
        name: impl Into<String>,
        ty: ValueType,
        value: Value,
    ) -> Result<(), ConfigError> {
        self.register_symbol_entry(Symbol::new(name, ty, value))
    }

    /// Register a prebuilt symbol entry.
    pub fn register_symbol_entry(&self, symbol: Symbol) -> Result<(), ConfigError> {
        let mut state = self.state.write();
        let name = symbol.name.clone();
        match state.symbols.register(symbol)? {
            RegisterOutcome::ValueUpdated => {}
            RegisterOutcome::StructuralChange => {
                if !state.shapes.is_empty() {
                    debug!(symbol = %name, "symbol structure changed; invalidating context shapes");
                }
                state.shapes.clear();
            }
        }
        Ok(())
    }

    /// Indexer-style symbol value read.
    pub fn symbol_value(&self, name: &str) -> Result<Value, ConfigError> {
        self.state.read().symbols.get(name)
    }

    /// Indexer-style symbol value write.
    ///
    /// A value of the declared type updates in place; a value of a
    /// different type re-declares the symbol and invalidates cached shapes.
    pub fn set_symbol_value(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        self.register_symbol(name, value.value_type(), value)
    }

    // ==========================================================================
    // Introspection
    // ==========================================================================

    pub fn is_type_registered(&self, name: &str) -> bool {
        self.state
            .read()
            .types
            .contains_key(&TypeHash::from_name(name))
    }

    pub fn is_static_type(&self, name: &str) -> bool {
        self.state
            .read()
            .static_types
            .contains(&TypeHash::from_name(name))
    }

    /// All registered types.
    pub fn registered_types(&self) -> Vec<Arc<TypeInfo>> {
        self.state.read().types.values().cloned().collect()
    }

    /// The static-access subset.
    pub fn registered_static_types(&self) -> Vec<Arc<TypeInfo>> {
        let state = self.state.read();
        state
            .static_types
            .iter()
            .filter_map(|hash| state.types.get(hash).cloned())
            .collect()
    }

    /// All registered symbols.
    pub fn registered_symbols(&self) -> Vec<Symbol> {
        self.state.read().symbols.symbols().cloned().collect()
    }

    /// Type substituted for declared variables with no live value at
    /// generation time.
    pub fn default_variable_type(&self) -> ValueType {
        self.state.read().default_variable_type
    }

    pub fn set_default_variable_type(&self, ty: ValueType) {
        self.state.write().default_variable_type = ty;
    }

    /// The distinct module references needed to compile any expression
    /// against the current registry state.
    ///
    /// Derived on every call: registry state may have changed, and the
    /// computation is cheap relative to a compile.
    pub fn imports(&self) -> Vec<String> {
        let state = self.state.read();
        let mut modules: FxHashSet<String> = BASELINE_MODULES
            .iter()
            .map(|m| (*m).to_owned())
            .collect();
        for ty in state.types.values() {
            modules.insert(ty.module().to_owned());
        }
        let mut modules: Vec<String> = modules.into_iter().collect();
        modules.sort();
        modules
    }

    /// References handed to the backend for an expression compile against
    /// the given shape.
    pub fn compile_refs(&self, shape: Option<&ContextShape>) -> CompileRefs {
        let state = self.state.read();
        let types: Vec<Arc<TypeInfo>> = state.types.values().cloned().collect();
        let static_types: Vec<Arc<TypeInfo>> = state
            .static_types
            .iter()
            .filter_map(|hash| state.types.get(hash).cloned())
            .collect();
        CompileRefs {
            context_fields: shape.map(ContextShape::field_types).unwrap_or_default(),
            types,
            static_types,
        }
    }

    // ==========================================================================
    // Context generation
    // ==========================================================================

    /// Get (or generate) the context shape for a (result, instance) pair.
    ///
    /// Repeated calls with unchanged symbol/type state return the identical
    /// cached shape. The optional variable source contributes one field per
    /// declared variable.
    pub fn context_shape(
        &self,
        result: ValueType,
        instance: &Arc<TypeInfo>,
        variables: Option<&dyn VariableSource>,
    ) -> ExprResult<Arc<ContextShape>> {
        let key = (result, instance.type_hash());
        if let Some(shape) = self.state.read().shapes.get(&key) {
            return Ok(shape.clone());
        }

        // Snapshot the structural state, then generate outside the lock.
        let (symbols, default_ty) = {
            let state = self.state.read();
            (
                state.symbols.sorted_declarations(),
                state.default_variable_type,
            )
        };
        let variable_decls: Vec<(String, ValueType)> = variables
            .map(|source| {
                source
                    .names()
                    .into_iter()
                    .map(|(name, ty)| (name, ty.unwrap_or(default_ty)))
                    .collect()
            })
            .unwrap_or_default();

        let spec = ShapeSpec {
            symbols: &symbols,
            instance,
            variables: &variable_decls,
            result,
        };
        let (fields, source) = build_shape_source(&spec)?;
        let hash = ContentHash::of(&source);

        let unit = match self.artifacts.get(hash) {
            Some(unit) => unit,
            None => {
                debug!(%hash, instance = instance.name(), "generating context type");
                let refs = self.compile_refs(None);
                let options = CompileOptions {
                    optimize: true,
                    kind: UnitKind::Library,
                };
                let unit =
                    Compiler::compile(&source, &refs, options, &hash.module_name())?;
                self.artifacts.store(hash, Arc::new(unit))
            }
        };

        let shape = Arc::new(assemble_shape(&spec, fields, source, hash, unit));

        // Register the generated type back so later expressions can see it,
        // then publish the shape. First insert wins under races; generation
        // is deterministic for identical registry state, so discarding a
        // duplicate loses nothing.
        let generated = TypeInfo::builder(format!("{}::{CONTEXT_CLASS}", shape.module()))
            .module(shape.module())
            .build();
        let canonical = {
            let mut state = self.state.write();
            let hash = generated.type_hash();
            state.types.entry(hash).or_insert(generated);
            state.shapes.entry(key).or_insert(shape).clone()
        };
        Ok(canonical)
    }

    /// Instantiate a fresh context for the given pair, populating symbol
    /// slots from current symbol values.
    ///
    /// A new instance is produced on every call even though the shape is
    /// cached; contexts are not reusable across instance-parameter values.
    pub fn new_context(
        &self,
        result: ValueType,
        instance: &Arc<TypeInfo>,
        variables: Option<&dyn VariableSource>,
    ) -> ExprResult<Context> {
        let shape = self.context_shape(result, instance, variables)?;
        let mut context = Context::new(shape);
        for symbol in self.registered_symbols() {
            if context.shape().field_named(&symbol.name).is_some() {
                context.set(&symbol.name, symbol.value)?;
            }
        }
        Ok(context)
    }

    /// Clone this registry: deep copies of the registration sets, an empty
    /// shape cache, and the same shared artifact cache.
    pub fn clone_registry(&self) -> TypeRegistry {
        let state = self.state.read();
        TypeRegistry {
            state: RwLock::new(RegistryState {
                types: state.types.clone(),
                static_types: state.static_types.clone(),
                symbols: state.symbols.clone(),
                shapes: FxHashMap::default(),
                default_variable_type: state.default_variable_type,
            }),
            artifacts: self.artifacts.clone(),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
