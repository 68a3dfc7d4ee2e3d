//! Named symbol storage.
//!
//! A [`SymbolTable`] holds the (name, declared type, value) triples a
//! registry exposes to expressions. The table distinguishes value-only
//! updates from structural changes so the owning registry knows when its
//! cached context shapes are stale: re-registering a name with the same
//! declared type touches nothing structural, while a new name or a changed
//! type does.

use rustc_hash::FxHashMap;

use crate::error::ConfigError;
use crate::value::{Value, ValueType};

/// A named, typed, valued entity exposed to expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub declared_type: ValueType,
    pub value: Value,
}

impl Symbol {
    pub fn new(name: impl Into<String>, declared_type: ValueType, value: Value) -> Self {
        Self {
            name: name.into(),
            declared_type,
            value,
        }
    }
}

/// Outcome of a registration, reported to the owning registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Same name and declared type existed; only the value changed.
    /// Cached context shapes stay valid.
    ValueUpdated,
    /// A name was inserted or its declared type changed.
    /// Cached context shapes must be invalidated.
    StructuralChange,
}

/// Mapping of symbol name to [`Symbol`]. No iteration-order guarantee;
/// consumers sort where determinism matters.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: FxHashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol.
    ///
    /// Rejects the meta-type `TypeRef` (types go through type registration,
    /// not symbol registration, to keep generated field declarations
    /// unambiguous). If an entry with the same name and declared type
    /// exists, only its value is replaced.
    pub fn register(&mut self, symbol: Symbol) -> Result<RegisterOutcome, ConfigError> {
        if symbol.declared_type == ValueType::TypeRef {
            return Err(ConfigError::TypeAsSymbol { name: symbol.name });
        }
        match self.entries.get_mut(&symbol.name) {
            Some(existing) if existing.declared_type == symbol.declared_type => {
                existing.value = symbol.value;
                Ok(RegisterOutcome::ValueUpdated)
            }
            _ => {
                self.entries.insert(symbol.name.clone(), symbol);
                Ok(RegisterOutcome::StructuralChange)
            }
        }
    }

    /// Current value of a symbol.
    pub fn get(&self, name: &str) -> Result<Value, ConfigError> {
        self.entries
            .get(name)
            .map(|s| s.value.clone())
            .ok_or_else(|| ConfigError::SymbolNotFound {
                name: name.to_owned(),
            })
    }

    /// The symbol entry itself.
    pub fn entry(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All (name, declared type) pairs, unordered.
    pub fn declarations(&self) -> impl Iterator<Item = (&str, ValueType)> {
        self.entries
            .values()
            .map(|s| (s.name.as_str(), s.declared_type))
    }

    /// All symbol entries, unordered.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.values()
    }

    /// Declarations sorted by name, for deterministic context rendering.
    pub fn sorted_declarations(&self) -> Vec<(String, ValueType)> {
        let mut decls: Vec<_> = self
            .entries
            .values()
            .map(|s| (s.name.clone(), s.declared_type))
            .collect();
        decls.sort_by(|a, b| a.0.cmp(&b.0));
        decls
    }
}
