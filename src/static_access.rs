//! Try-style access to static members of a registered type.
//!
//! [`StaticAccessor`] wraps a type descriptor and exposes its static
//! members with `Option` returns: a missing member is an expected outcome
//! for callers probing several types in turn, not an error. Faults raised
//! by a member that does exist still surface as [`RuntimeError`].

use std::sync::Arc;

use crate::error::RuntimeError;
use crate::type_info::TypeInfo;
use crate::value::Value;

/// Accessor over one type's static properties and methods.
#[derive(Clone)]
pub struct StaticAccessor {
    ty: Arc<TypeInfo>,
}

impl StaticAccessor {
    pub fn new(ty: Arc<TypeInfo>) -> Self {
        Self { ty }
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// The wrapped descriptor.
    pub fn type_info(&self) -> &Arc<TypeInfo> {
        &self.ty
    }

    /// Read a static property. `None` means the type has no such property.
    pub fn try_get_member(&self, name: &str) -> Option<Value> {
        self.ty.static_property(name).map(|p| p.value.get())
    }

    /// Invoke a static method. `None` means the type has no such method;
    /// `Some(Err(..))` is a fault from the method itself.
    pub fn try_invoke_member(
        &self,
        name: &str,
        args: &[Value],
    ) -> Option<Result<Value, RuntimeError>> {
        self.ty.static_method(name).map(|m| (m.func)(args))
    }

    /// Names of all static members, sorted.
    pub fn member_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .ty
            .statics()
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.ty.static_methods().iter().map(|m| m.name.as_str()))
            .collect();
        names.sort_unstable();
        names
    }
}
