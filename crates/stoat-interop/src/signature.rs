//! Immutable parameter-type tuples.
//!
//! A `Signature` is both a cache key (structural equality/hash) and the
//! unit overload resolution scores against live arguments.

use std::sync::Arc;

use crate::host::{HostClassRegistry, HostType};

/// An immutable, type-erased parameter-type tuple.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Signature(Arc<[HostType]>);

impl Signature {
    /// Create a signature from parameter types.
    pub fn new(params: impl Into<Arc<[HostType]>>) -> Self {
        Self(params.into())
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// The parameter types.
    pub fn params(&self) -> &[HostType] {
        &self.0
    }

    /// Render as `(t1, t2, ...)` for diagnostics.
    pub fn describe(&self, registry: &HostClassRegistry) -> String {
        let mut text = String::from("(");
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            text.push_str(&ty.describe(registry));
        }
        text.push(')');
        text
    }
}

impl From<&[HostType]> for Signature {
    fn from(params: &[HostType]) -> Self {
        Self(params.into())
    }
}

impl From<Vec<HostType>> for Signature {
    fn from(params: Vec<HostType>) -> Self {
        Self(params.into())
    }
}

/// Outcome of scoring one candidate signature against live arguments.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignatureMatch {
    /// At least one parameter can never accept its argument.
    No,
    /// Every parameter accepts its argument.
    Yes {
        /// Number of exact runtime-type matches.
        exact: u32,
        /// Sum of conversion weights over all parameters (lower is
        /// better; exact parameters contribute zero).
        total_weight: u32,
    },
}
