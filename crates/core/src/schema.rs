//! Structural type descriptors
//!
//! A reference type is a named set of (label -> kind) pairs with an assigned
//! type-label id. Compatibility everywhere in the store is *structural
//! equivalence*: two descriptors are interchangeable iff they declare the
//! same label set mapped to the same per-label kinds, independent of how or
//! when they were created. Equality is exact; there is no width or subtype
//! tolerance.

use crate::types::TypeLabelId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared kind of a single record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Boolean
    Bool,
    /// Signed 32-bit integer
    Int,
    /// Signed 64-bit integer
    Long,
    /// 64-bit floating point
    Double,
    /// UTF-8 string
    Str,
    /// Ordered list of scalars
    ScalarList,
    /// Ordered list of references
    RefList,
    /// Reference to another record, optionally constrained to a declared type
    Reference {
        /// Type the referenced record must declare, if constrained
        expects: Option<TypeLabelId>,
    },
}

impl FieldKind {
    /// Derive the kind of a runtime value
    pub fn of_value(value: &Value) -> FieldKind {
        match value {
            Value::Bool(_) => FieldKind::Bool,
            Value::Int(_) => FieldKind::Int,
            Value::Long(_) => FieldKind::Long,
            Value::Double(_) => FieldKind::Double,
            Value::Str(_) => FieldKind::Str,
            Value::Scalars(_) => FieldKind::ScalarList,
            Value::References(_) => FieldKind::RefList,
            Value::Reference(_) => FieldKind::Reference { expects: None },
        }
    }

    /// Check whether a runtime value kind satisfies this declared kind
    ///
    /// Identical to equality except that any reference value satisfies a
    /// `Reference` declaration regardless of its `expects` constraint; the
    /// constraint is enforced separately by reference validation, against
    /// the referenced record's declared type.
    pub fn admits(&self, value_kind: &FieldKind) -> bool {
        match (self, value_kind) {
            (FieldKind::Reference { .. }, FieldKind::Reference { .. }) => true,
            (declared, actual) => declared == actual,
        }
    }
}

/// The shape of a record or type: label -> kind, in label order
pub type FieldShape = BTreeMap<String, FieldKind>;

/// A named structural type with an assigned type-label id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    id: TypeLabelId,
    name: String,
    fields: FieldShape,
}

impl TypeDescriptor {
    /// Create a descriptor with an already-assigned id
    pub fn new(id: TypeLabelId, name: impl Into<String>, fields: FieldShape) -> Self {
        TypeDescriptor {
            id,
            name: name.into(),
            fields,
        }
    }

    /// Assigned type-label id
    pub fn id(&self) -> TypeLabelId {
        self.id
    }

    /// Type name (informational only; never part of compatibility)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields
    pub fn fields(&self) -> &FieldShape {
        &self.fields
    }

    /// Declared kind of one field, if present
    pub fn field(&self, label: &str) -> Option<&FieldKind> {
        self.fields.get(label)
    }

    /// Structural equivalence: same label set, same per-label kinds, exactly
    pub fn is_equivalent(&self, other: &TypeDescriptor) -> bool {
        self.fields == other.fields
    }

    /// Check whether a record shape satisfies this type's declared fields
    ///
    /// The label sets must be equal and each value kind must satisfy the
    /// declared kind (see [`FieldKind::admits`]). This is the write-time
    /// shape test; it is exact in both directions, so a record with extra
    /// or missing fields never satisfies the type.
    pub fn admits_shape(&self, shape: &FieldShape) -> bool {
        if self.fields.len() != shape.len() {
            return false;
        }
        self.fields.iter().all(|(label, declared)| {
            shape
                .get(label)
                .map(|actual| declared.admits(actual))
                .unwrap_or(false)
        })
    }
}
