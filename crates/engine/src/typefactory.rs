//! Reference-type registry
//!
//! Types are created from a JSON template or derived from a record instance,
//! assigned a fresh integer id, and held in a concurrent registry scoped to
//! the store's lifetime. Compatibility everywhere is structural equivalence
//! of the declared field maps; `check_consistent` is the single primitive
//! reused by bucket validation, type labeling, and reference validation.

use dashmap::DashMap;
use shelf_core::{
    Error, FieldKind, FieldShape, IdGenerator, Record, Result, TypeDescriptor, TypeLabelId,
};
use std::sync::Arc;

/// Registry of reference types for one store
pub struct TypeFactory {
    ids: Arc<dyn IdGenerator>,
    types: DashMap<TypeLabelId, TypeDescriptor>,
}

impl TypeFactory {
    pub(crate) fn new(ids: Arc<dyn IdGenerator>) -> Self {
        TypeFactory {
            ids,
            types: DashMap::new(),
        }
    }

    /// Create and register a type from a JSON template
    ///
    /// The template is an object mapping field names to kind strings:
    /// `"bool"`, `"int"`, `"long"`, `"double"`, `"string"`, `"list"`
    /// (scalars), `"reflist"`, `"ref"`, or `"ref:<type-name>"` to constrain
    /// a reference field to an already-registered type.
    ///
    /// # Errors
    /// Fails with `Error::Store` on malformed JSON, a non-object template,
    /// an unknown kind string, or a `ref:` naming an unregistered type.
    pub fn create_type_from_template(&self, template: &str, name: &str) -> Result<TypeDescriptor> {
        let parsed: serde_json::Value = serde_json::from_str(template)
            .map_err(|e| Error::store(format!("malformed type template for '{name}': {e}")))?;
        let object = parsed.as_object().ok_or_else(|| {
            Error::store(format!("type template for '{name}' must be a JSON object"))
        })?;

        let mut fields = FieldShape::new();
        for (label, kind) in object {
            let kind = kind.as_str().ok_or_else(|| {
                Error::store(format!(
                    "field '{label}' in type template '{name}' must map to a kind string"
                ))
            })?;
            fields.insert(label.clone(), self.parse_kind(label, name, kind)?);
        }
        Ok(self.register(name, fields))
    }

    /// Create and register a type from a record's current field shape
    ///
    /// Reference-valued fields come out unconstrained; constrained reference
    /// fields can only be declared through a template.
    pub fn create_type_from_record(&self, record: &Record, name: &str) -> TypeDescriptor {
        self.register(name, record.shape())
    }

    /// Look up a registered type by id
    pub fn get(&self, id: TypeLabelId) -> Option<TypeDescriptor> {
        self.types.get(&id).map(|t| t.clone())
    }

    /// Look up a registered type by name
    ///
    /// Names are informational and not required to be unique; the first
    /// match wins.
    pub fn find_by_name(&self, name: &str) -> Option<TypeDescriptor> {
        self.types
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.clone())
    }

    /// Structural equivalence of two registered types
    ///
    /// # Errors
    /// Fails with `Error::Store` if either id is unregistered.
    pub fn check_consistent(&self, a: TypeLabelId, b: TypeLabelId) -> Result<bool> {
        let a = self
            .get(a)
            .ok_or_else(|| Error::store(format!("unknown type id {a}")))?;
        let b = self
            .get(b)
            .ok_or_else(|| Error::store(format!("unknown type id {b}")))?;
        Ok(a.is_equivalent(&b))
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn register(&self, name: &str, fields: FieldShape) -> TypeDescriptor {
        let id = self.ids.next_id().get();
        let descriptor = TypeDescriptor::new(id, name, fields);
        self.types.insert(id, descriptor.clone());
        tracing::debug!(type_id = id, type_name = name, "type registered");
        descriptor
    }

    fn parse_kind(&self, label: &str, type_name: &str, kind: &str) -> Result<FieldKind> {
        Ok(match kind {
            "bool" => FieldKind::Bool,
            "int" => FieldKind::Int,
            "long" => FieldKind::Long,
            "double" => FieldKind::Double,
            "string" => FieldKind::Str,
            "list" => FieldKind::ScalarList,
            "reflist" => FieldKind::RefList,
            "ref" => FieldKind::Reference { expects: None },
            other => {
                if let Some(target) = other.strip_prefix("ref:") {
                    let expected = self.find_by_name(target).ok_or_else(|| {
                        Error::store(format!(
                            "field '{label}' in type template '{type_name}' \
                             references unknown type '{target}'"
                        ))
                    })?;
                    FieldKind::Reference {
                        expects: Some(expected.id()),
                    }
                } else {
                    return Err(Error::store(format!(
                        "unknown kind '{other}' for field '{label}' in type template '{type_name}'"
                    )));
                }
            }
        })
    }
}
