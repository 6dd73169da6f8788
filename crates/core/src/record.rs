//! Schema-flexible records
//!
//! A record is an ordered mapping from non-empty string labels to typed
//! values, with an identity assigned at first persistence. Records are
//! value-like: they may be held by multiple callers at once, and the store
//! only checks their shape against declared types at write time.

use crate::error::{Error, Result};
use crate::schema::{FieldKind, FieldShape, TypeDescriptor};
use crate::types::{RecordId, StoreReference, TypeLabelId};
use crate::value::{Scalar, Value};
use std::collections::BTreeMap;

/// A labeled, schema-flexible tuple: the store's unit of persistence
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    id: Option<RecordId>,
    type_label: Option<TypeLabelId>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty, non-persistent record
    pub fn new() -> Self {
        Record::default()
    }

    /// Identity, absent until the record is first persisted
    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    /// Assign the identity at first persistence
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the record already has an identity;
    /// a record becomes persistent exactly once.
    pub fn assign_id(&mut self, id: RecordId) -> Result<()> {
        if let Some(existing) = self.id {
            return Err(Error::bucket(format!(
                "record {existing} is already persistent"
            )));
        }
        self.id = Some(id);
        Ok(())
    }

    /// Declared type label, if the record claims one
    pub fn type_label(&self) -> Option<TypeLabelId> {
        self.type_label
    }

    /// Set the declared type label without shape validation
    ///
    /// Used when reconstructing a record from its wire form; the claim is
    /// re-validated on every write. Callers building records in memory
    /// should prefer [`Record::add_type_label`].
    pub fn set_type_label(&mut self, label: TypeLabelId) {
        self.type_label = Some(label);
    }

    /// Declare that this record satisfies `descriptor`
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the record's current field shape is not
    /// structurally equivalent to the type's declared fields.
    pub fn add_type_label(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        if !descriptor.admits_shape(&self.shape()) {
            return Err(Error::bucket(format!(
                "record fields {:?} are not structurally equivalent to type '{}'",
                self.fields.keys().collect::<Vec<_>>(),
                descriptor.name()
            )));
        }
        self.type_label = Some(descriptor.id());
        Ok(())
    }

    /// Set a field value
    ///
    /// # Errors
    /// Fails with `Error::IllegalKey` if the label is empty.
    pub fn put(&mut self, label: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let label = label.into();
        if label.is_empty() {
            return Err(Error::IllegalKey(
                "field label must be non-empty".to_string(),
            ));
        }
        self.fields.insert(label, value.into());
        Ok(())
    }

    /// Get a field value
    ///
    /// # Errors
    /// Fails with `Error::KeyNotFound` if the label is absent.
    pub fn get(&self, label: &str) -> Result<&Value> {
        self.fields
            .get(label)
            .ok_or_else(|| Error::KeyNotFound(label.to_string()))
    }

    fn get_kind<'a, T>(
        &'a self,
        label: &str,
        expected: &'static str,
        extract: impl Fn(&'a Value) -> Option<T>,
    ) -> Result<T> {
        let value = self.get(label)?;
        extract(value).ok_or_else(|| Error::TypeMismatch {
            label: label.to_string(),
            expected,
            found: value.kind_name(),
        })
    }

    /// Get a bool field (`KeyNotFound` / `TypeMismatch` on failure)
    pub fn get_bool(&self, label: &str) -> Result<bool> {
        self.get_kind(label, "bool", Value::as_bool)
    }

    /// Get an i32 field
    pub fn get_int(&self, label: &str) -> Result<i32> {
        self.get_kind(label, "int", Value::as_int)
    }

    /// Get an i64 field
    pub fn get_long(&self, label: &str) -> Result<i64> {
        self.get_kind(label, "long", Value::as_long)
    }

    /// Get an f64 field
    pub fn get_double(&self, label: &str) -> Result<f64> {
        self.get_kind(label, "double", Value::as_double)
    }

    /// Get a string field
    pub fn get_str(&self, label: &str) -> Result<&str> {
        self.get_kind(label, "string", Value::as_str)
    }

    /// Get a scalar-list field
    pub fn get_scalars(&self, label: &str) -> Result<&[Scalar]> {
        self.get_kind(label, "scalar list", Value::as_scalars)
    }

    /// Get a reference-list field
    pub fn get_references(&self, label: &str) -> Result<&[StoreReference]> {
        self.get_kind(label, "reference list", Value::as_references)
    }

    /// Get a reference field
    pub fn get_reference(&self, label: &str) -> Result<&StoreReference> {
        self.get_kind(label, "reference", Value::as_reference)
    }

    /// Whether a label is present
    pub fn contains_key(&self, label: &str) -> bool {
        self.fields.contains_key(label)
    }

    /// Labels in order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// (label, value) pairs in label order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Derive the record's field shape (label -> runtime kind)
    pub fn shape(&self) -> FieldShape {
        self.fields
            .iter()
            .map(|(label, value)| (label.clone(), FieldKind::of_value(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let mut r = Record::new();
        r.put("age", 42i32).unwrap();
        r.put("name", "ada").unwrap();
        assert_eq!(r.get_int("age").unwrap(), 42);
        assert_eq!(r.get_str("name").unwrap(), "ada");
        assert_eq!(r.len(), 2);
        assert!(r.contains_key("age"));
        assert!(!r.contains_key("missing"));
    }

    #[test]
    fn test_put_empty_label_fails() {
        let mut r = Record::new();
        let err = r.put("", 1i32).unwrap_err();
        assert!(matches!(err, Error::IllegalKey(_)));
    }

    #[test]
    fn test_get_absent_label_fails() {
        let r = Record::new();
        let err = r.get("nope").unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[test]
    fn test_get_wrong_kind_fails() {
        let mut r = Record::new();
        r.put("age", 42i32).unwrap();
        let err = r.get_str("age").unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: "string",
                found: "int",
                ..
            }
        ));
    }

    #[test]
    fn test_put_overwrites() {
        let mut r = Record::new();
        r.put("x", 1i32).unwrap();
        r.put("x", 2i32).unwrap();
        assert_eq!(r.get_int("x").unwrap(), 2);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_empty_string_distinguished_from_absent() {
        let mut r = Record::new();
        r.put("note", "").unwrap();
        assert_eq!(r.get_str("note").unwrap(), "");
        assert!(r.get_str("other").is_err());
    }

    #[test]
    fn test_assign_id_once() {
        let mut r = Record::new();
        assert!(r.id().is_none());
        let id = RecordId::from_i64(10).unwrap();
        r.assign_id(id).unwrap();
        assert_eq!(r.id(), Some(id));
        let err = r.assign_id(RecordId::from_i64(11).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Bucket(_)));
    }

    #[test]
    fn test_add_type_label_requires_equivalent_shape() {
        let mut fields = FieldShape::new();
        fields.insert("name".to_string(), FieldKind::Str);
        fields.insert("age".to_string(), FieldKind::Int);
        let person = TypeDescriptor::new(7, "Person", fields);

        let mut ok = Record::new();
        ok.put("name", "ada").unwrap();
        ok.put("age", 36i32).unwrap();
        ok.add_type_label(&person).unwrap();
        assert_eq!(ok.type_label(), Some(7));

        let mut bad = Record::new();
        bad.put("name", "ada").unwrap();
        bad.put("address", "home").unwrap();
        assert!(matches!(
            bad.add_type_label(&person).unwrap_err(),
            Error::Bucket(_)
        ));
        assert_eq!(bad.type_label(), None);
    }

    #[test]
    fn test_shape_derivation() {
        let mut r = Record::new();
        r.put("flag", true).unwrap();
        r.put("n", 5i64).unwrap();
        let shape = r.shape();
        assert_eq!(shape.get("flag"), Some(&FieldKind::Bool));
        assert_eq!(shape.get("n"), Some(&FieldKind::Long));
    }

    #[test]
    fn test_labels_ordered() {
        let mut r = Record::new();
        r.put("b", 1i32).unwrap();
        r.put("a", 2i32).unwrap();
        let labels: Vec<_> = r.labels().collect();
        assert_eq!(labels, vec!["a", "b"]);
    }
}
