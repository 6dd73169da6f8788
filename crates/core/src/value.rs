//! Value types for shelf records
//!
//! A record field holds a `Value`: a closed tagged union over the five base
//! scalar kinds, a list of scalars, a list of references, or a single
//! reference. There is no implicit coercion between kinds; `Int(1)` and
//! `Long(1)` are different values. Float equality follows IEEE-754
//! (`NaN != NaN`, `-0.0 == 0.0`).

use crate::types::StoreReference;
use serde::{Deserialize, Serialize};

/// A base scalar value: one of the five primitive kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// 64-bit floating point (IEEE-754)
    Double(f64),
    /// UTF-8 string
    Str(String),
}

impl Scalar {
    /// Kind name as a string
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Long(_) => "long",
            Scalar::Double(_) => "double",
            Scalar::Str(_) => "string",
        }
    }
}

/// Canonical value type for record fields
///
/// Different kinds are never equal, even when they hold the same number:
/// `Value::Int(1) != Value::Long(1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// 64-bit floating point (IEEE-754)
    Double(f64),
    /// UTF-8 string
    Str(String),
    /// Ordered list of scalars
    Scalars(Vec<Scalar>),
    /// Ordered list of references
    References(Vec<StoreReference>),
    /// Reference to another record, resolved lazily
    Reference(StoreReference),
}

impl Value {
    /// Kind name as a string (used in type-mismatch errors)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Scalars(_) => "scalar list",
            Value::References(_) => "reference list",
            Value::Reference(_) => "reference",
        }
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i32 if this is an Int value
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as i64 if this is a Long value
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Get as f64 if this is a Double value
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as &str if this is a Str value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a scalar slice if this is a Scalars value
    pub fn as_scalars(&self) -> Option<&[Scalar]> {
        match self {
            Value::Scalars(list) => Some(list),
            _ => None,
        }
    }

    /// Get as a reference slice if this is a References value
    pub fn as_references(&self) -> Option<&[StoreReference]> {
        match self {
            Value::References(list) => Some(list),
            _ => None,
        }
    }

    /// Get the target if this is a Reference value
    pub fn as_reference(&self) -> Option<&StoreReference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Scalar>> for Value {
    fn from(list: Vec<Scalar>) -> Self {
        Value::Scalars(list)
    }
}

impl From<Vec<StoreReference>> for Value {
    fn from(list: Vec<StoreReference>) -> Self {
        Value::References(list)
    }
}

impl From<StoreReference> for Value {
    fn from(r: StoreReference) -> Self {
        Value::Reference(r)
    }
}
