#![forbid(unsafe_code)]

//! The reactive value model.
//!
//! A [`Value`] is an explicit sum type over plain scalars, a single-value
//! reference cell, and the two reactive containers. Dynamic-language
//! implementations of this engine rewrite object fields into tracked
//! accessors in place; here the containers own a map from field name to
//! `(value, Dep)` and all reads/writes go through accessor methods, which
//! is the same contract made explicit.
//!
//! Containers and ref cells have *identity* semantics: cloning a `Value`
//! clones handles, and [`has_changed`] compares them by pointer identity,
//! scalars by content with NaN treated as equal to NaN.

use std::rc::Rc;

use crate::observer::{RArray, RObject, RefValue};

/// A reactive-model value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Reactive array container.
    Array(RArray),
    /// Reactive object container.
    Object(RObject),
    /// Single-value reference cell, unwrapped transparently by object
    /// accessors unless the container is shallow-observed.
    Ref(RefValue),
}

impl Value {
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(RArray::from_values(items))
    }

    #[must_use]
    pub fn object<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(RObject::from_pairs(pairs))
    }

    /// Whether this is a container (object or array).
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&RObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&RArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Array(a) => write!(f, "Array(len={})", a.len()),
            Self::Object(o) => write!(f, "Object(keys={})", o.len()),
            Self::Ref(_) => write!(f, "Ref(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s.as_str()))
    }
}

/// The change-detection rule shared by reactive setters and watcher
/// callbacks: strict inequality, NaN-aware, containers and refs by
/// identity.
#[must_use]
pub fn has_changed(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x != y,
        (Value::Int(x), Value::Int(y)) => x != y,
        (Value::Float(x), Value::Float(y)) => {
            if x.is_nan() && y.is_nan() {
                false
            } else {
                x != y
            }
        }
        (Value::Str(x), Value::Str(y)) => x != y,
        (Value::Array(x), Value::Array(y)) => !RArray::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => !RObject::ptr_eq(x, y),
        (Value::Ref(x), Value::Ref(y)) => !RefValue::ptr_eq(x, y),
        _ => true,
    }
}
