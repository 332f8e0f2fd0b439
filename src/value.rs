//! The value tree (spec.md §3 "Value", §4.1). A JSON-like dynamic value used
//! for component initialization parameters and query results.
//!
//! Grounded on `include/babeltrace/private-values.h`: a closed set of
//! scalar/array/map variants, array/map mutators that fail against frozen
//! containers, and a single shared null singleton.

use crate::error::Error;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// The shared null singleton (spec.md §4.1): "a globally shared singleton
/// represents `null` and is never destroyed." Every `Value::null()` call
/// returns a clone of this handle; cloning is cheap (an `Arc` bump) and
/// equality/identity both still work because `Null` carries no payload.
pub static NULL: Lazy<Value> = Lazy::new(|| wrap(Inner::Null));

#[derive(Debug)]
enum Inner {
    Null,
    Bool(bool),
    SignedInteger(i64),
    UnsignedInteger(u64),
    Real(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Inner {
    fn type_name(&self) -> &'static str {
        match self {
            Inner::Null => "null",
            Inner::Bool(_) => "bool",
            Inner::SignedInteger(_) => "signed-integer",
            Inner::UnsignedInteger(_) => "unsigned-integer",
            Inner::Real(_) => "real",
            Inner::String(_) => "string",
            Inner::Array(_) => "array",
            Inner::Map(_) => "map",
        }
    }
}

/// A refcounted, independently freezable dynamic value. Cloning is a
/// refcount bump, not a deep copy — use [`Value::copy`] for a deep, mutable
/// clone (spec.md §4.1 "Copy produces a deep, mutable clone").
#[derive(Clone, Debug)]
pub struct Value(Arc<RwLock<FrozenCell>>);

/// Wraps the variant payload with its own frozen bit, since freezing is
/// per-value and recursive (freezing a map freezes its entries too).
#[derive(Debug)]
struct FrozenCell {
    frozen: bool,
    inner: Inner,
}

fn wrap(inner: Inner) -> Value {
    Value(Arc::new(RwLock::new(FrozenCell {
        frozen: false,
        inner,
    })))
}

impl Value {
    pub fn null() -> Value {
        NULL.clone()
    }

    pub fn bool(v: bool) -> Value {
        wrap(Inner::Bool(v))
    }

    pub fn signed_integer(v: i64) -> Value {
        wrap(Inner::SignedInteger(v))
    }

    pub fn unsigned_integer(v: u64) -> Value {
        wrap(Inner::UnsignedInteger(v))
    }

    pub fn real(v: f64) -> Value {
        wrap(Inner::Real(v))
    }

    pub fn string(v: impl Into<String>) -> Value {
        wrap(Inner::String(v.into()))
    }

    pub fn array() -> Value {
        wrap(Inner::Array(Vec::new()))
    }

    pub fn map() -> Value {
        wrap(Inner::Map(BTreeMap::new()))
    }

    fn is_frozen(&self) -> bool {
        self.0.read().expect("value lock poisoned").frozen
    }

    /// Recursively freezes this value and all its descendants. Idempotent.
    pub fn freeze(&self) {
        let mut cell = self.0.write().expect("value lock poisoned");
        if cell.frozen {
            return;
        }
        cell.frozen = true;
        match &cell.inner {
            Inner::Array(items) => {
                let items = items.clone();
                drop(cell);
                for item in items {
                    item.freeze();
                }
            }
            Inner::Map(entries) => {
                let entries = entries.clone();
                drop(cell);
                for v in entries.values() {
                    v.freeze();
                }
            }
            _ => {}
        }
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.is_frozen() {
            Err(Error::FrozenWrite)
        } else {
            Ok(())
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.0.read().expect("lock poisoned").inner {
            Inner::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_signed_integer(&self) -> Option<i64> {
        match self.0.read().expect("lock poisoned").inner {
            Inner::SignedInteger(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_unsigned_integer(&self) -> Option<u64> {
        match self.0.read().expect("lock poisoned").inner {
            Inner::UnsignedInteger(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self.0.read().expect("lock poisoned").inner {
            Inner::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.0.read().expect("lock poisoned").inner, Inner::Null)
    }

    pub fn array_len(&self) -> Option<usize> {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::Array(a) => Some(a.len()),
            _ => None,
        }
    }

    pub fn array_get(&self, index: usize) -> Option<Value> {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::Array(a) => a.get(index).cloned(),
            _ => None,
        }
    }

    pub fn array_append(&self, element: Value) -> Result<(), Error> {
        self.check_mutable()?;
        let mut cell = self.0.write().expect("lock poisoned");
        match &mut cell.inner {
            Inner::Array(a) => {
                a.push(element);
                Ok(())
            }
            other => Err(Error::ValueTypeMismatch {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    pub fn array_set_at(&self, index: usize, element: Value) -> Result<(), Error> {
        self.check_mutable()?;
        let mut cell = self.0.write().expect("lock poisoned");
        match &mut cell.inner {
            Inner::Array(a) => {
                if index >= a.len() {
                    return Err(Error::other(format!("array index {index} out of bounds")));
                }
                a[index] = element;
                Ok(())
            }
            other => Err(Error::ValueTypeMismatch {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    pub fn map_len(&self) -> Option<usize> {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn map_has(&self, key: &str) -> bool {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::Map(m) => m.contains_key(key),
            _ => false,
        }
    }

    pub fn map_get(&self, key: &str) -> Option<Value> {
        match &self.0.read().expect("lock poisoned").inner {
            Inner::Map(m) => m.get(key).cloned(),
            _ => None,
        }
    }

    pub fn map_insert(&self, key: impl Into<String>, value: Value) -> Result<(), Error> {
        self.check_mutable()?;
        let mut cell = self.0.write().expect("lock poisoned");
        match &mut cell.inner {
            Inner::Map(m) => {
                m.insert(key.into(), value);
                Ok(())
            }
            other => Err(Error::ValueTypeMismatch {
                expected: "map",
                found: other.type_name(),
            }),
        }
    }

    /// Iterates map entries in key order, stopping early if `f` returns
    /// `false` (spec.md §4.1 "iteration callback may request stop").
    pub fn map_foreach(&self, mut f: impl FnMut(&str, &Value) -> bool) {
        let entries: Vec<(String, Value)> = match &self.0.read().expect("lock poisoned").inner {
            Inner::Map(m) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => return,
        };
        for (k, v) in &entries {
            if !f(k, v) {
                break;
            }
        }
    }

    /// A deep, mutable clone, regardless of whether `self` is frozen
    /// (spec.md §4.1).
    pub fn copy(&self) -> Value {
        let cell = self.0.read().expect("lock poisoned");
        match &cell.inner {
            Inner::Null => Value::null(),
            Inner::Bool(b) => Value::bool(*b),
            Inner::SignedInteger(v) => Value::signed_integer(*v),
            Inner::UnsignedInteger(v) => Value::unsigned_integer(*v),
            Inner::Real(v) => Value::real(*v),
            Inner::String(s) => Value::string(s.clone()),
            Inner::Array(items) => {
                let items = items.clone();
                drop(cell);
                let out = Value::array();
                for item in items {
                    out.array_append(item.copy()).expect("fresh array is mutable");
                }
                out
            }
            Inner::Map(entries) => {
                let entries = entries.clone();
                drop(cell);
                let out = Value::map();
                for (k, v) in entries {
                    out.map_insert(k, v.copy()).expect("fresh map is mutable");
                }
                out
            }
        }
    }

    /// Structural equality. Integer comparison across signedness is false
    /// unless both are representable in the other domain (spec.md §4.1).
    pub fn equal(&self, other: &Value) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let a = self.0.read().expect("lock poisoned");
        let b = other.0.read().expect("lock poisoned");
        match (&a.inner, &b.inner) {
            (Inner::Null, Inner::Null) => true,
            (Inner::Bool(x), Inner::Bool(y)) => x == y,
            (Inner::SignedInteger(x), Inner::SignedInteger(y)) => x == y,
            (Inner::UnsignedInteger(x), Inner::UnsignedInteger(y)) => x == y,
            (Inner::SignedInteger(x), Inner::UnsignedInteger(y))
            | (Inner::UnsignedInteger(y), Inner::SignedInteger(x)) => {
                *x >= 0 && u64::try_from(*x).map(|x| x == *y).unwrap_or(false)
            }
            (Inner::Real(x), Inner::Real(y)) => x == y,
            (Inner::String(x), Inner::String(y)) => x == y,
            (Inner::Array(x), Inner::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| a.equal(b))
            }
            (Inner::Map(x), Inner::Map(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(k, v)| y.get(k).map(|v2| v.equal(v2)).unwrap_or(false))
            }
            _ => false,
        }
    }

    /// Converts a parsed TOML value into a `Value` tree, used by
    /// `config::load_component_params` (spec.md §4.4 component
    /// initialization parameters).
    pub fn from_toml(t: &toml::Value) -> Value {
        match t {
            toml::Value::String(s) => Value::string(s.clone()),
            toml::Value::Integer(i) => Value::signed_integer(*i),
            toml::Value::Float(f) => Value::real(*f),
            toml::Value::Boolean(b) => Value::bool(*b),
            toml::Value::Datetime(dt) => Value::string(dt.to_string()),
            toml::Value::Array(items) => {
                let v = Value::array();
                for item in items {
                    v.array_append(Value::from_toml(item)).expect("fresh array");
                }
                v
            }
            toml::Value::Table(map) => {
                let v = Value::map();
                for (k, item) in map {
                    v.map_insert(k.clone(), Value::from_toml(item)).expect("fresh map");
                }
                v
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn equal_copy_roundtrip() {
        let v = Value::map();
        v.map_insert("a", Value::unsigned_integer(1)).unwrap();
        v.map_insert("b", Value::array()).unwrap();
        v.map_get("b")
            .unwrap()
            .array_append(Value::string("x"))
            .unwrap();

        let copied = v.copy();
        assert!(v.equal(&copied));
        assert_ne!(
            format!("{:p}", v.0.as_ref()),
            format!("{:p}", copied.0.as_ref())
        );
    }

    #[test]
    fn freeze_rejects_mutation() {
        let v = Value::map();
        v.map_insert("a", Value::bool(true)).unwrap();
        v.freeze();
        let err = v.map_insert("b", Value::bool(false)).unwrap_err();
        assert!(matches!(err, Error::FrozenWrite));
    }

    #[test]
    fn freeze_is_recursive() {
        let inner = Value::array();
        let outer = Value::map();
        outer.map_insert("inner", inner.clone()).unwrap();
        outer.freeze();
        assert!(inner.array_append(Value::null()).is_err());
    }

    #[test]
    fn signed_unsigned_equality_cross_domain() {
        assert!(Value::signed_integer(5).equal(&Value::unsigned_integer(5)));
        assert!(!Value::signed_integer(-1).equal(&Value::unsigned_integer(u64::MAX)));
    }

    #[test]
    fn map_foreach_can_stop_early() {
        let v = Value::map();
        v.map_insert("a", Value::unsigned_integer(1)).unwrap();
        v.map_insert("b", Value::unsigned_integer(2)).unwrap();
        v.map_insert("c", Value::unsigned_integer(3)).unwrap();
        let mut seen = Vec::new();
        v.map_foreach(|k, _| {
            seen.push(k.to_string());
            seen.len() < 2
        });
        assert_eq!(seen.len(), 2);
    }
}
