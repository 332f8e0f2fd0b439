//! Field instances (spec.md §3 "Field (instance)").
//!
//! A `Field` mirrors the shape of the `FieldClass` it was instantiated
//! from: every container variant (structure/array/option/variant) holds
//! child fields in the same arrangement as its class holds child classes.
//! Mutation is permitted only while the owning message has not yet been
//! emitted; emission freezes the whole tree the same way `Value::freeze`
//! does (spec.md §4.6 "Freezing a message freezes the contained instance
//! tree").

use crate::error::Error;
use crate::ir::field_class::{FieldClass, FieldClassVariant};
use crate::object::FrozenFlag;
use std::sync::RwLock;

#[derive(Clone, Debug)]
pub enum FieldValue {
    Bool(bool),
    UnsignedInteger(u64),
    SignedInteger(i64),
    Real(f64),
    Enumeration(i128),
    String(String),
    Structure(Vec<Field>),
    Array(Vec<Field>),
    /// `None` when the option's selector evaluated to "not present".
    Option(Option<Box<Field>>),
    /// The index into the variant's option list selected at fill time.
    Variant { selected: usize, value: Box<Field> },
    /// Placeholder for a field not yet filled by the producer.
    Unset,
}

/// A single instantiated field, carrying its own class by reference (the
/// back-reference is strong: spec.md §9 "back-references from instance
/// objects to their class are strong to guarantee class outlives
/// instance").
pub struct Field {
    class: FieldClass,
    frozen: FrozenFlag,
    value: RwLock<FieldValue>,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("frozen", &self.frozen.get())
            .field("value", &*self.value.read().expect("poisoned"))
            .finish()
    }
}

impl Field {
    /// Recursively instantiates a default-valued field tree from a frozen
    /// or unfrozen field class. Freezing the class is the caller's
    /// responsibility (validator or first-instantiation point); this
    /// constructor does not freeze anything itself.
    pub fn instantiate(class: &FieldClass) -> Field {
        let value = class.with_variant(|v| match v {
            FieldClassVariant::Bool => FieldValue::Bool(false),
            FieldClassVariant::UnsignedInteger { .. } => FieldValue::UnsignedInteger(0),
            FieldClassVariant::SignedInteger { .. } => FieldValue::SignedInteger(0),
            FieldClassVariant::Real { .. } => FieldValue::Real(0.0),
            FieldClassVariant::Enumeration { .. } => FieldValue::Enumeration(0),
            FieldClassVariant::String => FieldValue::String(String::new()),
            FieldClassVariant::Structure { members } => FieldValue::Structure(
                members.iter().map(|m| Field::instantiate(&m.fc)).collect(),
            ),
            FieldClassVariant::StaticArray { element, length } => FieldValue::Array(
                (0..*length).map(|_| Field::instantiate(element)).collect(),
            ),
            FieldClassVariant::DynamicArray { .. } => FieldValue::Array(Vec::new()),
            FieldClassVariant::Option { .. } => FieldValue::Option(None),
            FieldClassVariant::Variant { options, .. } => {
                if options.is_empty() {
                    FieldValue::Unset
                } else {
                    FieldValue::Variant {
                        selected: 0,
                        value: Box::new(Field::instantiate(&options[0].fc)),
                    }
                }
            }
        });
        Field {
            class: class.clone(),
            frozen: FrozenFlag::new(),
            value: RwLock::new(value),
        }
    }

    pub fn class(&self) -> &FieldClass {
        &self.class
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen.get() {
            Err(Error::FrozenWrite)
        } else {
            Ok(())
        }
    }

    /// Recursively freezes the field tree (called when the owning message
    /// is emitted).
    pub fn freeze(&self) {
        if self.frozen.get() {
            return;
        }
        self.frozen.set();
        let value = self.value.read().expect("poisoned");
        match &*value {
            FieldValue::Structure(fields) | FieldValue::Array(fields) => {
                for f in fields {
                    f.freeze();
                }
            }
            FieldValue::Option(Some(f)) => f.freeze(),
            FieldValue::Variant { value, .. } => value.freeze(),
            _ => {}
        }
    }

    pub fn set_bool(&self, v: bool) -> Result<(), Error> {
        self.check_mutable()?;
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::Bool(slot) => {
                *slot = v;
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "bool",
                found: "other",
            }),
        }
    }

    pub fn set_unsigned_integer(&self, v: u64) -> Result<(), Error> {
        self.check_mutable()?;
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::UnsignedInteger(slot) => {
                *slot = v;
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "unsigned-integer",
                found: "other",
            }),
        }
    }

    pub fn set_signed_integer(&self, v: i64) -> Result<(), Error> {
        self.check_mutable()?;
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::SignedInteger(slot) => {
                *slot = v;
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "signed-integer",
                found: "other",
            }),
        }
    }

    pub fn set_real(&self, v: f64) -> Result<(), Error> {
        self.check_mutable()?;
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::Real(slot) => {
                *slot = v;
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "real",
                found: "other",
            }),
        }
    }

    pub fn set_string(&self, v: impl Into<String>) -> Result<(), Error> {
        self.check_mutable()?;
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::String(slot) => {
                *slot = v.into();
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "string",
                found: "other",
            }),
        }
    }

    /// Appends an element to a dynamic array, instantiating it from the
    /// array's element class.
    pub fn array_push(&self) -> Result<(), Error> {
        self.check_mutable()?;
        let element_class = self.class.with_variant(|v| match v {
            FieldClassVariant::DynamicArray { element, .. } => Some(element.clone()),
            _ => None,
        });
        let Some(element_class) = element_class else {
            return Err(Error::ValueTypeMismatch {
                expected: "dynamic-array",
                found: "other",
            });
        };
        let mut value = self.value.write().expect("poisoned");
        match &mut *value {
            FieldValue::Array(fields) => {
                fields.push(Field::instantiate(&element_class));
                Ok(())
            }
            _ => Err(Error::ValueTypeMismatch {
                expected: "dynamic-array",
                found: "other",
            }),
        }
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&FieldValue) -> R) -> R {
        f(&self.value.read().expect("poisoned"))
    }

    pub fn at(&self, index: usize) -> Option<FieldRef<'_>> {
        let value = self.value.read().expect("poisoned");
        match &*value {
            FieldValue::Structure(fields) | FieldValue::Array(fields) => {
                fields.get(index)?;
                Some(FieldRef { guard: value, index })
            }
            _ => None,
        }
    }

    /// Recursive-descent visitor over the scalar leaves of this field's
    /// tree, each reported with its dotted path from the root: structure
    /// members walk under their class-supplied name, array/option/variant
    /// elements walk under an `anonymous_<n>` name indexed per nesting
    /// depth. Grounded on the teacher's `field_to_attr`/
    /// `FieldToAttrKeysGen`, retargeted from attr-map construction to a
    /// plain visitor callback.
    pub fn walk(&self, mut visit: impl FnMut(&str, WalkedLeaf)) {
        let mut path: Vec<String> = Vec::new();
        let mut anon_at_depth: Vec<usize> = vec![0];
        self.walk_inner(&mut path, &mut anon_at_depth, &mut visit);
    }

    fn walk_inner(
        &self,
        path: &mut Vec<String>,
        anon_at_depth: &mut Vec<usize>,
        visit: &mut impl FnMut(&str, WalkedLeaf),
    ) {
        let value = self.value.read().expect("poisoned");
        match &*value {
            FieldValue::Bool(v) => visit(&path.join("."), WalkedLeaf::Bool(*v)),
            FieldValue::UnsignedInteger(v) => {
                visit(&path.join("."), WalkedLeaf::UnsignedInteger(*v))
            }
            FieldValue::SignedInteger(v) => visit(&path.join("."), WalkedLeaf::SignedInteger(*v)),
            FieldValue::Real(v) => visit(&path.join("."), WalkedLeaf::Real(*v)),
            FieldValue::Enumeration(v) => visit(&path.join("."), WalkedLeaf::Enumeration(*v)),
            FieldValue::String(v) => visit(&path.join("."), WalkedLeaf::String(v.clone())),
            FieldValue::Unset => {}
            FieldValue::Structure(fields) => {
                let member_names = self.class.with_variant(|v| match v {
                    FieldClassVariant::Structure { members } => {
                        members.iter().map(|m| m.name.clone()).collect::<Vec<_>>()
                    }
                    _ => Vec::new(),
                });
                anon_at_depth.push(0);
                for (i, f) in fields.iter().enumerate() {
                    let name = member_names
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| next_anonymous_name(anon_at_depth));
                    path.push(name);
                    f.walk_inner(path, anon_at_depth, visit);
                    path.pop();
                }
                anon_at_depth.pop();
            }
            FieldValue::Array(fields) => {
                anon_at_depth.push(0);
                for f in fields {
                    path.push(next_anonymous_name(anon_at_depth));
                    f.walk_inner(path, anon_at_depth, visit);
                    path.pop();
                }
                anon_at_depth.pop();
            }
            FieldValue::Option(inner) => {
                if let Some(f) = inner {
                    anon_at_depth.push(0);
                    path.push(next_anonymous_name(anon_at_depth));
                    f.walk_inner(path, anon_at_depth, visit);
                    path.pop();
                    anon_at_depth.pop();
                }
            }
            FieldValue::Variant { value, .. } => {
                anon_at_depth.push(0);
                path.push(next_anonymous_name(anon_at_depth));
                value.walk_inner(path, anon_at_depth, visit);
                path.pop();
                anon_at_depth.pop();
            }
        }
    }
}

/// Next `anonymous_<n>` name at the current nesting depth, advancing that
/// depth's counter. Mirrors `resolve_field_name`'s per-depth index stack.
fn next_anonymous_name(anon_at_depth: &mut [usize]) -> String {
    let depth = anon_at_depth.len() - 1;
    let n = anon_at_depth[depth];
    anon_at_depth[depth] += 1;
    format!("anonymous_{n}")
}

/// A scalar leaf yielded by [`Field::walk`].
#[derive(Clone, Debug, PartialEq)]
pub enum WalkedLeaf {
    Bool(bool),
    UnsignedInteger(u64),
    SignedInteger(i64),
    Real(f64),
    Enumeration(i128),
    String(String),
}

/// A short-lived borrow of a child field, to avoid cloning on structure
/// member access.
pub struct FieldRef<'a> {
    guard: std::sync::RwLockReadGuard<'a, FieldValue>,
    index: usize,
}

impl<'a> FieldRef<'a> {
    pub fn get(&self) -> &Field {
        match &*self.guard {
            FieldValue::Structure(fields) | FieldValue::Array(fields) => &fields[self.index],
            _ => unreachable!("constructed only over Structure/Array"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::field_class::DisplayBase;

    #[test]
    fn instantiate_structure_defaults() {
        let fc = FieldClass::structure();
        fc.add_structure_member("x", FieldClass::unsigned_integer(32, DisplayBase::Dec).unwrap())
            .unwrap();
        let field = Field::instantiate(&fc);
        field.with_value(|v| match v {
            FieldValue::Structure(fields) => assert_eq!(fields.len(), 1),
            _ => panic!("expected structure"),
        });
    }

    #[test]
    fn freeze_rejects_mutation() {
        let fc = FieldClass::unsigned_integer(32, DisplayBase::Dec).unwrap();
        let field = Field::instantiate(&fc);
        field.set_unsigned_integer(7).unwrap();
        field.freeze();
        assert!(matches!(
            field.set_unsigned_integer(8),
            Err(Error::FrozenWrite)
        ));
    }

    #[test]
    fn walk_names_struct_members_and_indexes_array_elements() {
        let fc = FieldClass::structure();
        fc.add_structure_member("x", FieldClass::unsigned_integer(32, DisplayBase::Dec).unwrap())
            .unwrap();
        fc.add_structure_member("arr", FieldClass::dynamic_array(FieldClass::bool(), None))
            .unwrap();
        let field = Field::instantiate(&fc);
        field.with_value(|v| match v {
            FieldValue::Structure(fields) => {
                fields[0].set_unsigned_integer(7).unwrap();
            }
            _ => panic!("expected structure"),
        });
        field.with_value(|v| match v {
            FieldValue::Structure(fields) => {
                fields[1].array_push().unwrap();
                fields[1].array_push().unwrap();
            }
            _ => panic!("expected structure"),
        });

        let mut seen: Vec<(String, WalkedLeaf)> = Vec::new();
        field.walk(|path, leaf| seen.push((path.to_string(), leaf)));

        assert_eq!(
            seen,
            vec![
                ("x".to_string(), WalkedLeaf::UnsignedInteger(7)),
                (
                    "arr.anonymous_0".to_string(),
                    WalkedLeaf::Bool(false)
                ),
                (
                    "arr.anonymous_1".to_string(),
                    WalkedLeaf::Bool(false)
                ),
            ]
        );
    }

    #[test]
    fn dynamic_array_push_instantiates_element() {
        let fc = FieldClass::dynamic_array(FieldClass::bool(), None);
        let field = Field::instantiate(&fc);
        field.array_push().unwrap();
        field.with_value(|v| match v {
            FieldValue::Array(fields) => assert_eq!(fields.len(), 1),
            _ => panic!("expected array"),
        });
    }
}
