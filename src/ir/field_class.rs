//! Field classes: schema nodes (spec.md §3 "FieldClass").
//!
//! A `FieldClass` is a tagged enum of concrete field classes (spec.md §9
//! "Dynamic dispatch on FieldClass": "Replace C's per-variant struct
//! hierarchy with a tagged enum... behavior is a match on the tag. No
//! virtual vtables are needed... because the set of variants is closed.").
//! It is mutable through its owning builder until the first `Field` is
//! instantiated from it (or from an ancestor structure/array/variant that
//! contains it), at which point [`FieldClass::freeze`] is called and every
//! subsequent mutator returns [`Error::FrozenWrite`].

use crate::error::Error;
use crate::ir::clock::ClockClass;
use crate::ir::field_path::PathRef;
use crate::object::FrozenFlag;
use std::sync::{Arc, RwLock};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DisplayBase {
    Bin,
    Oct,
    Dec,
    Hex,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RealPrecision {
    F32,
    F64,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// A closed, possibly-overlapping set of integer ranges used by an
/// enumeration mapping or a variant option's selector coverage (spec.md
/// §4.3 "Enumeration range-sets", "Variant coverage").
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RangeSet {
    Signed(Vec<(i64, i64)>),
    Unsigned(Vec<(u64, u64)>),
}

impl RangeSet {
    pub fn is_empty(&self) -> bool {
        match self {
            RangeSet::Signed(r) => r.is_empty(),
            RangeSet::Unsigned(r) => r.is_empty(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, RangeSet::Signed(_))
    }

    /// All ranges are non-empty (`lo <= hi`), required by spec.md §4.3.
    pub fn ranges_non_empty(&self) -> bool {
        match self {
            RangeSet::Signed(r) => r.iter().all(|(lo, hi)| lo <= hi),
            RangeSet::Unsigned(r) => r.iter().all(|(lo, hi)| lo <= hi),
        }
    }

    pub fn contains_signed(&self, v: i64) -> bool {
        match self {
            RangeSet::Signed(r) => r.iter().any(|(lo, hi)| v >= *lo && v <= *hi),
            RangeSet::Unsigned(_) => false,
        }
    }

    pub fn contains_unsigned(&self, v: u64) -> bool {
        match self {
            RangeSet::Unsigned(r) => r.iter().any(|(lo, hi)| v >= *lo && v <= *hi),
            RangeSet::Signed(_) => false,
        }
    }

    /// True if every value in `self` is also covered by `other`, used to
    /// validate that a variant option's range-set is a subset of the
    /// selector's overall value range (spec.md §4.3 "Variant coverage").
    pub fn is_subset_of(&self, other: &RangeSet) -> bool {
        match (self, other) {
            (RangeSet::Signed(a), RangeSet::Signed(b)) => a.iter().all(|(lo, hi)| {
                // Every integer in [lo, hi] must be covered by some range in b.
                // Ranges are small in practice; a linear subset check over the
                // endpoints (not every integer) suffices because b's ranges are
                // themselves contiguous intervals.
                b.iter().any(|(blo, bhi)| *blo <= *lo && *hi <= *bhi)
            }),
            (RangeSet::Unsigned(a), RangeSet::Unsigned(b)) => a
                .iter()
                .all(|(lo, hi)| b.iter().any(|(blo, bhi)| *blo <= *lo && *hi <= *bhi)),
            _ => false,
        }
    }

    /// Two range-sets overlap (used to reject duplicate mappings across
    /// variant options, spec.md §4.3).
    pub fn overlaps(&self, other: &RangeSet) -> bool {
        match (self, other) {
            (RangeSet::Signed(a), RangeSet::Signed(b)) => a
                .iter()
                .any(|(lo, hi)| b.iter().any(|(blo, bhi)| *lo <= *bhi && *blo <= *hi)),
            (RangeSet::Unsigned(a), RangeSet::Unsigned(b)) => a
                .iter()
                .any(|(lo, hi)| b.iter().any(|(blo, bhi)| *lo <= *bhi && *blo <= *hi)),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnumMapping {
    pub label: String,
    pub range: RangeSet,
}

#[derive(Clone, Debug)]
pub struct StructureMember {
    pub name: String,
    pub fc: FieldClass,
}

#[derive(Clone, Debug)]
pub struct VariantOption {
    pub name: String,
    pub fc: FieldClass,
    pub selector_range: RangeSet,
}

#[derive(Debug)]
pub enum FieldClassVariant {
    Bool,
    UnsignedInteger {
        bit_width: u8,
        display_base: DisplayBase,
        /// The clock an integer field's value is interpreted against, if
        /// any (spec.md §4.3 "clock-class uniqueness": at most one
        /// distinct `ClockClass` may appear across an event/stream's
        /// field-class subtree).
        mapped_clock_class: Option<ClockClass>,
    },
    SignedInteger {
        bit_width: u8,
        display_base: DisplayBase,
        mapped_clock_class: Option<ClockClass>,
    },
    Real {
        precision: RealPrecision,
    },
    Enumeration {
        signed: bool,
        mappings: Vec<EnumMapping>,
    },
    String,
    Structure {
        members: Vec<StructureMember>,
    },
    StaticArray {
        element: FieldClass,
        length: u64,
    },
    DynamicArray {
        element: FieldClass,
        length_path: Option<PathRef>,
    },
    Option {
        content: FieldClass,
        selector_path: Option<PathRef>,
    },
    Variant {
        selector_path: Option<PathRef>,
        options: Vec<VariantOption>,
    },
}

struct Inner {
    frozen: FrozenFlag,
    variant: RwLock<FieldClassVariant>,
}

/// A schema node. Cheaply cloneable (an `Arc` bump); clones alias the same
/// node, matching the spec's class-object sharing (e.g. a `Structure`
/// member's `fc` is the same `FieldClass` instance everywhere it is
/// referenced, so freezing it once freezes it everywhere).
#[derive(Clone)]
pub struct FieldClass(Arc<Inner>);

impl std::fmt::Debug for FieldClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldClass")
            .field("frozen", &self.0.frozen.get())
            .field("variant", &*self.0.variant.read().expect("poisoned"))
            .finish()
    }
}

impl FieldClass {
    fn wrap(variant: FieldClassVariant) -> Self {
        FieldClass(Arc::new(Inner {
            frozen: FrozenFlag::new(),
            variant: RwLock::new(variant),
        }))
    }

    pub fn bool() -> Self {
        Self::wrap(FieldClassVariant::Bool)
    }

    pub fn unsigned_integer(bit_width: u8, display_base: DisplayBase) -> Result<Self, Error> {
        if bit_width == 0 || bit_width > 64 {
            return Err(Error::Validation(format!(
                "unsigned integer bit width {bit_width} out of range 1..=64"
            )));
        }
        Ok(Self::wrap(FieldClassVariant::UnsignedInteger {
            bit_width,
            display_base,
            mapped_clock_class: None,
        }))
    }

    pub fn signed_integer(bit_width: u8, display_base: DisplayBase) -> Result<Self, Error> {
        if bit_width == 0 || bit_width > 64 {
            return Err(Error::Validation(format!(
                "signed integer bit width {bit_width} out of range 1..=64"
            )));
        }
        Ok(Self::wrap(FieldClassVariant::SignedInteger {
            bit_width,
            display_base,
            mapped_clock_class: None,
        }))
    }

    /// Attaches the clock an unsigned integer field is to be read against.
    /// Fails if the class is frozen or is not an unsigned-integer.
    pub fn set_mapped_clock_class(&self, cc: ClockClass) -> Result<(), Error> {
        self.check_mutable()?;
        let mut variant = self.0.variant.write().expect("poisoned");
        match &mut *variant {
            FieldClassVariant::UnsignedInteger {
                mapped_clock_class, ..
            }
            | FieldClassVariant::SignedInteger {
                mapped_clock_class, ..
            } => {
                *mapped_clock_class = Some(cc);
                Ok(())
            }
            _ => Err(Error::Validation("not an integer field class".into())),
        }
    }

    pub fn real(precision: RealPrecision) -> Self {
        Self::wrap(FieldClassVariant::Real { precision })
    }

    pub fn enumeration(signed: bool) -> Self {
        Self::wrap(FieldClassVariant::Enumeration {
            signed,
            mappings: Vec::new(),
        })
    }

    pub fn string() -> Self {
        Self::wrap(FieldClassVariant::String)
    }

    pub fn structure() -> Self {
        Self::wrap(FieldClassVariant::Structure {
            members: Vec::new(),
        })
    }

    pub fn static_array(element: FieldClass, length: u64) -> Self {
        Self::wrap(FieldClassVariant::StaticArray { element, length })
    }

    pub fn dynamic_array(element: FieldClass, length_path: Option<PathRef>) -> Self {
        Self::wrap(FieldClassVariant::DynamicArray {
            element,
            length_path,
        })
    }

    pub fn option(content: FieldClass, selector_path: Option<PathRef>) -> Self {
        Self::wrap(FieldClassVariant::Option {
            content,
            selector_path,
        })
    }

    pub fn variant(selector_path: Option<PathRef>) -> Self {
        Self::wrap(FieldClassVariant::Variant {
            selector_path,
            options: Vec::new(),
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.is_frozen() {
            Err(Error::FrozenWrite)
        } else {
            Ok(())
        }
    }

    /// Recursively freezes this node and every descendant (spec.md §4.1's
    /// freeze semantics, applied to schema nodes per §4.3: "Validation
    /// produces copied, frozen field-class trees").
    pub fn freeze(&self) {
        if self.0.frozen.get() {
            return;
        }
        self.0.frozen.set();
        let variant = self.0.variant.read().expect("poisoned");
        match &*variant {
            FieldClassVariant::Structure { members } => {
                let members = members.clone();
                drop(variant);
                for m in &members {
                    m.fc.freeze();
                }
            }
            FieldClassVariant::StaticArray { element, .. }
            | FieldClassVariant::DynamicArray { element, .. } => {
                let element = element.clone();
                drop(variant);
                element.freeze();
            }
            FieldClassVariant::Option { content, .. } => {
                let content = content.clone();
                drop(variant);
                content.freeze();
            }
            FieldClassVariant::Variant { options, .. } => {
                let options = options.clone();
                drop(variant);
                for o in &options {
                    o.fc.freeze();
                }
            }
            _ => {}
        }
    }

    pub fn with_variant<R>(&self, f: impl FnOnce(&FieldClassVariant) -> R) -> R {
        f(&self.0.variant.read().expect("poisoned"))
    }

    /// The index and field class of a direct structure member, by name.
    /// `None` if this isn't a structure or has no member with that name.
    pub fn structure_member(&self, name: &str) -> Option<(u64, FieldClass)> {
        let variant = self.0.variant.read().expect("poisoned");
        match &*variant {
            FieldClassVariant::Structure { members } => members
                .iter()
                .position(|m| m.name == name)
                .map(|idx| (idx as u64, members[idx].fc.clone())),
            _ => None,
        }
    }

    pub fn add_structure_member(&self, name: impl Into<String>, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        let mut variant = self.0.variant.write().expect("poisoned");
        match &mut *variant {
            FieldClassVariant::Structure { members } => {
                let name = name.into();
                if members.iter().any(|m| m.name == name) {
                    return Err(Error::Validation(format!(
                        "duplicate structure member {name:?}"
                    )));
                }
                members.push(StructureMember { name, fc });
                Ok(())
            }
            _ => Err(Error::Validation("not a structure field class".into())),
        }
    }

    pub fn add_enum_mapping(&self, label: impl Into<String>, range: RangeSet) -> Result<(), Error> {
        self.check_mutable()?;
        if range.is_empty() || !range.ranges_non_empty() {
            return Err(Error::Validation("enumeration range must be non-empty".into()));
        }
        let mut variant = self.0.variant.write().expect("poisoned");
        match &mut *variant {
            FieldClassVariant::Enumeration { signed, mappings } => {
                if *signed != range.is_signed() {
                    return Err(Error::Validation(
                        "enum mapping signedness does not match enumeration base".into(),
                    ));
                }
                mappings.push(EnumMapping {
                    label: label.into(),
                    range,
                });
                Ok(())
            }
            _ => Err(Error::Validation("not an enumeration field class".into())),
        }
    }

    pub fn add_variant_option(
        &self,
        name: impl Into<String>,
        fc: FieldClass,
        selector_range: RangeSet,
    ) -> Result<(), Error> {
        self.check_mutable()?;
        let mut variant = self.0.variant.write().expect("poisoned");
        match &mut *variant {
            FieldClassVariant::Variant { options, .. } => {
                for existing in options.iter() {
                    if existing.selector_range.overlaps(&selector_range) {
                        return Err(Error::Validation(format!(
                            "variant option {:?} range overlaps existing option {:?}",
                            name.into(),
                            existing.name
                        )));
                    }
                }
                options.push(VariantOption {
                    name: name.into(),
                    fc,
                    selector_range,
                });
                Ok(())
            }
            _ => Err(Error::Validation("not a variant field class".into())),
        }
    }

    /// Identity comparison: used by the validator to check "at most one
    /// clock class per field-class subtree" without requiring `ClockClass`
    /// to implement structural equality.
    pub fn ptr_eq(&self, other: &FieldClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Overwrites this node's selector/length path (whichever it has) with
    /// a resolved [`PathRef`]. Used by [`super::validator`] after walking
    /// the owning structure; fails if this node carries no such path or
    /// is frozen.
    pub fn set_resolved_selector_path(&self, resolved: PathRef) -> Result<(), Error> {
        self.check_mutable()?;
        let mut variant = self.0.variant.write().expect("poisoned");
        match &mut *variant {
            FieldClassVariant::DynamicArray { length_path, .. } => {
                *length_path = Some(resolved);
                Ok(())
            }
            FieldClassVariant::Option { selector_path, .. } => {
                *selector_path = Some(resolved);
                Ok(())
            }
            FieldClassVariant::Variant { selector_path, .. } => {
                *selector_path = Some(resolved);
                Ok(())
            }
            _ => Err(Error::Validation(
                "field class carries no selector/length path".into(),
            )),
        }
    }

    /// Recursively collects every distinct (by identity) clock class
    /// mapped anywhere under this node, for the validator's clock-class
    /// uniqueness check (spec.md §4.3).
    pub fn collect_mapped_clock_classes(&self, out: &mut Vec<ClockClass>) {
        let push_unique = |out: &mut Vec<ClockClass>, cc: &ClockClass| {
            if !out.iter().any(|existing| existing.ptr_eq(cc)) {
                out.push(cc.clone());
            }
        };
        let variant = self.0.variant.read().expect("poisoned");
        match &*variant {
            FieldClassVariant::UnsignedInteger {
                mapped_clock_class: Some(cc),
                ..
            }
            | FieldClassVariant::SignedInteger {
                mapped_clock_class: Some(cc),
                ..
            } => push_unique(out, cc),
            FieldClassVariant::Structure { members } => {
                let members = members.clone();
                drop(variant);
                for m in &members {
                    m.fc.collect_mapped_clock_classes(out);
                }
                return;
            }
            FieldClassVariant::StaticArray { element, .. }
            | FieldClassVariant::DynamicArray { element, .. } => {
                let element = element.clone();
                drop(variant);
                element.collect_mapped_clock_classes(out);
                return;
            }
            FieldClassVariant::Option { content, .. } => {
                let content = content.clone();
                drop(variant);
                content.collect_mapped_clock_classes(out);
                return;
            }
            FieldClassVariant::Variant { options, .. } => {
                let options = options.clone();
                drop(variant);
                for o in &options {
                    o.fc.collect_mapped_clock_classes(out);
                }
                return;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_rejects_further_mutation() {
        let fc = FieldClass::structure();
        fc.add_structure_member("a", FieldClass::bool()).unwrap();
        fc.freeze();
        let err = fc.add_structure_member("b", FieldClass::bool()).unwrap_err();
        assert!(matches!(err, Error::FrozenWrite));
    }

    #[test]
    fn freeze_cascades_to_descendants() {
        let inner = FieldClass::bool();
        let arr = FieldClass::static_array(inner.clone(), 4);
        arr.freeze();
        assert!(inner.is_frozen());
    }

    #[test]
    fn rejects_out_of_range_bit_width() {
        assert!(FieldClass::unsigned_integer(0, DisplayBase::Dec).is_err());
        assert!(FieldClass::unsigned_integer(65, DisplayBase::Dec).is_err());
        assert!(FieldClass::unsigned_integer(64, DisplayBase::Hex).is_ok());
    }

    #[test]
    fn variant_rejects_overlapping_options() {
        let v = FieldClass::variant(None);
        v.add_variant_option("a", FieldClass::bool(), RangeSet::Unsigned(vec![(0, 5)]))
            .unwrap();
        let err = v
            .add_variant_option("b", FieldClass::bool(), RangeSet::Unsigned(vec![(5, 10)]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
