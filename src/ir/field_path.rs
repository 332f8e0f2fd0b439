//! Field paths (spec.md §3 "FieldPath", §4.3 "Field-path resolution").

use std::fmt;

/// The scopes a field path's root can name, in the order they become
/// visible while walking a structure's declaration (spec.md §3).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum RootScope {
    TracePacketHeader,
    StreamPacketContext,
    EventCommonContext,
    EventSpecificContext,
    EventPayload,
}

/// A resolved path: a root scope plus an ordered list of structure-member
/// indices leading to the referenced field.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FieldPath {
    pub root: RootScope,
    pub indices: Vec<u64>,
}

impl FieldPath {
    pub fn new(root: RootScope, indices: Vec<u64>) -> Self {
        FieldPath { root, indices }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.root)?;
        for idx in &self.indices {
            write!(f, "/{idx}")?;
        }
        Ok(())
    }
}

/// A selector or length target as declared by a builder, before or after
/// field-path resolution (spec.md §4.3). Builders populate `Unresolved`
/// with a dotted member-name path; [`super::validator`] walks the owning
/// structure and replaces it with `Resolved`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum PathRef {
    Unresolved(Vec<String>),
    Resolved(FieldPath),
}

impl PathRef {
    pub fn unresolved(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PathRef::Unresolved(names.into_iter().map(Into::into).collect())
    }

    pub fn resolved(&self) -> Option<&FieldPath> {
        match self {
            PathRef::Resolved(p) => Some(p),
            PathRef::Unresolved(_) => None,
        }
    }
}
