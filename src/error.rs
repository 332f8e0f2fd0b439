//! Error taxonomy (spec.md §7).
//!
//! `GraphError` is the closed status set every component method, iterator
//! `next`, and graph `run_once` call returns; success is `Result::Ok`, so
//! this enum only needs to carry the non-trivial and terminal statuses.
//! `Error` carries the diagnostic cause chain for the `Error`/`MemoryError`
//! kinds, the way user-method failures are expected to be reported (§7
//! "structured error context").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Stream exhausted; terminal for the calling site.
    #[error("end of stream")]
    End,

    /// No progress possible right now; retry later.
    #[error("no progress possible, try again")]
    Again,

    /// The graph or executor cancel flag was observed set.
    #[error("operation canceled")]
    Canceled,

    /// The requested capability is not provided by the callee.
    #[error("unsupported operation")]
    Unsupported,

    /// The requested object is not known to the callee.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// A numeric conversion could not be represented in the target range.
    #[error("numeric overflow")]
    Overflow,

    /// An OS I/O primitive failed (serializer only).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Allocation failed.
    #[error("memory allocation failed")]
    MemoryError,

    /// Unspecified user-method failure, with diagnostic context attached.
    #[error(transparent)]
    Error(#[from] Error),
}

impl GraphError {
    pub fn is_again(&self) -> bool {
        matches!(self, GraphError::Again)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, GraphError::End)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, GraphError::Canceled)
    }
}

/// Diagnostic error context attached to the `Error`/`MemoryError` kinds.
#[derive(Debug, Error)]
pub enum Error {
    #[error("attempted to mutate a frozen object")]
    FrozenWrite,

    #[error("value type mismatch: expected {expected}, found {found}")]
    ValueTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("duplicate identifier: {kind} id {id} already in use")]
    DuplicateId { kind: &'static str, id: u64 },

    #[error("duplicate port name: {0:?}")]
    DuplicatePortName(String),

    #[error("port is already connected")]
    PortAlreadyConnected,

    #[error("connection direction mismatch: both ports must be output -> input")]
    ConnectionDirectionMismatch,

    #[error("ports belong to components owned by different graphs")]
    CrossGraphConnection,

    #[error("port removal is rejected because it is connected")]
    PortIsConnected,

    #[error("the graph has already started running; structural mutation rejected")]
    GraphIsConfigured,

    #[error("field path resolution failed: {0}")]
    FieldPathResolution(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("listener attempted to mutate the graph during callback dispatch")]
    ListenerMutationDuringCallback,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

/// Thread-local current-error slot (spec.md §9 "Global state"): the last
/// error recorded by a fallible call, readable and clearable by the driver.
pub mod current {
    use super::Error;
    use std::cell::RefCell;

    thread_local! {
        static CURRENT: RefCell<Option<String>> = RefCell::new(None);
    }

    /// Records `err`'s display string as the current thread's error, and
    /// returns it unchanged so call sites can write `return Err(current::set(e))`.
    pub fn set(err: Error) -> Error {
        CURRENT.with(|c| *c.borrow_mut() = Some(err.to_string()));
        err
    }

    /// Reads the current error message, if any, without clearing it.
    pub fn get() -> Option<String> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Clears the current error.
    pub fn clear() {
        CURRENT.with(|c| *c.borrow_mut() = None);
    }
}
