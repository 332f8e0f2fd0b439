//! Query executor (spec.md §4.9, module I).

use crate::error::GraphError;
use crate::graph::component::ComponentClass;
use crate::types::Interruptor;
use crate::value::Value;
use std::sync::Arc;

/// Out-of-band, synchronous RPC to a component class's query method
/// (spec.md §4.9). Holds its own cancel flag, independent of any graph,
/// checked before and after the method runs.
pub struct QueryExecutor {
    cancel: Interruptor,
}

impl QueryExecutor {
    pub fn new() -> Self {
        QueryExecutor {
            cancel: Interruptor::new(),
        }
    }

    pub fn cancel_flag(&self) -> Interruptor {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.set();
    }

    /// Dispatches `object`/`params` to `class`'s query method, honoring
    /// cancellation before and after the call.
    pub fn query(
        &self,
        class: &Arc<dyn ComponentClass>,
        object: &str,
        params: &Value,
    ) -> Result<Value, GraphError> {
        if self.cancel.is_set() {
            return Err(GraphError::Canceled);
        }
        let result = class.query(object, params, &self.cancel);
        if self.cancel.is_set() {
            return Err(GraphError::Canceled);
        }
        result
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
