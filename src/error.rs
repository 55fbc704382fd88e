//! Error types for flow construction, node execution, and event waiting.
//!
//! All errors implement `std::error::Error` via `thiserror`. A single
//! `FlowError` enum covers the whole crate; `Result<T>` is the crate-wide
//! alias used throughout the public API.
//!
//! # Error Hierarchy
//!
//! ```text
//! FlowError
//! ├── NodeNotFound          - successor/start node not in the registry
//! ├── ParamValidationFailed - call-time parameter bag rejected by schema
//! ├── ContextValidationFailed - post-execute checkpoint rejected
//! ├── ExecuteError          - user node body returned an error
//! ├── RetryExhausted        - max attempts reached without success
//! ├── EventWaitTimeout      - a `when` gate did not resolve in time
//! └── CorrelationFailed     - `correlate` strategy predicate rejected
//! ```
//!
//! # Example
//!
//! ```rust
//! use reactive_flow::error::FlowError;
//!
//! fn handle(err: FlowError) {
//!     match err {
//!         FlowError::NodeNotFound(name) => eprintln!("no such node: {name}"),
//!         FlowError::ExecuteError { node, error } => {
//!             eprintln!("node '{node}' failed: {error}")
//!         }
//!         other => eprintln!("{other}"),
//!     }
//! }
//! ```

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FlowError>;

/// All error kinds a `GraphFlow` can produce.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A node name did not resolve against the registry.
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),

    /// The call-time parameter bag failed the node's declared `params` schema.
    #[error("parameters for node '{node}' failed validation: {error}")]
    ParamValidationFailed {
        /// Node whose `params` schema rejected the call.
        node: String,
        /// First validation error message.
        error: String,
    },

    /// A node's `params` schema is declared but no parameters were supplied.
    #[error("node '{0}' requires parameters but none were supplied")]
    ParamsRequired(String),

    /// The context failed schema validation at the post-execute checkpoint.
    #[error("context after node '{node}' failed schema validation: {error}")]
    ContextValidationFailed {
        /// Node whose execution produced the invalid context.
        node: String,
        /// First validation error message.
        error: String,
    },

    /// The user-supplied `execute` function returned an error.
    #[error("node '{node}' execution failed: {error}")]
    ExecuteError {
        /// Node whose body raised the error.
        node: String,
        /// Error message surfaced by the node body.
        error: String,
    },

    /// All retry attempts were exhausted without success.
    #[error("node '{node}' exhausted {attempts} retry attempt(s): {error}")]
    RetryExhausted {
        /// Node that exhausted its retry budget.
        node: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        error: String,
    },

    /// An event-wait gate (`when`) did not resolve before its timeout.
    #[error("node '{node}' timed out after {timeout_ms}ms waiting for events: {events:?}")]
    EventWaitTimeout {
        /// Node whose gate timed out.
        node: String,
        /// Configured timeout.
        timeout_ms: u64,
        /// Event names the gate was waiting on.
        events: Vec<String>,
    },

    /// A `correlate` strategy's predicate rejected a gathered event set.
    #[error("node '{node}' correlation failed for events: {events:?}")]
    CorrelationFailed {
        /// Node whose correlation predicate rejected.
        node: String,
        /// Event names that were gathered before the predicate ran.
        events: Vec<String>,
    },

    /// The initial context failed schema validation at construction time.
    #[error("initial context failed schema validation: {0}")]
    InitialContextInvalid(String),
}

impl FlowError {
    /// Build an [`FlowError::ExecuteError`] from any displayable error.
    pub fn execute_error(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FlowError::ExecuteError {
            node: node.into(),
            error: error.to_string(),
        }
    }

    /// Build an [`FlowError::ContextValidationFailed`] from a schema error message.
    pub fn context_invalid(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FlowError::ContextValidationFailed {
            node: node.into(),
            error: error.to_string(),
        }
    }

    /// Build a [`FlowError::ParamValidationFailed`] from a schema error message.
    pub fn param_invalid(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FlowError::ParamValidationFailed {
            node: node.into(),
            error: error.to_string(),
        }
    }
}
