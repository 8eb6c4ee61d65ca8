//! Error types for stateless particle emitters.
//!
//! Only building an emitter and writing live parameters can fail. Simulation
//! never returns an error: every degenerate input is turned into a safe
//! constant (or a skipped kernel) while the emitter is built.

use thiserror::Error;

/// Errors that can occur while compiling an emitter definition.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A static pool or parameter offset does not fit the 20-bit field of a
    /// [`BuiltDistribution`](crate::BuiltDistribution).
    #[error("data offset {offset} does not fit in the 20-bit distribution offset field")]
    DataOffsetOverflow { offset: usize },

    /// A renderer binding was registered twice with different component counts.
    #[error("binding '{name}' registered with {expected} components, requested with {found}")]
    BindingTypeMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    /// A parameter expression references a name that was never bound.
    #[error("expression references unknown binding '{0}'")]
    UnknownBinding(String),

    /// The emitter definition could not be parsed.
    #[error("invalid emitter definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}

/// Errors that can occur when writing a live parameter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// No binding with this name exists in the parameter layout.
    #[error("unknown parameter '{0}'")]
    Unknown(String),

    /// The value has a different number of components than the binding.
    #[error("parameter '{name}' expects {expected} components, got {found}")]
    TypeMismatch {
        name: String,
        expected: u32,
        found: u32,
    },
}
