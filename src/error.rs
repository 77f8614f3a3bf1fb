//! Error types for registration, materialization, and calculation invocation

use thiserror::Error;

use crate::dimension::Axis;
use crate::reference::LookupError;

/// Fatal configuration errors raised when registering formulas or declaring
/// dimension ranges. These indicate a malformed model and are never coerced
/// into fallback behavior.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A formula signature declares the time parameter more than once
    #[error("formula `{formula}` declares more than one time parameter")]
    DuplicateTimeParam { formula: String },

    /// A formula signature declares the reference-data parameter more than once
    #[error("formula `{formula}` declares more than one reference-data parameter")]
    DuplicateRefDataParam { formula: String },

    /// A formula signature declares the same secondary axis twice
    #[error("formula `{formula}` declares axis `{axis}` more than once")]
    DuplicateAxis { formula: String, axis: Axis },

    /// A module registers two formulas under the same name
    #[error("module `{module}` registers formula `{formula}` more than once")]
    DuplicateFormula { module: String, formula: String },

    /// A secondary axis appears twice in one set of dimension ranges
    #[error("secondary axis `{axis}` is declared more than once in the dimension ranges")]
    DuplicateSecondaryRange { axis: Axis },

    /// Two modules register the same formula name at equal priority.
    /// Resolution by priority is only defined when priorities differ.
    #[error("formula `{formula}` is registered at equal priority by modules `{first}` and `{second}`")]
    PriorityConflict {
        formula: String,
        first: String,
        second: String,
    },
}

/// Errors surfaced by `CalcRegistry::create_calculations`
#[derive(Debug, Clone, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A formula declares a secondary axis for which the supplied dimension
    /// ranges carry no values. Materialization fails rather than silently
    /// degrading to an unspecialized calculation.
    #[error("formula `{formula}` declares axis `{axis}` but the dimension ranges supply no values for it")]
    MissingAxisRange { formula: String, axis: Axis },
}

/// Errors raised while invoking a materialized calculation. Application-level
/// failures from formula bodies propagate unchanged; nothing is retried and
/// failed evaluations are never cached.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("calculation `{calc}` requires a time argument")]
    MissingTimeArg { calc: String },

    #[error("calculation `{calc}` does not take a time argument")]
    UnexpectedTimeArg { calc: String },

    #[error("time argument for `{calc}` is on axis `{axis}`, expected the time axis")]
    WrongTimeAxis { calc: String, axis: Axis },

    #[error("calculation `{calc}` requires a reference-data handle")]
    MissingRefData { calc: String },

    #[error("calculation `{calc}` does not take a reference-data handle")]
    UnexpectedRefData { calc: String },

    /// A formula asked for a secondary-dimension value that its calculation
    /// was not specialized with
    #[error("axis `{axis}` is not bound for calculation `{calc}`")]
    UnboundAxis { calc: String, axis: Axis },

    #[error("no formula named `{0}` is registered")]
    UnknownFormula(String),

    /// A sibling call could not be routed to a specialization matching the
    /// caller's bound dimension values
    #[error("no specialization of `{formula}` matches the bound dimensions of `{calc}`")]
    UnresolvedSpecialization { calc: String, formula: String },

    /// Recursive evaluation exceeded the depth guard. Evaluate time steps in
    /// ascending order so each step finds its predecessor already cached.
    #[error("recursion limit of {limit} exceeded while evaluating `{calc}`")]
    RecursionLimit { calc: String, limit: usize },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Application-level failure raised by a formula body
    #[error("{0}")]
    Formula(String),
}

impl EvalError {
    /// Build an application-level formula error from a message
    pub fn formula(message: impl Into<String>) -> Self {
        EvalError::Formula(message.into())
    }
}

/// Errors surfaced by the projection runner
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
