use alloc::string::String;

use thiserror::Error;

use crate::types::{ExprId, SubCircuitId};

/// Errors that can occur while declaring variables and building circuits.
#[derive(Debug, Error)]
pub enum CircuitBuilderError {
    /// The requested number of variables cannot even be represented.
    #[error("Variable count overflows: {details}")]
    VariableCountOverflow { details: String },

    /// The wire space of the frontend is exhausted.
    #[error("Cannot allocate {requested} variables: only {available} remain")]
    VariableBudgetExceeded { requested: usize, available: usize },

    /// A placeholder was used before the compiler bound it to a wire.
    #[error("Variable used before being bound: {context}")]
    UnboundVariable { context: String },

    /// An expression handle does not belong to the builder it was passed to.
    #[error("Expression {expr_id} does not belong to this builder: {context}")]
    ForeignExpr { expr_id: ExprId, context: String },

    /// A gadget received an unexpected number of input expressions.
    #[error("{op} expects {expected} input expressions, got {got}")]
    ArityMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// An expression was referenced before the lowering produced it.
    #[error("Missing lowered value for {expr_id}: {context}")]
    MissingExprMapping { expr_id: ExprId, context: String },

    /// A call refers to a sub-circuit that was never registered.
    #[error("Unknown sub-circuit {sub}")]
    UnknownSubCircuit { sub: SubCircuitId },

    /// A body was registered under a key that already has one.
    #[error("Sub-circuit {key} is already registered as {existing}")]
    DuplicateSubCircuit { key: String, existing: SubCircuitId },

    /// An input position lies outside the body's declared inputs.
    #[error("Input position {pos} out of range (body has {num_inputs} inputs)")]
    InputOutOfRange { pos: usize, num_inputs: usize },

    /// `pop_scope` was called without a matching `push_scope`.
    #[error("Scope stack underflow")]
    ScopeUnderflow,
}
