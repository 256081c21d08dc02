#![no_std]
extern crate alloc;

pub mod builder;
pub mod circuit;
pub mod compile;
pub mod errors;
pub mod expr;
pub mod layered;
pub mod types;
pub mod variable;

// Re-export public API
pub use builder::{
    BuiltCircuit, CircuitBuilder, CircuitBuilderError, MemoizationKey, Memoized, memoize,
};
pub use circuit::{Circuit, CircuitField};
pub use compile::{CompileError, CompileOptions, CompileResult, DEFAULT_COMPRESS_THRESHOLD, compile};
pub use errors::CircuitError;
pub use expr::{Expr, ExpressionGraph};
pub use layered::{CircuitStats, LayeredCircuit};
pub use types::{ExprId, SegmentId, SubCircuitId};
pub use variable::{Assignment, MAX_VARIABLES, Variable, VariableAllocator};
