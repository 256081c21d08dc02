//! Circuit builder module with specialized sub-components.

mod circuit_builder;
pub mod compiler;
mod errors;
mod expression_builder;
mod memo;

pub use circuit_builder::{BuiltCircuit, CircuitBuilder};
pub use errors::CircuitBuilderError;
pub use expression_builder::ExpressionBuilder;
pub use memo::{Body, MemoizationKey, Memoized, SubCircuit, SubCircuitRegistry, memoize};
