//! Circuit compilation and lowering subsystem.
//!
//! Lowering turns expression graphs into degree-2 polynomial nodes, the optimizer fuses
//! them under the compression threshold, and the layerer assigns them to layers.

mod expression_lowerer;
pub mod ir;
mod layerer;
mod optimizer;

pub use expression_lowerer::ExpressionLowerer;
pub use layerer::Layerer;
pub use optimizer::Optimizer;
