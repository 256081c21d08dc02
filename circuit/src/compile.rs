//! The compiler entry point: circuit description in, layered circuit out.

use alloc::string::String;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::builder::compiler::{ExpressionLowerer, Layerer, Optimizer};
use crate::layered::LayeredCircuit;
use crate::{Circuit, CircuitBuilder, CircuitBuilderError, CircuitField};

/// Default bound on the number of gates a fused node may hold.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 32;

/// Errors that can occur while compiling a circuit description.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid compile options: {details}")]
    InvalidOptions { details: String },

    /// The description could not be bound, defined or lowered.
    #[error(transparent)]
    Build(#[from] CircuitBuilderError),

    #[error("Layering failed: {details}")]
    Layering { details: String },

    /// An output is a non-zero constant, so no witness can satisfy the circuit.
    #[error("Circuit is unsatisfiable: output {output} is the non-zero constant {value}")]
    Unsatisfiable { output: usize, value: u64 },

    #[error("Serialization failed: {details}")]
    Serialization { details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Maximum number of gates a fused polynomial node may hold. Must be at least 1.
    pub compress_threshold: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }
}

impl CompileOptions {
    pub const fn with_compress_threshold(mut self, compress_threshold: usize) -> Self {
        self.compress_threshold = compress_threshold;
        self
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        if self.compress_threshold == 0 {
            return Err(CompileError::InvalidOptions {
                details: "compress threshold must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// The outcome of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileResult<F> {
    layered: LayeredCircuit<F>,
}

impl<F> CompileResult<F> {
    pub const fn layered_circuit(&self) -> &LayeredCircuit<F> {
        &self.layered
    }

    pub fn into_layered_circuit(self) -> LayeredCircuit<F> {
        self.layered
    }
}

/// Compiles a circuit description.
///
/// Placeholders are bound on a fresh builder, so a description can be compiled again.
#[instrument(skip_all, fields(compress_threshold = options.compress_threshold))]
pub fn compile<F, C>(circuit: &mut C, options: &CompileOptions) -> Result<CompileResult<F>, CompileError>
where
    F: CircuitField,
    C: Circuit<F>,
{
    options.validate()?;

    let mut api = CircuitBuilder::new();
    circuit.bind(&mut api)?;
    circuit.define(&mut api)?;
    let built = api.build();
    debug!(
        inputs = built.root.num_inputs,
        nodes = built.root.graph.len(),
        sub_circuits = built.sub_circuits.len(),
        "circuit built"
    );

    let program = ExpressionLowerer::new(&built).lower()?;
    drop(built);
    let program = Optimizer::new(options.compress_threshold).optimize(program);
    let layered = Layerer::new(&program).layer()?;
    check_constant_outputs(&layered)?;

    let stats = layered.stats();
    info!(
        layers = stats.layers,
        segments = stats.segments,
        mul_gates = stats.mul_gates,
        add_gates = stats.add_gates,
        placements = stats.placements,
        "compiled layered circuit"
    );
    Ok(CompileResult { layered })
}

/// Rejects circuits with an output that is a non-zero constant.
fn check_constant_outputs<F: CircuitField>(layered: &LayeredCircuit<F>) -> Result<(), CompileError> {
    for (output, value) in layered.constant_outputs().into_iter().enumerate() {
        if let Some(value) = value
            && value != F::ZERO
        {
            return Err(CompileError::Unsatisfiable {
                output,
                value: value.as_canonical_u64(),
            });
        }
    }
    Ok(())
}
