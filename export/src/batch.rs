//! The batch circuit: `N` Poseidon permutations, each checked against a claimed digest.

use std::sync::Arc;

use layered_circuit::{
    Circuit, CircuitBuilder, CircuitBuilderError, CircuitField, ExprId, Variable,
    VariableAllocator, memoize,
};
use layered_poseidon::{PoseidonParams, WIDTH, check_poseidon};
use tracing::instrument;

/// Checks `digest[i] == Poseidon(state[i])[0]` for every `i`.
///
/// Inputs are laid out with every state first, in order, followed by every digest.
#[derive(Debug, Clone)]
pub struct PoseidonBatchCircuit<F> {
    state: Vec<[Variable<F>; WIDTH]>,
    digest: Vec<Variable<F>>,
    params: Arc<PoseidonParams<F>>,
}

impl<F: CircuitField> PoseidonBatchCircuit<F> {
    /// A circuit over `2^log_perm` free permutation instances.
    pub fn new(log_perm: u32, params: Arc<PoseidonParams<F>>) -> Result<Self, CircuitBuilderError> {
        let count = 1usize.checked_shl(log_perm).ok_or_else(|| {
            CircuitBuilderError::VariableCountOverflow {
                details: format!("2^{log_perm} permutations"),
            }
        })?;

        // States are allocated first and fail against the wire budget before the digests.
        let mut allocator = VariableAllocator::new();
        let state = allocator.alloc_free_arrays::<F, WIDTH>(count)?;
        let digest = allocator.alloc_free(count)?;
        Ok(Self {
            state,
            digest,
            params,
        })
    }

    /// A circuit whose every variable is fixed to the given values.
    pub fn with_assignment(
        states: &[[F; WIDTH]],
        digests: &[F],
        params: Arc<PoseidonParams<F>>,
    ) -> Result<Self, CircuitBuilderError> {
        if states.len() != digests.len() {
            return Err(CircuitBuilderError::ArityMismatch {
                op: "poseidon batch",
                expected: states.len(),
                got: digests.len(),
            });
        }
        Ok(Self {
            state: states
                .iter()
                .map(|state| state.map(Variable::constant))
                .collect(),
            digest: digests.iter().copied().map(Variable::constant).collect(),
            params,
        })
    }

    /// Number of permutations checked.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn state(&self) -> &[[Variable<F>; WIDTH]] {
        &self.state
    }

    pub fn digest(&self) -> &[Variable<F>] {
        &self.digest
    }

    pub const fn params(&self) -> &Arc<PoseidonParams<F>> {
        &self.params
    }
}

impl<F: CircuitField> Circuit<F> for PoseidonBatchCircuit<F> {
    fn bind(&mut self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        for state in &mut self.state {
            api.bind_all(state.iter_mut());
        }
        api.bind_all(self.digest.iter_mut());
        Ok(())
    }

    #[instrument(skip_all, fields(permutations = self.state.len()))]
    fn define(&self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        let params = Arc::clone(&self.params);
        let check = memoize(move |api: &mut CircuitBuilder<F>, args: &[Vec<ExprId>]| {
            let [state, digest] = args else {
                return Err(CircuitBuilderError::ArityMismatch {
                    op: "poseidon check",
                    expected: 2,
                    got: args.len(),
                });
            };
            let &[digest] = digest.as_slice() else {
                return Err(CircuitBuilderError::ArityMismatch {
                    op: "poseidon digest",
                    expected: 1,
                    got: digest.len(),
                });
            };
            check_poseidon(api, &params, state, digest)?;
            Ok(Vec::new())
        });

        for (state, digest) in self.state.iter().zip(&self.digest) {
            let state = state
                .iter()
                .map(Variable::expr)
                .collect::<Result<Vec<_>, _>>()?;
            check.call_void(api, &[state, vec![digest.expr()?]])?;
        }
        Ok(())
    }
}
