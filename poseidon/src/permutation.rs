use alloc::sync::Arc;

use p3_field::Field;
use p3_symmetric::Permutation;

use crate::{PoseidonParams, SBOX_DEGREE, TOTAL_ROUNDS, WIDTH};

/// The native permutation.
#[derive(Debug, Clone)]
pub struct Poseidon<F> {
    params: Arc<PoseidonParams<F>>,
}

impl<F: Field> Poseidon<F> {
    pub const fn new(params: Arc<PoseidonParams<F>>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PoseidonParams<F> {
        &self.params
    }

    /// Lane 0 of the permuted state.
    pub fn hash(&self, input: &[F; WIDTH]) -> F {
        self.permute(*input)[0]
    }
}

impl<F: Field> Permutation<[F; WIDTH]> for Poseidon<F> {
    fn permute(&self, mut input: [F; WIDTH]) -> [F; WIDTH] {
        self.permute_mut(&mut input);
        input
    }

    fn permute_mut(&self, state: &mut [F; WIDTH]) {
        let params = &*self.params;
        for round in 0..TOTAL_ROUNDS {
            for (lane, rc) in state.iter_mut().zip(&params.round_constants()[round]) {
                *lane += *rc;
            }
            if PoseidonParams::<F>::is_full_round(round) {
                for lane in state.iter_mut() {
                    *lane = lane.exp_u64(SBOX_DEGREE);
                }
            } else {
                state[0] = state[0].exp_u64(SBOX_DEGREE);
            }
            let mixed: [F; WIDTH] = core::array::from_fn(|i| {
                params.mds()[i]
                    .iter()
                    .zip(state.iter())
                    .map(|(&m, &x)| m * x)
                    .sum()
            });
            *state = mixed;
        }
    }
}
