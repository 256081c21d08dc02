use layered_circuit::{CircuitBuilder, CircuitBuilderError, CircuitField, ExprId};

use crate::{PoseidonParams, SBOX_DEGREE, TOTAL_ROUNDS, WIDTH};

/// Emits the permutation of `input` and returns the permuted state.
pub fn poseidon_circuit<F: CircuitField>(
    api: &mut CircuitBuilder<F>,
    params: &PoseidonParams<F>,
    input: &[ExprId],
) -> Result<[ExprId; WIDTH], CircuitBuilderError> {
    let mut state: [ExprId; WIDTH] =
        input
            .try_into()
            .map_err(|_| CircuitBuilderError::ArityMismatch {
                op: "poseidon",
                expected: WIDTH,
                got: input.len(),
            })?;

    for round in 0..TOTAL_ROUNDS {
        let rc = &params.round_constants()[round];
        let full = PoseidonParams::<F>::is_full_round(round);
        for (lane, (x, &c)) in state.iter_mut().zip(rc).enumerate() {
            let c = api.add_const(c);
            *x = api.add(*x, c);
            if full || lane == 0 {
                *x = api.exp_u64(*x, SBOX_DEGREE);
            }
        }
        state = core::array::from_fn(|i| api.linear_combination(&params.mds()[i], &state));
    }
    Ok(state)
}

/// Constrains `expected` to equal lane 0 of the permutation of `input`.
pub fn check_poseidon<F: CircuitField>(
    api: &mut CircuitBuilder<F>,
    params: &PoseidonParams<F>,
    input: &[ExprId],
    expected: ExprId,
) -> Result<(), CircuitBuilderError> {
    let digest = poseidon_circuit(api, params, input)?[0];
    api.assert_eq(digest, expected);
    Ok(())
}
