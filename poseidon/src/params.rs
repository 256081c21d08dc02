use alloc::vec::Vec;

use p3_field::Field;
use rand::distr::{Distribution, StandardUniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

/// Number of lanes of the permutation state.
pub const WIDTH: usize = 16;

/// Rounds applying the S-box to every lane, split evenly before and after the partial rounds.
pub const FULL_ROUNDS: usize = 8;

/// Rounds applying the S-box to lane 0 only.
pub const PARTIAL_ROUNDS: usize = 14;

pub const TOTAL_ROUNDS: usize = FULL_ROUNDS + PARTIAL_ROUNDS;

/// The S-box is `x ↦ x^SBOX_DEGREE`.
pub const SBOX_DEGREE: u64 = 5;

/// Seed of the round-constant stream.
pub const ROUND_CONSTANTS_SEED: [u8; 32] = *b"layered-m31-poseidon-constants!!";

/// Round constants and MDS matrix of the permutation.
///
/// Built once and shared read-only (behind an `Arc`) by every circuit and native permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseidonParams<F> {
    round_constants: Vec<[F; WIDTH]>,
    mds: [[F; WIDTH]; WIDTH],
}

impl<F: Field> PoseidonParams<F>
where
    StandardUniform: Distribution<F>,
{
    /// The parameter set derived from [`ROUND_CONSTANTS_SEED`].
    pub fn new() -> Self {
        Self::from_seed(ROUND_CONSTANTS_SEED)
    }

    /// Samples the round constants from a ChaCha20 stream, row by row.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let mut rng = ChaCha20Rng::from_seed(seed);
        let round_constants: Vec<[F; WIDTH]> = (0..TOTAL_ROUNDS)
            .map(|_| core::array::from_fn(|_| rng.sample(StandardUniform)))
            .collect();
        debug!(rounds = round_constants.len(), "sampled round constants");
        Self {
            round_constants,
            mds: cauchy_mds(),
        }
    }
}

impl<F: Field> Default for PoseidonParams<F>
where
    StandardUniform: Distribution<F>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Field> PoseidonParams<F> {
    pub fn round_constants(&self) -> &[[F; WIDTH]] {
        &self.round_constants
    }

    pub const fn mds(&self) -> &[[F; WIDTH]; WIDTH] {
        &self.mds
    }

    /// Whether round `round` applies the S-box to every lane.
    pub const fn is_full_round(round: usize) -> bool {
        let half = FULL_ROUNDS / 2;
        round < half || round >= half + PARTIAL_ROUNDS
    }
}

/// The Cauchy matrix `M[i][j] = 1 / (i + WIDTH + j)`.
///
/// `i` and `WIDTH + j` range over disjoint sets, so every minor is non-singular.
fn cauchy_mds<F: Field>() -> [[F; WIDTH]; WIDTH] {
    core::array::from_fn(|i| core::array::from_fn(|j| F::from_usize(i + WIDTH + j).inverse()))
}
