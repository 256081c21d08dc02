//! A fixed-parameter Poseidon permutation over 16 lanes: native and gate-level.

#![no_std]

extern crate alloc;

mod circuit;
mod params;
mod permutation;

pub use circuit::*;
pub use params::*;
pub use permutation::*;
