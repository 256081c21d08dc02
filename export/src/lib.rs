//! Exports layered circuits that check batches of Poseidon permutations over Mersenne-31.

pub mod batch;
pub mod config;
pub mod errors;
pub mod export;

pub use batch::PoseidonBatchCircuit;
pub use config::{DEFAULT_EXPONENTS, DEFAULT_EXTENSION, DEFAULT_OUTPUT_DIR, ExportConfig};
pub use errors::ExportError;
pub use export::{ArtifactSource, Exporter, PoseidonArtifacts};
