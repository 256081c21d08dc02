use std::io;
use std::path::PathBuf;

use layered_circuit::{CircuitBuilderError, CompileError};
use thiserror::Error;

/// Errors that abort an export run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The batch circuit for `2^log_perm` permutations does not fit the wire space.
    #[error("Failed to allocate the batch circuit for 2^{log_perm} permutations")]
    Allocation {
        log_perm: u32,
        #[source]
        source: CircuitBuilderError,
    },

    #[error("Failed to compile the batch circuit for 2^{log_perm} permutations")]
    Compile {
        log_perm: u32,
        #[source]
        source: CompileError,
    },

    #[error("Failed to write artifact {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
