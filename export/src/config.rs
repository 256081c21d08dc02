use std::path::PathBuf;

use layered_circuit::{CompileOptions, DEFAULT_COMPRESS_THRESHOLD};

/// Batch sizes exported by default, as base-2 logarithms.
///
/// The trailing `14, 15, 16` repeat earlier entries; repeated exponents rewrite the same file.
pub const DEFAULT_EXPONENTS: [u32; 18] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 14, 15, 16,
];

pub const DEFAULT_OUTPUT_DIR: &str = "./m31_poseidon";

pub const DEFAULT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Exponents to export, processed in order.
    pub exponents: Vec<u32>,
    pub output_dir: PathBuf,
    /// File extension of every artifact, without the dot.
    pub extension: String,
    pub compress_threshold: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            exponents: DEFAULT_EXPONENTS.to_vec(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            extension: DEFAULT_EXTENSION.to_string(),
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }
}

impl ExportConfig {
    pub fn with_exponents(mut self, exponents: impl Into<Vec<u32>>) -> Self {
        self.exponents = exponents.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Where the artifact for `2^log_perm` permutations is written.
    pub fn artifact_path(&self, log_perm: u32) -> PathBuf {
        self.output_dir.join(format!("{log_perm}.{}", self.extension))
    }

    pub const fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            compress_threshold: self.compress_threshold,
        }
    }
}
