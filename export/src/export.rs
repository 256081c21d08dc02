//! Compiles one batch circuit per configured exponent and writes each to disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use layered_circuit::{CircuitField, CompileOptions, compile};
use layered_poseidon::PoseidonParams;
use tracing::{info, instrument};

use crate::{ExportConfig, ExportError, PoseidonBatchCircuit};

/// Produces the serialized layered circuit for a batch of `2^log_perm` permutations.
pub trait ArtifactSource {
    fn build_artifact(&self, log_perm: u32) -> Result<Vec<u8>, ExportError>;
}

/// Builds, compiles and serializes [`PoseidonBatchCircuit`]s.
#[derive(Debug, Clone)]
pub struct PoseidonArtifacts<F> {
    params: Arc<PoseidonParams<F>>,
    options: CompileOptions,
}

impl<F> PoseidonArtifacts<F> {
    pub const fn new(params: Arc<PoseidonParams<F>>, options: CompileOptions) -> Self {
        Self { params, options }
    }
}

impl<F: CircuitField> ArtifactSource for PoseidonArtifacts<F> {
    #[instrument(skip(self))]
    fn build_artifact(&self, log_perm: u32) -> Result<Vec<u8>, ExportError> {
        let mut circuit = PoseidonBatchCircuit::new(log_perm, Arc::clone(&self.params))
            .map_err(|source| ExportError::Allocation { log_perm, source })?;
        let compile_err = |source| ExportError::Compile { log_perm, source };
        let result = compile(&mut circuit, &self.options).map_err(compile_err)?;
        result.layered_circuit().serialize().map_err(compile_err)
    }
}

/// Drives an export run over [`ExportConfig::exponents`].
#[derive(Debug)]
pub struct Exporter<S> {
    config: ExportConfig,
    source: S,
}

impl<S: ArtifactSource> Exporter<S> {
    pub const fn new(config: ExportConfig, source: S) -> Self {
        Self { config, source }
    }

    pub const fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    pub fn artifact_path(&self, log_perm: u32) -> PathBuf {
        self.config.artifact_path(log_perm)
    }

    /// Exports every exponent in order, stopping at the first failure.
    ///
    /// Artifacts written before the failure are left in place.
    #[instrument(skip_all, fields(artifacts = self.config.exponents.len()))]
    pub fn run(&self) -> Result<(), ExportError> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|source| ExportError::Io {
            path: dir.clone(),
            source,
        })?;

        for &log_perm in &self.config.exponents {
            let bytes = self.source.build_artifact(log_perm)?;
            let path = self.artifact_path(log_perm);
            write_artifact(&path, &bytes)?;
            info!(log_perm, path = %path.display(), bytes = bytes.len(), "wrote artifact");
        }
        Ok(())
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)
}
