use std::cell::{Ref, RefCell};
use std::fs;
use std::sync::Arc;

use layered_circuit::{CircuitBuilderError, CompileError, CompileOptions, LayeredCircuit, compile};
use layered_export::{
    ArtifactSource, ExportConfig, ExportError, Exporter, PoseidonArtifacts, PoseidonBatchCircuit,
};
use layered_poseidon::{Poseidon, PoseidonParams, WIDTH};
use p3_field::PrimeCharacteristicRing;
use p3_mersenne_31::Mersenne31;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

type F = Mersenne31;

fn params() -> Arc<PoseidonParams<F>> {
    Arc::new(PoseidonParams::new())
}

fn compile_batch(log_perm: u32) -> LayeredCircuit<F> {
    let mut circuit = PoseidonBatchCircuit::new(log_perm, params()).unwrap();
    compile(&mut circuit, &CompileOptions::default())
        .unwrap()
        .into_layered_circuit()
}

/// Records requested exponents and fails on the `fail_at`-th request.
struct RecordingSource {
    calls: RefCell<Vec<u32>>,
    fail_at: Option<usize>,
}

impl RecordingSource {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_at,
        }
    }
}

impl ArtifactSource for RecordingSource {
    fn build_artifact(&self, log_perm: u32) -> Result<Vec<u8>, ExportError> {
        let mut calls = self.calls.borrow_mut();
        calls.push(log_perm);
        if self.fail_at == Some(calls.len() - 1) {
            return Err(ExportError::Allocation {
                log_perm,
                source: CircuitBuilderError::VariableCountOverflow {
                    details: "injected".into(),
                },
            });
        }
        Ok(vec![log_perm as u8; 4])
    }
}

fn source_calls(exporter: &Exporter<RecordingSource>) -> Ref<'_, Vec<u32>> {
    exporter.source().calls.borrow()
}

#[test]
fn test_honest_batch_witness_satisfies() {
    let params = params();
    let perm = Poseidon::new(params.clone());
    let layered = compile_batch(2);
    assert_eq!(layered.input_width(), 4 * (WIDTH as u32 + 1));

    let mut rng = SmallRng::seed_from_u64(1);
    let states: Vec<[F; WIDTH]> = (0..4).map(|_| rng.random()).collect();
    let mut witness: Vec<F> = states.iter().flatten().copied().collect();
    witness.extend(states.iter().map(|s| perm.hash(s)));
    assert!(layered.is_satisfied(&witness).unwrap());

    // Corrupting the third digest is caught.
    let last = witness.len() - 2;
    witness[last] += F::ONE;
    assert!(!layered.is_satisfied(&witness).unwrap());
}

#[test]
fn test_memoized_check_is_shared_across_the_batch() {
    let small = compile_batch(1).stats();
    let large = compile_batch(3).stats();
    assert_eq!(small.segments, large.segments);
    assert_eq!(large.placements, 4 * small.placements);
}

#[test]
fn test_artifact_bytes_are_deterministic() {
    let source = PoseidonArtifacts::new(params(), CompileOptions::default());
    let first = source.build_artifact(1).unwrap();
    let second = PoseidonArtifacts::new(params(), CompileOptions::default())
        .build_artifact(1)
        .unwrap();
    assert_eq!(first, second);

    let decoded = LayeredCircuit::<F>::deserialize(&first).unwrap();
    assert_eq!(decoded.serialize().unwrap(), first);
}

#[test]
fn test_fixed_point_accepted() {
    let params = params();
    let digest = Poseidon::new(params.clone()).hash(&[F::ZERO; WIDTH]);
    let mut circuit =
        PoseidonBatchCircuit::with_assignment(&[[F::ZERO; WIDTH]], &[digest], params).unwrap();
    let layered = compile(&mut circuit, &CompileOptions::default())
        .unwrap()
        .into_layered_circuit();
    assert_eq!(layered.input_width(), 0);
    assert!(layered.is_satisfied(&[]).unwrap());
}

#[test]
fn test_mismatched_fixed_digest_rejected() {
    let params = params();
    let digest = Poseidon::new(params.clone()).hash(&[F::ZERO; WIDTH]) + F::ONE;
    let mut circuit =
        PoseidonBatchCircuit::with_assignment(&[[F::ZERO; WIDTH]], &[digest], params).unwrap();
    let err = compile(&mut circuit, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Unsatisfiable { .. }));
}

#[test]
fn test_run_writes_in_sequence_order() {
    let dir = tempdir().unwrap();
    let config = ExportConfig::default()
        .with_exponents([3, 1, 2])
        .with_output_dir(dir.path().join("nested"));
    let exporter = Exporter::new(config, RecordingSource::new(None));
    exporter.run().unwrap();

    assert_eq!(*source_calls(&exporter), vec![3, 1, 2]);
    for e in [1, 2, 3] {
        let bytes = fs::read(exporter.artifact_path(e)).unwrap();
        assert_eq!(bytes, vec![e as u8; 4]);
    }
}

#[test]
fn test_duplicate_exponents_overwrite_with_identical_bytes() {
    let dir = tempdir().unwrap();
    let config = ExportConfig::default()
        .with_exponents([0, 1, 0])
        .with_output_dir(dir.path());
    let expected = PoseidonArtifacts::new(params(), config.compile_options())
        .build_artifact(0)
        .unwrap();

    // A stale, longer file is truncated.
    fs::write(config.artifact_path(0), vec![0xff; expected.len() + 16]).unwrap();

    let source = PoseidonArtifacts::new(params(), config.compile_options());
    let exporter = Exporter::new(config, source);
    exporter.run().unwrap();
    assert_eq!(fs::read(exporter.artifact_path(0)).unwrap(), expected);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_failure_aborts_remaining_exponents() {
    let dir = tempdir().unwrap();
    let config = ExportConfig::default()
        .with_exponents([1, 2, 3, 4])
        .with_output_dir(dir.path());
    let exporter = Exporter::new(config, RecordingSource::new(Some(2)));

    let err = exporter.run().unwrap_err();
    assert!(matches!(err, ExportError::Allocation { log_perm: 3, .. }));
    assert_eq!(*source_calls(&exporter), vec![1, 2, 3]);
    assert!(exporter.artifact_path(1).exists());
    assert!(exporter.artifact_path(2).exists());
    assert!(!exporter.artifact_path(3).exists());
    assert!(!exporter.artifact_path(4).exists());
}

#[test]
fn test_oversized_exponent_is_an_allocation_error() {
    let dir = tempdir().unwrap();
    let config = ExportConfig::default()
        .with_exponents([40])
        .with_output_dir(dir.path());
    let source = PoseidonArtifacts::new(params(), config.compile_options());
    let err = Exporter::new(config, source).run().unwrap_err();
    assert!(matches!(
        err,
        ExportError::Allocation {
            log_perm: 40,
            source: CircuitBuilderError::VariableBudgetExceeded { .. }
        }
    ));
}

#[test]
fn test_unwritable_directory_is_an_io_error() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"").unwrap();
    let config = ExportConfig::default()
        .with_exponents([1])
        .with_output_dir(blocker.join("out"));
    let err = Exporter::new(config, RecordingSource::new(None))
        .run()
        .unwrap_err();
    assert!(matches!(err, ExportError::Io { .. }));
}

#[cfg(unix)]
#[test]
fn test_artifacts_are_world_readable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let config = ExportConfig::default()
        .with_exponents([1])
        .with_output_dir(dir.path());
    let exporter = Exporter::new(config, RecordingSource::new(None));
    exporter.run().unwrap();
    let mode = fs::metadata(exporter.artifact_path(1))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o444, 0o444);
}
