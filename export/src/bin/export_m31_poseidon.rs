use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use layered_circuit::DEFAULT_COMPRESS_THRESHOLD;
use layered_export::{
    DEFAULT_EXPONENTS, DEFAULT_EXTENSION, DEFAULT_OUTPUT_DIR, ExportConfig, Exporter,
    PoseidonArtifacts,
};
use layered_poseidon::PoseidonParams;
use p3_mersenne_31::Mersenne31;
use tracing::info;
use tracing_forest::ForestLayer;
use tracing_forest::util::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Export layered circuits checking batches of Poseidon permutations over Mersenne-31"
)]
struct Args {
    /// Directory the artifacts are written to.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Base-2 logarithms of the batch sizes, in export order.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_EXPONENTS)]
    exponents: Vec<u32>,

    #[arg(
        long,
        default_value_t = DEFAULT_COMPRESS_THRESHOLD,
        help = "Maximum number of gates a fused node may hold"
    )]
    compress_threshold: usize,

    /// Artifact file extension, without the dot.
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    extension: String,
}

fn init_logger() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    Registry::default()
        .with(env_filter)
        .with(ForestLayer::default())
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();

    let args = Args::parse();
    let config = ExportConfig {
        exponents: args.exponents,
        output_dir: args.output_dir,
        extension: args.extension,
        compress_threshold: args.compress_threshold,
    };
    info!(
        output_dir = %config.output_dir.display(),
        exponents = ?config.exponents,
        "starting export"
    );

    let source = PoseidonArtifacts::new(
        Arc::new(PoseidonParams::<Mersenne31>::new()),
        config.compile_options(),
    );
    Exporter::new(config, source).run()?;
    Ok(())
}
