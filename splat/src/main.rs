use clap::Parser;
use splat_lib::error::SplatError;
use splat_lib::{
    convert_file, convert_file_async, default_output_path, ConvertOptions, DegenerateRotation,
};
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "PLY to SPLAT converter",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Converts Gaussian splat PLY files into the .splat format"
)]
struct Cli {
    #[arg(value_name = "INPUT", help = "Path to the input PLY file.")]
    input: PathBuf,

    #[arg(
        value_name = "OUTPUT",
        help = "Path to the output file (defaults to the input path with a .splat extension)."
    )]
    output: Option<PathBuf>,

    #[arg(
        short = 'w',
        long = "workers",
        value_name = "WORKERS",
        default_value = "0",
        help = "Set the worker thread count (0 picks one per core)."
    )]
    workers: usize,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Enable asynchronous file I/O."
    )]
    async_mode: bool,

    #[arg(
        long = "identity-on-degenerate",
        default_value = "false",
        help = "Replace zero-length rotations with the identity instead of failing."
    )]
    identity_on_degenerate: bool,
}

fn run(cli: &Cli) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));
    let options = ConvertOptions {
        degenerate_rotation: if cli.identity_on_degenerate {
            DegenerateRotation::Identity
        } else {
            DegenerateRotation::Reject
        },
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.workers)
        .build_global()?;

    println!("Processing {}...", cli.input.display());
    let start = Instant::now();

    let count = if cli.async_mode {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(convert_file_async(&cli.input, &output, &options))?
    } else {
        convert_file(&cli.input, &output, &options)?
    };

    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Conversion finished");
    println!("Successfully saved {} ({} splats)", output.display(), count);
    Ok(count)
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        match e.downcast_ref::<SplatError>() {
            Some(SplatError::Format(_)) => eprintln!("Error processing PLY file: {}", e),
            _ => eprintln!("Error: {}", e),
        }
        process::exit(1);
    }
}
