//! GraphPort command-line interface.
//!
//! Converts detector checkpoints into portable inference-graph artifacts
//! and inspects existing artifacts.
//!
//! # Commands
//!
//! - `graphport convert <input> [output]` - run the full conversion
//!   pipeline; output defaults to the input path with the `.irg`
//!   extension
//! - `graphport inspect <artifact>` - print an artifact's declared
//!   signatures and counts

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use burn::backend::NdArray;
use convert_engine::{ConvertError, Converter, ExportConfig};
use graph_ir::load_graph_file;

/// CPU backend used for tracing.
type Cpu = NdArray;

/// Convert detector checkpoints to portable inference graphs.
#[derive(Parser)]
#[command(name = "graphport")]
#[command(about = "Convert detector checkpoints to portable inference graphs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a checkpoint into a graph artifact
    Convert {
        /// Path to the input checkpoint
        input: PathBuf,

        /// Output artifact path (defaults to the input with `.irg`)
        output: Option<PathBuf>,

        /// Square input size traced through the model
        #[arg(long, default_value_t = 640)]
        input_size: usize,

        /// Target opset version
        #[arg(long, default_value_t = 12)]
        opset: u32,

        /// Disable constant folding of the exported graph
        #[arg(long)]
        no_fold: bool,
    },

    /// Print an artifact's signatures and counts
    Inspect {
        /// Path to the graph artifact
        artifact: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Convert {
            input,
            output,
            input_size,
            opset,
            no_fold,
        } => convert(&input, output, input_size, opset, no_fold),
        Commands::Inspect { artifact } => inspect(&artifact),
    }
}

/// Default artifact path: the input path with the `.irg` extension.
fn default_output(input: &Path) -> PathBuf {
    input.with_extension("irg")
}

fn convert(
    input: &Path,
    output: Option<PathBuf>,
    input_size: usize,
    opset: u32,
    no_fold: bool,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_output(input));
    let config = ExportConfig::default()
        .with_input_size(input_size)
        .with_opset(opset)
        .with_constant_folding(!no_fold);

    println!("Converting {} -> {}", input.display(), output.display());
    let report = match Converter::<Cpu>::new().convert(input, &output, &config) {
        Ok(report) => report,
        Err(err) => {
            if let ConvertError::Resolution(failure) = &err {
                eprintln!("{failure}");
            }
            return Err(err).context("conversion failed");
        }
    };

    if !report.attempts.is_empty() {
        println!("Strategies declined before resolution:");
        for attempt in &report.attempts {
            println!("  - {attempt}");
        }
    }
    println!("Resolved via {} checkpoint", report.source);
    for sig in &report.artifact.inputs {
        println!("  input  {sig}");
    }
    for sig in &report.artifact.outputs {
        println!("  output {sig}");
    }
    println!(
        "Wrote {} ({:.2} MiB, {} nodes, opset {})",
        report.artifact.path.display(),
        report.artifact.size_mib(),
        report.artifact.node_count,
        report.artifact.opset,
    );
    Ok(())
}

fn inspect(artifact: &Path) -> anyhow::Result<()> {
    let graph = load_graph_file(artifact)
        .with_context(|| format!("failed to load {}", artifact.display()))?;

    println!("{}", artifact.display());
    println!("  producer: {}", graph.producer);
    println!("  opset:    {}", graph.opset);
    for (key, value) in &graph.metadata {
        println!("  {key}: {value}");
    }
    for sig in &graph.inputs {
        println!("  input  {sig}");
    }
    for sig in &graph.outputs {
        println!("  output {sig}");
    }
    println!(
        "  {} nodes, {} initializers, {} parameters",
        graph.nodes.len(),
        graph.initializers.len(),
        graph.parameter_count(),
    );
    Ok(())
}
