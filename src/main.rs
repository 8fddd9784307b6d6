//! seqorder: external-memory ordering for biological sequence records.
//!
//! Usage: seqorder <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use seqorder::commands::{SortCommand, SortKey};
use seqorder::config::ToolConfig;
use seqorder::error::Result;
use seqorder::index;

#[derive(Parser)]
#[command(name = "seqorder")]
#[command(version)]
#[command(about = "seqorder: sort FASTA/FASTQ files by content, name or reference coordinate", long_about = None)]
struct Cli {
    /// Number of threads handed to external tools (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Scratch directory for spilled runs and subprocess temp files
    #[arg(long, global = true)]
    tempdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort sequence files
    Sort {
        /// Input FASTA/FASTQ files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Ordering key: seq, name or coordinate
        #[arg(short, long, default_value = "seq")]
        key: String,

        /// Reference file to map against (required with --key coordinate)
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Directory the aligner index is materialized under
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Records held in memory before a sort run spills to disk
        #[arg(long, default_value_t = seqorder::commands::sort::DEFAULT_MAX_ITEMS_IN_MEMORY)]
        max_in_memory: usize,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build (or reuse) the aligner index for a reference
    Index {
        /// Reference FASTA file
        reference: PathBuf,

        /// Directory to materialize the index under
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut config = ToolConfig::new();
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    if let Some(tempdir) = cli.tempdir {
        config = config.with_scratch_dir(tempdir);
    }

    let result = match cli.command {
        Commands::Sort {
            inputs,
            key,
            reference,
            index_dir,
            max_in_memory,
            output,
        } => run_sort(&config, inputs, key, reference, index_dir, max_in_memory, output),

        Commands::Index {
            reference,
            directory,
        } => run_index(&config, reference, directory),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_sort(
    config: &ToolConfig,
    inputs: Vec<PathBuf>,
    key: String,
    reference: Option<PathBuf>,
    index_dir: Option<PathBuf>,
    max_in_memory: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let key: SortKey = key.parse()?;
    let mut cmd = SortCommand::new(key).with_memory_budget(max_in_memory);
    if let Some(reference) = reference {
        cmd = cmd.with_reference(reference);
    }
    if let Some(dir) = index_dir {
        cmd = cmd.with_index_dir(dir);
    }

    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            cmd.run(config, &inputs, &mut file)
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            cmd.run(config, &inputs, &mut handle)
        }
    }
}

fn run_index(
    config: &ToolConfig,
    reference: PathBuf,
    directory: Option<PathBuf>,
) -> Result<()> {
    let index_path = index::get_or_create_index(config, &reference, directory.as_deref())?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", index_path.display())?;
    Ok(())
}
