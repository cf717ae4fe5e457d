use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use alnkit::alignment::{CodecOpt, STORE_ALL};
use alnkit::pipeline::{self, PipelineOpt};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "alnkit",
    author,
    version,
    about = "Store alignments as differences against the reference",
    arg_required_else_help = true
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,
    /// SAM lines per parallel batch
    #[arg(long = "batch-size", default_value_t = 10_000)]
    batch_size: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive differences from a SAM file and save a compact store (<prefix>.alnz)
    Pack {
        /// Input SAM file (plain or .gz)
        sam: String,
        /// Reference FASTA file
        #[arg(short, long)]
        reference: String,
        /// Output prefix for the store
        #[arg(short, long, default_value = "out")]
        output: String,
        /// Maximum bases stored per difference (default: all)
        #[arg(long = "max-stored")]
        max_stored: Option<usize>,
        /// Keep read sequences even when they can be rebuilt
        #[arg(long = "keep-sequence")]
        keep_sequence: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Restore SAM from a store
    Unpack {
        /// Store file (.alnz)
        store: String,
        /// Reference FASTA file
        #[arg(short, long)]
        reference: String,
        /// Output SAM path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Verify that every record survives the CIGAR and sequence round trip
    Check {
        /// Input SAM file (plain or .gz)
        sam: String,
        /// Reference FASTA file
        #[arg(short, long)]
        reference: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the difference list of every record
    Diff {
        /// Input SAM file (plain or .gz)
        sam: String,
        /// Reference FASTA file
        #[arg(short, long)]
        reference: String,
        /// Output path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        /// Maximum bases stored per difference (default: all)
        #[arg(long = "max-stored")]
        max_stored: Option<usize>,
        /// Fill difference bases from the reference
        #[arg(long)]
        complete: bool,
        #[command(flatten)]
        run: RunArgs,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn pipeline_opt(run: &RunArgs, max_stored: Option<usize>, keep_sequence: bool) -> PipelineOpt {
    PipelineOpt {
        codec: CodecOpt { max_stored: max_stored.unwrap_or(STORE_ALL), keep_sequence },
        threads: run.threads,
        batch_size: run.batch_size,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Pack { sam, reference, output, max_stored, keep_sequence, run } => {
            let opt = pipeline_opt(&run, max_stored, keep_sequence);
            let stats = pipeline::pack_sam(&sam, &reference, &output, opt)?;
            println!("records: {}", stats.records);
            println!("derived: {}", stats.derived);
            println!("skipped: {}", stats.skipped);
            println!("store saved: {}.alnz", output);
            Ok(())
        }
        Commands::Unpack { store, reference, out, run } => {
            let opt = pipeline_opt(&run, None, false);
            pipeline::unpack_store(&store, &reference, out.as_deref(), opt)?;
            Ok(())
        }
        Commands::Check { sam, reference, run } => {
            let opt = pipeline_opt(&run, None, false);
            let stats = pipeline::check_sam(&sam, &reference, opt)?;
            for failure in &stats.failures {
                eprintln!("FAIL {}", failure);
            }
            println!("checked: {}", stats.checked);
            println!("passed: {}", stats.passed);
            if !stats.failures.is_empty() {
                anyhow::bail!("{} records failed the round trip", stats.failures.len());
            }
            Ok(())
        }
        Commands::Diff { sam, reference, out, max_stored, complete, run } => {
            let opt = pipeline_opt(&run, max_stored, false);
            pipeline::diff_sam(&sam, &reference, out.as_deref(), complete, opt)?;
            Ok(())
        }
    }
}
