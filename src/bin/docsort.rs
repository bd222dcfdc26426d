//! docsort - rewrite a document store into permutation order.
//!
//! Usage:
//!   docsort SOURCE PERMUTATION TEMP_DIR DESTINATION [--flush-size N] [--group-size N]
//!           [--auto-tune] [--keep-group-files] [--clean-stale-groups]
//!           [--validate-permutation] [--quiet]
//!
//! Exit status is 0 on success and 1 on any error, with the error on stderr.
//! Set RUST_LOG (e.g. `RUST_LOG=docsort=debug`) for structured logs on stderr.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use docsort::{
    remap_store, ConsoleProgress, DocStore, DocStoreWriter, PermutationReader, RemapConfig,
    RemapObserver, SortError, SourceStore, TracingObserver, TuningProfile,
};

#[derive(Parser, Debug)]
#[command(name = "docsort", version, about = "Reorder a document store by a permutation file")]
struct Cli {
    /// Source document store directory
    source: PathBuf,

    /// Permutation file: u32 LE target id per old id, slot 0 reserved
    permutation: PathBuf,

    /// Directory for temporary group files
    temp_dir: PathBuf,

    /// Destination store directory (must not already hold a store)
    destination: PathBuf,

    /// Staged records before spilling to group files
    #[arg(long)]
    flush_size: Option<usize>,

    /// Target ids per group file
    #[arg(long)]
    group_size: Option<u32>,

    /// Derive flush and group sizes from available memory
    #[arg(long)]
    auto_tune: bool,

    /// Leave group files in TEMP_DIR after replay
    #[arg(long)]
    keep_group_files: bool,

    /// Delete group files left by an earlier run instead of failing
    #[arg(long)]
    clean_stale_groups: bool,

    /// Fail on zero or duplicate target ids before scanning
    #[arg(long)]
    validate_permutation: bool,

    /// No progress output on stdout
    #[arg(long, short)]
    quiet: bool,
}

impl Cli {
    fn remap_config(&self, source: &DocStore) -> RemapConfig {
        let mut config = RemapConfig {
            keep_group_files: self.keep_group_files,
            clean_stale_groups: self.clean_stale_groups,
            validate_permutation: self.validate_permutation,
            ..RemapConfig::default()
        };
        if self.auto_tune {
            let avg = source.average_payload_bytes().unwrap_or(0);
            let profile = TuningProfile::auto_tune(avg);
            info!(
                flush_size = profile.flush_size,
                group_size = profile.group_size,
                budget_mb = profile.budget_bytes / (1024 * 1024),
                avg_payload = avg,
                "auto-tuned"
            );
            config = profile.apply(config);
        }
        if let Some(flush_size) = self.flush_size {
            config.flush_size = flush_size;
        }
        if let Some(group_size) = self.group_size {
            config.group_size = group_size;
        }
        config
    }
}

fn run(cli: &Cli) -> Result<()> {
    let source = DocStore::open(&cli.source)
        .with_context(|| format!("opening source store {}", cli.source.display()))?;
    let permutation = PermutationReader::open(&cli.permutation)
        .with_context(|| format!("opening permutation {}", cli.permutation.display()))?;
    let config = cli.remap_config(&source);

    let mut dest = DocStoreWriter::create(&cli.destination)
        .with_context(|| format!("creating destination store {}", cli.destination.display()))?;

    let mut observer: Box<dyn RemapObserver> = if cli.quiet {
        Box::new(TracingObserver::new())
    } else {
        Box::new(ConsoleProgress::new(
            io::stdout(),
            cli.source.display().to_string(),
        ))
    };

    let stats = remap_store(
        &source,
        &permutation,
        &cli.temp_dir,
        &mut dest,
        config,
        observer.as_mut(),
    )?;

    info!(
        written = stats.records_written,
        buckets = stats.buckets_replayed,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<SortError>() {
                Some(SortError::EmptySource) => eprintln!("empty!"),
                Some(sort_err) => eprintln!("Error [{}]: {:#}", sort_err.code(), err),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
