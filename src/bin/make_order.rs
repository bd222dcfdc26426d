//! make-order - build a permutation file from per-document scores.
//!
//! SCORES is a flat array of f32 LE values, entry `i` scoring old id `i + 1`.
//! Documents are ranked ascending (or descending with `--descending`); ties
//! keep old-id order and NaN ranks last. The document at rank `r` gets new id
//! `r + 1`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use docsort::PermutationWriter;

#[derive(Parser, Debug)]
#[command(name = "make-order", version, about = "Write a permutation file ranking documents by score")]
struct Cli {
    /// Score file (f32 LE per document)
    scores: PathBuf,

    /// Permutation file to write
    output: PathBuf,

    /// Highest score gets id 1
    #[arg(long)]
    descending: bool,
}

fn read_scores(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "{}: length {} is not a multiple of 4",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn run(cli: &Cli) -> Result<()> {
    let scores = read_scores(&cli.scores)?;
    let writer = PermutationWriter::from_scores(&scores, cli.descending);
    writer
        .write_file(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(documents = writer.len(), descending = cli.descending, "permutation written");
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
    if let Err(err) = run(&cli) {
        eprintln!("Error: {:#}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
