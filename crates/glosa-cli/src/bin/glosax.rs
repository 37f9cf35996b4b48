use std::io::{self, Write};
use std::path::Path;
use std::process;

use clap::Parser;

use glosa_core::block::{write_dictzip, DEFAULT_CHUNK_LEN};
use glosa_core::builder::{build_static, BuildError, CompressionMethod};
use glosa_core::dict::{Dictionary, StaticDict};

/// Copy a static dictionary, changing its compression on the way.
///
/// Entries are re-read through the engine, re-sorted under the source's
/// collation and written back out, so this also normalizes files produced
/// by other tools (unsorted entries, missing index, stale length bounds).
#[derive(Parser)]
#[command(name = "glosax", about = "Recompress or normalize a static glosa dictionary")]
struct Cli {
    /// Compression method for the copy
    #[arg(long, default_value = "none")]
    compress: CompressionMethod,

    /// Wrap the output in a dictzip container for random access
    #[arg(long)]
    dictzip: bool,

    /// Verbose diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Source dictionary (plain or dictzip)
    infile: String,

    /// Output dictionary file ('-' for stdout)
    outfile: String,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(err) = run(&cli) {
        eprintln!("glosax: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), BuildError> {
    let mut dict = StaticDict::open(Path::new(&cli.infile), false)?;

    eprintln!("Reading the entries ...");
    let mut entries = Vec::new();
    let mut more = dict.first_entry()?;
    while more {
        let Some(word) = dict.keyword() else { break };
        let word = word.to_owned();
        let sense = dict.description()?.unwrap_or_default();
        entries.push((word, sense));
        more = dict.next_entry()?;
    }

    // carry the source header across; the builder restamps the derived
    // properties (length bounds, index, compression, dict-size, items)
    let properties = dict.properties().clone();

    eprintln!("Sorting and saving the dictionary ...");
    let mut payload = Vec::new();
    let stats = build_static(entries, properties, cli.compress, &mut payload)?;

    let output = if cli.dictzip {
        let mut container = Vec::new();
        write_dictzip(&payload, DEFAULT_CHUNK_LEN, &mut container)?;
        container
    } else {
        payload
    };
    if cli.outfile == "-" {
        io::stdout().write_all(&output)?;
    } else {
        std::fs::write(&cli.outfile, &output)?;
    }

    eprintln!(
        "Wrote {} entries, {} bytes of entry data, {} index anchors",
        stats.entries, stats.data_size, stats.index_anchors
    );
    Ok(())
}
