use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::process;

use clap::Parser;

use glosa_cli::source::{parse_entries, parse_properties, LineCursor};
use glosa_core::block::{write_dictzip, DEFAULT_CHUNK_LEN};
use glosa_core::builder::{build_static, BuildError, CompressionMethod};

#[derive(Parser)]
#[command(name = "mkglosa", about = "Glosa static dictionary build tool")]
struct Cli {
    /// The input file starts directly with entries, without a property header
    #[arg(long)]
    no_header: bool,

    /// Read additional properties from this file ('-' for stdin); they
    /// override properties from the input header
    #[arg(long)]
    header_file: Option<String>,

    /// Override the dictionary id
    #[arg(long)]
    id: Option<String>,

    /// Compression method for entry payloads
    #[arg(long, default_value = "none")]
    compress: CompressionMethod,

    /// Wrap the output in a dictzip container for random access
    #[arg(long)]
    dictzip: bool,

    /// Verbose diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Input text source ('-' for stdin)
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
        eprintln!("mkglosa: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), BuildError> {
    let text = read_input(&cli.infile)?;
    let mut cursor = LineCursor::new(&text);

    let mut properties = BTreeMap::new();
    if !cli.no_header {
        parse_properties(&mut cursor, &mut properties)?;
    }

    eprintln!("Reading the entries ...");
    let entries = parse_entries(&mut cursor)?;

    if let Some(header_file) = &cli.header_file {
        let header_text = read_input(header_file)?;
        let mut header_cursor = LineCursor::new(&header_text);
        parse_properties(&mut header_cursor, &mut properties)?;
    }
    if let Some(id) = &cli.id {
        properties.insert("id".to_owned(), id.clone());
    }

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
    write_output(&cli.outfile, &output)?;

    eprintln!(
        "Wrote {} entries, {} bytes of entry data, {} index anchors",
        stats.entries, stats.data_size, stats.index_anchors
    );
    Ok(())
}

fn read_input(path: &str) -> Result<String, BuildError> {
    if path == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &str, bytes: &[u8]) -> Result<(), BuildError> {
    if path == "-" {
        io::stdout().write_all(bytes)?;
        Ok(())
    } else {
        Ok(fs::write(path, bytes)?)
    }
}
