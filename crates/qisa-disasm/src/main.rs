use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};

use qisa_as::{ListingFormat, Session, SessionConfig};

use qisa_disasm::{analyze, load_raw_bin};

#[derive(Parser, Debug)]
#[command(author, version, about = "QISA disassembler CLI", long_about = None)]
struct Cli {
    /// Skip N bytes at start of file before decoding
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Limit bytes decoded (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
    format: OutputFormat,
    /// Qubit topology used to render SMIS/SMIT masks
    #[arg(short, long, value_name = "FILE")]
    topology: Option<PathBuf>,
    /// Quantum opcode map replacing the built-in quantum instructions
    #[arg(short, long, value_name = "FILE")]
    qmap: Option<PathBuf>,
    /// Write output to file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
    /// Input binary path
    #[arg(value_name = "BINFILE")]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// hex word, then the instruction as a comment
    Compact,
    /// instruction, then the hex word as an aligned comment
    Aligned,
    /// instructions, labels, blocks and edges as JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::from_default_env() };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let img = load_raw_bin(&cli.input, cli.skip, cli.len)?;
    tracing::debug!(
        file = %img.name,
        skip = cli.skip,
        len = ?cli.len,
        words = img.word_count(),
        trailing = img.trailing_bytes(),
        "loaded image"
    );
    let mut session = Session::new(SessionConfig::default());
    if let Some(path) = &cli.qmap {
        session.load_qmap_file(path).with_context(|| format!("loading opcode map {}", path.display()))?;
    }
    if let Some(path) = &cli.topology {
        session.load_topology_file(path).with_context(|| format!("loading topology {}", path.display()))?;
    }

    let listing = session.disassemble(&img.bytes).with_context(|| format!("disassembling {}", img.name))?;
    let text = match cli.format {
        OutputFormat::Compact => listing.render(ListingFormat::Compact),
        OutputFormat::Aligned => listing.render(ListingFormat::Aligned),
        OutputFormat::Json => serde_json::to_string_pretty(&analyze(listing))?,
    };
    let failures: Vec<String> = listing
        .errors()
        .map(|(addr, e)| {
            tracing::debug!(addr, %e, "decode failure");
            format!("word {addr}: {e}")
        })
        .collect();

    write_out(cli.out.as_deref(), &text)?;
    for f in &failures {
        eprintln!("{f}");
    }
    anyhow::ensure!(failures.is_empty(), "{} word(s) could not be disassembled", failures.len());
    Ok(())
}

fn write_out(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(p) => std::fs::write(p, text).with_context(|| format!("writing {}", p.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
