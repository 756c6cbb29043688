use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use qisa_as::{Error, Options, Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Assemble QISA source into a binary program")]
struct Opts {
    /// Qubit topology (.NumQubits / .NumDirEdge / .EdgeList)
    #[arg(short, long, value_name = "FILE", required_unless_present = "dump_spec")]
    topology: Option<PathBuf>,
    /// Quantum opcode map replacing the built-in quantum instructions
    #[arg(short, long, value_name = "FILE")]
    qmap: Option<PathBuf>,
    /// Output binary (default: input with a .bin extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Print the assembled words as hex
    #[arg(long)]
    hex: bool,
    /// With --hex, also print each word in binary
    #[arg(long, requires = "hex")]
    binary: bool,
    /// Print the active opcode tables in QMAP format and exit
    #[arg(long)]
    dump_spec: bool,
    /// Accept a label defined twice; the last definition wins
    #[arg(long)]
    allow_label_redefinition: bool,
    /// Export the label table as JSON (Vec<{ name, addr }>)
    #[arg(long, value_name = "FILE")]
    labels_out: Option<PathBuf>,
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
    #[arg(value_name = "SOURCE", required_unless_present = "dump_spec")]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let filter = if opts.verbose { EnvFilter::new("debug") } else { EnvFilter::from_default_env() };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut options = Options::empty();
    options.set(Options::ALLOW_LABEL_REDEFINITION, opts.allow_label_redefinition);
    let mut session = Session::new(SessionConfig { options, ..SessionConfig::default() });

    if let Some(path) = &opts.qmap {
        session.load_qmap_file(path).with_context(|| format!("loading opcode map {}", path.display()))?;
    }
    if opts.dump_spec {
        print!("{}", session.registry().dump_specification());
        return Ok(());
    }
    if let Some(path) = &opts.topology {
        session.load_topology_file(path).with_context(|| format!("loading topology {}", path.display()))?;
    }

    let input = opts.input.context("no source file given")?;
    let program = match session.assemble_file(&input) {
        Ok(p) => p,
        Err(Error::Assembly(diags)) => {
            eprintln!("{diags}");
            anyhow::bail!("{}: {} error(s)", input.display(), diags.len());
        }
        Err(e) => return Err(e.into()),
    };

    if opts.hex {
        for line in program.hex_strings(opts.binary) {
            println!("{line}");
        }
    }
    if let Some(path) = &opts.labels_out {
        let json = serde_json::to_string_pretty(&program.labels)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    let output = opts.output.unwrap_or_else(|| input.with_extension("bin"));
    anyhow::ensure!(output != input, "output would overwrite the source file");
    session.save(&output)?;
    tracing::info!(output = %output.display(), "done");
    Ok(())
}
