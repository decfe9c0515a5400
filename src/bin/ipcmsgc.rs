//! Generate C message layouts from a schema source, or describe their layout.
//!
//! Usage:
//!   ipcmsgc generate SCHEMA [-o DIR | --stdout] [--split] [--legacy-size-field]
//!                           [--permissive-discriminants] [--prefix P]
//!   ipcmsgc describe SCHEMA [--model lp64|ilp32]
//!
//! Without `-o`, generated units are printed to stdout. Any schema error aborts the pass
//! before anything is written and exits with status 1. `RUST_LOG` or `-v` control logging
//! on stderr.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use ipcmsgc::layout::{DataModel, ProtocolLayout};
use ipcmsgc::{generate, load, Cell, Unit};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ipcmsgc", version, about = "Message-layout compiler for tagged-union IPC protocols")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Emit the C units for a schema.
    Generate(GenerateArgs),
    /// Print discriminants and record sizes.
    Describe(DescribeArgs),
}

#[derive(Debug, clap::Args)]
struct GenerateArgs {
    schema: PathBuf,
    /// Directory to write units into
    #[arg(short = 'o', long, conflicts_with = "stdout")]
    out_dir: Option<PathBuf>,
    /// Print units to stdout (the default without -o)
    #[arg(long)]
    stdout: bool,
    /// Header with declarations plus a separate source unit
    #[arg(long)]
    split: bool,
    /// Store `sizeof(record) + count` in the size field
    #[arg(long)]
    legacy_size_field: bool,
    /// Allow two messages to share a discriminant
    #[arg(long)]
    permissive_discriminants: bool,
    /// Symbol prefix (overrides the schema's options)
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    Lp64,
    Ilp32,
}

#[derive(Debug, clap::Args)]
struct DescribeArgs {
    schema: PathBuf,
    #[arg(long, value_enum, default_value = "lp64")]
    model: Model,
}

impl GenerateArgs {
    fn overrides(&self) -> Vec<(String, Cell)> {
        let mut out = Vec::new();
        if self.split {
            out.push(("emit_mode".to_string(), Cell::from("split")));
        }
        if self.legacy_size_field {
            out.push(("size_field".to_string(), Cell::from("legacy")));
        }
        if self.permissive_discriminants {
            out.push(("discriminants".to_string(), Cell::from("permissive")));
        }
        if let Some(prefix) = &self.prefix {
            out.push(("prefix".to_string(), Cell::from(prefix.as_str())));
        }
        out
    }
}

fn read_schema(path: &Path) -> Result<(String, String)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((source, name))
}

fn run_generate(args: &GenerateArgs) -> Result<()> {
    let (source, name) = read_schema(&args.schema)?;
    let (resolved, config) =
        load(&source, &args.overrides()).with_context(|| format!("{}", args.schema.display()))?;
    debug!(?config, "resolved configuration");
    let units = generate(&resolved, &config, &name)
        .with_context(|| format!("generating from {}", args.schema.display()))?;

    match &args.out_dir {
        Some(dir) => write_units(dir, &units)?,
        None => {
            let mut stdout = io::stdout().lock();
            for (i, unit) in units.iter().enumerate() {
                if i > 0 {
                    writeln!(stdout)?;
                }
                stdout.write_all(unit.text.as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Stage every unit in a temp file inside `dir`, then move them into place. A failed run
/// leaves none of its units behind.
fn write_units(dir: &Path, units: &[Unit]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut staged = Vec::with_capacity(units.len());
    for unit in units {
        let path = dir.join(&unit.name);
        if path.is_dir() {
            bail!("{} is a directory", path.display());
        }
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("staging {}", path.display()))?;
        tmp.write_all(unit.text.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        staged.push((tmp, path, unit.text.len()));
    }
    for (tmp, path, bytes) in staged {
        tmp.persist(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), bytes, "wrote unit");
    }
    Ok(())
}

fn run_describe(args: &DescribeArgs) -> Result<()> {
    let (source, _) = read_schema(&args.schema)?;
    let (resolved, config) =
        load(&source, &[]).with_context(|| format!("{}", args.schema.display()))?;
    let model = match args.model {
        Model::Lp64 => DataModel::Lp64,
        Model::Ilp32 => DataModel::Ilp32,
    };
    let layout = ProtocolLayout::compute(&resolved, model)?;

    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "{:<24} {:<24} {:>6} {:>6} {:>6}  description",
        "name", "record", "tag", "size", "elem"
    )?;
    for ((def, tag), l) in resolved.messages().zip(&layout.messages) {
        let elem = l
            .element_size()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        writeln!(
            stdout,
            "{:<24} {:<24} {:>6} {:>6} {:>6}  {}",
            def.name,
            config.record_name(&def.short_name),
            tag,
            l.structural_size,
            elem,
            def.description().unwrap_or("-")
        )?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Describe(args) => run_describe(args),
    }
}
