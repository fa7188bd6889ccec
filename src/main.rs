use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lazytrace::config::Config;
use lazytrace::error::{Error, UnresolvableParameter};
use lazytrace::rewrite::{Action, TraceCall};
use lazytrace::toggle::{ToggleOptions, inspect, toggle};

#[derive(Parser)]
#[command(
    name = "lazytrace",
    about = "Toggle trace logging in the JavaScript/TypeScript function around a line",
    version,
    after_help = "Run toggle twice on the same line to remove the traces again."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add traces to the enclosing function, or remove them if present.
    /// Prints the new source unless --write is given.
    Toggle {
        #[command(flatten)]
        target: Target,

        /// Rewrite FILE in place instead of printing to stdout.
        #[arg(long)]
        write: bool,

        /// Print a JSON summary to stdout (requires --write).
        #[arg(long, requires = "write")]
        json: bool,

        /// Dotted path of the trace call, e.g. logger.debug.
        /// Overrides lazytrace.toml.
        #[arg(long, value_name = "PATH", value_parser = parse_trace_call)]
        trace_call: Option<TraceCall>,

        /// Config file (defaults to the nearest lazytrace.toml above FILE).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Show which function a toggle would act on, and whether it is traced.
    Inspect {
        #[command(flatten)]
        target: Target,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Config file (defaults to the nearest lazytrace.toml above FILE).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Target {
    /// JavaScript or TypeScript source file.
    file: PathBuf,

    /// 1-based line inside the function.
    #[arg(long)]
    line: usize,
}

#[derive(Serialize)]
struct ToggleSummary<'a> {
    name: &'a str,
    action: Action,
    skipped_params: &'a [UnresolvableParameter],
}

fn parse_trace_call(value: &str) -> Result<TraceCall, String> {
    TraceCall::parse(value).ok_or_else(|| format!("'{value}' is not a dotted identifier path"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Toggle {
            target,
            write,
            json,
            trace_call,
            config,
        } => cmd_toggle(target, write, json, trace_call, config),
        Commands::Inspect {
            target,
            json,
            config,
        } => cmd_inspect(target, json, config),
    }
}

fn read_source(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn load_options(file: &Path, config: Option<PathBuf>) -> Result<ToggleOptions, Error> {
    let config = match config {
        Some(path) => Config::load(&path)?,
        None => {
            let dir = file
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            Config::discover(dir)?
        }
    };
    Ok(config.toggle_options(file))
}

fn cmd_toggle(
    target: Target,
    write: bool,
    json: bool,
    trace_call: Option<TraceCall>,
    config: Option<PathBuf>,
) -> Result<(), Error> {
    let source = read_source(&target.file)?;
    let mut options = load_options(&target.file, config)?;
    if let Some(call) = trace_call {
        options.trace = call;
    }

    let toggled = toggle(&source, target.line, &options)?;

    if write {
        std::fs::write(&target.file, &toggled.source)?;
    } else {
        print!("{}", toggled.source);
    }

    if json {
        let summary = ToggleSummary {
            name: toggled.name.as_str(),
            action: toggled.action,
            skipped_params: &toggled.skipped_params,
        };
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        eprintln!("{}: {}", toggled.action, toggled.name);
        for skipped in &toggled.skipped_params {
            eprintln!("  note: {skipped}");
        }
    }
    Ok(())
}

fn cmd_inspect(target: Target, json: bool, config: Option<PathBuf>) -> Result<(), Error> {
    let source = read_source(&target.file)?;
    let options = load_options(&target.file, config)?;
    let inspection = inspect(&source, target.line, &options)?;

    if json {
        println!("{}", serde_json::to_string(&inspection)?);
    } else {
        let state = if inspection.decorated {
            "traced"
        } else {
            "not traced"
        };
        println!(
            "{} ({}, lines {}-{}): {state}",
            inspection.name, inspection.kind, inspection.start_line, inspection.end_line
        );
    }
    Ok(())
}
