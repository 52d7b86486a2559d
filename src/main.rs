use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use delbrot::config::{self, Settings};
use delbrot::diagnostics;
use delbrot::{parser, ErrorKind, Interpreter};

#[derive(ClapParser, Debug)]
#[command(
    name = "delbrot",
    version,
    about = "Evaluator for mkvsynth pipeline scripts"
)]
struct Cli {
    /// Path to a script. Reads stdin when omitted.
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,
    /// Directory searched by `import` (default: <config dir>/mkvsynth).
    #[arg(long, value_name = "DIR")]
    plugin_dir: Option<PathBuf>,
    /// Settings file (default: <plugin dir>/delbrot.toml).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Disable coloured diagnostics.
    #[arg(long)]
    no_color: bool,
    /// Print the parsed AST instead of running the script.
    #[arg(long)]
    ast: bool,
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(&cli)?;
    let source = read_source(cli.input.as_deref())?;
    debug!(bytes = source.len(), "source loaded");

    if cli.ast {
        return match parser::parse(&source) {
            Ok(program) => {
                println!("{program:#?}");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                report(&source, &err, settings.color);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let mut interpreter = Interpreter::with_settings(&settings);
    debug!(plugin_dir = %interpreter.plugin_dir().display(), "interpreter ready");
    match interpreter.run_source(&source) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            report(&source, &err, settings.color);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report(source: &str, err: &delbrot::RuntimeError, color: bool) {
    eprintln!("{}", diagnostics::format_fatal(err, color));
    if err.kind() == ErrorKind::Syntax {
        if let Some(span) = err.span() {
            eprintln!("{}", diagnostics::format_snippet(source, span));
        }
    }
}

/// Settings file, then CLI flags on top.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let base_dir = cli
        .plugin_dir
        .clone()
        .or_else(config::default_plugin_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config::default_settings_path(&base_dir));
    let mut settings = Settings::load(&path)?;
    if let Some(dir) = &cli.plugin_dir {
        settings.plugin_dir = Some(dir.clone());
    }
    if cli.no_color {
        settings.color = false;
    }
    Ok(settings)
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn read_source(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read from stdin")?;
            Ok(buf)
        }
    }
}
