//! `tmlc` — the TML compiler driver.
//!
//! Exit codes: 0 on success, 1 when any error-severity diagnostic was
//! recorded (user error), 2 on internal errors (compiler bugs, including
//! panics on well-formed input).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::error;

use tml::diagnostics::{render_json, render_text};
use tml::resolver::FsFileProvider;
use tml::session::{Options, Session};

#[derive(Parser, Debug)]
#[command(name = "tmlc", version, about = "Compiler for the TML programming language")]
struct Cli {
    /// Root source file (`.tml`).
    file: PathBuf,

    /// Write textual LLVM IR here.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write canonical IR (S-expressions) here.
    #[arg(long)]
    emit_ir: Option<PathBuf>,

    /// Emit diagnostics as JSON instead of colored text.
    #[arg(long)]
    json_diagnostics: bool,

    /// Target triple for the LLVM module header.
    #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
    target: String,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let options = Options {
        target_triple: cli.target.clone(),
        json_diagnostics: cli.json_diagnostics,
        ..Options::default()
    };
    let mut session = Session::new(options);

    let output = tml::compile(&mut session, &FsFileProvider, &cli.file);

    let diagnostics = session.diagnostics.entries();
    if !diagnostics.is_empty() {
        let rendered = if cli.json_diagnostics {
            render_json(&session.source_map, &diagnostics)
        } else {
            render_text(&session.source_map, &diagnostics)
        };
        eprintln!("{rendered}");
    }

    // Internal invariant violations are compiler bugs, not user errors.
    if diagnostics.iter().any(|d| d.code == "E0900") {
        return Ok(ExitCode::from(2));
    }
    if session.has_errors() {
        return Ok(ExitCode::from(1));
    }

    if let (Some(path), Some(ir)) = (&cli.emit_ir, &output.canonical_ir) {
        std::fs::write(path, ir).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(llvm) = &output.llvm_ir {
        match &cli.output {
            Some(path) => {
                std::fs::write(path, llvm)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            None => print!("{llvm}"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if let Err(err) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("failed to initialize logging: {err}");
    }

    // A panic on well-formed input is a compiler bug: exit 2.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(&cli))) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
        Err(_) => {
            eprintln!("internal compiler error: unexpected panic");
            ExitCode::from(2)
        }
    }
}
