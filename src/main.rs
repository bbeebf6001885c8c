//! Ship CLI and REPL
//!
//! Usage:
//!   ship run <file.ship>   - Execute a Ship file
//!   ship repl              - Start interactive REPL (the default)

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::Level;

use ship::{compile, ShipError, VmConfig, VERSION, VM};

#[derive(Parser)]
#[command(name = "ship", version, about = "The Ship scripting language")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a Ship file
    Run {
        path: PathBuf,
        #[command(flatten)]
        vm: VmArgs,
    },
    /// Start interactive REPL
    Repl {
        #[command(flatten)]
        vm: VmArgs,
    },
}

#[derive(Args, Default)]
struct VmArgs {
    /// Operand stack capacity
    #[arg(long)]
    stack_max: Option<usize>,
    /// Maximum call depth
    #[arg(long)]
    frames_max: Option<usize>,
    /// Heap object count that triggers the first collection
    #[arg(long)]
    gc_threshold: Option<usize>,
    /// Collect garbage before every allocation
    #[arg(long)]
    stress_gc: bool,
}

impl VmArgs {
    fn config(&self) -> VmConfig {
        let defaults = VmConfig::default();
        VmConfig {
            stack_max: self.stack_max.unwrap_or(defaults.stack_max),
            frames_max: self.frames_max.unwrap_or(defaults.frames_max),
            gc_threshold: self.gc_threshold.unwrap_or(defaults.gc_threshold),
            stress_gc: self.stress_gc,
            ..defaults
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Command::Run { path, vm }) => run_file(&path, vm.config()),
        Some(Command::Repl { vm }) => run_repl(vm.config()),
        None => run_repl(VmArgs::default().config()),
    }
}

fn report(err: &ShipError) {
    eprintln!("{}", err.to_string().red());
}

fn run_file(path: &Path, config: VmConfig) -> anyhow::Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("cannot read file '{}'", path.display()))?;

    let config = config.with_file_name(path.display().to_string());
    let mut vm = VM::with_config(config);

    let result = compile(&source, &mut vm.heap).and_then(|function| vm.interpret(function));
    if let Err(err) = result {
        report(&err);
        process::exit(1);
    }
    Ok(())
}

fn run_repl(config: VmConfig) -> anyhow::Result<()> {
    println!(
        "{} {} - {}",
        "Ship".cyan().bold(),
        VERSION.cyan(),
        "a tiny bytecode language".dimmed()
    );
    println!("Type {} to exit\n", "exit".yellow());

    let mut rl = DefaultEditor::new().context("failed to create line editor")?;
    let config = config.with_file_name("<repl>");

    loop {
        match rl.readline(&format!("{} ", "ship>".green().bold())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if matches!(line, "exit" | "quit") {
                    println!("{}", "Goodbye!".cyan());
                    break;
                }

                // Every entry is its own program
                let mut vm = VM::with_config(config.clone());
                let result = compile(line, &mut vm.heap).and_then(|function| vm.interpret(function));
                if let Err(err) = result {
                    report(&err);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".cyan());
                break;
            }
            Err(err) => {
                return Err(err).context("readline failed");
            }
        }
    }
    Ok(())
}
