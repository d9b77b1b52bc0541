//! kernel-il - CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kernel_il::driver::CompileUnit;
use kernel_il::il::printer::{GraphPrinter, GraphSummary, PrinterConfig};
use kernel_il::util::config::BuilderConfig;
use kernel_il::util::logger::{self, LogLevel};
use kernel_il::{read_program, NAME, VERSION};
use std::path::PathBuf;

/// Build IL flow graphs from kernel programs
#[derive(Parser, Debug)]
#[command(name = "kernel-il")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the flow graphs of a JSON kernel program
    Dump {
        /// Kernel program
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only this function (`Class.member` or a top-level name)
        #[arg(short, long)]
        function: Option<String>,

        /// Builder configuration (RON)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Show token positions
        #[arg(long)]
        positions: bool,
    },

    /// List the functions that have a graph
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the default builder configuration
    Config,

    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_with_level(if args.verbose { LogLevel::Debug } else { LogLevel::Warn });

    match args.command {
        Commands::Dump {
            file,
            function,
            config,
            format,
            positions,
        } => {
            let config = match config {
                Some(path) => BuilderConfig::load(&path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?,
                None => BuilderConfig::default(),
            };
            let program = read_program(&file)?;
            let unit = CompileUnit::new(&program, config).context("Failed to load program")?;
            let functions = match function {
                Some(name) => match unit.lookup(&name) {
                    Some(id) => vec![id],
                    None => bail!("no function named '{}'", name),
                },
                None => unit.compilable_functions(),
            };

            let printer = GraphPrinter::with_config(PrinterConfig {
                show_positions: positions,
                ..PrinterConfig::default()
            })
            .with_store(unit.store());
            let mut summaries = Vec::new();
            let mut failures = 0;
            for (id, result) in unit.compile_all(&functions) {
                match result {
                    Ok(graph) => match format {
                        Format::Text => println!("{}", printer.render(&graph)),
                        Format::Json => summaries.push(GraphSummary::new(&graph)),
                    },
                    Err(err) => {
                        failures += 1;
                        eprintln!("{}: {}", unit.store().qualified_name(id), err);
                    }
                }
            }
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
            if failures > 0 {
                bail!("{} of {} functions failed", failures, functions.len());
            }
        }
        Commands::List { file } => {
            let program = read_program(&file)?;
            let unit = CompileUnit::new(&program, BuilderConfig::default()).context("Failed to load program")?;
            for id in unit.compilable_functions() {
                let function = unit.store().function(id);
                println!("{:<40} {:?}", unit.store().qualified_name(id), function.kind);
            }
        }
        Commands::Config => {
            println!("{}", BuilderConfig::default().to_ron_string()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
