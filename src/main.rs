//! smalls CLI.
//!
//! `smalls <source-file>` compiles one Scheme file and prints the AST
//! dump to stdout; diagnostics go to stderr and a non-zero error count
//! becomes a failing exit code.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use smalls::CompilerConfig;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "smalls")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "smalls Scheme compiler front end", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Input Scheme source file
    input: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the parsed datums before the AST dump
    #[arg(long)]
    dump_syntax: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "smalls", &mut io::stdout());
        return;
    }

    let input = match cli.input {
        Some(input) => input,
        None => {
            eprintln!("Error: no input file. Usage: smalls <source-file>");
            process::exit(2);
        }
    };

    let mut config = match &cli.config {
        Some(path) => match CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::new(),
    };
    if cli.dump_syntax {
        config.dump_syntax = true;
    }

    match smalls::compile_file(&input, &config) {
        Ok(result) => {
            if config.dump_syntax {
                print!("{}", result.dump_forms());
                println!();
            }
            print!("{}", result.dump_ast());

            if result.error_count() != 0 {
                eprintln!("{} error(s)", result.error_count());
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
