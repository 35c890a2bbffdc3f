use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "netqasm",
    about = "NetQASM: assemble, inspect and execute quantum network subroutines",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct NetQasmCli {
    /// Global: path to config (TOML); default: ~/.netqasm/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a subroutine and print its resolved command list
    ///
    /// Examples:
    ///   netqasm inspect program.nqasm
    ///   netqasm inspect program.nqasm --json
    Inspect {
        /// Input file (NetQASM text)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Print the parsed subroutine as JSON
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
    },

    /// Parse and execute a subroutine, then dump the shared memory
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Size of the application's qubit unit module
        #[arg(long = "qubits", value_name = "N")]
        qubits: Option<usize>,

        /// Draw random measurement outcomes instead of always zero
        #[arg(long = "random-outcomes", action = ArgAction::SetTrue)]
        random_outcomes: bool,
    },
}
