mod cli;
mod commands;
mod config;
mod core;

use clap::Parser;

use crate::cli::{Command, NetQasmCli};
use crate::config::load_config;

fn main() -> anyhow::Result<()> {
    let args = NetQasmCli::parse();
    let config = load_config(&args.config)?;

    match args.cmd {
        Command::Inspect { input, json } => commands::inspect::main_with_opts(input, json),
        Command::Run {
            input,
            qubits,
            random_outcomes,
        } => commands::run::main_with_opts(input, qubits, random_outcomes, &config),
    }
}
