use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;

use crate::config::Config;
use crate::core::executor::{
    NoopBackend, NoopNetworkStack, Processor, QuantumBackend, RandomOutcomeBackend,
};
use crate::core::memory::MemoryValue;
use crate::core::parser::parse_subroutine;

pub fn main_with_opts(
    input: PathBuf,
    qubits: Option<usize>,
    random_outcomes: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Read input file {}", input.display()))?;

    let subroutine = match parse_subroutine(&text) {
        Ok(subroutine) => subroutine,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let backend: Box<dyn QuantumBackend> = if random_outcomes {
        Box::new(RandomOutcomeBackend)
    } else {
        Box::new(NoopBackend)
    };
    let mut processor = Processor::new(config.node_id, backend);
    processor.set_network_stack(Box::new(NoopNetworkStack::default()));

    let app_id = subroutine.app_id;
    processor.init_new_application(app_id, qubits.unwrap_or(config.max_qubits));

    if let Err(err) = processor.execute_subroutine(subroutine) {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }

    let handle = processor.shared_memory(app_id)?;
    let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    println!("{}", format!("Shared memory of app {}:", app_id).bold());
    for (register, value) in memory.registers() {
        println!("  {} = {}", register, value);
    }
    for (address, value) in memory.dump() {
        match value {
            MemoryValue::Scalar(scalar) => println!("  @{} = {}", address, scalar),
            MemoryValue::Array(entries) => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|entry| match entry {
                        Some(value) => value.to_string(),
                        None => "-".to_string(),
                    })
                    .collect();
                println!("  @{} = [{}]", address, rendered.join(", "));
            }
        }
    }
    Ok(())
}
