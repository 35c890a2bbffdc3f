use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;

use crate::core::parser::parse_subroutine;

pub fn main_with_opts(input: PathBuf, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Read input file {}", input.display()))?;

    let subroutine = match parse_subroutine(&text) {
        Ok(subroutine) => subroutine,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&subroutine)?);
    } else {
        print!("{}", subroutine);
    }
    Ok(())
}
