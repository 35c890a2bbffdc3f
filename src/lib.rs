// Make the same modules available from the library crate so integration
// tests and the binary can reach them via `netqasm::...`.
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;

pub use crate::core::error::{NetQasmError, Result};
pub use crate::core::executor::Processor;
pub use crate::core::parser::parse_subroutine;
pub use crate::core::subroutine::Subroutine;
