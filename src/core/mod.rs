//! Core module tree: assembler, execution engine, wire codec and the
//! deferred-value handles tying them together.

pub mod epr;
pub mod error;
pub mod executor;
pub mod futures;
pub mod memory;
pub mod parser;
pub mod qlink;
pub mod strutil;
pub mod subroutine;
#[macro_use]
pub mod debug; // gated debug logging (NETQASM_DEBUG=1) provides debug_log!
