//! Data model for parsed NetQASM subroutines: operands, commands and the
//! subroutine container itself.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::core::error::{NetQasmError, Result};

/// Fixed symbols of the text grammar.
pub struct Symbols;

impl Symbols {
    pub const COMMENT_START: &'static str = "//";
    pub const BRANCH_END: char = ':';
    pub const MACRO_END: char = '!';
    pub const ADDRESS_START: char = '@';
    pub const ARGS_BRACKETS: (char, char) = ('(', ')');
    pub const ARGS_DELIM: char = ',';
    pub const INDEX_BRACKETS: (char, char) = ('[', ']');

    pub const PREAMBLE_START: char = '#';
    pub const PREAMBLE_NETQASM: &'static str = "NETQASM";
    pub const PREAMBLE_APPID: &'static str = "APPID";
    pub const PREAMBLE_DEFINE: &'static str = "DEFINE";
    pub const PREAMBLE_DEFINE_BRACKETS: (char, char) = ('{', '}');
}

/// Register groups: standard, constants, qubit addresses, measurement
/// outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RegisterName {
    R,
    C,
    Q,
    M,
}

/// Number of registers per group.
pub const REGISTERS_PER_GROUP: u32 = 16;

impl RegisterName {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'R' => Some(RegisterName::R),
            'C' => Some(RegisterName::C),
            'Q' => Some(RegisterName::Q),
            'M' => Some(RegisterName::M),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            RegisterName::R => 'R',
            RegisterName::C => 'C',
            RegisterName::Q => 'Q',
            RegisterName::M => 'M',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Register {
    pub name: RegisterName,
    pub index: u32,
}

impl Register {
    pub fn new(name: RegisterName, index: u32) -> Result<Self> {
        if index >= REGISTERS_PER_GROUP {
            return Err(NetQasmError::syntax(format!(
                "register index {} out of range (max {})",
                index,
                REGISTERS_PER_GROUP - 1
            )));
        }
        Ok(Register { name, index })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name.letter(), self.index)
    }
}

/// A constant or a register, used as the base or index of a memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Value {
    Constant(i64),
    Register(Register),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "{}", c),
            Value::Register(r) => write!(f, "{}", r),
        }
    }
}

/// A shared-memory address, optionally indexing into an array.
///
/// A register base or index makes the address indirect: the register cell is
/// read at execution time to obtain the actual address or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryAddress {
    pub base: Value,
    pub index: Option<Value>,
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Symbols::ADDRESS_START, self.base)?;
        if let Some(index) = &self.index {
            write!(
                f,
                "{}{}{}",
                Symbols::INDEX_BRACKETS.0,
                index,
                Symbols::INDEX_BRACKETS.1
            )?;
        }
        Ok(())
    }
}

/// Closed operand set. `Label` only survives until branch-label resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Operand {
    Constant(i64),
    Register(Register),
    Address(MemoryAddress),
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(c) => write!(f, "{}", c),
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Address(a) => write!(f, "{}", a),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

/// Operand kind expected at a given position of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Register or constant resolving to a virtual qubit address.
    Qubit,
    /// Constant, register or addressed cell whose value is read.
    Read,
    /// Register or addressed cell that is written to; never a constant.
    Write,
    /// A memory address operand itself (allocation target, array base).
    Address,
}

/// Closed instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Instruction {
    Set,
    Load,
    Store,
    Array,
    Add,
    Addm,
    Qalloc,
    Qfree,
    Init,
    H,
    X,
    Cnot,
    Meas,
    Beq,
    Bne,
    Blt,
    Bge,
    Wait,
    CreateEpr,
    RecvEpr,
}

static INSTRUCTION_NAMES: Lazy<HashMap<&'static str, Instruction>> = Lazy::new(|| {
    use Instruction::*;
    HashMap::from([
        ("set", Set),
        ("load", Load),
        ("store", Store),
        ("array", Array),
        ("add", Add),
        ("addm", Addm),
        ("qalloc", Qalloc),
        ("qfree", Qfree),
        ("init", Init),
        ("h", H),
        ("x", X),
        ("cnot", Cnot),
        ("meas", Meas),
        ("beq", Beq),
        ("bne", Bne),
        ("blt", Blt),
        ("bge", Bge),
        ("wait", Wait),
        ("create_epr", CreateEpr),
        ("recv_epr", RecvEpr),
    ])
});

pub fn string_to_instruction(name: &str) -> Result<Instruction> {
    INSTRUCTION_NAMES.get(name).copied().ok_or_else(|| {
        NetQasmError::instruction(format!("'{}' is not a known instruction", name))
    })
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        use Instruction::*;
        match self {
            Set => "set",
            Load => "load",
            Store => "store",
            Array => "array",
            Add => "add",
            Addm => "addm",
            Qalloc => "qalloc",
            Qfree => "qfree",
            Init => "init",
            H => "h",
            X => "x",
            Cnot => "cnot",
            Meas => "meas",
            Beq => "beq",
            Bne => "bne",
            Blt => "blt",
            Bge => "bge",
            Wait => "wait",
            CreateEpr => "create_epr",
            RecvEpr => "recv_epr",
        }
    }

    /// Number of immediate arguments and the operand kind per position,
    /// checked before any handler body runs.
    pub fn signature(&self) -> (usize, &'static [OperandKind]) {
        use Instruction::*;
        use OperandKind::*;
        match self {
            Set => (0, &[Write, Read]),
            Load => (0, &[Write, Read]),
            Store => (0, &[Write, Read]),
            Array => (1, &[Address]),
            Add => (0, &[Write, Read, Read]),
            Addm => (0, &[Write, Read, Read, Read]),
            Qalloc | Qfree | Init | H | X => (0, &[Qubit]),
            Cnot => (0, &[Qubit, Qubit]),
            Meas => (0, &[Qubit, Write]),
            Beq | Bne | Blt | Bge => (0, &[Read, Read, Read]),
            Wait => (0, &[Read]),
            CreateEpr => (2, &[Address, Address, Address]),
            RecvEpr => (2, &[Address, Address]),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub instruction: Instruction,
    pub args: Vec<i64>,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instruction)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(
                f,
                "{}{}{}",
                Symbols::ARGS_BRACKETS.0,
                args.join(&Symbols::ARGS_DELIM.to_string()),
                Symbols::ARGS_BRACKETS.1
            )?;
        }
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Pseudo-command marking a jump target. Removed by label resolution; a
/// final `Subroutine` never contains one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProtoCommand {
    Command(Command),
    BranchLabel(String),
}

impl fmt::Display for ProtoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoCommand::Command(c) => write!(f, "{}", c),
            ProtoCommand::BranchLabel(name) => write!(f, "{}{}", name, Symbols::BRANCH_END),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subroutine {
    pub netqasm_version: String,
    pub app_id: u32,
    pub commands: Vec<Command>,
}

impl Subroutine {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Display for Subroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Subroutine (netqasm_version={}, app_id={}):",
            self.netqasm_version, self.app_id
        )?;
        for (i, command) in self.commands.iter().enumerate() {
            writeln!(f, "{:>4} {}", i, command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_display_round() {
        let command = Command {
            instruction: Instruction::Array,
            args: vec![4],
            operands: vec![Operand::Address(MemoryAddress {
                base: Value::Constant(2),
                index: None,
            })],
        };
        assert_eq!(command.to_string(), "array(4) @2");
    }

    #[test]
    fn address_display_with_register_index() {
        let address = MemoryAddress {
            base: Value::Constant(0),
            index: Some(Value::Register(Register { name: RegisterName::R, index: 1 })),
        };
        assert_eq!(address.to_string(), "@0[R1]");
    }

    #[test]
    fn unknown_instruction_is_instruction_error() {
        let err = string_to_instruction("frobnicate").unwrap_err();
        assert!(matches!(err, NetQasmError::Instruction(_)));
    }

    #[test]
    fn register_index_range_checked() {
        assert!(Register::new(RegisterName::R, 15).is_ok());
        assert!(Register::new(RegisterName::R, 16).is_err());
    }
}
