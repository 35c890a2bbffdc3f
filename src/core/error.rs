use std::fmt;

/// Error taxonomy for parsing, execution and the entanglement codec.
///
/// Every variant aborts the current unit of work (one parse call, one
/// subroutine execution, one (de)serialize call). `NotReady` and
/// `NonConstantIndex` are the only ones a caller is expected to recover from,
/// by retrying after the owning subroutine has executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetQasmError {
    /// Malformed text: brackets, labels, macros, preamble arity.
    Syntax(String),
    /// Unknown mnemonic or preamble directive.
    Instruction(String),
    /// Operand/argument arity or kind mismatch at dispatch.
    Type(String),
    /// Double alloc/free, out-of-range address, no free array slot.
    Resource(String),
    /// Unrecognized request tag or result-array shape mismatch.
    Protocol(String),
    /// Reading a Future whose cell has not been written yet.
    NotReady(String),
    /// Reading a Future whose index is a register without a known value.
    NonConstantIndex(String),
}

impl fmt::Display for NetQasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetQasmError::Syntax(msg) => write!(f, "Syntax Error: {}", msg),
            NetQasmError::Instruction(msg) => write!(f, "Instruction Error: {}", msg),
            NetQasmError::Type(msg) => write!(f, "Type Error: {}", msg),
            NetQasmError::Resource(msg) => write!(f, "Resource Error: {}", msg),
            NetQasmError::Protocol(msg) => write!(f, "Protocol Error: {}", msg),
            NetQasmError::NotReady(msg) => write!(f, "Value Not Ready: {}", msg),
            NetQasmError::NonConstantIndex(msg) => write!(f, "Index Not Constant: {}", msg),
        }
    }
}

impl std::error::Error for NetQasmError {}

impl NetQasmError {
    pub fn syntax(message: impl Into<String>) -> Self { NetQasmError::Syntax(message.into()) }
    pub fn instruction(message: impl Into<String>) -> Self { NetQasmError::Instruction(message.into()) }
    pub fn type_error(message: impl Into<String>) -> Self { NetQasmError::Type(message.into()) }
    pub fn resource(message: impl Into<String>) -> Self { NetQasmError::Resource(message.into()) }
    pub fn protocol(message: impl Into<String>) -> Self { NetQasmError::Protocol(message.into()) }
    pub fn not_ready(message: impl Into<String>) -> Self { NetQasmError::NotReady(message.into()) }
    pub fn non_constant_index(message: impl Into<String>) -> Self {
        NetQasmError::NonConstantIndex(message.into())
    }
}

pub type Result<T> = std::result::Result<T, NetQasmError>;
