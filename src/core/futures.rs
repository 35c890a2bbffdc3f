//! Deferred-value handles over shared memory.
//!
//! A `Future` names an array entry that is only written once the owning
//! subroutine has executed. An `Array` is a fixed-length view over the
//! entries allocated at one address. Neither handle ever defaults an unset
//! cell to a value; reads are explicit and typed.

use std::sync::MutexGuard;

use crate::core::error::{NetQasmError, Result};
use crate::core::memory::{SharedMemory, SharedMemoryHandle};
use crate::core::subroutine::{
    Command, Instruction, MemoryAddress, Operand, Register, RegisterName, Subroutine, Value,
    REGISTERS_PER_GROUP,
};

fn lock(memory: &SharedMemoryHandle) -> MutexGuard<'_, SharedMemory> {
    memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to one array entry, resolved lazily against shared memory.
///
/// The index may itself be a register, in which case it is only known once
/// the engine has written that register.
#[derive(Debug, Clone)]
pub struct Future {
    memory: SharedMemoryHandle,
    address: u32,
    index: Value,
    value: Option<i64>,
}

impl Future {
    pub fn new(memory: SharedMemoryHandle, address: u32, index: Value) -> Self {
        Future {
            memory,
            address,
            index,
            value: None,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn index(&self) -> Value {
        self.index
    }

    /// The resolved value.
    ///
    /// Fails with a value-not-ready error while the entry is still unset and
    /// with an index-not-constant error while a register index has no value
    /// yet. The first successful read is cached; later reads return the same
    /// value without touching memory again.
    pub fn value(&mut self) -> Result<i64> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        let memory = lock(&self.memory);
        let index = match self.index {
            Value::Constant(constant) => constant,
            Value::Register(register) => match memory.get_register(register) {
                Some(value) => value,
                None => {
                    return Err(NetQasmError::non_constant_index(format!(
                        "index register {} of the entry at address {} has no value yet",
                        register, self.address
                    )))
                }
            },
        };
        if index < 0 {
            return Err(NetQasmError::resource(format!(
                "index {} of the entry at address {} is negative",
                index, self.address
            )));
        }
        let entry = match memory.get_array_entry(self.address, index as usize) {
            Ok(entry) => entry,
            // The array itself not existing yet means execution has not
            // reached the allocation, the same situation as an unset entry.
            Err(NetQasmError::Resource(_)) if memory.get_array(self.address).is_err() => None,
            Err(err) => return Err(err),
        };
        match entry {
            Some(value) => {
                self.value = Some(value);
                Ok(value)
            }
            None => Err(NetQasmError::not_ready(format!(
                "entry {} of the array at address {} has not been written yet",
                self.index, self.address
            ))),
        }
    }

    /// Appends commands to `subroutine` that add `delta` to this entry when
    /// the subroutine executes, optionally reducing modulo `modulus`.
    ///
    /// Nothing is read or cached here; the entry may not exist yet. The
    /// compiled order is load into a scratch register, add, store back.
    pub fn add(&self, subroutine: &mut Subroutine, delta: i64, modulus: Option<i64>) -> Result<()> {
        let scratch = unused_register(subroutine)?;
        let entry = Operand::Address(MemoryAddress {
            base: Value::Constant(self.address as i64),
            index: Some(self.index),
        });
        subroutine.commands.push(Command {
            instruction: Instruction::Load,
            args: vec![],
            operands: vec![Operand::Register(scratch), entry.clone()],
        });
        let add_command = match modulus {
            None => Command {
                instruction: Instruction::Add,
                args: vec![],
                operands: vec![
                    Operand::Register(scratch),
                    Operand::Register(scratch),
                    Operand::Constant(delta),
                ],
            },
            Some(modulus) => Command {
                instruction: Instruction::Addm,
                args: vec![],
                operands: vec![
                    Operand::Register(scratch),
                    Operand::Register(scratch),
                    Operand::Constant(delta),
                    Operand::Constant(modulus),
                ],
            },
        };
        subroutine.commands.push(add_command);
        subroutine.commands.push(Command {
            instruction: Instruction::Store,
            args: vec![],
            operands: vec![entry, Operand::Register(scratch)],
        });
        Ok(())
    }
}

/// Lowest standard register not mentioned anywhere in the subroutine, used
/// as scratch space for compiled read-modify-write sequences.
fn unused_register(subroutine: &Subroutine) -> Result<Register> {
    let mut used = [false; REGISTERS_PER_GROUP as usize];
    let mut mark = |value: &Value| {
        if let Value::Register(register) = value {
            if register.name == RegisterName::R {
                used[register.index as usize] = true;
            }
        }
    };
    for command in &subroutine.commands {
        for operand in &command.operands {
            match operand {
                Operand::Register(register) => mark(&Value::Register(*register)),
                Operand::Address(address) => {
                    mark(&address.base);
                    if let Some(index) = &address.index {
                        mark(index);
                    }
                }
                Operand::Constant(_) | Operand::Label(_) => {}
            }
        }
    }
    for index in 0..REGISTERS_PER_GROUP {
        if !used[index as usize] {
            return Register::new(RegisterName::R, index);
        }
    }
    Err(NetQasmError::resource(
        "no free standard register available for a scratch value",
    ))
}

/// Fixed-length view over the array allocated at one address.
#[derive(Debug, Clone)]
pub struct Array {
    memory: SharedMemoryHandle,
    address: u32,
    length: usize,
}

impl Array {
    pub fn new(memory: SharedMemoryHandle, address: u32, length: usize) -> Self {
        Array {
            memory,
            address,
            length,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Raw stored value at `index`; `None` while the entry is unset.
    pub fn get(&self, index: usize) -> Result<Option<i64>> {
        if index >= self.length {
            return Err(NetQasmError::resource(format!(
                "index {} is out of range for the array of length {} at address {}",
                index, self.length, self.address
            )));
        }
        let memory = lock(&self.memory);
        match memory.get_array_entry(self.address, index) {
            Ok(entry) => Ok(entry),
            // Not allocated yet: every entry reads as unset.
            Err(NetQasmError::Resource(_)) if memory.get_array(self.address).is_err() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// A `Future` for the entry at `index`, for values that arrive later.
    pub fn get_future_index(&self, index: usize) -> Result<Future> {
        if index >= self.length {
            return Err(NetQasmError::resource(format!(
                "index {} is out of range for the array of length {} at address {}",
                index, self.length, self.address
            )));
        }
        Ok(Future::new(
            self.memory.clone(),
            self.address,
            Value::Constant(index as i64),
        ))
    }
}
