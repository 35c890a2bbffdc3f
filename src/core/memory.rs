//! Per-application shared memory: a register file plus address-indexed
//! scalar and array cells, and the registry handing out handles to it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::core::error::{NetQasmError, Result};
use crate::core::subroutine::Register;

/// A cell is either a scalar or a fixed-length array of optional scalars.
/// Array entries start unset; unset is distinct from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryValue {
    Scalar(i64),
    Array(Vec<Option<i64>>),
}

/// Classical memory shared between an application and the engine.
///
/// Owned by exactly one application id and accessed single-threaded; the
/// mutex exists so `Future`/`Array` handles can read the same memory the
/// engine writes.
#[derive(Debug, Default)]
pub struct SharedMemory {
    registers: HashMap<Register, i64>,
    cells: BTreeMap<u32, MemoryValue>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_register(&self, register: Register) -> Option<i64> {
        self.registers.get(&register).copied()
    }

    pub fn set_register(&mut self, register: Register, value: i64) {
        self.registers.insert(register, value);
    }

    /// Allocates `length` unset entries at `address`. The allocation address
    /// is write-once: a second allocation there is a resource error.
    pub fn init_array(&mut self, address: u32, length: usize) -> Result<()> {
        if self.cells.contains_key(&address) {
            return Err(NetQasmError::resource(format!(
                "address {} is already initialized",
                address
            )));
        }
        self.cells.insert(address, MemoryValue::Array(vec![None; length]));
        Ok(())
    }

    pub fn get_scalar(&self, address: u32) -> Result<Option<i64>> {
        match self.cells.get(&address) {
            None => Ok(None),
            Some(MemoryValue::Scalar(value)) => Ok(Some(*value)),
            Some(MemoryValue::Array(_)) => Err(NetQasmError::type_error(format!(
                "expected a scalar at address {}, found an array",
                address
            ))),
        }
    }

    pub fn set_scalar(&mut self, address: u32, value: i64) -> Result<()> {
        if let Some(MemoryValue::Array(_)) = self.cells.get(&address) {
            return Err(NetQasmError::resource(format!(
                "address {} holds an array and cannot be overwritten with a scalar",
                address
            )));
        }
        self.cells.insert(address, MemoryValue::Scalar(value));
        Ok(())
    }

    pub fn get_array(&self, address: u32) -> Result<&[Option<i64>]> {
        match self.cells.get(&address) {
            Some(MemoryValue::Array(entries)) => Ok(entries),
            Some(MemoryValue::Scalar(_)) => Err(NetQasmError::type_error(format!(
                "expected an array at address {}, found a scalar",
                address
            ))),
            None => Err(NetQasmError::resource(format!(
                "no array initialized at address {}",
                address
            ))),
        }
    }

    pub fn array_len(&self, address: u32) -> Result<usize> {
        Ok(self.get_array(address)?.len())
    }

    pub fn get_array_entry(&self, address: u32, index: usize) -> Result<Option<i64>> {
        let entries = self.get_array(address)?;
        entries.get(index).copied().ok_or_else(|| {
            NetQasmError::resource(format!(
                "index {} is out of range for the array of length {} at address {}",
                index,
                entries.len(),
                address
            ))
        })
    }

    /// Array entries may be overwritten freely after allocation.
    pub fn set_array_entry(&mut self, address: u32, index: usize, value: i64) -> Result<()> {
        let entries = match self.cells.get_mut(&address) {
            Some(MemoryValue::Array(entries)) => entries,
            Some(MemoryValue::Scalar(_)) => {
                return Err(NetQasmError::type_error(format!(
                    "expected an array at address {}, found a scalar",
                    address
                )))
            }
            None => {
                return Err(NetQasmError::resource(format!(
                    "no array initialized at address {}",
                    address
                )))
            }
        };
        let length = entries.len();
        match entries.get_mut(index) {
            Some(entry) => {
                *entry = Some(value);
                Ok(())
            }
            None => Err(NetQasmError::resource(format!(
                "index {} is out of range for the array of length {} at address {}",
                index, length, address
            ))),
        }
    }

    /// Position of the first unset entry; the convenience path used when an
    /// array operand carries no index.
    pub fn first_unset_index(&self, address: u32) -> Result<usize> {
        let entries = self.get_array(address)?;
        entries
            .iter()
            .position(|entry| entry.is_none())
            .ok_or_else(|| {
                NetQasmError::resource(format!(
                    "no unused entry in the array at address {}",
                    address
                ))
            })
    }

    /// Dump of all set registers, sorted, used by the CLI after a run.
    pub fn registers(&self) -> Vec<(Register, i64)> {
        let mut registers: Vec<_> = self
            .registers
            .iter()
            .map(|(register, value)| (*register, *value))
            .collect();
        registers.sort();
        registers
    }

    /// Dump of all set cells, used by the CLI after a run.
    pub fn dump(&self) -> Vec<(u32, MemoryValue)> {
        self.cells
            .iter()
            .map(|(address, value)| (*address, value.clone()))
            .collect()
    }
}

/// Handle type shared between the engine and deferred-value handles.
pub type SharedMemoryHandle = Arc<Mutex<SharedMemory>>;

/// Registry owning one memory per application id. Passed by handle to the
/// processor and consulted by `Future`/`Array`; there is no global instance.
#[derive(Debug, Default)]
pub struct SharedMemoryManager {
    memories: HashMap<u32, SharedMemoryHandle>,
}

impl SharedMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, app_id: u32) -> SharedMemoryHandle {
        let handle: SharedMemoryHandle = Arc::new(Mutex::new(SharedMemory::new()));
        self.memories.insert(app_id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, app_id: u32) -> Option<SharedMemoryHandle> {
        self.memories.get(&app_id).map(Arc::clone)
    }
}
