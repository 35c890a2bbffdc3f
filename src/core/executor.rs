//! The execution engine: runs parsed subroutines against per-application
//! shared memory and qubit unit modules.
//!
//! Quantum operations go through a pluggable backend whose default does
//! nothing, so the classical semantics can be exercised without any
//! physical or simulated hardware. Entanglement requests go out through a
//! pluggable network stack and their results come back as responses written
//! into shared-memory arrays.

use std::collections::HashMap;

use crate::core::error::{NetQasmError, Result};
use crate::core::memory::{SharedMemoryHandle, SharedMemoryManager};
use crate::core::qlink::{
    LinkLayerCreate, LinkLayerOKTypeK, LinkLayerOKTypeM, LinkLayerRecv, LinkLayerRequest,
    LinkLayerResponse, RequestType,
};
use crate::core::subroutine::{
    Command, Instruction, MemoryAddress, Operand, OperandKind, Register, Subroutine, Value,
};
use crate::debug_log;

/// Hardware operations the engine delegates. The default implementations
/// log nothing and measure zero, which is enough for testing the classical
/// semantics.
pub trait QuantumBackend {
    fn single_qubit_gate(&mut self, instruction: Instruction, position: u32) -> Result<()> {
        debug_log!("gate {} on physical qubit {}", instruction, position);
        Ok(())
    }

    fn two_qubit_gate(
        &mut self,
        instruction: Instruction,
        position1: u32,
        position2: u32,
    ) -> Result<()> {
        debug_log!(
            "gate {} on physical qubits {} and {}",
            instruction,
            position1,
            position2
        );
        Ok(())
    }

    fn measure(&mut self, position: u32) -> Result<i64> {
        debug_log!("measuring physical qubit {}", position);
        Ok(0)
    }
}

/// Backend that performs no quantum operations and always measures zero.
#[derive(Debug, Default)]
pub struct NoopBackend;

impl QuantumBackend for NoopBackend {}

/// Backend that draws uniformly random measurement outcomes, for exercising
/// branching code paths.
#[derive(Debug, Default)]
pub struct RandomOutcomeBackend;

impl QuantumBackend for RandomOutcomeBackend {
    fn measure(&mut self, _position: u32) -> Result<i64> {
        Ok(rand::random::<bool>() as i64)
    }
}

/// Transport for link-layer requests. `put` hands a request to the network
/// control plane and returns the create id assigned to it; `poll` drains any
/// responses that have arrived since the last call.
pub trait NetworkStack {
    fn put(&mut self, remote_node_id: u32, request: LinkLayerRequest) -> Result<i64>;

    fn poll(&mut self) -> Vec<LinkLayerResponse> {
        Vec::new()
    }
}

/// Network stack that accepts every request and never produces a response.
#[derive(Debug, Default)]
pub struct NoopNetworkStack {
    next_create_id: i64,
}

impl NetworkStack for NoopNetworkStack {
    fn put(&mut self, remote_node_id: u32, _request: LinkLayerRequest) -> Result<i64> {
        let create_id = self.next_create_id;
        self.next_create_id += 1;
        debug_log!(
            "request for remote node {} accepted with create id {}",
            remote_node_id,
            create_id
        );
        Ok(create_id)
    }
}

#[derive(Debug)]
struct CreateData {
    subroutine_id: u64,
    ent_info_address: u32,
    pairs_left: usize,
}

#[derive(Debug)]
struct RecvData {
    subroutine_id: u64,
    ent_info_address: u32,
    pairs_left: usize,
}

/// Where a resolved write operand points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Register(Register),
    Scalar(u32),
    ArrayEntry(u32, usize),
}

/// Executes NetQASM subroutines for the applications of one node.
pub struct Processor {
    node_id: u32,
    memories: SharedMemoryManager,
    unit_modules: HashMap<u32, Vec<Option<u32>>>,
    backend: Box<dyn QuantumBackend>,
    network_stack: Option<Box<dyn NetworkStack>>,
    subroutines: HashMap<u64, Subroutine>,
    program_counters: HashMap<u64, usize>,
    used_physical_qubits: Vec<u32>,
    epr_create_requests: HashMap<i64, CreateData>,
    epr_recv_requests: HashMap<u32, Vec<RecvData>>,
}

impl Processor {
    pub fn new(node_id: u32, backend: Box<dyn QuantumBackend>) -> Self {
        Processor {
            node_id,
            memories: SharedMemoryManager::new(),
            unit_modules: HashMap::new(),
            backend,
            network_stack: None,
            subroutines: HashMap::new(),
            program_counters: HashMap::new(),
            used_physical_qubits: Vec::new(),
            epr_create_requests: HashMap::new(),
            epr_recv_requests: HashMap::new(),
        }
    }

    pub fn set_network_stack(&mut self, network_stack: Box<dyn NetworkStack>) {
        self.network_stack = Some(network_stack);
    }

    /// Sets up an empty unit module and shared memory for an application.
    /// Has to happen before any subroutine referencing the app id runs.
    pub fn init_new_application(&mut self, app_id: u32, max_qubits: usize) {
        self.unit_modules.insert(app_id, vec![None; max_qubits]);
        self.memories.create(app_id);
    }

    /// Handle to the shared memory of an application, for reading results
    /// through `Future`/`Array` after execution.
    pub fn shared_memory(&self, app_id: u32) -> Result<SharedMemoryHandle> {
        self.memories.get(app_id).ok_or_else(|| {
            NetQasmError::resource(format!(
                "no application initialized with app id {}",
                app_id
            ))
        })
    }

    /// Registers the subroutine under the smallest unused id, then runs its
    /// commands from a zeroed program counter until the counter leaves the
    /// command list.
    pub fn execute_subroutine(&mut self, subroutine: Subroutine) -> Result<u64> {
        let subroutine_id = self.new_subroutine_id();
        self.subroutines.insert(subroutine_id, subroutine);
        self.program_counters.insert(subroutine_id, 0);
        self.run(subroutine_id)?;
        Ok(subroutine_id)
    }

    /// Drops a finished subroutine, freeing its id for reuse.
    pub fn clear_subroutine(&mut self, subroutine_id: u64) {
        self.subroutines.remove(&subroutine_id);
        self.program_counters.remove(&subroutine_id);
    }

    fn new_subroutine_id(&self) -> u64 {
        (0..).find(|id| !self.subroutines.contains_key(id)).unwrap_or(0)
    }

    fn run(&mut self, subroutine_id: u64) -> Result<()> {
        loop {
            let pc = *self.program_counters.get(&subroutine_id).unwrap_or(&0);
            let command = {
                let subroutine = self.subroutines.get(&subroutine_id).ok_or_else(|| {
                    NetQasmError::resource(format!(
                        "no subroutine registered with id {}",
                        subroutine_id
                    ))
                })?;
                if pc >= subroutine.commands.len() {
                    return Ok(());
                }
                subroutine.commands[pc].clone()
            };
            debug_log!("executing {:>4} {}", pc, command);
            self.execute_command(subroutine_id, &command)?;
        }
    }

    fn execute_command(&mut self, subroutine_id: u64, command: &Command) -> Result<()> {
        check_signature(command)?;
        let app_id = self.app_id(subroutine_id)?;
        use Instruction::*;
        match command.instruction {
            Set | Load | Store => {
                let value = self.read_value(app_id, &command.operands[1])?;
                self.write_value(app_id, &command.operands[0], value)?;
            }
            Array => {
                let length = command.args[0];
                if length < 0 {
                    return Err(NetQasmError::type_error(format!(
                        "array length {} is negative",
                        length
                    )));
                }
                let address = self.resolve_base(app_id, &command.operands[0])?;
                self.memory(app_id)?
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .init_array(address, length as usize)?;
            }
            Add => {
                let a = self.read_value(app_id, &command.operands[1])?;
                let b = self.read_value(app_id, &command.operands[2])?;
                self.write_value(app_id, &command.operands[0], a + b)?;
            }
            Addm => {
                let a = self.read_value(app_id, &command.operands[1])?;
                let b = self.read_value(app_id, &command.operands[2])?;
                let modulus = self.read_value(app_id, &command.operands[3])?;
                if modulus <= 0 {
                    return Err(NetQasmError::type_error(format!(
                        "modulus {} is not positive",
                        modulus
                    )));
                }
                self.write_value(app_id, &command.operands[0], (a + b).rem_euclid(modulus))?;
            }
            Qalloc => {
                let address = self.read_value(app_id, &command.operands[0])?;
                self.allocate_physical_qubit(app_id, address)?;
            }
            Qfree => {
                let address = self.read_value(app_id, &command.operands[0])?;
                self.free_physical_qubit(app_id, address)?;
            }
            Init | H | X => {
                let address = self.read_value(app_id, &command.operands[0])?;
                let position = self.qubit_position(app_id, address)?;
                self.backend.single_qubit_gate(command.instruction, position)?;
            }
            Cnot => {
                let address1 = self.read_value(app_id, &command.operands[0])?;
                let address2 = self.read_value(app_id, &command.operands[1])?;
                let position1 = self.qubit_position(app_id, address1)?;
                let position2 = self.qubit_position(app_id, address2)?;
                self.backend
                    .two_qubit_gate(command.instruction, position1, position2)?;
            }
            Meas => {
                let address = self.read_value(app_id, &command.operands[0])?;
                let position = self.qubit_position(app_id, address)?;
                let outcome = self.backend.measure(position)?;
                // A missing destination slot drops the outcome but does not
                // abort the subroutine.
                match self.write_value(app_id, &command.operands[1], outcome) {
                    Ok(()) => {}
                    Err(NetQasmError::Resource(reason)) => {
                        debug_log!("measurement outcome dropped: {}", reason);
                    }
                    Err(err) => return Err(err),
                }
            }
            Beq | Bne | Blt | Bge => {
                let a = self.read_value(app_id, &command.operands[0])?;
                let b = self.read_value(app_id, &command.operands[1])?;
                let jump = self.read_value(app_id, &command.operands[2])?;
                let taken = match command.instruction {
                    Beq => a == b,
                    Bne => a != b,
                    Blt => a < b,
                    Bge => a >= b,
                    _ => unreachable!(),
                };
                if taken {
                    if jump < 0 {
                        return Err(NetQasmError::type_error(format!(
                            "branch target {} is negative",
                            jump
                        )));
                    }
                    self.program_counters.insert(subroutine_id, jump as usize);
                } else {
                    self.advance(subroutine_id);
                }
                return Ok(());
            }
            Wait => {
                self.wait_for_operand(app_id, &command.operands[0])?;
            }
            CreateEpr => {
                let remote_node_id = command.args[0];
                let purpose_id = command.args[1];
                self.create_epr(
                    subroutine_id,
                    app_id,
                    remote_node_id,
                    purpose_id,
                    command,
                )?;
            }
            RecvEpr => {
                let remote_node_id = command.args[0];
                let purpose_id = command.args[1];
                self.recv_epr(subroutine_id, app_id, remote_node_id, purpose_id, command)?;
            }
        }
        self.advance(subroutine_id);
        Ok(())
    }

    fn advance(&mut self, subroutine_id: u64) {
        *self.program_counters.entry(subroutine_id).or_insert(0) += 1;
    }

    fn app_id(&self, subroutine_id: u64) -> Result<u32> {
        self.subroutines
            .get(&subroutine_id)
            .map(|subroutine| subroutine.app_id)
            .ok_or_else(|| {
                NetQasmError::resource(format!(
                    "no subroutine registered with id {}",
                    subroutine_id
                ))
            })
    }

    fn memory(&self, app_id: u32) -> Result<SharedMemoryHandle> {
        self.memories.get(app_id).ok_or_else(|| {
            NetQasmError::resource(format!(
                "application with app id {} has no shared memory; \
                 was init_new_application called?",
                app_id
            ))
        })
    }

    /// Resolves a read operand to its value. A constant is the value itself;
    /// a register or memory location has to hold a value already.
    fn read_value(&self, app_id: u32, operand: &Operand) -> Result<i64> {
        match operand {
            Operand::Constant(constant) => Ok(*constant),
            Operand::Register(register) => self.read_register(app_id, *register),
            Operand::Address(address) => {
                let location = self.resolve_location(app_id, address)?;
                let handle = self.memory(app_id)?;
                let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let value = match location {
                    Location::Register(register) => memory.get_register(register),
                    Location::Scalar(base) => memory.get_scalar(base)?,
                    Location::ArrayEntry(base, index) => memory.get_array_entry(base, index)?,
                };
                value.ok_or_else(|| {
                    NetQasmError::type_error(format!(
                        "expected a value at {}, but it is unset",
                        address
                    ))
                })
            }
            Operand::Label(label) => Err(NetQasmError::type_error(format!(
                "unresolved branch label '{}' cannot be read",
                label
            ))),
        }
    }

    fn read_register(&self, app_id: u32, register: Register) -> Result<i64> {
        let handle = self.memory(app_id)?;
        let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        memory.get_register(register).ok_or_else(|| {
            NetQasmError::type_error(format!(
                "expected a value in register {}, but it is unset",
                register
            ))
        })
    }

    fn write_value(&mut self, app_id: u32, operand: &Operand, value: i64) -> Result<()> {
        let location = match operand {
            Operand::Register(register) => Location::Register(*register),
            Operand::Address(address) => self.resolve_location(app_id, address)?,
            other => {
                return Err(NetQasmError::type_error(format!(
                    "cannot write to operand {}",
                    other
                )))
            }
        };
        let handle = self.memory(app_id)?;
        let mut memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match location {
            Location::Register(register) => {
                memory.set_register(register, value);
                Ok(())
            }
            Location::Scalar(base) => memory.set_scalar(base, value),
            Location::ArrayEntry(base, index) => memory.set_array_entry(base, index, value),
        }
    }

    /// Resolves the base of an address operand to a concrete address. A
    /// register base is indirection: the register holds the real address.
    fn resolve_base(&self, app_id: u32, operand: &Operand) -> Result<u32> {
        let address = match operand {
            Operand::Address(address) => address,
            other => {
                return Err(NetQasmError::type_error(format!(
                    "expected an address operand, got {}",
                    other
                )))
            }
        };
        self.resolve_value_as_address(app_id, &address.base)
    }

    fn resolve_value_as_address(&self, app_id: u32, value: &Value) -> Result<u32> {
        let resolved = match value {
            Value::Constant(constant) => *constant,
            Value::Register(register) => self.read_register(app_id, *register)?,
        };
        if resolved < 0 {
            return Err(NetQasmError::resource(format!(
                "address {} is negative",
                resolved
            )));
        }
        Ok(resolved as u32)
    }

    /// Resolves an address operand to a concrete memory location.
    ///
    /// With an explicit index the location is that array entry. Without one
    /// the location is the scalar cell at the base, unless the cell holds an
    /// array, in which case the first unset entry is used. That last rule is
    /// what lets a result writer append records without tracking a cursor.
    fn resolve_location(&self, app_id: u32, address: &MemoryAddress) -> Result<Location> {
        let base = self.resolve_value_as_address(app_id, &address.base)?;
        let handle = self.memory(app_id)?;
        match &address.index {
            Some(index) => {
                let index = match index {
                    Value::Constant(constant) => *constant,
                    Value::Register(register) => self.read_register(app_id, *register)?,
                };
                if index < 0 {
                    return Err(NetQasmError::resource(format!(
                        "array index {} is negative",
                        index
                    )));
                }
                Ok(Location::ArrayEntry(base, index as usize))
            }
            None => {
                let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if memory.get_array(base).is_ok() {
                    let index = memory.first_unset_index(base)?;
                    Ok(Location::ArrayEntry(base, index))
                } else {
                    Ok(Location::Scalar(base))
                }
            }
        }
    }

    fn unit_module(&mut self, app_id: u32) -> Result<&mut Vec<Option<u32>>> {
        self.unit_modules.get_mut(&app_id).ok_or_else(|| {
            NetQasmError::resource(format!(
                "application with app id {} has no qubit unit module; \
                 was init_new_application called?",
                app_id
            ))
        })
    }

    fn allocate_physical_qubit(&mut self, app_id: u32, address: i64) -> Result<()> {
        let physical = (0..)
            .find(|candidate| !self.used_physical_qubits.contains(candidate))
            .unwrap_or(0);
        let unit_module = self.unit_module(app_id)?;
        let size = unit_module.len();
        let slot = virtual_slot(unit_module, address, size)?;
        if slot.is_some() {
            return Err(NetQasmError::resource(format!(
                "qubit address {} for application {} is already allocated",
                address, app_id
            )));
        }
        *slot = Some(physical);
        self.used_physical_qubits.push(physical);
        Ok(())
    }

    fn free_physical_qubit(&mut self, app_id: u32, address: i64) -> Result<()> {
        let unit_module = self.unit_module(app_id)?;
        let size = unit_module.len();
        let slot = virtual_slot(unit_module, address, size)?;
        match slot.take() {
            Some(physical) => {
                self.used_physical_qubits.retain(|used| *used != physical);
                Ok(())
            }
            None => Err(NetQasmError::resource(format!(
                "qubit address {} for application {} is not allocated and cannot be freed",
                address, app_id
            ))),
        }
    }

    fn qubit_position(&mut self, app_id: u32, address: i64) -> Result<u32> {
        let unit_module = self.unit_module(app_id)?;
        let size = unit_module.len();
        let slot = virtual_slot(unit_module, address, size)?;
        slot.ok_or_else(|| {
            NetQasmError::resource(format!(
                "qubit address {} for application {} is not allocated",
                address, app_id
            ))
        })
    }

    /// Blocks until the operand's value is defined, draining network
    /// responses while it is not. A constant waits that many polling rounds.
    fn wait_for_operand(&mut self, app_id: u32, operand: &Operand) -> Result<()> {
        if let Operand::Constant(count) = operand {
            for _ in 0..*count {
                self.drain_responses()?;
            }
            return Ok(());
        }
        loop {
            if self.operand_is_defined(app_id, operand)? {
                return Ok(());
            }
            if !self.drain_responses()? {
                return Err(NetQasmError::resource(format!(
                    "waiting for {} would never complete: no responses pending",
                    operand
                )));
            }
        }
    }

    fn operand_is_defined(&self, app_id: u32, operand: &Operand) -> Result<bool> {
        match operand {
            Operand::Constant(_) => Ok(true),
            Operand::Register(register) => {
                let handle = self.memory(app_id)?;
                let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                Ok(memory.get_register(*register).is_some())
            }
            Operand::Address(address) => {
                let base = self.resolve_value_as_address(app_id, &address.base)?;
                let handle = self.memory(app_id)?;
                let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match &address.index {
                    Some(index) => {
                        let index = match index {
                            Value::Constant(constant) => *constant,
                            Value::Register(register) => {
                                match memory.get_register(*register) {
                                    Some(value) => value,
                                    None => return Ok(false),
                                }
                            }
                        };
                        if index < 0 {
                            return Err(NetQasmError::resource(format!(
                                "array index {} is negative",
                                index
                            )));
                        }
                        Ok(memory
                            .get_array_entry(base, index as usize)
                            .map(|entry| entry.is_some())
                            .unwrap_or(false))
                    }
                    None => match memory.get_array(base) {
                        Ok(entries) => Ok(entries.iter().all(|entry| entry.is_some())),
                        Err(_) => Ok(memory.get_scalar(base).unwrap_or(None).is_some()),
                    },
                }
            }
            Operand::Label(label) => Err(NetQasmError::type_error(format!(
                "unresolved branch label '{}' cannot be waited on",
                label
            ))),
        }
    }

    /// Handles every pending network response; reports whether any arrived.
    fn drain_responses(&mut self) -> Result<bool> {
        let responses = match self.network_stack.as_mut() {
            Some(stack) => stack.poll(),
            None => Vec::new(),
        };
        let any = !responses.is_empty();
        for response in responses {
            self.handle_epr_response(response)?;
        }
        Ok(any)
    }

    fn create_epr(
        &mut self,
        subroutine_id: u64,
        app_id: u32,
        remote_node_id: i64,
        purpose_id: i64,
        command: &Command,
    ) -> Result<()> {
        let q_address = self.resolve_base(app_id, &command.operands[0])?;
        let arg_address = self.resolve_base(app_id, &command.operands[1])?;
        let ent_info_address = self.resolve_base(app_id, &command.operands[2])?;
        let request = self.build_create_request(app_id, remote_node_id, purpose_id, arg_address)?;
        let number = request.number as usize;
        let num_qubits = {
            let handle = self.memory(app_id)?;
            let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            memory.array_len(q_address)?
        };
        if num_qubits != number {
            return Err(NetQasmError::resource(format!(
                "request asks for {} pairs but {} qubit addresses were supplied",
                number, num_qubits
            )));
        }
        let stack = self.network_stack.as_mut().ok_or_else(|| {
            NetQasmError::resource("no network stack attached to the processor")
        })?;
        let create_id = stack.put(
            remote_node_id as u32,
            LinkLayerRequest::Create(request),
        )?;
        self.epr_create_requests.insert(
            create_id,
            CreateData {
                subroutine_id,
                ent_info_address,
                pairs_left: number,
            },
        );
        Ok(())
    }

    /// Reads the 20-slot request array and fills a create request, using the
    /// field defaults for every unset slot.
    fn build_create_request(
        &self,
        app_id: u32,
        remote_node_id: i64,
        purpose_id: i64,
        arg_address: u32,
    ) -> Result<LinkLayerCreate> {
        use crate::core::epr::{self, RandomBasis, TimeUnit};

        let handle = self.memory(app_id)?;
        let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let slots = memory.get_array(arg_address)?;
        if slots.len() != epr::SER_CREATE_LEN {
            return Err(NetQasmError::protocol(format!(
                "request array has length {}, expected {}",
                slots.len(),
                epr::SER_CREATE_LEN
            )));
        }
        let mut request = LinkLayerCreate {
            remote_node_id: remote_node_id as u32,
            purpose_id: purpose_id as u32,
            ..LinkLayerCreate::default()
        };
        if let Some(tag) = slots[epr::SER_CREATE_IDX_TYPE] {
            request.request_type = match epr::EprType::from_tag(tag)? {
                epr::EprType::K => RequestType::K,
                epr::EprType::M => RequestType::M,
                epr::EprType::R => RequestType::R,
            };
        }
        if let Some(number) = slots[epr::SER_CREATE_IDX_NUMBER] {
            request.number = number as u32;
        }
        if let Some(tag) = slots[epr::SER_CREATE_IDX_RANDOM_BASIS_LOCAL] {
            request.random_basis_local = RandomBasis::from_tag(tag)?;
        }
        if let Some(tag) = slots[epr::SER_CREATE_IDX_RANDOM_BASIS_REMOTE] {
            request.random_basis_remote = RandomBasis::from_tag(tag)?;
        }
        if let Some(fidelity) = slots[epr::SER_CREATE_IDX_MINIMUM_FIDELITY] {
            request.minimum_fidelity = fidelity;
        }
        if let Some(unit) = slots[epr::SER_CREATE_IDX_TIME_UNIT] {
            request.time_unit = match unit {
                0 => TimeUnit::MicroSeconds,
                1 => TimeUnit::MilliSeconds,
                2 => TimeUnit::Seconds,
                other => {
                    return Err(NetQasmError::protocol(format!(
                        "{} is not a known time unit",
                        other
                    )))
                }
            };
        }
        if let Some(max_time) = slots[epr::SER_CREATE_IDX_MAX_TIME] {
            request.max_time = max_time;
        }
        if let Some(priority) = slots[epr::SER_CREATE_IDX_PRIORITY] {
            request.priority = priority;
        }
        if let Some(atomic) = slots[epr::SER_CREATE_IDX_ATOMIC] {
            request.atomic = atomic != 0;
        }
        if let Some(consecutive) = slots[epr::SER_CREATE_IDX_CONSECUTIVE] {
            request.consecutive = consecutive != 0;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_PROBABILITY_DIST_LOCAL1] {
            request.probability_dist_local1 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_PROBABILITY_DIST_LOCAL2] {
            request.probability_dist_local2 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_PROBABILITY_DIST_REMOTE1] {
            request.probability_dist_remote1 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_PROBABILITY_DIST_REMOTE2] {
            request.probability_dist_remote2 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_X_LOCAL1] {
            request.rotation_x_local1 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_Y_LOCAL] {
            request.rotation_y_local = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_X_LOCAL2] {
            request.rotation_x_local2 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_X_REMOTE1] {
            request.rotation_x_remote1 = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_Y_REMOTE] {
            request.rotation_y_remote = value;
        }
        if let Some(value) = slots[epr::SER_CREATE_IDX_ROTATION_X_REMOTE2] {
            request.rotation_x_remote2 = value;
        }
        Ok(request)
    }

    fn recv_epr(
        &mut self,
        subroutine_id: u64,
        app_id: u32,
        remote_node_id: i64,
        purpose_id: i64,
        command: &Command,
    ) -> Result<()> {
        let q_address = self.resolve_base(app_id, &command.operands[0])?;
        let ent_info_address = self.resolve_base(app_id, &command.operands[1])?;
        let pairs_left = {
            let handle = self.memory(app_id)?;
            let memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            memory.array_len(q_address)?
        };
        let stack = self.network_stack.as_mut().ok_or_else(|| {
            NetQasmError::resource("no network stack attached to the processor")
        })?;
        stack.put(
            remote_node_id as u32,
            LinkLayerRequest::Recv(LinkLayerRecv {
                remote_node_id: remote_node_id as u32,
                purpose_id: purpose_id as u32,
            }),
        )?;
        self.epr_recv_requests
            .entry(purpose_id as u32)
            .or_default()
            .push(RecvData {
                subroutine_id,
                ent_info_address,
                pairs_left,
            });
        Ok(())
    }

    /// Processes one link-layer response, writing its record into the
    /// entanglement-information array of the request it answers.
    pub fn handle_epr_response(&mut self, response: LinkLayerResponse) -> Result<()> {
        match response {
            LinkLayerResponse::OkK(ok) => self.handle_epr_ok_k(ok),
            LinkLayerResponse::OkM(ok) => self.handle_epr_ok_m(ok),
            LinkLayerResponse::Err(err) => Err(NetQasmError::protocol(format!(
                "link layer reported error {:?} for create id {}",
                err.error_code, err.create_id
            ))),
        }
    }

    fn take_request_slot(
        &mut self,
        create_id: i64,
        purpose_id: u32,
        remote_node_id: u32,
        directionality_flag: i64,
    ) -> Result<(u64, u32)> {
        let created_here = crate::core::qlink::creator_node_id(
            self.node_id,
            directionality_flag,
            remote_node_id,
        ) == self.node_id;
        if created_here {
            let create_data = self.epr_create_requests.get_mut(&create_id).ok_or_else(|| {
                NetQasmError::protocol(format!(
                    "no create request in progress with create id {}",
                    create_id
                ))
            })?;
            create_data.pairs_left -= 1;
            let result = (create_data.subroutine_id, create_data.ent_info_address);
            if create_data.pairs_left == 0 {
                self.epr_create_requests.remove(&create_id);
            }
            Ok(result)
        } else {
            let queue = self
                .epr_recv_requests
                .get_mut(&purpose_id)
                .filter(|queue| !queue.is_empty())
                .ok_or_else(|| {
                    NetQasmError::protocol(format!(
                        "no receive request in progress for purpose id {}",
                        purpose_id
                    ))
                })?;
            let recv_data = &mut queue[0];
            recv_data.pairs_left -= 1;
            let result = (recv_data.subroutine_id, recv_data.ent_info_address);
            if recv_data.pairs_left == 0 {
                queue.remove(0);
            }
            Ok(result)
        }
    }

    fn handle_epr_ok_k(&mut self, ok: LinkLayerOKTypeK) -> Result<()> {
        let (subroutine_id, ent_info_address) = self.take_request_slot(
            ok.create_id,
            ok.purpose_id,
            ok.remote_node_id,
            ok.directionality_flag,
        )?;
        let app_id = self.app_id(subroutine_id)?;
        self.allocate_physical_qubit(app_id, ok.logical_qubit_id)?;
        let record = [
            crate::core::qlink::ReturnType::OkK as i64,
            ok.create_id,
            ok.logical_qubit_id,
            ok.directionality_flag,
            ok.sequence_number,
            ok.purpose_id as i64,
            ok.remote_node_id as i64,
            ok.goodness,
            ok.goodness_time,
            ok.bell_state as i64,
        ];
        self.write_record(app_id, ent_info_address, &record)
    }

    fn handle_epr_ok_m(&mut self, ok: LinkLayerOKTypeM) -> Result<()> {
        let (subroutine_id, ent_info_address) = self.take_request_slot(
            ok.create_id,
            ok.purpose_id,
            ok.remote_node_id,
            ok.directionality_flag,
        )?;
        let app_id = self.app_id(subroutine_id)?;
        let record = [
            crate::core::qlink::ReturnType::OkM as i64,
            ok.create_id,
            ok.measurement_outcome,
            ok.measurement_basis as i64,
            ok.directionality_flag,
            ok.sequence_number,
            ok.purpose_id as i64,
            ok.remote_node_id as i64,
            ok.goodness,
            ok.bell_state as i64,
        ];
        self.write_record(app_id, ent_info_address, &record)
    }

    /// Appends one result record at the first unset run of the array.
    fn write_record(&mut self, app_id: u32, address: u32, record: &[i64]) -> Result<()> {
        let handle = self.memory(app_id)?;
        let mut memory = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = memory.first_unset_index(address)?;
        for (offset, value) in record.iter().enumerate() {
            memory.set_array_entry(address, start + offset, *value)?;
        }
        Ok(())
    }
}

fn virtual_slot<'a>(
    unit_module: &'a mut [Option<u32>],
    address: i64,
    size: usize,
) -> Result<&'a mut Option<u32>> {
    if address < 0 || address as usize >= size {
        return Err(NetQasmError::resource(format!(
            "qubit address {} is not within the unit module of size {}",
            address, size
        )));
    }
    Ok(&mut unit_module[address as usize])
}

/// Checks a command against its instruction's declared signature: exact
/// argument count, exact operand count, and the right operand kind at each
/// position.
fn check_signature(command: &Command) -> Result<()> {
    let (num_args, kinds) = command.instruction.signature();
    if command.args.len() != num_args {
        return Err(NetQasmError::type_error(format!(
            "{} takes {} argument(s), got {}",
            command.instruction,
            num_args,
            command.args.len()
        )));
    }
    if command.operands.len() != kinds.len() {
        return Err(NetQasmError::type_error(format!(
            "{} takes {} operand(s), got {}",
            command.instruction,
            kinds.len(),
            command.operands.len()
        )));
    }
    for (position, (operand, kind)) in command.operands.iter().zip(kinds).enumerate() {
        let ok = match kind {
            OperandKind::Qubit => {
                matches!(operand, Operand::Constant(_) | Operand::Register(_))
            }
            OperandKind::Read => !matches!(operand, Operand::Label(_)),
            OperandKind::Write => {
                matches!(operand, Operand::Register(_) | Operand::Address(_))
            }
            OperandKind::Address => matches!(operand, Operand::Address(_)),
        };
        if !ok {
            return Err(NetQasmError::type_error(format!(
                "operand {} of {} has the wrong kind: expected {:?}, got {}",
                position, command.instruction, kind, operand
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::epr::{Basis, BellState};
    use crate::core::parser::parse_subroutine;

    fn processor() -> Processor {
        let mut processor = Processor::new(0, Box::new(NoopBackend));
        processor.init_new_application(0, 5);
        processor
    }

    fn run(processor: &mut Processor, text: &str) -> Result<u64> {
        let subroutine = parse_subroutine(text).unwrap();
        processor.execute_subroutine(subroutine)
    }

    #[test]
    fn set_and_add_write_registers() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             set R0 2\n\
             set R1 3\n\
             add R2 R0 R1\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        let r2 = Register::new(crate::core::subroutine::RegisterName::R, 2).unwrap();
        assert_eq!(memory.get_register(r2), Some(5));
    }

    #[test]
    fn branch_loop_counts_down() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             set R0 3\n\
             LOOP:\n\
             beq R0 0 EXIT\n\
             add R0 R0 -1\n\
             beq 0 0 LOOP\n\
             EXIT:\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        let r0 = Register::new(crate::core::subroutine::RegisterName::R, 0).unwrap();
        assert_eq!(memory.get_register(r0), Some(0));
    }

    #[test]
    fn store_and_load_through_array() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(2) @0\n\
             store @0[0] 7\n\
             load R0 @0[0]\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        let r0 = Register::new(crate::core::subroutine::RegisterName::R, 0).unwrap();
        assert_eq!(memory.get_register(r0), Some(7));
        assert_eq!(memory.get_array_entry(0, 0).unwrap(), Some(7));
    }

    #[test]
    fn indirect_store_follows_register_base() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             set R0 4\n\
             store @R0 11\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        assert_eq!(memory.get_scalar(4).unwrap(), Some(11));
    }

    #[test]
    fn double_array_allocation_is_fatal() {
        let mut processor = processor();
        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(2) @0\n\
             array(2) @0\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Resource(_)));
    }

    #[test]
    fn qalloc_rebind_and_double_free_are_fatal() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             qalloc 0\n\
             qfree 0\n",
        )
        .unwrap();

        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             qalloc 1\n\
             qalloc 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Resource(_)));

        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             qfree 2\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Resource(_)));
    }

    #[test]
    fn measurement_writes_outcome_and_drops_without_destination() {
        let mut processor = processor();
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             qalloc 0\n\
             init 0\n\
             h 0\n\
             meas 0 M0\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let m0 = Register::new(crate::core::subroutine::RegisterName::M, 0).unwrap();
        assert_eq!(handle.lock().unwrap().get_register(m0), Some(0));

        // destination slot out of range: the outcome is dropped, not fatal
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @1\n\
             store @1[0] 0\n\
             qalloc 1\n\
             meas 1 @1[5]\n",
        )
        .unwrap();
    }

    #[test]
    fn arity_mismatch_is_type_error_before_side_effects() {
        let mut processor = processor();
        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             add R0 R1\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Type(_)));

        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             set 1 2\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Type(_)));
    }

    #[test]
    fn subroutine_ids_reuse_smallest_free() {
        let mut processor = processor();
        let text = "# NETQASM 0.0\n# APPID 0\nset R0 0\n";
        let first = run(&mut processor, text).unwrap();
        let second = run(&mut processor, text).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        processor.clear_subroutine(first);
        let third = run(&mut processor, text).unwrap();
        assert_eq!(third, 0);
    }

    struct RecordingStack {
        requests: Vec<(u32, LinkLayerRequest)>,
        responses: Vec<LinkLayerResponse>,
    }

    impl NetworkStack for RecordingStack {
        fn put(&mut self, remote_node_id: u32, request: LinkLayerRequest) -> Result<i64> {
            self.requests.push((remote_node_id, request));
            Ok(0)
        }

        fn poll(&mut self) -> Vec<LinkLayerResponse> {
            std::mem::take(&mut self.responses)
        }
    }

    fn ok_k(create_id: i64, qubit_id: i64) -> LinkLayerResponse {
        LinkLayerResponse::OkK(LinkLayerOKTypeK {
            create_id,
            logical_qubit_id: qubit_id,
            directionality_flag: 0,
            sequence_number: 0,
            purpose_id: 0,
            remote_node_id: 1,
            goodness: 90,
            goodness_time: 100,
            bell_state: BellState::PhiPlus,
        })
    }

    #[test]
    fn create_epr_sends_request_and_response_fills_results() {
        let mut processor = processor();
        processor.set_network_stack(Box::new(RecordingStack {
            requests: vec![],
            responses: vec![ok_k(0, 0)],
        }));
        // one pair: qubit array @0, request args @1, results @2
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @0\n\
             store @0[0] 0\n\
             array(20) @1\n\
             store @1[0] 0\n\
             store @1[1] 1\n\
             array(10) @2\n\
             create_epr(1,0) @0 @1 @2\n\
             wait @2\n",
        )
        .unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        // record landed at the start of the result array
        assert_eq!(memory.get_array_entry(2, 2).unwrap(), Some(0)); // qubit id
        assert_eq!(memory.get_array_entry(2, 7).unwrap(), Some(90)); // goodness
        assert_eq!(
            memory.get_array_entry(2, 9).unwrap(),
            Some(BellState::PhiPlus as i64)
        );
    }

    #[test]
    fn create_epr_without_network_stack_is_fatal() {
        let mut processor = processor();
        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @0\n\
             array(20) @1\n\
             store @1[1] 1\n\
             array(10) @2\n\
             create_epr(1,0) @0 @1 @2\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Resource(_)));
    }

    #[test]
    fn recv_epr_records_request_and_handles_response() {
        let mut processor = Processor::new(5, Box::new(NoopBackend));
        processor.init_new_application(0, 5);
        processor.set_network_stack(Box::new(RecordingStack {
            requests: vec![],
            responses: vec![],
        }));
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @0\n\
             array(10) @1\n\
             recv_epr(1,7) @0 @1\n",
        )
        .unwrap();
        // directionality flag 1 marks the remote node as the creator
        let response = LinkLayerResponse::OkK(LinkLayerOKTypeK {
            create_id: 0,
            logical_qubit_id: 0,
            directionality_flag: 1,
            sequence_number: 0,
            purpose_id: 7,
            remote_node_id: 1,
            goodness: 85,
            goodness_time: 100,
            bell_state: BellState::PsiPlus,
        });
        processor.handle_epr_response(response).unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        assert_eq!(
            memory.get_array_entry(1, 9).unwrap(),
            Some(BellState::PsiPlus as i64)
        );
    }

    #[test]
    fn measure_directly_response_writes_outcome_record() {
        let mut processor = processor();
        processor.set_network_stack(Box::new(RecordingStack {
            requests: vec![],
            responses: vec![],
        }));
        run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @0\n\
             array(20) @1\n\
             store @1[0] 1\n\
             store @1[1] 1\n\
             array(10) @2\n\
             create_epr(1,0) @0 @1 @2\n",
        )
        .unwrap();
        let response = LinkLayerResponse::OkM(LinkLayerOKTypeM {
            create_id: 0,
            measurement_outcome: 1,
            measurement_basis: Basis::Z,
            directionality_flag: 0,
            sequence_number: 0,
            purpose_id: 0,
            remote_node_id: 1,
            goodness: 80,
            bell_state: BellState::PhiPlus,
        });
        processor.handle_epr_response(response).unwrap();
        let handle = processor.shared_memory(0).unwrap();
        let memory = handle.lock().unwrap();
        assert_eq!(memory.get_array_entry(2, 2).unwrap(), Some(1)); // outcome
        assert_eq!(memory.get_array_entry(2, 3).unwrap(), Some(Basis::Z as i64));
    }

    #[test]
    fn wait_on_undefined_value_without_responses_is_fatal() {
        let mut processor = processor();
        let err = run(
            &mut processor,
            "# NETQASM 0.0\n\
             # APPID 0\n\
             array(1) @0\n\
             wait @0\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetQasmError::Resource(_)));
    }

    #[test]
    fn error_response_is_protocol_error() {
        let mut processor = processor();
        let err = processor
            .handle_epr_response(LinkLayerResponse::Err(crate::core::qlink::LinkLayerErr {
                create_id: 0,
                error_code: crate::core::qlink::ErrorCode::Timeout,
                use_sequence_number_range: false,
                sequence_number_low: 0,
                sequence_number_high: 0,
                origin_node_id: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, NetQasmError::Protocol(_)));
    }
}
