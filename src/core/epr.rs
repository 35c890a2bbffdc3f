//! Wire codec for entanglement-generation requests and results.
//!
//! Requests travel as a fixed 20-slot array of optional integers and results
//! come back as fixed 10-slot records, both through the same shared-memory
//! arrays ordinary classical data uses. An unset slot is meaningful: it says
//! "absent", which is not the same as zero.

use std::fmt;

use serde::Serialize;

use crate::core::error::{NetQasmError, Result};
use crate::core::futures::{Array, Future};

/// Kind of entanglement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EprType {
    /// Create and keep the entangled qubit.
    K = 0,
    /// Measure directly.
    M = 1,
    /// Remote state preparation.
    R = 2,
}

impl EprType {
    pub fn from_tag(tag: i64) -> Result<Self> {
        match tag {
            0 => Ok(EprType::K),
            1 => Ok(EprType::M),
            2 => Ok(EprType::R),
            other => Err(NetQasmError::protocol(format!(
                "{} is not a known entanglement request type",
                other
            ))),
        }
    }
}

/// Which side of the pair generation a node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EprRole {
    Create,
    Recv,
}

/// Random measurement basis sets a request may ask the link layer to draw
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RandomBasis {
    None = 0,
    XZ = 1,
    XYZ = 2,
    Chsh = 3,
}

impl RandomBasis {
    pub fn from_tag(tag: i64) -> Result<Self> {
        match tag {
            0 => Ok(RandomBasis::None),
            1 => Ok(RandomBasis::XZ),
            2 => Ok(RandomBasis::XYZ),
            3 => Ok(RandomBasis::Chsh),
            other => Err(NetQasmError::protocol(format!(
                "{} is not a known random basis set",
                other
            ))),
        }
    }
}

/// Basis the link layer reports a direct measurement was done in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Basis {
    Z = 0,
    X = 1,
    Y = 2,
    ZPlusX = 3,
    ZMinusX = 4,
}

impl Basis {
    pub fn from_tag(tag: i64) -> Result<Self> {
        match tag {
            0 => Ok(Basis::Z),
            1 => Ok(Basis::X),
            2 => Ok(Basis::Y),
            3 => Ok(Basis::ZPlusX),
            4 => Ok(Basis::ZMinusX),
            other => Err(NetQasmError::protocol(format!(
                "{} is not a known measurement basis",
                other
            ))),
        }
    }
}

/// The four Bell states a generation attempt can physically produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BellState {
    /// |00> + |11>
    PhiPlus = 0,
    /// |00> - |11>
    PhiMinus = 1,
    /// |01> + |10>
    PsiPlus = 2,
    /// |01> - |10>
    PsiMinus = 3,
}

impl BellState {
    pub fn from_tag(tag: i64) -> Result<Self> {
        match tag {
            0 => Ok(BellState::PhiPlus),
            1 => Ok(BellState::PhiMinus),
            2 => Ok(BellState::PsiPlus),
            3 => Ok(BellState::PsiMinus),
            other => Err(NetQasmError::protocol(format!(
                "{} is not a known Bell state tag",
                other
            ))),
        }
    }
}

impl fmt::Display for BellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BellState::PhiPlus => "PHI_PLUS",
            BellState::PhiMinus => "PHI_MINUS",
            BellState::PsiPlus => "PSI_PLUS",
            BellState::PsiMinus => "PSI_MINUS",
        };
        write!(f, "{}", name)
    }
}

/// Unit of the request's time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeUnit {
    MicroSeconds = 0,
    MilliSeconds = 1,
    Seconds = 2,
}

/// Named measurement bases expressible as rotation-angle triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EprMeasBasis {
    X,
    Y,
    Z,
    MX,
    MY,
    MZ,
}

/// Rotation angles are in multiples of pi/16.
pub fn basis_to_rotation(basis: EprMeasBasis) -> (i64, i64, i64) {
    match basis {
        EprMeasBasis::X => (0, 24, 0),
        EprMeasBasis::Y => (8, 0, 0),
        EprMeasBasis::Z => (0, 0, 0),
        EprMeasBasis::MX => (0, 8, 0),
        EprMeasBasis::MY => (24, 0, 0),
        EprMeasBasis::MZ => (16, 0, 0),
    }
}

pub fn rotation_to_basis(rotations: (i64, i64, i64)) -> Option<EprMeasBasis> {
    match rotations {
        (0, 24, 0) => Some(EprMeasBasis::X),
        (8, 0, 0) => Some(EprMeasBasis::Y),
        (0, 0, 0) => Some(EprMeasBasis::Z),
        (0, 8, 0) => Some(EprMeasBasis::MX),
        (24, 0, 0) => Some(EprMeasBasis::MY),
        (16, 0, 0) => Some(EprMeasBasis::MZ),
        _ => None,
    }
}

/// Parameters of one entanglement-generation request.
#[derive(Debug, Clone)]
pub struct EntRequestParams {
    pub remote_node_id: u32,
    pub epr_socket_id: u32,
    pub number: usize,
    pub sequential: bool,
    pub time_unit: TimeUnit,
    pub max_time: i64,
    pub expect_phi_plus: bool,
    pub min_fidelity: Option<i64>,
    pub random_basis_local: Option<RandomBasis>,
    pub random_basis_remote: Option<RandomBasis>,
    pub rotations_local: (i64, i64, i64),
    pub rotations_remote: (i64, i64, i64),
}

impl Default for EntRequestParams {
    fn default() -> Self {
        EntRequestParams {
            remote_node_id: 0,
            epr_socket_id: 0,
            number: 1,
            sequential: false,
            time_unit: TimeUnit::MicroSeconds,
            max_time: 0,
            expect_phi_plus: true,
            min_fidelity: None,
            random_basis_local: None,
            random_basis_remote: None,
            rotations_local: (0, 0, 0),
            rotations_remote: (0, 0, 0),
        }
    }
}

// Slot layout of a serialized create request.
pub const SER_CREATE_IDX_TYPE: usize = 0;
pub const SER_CREATE_IDX_NUMBER: usize = 1;
pub const SER_CREATE_IDX_RANDOM_BASIS_LOCAL: usize = 2;
pub const SER_CREATE_IDX_RANDOM_BASIS_REMOTE: usize = 3;
pub const SER_CREATE_IDX_MINIMUM_FIDELITY: usize = 4;
pub const SER_CREATE_IDX_TIME_UNIT: usize = 5;
pub const SER_CREATE_IDX_MAX_TIME: usize = 6;
pub const SER_CREATE_IDX_PRIORITY: usize = 7;
pub const SER_CREATE_IDX_ATOMIC: usize = 8;
pub const SER_CREATE_IDX_CONSECUTIVE: usize = 9;
pub const SER_CREATE_IDX_PROBABILITY_DIST_LOCAL1: usize = 10;
pub const SER_CREATE_IDX_PROBABILITY_DIST_LOCAL2: usize = 11;
pub const SER_CREATE_IDX_PROBABILITY_DIST_REMOTE1: usize = 12;
pub const SER_CREATE_IDX_PROBABILITY_DIST_REMOTE2: usize = 13;
pub const SER_CREATE_IDX_ROTATION_X_LOCAL1: usize = 14;
pub const SER_CREATE_IDX_ROTATION_Y_LOCAL: usize = 15;
pub const SER_CREATE_IDX_ROTATION_X_LOCAL2: usize = 16;
pub const SER_CREATE_IDX_ROTATION_X_REMOTE1: usize = 17;
pub const SER_CREATE_IDX_ROTATION_Y_REMOTE: usize = 18;
pub const SER_CREATE_IDX_ROTATION_X_REMOTE2: usize = 19;

/// Length of a serialized create request.
pub const SER_CREATE_LEN: usize = SER_CREATE_IDX_ROTATION_X_REMOTE2 + 1;

// Slot layout of one create-and-keep result record.
pub const SER_RESPONSE_KEEP_IDX_TYPE: usize = 0;
pub const SER_RESPONSE_KEEP_IDX_CREATE_ID: usize = 1;
pub const SER_RESPONSE_KEEP_IDX_LOGICAL_QUBIT_ID: usize = 2;
pub const SER_RESPONSE_KEEP_IDX_DIRECTIONALITY_FLAG: usize = 3;
pub const SER_RESPONSE_KEEP_IDX_SEQUENCE_NUMBER: usize = 4;
pub const SER_RESPONSE_KEEP_IDX_PURPOSE_ID: usize = 5;
pub const SER_RESPONSE_KEEP_IDX_REMOTE_NODE_ID: usize = 6;
pub const SER_RESPONSE_KEEP_IDX_GOODNESS: usize = 7;
pub const SER_RESPONSE_KEEP_IDX_GOODNESS_TIME: usize = 8;
pub const SER_RESPONSE_KEEP_IDX_BELL_STATE: usize = 9;

/// Length of one create-and-keep result record.
pub const SER_RESPONSE_KEEP_LEN: usize = SER_RESPONSE_KEEP_IDX_BELL_STATE + 1;

// Slot layout of one measure-directly result record.
pub const SER_RESPONSE_MEASURE_IDX_TYPE: usize = 0;
pub const SER_RESPONSE_MEASURE_IDX_CREATE_ID: usize = 1;
pub const SER_RESPONSE_MEASURE_IDX_MEASUREMENT_OUTCOME: usize = 2;
pub const SER_RESPONSE_MEASURE_IDX_MEASUREMENT_BASIS: usize = 3;
pub const SER_RESPONSE_MEASURE_IDX_DIRECTIONALITY_FLAG: usize = 4;
pub const SER_RESPONSE_MEASURE_IDX_SEQUENCE_NUMBER: usize = 5;
pub const SER_RESPONSE_MEASURE_IDX_PURPOSE_ID: usize = 6;
pub const SER_RESPONSE_MEASURE_IDX_REMOTE_NODE_ID: usize = 7;
pub const SER_RESPONSE_MEASURE_IDX_GOODNESS: usize = 8;
pub const SER_RESPONSE_MEASURE_IDX_BELL_STATE: usize = 9;

/// Length of one measure-directly result record.
pub const SER_RESPONSE_MEASURE_LEN: usize = SER_RESPONSE_MEASURE_IDX_BELL_STATE + 1;

/// Serializes a request into the 20-slot array form the engine stores in
/// shared memory.
///
/// Slots stay unset unless they carry information. A zero time budget means
/// "unbounded" and leaves the time slots unset. Rotation and random-basis
/// slots are only written for measure-directly and remote-state-preparation
/// requests, and only when non-trivial.
pub fn serialize_request(tp: EprType, params: &EntRequestParams) -> Vec<Option<i64>> {
    let mut array: Vec<Option<i64>> = vec![None; SER_CREATE_LEN];

    array[SER_CREATE_IDX_TYPE] = Some(tp as i64);
    array[SER_CREATE_IDX_NUMBER] = Some(params.number as i64);

    if params.max_time != 0 {
        array[SER_CREATE_IDX_TIME_UNIT] = Some(params.time_unit as i64);
        array[SER_CREATE_IDX_MAX_TIME] = Some(params.max_time);
    }

    if let Some(min_fidelity) = params.min_fidelity {
        array[SER_CREATE_IDX_MINIMUM_FIDELITY] = Some(min_fidelity);
    }

    if tp == EprType::M || tp == EprType::R {
        if params.rotations_local != (0, 0, 0) {
            array[SER_CREATE_IDX_ROTATION_X_LOCAL1] = Some(params.rotations_local.0);
            array[SER_CREATE_IDX_ROTATION_Y_LOCAL] = Some(params.rotations_local.1);
            array[SER_CREATE_IDX_ROTATION_X_LOCAL2] = Some(params.rotations_local.2);
        }
        if params.rotations_remote != (0, 0, 0) {
            array[SER_CREATE_IDX_ROTATION_X_REMOTE1] = Some(params.rotations_remote.0);
            array[SER_CREATE_IDX_ROTATION_Y_REMOTE] = Some(params.rotations_remote.1);
            array[SER_CREATE_IDX_ROTATION_X_REMOTE2] = Some(params.rotations_remote.2);
        }
        if let Some(basis) = params.random_basis_local {
            if basis != RandomBasis::None {
                array[SER_CREATE_IDX_RANDOM_BASIS_LOCAL] = Some(basis as i64);
            }
        }
        if let Some(basis) = params.random_basis_remote {
            if basis != RandomBasis::None {
                array[SER_CREATE_IDX_RANDOM_BASIS_REMOTE] = Some(basis as i64);
            }
        }
    }

    array
}

/// Largest useful time budget in microseconds for a requested minimum
/// fidelity, from device calibration.
pub fn max_time_for_fidelity(min_fidelity: i64) -> i64 {
    100_000 - min_fidelity * 900
}

/// One create-and-keep result, projected from its record in the result
/// array. The fields are Futures because the record is written during
/// execution, after the handles are handed out.
#[derive(Debug, Clone)]
pub struct EprKeepResult {
    pub qubit_id: Future,
    pub remote_node_id: Future,
    pub generation_duration: Future,
    pub raw_bell_state: Future,
}

impl EprKeepResult {
    /// Decoded Bell state; usable once the backing record has been written.
    pub fn bell_state(&mut self) -> Result<BellState> {
        BellState::from_tag(self.raw_bell_state.value()?)
    }
}

/// One measure-directly result, projected from its record in the result
/// array.
#[derive(Debug, Clone)]
pub struct EprMeasureResult {
    pub raw_measurement_outcome: Future,
    pub measurement_basis_local: (i64, i64, i64),
    pub measurement_basis_remote: (i64, i64, i64),
    pub post_process: bool,
    pub remote_node_id: Future,
    pub generation_duration: Future,
    pub raw_bell_state: Future,
}

impl EprMeasureResult {
    pub fn bell_state(&mut self) -> Result<BellState> {
        BellState::from_tag(self.raw_bell_state.value()?)
    }

    /// The measurement outcome, post-processed when the request asked for
    /// Phi+ statistics.
    ///
    /// When another Bell state was physically produced, a classical bit flip
    /// depending on that state and the measurement basis makes the outcome
    /// statistics match a measured Phi+ pair. Requires equal local and
    /// remote bases and one of X, Y, Z; otherwise the raw outcome has to be
    /// interpreted by the caller directly.
    pub fn measurement_outcome(&mut self) -> Result<i64> {
        if !self.post_process {
            return self.raw_measurement_outcome.value();
        }

        let local = rotation_to_basis(self.measurement_basis_local);
        let remote = rotation_to_basis(self.measurement_basis_remote);
        if local != remote {
            return Err(NetQasmError::protocol(format!(
                "local and remote measurement bases differ (local={:?}, remote={:?}); \
                 use the raw outcome instead",
                local, remote
            )));
        }
        let local = match local {
            Some(basis) => basis,
            None => {
                return Err(NetQasmError::protocol(format!(
                    "measurement basis {:?} is not one of X, Y or Z; \
                     use the raw outcome instead",
                    self.measurement_basis_local
                )))
            }
        };

        let mut outcome = self.raw_measurement_outcome.value()?;
        let flips: &[EprMeasBasis] = match self.bell_state()? {
            BellState::PhiPlus => &[],
            // Z gate applied to Phi+
            BellState::PhiMinus => {
                &[EprMeasBasis::X, EprMeasBasis::MX, EprMeasBasis::Y, EprMeasBasis::MY]
            }
            // X gate applied to Phi+
            BellState::PsiPlus => {
                &[EprMeasBasis::Y, EprMeasBasis::MY, EprMeasBasis::Z, EprMeasBasis::MZ]
            }
            // both X and Z applied to Phi+
            BellState::PsiMinus => {
                &[EprMeasBasis::X, EprMeasBasis::MX, EprMeasBasis::Z, EprMeasBasis::MZ]
            }
        };
        if flips.contains(&local) {
            outcome ^= 1;
        }
        Ok(outcome)
    }
}

/// Projects a result array into one create-and-keep record per pair.
///
/// The array length has to be exactly the pair count times the record
/// width; anything else is a protocol error.
pub fn deserialize_epr_keep_results(
    params: &EntRequestParams,
    array: &Array,
) -> Result<Vec<EprKeepResult>> {
    let expected = params.number * SER_RESPONSE_KEEP_LEN;
    if array.len() != expected {
        return Err(NetQasmError::protocol(format!(
            "result array has length {}, expected {} for {} create-and-keep records",
            array.len(),
            expected,
            params.number
        )));
    }
    let mut results = Vec::with_capacity(params.number);
    for i in 0..params.number {
        let base = i * SER_RESPONSE_KEEP_LEN;
        results.push(EprKeepResult {
            qubit_id: array.get_future_index(base + SER_RESPONSE_KEEP_IDX_LOGICAL_QUBIT_ID)?,
            remote_node_id: array.get_future_index(base + SER_RESPONSE_KEEP_IDX_REMOTE_NODE_ID)?,
            generation_duration: array.get_future_index(base + SER_RESPONSE_KEEP_IDX_GOODNESS)?,
            raw_bell_state: array.get_future_index(base + SER_RESPONSE_KEEP_IDX_BELL_STATE)?,
        });
    }
    Ok(results)
}

/// Projects a result array into one measure-directly record per pair.
pub fn deserialize_epr_measure_results(
    params: &EntRequestParams,
    array: &Array,
    role: EprRole,
) -> Result<Vec<EprMeasureResult>> {
    let expected = params.number * SER_RESPONSE_MEASURE_LEN;
    if array.len() != expected {
        return Err(NetQasmError::protocol(format!(
            "result array has length {}, expected {} for {} measure-directly records",
            array.len(),
            expected,
            params.number
        )));
    }
    let mut results = Vec::with_capacity(params.number);
    for i in 0..params.number {
        let base = i * SER_RESPONSE_MEASURE_LEN;
        results.push(EprMeasureResult {
            raw_measurement_outcome: array
                .get_future_index(base + SER_RESPONSE_MEASURE_IDX_MEASUREMENT_OUTCOME)?,
            measurement_basis_local: params.rotations_local,
            measurement_basis_remote: params.rotations_remote,
            post_process: params.expect_phi_plus && role == EprRole::Recv,
            remote_node_id: array
                .get_future_index(base + SER_RESPONSE_MEASURE_IDX_REMOTE_NODE_ID)?,
            generation_duration: array
                .get_future_index(base + SER_RESPONSE_MEASURE_IDX_GOODNESS)?,
            raw_bell_state: array.get_future_index(base + SER_RESPONSE_MEASURE_IDX_BELL_STATE)?,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::SharedMemoryManager;

    #[test]
    fn keep_request_sets_only_type_and_number() {
        let params = EntRequestParams::default();
        let array = serialize_request(EprType::K, &params);
        assert_eq!(array.len(), SER_CREATE_LEN);
        assert_eq!(array[SER_CREATE_IDX_TYPE], Some(0));
        assert_eq!(array[SER_CREATE_IDX_NUMBER], Some(1));
        assert!(array
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > SER_CREATE_IDX_NUMBER)
            .all(|(_, slot)| slot.is_none()));
    }

    #[test]
    fn zero_time_budget_leaves_time_slots_unset() {
        let mut params = EntRequestParams::default();
        let array = serialize_request(EprType::K, &params);
        assert_eq!(array[SER_CREATE_IDX_TIME_UNIT], None);
        assert_eq!(array[SER_CREATE_IDX_MAX_TIME], None);

        params.max_time = 500;
        let array = serialize_request(EprType::K, &params);
        assert_eq!(
            array[SER_CREATE_IDX_TIME_UNIT],
            Some(TimeUnit::MicroSeconds as i64)
        );
        assert_eq!(array[SER_CREATE_IDX_MAX_TIME], Some(500));
    }

    #[test]
    fn rotations_only_written_for_measure_requests() {
        let mut params = EntRequestParams::default();
        params.rotations_local = basis_to_rotation(EprMeasBasis::X);
        let array = serialize_request(EprType::K, &params);
        assert_eq!(array[SER_CREATE_IDX_ROTATION_Y_LOCAL], None);

        let array = serialize_request(EprType::M, &params);
        assert_eq!(array[SER_CREATE_IDX_ROTATION_X_LOCAL1], Some(0));
        assert_eq!(array[SER_CREATE_IDX_ROTATION_Y_LOCAL], Some(24));
        assert_eq!(array[SER_CREATE_IDX_ROTATION_X_LOCAL2], Some(0));
        // all-zero triple means the Z basis and stays absent
        assert_eq!(array[SER_CREATE_IDX_ROTATION_X_REMOTE1], None);
    }

    #[test]
    fn bell_state_tags_decode_and_reject() {
        assert_eq!(BellState::from_tag(0).unwrap(), BellState::PhiPlus);
        assert_eq!(BellState::from_tag(3).unwrap(), BellState::PsiMinus);
        assert!(matches!(
            BellState::from_tag(4).unwrap_err(),
            NetQasmError::Protocol(_)
        ));
    }

    #[test]
    fn rotation_basis_tables_are_inverse() {
        for basis in [
            EprMeasBasis::X,
            EprMeasBasis::Y,
            EprMeasBasis::Z,
            EprMeasBasis::MX,
            EprMeasBasis::MY,
            EprMeasBasis::MZ,
        ] {
            assert_eq!(rotation_to_basis(basis_to_rotation(basis)), Some(basis));
        }
        assert_eq!(rotation_to_basis((1, 2, 3)), None);
    }

    #[test]
    fn fidelity_calibration() {
        assert_eq!(max_time_for_fidelity(0), 100_000);
        assert_eq!(max_time_for_fidelity(100), 10_000);
    }

    #[test]
    fn keep_results_require_exact_length() {
        let mut manager = SharedMemoryManager::new();
        let handle = manager.create(0);
        handle.lock().unwrap().init_array(0, 15).unwrap();
        let array = Array::new(handle, 0, 15);
        let mut params = EntRequestParams::default();
        params.number = 2;
        assert!(matches!(
            deserialize_epr_keep_results(&params, &array).unwrap_err(),
            NetQasmError::Protocol(_)
        ));
    }

    #[test]
    fn measure_outcome_post_processing_flips_for_psi_plus_in_z() {
        let mut manager = SharedMemoryManager::new();
        let handle = manager.create(0);
        handle
            .lock()
            .unwrap()
            .init_array(0, SER_RESPONSE_MEASURE_LEN)
            .unwrap();
        {
            let mut memory = handle.lock().unwrap();
            memory
                .set_array_entry(0, SER_RESPONSE_MEASURE_IDX_MEASUREMENT_OUTCOME, 0)
                .unwrap();
            memory
                .set_array_entry(
                    0,
                    SER_RESPONSE_MEASURE_IDX_BELL_STATE,
                    BellState::PsiPlus as i64,
                )
                .unwrap();
        }
        let array = Array::new(handle, 0, SER_RESPONSE_MEASURE_LEN);
        let params = EntRequestParams::default();
        let mut results =
            deserialize_epr_measure_results(&params, &array, EprRole::Recv).unwrap();
        assert_eq!(results.len(), 1);
        // Z basis measurement of a Psi+ pair flips the receiver's outcome.
        assert_eq!(results[0].measurement_outcome().unwrap(), 1);
        assert_eq!(results[0].raw_measurement_outcome.value().unwrap(), 0);
    }

    #[test]
    fn raw_outcome_used_without_post_processing() {
        let mut manager = SharedMemoryManager::new();
        let handle = manager.create(0);
        handle
            .lock()
            .unwrap()
            .init_array(0, SER_RESPONSE_MEASURE_LEN)
            .unwrap();
        handle
            .lock()
            .unwrap()
            .set_array_entry(0, SER_RESPONSE_MEASURE_IDX_MEASUREMENT_OUTCOME, 1)
            .unwrap();
        let array = Array::new(handle, 0, SER_RESPONSE_MEASURE_LEN);
        let params = EntRequestParams::default();
        let mut results =
            deserialize_epr_measure_results(&params, &array, EprRole::Create).unwrap();
        assert_eq!(results[0].measurement_outcome().unwrap(), 1);
    }
}
