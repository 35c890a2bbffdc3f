//! Link-layer message records and the compatibility shim translating them
//! to and from the qlink-interface 1.0 representation.
//!
//! The two generations carry the same information in different shapes, so
//! translation is 1:1 field reshaping. A message kind the shim does not
//! recognize is a protocol error, never a silent drop.

use serde::Serialize;

use crate::core::epr::{Basis, BellState, RandomBasis, TimeUnit};
use crate::core::error::{NetQasmError, Result};

/// Request kinds the link layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestType {
    K = 0,
    M = 1,
    R = 2,
    Recv = 3,
    StopRecv = 4,
}

/// Reply kinds the link layer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnType {
    OkK = 0,
    OkM = 1,
    OkR = 2,
    Err = 3,
    CreateId = 4,
}

/// Link-layer error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    Unsupp = 0,
    Notime = 1,
    Nores = 2,
    Timeout = 3,
    Rejected = 4,
    Other = 5,
    Expire = 6,
    Create = 7,
}

/// CREATE message asking the link layer to generate entanglement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkLayerCreate {
    pub remote_node_id: u32,
    pub purpose_id: u32,
    pub request_type: RequestType,
    pub number: u32,
    pub random_basis_local: RandomBasis,
    pub random_basis_remote: RandomBasis,
    pub minimum_fidelity: i64,
    pub time_unit: TimeUnit,
    pub max_time: i64,
    pub priority: i64,
    pub atomic: bool,
    pub consecutive: bool,
    pub probability_dist_local1: i64,
    pub probability_dist_local2: i64,
    pub probability_dist_remote1: i64,
    pub probability_dist_remote2: i64,
    pub rotation_x_local1: i64,
    pub rotation_y_local: i64,
    pub rotation_x_local2: i64,
    pub rotation_x_remote1: i64,
    pub rotation_y_remote: i64,
    pub rotation_x_remote2: i64,
}

impl Default for LinkLayerCreate {
    fn default() -> Self {
        LinkLayerCreate {
            remote_node_id: 0,
            purpose_id: 0,
            request_type: RequestType::K,
            number: 1,
            random_basis_local: RandomBasis::None,
            random_basis_remote: RandomBasis::None,
            minimum_fidelity: 0,
            time_unit: TimeUnit::MicroSeconds,
            max_time: 0,
            priority: 0,
            atomic: false,
            consecutive: false,
            probability_dist_local1: 0,
            probability_dist_local2: 0,
            probability_dist_remote1: 0,
            probability_dist_remote2: 0,
            rotation_x_local1: 0,
            rotation_y_local: 0,
            rotation_x_local2: 0,
            rotation_x_remote1: 0,
            rotation_y_remote: 0,
            rotation_x_remote2: 0,
        }
    }
}

/// RECV message allowing entanglement generation with a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkLayerRecv {
    pub remote_node_id: u32,
    pub purpose_id: u32,
}

/// OK reply for entanglement kept in memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkLayerOKTypeK {
    pub create_id: i64,
    pub logical_qubit_id: i64,
    pub directionality_flag: i64,
    pub sequence_number: i64,
    pub purpose_id: u32,
    pub remote_node_id: u32,
    pub goodness: i64,
    pub goodness_time: i64,
    pub bell_state: BellState,
}

/// OK reply for entanglement measured directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkLayerOKTypeM {
    pub create_id: i64,
    pub measurement_outcome: i64,
    pub measurement_basis: Basis,
    pub directionality_flag: i64,
    pub sequence_number: i64,
    pub purpose_id: u32,
    pub remote_node_id: u32,
    pub goodness: i64,
    pub bell_state: BellState,
}

/// Error reply from the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkLayerErr {
    pub create_id: i64,
    pub error_code: ErrorCode,
    pub use_sequence_number_range: bool,
    pub sequence_number_low: i64,
    pub sequence_number_high: i64,
    pub origin_node_id: u32,
}

/// Request in the current representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkLayerRequest {
    Create(LinkLayerCreate),
    Recv(LinkLayerRecv),
}

/// Response in the current representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkLayerResponse {
    OkK(LinkLayerOKTypeK),
    OkM(LinkLayerOKTypeM),
    Err(LinkLayerErr),
}

impl LinkLayerResponse {
    pub fn return_type(&self) -> ReturnType {
        match self {
            LinkLayerResponse::OkK(_) => ReturnType::OkK,
            LinkLayerResponse::OkM(_) => ReturnType::OkM,
            LinkLayerResponse::Err(_) => ReturnType::Err,
        }
    }
}

/// Node id of the node that submitted a create request, given the local
/// node id and the directionality flag of the reply.
pub fn creator_node_id(local_node_id: u32, directionality_flag: i64, remote_node_id: u32) -> u32 {
    if directionality_flag == 1 {
        remote_node_id
    } else {
        local_node_id
    }
}

/// Messages as the qlink-interface 1.0 generation shapes them: the rotation
/// and probability-distribution pairs are individual named fields and
/// create-and-keep requests carry no basis fields at all.
pub mod qlink_1_0 {
    use serde::Serialize;

    use crate::core::epr::{Basis, BellState, RandomBasis, TimeUnit};

    use super::ErrorCode;

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct ReqCreateAndKeep {
        pub remote_node_id: u32,
        pub minimum_fidelity: i64,
        pub time_unit: TimeUnit,
        pub max_time: i64,
        pub purpose_id: u32,
        pub number: u32,
        pub priority: i64,
        pub atomic: bool,
        pub consecutive: bool,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct ReqMeasureDirectly {
        pub remote_node_id: u32,
        pub minimum_fidelity: i64,
        pub time_unit: TimeUnit,
        pub max_time: i64,
        pub purpose_id: u32,
        pub number: u32,
        pub priority: i64,
        pub atomic: bool,
        pub consecutive: bool,
        pub random_basis_local: RandomBasis,
        pub random_basis_remote: RandomBasis,
        pub x_rotation_angle_local_1: i64,
        pub y_rotation_angle_local: i64,
        pub x_rotation_angle_local_2: i64,
        pub x_rotation_angle_remote_1: i64,
        pub y_rotation_angle_remote: i64,
        pub x_rotation_angle_remote_2: i64,
        pub probability_distribution_parameter_local_1: i64,
        pub probability_distribution_parameter_local_2: i64,
        pub probability_distribution_parameter_remote_1: i64,
        pub probability_distribution_parameter_remote_2: i64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct ReqReceive {
        pub remote_node_id: u32,
        pub purpose_id: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Request {
        CreateAndKeep(ReqCreateAndKeep),
        MeasureDirectly(ReqMeasureDirectly),
        Receive(ReqReceive),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct ResCreateAndKeep {
        pub create_id: i64,
        pub logical_qubit_id: i64,
        pub directionality_flag: i64,
        pub sequence_number: i64,
        pub purpose_id: u32,
        pub remote_node_id: u32,
        pub goodness: i64,
        pub time_of_goodness: i64,
        pub bell_state: BellState,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct ResMeasureDirectly {
        pub create_id: i64,
        pub measurement_outcome: i64,
        pub measurement_basis: Basis,
        pub directionality_flag: i64,
        pub sequence_number: i64,
        pub purpose_id: u32,
        pub remote_node_id: u32,
        pub goodness: i64,
        pub bell_state: BellState,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct ResError {
        pub create_id: i64,
        pub error_code: ErrorCode,
        pub use_sequence_number_range: bool,
        pub sequence_number_low: i64,
        pub sequence_number_high: i64,
        pub origin_node_id: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Response {
        CreateAndKeep(ResCreateAndKeep),
        MeasureDirectly(ResMeasureDirectly),
        Error(ResError),
    }
}

/// Translates a request into the qlink-interface 1.0 shape.
///
/// Remote-state-preparation requests have no 1.0 counterpart; passing one
/// is a protocol error.
pub fn request_to_qlink_1_0(request: &LinkLayerRequest) -> Result<qlink_1_0::Request> {
    match request {
        LinkLayerRequest::Create(create) => match create.request_type {
            RequestType::K => Ok(qlink_1_0::Request::CreateAndKeep(
                qlink_1_0::ReqCreateAndKeep {
                    remote_node_id: create.remote_node_id,
                    minimum_fidelity: create.minimum_fidelity,
                    time_unit: create.time_unit,
                    max_time: create.max_time,
                    purpose_id: create.purpose_id,
                    number: create.number,
                    priority: create.priority,
                    atomic: create.atomic,
                    consecutive: create.consecutive,
                },
            )),
            RequestType::M => Ok(qlink_1_0::Request::MeasureDirectly(
                qlink_1_0::ReqMeasureDirectly {
                    remote_node_id: create.remote_node_id,
                    minimum_fidelity: create.minimum_fidelity,
                    time_unit: create.time_unit,
                    max_time: create.max_time,
                    purpose_id: create.purpose_id,
                    number: create.number,
                    priority: create.priority,
                    atomic: create.atomic,
                    consecutive: create.consecutive,
                    random_basis_local: create.random_basis_local,
                    random_basis_remote: create.random_basis_remote,
                    x_rotation_angle_local_1: create.rotation_x_local1,
                    y_rotation_angle_local: create.rotation_y_local,
                    x_rotation_angle_local_2: create.rotation_x_local2,
                    x_rotation_angle_remote_1: create.rotation_x_remote1,
                    y_rotation_angle_remote: create.rotation_y_remote,
                    x_rotation_angle_remote_2: create.rotation_x_remote2,
                    probability_distribution_parameter_local_1: create.probability_dist_local1,
                    probability_distribution_parameter_local_2: create.probability_dist_local2,
                    probability_distribution_parameter_remote_1: create.probability_dist_remote1,
                    probability_distribution_parameter_remote_2: create.probability_dist_remote2,
                },
            )),
            other => Err(NetQasmError::protocol(format!(
                "cannot express a {:?} create request in qlink-interface 1.0",
                other
            ))),
        },
        LinkLayerRequest::Recv(recv) => Ok(qlink_1_0::Request::Receive(qlink_1_0::ReqReceive {
            remote_node_id: recv.remote_node_id,
            purpose_id: recv.purpose_id,
        })),
    }
}

/// Translates a qlink-interface 1.0 request back into the current shape.
pub fn request_from_qlink_1_0(request: &qlink_1_0::Request) -> LinkLayerRequest {
    match request {
        qlink_1_0::Request::CreateAndKeep(req) => LinkLayerRequest::Create(LinkLayerCreate {
            remote_node_id: req.remote_node_id,
            purpose_id: req.purpose_id,
            request_type: RequestType::K,
            number: req.number,
            minimum_fidelity: req.minimum_fidelity,
            time_unit: req.time_unit,
            max_time: req.max_time,
            priority: req.priority,
            atomic: req.atomic,
            consecutive: req.consecutive,
            ..LinkLayerCreate::default()
        }),
        qlink_1_0::Request::MeasureDirectly(req) => LinkLayerRequest::Create(LinkLayerCreate {
            remote_node_id: req.remote_node_id,
            purpose_id: req.purpose_id,
            request_type: RequestType::M,
            number: req.number,
            minimum_fidelity: req.minimum_fidelity,
            time_unit: req.time_unit,
            max_time: req.max_time,
            priority: req.priority,
            atomic: req.atomic,
            consecutive: req.consecutive,
            random_basis_local: req.random_basis_local,
            random_basis_remote: req.random_basis_remote,
            rotation_x_local1: req.x_rotation_angle_local_1,
            rotation_y_local: req.y_rotation_angle_local,
            rotation_x_local2: req.x_rotation_angle_local_2,
            rotation_x_remote1: req.x_rotation_angle_remote_1,
            rotation_y_remote: req.y_rotation_angle_remote,
            rotation_x_remote2: req.x_rotation_angle_remote_2,
            probability_dist_local1: req.probability_distribution_parameter_local_1,
            probability_dist_local2: req.probability_distribution_parameter_local_2,
            probability_dist_remote1: req.probability_distribution_parameter_remote_1,
            probability_dist_remote2: req.probability_distribution_parameter_remote_2,
        }),
        qlink_1_0::Request::Receive(req) => LinkLayerRequest::Recv(LinkLayerRecv {
            remote_node_id: req.remote_node_id,
            purpose_id: req.purpose_id,
        }),
    }
}

/// Translates a qlink-interface 1.0 response into the current shape.
pub fn response_from_qlink_1_0(response: &qlink_1_0::Response) -> LinkLayerResponse {
    match response {
        qlink_1_0::Response::CreateAndKeep(res) => LinkLayerResponse::OkK(LinkLayerOKTypeK {
            create_id: res.create_id,
            logical_qubit_id: res.logical_qubit_id,
            directionality_flag: res.directionality_flag,
            sequence_number: res.sequence_number,
            purpose_id: res.purpose_id,
            remote_node_id: res.remote_node_id,
            goodness: res.goodness,
            goodness_time: res.time_of_goodness,
            bell_state: res.bell_state,
        }),
        qlink_1_0::Response::MeasureDirectly(res) => LinkLayerResponse::OkM(LinkLayerOKTypeM {
            create_id: res.create_id,
            measurement_outcome: res.measurement_outcome,
            measurement_basis: res.measurement_basis,
            directionality_flag: res.directionality_flag,
            sequence_number: res.sequence_number,
            purpose_id: res.purpose_id,
            remote_node_id: res.remote_node_id,
            goodness: res.goodness,
            bell_state: res.bell_state,
        }),
        qlink_1_0::Response::Error(res) => LinkLayerResponse::Err(LinkLayerErr {
            create_id: res.create_id,
            error_code: res.error_code,
            use_sequence_number_range: res.use_sequence_number_range,
            sequence_number_low: res.sequence_number_low,
            sequence_number_high: res.sequence_number_high,
            origin_node_id: res.origin_node_id,
        }),
    }
}

/// Translates a response into the qlink-interface 1.0 shape.
pub fn response_to_qlink_1_0(response: &LinkLayerResponse) -> qlink_1_0::Response {
    match response {
        LinkLayerResponse::OkK(ok) => {
            qlink_1_0::Response::CreateAndKeep(qlink_1_0::ResCreateAndKeep {
                create_id: ok.create_id,
                logical_qubit_id: ok.logical_qubit_id,
                directionality_flag: ok.directionality_flag,
                sequence_number: ok.sequence_number,
                purpose_id: ok.purpose_id,
                remote_node_id: ok.remote_node_id,
                goodness: ok.goodness,
                time_of_goodness: ok.goodness_time,
                bell_state: ok.bell_state,
            })
        }
        LinkLayerResponse::OkM(ok) => {
            qlink_1_0::Response::MeasureDirectly(qlink_1_0::ResMeasureDirectly {
                create_id: ok.create_id,
                measurement_outcome: ok.measurement_outcome,
                measurement_basis: ok.measurement_basis,
                directionality_flag: ok.directionality_flag,
                sequence_number: ok.sequence_number,
                purpose_id: ok.purpose_id,
                remote_node_id: ok.remote_node_id,
                goodness: ok.goodness,
                bell_state: ok.bell_state,
            })
        }
        LinkLayerResponse::Err(err) => qlink_1_0::Response::Error(qlink_1_0::ResError {
            create_id: err.create_id,
            error_code: err.error_code,
            use_sequence_number_range: err.use_sequence_number_range,
            sequence_number_low: err.sequence_number_low,
            sequence_number_high: err.sequence_number_high,
            origin_node_id: err.origin_node_id,
        }),
    }
}
