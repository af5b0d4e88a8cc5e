//! Wire-contract types for the TF Scheduler RPC service (§6).
//!
//! These are plain serializable request/response structs; the HTTP
//! transport that carries them lives in `dd-transport`, the server-side
//! logic lives in `dd-scheduler`. Keeping them here lets every role depend
//! on one shared, versioned contract.

use crate::ids::TimeFrameId;
use serde::{Deserialize, Serialize};

/// `{processId, partitionId}` envelope carried by every request (§6).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub process_id: String,
    pub partition_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NumStfSendersRequest {
    pub envelope: RequestEnvelope,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NumStfSendersResponse {
    pub num_senders: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TfBuilderConnectionRequest {
    pub envelope: RequestEnvelope,
    pub builder_id: String,
    pub endpoint: String,
    pub capacity: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Ok,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfoWire {
    pub partition_id: String,
    pub sender_ids: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TfBuilderConnectionResponse {
    pub status: ConnectionStatus,
    pub partition_info: PartitionInfoWire,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TfBuilderDisconnectionRequest {
    pub envelope: RequestEnvelope,
    pub builder_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TfBuilderUpdateRequest {
    pub envelope: RequestEnvelope,
    pub builder_id: String,
    pub free_buffers: u32,
    pub load: f32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StfSenderStfUpdateRequest {
    pub envelope: RequestEnvelope,
    pub sender_id: String,
    pub tfid: TimeFrameId,
    pub bytes: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StfUpdateResult {
    NotReady,
    Assigned,
    Backoff,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StfSenderStfUpdateResponse {
    pub result: StfUpdateResult,
    pub builder_endpoint: Option<String>,
}

/// Reported by a sender when it could not reach the builder assigned to it
/// (§4.4, `BuilderUnreachable`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SendFailedRequest {
    pub envelope: RequestEnvelope,
    pub sender_id: String,
    pub tfid: TimeFrameId,
}
