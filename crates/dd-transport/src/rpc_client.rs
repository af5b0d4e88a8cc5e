//! Blocking HTTP client for the TF Scheduler RPC protocol (§6).
//!
//! Calls are synchronous from the caller's perspective (§5), so this wraps
//! `reqwest`'s blocking client rather than pulling an async runtime into the
//! builder/sender worker threads.

use dd_types::rpc::{
    NumStfSendersRequest, NumStfSendersResponse, RequestEnvelope, SendFailedRequest,
    StatusResponse, StfSenderStfUpdateRequest, StfSenderStfUpdateResponse, StfUpdateResult,
    TfBuilderConnectionRequest, TfBuilderConnectionResponse, TfBuilderDisconnectionRequest,
    TfBuilderUpdateRequest,
};
use dd_types::TimeFrameId;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("scheduler request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scheduler returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Caps the exponential backoff applied when the scheduler answers an STF
/// update with `Backoff` (§6).
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Interval between connection attempts while a role waits for the
/// scheduler to come up at startup.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

pub struct SchedulerClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl SchedulerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, RpcError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()?;
        let resp = resp.error_for_status().map_err(|e| {
            e.status()
                .map(RpcError::Status)
                .unwrap_or_else(|| RpcError::Transport(e))
        })?;
        Ok(resp.json()?)
    }

    pub fn num_stf_senders(
        &self,
        envelope: RequestEnvelope,
    ) -> Result<NumStfSendersResponse, RpcError> {
        self.post("/num-stf-senders", &NumStfSendersRequest { envelope })
    }

    /// Retries `connect` every [`CONNECT_RETRY_INTERVAL`] until it succeeds,
    /// mirroring a role's startup sequencing against a scheduler that may
    /// not be up yet.
    pub fn connect_with_retry(
        &self,
        envelope: RequestEnvelope,
        builder_id: &str,
        endpoint: &str,
        capacity: u32,
    ) -> TfBuilderConnectionResponse {
        loop {
            match self.connect(envelope.clone(), builder_id, endpoint, capacity) {
                Ok(resp) => return resp,
                Err(err) => {
                    log::warn!("scheduler connect failed, retrying: {err}");
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        }
    }

    pub fn connect(
        &self,
        envelope: RequestEnvelope,
        builder_id: &str,
        endpoint: &str,
        capacity: u32,
    ) -> Result<TfBuilderConnectionResponse, RpcError> {
        self.post(
            "/builder/connect",
            &TfBuilderConnectionRequest {
                envelope,
                builder_id: builder_id.to_string(),
                endpoint: endpoint.to_string(),
                capacity,
            },
        )
    }

    pub fn disconnect(
        &self,
        envelope: RequestEnvelope,
        builder_id: &str,
    ) -> Result<StatusResponse, RpcError> {
        self.post(
            "/builder/disconnect",
            &TfBuilderDisconnectionRequest {
                envelope,
                builder_id: builder_id.to_string(),
            },
        )
    }

    pub fn update(
        &self,
        envelope: RequestEnvelope,
        builder_id: &str,
        free_buffers: u32,
        load: f32,
    ) -> Result<StatusResponse, RpcError> {
        self.post(
            "/builder/update",
            &TfBuilderUpdateRequest {
                envelope,
                builder_id: builder_id.to_string(),
                free_buffers,
                load,
            },
        )
    }

    pub fn stf_update(
        &self,
        envelope: RequestEnvelope,
        sender_id: &str,
        tfid: TimeFrameId,
        bytes: u64,
    ) -> Result<StfSenderStfUpdateResponse, RpcError> {
        self.post(
            "/sender/stf-update",
            &StfSenderStfUpdateRequest {
                envelope,
                sender_id: sender_id.to_string(),
                tfid,
                bytes,
            },
        )
    }

    /// Polls `stf_update` until the scheduler assigns a builder, backing off
    /// exponentially (capped at [`MAX_BACKOFF`]) on every `Backoff` answer.
    pub fn stf_update_until_assigned(
        &self,
        envelope: RequestEnvelope,
        sender_id: &str,
        tfid: TimeFrameId,
        bytes: u64,
    ) -> Result<StfSenderStfUpdateResponse, RpcError> {
        let mut backoff = Duration::from_millis(10);
        loop {
            let resp = self.stf_update(envelope.clone(), sender_id, tfid, bytes)?;
            match resp.result {
                StfUpdateResult::Assigned | StfUpdateResult::Failed => return Ok(resp),
                StfUpdateResult::NotReady | StfUpdateResult::Backoff => {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                }
            }
        }
    }

    pub fn send_failed(
        &self,
        envelope: RequestEnvelope,
        sender_id: &str,
        tfid: TimeFrameId,
    ) -> Result<StatusResponse, RpcError> {
        self.post(
            "/sender/send-failed",
            &SendFailedRequest {
                envelope,
                sender_id: sender_id.to_string(),
                tfid,
            },
        )
    }
}
