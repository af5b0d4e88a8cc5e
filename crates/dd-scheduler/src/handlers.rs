//! Wires the four scheduler RPC operations plus `SendFailed` (§4.6) to the
//! membership registry and the per-TFID state machine.

use crate::config::SchedulerConfig;
use crate::membership::BuilderRegistry;
use crate::tf_state::TfTable;
use dd_transport::rpc_server::SchedulerHandlers;
use dd_types::rpc::{
    NumStfSendersRequest, NumStfSendersResponse, PartitionInfoWire, SendFailedRequest,
    StatusResponse, StfSenderStfUpdateRequest, StfSenderStfUpdateResponse, StfUpdateResult,
    TfBuilderConnectionRequest, TfBuilderConnectionResponse, TfBuilderDisconnectionRequest,
    TfBuilderUpdateRequest,
};
use dd_types::rpc::ConnectionStatus;

pub struct SchedulerState {
    config: SchedulerConfig,
    builders: BuilderRegistry,
    tfs: TfTable,
}

impl SchedulerState {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            builders: BuilderRegistry::new(),
            tfs: TfTable::new(),
        }
    }

    pub fn builders(&self) -> &BuilderRegistry {
        &self.builders
    }

    pub fn tfs(&self) -> &TfTable {
        &self.tfs
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// §4.6 step 1-3: attempts to select and dispatch a builder for a READY
    /// TFID. A no-op if no builder currently has capacity (the TFID stays
    /// READY for the next contribution or heartbeat to re-trigger it).
    fn try_assign(&self, tfid: dd_types::TimeFrameId) {
        if let Some(builder_id) = self.builders.select(self.config.builder_timeout()) {
            self.builders.decrement_free_buffers(&builder_id);
            self.tfs.dispatch(tfid, &builder_id);
            metrics::counter!("scheduler_tf_dispatched_total").increment(1);
        }
    }
}

impl SchedulerHandlers for SchedulerState {
    fn on_num_stf_senders(&self, _req: NumStfSendersRequest) -> Result<NumStfSendersResponse, String> {
        Ok(NumStfSendersResponse {
            num_senders: self.config.sender_ids.len() as u32,
        })
    }

    fn on_builder_connect(
        &self,
        req: TfBuilderConnectionRequest,
    ) -> Result<TfBuilderConnectionResponse, String> {
        self.builders.connect(&req.builder_id, &req.endpoint, req.capacity);
        log::info!("builder {} connected at {}", req.builder_id, req.endpoint);
        metrics::counter!("scheduler_builder_connections_total").increment(1);
        Ok(TfBuilderConnectionResponse {
            status: ConnectionStatus::Ok,
            partition_info: PartitionInfoWire {
                partition_id: self.config.partition_id.clone(),
                sender_ids: self.config.sender_ids.clone(),
            },
        })
    }

    fn on_builder_disconnect(
        &self,
        req: TfBuilderDisconnectionRequest,
    ) -> Result<StatusResponse, String> {
        self.builders.disconnect(&req.builder_id);
        log::info!("builder {} disconnected", req.builder_id);
        Ok(StatusResponse {
            status: ConnectionStatus::Ok,
        })
    }

    fn on_builder_update(&self, req: TfBuilderUpdateRequest) -> Result<StatusResponse, String> {
        if !self.builders.update(&req.builder_id, req.free_buffers) {
            return Err(format!("unknown builder {}", req.builder_id));
        }
        log::trace!(
            "builder {} heartbeat: free_buffers={} load={:.2}",
            req.builder_id,
            req.free_buffers,
            req.load
        );
        Ok(StatusResponse {
            status: ConnectionStatus::Ok,
        })
    }

    fn on_sender_stf_update(
        &self,
        req: StfSenderStfUpdateRequest,
    ) -> Result<StfSenderStfUpdateResponse, String> {
        let (_, became_ready) =
            self.tfs
                .record_contribution(req.tfid, &req.sender_id, req.bytes, self.config.sender_ids.len());
        if became_ready {
            self.try_assign(req.tfid);
        }

        let result = self.tfs.poll_result(req.tfid);
        let builder_endpoint = match result {
            StfUpdateResult::Assigned => self
                .tfs
                .assigned_builder(req.tfid)
                .and_then(|id| self.builders.endpoint_of(&id)),
            _ => None,
        };
        let result = if result == StfUpdateResult::NotReady && self.builders.is_empty() {
            StfUpdateResult::Backoff
        } else {
            result
        };

        Ok(StfSenderStfUpdateResponse { result, builder_endpoint })
    }

    fn on_send_failed(&self, req: SendFailedRequest) -> Result<StatusResponse, String> {
        if let Some(builder_id) = self.tfs.mark_failed(req.tfid) {
            self.builders.restore_free_buffer(&builder_id);
        }
        log::warn!("tfid {} failed to send, reported by sender {}", req.tfid, req.sender_id);
        metrics::counter!("scheduler_tf_failed_total").increment(1);
        Ok(StatusResponse {
            status: ConnectionStatus::Ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_types::rpc::RequestEnvelope;
    use dd_types::TimeFrameId;

    fn envelope() -> RequestEnvelope {
        RequestEnvelope {
            process_id: "p".into(),
            partition_id: "part0".into(),
        }
    }

    fn state_with_one_sender() -> SchedulerState {
        SchedulerState::new(SchedulerConfig {
            bind: "127.0.0.1:0".into(),
            partition_id: "part0".into(),
            sender_ids: vec!["s1".into()],
            builder_timeout_secs: 5,
            tf_grace_period_secs: 60,
        })
    }

    #[test]
    fn backoff_when_ready_but_no_builder_capacity() {
        let state = state_with_one_sender();
        let resp = state
            .on_sender_stf_update(StfSenderStfUpdateRequest {
                envelope: envelope(),
                sender_id: "s1".into(),
                tfid: TimeFrameId(1),
                bytes: 100,
            })
            .unwrap();
        assert_eq!(resp.result, StfUpdateResult::Backoff);
    }

    #[test]
    fn assigns_once_a_builder_is_connected() {
        let state = state_with_one_sender();
        state
            .on_builder_connect(TfBuilderConnectionRequest {
                envelope: envelope(),
                builder_id: "b1".into(),
                endpoint: "10.0.0.1:9000".into(),
                capacity: 4,
            })
            .unwrap();
        let resp = state
            .on_sender_stf_update(StfSenderStfUpdateRequest {
                envelope: envelope(),
                sender_id: "s1".into(),
                tfid: TimeFrameId(1),
                bytes: 100,
            })
            .unwrap();
        assert_eq!(resp.result, StfUpdateResult::Assigned);
        assert_eq!(resp.builder_endpoint, Some("10.0.0.1:9000".to_string()));
    }

    #[test]
    fn send_failed_restores_builder_capacity_and_fails_tfid() {
        let state = state_with_one_sender();
        state
            .on_builder_connect(TfBuilderConnectionRequest {
                envelope: envelope(),
                builder_id: "b1".into(),
                endpoint: "10.0.0.1:9000".into(),
                capacity: 1,
            })
            .unwrap();
        state
            .on_sender_stf_update(StfSenderStfUpdateRequest {
                envelope: envelope(),
                sender_id: "s1".into(),
                tfid: TimeFrameId(1),
                bytes: 0,
            })
            .unwrap();
        assert_eq!(state.builders.select(std::time::Duration::from_secs(5)), None);

        state
            .on_send_failed(SendFailedRequest {
                envelope: envelope(),
                sender_id: "s1".into(),
                tfid: TimeFrameId(1),
            })
            .unwrap();
        assert_eq!(state.builders.select(std::time::Duration::from_secs(5)), Some("b1".to_string()));
        assert_eq!(state.tfs.poll_result(TimeFrameId(1)), StfUpdateResult::Failed);
    }
}
