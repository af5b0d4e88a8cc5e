//! HTTP server scaffolding for the TF Scheduler RPC protocol (§6).
//!
//! This crate only wires `dd-types::rpc` requests to an arbitrary
//! [`SchedulerHandlers`] implementation over `actix-web`; the scheduling
//! logic itself belongs to the role crate that implements the trait.

use actix_web::{web, App, HttpResponse, HttpServer};
use dd_types::rpc::{
    NumStfSendersRequest, NumStfSendersResponse, RequestEnvelope, SendFailedRequest,
    StatusResponse, StfSenderStfUpdateRequest, StfSenderStfUpdateResponse,
    TfBuilderConnectionRequest, TfBuilderConnectionResponse, TfBuilderDisconnectionRequest,
    TfBuilderUpdateRequest,
};
use std::sync::Arc;

/// The four scheduler operations (§6) plus the sender's failure report, as a
/// plain synchronous trait — handler bodies below call it inline since every
/// implementation is expected to hold its state behind short, non-blocking
/// locks (§5).
pub trait SchedulerHandlers: Send + Sync + 'static {
    fn on_num_stf_senders(&self, req: NumStfSendersRequest) -> Result<NumStfSendersResponse, String>;

    fn on_builder_connect(
        &self,
        req: TfBuilderConnectionRequest,
    ) -> Result<TfBuilderConnectionResponse, String>;

    fn on_builder_disconnect(
        &self,
        req: TfBuilderDisconnectionRequest,
    ) -> Result<StatusResponse, String>;

    fn on_builder_update(&self, req: TfBuilderUpdateRequest) -> Result<StatusResponse, String>;

    fn on_sender_stf_update(
        &self,
        req: StfSenderStfUpdateRequest,
    ) -> Result<StfSenderStfUpdateResponse, String>;

    fn on_send_failed(&self, req: SendFailedRequest) -> Result<StatusResponse, String>;
}

fn to_response<T: serde::Serialize>(result: Result<T, String>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(msg) => {
            log::warn!("scheduler rpc handler rejected request: {msg}");
            HttpResponse::BadRequest().json(ErrorBody { error: msg })
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

async fn num_stf_senders(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<NumStfSendersRequest>,
) -> HttpResponse {
    to_response(handlers.on_num_stf_senders(req.into_inner()))
}

async fn builder_connect(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<TfBuilderConnectionRequest>,
) -> HttpResponse {
    to_response(handlers.on_builder_connect(req.into_inner()))
}

async fn builder_disconnect(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<TfBuilderDisconnectionRequest>,
) -> HttpResponse {
    to_response(handlers.on_builder_disconnect(req.into_inner()))
}

async fn builder_update(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<TfBuilderUpdateRequest>,
) -> HttpResponse {
    to_response(handlers.on_builder_update(req.into_inner()))
}

async fn sender_stf_update(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<StfSenderStfUpdateRequest>,
) -> HttpResponse {
    to_response(handlers.on_sender_stf_update(req.into_inner()))
}

async fn sender_send_failed(
    handlers: web::Data<Arc<dyn SchedulerHandlers>>,
    req: web::Json<SendFailedRequest>,
) -> HttpResponse {
    to_response(handlers.on_send_failed(req.into_inner()))
}

/// Binds `addr` and serves the scheduler protocol until the process exits.
/// Blocks the calling thread; roles run this from a dedicated server thread.
pub fn run_scheduler_server(
    handlers: Arc<dyn SchedulerHandlers>,
    addr: impl std::net::ToSocketAddrs,
) -> std::io::Result<()> {
    let addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no bind address"))?;

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(handlers.clone()))
                .route("/num-stf-senders", web::post().to(num_stf_senders))
                .route("/builder/connect", web::post().to(builder_connect))
                .route("/builder/disconnect", web::post().to(builder_disconnect))
                .route("/builder/update", web::post().to(builder_update))
                .route("/sender/stf-update", web::post().to(sender_stf_update))
                .route("/sender/send-failed", web::post().to(sender_send_failed))
        })
        .bind(addr)?
        .run()
        .await
    })
}

/// Helper kept alongside the handler trait so implementors don't need to
/// depend on `dd_types::rpc` just to build an envelope-echoing error path.
pub fn reject(envelope: &RequestEnvelope, reason: impl Into<String>) -> Result<StatusResponse, String> {
    Err(format!(
        "{} (process={}, partition={})",
        reason.into(),
        envelope.process_id,
        envelope.partition_id
    ))
}
