//! The abstract `Channel`/`Registry` collaborators the core consumes (§1),
//! one concrete TCP `Channel`, one concrete `Registry`, and scheduler RPC
//! client/server scaffolding (§6) built on top of the shared wire contract
//! in `dd_types::rpc`.

pub mod channel;
pub mod registry;
pub mod rpc_client;
pub mod rpc_server;

pub use channel::{Channel, ChannelError, TcpChannel, TcpChannelListener};
pub use registry::{FileRegistry, InMemoryRegistry, Registry, RegistryError};
pub use rpc_client::{RpcError, SchedulerClient};
pub use rpc_server::{run_scheduler_server, SchedulerHandlers};
