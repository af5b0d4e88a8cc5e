//! The rolling file sink/source for Sub-Time-Frames (§4.5): on-disk record
//! framing, filename templating, sidecar indexing, and the per-session
//! locked write directory.

pub mod filename;
pub mod record;
pub mod session;
pub mod sidecar;
pub mod sink;
pub mod source;

pub use record::{decode_record, encode_record, RecordError, RECORD_MAGIC};
pub use session::SessionDir;
pub use sidecar::SidecarEntry;
pub use sink::{FileSink, FileSinkConfig, StorageError};
pub use source::{list_session_files, FileSource, SessionSource, SourceError};
