// Main uploader module - turns admitted files into HTTP transfers
//
// Encoding, chunking, progress metrics and the per-file state machine live here

pub mod chunking;
pub mod encoder;
pub mod http_client;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod state;

pub use http_client::{HttpClient, ProgressFn, TransferProgress, TransferResponse, Transport};
pub use orchestrator::{Orchestrator, UploadTask};
pub use retry::retry_single_upload;
pub use state::{TransferToken, UploadSnapshot, UploadState};
