//! File intake and upload orchestration.
//!
//! A [`Dropzone`] validates candidate files, keeps the ordered set of accepted files and
//! uploads them over HTTP as a batch, one by one, or in chunks, reporting progress and
//! outcomes through [`DropzoneEvents`].

pub mod config;
pub mod errors;
pub mod events;
pub mod file;
pub mod intake;
pub mod labels;
pub mod types;
pub mod uploader;
pub mod validation;

pub use config::{load_config, save_config, DropzoneConfig};
pub use errors::{UploadError, UploadResult, ValidationError};
pub use events::{DropzoneEvents, LogEvents, NoopEvents};
pub use file::{FileId, ManagedFile, SourceFile};
pub use intake::{Dropzone, IntakeOutcome};
pub use labels::{LabelLookup, Labels};
pub use types::{UploadEncoding, UploadMethod, UploadMetrics, UploadStatus};
pub use uploader::{HttpClient, TransferProgress, TransferResponse, Transport, UploadSnapshot, UploadTask};
pub use validation::{InvalidFile, ValidationRules, Verdict};
