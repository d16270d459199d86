use crate::errors::UploadError;
use crate::file::SourceFile;
use crate::uploader::TransferResponse;
use crate::validation::InvalidFile;

/// Callbacks towards the embedding application.
///
/// `file` is `None` for batch transfers. Every method defaults to doing nothing.
pub trait DropzoneEvents: Send + Sync {
    fn on_files_changed(&self, _files: &[SourceFile]) {}

    fn on_invalid_files(&self, _rejected: &[InvalidFile]) {}

    fn on_upload_progress(&self, _file: Option<&SourceFile>, _percent: u8) {}

    fn on_upload_complete(&self, _file: Option<&SourceFile>, _response: &TransferResponse) {}

    fn on_upload_error(&self, _file: Option<&SourceFile>, _error: &UploadError) {}
}

/// Embedder that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl DropzoneEvents for NoopEvents {}

/// Embedder that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

fn target(file: Option<&SourceFile>) -> &str {
    file.map(SourceFile::name).unwrap_or("batch")
}

impl DropzoneEvents for LogEvents {
    fn on_files_changed(&self, files: &[SourceFile]) {
        log::info!("{} file(s) in the dropzone", files.len());
    }

    fn on_invalid_files(&self, rejected: &[InvalidFile]) {
        for invalid in rejected {
            log::warn!("Rejected {}: {}", invalid.file.name(), invalid.reason);
        }
    }

    fn on_upload_progress(&self, file: Option<&SourceFile>, percent: u8) {
        log::debug!("Upload progress {}: {}%", target(file), percent);
    }

    fn on_upload_complete(&self, file: Option<&SourceFile>, response: &TransferResponse) {
        log::info!("Upload completed for {} (HTTP {})", target(file), response.status);
    }

    fn on_upload_error(&self, file: Option<&SourceFile>, error: &UploadError) {
        log::error!("Upload failed for {}: {}", target(file), error);
    }
}
