use crate::file::FileId;

use super::orchestrator::{Orchestrator, UploadTask};
use super::state::UploadState;

/// Retry a failed upload
///
/// Re-issues the file's transfer on its own, chunked when it qualifies. Files that are not
/// in the error state, or no longer in the set, are left alone.
pub fn retry_single_upload(
    orchestrator: &Orchestrator,
    state: &UploadState,
    id: &FileId,
) -> Option<UploadTask> {
    if !orchestrator.has_destination() {
        log::debug!("Not retrying {}: no upload destination configured", id);
        return None;
    }

    let Some(file) = state.restart_failed(id) else {
        log::warn!("Not retrying {}: no failed upload recorded for it", id);
        return None;
    };

    log::info!("Retrying upload of {}", file.file.name());
    orchestrator.spawn_file(file)
}
