use std::sync::Arc;

use crate::config::DropzoneConfig;
use crate::errors::UploadResult;
use crate::events::DropzoneEvents;
use crate::file::{FileId, ManagedFile, SourceFile};
use crate::labels::LabelLookup;
use crate::types::{UploadMetrics, UploadStatus};
use crate::uploader::{retry_single_upload, Orchestrator, Transport, UploadSnapshot, UploadState, UploadTask};
use crate::validation::{validate, InvalidFile, ValidationRules, Verdict};

/// What one call to [`Dropzone::add_files`] did.
#[derive(Debug, Default)]
pub struct IntakeOutcome {
    /// Ids of the accepted files that are in the set after merging
    pub accepted: Vec<FileId>,
    pub rejected: Vec<InvalidFile>,
    /// Transfer started for this intake, if any
    pub upload: Option<UploadTask>,
}

/// File intake controller: validates candidates, keeps the ordered file set and hands
/// accepted files to the orchestrator.
pub struct Dropzone {
    config: Arc<DropzoneConfig>,
    rules: ValidationRules,
    labels: Arc<dyn LabelLookup>,
    events: Arc<dyn DropzoneEvents>,
    state: Arc<UploadState>,
    orchestrator: Orchestrator,
}

impl Dropzone {
    pub fn new(
        config: DropzoneConfig,
        transport: Arc<dyn Transport>,
        labels: Arc<dyn LabelLookup>,
        events: Arc<dyn DropzoneEvents>,
    ) -> UploadResult<Self> {
        let config = Arc::new(config.normalized()?);
        let state = Arc::new(UploadState::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&config),
            transport,
            Arc::clone(&state),
            Arc::clone(&events),
        );

        log::debug!(
            "Dropzone ready (multiple: {}, one by one: {}, encoding: {}, destination: {})",
            config.multiple,
            config.upload_one_by_one,
            config.upload_encoding,
            config.upload_url.as_deref().unwrap_or("none")
        );

        Ok(Self {
            rules: config.validation_rules(),
            config,
            labels,
            events,
            state,
            orchestrator,
        })
    }

    /// Validate `files`, merge the accepted ones into the set and start their upload.
    ///
    /// Must be called from within a Tokio runtime when a destination is configured.
    pub fn add_files(&self, files: Vec<SourceFile>) -> IntakeOutcome {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for file in files {
            match validate(&file, &self.rules, self.labels.as_ref()) {
                Verdict::Accepted => accepted.push(ManagedFile::new(file)),
                Verdict::Rejected { error, reason } => {
                    log::info!("Rejected {}: {}", file.name(), reason);
                    rejected.push(InvalidFile { file, reason, error });
                }
            }
        }

        if !rejected.is_empty() {
            self.events.on_invalid_files(&rejected);
        }

        if accepted.is_empty() {
            return IntakeOutcome {
                rejected,
                ..IntakeOutcome::default()
            };
        }

        let merged = self
            .state
            .merge_files(accepted, self.config.multiple, self.config.max_files);

        self.notify_files_changed(&merged.files);

        let accepted_ids = merged.admitted.iter().map(|f| f.id.clone()).collect();
        let upload = self.orchestrator.dispatch(merged.admitted, &merged.files);

        IntakeOutcome {
            accepted: accepted_ids,
            rejected,
            upload,
        }
    }

    /// Drop a file from the set. In-flight requests for it keep running.
    pub fn remove_file(&self, id: &FileId) -> bool {
        match self.state.remove_file(id) {
            Some(files) => {
                log::debug!("Removed {} from the set", id);
                self.notify_files_changed(&files);
                true
            }
            None => false,
        }
    }

    /// Send a failed file again on its own.
    pub fn retry_upload(&self, id: &FileId) -> Option<UploadTask> {
        retry_single_upload(&self.orchestrator, &self.state, id)
    }

    pub fn files(&self) -> Vec<SourceFile> {
        self.state
            .snapshot()
            .files
            .iter()
            .map(|f| f.file.clone())
            .collect()
    }

    pub fn status(&self, id: &FileId) -> UploadStatus {
        self.state.snapshot().status(id)
    }

    pub fn metrics(&self, id: &FileId) -> Option<UploadMetrics> {
        self.state.snapshot().metrics(id)
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.state.snapshot()
    }

    pub fn config(&self) -> &DropzoneConfig {
        &self.config
    }

    fn notify_files_changed(&self, files: &[ManagedFile]) {
        let files: Vec<SourceFile> = files.iter().map(|f| f.file.clone()).collect();
        self.events.on_files_changed(&files);
    }
}
