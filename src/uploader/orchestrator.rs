use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::DropzoneConfig;
use crate::errors::{UploadError, UploadResult};
use crate::events::DropzoneEvents;
use crate::file::{FileId, ManagedFile, SourceFile};
use crate::types::UploadStatus;

use super::chunking::{build_chunk_request, chunking_for, ChunkMeta, ChunkPlan};
use super::encoder;
use super::http_client::{ProgressFn, TransferProgress, TransferResponse, Transport};
use super::metrics;
use super::state::{TransferToken, UploadState};

/// Handle to a spawned transfer. Resolves once every file in it has settled.
pub type UploadTask = JoinHandle<()>;

struct Inner {
    config: Arc<DropzoneConfig>,
    transport: Arc<dyn Transport>,
    state: Arc<UploadState>,
    events: Arc<dyn DropzoneEvents>,
}

/// Turns admitted files into transfers and reconciles their outcome into the upload state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<DropzoneConfig>,
        transport: Arc<dyn Transport>,
        state: Arc<UploadState>,
        events: Arc<dyn DropzoneEvents>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state,
                events,
            }),
        }
    }

    /// Start the transfers for one intake cycle.
    ///
    /// One-by-one mode sends each admitted file on its own; otherwise the whole set goes
    /// out as a single batch. Nothing is sent without a destination.
    pub fn dispatch(&self, admitted: Vec<ManagedFile>, all_files: &[ManagedFile]) -> Option<UploadTask> {
        let config = &self.inner.config;
        config.upload_url.as_ref()?;

        if config.upload_one_by_one {
            if admitted.is_empty() {
                return None;
            }
            log::info!("Starting {} independent upload(s)", admitted.len());
            let this = self.clone();
            Some(tokio::spawn(async move { this.upload_each(admitted).await }))
        } else {
            if all_files.is_empty() {
                return None;
            }
            let members = all_files.to_vec();
            let this = self.clone();
            Some(tokio::spawn(async move { this.upload_batch(members).await }))
        }
    }

    pub fn has_destination(&self) -> bool {
        self.inner.config.upload_url.is_some()
    }

    /// Spawn a single-file transfer, chunked when the file qualifies.
    pub fn spawn_file(&self, file: ManagedFile) -> Option<UploadTask> {
        self.inner.config.upload_url.as_ref()?;
        let this = self.clone();
        Some(tokio::spawn(async move { this.upload_file(file).await }))
    }

    /// Upload files independently and concurrently; completions may arrive in any order.
    pub async fn upload_each(&self, files: Vec<ManagedFile>) {
        join_all(files.into_iter().map(|file| self.upload_file(file))).await;
    }

    pub async fn upload_file(&self, file: ManagedFile) {
        let Some(url) = self.inner.config.upload_url.clone() else {
            return;
        };

        let ids = vec![file.id.clone()];
        let Some(token) = self.inner.state.begin(&ids) else {
            log::debug!(
                "{} left the set before its upload started",
                file.file.name()
            );
            return;
        };
        let started = self
            .inner
            .state
            .started_at(&file.id)
            .unwrap_or_else(Instant::now);

        let config = &self.inner.config;
        let chunk_bytes = chunking_for(
            config.upload_chunk,
            config.chunk_size,
            config.chunk_threshold_mb,
            file.file.size(),
        );

        log::info!(
            "Uploading {} ({} bytes, {}{})",
            file.file.name(),
            file.file.size(),
            config.upload_encoding,
            if chunk_bytes.is_some() { ", chunked" } else { "" }
        );

        let result = match chunk_bytes {
            Some(chunk_bytes) => self.send_chunked(&url, &file, token, started, chunk_bytes).await,
            None => self.send_whole(&url, &file, token, started).await,
        };

        self.settle(Some(&file.file), token, &ids, result);
    }

    /// Upload `members` in one request. They succeed or fail together.
    pub async fn upload_batch(&self, members: Vec<ManagedFile>) {
        let Some(url) = self.inner.config.upload_url.clone() else {
            return;
        };

        let ids: Vec<FileId> = members.iter().map(|m| m.id.clone()).collect();
        let Some(token) = self.inner.state.begin(&ids) else {
            log::debug!("Every batch member left the set before the upload started");
            return;
        };
        log::info!("Uploading batch of {} file(s) to {}", members.len(), url);

        let files: Vec<SourceFile> = members.into_iter().map(|m| m.file).collect();
        let result = self.send_batch(&url, &files, token, &ids).await;

        self.settle(None, token, &ids, result);
    }

    async fn send_whole(
        &self,
        url: &str,
        file: &ManagedFile,
        token: TransferToken,
        started: Instant,
    ) -> UploadResult<TransferResponse> {
        let config = &self.inner.config;
        let request = encoder::encode(
            std::slice::from_ref(&file.file),
            config.upload_encoding,
            &config.upload_field_name,
        )
        .await?;

        let progress = self.file_progress(file, token, started, 0, None);
        self.inner
            .transport
            .send(url, config.upload_method, request, progress)
            .await
    }

    /// Send the chunks of one file strictly in order. The first failure ends the file.
    async fn send_chunked(
        &self,
        url: &str,
        file: &ManagedFile,
        token: TransferToken,
        started: Instant,
        chunk_bytes: u64,
    ) -> UploadResult<TransferResponse> {
        let config = &self.inner.config;
        let plan = ChunkPlan::new(file.file.size(), chunk_bytes);
        log::debug!(
            "{} split into {} chunk(s) of {} bytes",
            file.file.name(),
            plan.total_chunks,
            plan.chunk_bytes
        );

        let mut offset = 0;
        let mut last_response = None;

        for chunk in plan.chunks() {
            let data = file.file.read_range(chunk.offset, chunk.len).await?;
            let meta = ChunkMeta {
                field_name: &config.upload_field_name,
                file_name: file.file.name(),
                index: chunk.index,
                total_chunks: plan.total_chunks,
                upload_id: file.id.as_str(),
            };
            let request = build_chunk_request(config.upload_encoding, meta, data);
            let progress = self.file_progress(file, token, started, offset, Some(chunk.len));

            let response = self
                .inner
                .transport
                .send(url, config.upload_method, request, progress)
                .await
                .map_err(|e| {
                    log::warn!(
                        "Chunk {}/{} of {} failed, abandoning remaining chunks: {}",
                        chunk.index + 1,
                        plan.total_chunks,
                        file.file.name(),
                        e
                    );
                    e
                })?;

            log::debug!(
                "Chunk {}/{} of {} uploaded",
                chunk.index + 1,
                plan.total_chunks,
                file.file.name()
            );
            offset += chunk.len;
            last_response = Some(response);
        }

        last_response.ok_or_else(|| {
            UploadError::Internal(format!("no chunks planned for {}", file.file.name()))
        })
    }

    async fn send_batch(
        &self,
        url: &str,
        files: &[SourceFile],
        token: TransferToken,
        ids: &[FileId],
    ) -> UploadResult<TransferResponse> {
        let config = &self.inner.config;
        let request =
            encoder::encode(files, config.upload_encoding, &config.upload_field_name).await?;

        let progress = self.batch_progress(token, ids.to_vec());
        self.inner
            .transport
            .send(url, config.upload_method, request, progress)
            .await
    }

    fn file_progress(
        &self,
        file: &ManagedFile,
        token: TransferToken,
        started: Instant,
        offset: u64,
        chunk_len: Option<u64>,
    ) -> ProgressFn {
        let inner = Arc::clone(&self.inner);
        let file = file.clone();
        let ids = vec![file.id.clone()];

        Arc::new(move |event: TransferProgress| {
            let (loaded, total) = match chunk_len {
                Some(len) => (offset + in_flight_bytes(&event, len), file.file.size()),
                None => (event.loaded, event.total),
            };
            let value = metrics::compute(
                loaded,
                total,
                started,
                Instant::now(),
                event.rate,
                event.estimated,
            );

            if inner.state.record_metrics(token, &ids, value) > 0 {
                inner
                    .events
                    .on_upload_progress(Some(&file.file), value.progress);
            }
        })
    }

    fn batch_progress(&self, token: TransferToken, ids: Vec<FileId>) -> ProgressFn {
        let inner = Arc::clone(&self.inner);

        Arc::new(move |event: TransferProgress| {
            let origin = inner
                .state
                .batch_origin(&ids)
                .unwrap_or_else(Instant::now);
            let value = metrics::compute(
                event.loaded,
                event.total,
                origin,
                Instant::now(),
                event.rate,
                event.estimated,
            );

            inner.state.record_metrics(token, &ids, value);
            inner.events.on_upload_progress(None, value.progress);
        })
    }

    /// Record the terminal status and tell the embedder.
    ///
    /// Results for a single file that was removed, or claimed by a later transfer, while
    /// in flight are dropped.
    fn settle(
        &self,
        file: Option<&SourceFile>,
        token: TransferToken,
        ids: &[FileId],
        result: UploadResult<TransferResponse>,
    ) {
        let status = if result.is_ok() {
            UploadStatus::Success
        } else {
            UploadStatus::Error
        };
        let settled = self.inner.state.finish(token, ids, status);

        if let Some(file) = file {
            if settled == 0 {
                log::debug!(
                    "{} was removed or resent while uploading, ignoring its {:?} result",
                    file.name(),
                    status
                );
                return;
            }
        }

        let target = file.map(SourceFile::name).unwrap_or("batch");
        match result {
            Ok(response) => {
                log::info!("Upload of {} succeeded (HTTP {})", target, response.status);
                self.inner.events.on_upload_complete(file, &response);
            }
            Err(error) => {
                log::error!("Upload of {} failed: {}", target, error);
                self.inner.events.on_upload_error(file, &error);
            }
        }
    }
}

/// Bytes of the in-flight chunk acknowledged so far, scaled from the encoded body size.
fn in_flight_bytes(event: &TransferProgress, chunk_len: u64) -> u64 {
    if event.total > 0 && event.total != chunk_len {
        let ratio = event.loaded as f64 / event.total as f64;
        ((ratio * chunk_len as f64).round() as u64).min(chunk_len)
    } else {
        event.loaded.min(chunk_len)
    }
}
