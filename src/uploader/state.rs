use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::file::{FileId, ManagedFile};
use crate::types::{UploadMetrics, UploadStatus};

/// Immutable view of the file set and its upload bookkeeping.
///
/// Updates never touch a snapshot that has been handed out; they swap in new maps.
#[derive(Debug, Clone, Default)]
pub struct UploadSnapshot {
    pub files: Arc<Vec<ManagedFile>>,
    pub statuses: Arc<HashMap<FileId, UploadStatus>>,
    pub metrics: Arc<HashMap<FileId, UploadMetrics>>,
}

impl UploadSnapshot {
    pub fn contains(&self, id: &FileId) -> bool {
        self.files.iter().any(|f| &f.id == id)
    }

    pub fn status(&self, id: &FileId) -> UploadStatus {
        self.statuses.get(id).copied().unwrap_or_default()
    }

    pub fn metrics(&self, id: &FileId) -> Option<UploadMetrics> {
        self.metrics.get(id).copied()
    }
}

/// Identifies one transfer. A file belongs to the latest transfer that claimed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferToken(u64);

#[derive(Debug, Default)]
struct Inner {
    snapshot: UploadSnapshot,
    started_at: HashMap<FileId, Instant>,
    owners: HashMap<FileId, TransferToken>,
    next_token: u64,
}

/// Result of merging new files into the set.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub files: Arc<Vec<ManagedFile>>,
    /// New files that made it into the set
    pub admitted: Vec<ManagedFile>,
}

#[derive(Debug, Default)]
pub struct UploadState {
    inner: Mutex<Inner>,
}

impl UploadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.read("snapshot", |inner| inner.snapshot.clone())
            .unwrap_or_default()
    }

    /// Append (or replace, in single-file mode) and truncate to `max_files`.
    pub fn merge_files(
        &self,
        new_files: Vec<ManagedFile>,
        multiple: bool,
        max_files: Option<usize>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome {
            files: Arc::new(Vec::new()),
            admitted: Vec::new(),
        };

        self.update("merge files", |inner| {
            let mut files: Vec<ManagedFile> = if multiple {
                let mut files = inner.snapshot.files.as_ref().clone();
                files.extend(new_files);
                if let Some(max) = max_files {
                    files.truncate(max);
                }
                files
            } else {
                new_files.into_iter().take(1).collect()
            };
            files.shrink_to_fit();

            let previous = Arc::clone(&inner.snapshot.files);
            outcome.admitted = files
                .iter()
                .filter(|f| !previous.iter().any(|p| p.id == f.id))
                .cloned()
                .collect();

            inner.snapshot.files = Arc::new(files);
            inner.prune();
            outcome.files = Arc::clone(&inner.snapshot.files);
        });

        outcome
    }

    /// Drop a file and everything recorded for it. Returns the remaining files.
    pub fn remove_file(&self, id: &FileId) -> Option<Arc<Vec<ManagedFile>>> {
        let mut remaining = None;
        self.update("remove file", |inner| {
            if !inner.snapshot.contains(id) {
                return;
            }
            let files: Vec<ManagedFile> = inner
                .snapshot
                .files
                .iter()
                .filter(|f| &f.id != id)
                .cloned()
                .collect();
            inner.snapshot.files = Arc::new(files);
            inner.prune();
            remaining = Some(Arc::clone(&inner.snapshot.files));
        });
        remaining
    }

    /// Claim `ids` for a new transfer and move them to uploading with zeroed metrics.
    ///
    /// A file already claimed by an earlier transfer moves to the new one. Returns `None`
    /// when none of `ids` is still in the set.
    pub fn begin(&self, ids: &[FileId]) -> Option<TransferToken> {
        let now = Instant::now();
        let mut claimed = None;
        self.update("begin upload", |inner| {
            let tracked: Vec<FileId> = ids
                .iter()
                .filter(|id| inner.snapshot.contains(id))
                .cloned()
                .collect();
            if tracked.is_empty() {
                return;
            }

            let token = TransferToken(inner.next_token);
            inner.next_token += 1;

            let statuses = Arc::make_mut(&mut inner.snapshot.statuses);
            let metrics = Arc::make_mut(&mut inner.snapshot.metrics);
            for id in &tracked {
                statuses.insert(id.clone(), UploadStatus::Uploading);
                metrics.insert(id.clone(), UploadMetrics::default());
                inner.started_at.entry(id.clone()).or_insert(now);
                inner.owners.insert(id.clone(), token);
            }
            claimed = Some(token);
        });
        claimed
    }

    /// Claim a failed file for another attempt. Only one caller wins per failure.
    pub fn restart_failed(&self, id: &FileId) -> Option<ManagedFile> {
        let mut claimed = None;
        self.update("restart failed upload", |inner| {
            if inner.snapshot.statuses.get(id) != Some(&UploadStatus::Error) {
                return;
            }
            let Some(file) = inner.snapshot.files.iter().find(|f| &f.id == id).cloned() else {
                return;
            };

            Arc::make_mut(&mut inner.snapshot.statuses).insert(id.clone(), UploadStatus::Uploading);
            Arc::make_mut(&mut inner.snapshot.metrics).insert(id.clone(), UploadMetrics::default());
            inner.started_at.insert(id.clone(), Instant::now());
            claimed = Some(file);
        });
        claimed
    }

    pub fn started_at(&self, id: &FileId) -> Option<Instant> {
        self.read("start time", |inner| inner.started_at.get(id).copied())
            .flatten()
    }

    /// Earliest start among `ids`, used as the elapsed-time origin of a batch.
    pub fn batch_origin(&self, ids: &[FileId]) -> Option<Instant> {
        self.read("batch origin", |inner| {
            ids.iter()
                .filter_map(|id| inner.started_at.get(id))
                .min()
                .copied()
        })
        .flatten()
    }

    /// Store metrics for the ids `token` still owns. Returns how many were updated.
    pub fn record_metrics(&self, token: TransferToken, ids: &[FileId], value: UploadMetrics) -> usize {
        let mut updated = 0;
        self.update("record metrics", |inner| {
            let uploading: Vec<&FileId> = ids
                .iter()
                .filter(|id| inner.owners.get(*id) == Some(&token))
                .filter(|id| inner.snapshot.statuses.get(*id) == Some(&UploadStatus::Uploading))
                .collect();
            if uploading.is_empty() {
                return;
            }

            let metrics = Arc::make_mut(&mut inner.snapshot.metrics);
            for id in uploading {
                metrics.insert(id.clone(), value);
                updated += 1;
            }
        });
        updated
    }

    /// Settle the ids `token` still owns with a terminal status and clear their metrics.
    ///
    /// Ids removed from the set or claimed by a later transfer are skipped. Returns how
    /// many were settled.
    pub fn finish(&self, token: TransferToken, ids: &[FileId], status: UploadStatus) -> usize {
        debug_assert!(status.is_terminal());
        let mut settled = 0;
        self.update("finish upload", |inner| {
            let tracked: Vec<FileId> = ids
                .iter()
                .filter(|id| inner.owners.get(*id) == Some(&token))
                .filter(|id| inner.snapshot.contains(id))
                .cloned()
                .collect();

            for id in &tracked {
                inner.owners.remove(id);
                inner.started_at.remove(id);
            }
            if tracked.is_empty() {
                return;
            }

            let statuses = Arc::make_mut(&mut inner.snapshot.statuses);
            for id in &tracked {
                statuses.insert(id.clone(), status);
            }
            let metrics = Arc::make_mut(&mut inner.snapshot.metrics);
            for id in &tracked {
                metrics.remove(id);
            }
            settled = tracked.len();
        });
        settled
    }

    fn update<F>(&self, operation: &str, f: F) -> bool
    where
        F: FnOnce(&mut Inner),
    {
        match self.inner.lock() {
            Ok(mut inner) => {
                f(&mut *inner);
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to acquire upload state lock for {} (non-critical): {}",
                    operation,
                    e
                );
                false
            }
        }
    }

    fn read<F, R>(&self, operation: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Inner) -> R,
    {
        match self.inner.lock() {
            Ok(inner) => Some(f(&*inner)),
            Err(e) => {
                log::error!(
                    "Failed to acquire upload state lock for {} (non-critical): {}",
                    operation,
                    e
                );
                None
            }
        }
    }
}

impl Inner {
    /// Forget bookkeeping for ids that are no longer in the set.
    fn prune(&mut self) {
        let files = Arc::clone(&self.snapshot.files);
        let present = |id: &FileId| files.iter().any(|f| &f.id == id);

        if self.snapshot.statuses.keys().any(|id| !present(id)) {
            Arc::make_mut(&mut self.snapshot.statuses).retain(|id, _| present(id));
        }
        if self.snapshot.metrics.keys().any(|id| !present(id)) {
            Arc::make_mut(&mut self.snapshot.metrics).retain(|id, _| present(id));
        }
        self.started_at.retain(|id, _| present(id));
        self.owners.retain(|id, _| present(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceFile;

    fn managed(name: &str) -> ManagedFile {
        ManagedFile::new(SourceFile::from_bytes(name, "text/plain", name.to_string()))
    }

    fn names(files: &[ManagedFile]) -> Vec<&str> {
        files.iter().map(|f| f.file.name()).collect()
    }

    #[test]
    fn test_merge_appends_then_truncates() {
        let state = UploadState::new();
        state.merge_files(vec![managed("a"), managed("b")], true, Some(3));

        let outcome = state.merge_files(vec![managed("c"), managed("d")], true, Some(3));
        assert_eq!(names(&outcome.files), vec!["a", "b", "c"]);
        assert_eq!(names(&outcome.admitted), vec!["c"]);
    }

    #[test]
    fn test_single_mode_replaces_set_and_drops_old_state() {
        let state = UploadState::new();
        let first = state.merge_files(vec![managed("a")], false, None);
        let old_id = first.files[0].id.clone();
        state.begin(&[old_id.clone()]);

        let outcome = state.merge_files(vec![managed("b"), managed("c")], false, None);
        assert_eq!(names(&outcome.files), vec!["b"]);

        let snapshot = state.snapshot();
        assert!(!snapshot.statuses.contains_key(&old_id));
        assert!(!snapshot.metrics.contains_key(&old_id));
        assert!(state.started_at(&old_id).is_none());
    }

    #[test]
    fn test_snapshots_are_not_mutated_by_later_updates() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a")], true, None);
        let id = outcome.files[0].id.clone();

        let before = state.snapshot();
        state.begin(&[id.clone()]);
        let after = state.snapshot();

        assert_eq!(before.status(&id), UploadStatus::Idle);
        assert!(before.metrics(&id).is_none());
        assert_eq!(after.status(&id), UploadStatus::Uploading);
        assert_eq!(after.metrics(&id), Some(UploadMetrics::default()));
    }

    #[test]
    fn test_metrics_only_while_uploading() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a")], true, None);
        let id = outcome.files[0].id.clone();
        let halfway = UploadMetrics {
            progress: 50,
            ..UploadMetrics::default()
        };

        let token = state.begin(&[id.clone()]).unwrap();
        assert_eq!(state.record_metrics(token, &[id.clone()], halfway), 1);
        assert_eq!(state.finish(token, &[id.clone()], UploadStatus::Success), 1);
        assert_eq!(state.record_metrics(token, &[id.clone()], halfway), 0);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status(&id), UploadStatus::Success);
        assert!(snapshot.metrics(&id).is_none());
    }

    #[test]
    fn test_finish_after_removal_leaves_no_orphans() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a"), managed("b")], true, None);
        let ids: Vec<FileId> = outcome.files.iter().map(|f| f.id.clone()).collect();
        let token = state.begin(&ids).unwrap();

        let remaining = state.remove_file(&ids[0]).unwrap();
        assert_eq!(names(&remaining), vec!["b"]);
        assert_eq!(state.finish(token, &ids, UploadStatus::Error), 1);

        let snapshot = state.snapshot();
        assert!(!snapshot.statuses.contains_key(&ids[0]));
        assert_eq!(snapshot.status(&ids[1]), UploadStatus::Error);
        assert!(snapshot.metrics.is_empty());
        assert!(state.remove_file(&ids[0]).is_none());
    }

    #[test]
    fn test_batch_origin_is_earliest_start() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a"), managed("b")], true, None);
        let ids: Vec<FileId> = outcome.files.iter().map(|f| f.id.clone()).collect();

        assert!(state.batch_origin(&ids).is_none());
        state.begin(&ids[..1]);
        let first = state.started_at(&ids[0]).unwrap();
        state.begin(&ids);

        // A member already in flight keeps its original start
        assert_eq!(state.started_at(&ids[0]), Some(first));
        assert_eq!(state.batch_origin(&ids), Some(first));
    }

    #[test]
    fn test_restart_only_claims_failed_files_once() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a")], true, None);
        let id = outcome.files[0].id.clone();

        assert!(state.restart_failed(&id).is_none());
        let token = state.begin(&[id.clone()]).unwrap();
        state.finish(token, &[id.clone()], UploadStatus::Error);

        let claimed = state.restart_failed(&id).unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(state.snapshot().status(&id), UploadStatus::Uploading);
        assert!(state.restart_failed(&id).is_none());
    }

    #[test]
    fn test_later_transfer_takes_over_shared_files() {
        let state = UploadState::new();
        let outcome = state.merge_files(vec![managed("a"), managed("b")], true, None);
        let ids: Vec<FileId> = outcome.files.iter().map(|f| f.id.clone()).collect();
        let halfway = UploadMetrics {
            progress: 50,
            ..UploadMetrics::default()
        };

        let first = state.begin(&ids[..1]).unwrap();
        let second = state.begin(&ids).unwrap();
        assert_ne!(first, second);

        assert_eq!(state.record_metrics(first, &ids[..1], halfway), 0);
        assert_eq!(state.finish(first, &ids[..1], UploadStatus::Success), 0);
        assert_eq!(state.snapshot().status(&ids[0]), UploadStatus::Uploading);
        assert!(state.started_at(&ids[0]).is_some());

        assert_eq!(state.record_metrics(second, &ids, halfway), 2);
        assert_eq!(state.finish(second, &ids, UploadStatus::Error), 2);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status(&ids[0]), UploadStatus::Error);
        assert_eq!(snapshot.status(&ids[1]), UploadStatus::Error);
        assert!(snapshot.metrics.is_empty());
    }

    #[test]
    fn test_begin_without_tracked_files() {
        let state = UploadState::new();
        assert!(state.begin(&[FileId::from("gone")]).is_none());
    }
}
