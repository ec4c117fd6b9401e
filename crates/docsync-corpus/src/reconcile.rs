//! Corpus reconciliation protocol
//!
//! Replaces a document's previous revision in the corpus without ever leaving
//! it absent:
//! 1. refuse unsuccessful results
//! 2. stage the payload as a local file
//! 3. list the corpus fresh and find entries with the same display name
//! 4. upload the new content, then delete the stale entries
//! 5. advance the version cursor once the upload is confirmed
//!
//! A failed delete only leaves a duplicate behind. It carries the docsync
//! upload description, so the next run prunes it under the default
//! [`DuplicatePolicy`].

use crate::client::{CorpusClient, CorpusEntry};
use crate::error::{CorpusConsistencyWarning, ReconcileError, ReconcileWarning};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use docsync_core::{BoxError, Payload, PluginContext, PluginResult, ResultHandler, SyncReceipt};
use docsync_cursor::{Version, VersionCursorStore};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::Instrument;

/// Which prior entries sharing the display name are deleted after upload
///
/// The first listed match is canonical and is always replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Canonical entry plus extras docsync uploaded itself; foreign
    /// duplicates stay
    #[default]
    PruneOwned,
    /// Canonical entry only
    KeepExtras,
    /// Every match, whoever uploaded it
    PruneAll,
}

impl DuplicatePolicy {
    /// Split prior matches into `(delete, keep)` ids, preserving listing order
    #[must_use]
    pub fn select(self, matches: Vec<CorpusEntry>) -> (Vec<String>, Vec<String>) {
        let mut stale = Vec::new();
        let mut kept = Vec::new();
        for (i, entry) in matches.into_iter().enumerate() {
            let delete = match self {
                Self::PruneAll => true,
                Self::PruneOwned => i == 0 || entry.is_own_upload(),
                Self::KeepExtras => i == 0,
            };
            if delete {
                stale.push(entry.id);
            } else {
                kept.push(entry.id);
            }
        }
        (stale, kept)
    }
}

/// Result of one successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Document display name
    pub display_name: String,
    /// Id of the freshly uploaded entry
    pub entry_id: String,
    /// Stale entries deleted
    pub pruned: Vec<String>,
    /// Stale entries left in place, by policy or after a failed delete
    pub retained: Vec<String>,
    /// Cursor value written
    pub cursor: Option<Version>,
    /// Non-fatal issues
    pub warnings: Vec<ReconcileWarning>,
    /// Attempts used by the corpus calls that succeeded, retries included
    pub attempts: u32,
}

/// Removes a transient artifact when dropped
#[derive(Debug)]
struct TransientArtifact(PathBuf);

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::debug!(path = %self.0.display(), "transient artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.0.display(), error = %e, "transient artifact not removed"),
        }
    }
}

/// Local file holding the content to upload
enum Staged<'a> {
    Artifact(&'a Path),
    Inline(NamedTempFile),
}

impl Staged<'_> {
    fn path(&self) -> &Path {
        match self {
            Self::Artifact(path) => path,
            Self::Inline(file) => file.path(),
        }
    }
}

/// Drives reconciliation against a corpus client and a cursor store
pub struct Reconciler {
    client: Arc<dyn CorpusClient>,
    cursor: Arc<dyn VersionCursorStore>,
    retry: RetryPolicy,
    duplicates: DuplicatePolicy,
}

impl Reconciler {
    /// Create with the default retry and duplicate policies
    #[must_use]
    pub fn new(client: Arc<dyn CorpusClient>, cursor: Arc<dyn VersionCursorStore>) -> Self {
        Self {
            client,
            cursor,
            retry: RetryPolicy::default(),
            duplicates: DuplicatePolicy::default(),
        }
    }

    /// Set the retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the duplicate policy
    #[inline]
    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Retry policy in use
    #[inline]
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reconcile one result into the corpus
    ///
    /// # Errors
    /// See [`ReconcileError`]; on every error the previous corpus entry is
    /// still present.
    pub async fn reconcile(&self, result: PluginResult) -> Result<ReconcileReport, ReconcileError> {
        let span = tracing::info_span!("reconcile", display_name = %result.display_name);
        self.reconcile_inner(result).instrument(span).await
    }

    async fn reconcile_inner(&self, result: PluginResult) -> Result<ReconcileReport, ReconcileError> {
        let _artifact = result
            .file_path
            .clone()
            .filter(|_| result.transient_artifact)
            .map(TransientArtifact);

        let name = result.display_name.as_str();
        if !result.success {
            return Err(ReconcileError::NotSuccessful {
                display_name: name.to_string(),
                reason: result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }

        let version = result.version().map_err(|source| ReconcileError::InvalidVersion {
            display_name: name.to_string(),
            source,
        })?;
        let staged = stage(&result).await?;
        let path = staged.path();

        let mut attempts = 0;
        let mut warnings = Vec::new();

        let (entries, used) = self
            .retry
            .run("list_entries", |_| self.client.list_entries())
            .await
            .map_err(|source| ReconcileError::Listing {
                display_name: name.to_string(),
                source,
            })?;
        attempts += used;

        let matches: Vec<CorpusEntry> = entries.into_iter().filter(|e| e.display_name == name).collect();
        let replaced = matches.len();
        if replaced > 1 {
            let warning = CorpusConsistencyWarning {
                display_name: name.to_string(),
                entry_ids: matches.iter().map(|e| e.id.clone()).collect(),
            };
            tracing::warn!(%warning, "duplicate corpus entries");
            warnings.push(ReconcileWarning::Consistency(warning));
        }

        let (entry_id, used) = self
            .retry
            .run("upload_entry", |_| self.client.upload_entry(name, path))
            .await
            .map_err(|source| ReconcileError::Upload {
                display_name: name.to_string(),
                source,
            })?;
        attempts += used;
        tracing::info!(%entry_id, replaced, "uploaded");

        let (stale, mut retained) = self.duplicates.select(matches);
        if !retained.is_empty() {
            tracing::warn!(?retained, "duplicate entries left for manual cleanup");
        }

        let mut pruned = Vec::with_capacity(stale.len());
        for id in stale.into_iter().filter(|id| *id != entry_id) {
            let deleted = self
                .retry
                .run("delete_entry", |_| self.client.delete_entry(&id))
                .await;
            match deleted {
                Ok(((), used)) => {
                    attempts += used;
                    pruned.push(id);
                }
                Err(e) => {
                    tracing::warn!(entry_id = %id, error = %e, "stale entry left in corpus");
                    warnings.push(ReconcileWarning::StaleDeleteFailed {
                        entry_id: id.clone(),
                        reason: e.to_string(),
                    });
                    retained.push(id);
                }
            }
        }

        let mut cursor = None;
        if result.requires_version_update {
            match version {
                Some(v) => {
                    self.cursor
                        .set_last_version(name, &v)
                        .await
                        .map_err(|source| ReconcileError::Cursor {
                            display_name: name.to_string(),
                            entry_id: entry_id.clone(),
                            source,
                        })?;
                    cursor = Some(v);
                }
                None => {
                    tracing::warn!("version update requested without a version marker");
                    warnings.push(ReconcileWarning::MissingVersion);
                }
            }
        }

        Ok(ReconcileReport {
            display_name: name.to_string(),
            entry_id,
            pruned,
            retained,
            cursor,
            warnings,
            attempts,
        })
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("retry", &self.retry)
            .field("duplicates", &self.duplicates)
            .finish_non_exhaustive()
    }
}

async fn stage(result: &PluginResult) -> Result<Staged<'_>, ReconcileError> {
    let artifact_error = |path: &Path, source| ReconcileError::Artifact {
        display_name: result.display_name.clone(),
        path: path.to_path_buf(),
        source,
    };

    match result.payload() {
        Payload::Artifact(path) => {
            tokio::fs::metadata(path)
                .await
                .map_err(|e| artifact_error(path, e))?;
            Ok(Staged::Artifact(path))
        }
        Payload::Inline(text) => {
            let suffix = format!(".{}", result.extension());
            let mut file = tempfile::Builder::new()
                .prefix("docsync-")
                .suffix(&suffix)
                .tempfile()
                .map_err(|e| artifact_error(&std::env::temp_dir(), e))?;
            file.write_all(text.as_bytes())
                .and_then(|()| file.flush())
                .map_err(|e| artifact_error(file.path(), e))?;
            Ok(Staged::Inline(file))
        }
        Payload::Empty => Err(ReconcileError::EmptyPayload(result.display_name.clone())),
    }
}

#[async_trait]
impl ResultHandler for Reconciler {
    async fn handle(&self, result: PluginResult, _ctx: &PluginContext) -> Result<SyncReceipt, BoxError> {
        let report = self.reconcile(result).await?;
        Ok(SyncReceipt {
            entry_id: report.entry_id,
            cursor: report.cursor,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CorpusEntry, MockCorpusClient};
    use crate::error::CorpusError;
    use docsync_cursor::MemoryCursorStore;
    use mockall::Sequence;

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    fn reconciler(client: MockCorpusClient, cursor: Arc<MemoryCursorStore>) -> Reconciler {
        Reconciler::new(Arc::new(client), cursor).with_retry(RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn upload_happens_before_delete() {
        let mut client = MockCorpusClient::new();
        let mut seq = Sequence::new();
        client
            .expect_list_entries()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![CorpusEntry::new("e1", "Tracker"), CorpusEntry::new("x", "Other")]));
        client
            .expect_upload_entry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _| {
                assert_eq!(name, "Tracker");
                Ok("e2".to_string())
            });
        client
            .expect_delete_entry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| {
                assert_eq!(id, "e1");
                Ok(())
            });

        let cursor = Arc::new(MemoryCursorStore::new());
        let result = PluginResult::from_content("Tracker", "rows").with_version(v("2026-01-01T00:00:00Z"));
        let report = reconciler(client, cursor.clone()).reconcile(result).await.unwrap();

        assert_eq!(report.entry_id, "e2");
        assert_eq!(report.pruned, vec!["e1"]);
        assert_eq!(report.cursor, Some(v("2026-01-01T00:00:00Z")));
        assert_eq!(
            cursor.last_version("Tracker").await.unwrap(),
            Some(v("2026-01-01T00:00:00Z"))
        );
    }

    #[tokio::test]
    async fn failed_upload_never_deletes_or_advances() {
        let mut client = MockCorpusClient::new();
        client
            .expect_list_entries()
            .returning(|| Ok(vec![CorpusEntry::new("e1", "Tracker")]));
        client
            .expect_upload_entry()
            .times(1)
            .returning(|_, _| Err(CorpusError::Permanent("413 payload too large".into())));
        client.expect_delete_entry().times(0);

        let cursor = Arc::new(MemoryCursorStore::new());
        let result = PluginResult::from_content("Tracker", "rows").with_version(v("2026-01-01T00:00:00Z"));
        let err = reconciler(client, cursor.clone()).reconcile(result).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Upload { .. }));
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn unsuccessful_result_touches_nothing() {
        let mut client = MockCorpusClient::new();
        client.expect_list_entries().times(0);
        client.expect_upload_entry().times(0);
        client.expect_delete_entry().times(0);

        let cursor = Arc::new(MemoryCursorStore::new());
        let err = reconciler(client, cursor.clone())
            .reconcile(PluginResult::failure("Tracker", "sheet unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotSuccessful { .. }));
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn invalid_version_rejected_before_upload() {
        let mut client = MockCorpusClient::new();
        client.expect_list_entries().times(0);
        client.expect_upload_entry().times(0);

        let result = PluginResult::from_content("Tracker", "rows")
            .with_metadata(docsync_core::VERSION_METADATA_KEY, "last tuesday");
        let err = reconciler(client, Arc::new(MemoryCursorStore::new()))
            .reconcile(result)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidVersion { .. }));
    }

    #[tokio::test]
    async fn keep_extras_deletes_only_canonical() {
        let mut client = MockCorpusClient::new();
        client.expect_list_entries().returning(|| {
            Ok(vec![
                CorpusEntry::new("e1", "Tracker"),
                CorpusEntry::new("e2", "Tracker"),
            ])
        });
        client.expect_upload_entry().returning(|_, _| Ok("e3".into()));
        client.expect_delete_entry().times(1).returning(|id| {
            assert_eq!(id, "e1");
            Ok(())
        });

        let report = reconciler(client, Arc::new(MemoryCursorStore::new()))
            .with_duplicate_policy(DuplicatePolicy::KeepExtras)
            .reconcile(PluginResult::from_content("Tracker", "rows").without_version_update())
            .await
            .unwrap();

        assert_eq!(report.pruned, vec!["e1"]);
        assert_eq!(report.retained, vec!["e2"]);
        assert!(matches!(report.warnings[0], ReconcileWarning::Consistency(_)));
        assert_eq!(report.cursor, None);
    }

    #[tokio::test]
    async fn default_policy_spares_foreign_duplicates() {
        let mut client = MockCorpusClient::new();
        client.expect_list_entries().returning(|| {
            Ok(vec![
                CorpusEntry::new("e1", "Tracker"),
                CorpusEntry::new("e2", "Tracker"),
                CorpusEntry::new("e3", "Tracker").with_description(crate::UPLOAD_DESCRIPTION),
            ])
        });
        client.expect_upload_entry().returning(|_, _| Ok("e4".into()));
        client
            .expect_delete_entry()
            .times(2)
            .returning(|id| {
                assert_ne!(id, "e2", "foreign duplicate deleted");
                Ok(())
            });

        let report = reconciler(client, Arc::new(MemoryCursorStore::new()))
            .reconcile(PluginResult::from_content("Tracker", "new").without_version_update())
            .await
            .unwrap();

        assert_eq!(report.pruned, vec!["e1", "e3"]);
        assert_eq!(report.retained, vec!["e2"]);
    }

    #[test]
    fn policy_selection() {
        let matches = || {
            vec![
                CorpusEntry::new("a", "Doc"),
                CorpusEntry::new("b", "Doc").with_description(crate::UPLOAD_DESCRIPTION),
                CorpusEntry::new("c", "Doc").with_description("hand uploaded"),
            ]
        };
        let ids = |v: &[&str]| v.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert_eq!(
            DuplicatePolicy::default().select(matches()),
            (ids(&["a", "b"]), ids(&["c"]))
        );
        assert_eq!(
            DuplicatePolicy::KeepExtras.select(matches()),
            (ids(&["a"]), ids(&["b", "c"]))
        );
        assert_eq!(
            DuplicatePolicy::PruneAll.select(matches()),
            (ids(&["a", "b", "c"]), Vec::new())
        );
        assert_eq!(DuplicatePolicy::default().select(Vec::new()), (Vec::new(), Vec::new()));
    }

    #[test]
    fn transient_artifact_guard_removes_file() {
        let file = NamedTempFile::new().unwrap();
        let (_, path) = file.keep().unwrap();
        assert!(path.exists());
        drop(TransientArtifact(path.clone()));
        assert!(!path.exists());
    }
}
