//! Scheduler, reconciler, corpus and cursor store working together

use async_trait::async_trait;
use docsync_core::{
    ConnectorError, ExecutionPlan, PluginContext, PluginResult, PluginStatus, RunContext,
    Scheduler, SourceConnector,
};
use docsync_corpus::{CorpusError, Reconciler, RetryPolicy};
use docsync_cursor::{CursorReader, MemoryCursorStore, Version, VersionCursorStore};
use docsync_test_utils::{
    descriptor, registry_with, version, CorpusOp, FlakyCursorStore, MemoryCorpus,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source whose current revision can be changed between runs
struct Sheet {
    display_name: String,
    revision: Mutex<(Version, String)>,
}

impl Sheet {
    fn new(display_name: &str, at: &str, body: &str) -> Arc<Self> {
        Arc::new(Self {
            display_name: display_name.to_string(),
            revision: Mutex::new((version(at), body.to_string())),
        })
    }

    fn publish(&self, at: &str, body: &str) {
        *self.revision.lock().unwrap() = (version(at), body.to_string());
    }
}

#[async_trait]
impl SourceConnector for Sheet {
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
        let (at, body) = self.revision.lock().unwrap().clone();
        if !ctx.cursor().is_new_version_available(&self.display_name, &at).await? {
            return Ok(PluginResult::unchanged(&self.display_name));
        }
        Ok(PluginResult::from_content(&self.display_name, body).with_version(at))
    }
}

struct Harness {
    corpus: Arc<MemoryCorpus>,
    cursor: Arc<MemoryCursorStore>,
    scheduler: Scheduler,
}

impl Harness {
    fn new(sheet: Arc<Sheet>) -> Self {
        let corpus = Arc::new(MemoryCorpus::new());
        let cursor = Arc::new(MemoryCursorStore::new());
        let reconciler = Reconciler::new(corpus.clone(), cursor.clone()).with_retry(
            RetryPolicy::default().with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
        );
        let registry = registry_with(vec![("tracker", sheet as Arc<dyn SourceConnector>)]);
        let plan = ExecutionPlan::load(vec![descriptor("tracker", &[])], &registry).unwrap();
        Self {
            corpus,
            cursor: cursor.clone(),
            scheduler: Scheduler::new(plan, Arc::new(reconciler)),
        }
    }

    async fn run(&self) -> PluginStatus {
        let ctx = RunContext::new(CursorReader::new(self.cursor.clone()));
        let report = self.scheduler.run(&ctx, 2).await;
        report.status("tracker").cloned().unwrap()
    }
}

#[tokio::test]
async fn tracker_first_sync_then_skip() {
    let sheet = Sheet::new("Tracker", "2026-01-01T00:00:00Z", "Item ID: item-1");
    let h = Harness::new(sheet);

    assert!(matches!(h.run().await, PluginStatus::Synchronized { .. }));
    assert_eq!(h.corpus.entries_named("Tracker").len(), 1);
    assert_eq!(
        h.cursor.last_version("Tracker").await.unwrap(),
        Some(version("2026-01-01T00:00:00Z"))
    );

    assert_eq!(
        h.run().await,
        PluginStatus::Unchanged {
            display_name: "Tracker".into()
        }
    );
    assert_eq!(h.corpus.count(CorpusOp::Upload), 1);
}

#[tokio::test]
async fn older_source_version_is_skipped() {
    let sheet = Sheet::new("Tracker", "2026-02-01T00:00:00Z", "v2");
    let h = Harness::new(sheet.clone());
    h.run().await;

    sheet.publish("2026-01-15T00:00:00Z", "stale");
    assert!(matches!(h.run().await, PluginStatus::Unchanged { .. }));
    assert_eq!(h.corpus.entries_named("Tracker")[0].content, "v2");
}

#[tokio::test]
async fn newer_version_replaces_previous_entry() {
    let sheet = Sheet::new("Tracker", "2026-01-01T00:00:00Z", "v1");
    let h = Harness::new(sheet.clone());
    h.run().await;

    sheet.publish("2026-03-01T00:00:00Z", "v2");
    assert!(matches!(h.run().await, PluginStatus::Synchronized { .. }));

    let live = h.corpus.entries_named("Tracker");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].content, "v2");
}

#[tokio::test]
async fn failed_upload_is_retried_next_run() {
    let sheet = Sheet::new("Tracker", "2026-01-01T00:00:00Z", "v1");
    let h = Harness::new(sheet.clone());
    h.run().await;

    sheet.publish("2026-03-01T00:00:00Z", "v2");
    h.corpus
        .fail_times(CorpusOp::Upload, 4, CorpusError::Transient("503".into()));
    assert!(matches!(h.run().await, PluginStatus::Failed { .. }));
    assert_eq!(h.corpus.entries_named("Tracker")[0].content, "v1");

    assert!(matches!(h.run().await, PluginStatus::Synchronized { .. }));
    assert_eq!(h.corpus.entries_named("Tracker")[0].content, "v2");
}

#[tokio::test]
async fn unreadable_cursor_fails_only_that_document() {
    let corpus = Arc::new(MemoryCorpus::new());
    let cursor = FlakyCursorStore::new();
    cursor.fail_reads_for("Tracker");
    let reconciler = Reconciler::new(corpus.clone(), cursor.clone()).with_retry(
        RetryPolicy::default().with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
    );
    let registry = registry_with(vec![
        (
            "tracker",
            Sheet::new("Tracker", "2026-01-01T00:00:00Z", "v1") as Arc<dyn SourceConnector>,
        ),
        (
            "runbook",
            Sheet::new("Runbook", "2026-01-01T00:00:00Z", "steps") as Arc<dyn SourceConnector>,
        ),
    ]);
    let plan = ExecutionPlan::load(
        vec![descriptor("tracker", &[]), descriptor("runbook", &[])],
        &registry,
    )
    .unwrap();
    let scheduler = Scheduler::new(plan, Arc::new(reconciler));

    let report = scheduler
        .run(&RunContext::new(CursorReader::new(cursor.clone())), 2)
        .await;

    match report.status("tracker") {
        Some(PluginStatus::Failed { reason, .. }) => {
            assert!(reason.starts_with("cursor store"), "{reason}");
        }
        other => panic!("expected cursor failure, got {other:?}"),
    }
    assert!(matches!(report.status("runbook"), Some(PluginStatus::Synchronized { .. })));
    assert_eq!(report.exit_status().code(), 1);
    assert!(corpus.entries_named("Tracker").is_empty());
    assert_eq!(corpus.entries_named("Runbook").len(), 1);

    // Once readable again the document synchronizes; the sibling is skipped.
    cursor.restore_reads();
    let again = scheduler
        .run(&RunContext::new(CursorReader::new(cursor.clone())), 2)
        .await;
    assert!(matches!(again.status("tracker"), Some(PluginStatus::Synchronized { .. })));
    assert_eq!(again.exit_status().code(), 0);
}
