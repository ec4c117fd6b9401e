//! Testing utilities for the docsync workspace
//!
//! Shared fakes: an in-memory corpus with fault injection, scripted
//! connectors, a cursor store that can be made to fail, and small helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use docsync_core::{
    BoxError, ConnectorError, ConnectorRegistry, PluginContext, PluginDescriptor, PluginResult,
    ResultHandler, SourceConnector, SyncReceipt,
};
use docsync_corpus::{CorpusClient, CorpusEntry, CorpusError, UPLOAD_DESCRIPTION};
use docsync_cursor::{CursorError, CursorRecord, MemoryCursorStore, Version, VersionCursorStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Implementation name used by [`registry_with`]
pub const TEST_IMPLEMENTATION: &str = "test";

pub fn version(raw: &str) -> Version {
    Version::parse(raw).unwrap()
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorpusOp {
    List,
    Upload,
    Delete,
}

#[derive(Debug, Clone)]
pub enum Fault {
    Fail(CorpusError),
    Stall(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusCall {
    List,
    Upload { display_name: String, file_name: String, content: String },
    Delete { id: String },
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub entry: CorpusEntry,
    pub content: String,
}

#[derive(Debug, Default)]
struct CorpusState {
    entries: Vec<StoredEntry>,
    next_id: u64,
    faults: HashMap<CorpusOp, VecDeque<Fault>>,
    calls: Vec<CorpusCall>,
}

/// In-memory [`CorpusClient`] with queued faults per operation
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    state: Mutex<CorpusState>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry uploaded by someone else (no docsync description)
    pub fn with_entry(self, id: &str, display_name: &str, content: &str) -> Self {
        self.state.lock().entries.push(StoredEntry {
            entry: CorpusEntry::new(id, display_name),
            content: content.to_string(),
        });
        self
    }

    /// Queue a fault for the next call of `op`
    pub fn inject(&self, op: CorpusOp, fault: Fault) {
        self.state.lock().faults.entry(op).or_default().push_back(fault);
    }

    pub fn fail_next(&self, op: CorpusOp, err: CorpusError) {
        self.inject(op, Fault::Fail(err));
    }

    pub fn fail_times(&self, op: CorpusOp, times: usize, err: CorpusError) {
        for _ in 0..times {
            self.fail_next(op, err.clone());
        }
    }

    pub fn entries(&self) -> Vec<StoredEntry> {
        self.state.lock().entries.clone()
    }

    pub fn entries_named(&self, display_name: &str) -> Vec<StoredEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.entry.display_name == display_name)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<CorpusCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, op: CorpusOp) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    (op, c),
                    (CorpusOp::List, CorpusCall::List)
                        | (CorpusOp::Upload, CorpusCall::Upload { .. })
                        | (CorpusOp::Delete, CorpusCall::Delete { .. })
                )
            })
            .count()
    }

    async fn fault(&self, op: CorpusOp) -> Result<(), CorpusError> {
        let fault = self.state.lock().faults.get_mut(&op).and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::Fail(e)) => Err(e),
            Some(Fault::Stall(d)) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CorpusClient for MemoryCorpus {
    async fn list_entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        self.state.lock().calls.push(CorpusCall::List);
        self.fault(CorpusOp::List).await?;
        Ok(self.state.lock().entries.iter().map(|e| e.entry.clone()).collect())
    }

    async fn upload_entry(&self, display_name: &str, path: &Path) -> Result<String, CorpusError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CorpusError::Permanent(format!("cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.state.lock().calls.push(CorpusCall::Upload {
            display_name: display_name.to_string(),
            file_name,
            content: content.clone(),
        });
        self.fault(CorpusOp::Upload).await?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("entry-{}", state.next_id);
        state.entries.push(StoredEntry {
            entry: CorpusEntry::new(&id, display_name).with_description(UPLOAD_DESCRIPTION),
            content,
        });
        Ok(id)
    }

    async fn delete_entry(&self, id: &str) -> Result<(), CorpusError> {
        self.state.lock().calls.push(CorpusCall::Delete { id: id.to_string() });
        self.fault(CorpusOp::Delete).await?;
        self.state.lock().entries.retain(|e| e.entry.id != id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// Shared record of connector activity across a run
#[derive(Debug, Default)]
pub struct Activity {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Activity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self, name: &str) {
        self.started.lock().push(name.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self, name: &str) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().push(name.to_string());
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Return(PluginResult),
    Error(String),
    Panic(String),
}

/// Connector that plays back a fixed behavior
#[derive(Debug)]
pub struct ScriptedConnector {
    script: Script,
    delay: Duration,
    activity: Option<Arc<Activity>>,
    invocations: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            activity: None,
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn returning(result: PluginResult) -> Self {
        Self::new(Script::Return(result))
    }

    /// Successful result with inline content named after the plugin
    pub fn content(display_name: &str, content: &str) -> Self {
        Self::returning(PluginResult::from_content(display_name, content))
    }

    pub fn unchanged(display_name: &str) -> Self {
        Self::returning(PluginResult::unchanged(display_name))
    }

    pub fn failing(message: &str) -> Self {
        Self::new(Script::Error(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::new(Script::Panic(message.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_activity(mut self, activity: Arc<Activity>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(activity) = &self.activity {
            activity.enter(ctx.plugin());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(activity) = &self.activity {
            activity.exit(ctx.plugin());
        }
        match &self.script {
            Script::Return(result) => Ok(result.clone()),
            Script::Error(message) => Err(ConnectorError::Source(message.clone())),
            Script::Panic(message) => panic!("{message}"),
        }
    }
}

/// Registry where each connector is registered under its plugin name
pub fn registry_with(connectors: Vec<(&str, Arc<dyn SourceConnector>)>) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    for (name, connector) in connectors {
        registry.register_instance(TEST_IMPLEMENTATION, name, connector);
    }
    registry
}

/// Descriptor pointing at the connector registered by [`registry_with`]
pub fn descriptor(name: &str, deps: &[&str]) -> PluginDescriptor {
    PluginDescriptor::new(name, TEST_IMPLEMENTATION, name).with_dependencies(deps.iter().copied())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handler that accepts every result and remembers it
#[derive(Debug, Default)]
pub struct RecordingHandler {
    handled: Mutex<Vec<PluginResult>>,
    reject: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail handling for this display name
    pub fn reject(&self, display_name: &str) {
        self.reject.lock().push(display_name.to_string());
    }

    pub fn handled(&self) -> Vec<PluginResult> {
        self.handled.lock().clone()
    }
}

#[async_trait]
impl ResultHandler for RecordingHandler {
    async fn handle(&self, result: PluginResult, _ctx: &PluginContext) -> Result<SyncReceipt, BoxError> {
        if self.reject.lock().contains(&result.display_name) {
            return Err(format!("rejected '{}'", result.display_name).into());
        }
        let cursor = result.version()?;
        let entry_id = format!("recorded-{}", result.display_name);
        self.handled.lock().push(result);
        Ok(SyncReceipt {
            entry_id,
            cursor,
            warnings: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Cursor store
// ---------------------------------------------------------------------------

/// Memory cursor store whose reads or writes can be switched off
///
/// Reads fail per document name; writes fail for every name.
#[derive(Debug, Default)]
pub struct FlakyCursorStore {
    inner: MemoryCursorStore,
    unreadable: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
}

impl FlakyCursorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads_for(&self, name: &str) {
        self.unreadable.lock().insert(name.to_string());
    }

    pub fn restore_reads(&self) {
        self.unreadable.lock().clear();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> CursorError {
        CursorError::StoreUnavailable("injected outage".to_string())
    }
}

#[async_trait]
impl VersionCursorStore for FlakyCursorStore {
    async fn record(&self, name: &str) -> Result<Option<CursorRecord>, CursorError> {
        if self.unreadable.lock().contains(name) {
            return Err(Self::unavailable());
        }
        self.inner.record(name).await
    }

    async fn set_last_version(&self, name: &str, version: &Version) -> Result<(), CursorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.set_last_version(name, version).await
    }

    async fn records(&self) -> Result<Vec<CursorRecord>, CursorError> {
        if !self.unreadable.lock().is_empty() {
            return Err(Self::unavailable());
        }
        self.inner.records().await
    }
}
