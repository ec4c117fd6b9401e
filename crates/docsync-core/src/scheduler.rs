//! Plugin scheduler
//!
//! Runs an [`ExecutionPlan`] with bounded concurrency:
//! - a plugin starts once every dependency has finished
//! - ready plugins start lowest declaration index first
//! - each invocation is isolated: errors, panics and deadline overruns become
//!   a `Failed` outcome for that plugin only
//! - cancellation stops new starts; in-flight work is never aborted
//!
//! Reconciliation of a produced result happens inside the same task through
//! the [`ResultHandler`] seam.

use crate::connector::{PluginContext, SourceConnector};
use crate::descriptor::{DependencyPolicy, PluginConfig};
use crate::error::BoxError;
use crate::outcome::{PluginOutcome, PluginStatus, RunReport};
use crate::plan::ExecutionPlan;
use crate::result::PluginResult;
use async_trait::async_trait;
use docsync_cursor::{CursorReader, Version};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Default per-invocation deadline
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// What the result handler confirmed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReceipt {
    /// Corpus entry id of the upload
    pub entry_id: String,
    /// Cursor value written, if any
    pub cursor: Option<Version>,
    /// Non-fatal issues
    pub warnings: Vec<String>,
}

/// Consumes a produced result, typically by reconciling it into the corpus
#[async_trait]
pub trait ResultHandler: Send + Sync {
    /// Handle one successful result that carries a payload
    async fn handle(&self, result: PluginResult, ctx: &PluginContext) -> Result<SyncReceipt, BoxError>;
}

/// Per-run settings and collaborators
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    cursor: CursorReader,
    cancel: CancellationToken,
    plugin_timeout: Duration,
    events: Option<mpsc::UnboundedSender<PluginOutcome>>,
}

impl RunContext {
    /// Fresh run with a new id and default deadline
    #[must_use]
    pub fn new(cursor: CursorReader) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cursor,
            cancel: CancellationToken::new(),
            plugin_timeout: DEFAULT_PLUGIN_TIMEOUT,
            events: None,
        }
    }

    /// Use an externally owned cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the per-invocation deadline
    #[inline]
    #[must_use]
    pub fn with_plugin_timeout(mut self, timeout: Duration) -> Self {
        self.plugin_timeout = timeout;
        self
    }

    /// Forward every outcome to a channel as it happens
    #[inline]
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PluginOutcome>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run identifier
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Cancellation token for this run
    #[inline]
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Per-invocation deadline
    #[inline]
    #[must_use]
    pub fn plugin_timeout(&self) -> Duration {
        self.plugin_timeout
    }

    fn plugin_context(&self, plugin: &str, config: Arc<PluginConfig>) -> PluginContext {
        PluginContext::new(
            plugin,
            self.run_id,
            config,
            self.cursor.clone(),
            self.cancel.clone(),
            self.plugin_timeout,
        )
    }

    fn emit(&self, outcome: &PluginOutcome) {
        if let Some(tx) = &self.events {
            // A dropped receiver only loses the live feed; the report still has it.
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Executes a plan
pub struct Scheduler {
    plan: Arc<ExecutionPlan>,
    handler: Arc<dyn ResultHandler>,
    policy: DependencyPolicy,
}

impl Scheduler {
    /// Create a scheduler with the `RunAfterCompletion` default policy
    #[must_use]
    pub fn new(plan: ExecutionPlan, handler: Arc<dyn ResultHandler>) -> Self {
        Self {
            plan: Arc::new(plan),
            handler,
            policy: DependencyPolicy::default(),
        }
    }

    /// Run-level dependency policy; descriptors may override it
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: DependencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The plan being executed
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Run every plugin once
    ///
    /// Never fails as a whole; per-plugin problems are in the report.
    pub async fn run(&self, ctx: &RunContext, max_concurrency: usize) -> RunReport {
        let span = tracing::info_span!("sync_run", run_id = %ctx.run_id());
        self.run_inner(ctx, max_concurrency.max(1)).instrument(span).await
    }

    async fn run_inner(&self, ctx: &RunContext, limit: usize) -> RunReport {
        let started = Instant::now();
        let plan = &self.plan;
        let n = plan.len();

        let mut waiting: Vec<usize> = (0..n).map(|i| plan.in_degree(i)).collect();
        let mut settled: Vec<Option<PluginStatus>> = vec![None; n];
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| waiting[i] == 0).collect();
        let mut in_flight: JoinSet<(usize, PluginOutcome)> = JoinSet::new();
        let mut outcomes: Vec<Option<PluginOutcome>> = vec![None; n];

        tracing::info!(plugins = n, max_concurrency = limit, "run started");

        loop {
            while in_flight.len() < limit {
                let Some(pos) = ready.pop_first() else { break };
                let planned = plan.at(pos);

                let skip = if !planned.is_enabled() {
                    Some(PluginStatus::Disabled)
                } else if ctx.cancellation().is_cancelled() {
                    Some(PluginStatus::Cancelled)
                } else {
                    self.blocked_by(pos, &settled)
                        .map(|dependency| PluginStatus::Blocked { dependency })
                };

                if let Some(status) = skip {
                    let outcome = PluginOutcome {
                        plugin: planned.name().to_string(),
                        status,
                        duration: Duration::ZERO,
                    };
                    self.settle(pos, outcome, ctx, &mut settled, &mut waiting, &mut ready, &mut outcomes);
                    continue;
                }

                let Some(connector) = planned.connector() else { continue };
                let pctx = ctx.plugin_context(planned.name(), planned.config());
                let handler = self.handler.clone();
                let timeout = ctx.plugin_timeout();
                let span = tracing::info_span!("plugin", plugin = %planned.name());
                in_flight.spawn(
                    async move {
                        let clock = Instant::now();
                        let status = invoke(connector, handler, &pctx, timeout).await;
                        let outcome = PluginOutcome {
                            plugin: pctx.plugin().to_string(),
                            status,
                            duration: clock.elapsed(),
                        };
                        (pos, outcome)
                    }
                    .instrument(span),
                );
            }

            match in_flight.join_next().await {
                Some(Ok((pos, outcome))) => {
                    self.settle(pos, outcome, ctx, &mut settled, &mut waiting, &mut ready, &mut outcomes);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "plugin task lost");
                }
                None => break,
            }
        }

        // A missing slot means its task was lost and its dependents never became ready.
        let outcomes = plan
            .execution_order()
            .iter()
            .map(|&pos| {
                outcomes[pos].take().unwrap_or_else(|| PluginOutcome {
                    plugin: plan.at(pos).name().to_string(),
                    status: PluginStatus::Failed {
                        display_name: None,
                        reason: "plugin task did not report an outcome".to_string(),
                    },
                    duration: Duration::ZERO,
                })
            })
            .collect();

        let report = RunReport {
            run_id: ctx.run_id(),
            outcomes,
            duration: started.elapsed(),
        };
        tracing::info!(
            synchronized = report.synchronized(),
            failures = report.failures(),
            elapsed_ms = report.duration.as_millis() as u64,
            "run finished"
        );
        report
    }

    fn blocked_by(&self, pos: usize, settled: &[Option<PluginStatus>]) -> Option<String> {
        if self.plan.at(pos).policy(self.policy) != DependencyPolicy::RequireSuccess {
            return None;
        }
        let mut deps: Vec<usize> = self.plan.dependencies(pos).collect();
        deps.sort_unstable();
        deps.into_iter()
            .find(|&d| settled[d].as_ref().is_some_and(PluginStatus::is_failure))
            .map(|d| self.plan.at(d).name().to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        pos: usize,
        outcome: PluginOutcome,
        ctx: &RunContext,
        settled: &mut [Option<PluginStatus>],
        waiting: &mut [usize],
        ready: &mut BTreeSet<usize>,
        outcomes: &mut [Option<PluginOutcome>],
    ) {
        log_outcome(&outcome);
        ctx.emit(&outcome);
        settled[pos] = Some(outcome.status.clone());
        outcomes[pos] = Some(outcome);

        for dependent in self.plan.dependents(pos) {
            waiting[dependent] -= 1;
            if waiting[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("plan", &self.plan)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

async fn invoke(
    connector: Arc<dyn SourceConnector>,
    handler: Arc<dyn ResultHandler>,
    ctx: &PluginContext,
    timeout: Duration,
) -> PluginStatus {
    let produced = tokio::time::timeout(
        timeout,
        AssertUnwindSafe(connector.produce_result(ctx)).catch_unwind(),
    )
    .await;

    let result = match produced {
        Err(_) => {
            return PluginStatus::Failed {
                display_name: None,
                reason: format!("exceeded deadline of {}s", timeout.as_secs_f64()),
            }
        }
        Ok(Err(panic)) => {
            return PluginStatus::Failed {
                display_name: None,
                reason: format!("connector panicked: {}", panic_message(panic.as_ref())),
            }
        }
        Ok(Ok(Err(e))) => {
            return PluginStatus::Failed {
                display_name: None,
                reason: e.to_string(),
            }
        }
        Ok(Ok(Ok(result))) => result,
    };

    let display_name = result.display_name.clone();
    if !result.success {
        return PluginStatus::Failed {
            reason: result
                .error_message
                .clone()
                .unwrap_or_else(|| "connector reported failure".to_string()),
            display_name: Some(display_name),
        };
    }
    if !result.has_payload() {
        return PluginStatus::Unchanged { display_name };
    }

    match AssertUnwindSafe(handler.handle(result, ctx)).catch_unwind().await {
        Ok(Ok(receipt)) => PluginStatus::Synchronized {
            display_name,
            entry_id: receipt.entry_id,
            version: receipt.cursor,
            warnings: receipt.warnings,
        },
        Ok(Err(e)) => PluginStatus::Failed {
            display_name: Some(display_name),
            reason: e.to_string(),
        },
        Err(panic) => PluginStatus::Failed {
            display_name: Some(display_name),
            reason: format!("result handler panicked: {}", panic_message(panic.as_ref())),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_outcome(outcome: &PluginOutcome) {
    let elapsed_ms = outcome.duration.as_millis() as u64;
    match &outcome.status {
        PluginStatus::Failed { reason, .. } => {
            tracing::warn!(plugin = %outcome.plugin, status = "failed", elapsed_ms, %reason, "plugin finished");
        }
        status if status.is_failure() => {
            tracing::warn!(plugin = %outcome.plugin, status = status.label(), elapsed_ms, "plugin finished");
        }
        status => {
            tracing::info!(plugin = %outcome.plugin, status = status.label(), elapsed_ms, "plugin finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_variants() {
        let a: Box<dyn Any + Send> = Box::new("static");
        let b: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "non-string panic payload");
    }

    #[test]
    fn run_context_builders() {
        let cursor = CursorReader::new(Arc::new(docsync_cursor::MemoryCursorStore::new()));
        let token = CancellationToken::new();
        let ctx = RunContext::new(cursor)
            .with_plugin_timeout(Duration::from_secs(5))
            .with_cancellation(token.clone());
        assert_eq!(ctx.plugin_timeout(), Duration::from_secs(5));
        token.cancel();
        assert!(ctx.cancellation().is_cancelled());
    }
}
