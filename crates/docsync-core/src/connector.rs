//! Source connector seam
//!
//! A connector is instantiated once per run from its descriptor and asked for
//! exactly one [`PluginResult`] through [`SourceConnector::produce_result`].

use crate::descriptor::PluginConfig;
use crate::error::ConnectorError;
use crate::result::PluginResult;
use async_trait::async_trait;
use docsync_cursor::CursorReader;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Source-specific extraction logic
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Produce this run's result
    ///
    /// Connectors consult [`PluginContext::cursor`] to decide whether their
    /// source changed and return [`PluginResult::unchanged`] when it did not.
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError>;
}

/// Everything a connector may see while it runs
#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin: String,
    run_id: Uuid,
    config: Arc<PluginConfig>,
    cursor: CursorReader,
    cancel: CancellationToken,
    deadline: Instant,
}

impl PluginContext {
    /// Build a context; the deadline starts now
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        run_id: Uuid,
        config: Arc<PluginConfig>,
        cursor: CursorReader,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            run_id,
            config,
            cursor,
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    /// Plugin name
    #[inline]
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Identifier of the current run
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Plugin configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Read-only cursor view
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> &CursorReader {
        &self.cursor
    }

    /// Run cancellation token
    #[inline]
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Point in time after which the invocation is abandoned
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
