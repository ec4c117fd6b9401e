//! Per-plugin outcomes and the run report

use docsync_cursor::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Final state of one plugin in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PluginStatus {
    /// New content is live in the corpus
    Synchronized {
        /// Document display name
        display_name: String,
        /// Corpus entry id of the upload
        entry_id: String,
        /// Cursor value written, if any
        version: Option<Version>,
        /// Non-fatal issues (duplicates, failed stale deletes)
        warnings: Vec<String>,
    },
    /// Source had no new version
    Unchanged {
        /// Document display name
        display_name: String,
    },
    /// Connector or reconciliation failed
    Failed {
        /// Document display name, when the connector got that far
        display_name: Option<String>,
        /// Failure reason
        reason: String,
    },
    /// A dependency did not succeed under `RequireSuccess`
    Blocked {
        /// The first failed dependency
        dependency: String,
    },
    /// Not started because the run was cancelled
    Cancelled,
    /// Disabled in configuration
    Disabled,
}

impl PluginStatus {
    /// Failed, blocked or cancelled
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked { .. } | Self::Cancelled)
    }

    /// Short lowercase label for logs and summaries
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Synchronized { .. } => "synchronized",
            Self::Unchanged { .. } => "unchanged",
            Self::Failed { .. } => "failed",
            Self::Blocked { .. } => "blocked",
            Self::Cancelled => "cancelled",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronized {
                display_name,
                entry_id,
                version,
                warnings,
            } => {
                write!(f, "synchronized '{display_name}' as {entry_id}")?;
                if let Some(v) = version {
                    write!(f, " at {v}")?;
                }
                if !warnings.is_empty() {
                    write!(f, " ({} warning(s))", warnings.len())?;
                }
                Ok(())
            }
            Self::Unchanged { display_name } => write!(f, "'{display_name}' has no new version"),
            Self::Failed { reason, .. } => write!(f, "failed: {reason}"),
            Self::Blocked { dependency } => write!(f, "blocked by '{dependency}'"),
            Self::Cancelled => f.write_str("cancelled before start"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Outcome event for one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOutcome {
    /// Plugin name
    pub plugin: String,
    /// Final state
    pub status: PluginStatus,
    /// Wall time spent in the invocation
    pub duration: Duration,
}

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every enabled plugin succeeded or had nothing new
    Success,
    /// At least one plugin failed, was blocked or was cancelled
    PluginFailures,
    /// Startup configuration was invalid
    ConfigurationError,
}

impl ExitStatus {
    /// Numeric process exit code
    #[inline]
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PluginFailures => 1,
            Self::ConfigurationError => 2,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Outcomes in execution order, whatever order plugins finished in
    pub outcomes: Vec<PluginOutcome>,
    /// Total wall time
    pub duration: Duration,
}

impl RunReport {
    /// Outcome of a plugin by name
    #[must_use]
    pub fn outcome(&self, plugin: &str) -> Option<&PluginOutcome> {
        self.outcomes.iter().find(|o| o.plugin == plugin)
    }

    /// Status of a plugin by name
    #[must_use]
    pub fn status(&self, plugin: &str) -> Option<&PluginStatus> {
        self.outcome(plugin).map(|o| &o.status)
    }

    /// Number of outcomes counted as failures
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failure()).count()
    }

    /// Number of plugins that uploaded new content
    #[must_use]
    pub fn synchronized(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, PluginStatus::Synchronized { .. }))
            .count()
    }

    /// Exit status for the process
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        if self.failures() == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::PluginFailures
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {}: {} plugin(s), {} synchronized, {} failed, {:.2}s",
            self.run_id,
            self.outcomes.len(),
            self.synchronized(),
            self.failures(),
            self.duration.as_secs_f64()
        )?;
        for o in &self.outcomes {
            writeln!(f, "  {:<24} {}", o.plugin, o.status)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(plugin: &str, status: PluginStatus) -> PluginOutcome {
        PluginOutcome {
            plugin: plugin.into(),
            status,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn exit_code_zero_when_only_skips_and_syncs() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            outcomes: vec![
                outcome("a", PluginStatus::Unchanged { display_name: "A".into() }),
                outcome("b", PluginStatus::Disabled),
            ],
            duration: Duration::ZERO,
        };
        assert_eq!(report.exit_status().code(), 0);
    }

    #[test]
    fn blocked_and_cancelled_count_as_failures() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            outcomes: vec![
                outcome("a", PluginStatus::Blocked { dependency: "x".into() }),
                outcome("b", PluginStatus::Cancelled),
            ],
            duration: Duration::ZERO,
        };
        assert_eq!(report.failures(), 2);
        assert_eq!(report.exit_status(), ExitStatus::PluginFailures);
        assert_eq!(ExitStatus::ConfigurationError.code(), 2);
    }

    #[test]
    fn summary_lists_every_plugin() {
        let report = RunReport {
            run_id: Uuid::nil(),
            outcomes: vec![
                outcome(
                    "a",
                    PluginStatus::Failed {
                        display_name: None,
                        reason: "boom".into(),
                    },
                ),
                outcome("b", PluginStatus::Cancelled),
            ],
            duration: Duration::ZERO,
        };
        let text = report.to_string();
        assert!(text.contains("failed: boom"));
        assert!(text.contains("cancelled before start"));
    }
}
