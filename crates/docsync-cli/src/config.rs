//! Settings file and environment overrides
//!
//! ```yaml
//! run:
//!   max_concurrency: 4
//!   plugin_timeout_secs: 300
//!   dependency_policy: require_success
//! cursor_store:
//!   url: sqlite://docsync.db
//!   table: file_tracker
//! corpus:
//!   base_url: https://corpus.internal
//!   corpus: support-docs
//!   duplicate_policy: prune_owned
//!   retry:
//!     max_attempts: 4
//! plugins:
//!   - name: tracker
//!     implementation: builtin
//!     connector: json_rows
//!     config: { path: exports/tracker.json, id_column: Item ID }
//! ```

use docsync_core::{DependencyPolicy, PluginDescriptor, DEFAULT_PLUGIN_TIMEOUT};
use docsync_corpus::{CorpusError, DuplicatePolicy, HttpCorpusClient, RetryPolicy};
use docsync_cursor::DEFAULT_TABLE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Settings file read when none is given
pub(crate) const DEFAULT_SETTINGS_FILE: &str = "docsync.yml";

const ENV_CURSOR_URL: &str = "DOCSYNC_CURSOR_URL";
const ENV_CURSOR_TABLE: &str = "DOCSYNC_CURSOR_TABLE";
const ENV_CORPUS_URL: &str = "DOCSYNC_CORPUS_URL";
const ENV_CORPUS_NAME: &str = "DOCSYNC_CORPUS_NAME";
const ENV_CORPUS_TOKEN: &str = "DOCSYNC_CORPUS_TOKEN";

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("corpus client: {0}")]
    Corpus(#[from] CorpusError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RunSettings {
    pub(crate) max_concurrency: usize,
    pub(crate) plugin_timeout_secs: u64,
    pub(crate) dependency_policy: DependencyPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            plugin_timeout_secs: DEFAULT_PLUGIN_TIMEOUT.as_secs(),
            dependency_policy: DependencyPolicy::default(),
        }
    }
}

impl RunSettings {
    #[inline]
    pub(crate) fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CursorStoreSettings {
    pub(crate) url: String,
    pub(crate) table: String,
}

impl Default for CursorStoreSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://docsync.db".to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RetrySettings {
    pub(crate) max_attempts: u32,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: duration_millis(policy.base_delay),
            max_delay_ms: duration_millis(policy.max_delay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CorpusSettings {
    pub(crate) base_url: Option<String>,
    pub(crate) corpus: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) attempt_timeout_secs: u64,
    /// Which same-named entries a replacement upload deletes
    pub(crate) duplicate_policy: DuplicatePolicy,
    pub(crate) retry: RetrySettings,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            corpus: None,
            token: None,
            attempt_timeout_secs: RetryPolicy::default().attempt_timeout.as_secs(),
            duplicate_policy: DuplicatePolicy::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl CorpusSettings {
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_backoff(
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            )
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
    }

    /// REST client for the configured corpus
    pub(crate) fn client(&self) -> Result<HttpCorpusClient, SettingsError> {
        let (Some(base_url), Some(corpus)) = (&self.base_url, &self.corpus) else {
            return Err(SettingsError::Invalid(format!(
                "corpus.base_url and corpus.corpus are required (or {ENV_CORPUS_URL} / {ENV_CORPUS_NAME})"
            )));
        };
        let client = HttpCorpusClient::new(base_url, corpus)?;
        Ok(match &self.token {
            Some(token) => client.with_token(token.as_str()),
            None => client,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) run: RunSettings,
    pub(crate) cursor_store: CursorStoreSettings,
    pub(crate) corpus: CorpusSettings,
    pub(crate) plugins: Vec<PluginDescriptor>,
}

impl Settings {
    /// Read a settings file and apply the process environment
    ///
    /// Call [`Settings::validate`] once command-line overrides are applied.
    pub(crate) fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_yaml(&raw)?.with_env(|key| std::env::var(key).ok()))
    }

    pub(crate) fn from_yaml(raw: &str) -> Result<Self, SettingsError> {
        // An empty document deserializes to unit, not to a mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Overlay `DOCSYNC_*` variables from `lookup`
    #[must_use]
    pub(crate) fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_CURSOR_URL) {
            self.cursor_store.url = url;
        }
        if let Some(table) = lookup(ENV_CURSOR_TABLE) {
            self.cursor_store.table = table;
        }
        if let Some(url) = lookup(ENV_CORPUS_URL) {
            self.corpus.base_url = Some(url);
        }
        if let Some(name) = lookup(ENV_CORPUS_NAME) {
            self.corpus.corpus = Some(name);
        }
        if let Some(token) = lookup(ENV_CORPUS_TOKEN) {
            self.corpus.token = Some(token);
        }
        self
    }

    #[must_use]
    pub(crate) fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.run.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub(crate) fn with_dependency_policy(mut self, policy: DependencyPolicy) -> Self {
        self.run.dependency_policy = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SettingsError> {
        if self.run.max_concurrency == 0 {
            return Err(SettingsError::Invalid("run.max_concurrency must be at least 1".into()));
        }
        if self.run.plugin_timeout_secs == 0 {
            return Err(SettingsError::Invalid("run.plugin_timeout_secs must be at least 1".into()));
        }
        if self.corpus.retry.max_attempts == 0 {
            return Err(SettingsError::Invalid("corpus.retry.max_attempts must be at least 1".into()));
        }
        if self.corpus.retry.base_delay_ms > self.corpus.retry.max_delay_ms {
            return Err(SettingsError::Invalid(
                "corpus.retry.base_delay_ms exceeds corpus.retry.max_delay_ms".into(),
            ));
        }
        if self.corpus.attempt_timeout_secs == 0 {
            return Err(SettingsError::Invalid("corpus.attempt_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const SAMPLE: &str = r"
run:
  max_concurrency: 2
  dependency_policy: require_success
cursor_store:
  table: doc_versions
corpus:
  base_url: http://localhost:8080
  corpus: support
  retry:
    max_attempts: 6
plugins:
  - name: tracker
    implementation: builtin
    connector: json_rows
    depends_on: [welcome]
    config:
      path: exports/tracker.json
      id_column: Item ID
  - name: welcome
    implementation: builtin
    connector: inline_text
    config: { display_name: Welcome, content: hello }
";

    #[test]
    fn parses_sections_with_defaults() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();

        assert_eq!(settings.run.max_concurrency, 2);
        assert_eq!(settings.run.plugin_timeout(), DEFAULT_PLUGIN_TIMEOUT);
        assert_eq!(settings.run.dependency_policy, DependencyPolicy::RequireSuccess);
        assert_eq!(settings.cursor_store.url, "sqlite://docsync.db");
        assert_eq!(settings.cursor_store.table, "doc_versions");
        assert_eq!(settings.corpus.retry.max_attempts, 6);
        assert_eq!(settings.corpus.retry.base_delay_ms, 500);
        assert_eq!(settings.plugins.len(), 2);
        assert_eq!(settings.plugins[0].depends_on, vec!["welcome".to_string()]);
        settings.validate().unwrap();
    }

    #[test]
    fn pruning_every_duplicate_is_opt_in() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.corpus.duplicate_policy, DuplicatePolicy::PruneOwned);

        let explicit = Settings::from_yaml("corpus:\n  duplicate_policy: prune_all\n").unwrap();
        assert_eq!(explicit.corpus.duplicate_policy, DuplicatePolicy::PruneAll);

        let bogus = Settings::from_yaml("corpus:\n  duplicate_policy: prune_some\n").unwrap_err();
        assert!(matches!(bogus, SettingsError::Parse(_)));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Settings::from_yaml("").unwrap(), Settings::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = Settings::from_yaml("run:\n  max_concurency: 2\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            (ENV_CURSOR_URL, "sqlite:///var/lib/docsync.db"),
            (ENV_CORPUS_URL, "https://corpus.example"),
            (ENV_CORPUS_TOKEN, "s3cret"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_yaml(SAMPLE)
            .unwrap()
            .with_env(|key| env.get(key).map(ToString::to_string));

        assert_eq!(settings.cursor_store.url, "sqlite:///var/lib/docsync.db");
        assert_eq!(settings.cursor_store.table, "doc_versions");
        assert_eq!(settings.corpus.base_url.as_deref(), Some("https://corpus.example"));
        assert_eq!(settings.corpus.corpus.as_deref(), Some("support"));
        assert_eq!(settings.corpus.token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn retry_policy_follows_settings() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        let policy = settings.corpus.retry_policy();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn validation_rejects_nonsense() {
        let zero = Settings::default().with_max_concurrency(0);
        assert!(matches!(zero.validate(), Err(SettingsError::Invalid(_))));

        let mut inverted = Settings::default();
        inverted.corpus.retry.base_delay_ms = 10_000;
        inverted.corpus.retry.max_delay_ms = 100;
        assert!(inverted.validate().is_err());

        let policy = Settings::default().with_dependency_policy(DependencyPolicy::RequireSuccess);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn client_requires_corpus_location() {
        assert!(matches!(
            CorpusSettings::default().client(),
            Err(SettingsError::Invalid(_))
        ));

        let settings = Settings::from_yaml(SAMPLE).unwrap();
        let client = settings.corpus.client().unwrap();
        assert_eq!(
            client.entries_url().as_str(),
            "http://localhost:8080/corpora/support/entries"
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Settings::load(&path).unwrap().plugins.len(), 2);

        let missing = Settings::load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(missing, SettingsError::Read { .. }));
    }
}
