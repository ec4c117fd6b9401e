//! Tabular rows rendered into retrieval-friendly text
//!
//! Each kept row becomes one record:
//!
//! ```text
//! Item ID: item-12
//! Issue Description: Login fails after upgrade
//! Priority: P1 | Status: Open | Area: Auth
//! Raised By: ops
//! Jira ID: AUTH-881
//! ```
//!
//! Records are separated by a line of 40 dashes. Rows whose id is empty or
//! lacks an accepted prefix are dropped, which also skips repeated header
//! rows in exported sheets.

use crate::{file_display_name, modified_version};
use async_trait::async_trait;
use docsync_core::{ConnectorError, PluginContext, PluginDescriptor, PluginResult, SourceConnector, DEFAULT_EXTENSION};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// Line between rendered records
pub const RECORD_SEPARATOR: &str = "----------------------------------------";

/// One row, column order preserved
pub type Row = IndexMap<String, Value>;

/// Column layout for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRenderer {
    /// Column holding the record id
    pub id_column: String,
    /// Column rendered right after the id, newlines flattened
    pub title_column: Option<String>,
    /// Columns joined on a single ` | ` line
    pub metadata_columns: Vec<String>,
    /// Body columns; every remaining column when empty
    pub body_columns: Vec<String>,
    /// Case-insensitive id prefixes to keep; any non-empty id when empty
    pub id_prefixes: Vec<String>,
}

impl RowRenderer {
    /// Renderer keyed on an id column
    #[must_use]
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            title_column: None,
            metadata_columns: Vec::new(),
            body_columns: Vec::new(),
            id_prefixes: Vec::new(),
        }
    }

    /// Set the title column
    #[must_use]
    pub fn with_title(mut self, column: impl Into<String>) -> Self {
        self.title_column = Some(column.into());
        self
    }

    /// Set the metadata columns
    #[must_use]
    pub fn with_metadata<I: IntoIterator<Item = S>, S: Into<String>>(mut self, columns: I) -> Self {
        self.metadata_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set explicit body columns
    #[must_use]
    pub fn with_body<I: IntoIterator<Item = S>, S: Into<String>>(mut self, columns: I) -> Self {
        self.body_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set accepted id prefixes
    #[must_use]
    pub fn with_id_prefixes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, prefixes: I) -> Self {
        self.id_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Render all kept rows
    #[must_use]
    pub fn render(&self, rows: &[Row]) -> String {
        rows.iter()
            .filter_map(|row| self.render_row(row))
            .collect::<Vec<_>>()
            .join(&format!("\n{RECORD_SEPARATOR}\n"))
    }

    /// Render one row, or `None` when it is not a record
    #[must_use]
    pub fn render_row(&self, row: &Row) -> Option<String> {
        let id = row.get(&self.id_column).and_then(cell)?;
        if !self.accepts(&id) {
            return None;
        }

        let mut lines = vec![format!("{}: {id}", self.id_column)];

        if let Some(title_column) = &self.title_column {
            if let Some(title) = row.get(title_column).and_then(cell) {
                lines.push(format!("{title_column}: {}", title.replace('\n', " ")));
            }
        }

        let meta: Vec<String> = self
            .metadata_columns
            .iter()
            .filter_map(|c| row.get(c).and_then(cell).map(|v| format!("{c}: {v}")))
            .collect();
        if !meta.is_empty() {
            lines.push(meta.join(" | "));
        }

        let body: Vec<&String> = if self.body_columns.is_empty() {
            row.keys().filter(|c| !self.is_header_column(c)).collect()
        } else {
            self.body_columns.iter().filter(|c| !self.is_header_column(c)).collect()
        };
        for column in body {
            if let Some(value) = row.get(column).and_then(cell) {
                lines.push(format!("{column}: {value}"));
            }
        }

        Some(lines.join("\n"))
    }

    fn accepts(&self, id: &str) -> bool {
        let lowered = id.to_lowercase();
        self.id_prefixes.is_empty()
            || self
                .id_prefixes
                .iter()
                .any(|p| lowered.starts_with(&p.to_lowercase()))
    }

    fn is_header_column(&self, column: &str) -> bool {
        column == self.id_column
            || self.title_column.as_deref() == Some(column)
            || self.metadata_columns.iter().any(|c| c == column)
    }
}

/// Trimmed text of a cell; blank, null and "nan" cells are absent
fn cell(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(text)
    }
}

// Renderer keys are inlined: `flatten` would defeat `deny_unknown_fields`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    path: PathBuf,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    extension: Option<String>,
    id_column: String,
    #[serde(default)]
    title_column: Option<String>,
    #[serde(default)]
    metadata_columns: Vec<String>,
    #[serde(default)]
    body_columns: Vec<String>,
    #[serde(default)]
    id_prefixes: Vec<String>,
}

impl Config {
    fn renderer(&self) -> RowRenderer {
        RowRenderer {
            id_column: self.id_column.clone(),
            title_column: self.title_column.clone(),
            metadata_columns: self.metadata_columns.clone(),
            body_columns: self.body_columns.clone(),
            id_prefixes: self.id_prefixes.clone(),
        }
    }
}

/// Renders a JSON array of row objects into one text document
#[derive(Debug, Clone)]
pub struct JsonRows {
    path: PathBuf,
    display_name: String,
    extension: String,
    renderer: RowRenderer,
}

impl JsonRows {
    /// Connector over a rows file
    ///
    /// # Errors
    /// [`ConnectorError::Config`] when no display name can be derived.
    pub fn new(
        path: impl Into<PathBuf>,
        display_name: Option<String>,
        renderer: RowRenderer,
    ) -> Result<Self, ConnectorError> {
        let path = path.into();
        let display_name = match display_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => file_display_name(&path)?,
        };
        Ok(Self {
            path,
            display_name,
            extension: DEFAULT_EXTENSION.to_string(),
            renderer,
        })
    }

    /// Build from configuration
    ///
    /// # Errors
    /// [`ConnectorError::Config`] for missing or unknown keys.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, ConnectorError> {
        let config: Config = descriptor.config_as()?;
        let renderer = config.renderer();
        let mut rows = Self::new(config.path, config.display_name, renderer)?;
        if let Some(ext) = config.extension {
            rows.extension = ext;
        }
        Ok(rows)
    }

    async fn load(&self) -> Result<Vec<Row>, ConnectorError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConnectorError::io(&self.path, e))?;
        serde_json::from_slice(&raw).map_err(|e| {
            ConnectorError::Source(format!("{} is not a JSON array of objects: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl SourceConnector for JsonRows {
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
        let version = modified_version(&self.path).await?;
        if !ctx.cursor().is_new_version_available(&self.display_name, &version).await? {
            return Ok(PluginResult::unchanged(&self.display_name));
        }
        if ctx.cancellation().is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }

        let rows = self.load().await?;
        let content = self.renderer.render(&rows);
        tracing::info!(display_name = %self.display_name, rows = rows.len(), %version, "rows rendered");
        if content.is_empty() {
            tracing::warn!(display_name = %self.display_name, "no row matched; nothing to upload");
            return Ok(PluginResult::unchanged(&self.display_name));
        }

        Ok(PluginResult::from_temp_file(&self.display_name, &content, &self.extension)?.with_version(version))
    }
}
