//! REST corpus client
//!
//! Talks to a corpus service exposing:
//! - `GET    {base}/corpora/{corpus}/entries[?page_token=…]`
//! - `POST   {base}/corpora/{corpus}/entries?display_name=…&description=…`
//! - `DELETE {base}/corpora/{corpus}/entries/{id}`
//!
//! Uploads send the raw file body with an `x-content-sha256` digest header.
//! 408, 429, 5xx and transport failures are transient; other statuses are
//! permanent. Deleting an entry that is already gone succeeds.

use crate::client::{CorpusClient, CorpusEntry, UPLOAD_DESCRIPTION};
use crate::error::CorpusError;
use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Header carrying the hex SHA-256 of the upload body
pub const CONTENT_DIGEST_HEADER: &str = "x-content-sha256";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    entries: Vec<CorpusEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// [`CorpusClient`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpCorpusClient {
    http: reqwest::Client,
    entries: Url,
    token: Option<String>,
}

impl HttpCorpusClient {
    /// Client for one corpus on a service
    ///
    /// # Errors
    /// [`CorpusError::Permanent`] when the base URL cannot carry a path or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, corpus: &str) -> Result<Self, CorpusError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CorpusError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            entries: entries_url(base_url, corpus)?,
            token: None,
        })
    }

    /// Send a bearer token with every request
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use a preconfigured HTTP client
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Entries collection URL
    #[inline]
    #[must_use]
    pub fn entries_url(&self) -> &Url {
        &self.entries
    }

    fn entry_url(&self, id: &str) -> Result<Url, CorpusError> {
        let mut url = self.entries.clone();
        url.path_segments_mut()
            .map_err(|()| CorpusError::Permanent(format!("'{}' cannot be a base URL", self.entries)))?
            .push(id);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, operation: &str) -> Result<Response, CorpusError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|e| classify_transport(operation, &e))
    }
}

fn entries_url(base_url: &str, corpus: &str) -> Result<Url, CorpusError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| CorpusError::Permanent(format!("invalid corpus URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| CorpusError::Permanent(format!("'{base_url}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(["corpora", corpus, "entries"]);
    Ok(url)
}

/// Hex SHA-256 of a body
#[must_use]
pub fn content_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn classify_status(operation: &str, status: StatusCode, body: &str) -> CorpusError {
    let message = format!("{operation} returned {status}: {}", body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        CorpusError::Transient(message)
    } else {
        CorpusError::Permanent(message)
    }
}

fn classify_transport(operation: &str, err: &reqwest::Error) -> CorpusError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CorpusError::Transient(message)
    } else {
        CorpusError::Permanent(message)
    }
}

async fn ensure_success(operation: &str, response: Response) -> Result<Response, CorpusError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(operation, status, &body))
}

async fn decode<T: serde::de::DeserializeOwned>(operation: &str, response: Response) -> Result<T, CorpusError> {
    response
        .json::<T>()
        .await
        .map_err(|e| CorpusError::Permanent(format!("{operation}: malformed response: {e}")))
}

#[async_trait]
impl CorpusClient for HttpCorpusClient {
    async fn list_entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.entries.clone();
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("page_token", token);
            }
            let response = self.send(self.http.get(url), "list_entries").await?;
            let page: ListPage = decode("list_entries", ensure_success("list_entries", response).await?).await?;
            entries.extend(page.entries);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        tracing::debug!(entries = entries.len(), "corpus listed");
        Ok(entries)
    }

    async fn upload_entry(&self, display_name: &str, path: &Path) -> Result<String, CorpusError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| CorpusError::Permanent(format!("cannot read {}: {e}", path.display())))?;
        let digest = content_digest(&body);

        let mut url = self.entries.clone();
        url.query_pairs_mut()
            .append_pair("display_name", display_name)
            .append_pair("description", UPLOAD_DESCRIPTION);

        let request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_DIGEST_HEADER, digest)
            .body(body);
        let response = self.send(request, "upload_entry").await?;
        let created: Created = decode("upload_entry", ensure_success("upload_entry", response).await?).await?;
        Ok(created.id)
    }

    async fn delete_entry(&self, id: &str) -> Result<(), CorpusError> {
        let response = self.send(self.http.delete(self.entry_url(id)?), "delete_entry").await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(entry_id = id, "entry already gone");
            return Ok(());
        }
        ensure_success("delete_entry", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_entries_url() {
        let client = HttpCorpusClient::new("http://corpus.local/api/", "rag docs").unwrap();
        assert_eq!(
            client.entries_url().as_str(),
            "http://corpus.local/api/corpora/rag%20docs/entries"
        );
        assert_eq!(
            client.entry_url("e/1").unwrap().as_str(),
            "http://corpus.local/api/corpora/rag%20docs/entries/e%2F1"
        );
    }

    #[test]
    fn rejects_bad_base() {
        assert!(matches!(
            HttpCorpusClient::new("not a url", "c"),
            Err(CorpusError::Permanent(_))
        ));
        assert!(matches!(
            HttpCorpusClient::new("mailto:someone@example.com", "c"),
            Err(CorpusError::Permanent(_))
        ));
    }

    #[test]
    fn status_classification() {
        for code in [408, 429, 500, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(classify_status("x", status, "").is_transient(), "{code}");
        }
        for code in [400, 401, 403, 404, 409, 413] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!classify_status("x", status, "").is_transient(), "{code}");
        }
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
