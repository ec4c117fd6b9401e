//! docsync Corpus
//!
//! Keeps the remote retrieval corpus in step with produced documents:
//! - [`CorpusClient`]: list, upload and delete against the remote store
//! - [`Reconciler`]: upload-before-delete replacement plus cursor advance
//! - [`RetryPolicy`]: bounded exponential backoff for transient failures
//! - [`HttpCorpusClient`]: REST implementation of the client

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod http;
pub mod reconcile;
pub mod retry;

pub use client::{CorpusClient, CorpusEntry, UPLOAD_DESCRIPTION};
pub use error::{CorpusConsistencyWarning, CorpusError, ReconcileError, ReconcileWarning};
pub use http::{content_digest, HttpCorpusClient, CONTENT_DIGEST_HEADER};
pub use reconcile::{DuplicatePolicy, ReconcileReport, Reconciler};
pub use retry::RetryPolicy;
