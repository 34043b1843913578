//! Capability interfaces for the external collaborators.
//!
//! The site never talks to a concrete backend directly. It is handed an
//! [`AuthService`] and a [`DocumentStore`] at construction time, so tests can
//! substitute fakes and feed synthetic snapshot sequences.

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

/// Fields of a stored document.
pub type Fields = Map<String, Value>;

/// Errors reported by the document store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("No document to update: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Malformed document at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Errors reported by the auth service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Custom token rejected")]
    InvalidToken,
}

/// Opaque identity issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub is_anonymous: bool,
}

/// Path to a single document: an even number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath(String);

/// Path to a collection: an odd number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments(path)?.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        let (parent, _) = self.split();
        CollectionPath(parent.to_string())
    }

    /// Document id, the last segment.
    pub fn id(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        // Validated in parse: at least two segments
        self.0.rsplit_once('/').unwrap_or(("", &self.0))
    }
}

impl CollectionPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments(path)?.len() % 2 != 1 {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store locations for one deployment.
#[derive(Debug, Clone)]
pub struct SitePaths {
    config: DocumentPath,
    inquiries: CollectionPath,
}

impl SitePaths {
    /// `artifacts/{deploymentId}/public/data/...`
    pub fn new(deployment_id: &str) -> Result<Self, StoreError> {
        let base = format!("artifacts/{}/public/data", deployment_id);
        Ok(Self {
            config: DocumentPath::parse(&format!("{}/siteConfig/main", base))?,
            inquiries: CollectionPath::parse(&format!("{}/inquiries", base))?,
        })
    }

    pub fn config(&self) -> &DocumentPath {
        &self.config
    }

    pub fn inquiries(&self) -> &CollectionPath {
        &self.inquiries
    }
}

/// Current value of one document; `data` is `None` when it does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocumentPath,
    pub data: Option<Fields>,
}

/// One document inside a collection snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Fields,
}

/// Full current contents of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub docs: Vec<StoredDocument>,
}

/// A live subscription: a stream of snapshots plus a cancellation handle.
///
/// Dropping the subscription also unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T, StoreError>>,
    producer: Option<AbortHandle>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<Result<T, StoreError>>, producer: Option<AbortHandle>) -> Self {
        Self { rx, producer }
    }

    /// Stop receiving updates and release the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
        self.rx.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Anonymous/custom-token authentication service.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError>;

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Watch channel that changes on every auth-state transition.
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>>;
}

/// Managed document database with live subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Emits the current document immediately, then again after every change.
    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<DocumentSnapshot>, StoreError>;

    /// Emits the full collection immediately, then again after every change.
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
    ) -> Result<Subscription<CollectionSnapshot>, StoreError>;

    /// Add a document with a store-assigned id and return that id.
    async fn create_document(
        &self,
        collection: &CollectionPath,
        data: Fields,
    ) -> Result<String, StoreError>;

    /// Merge `fields` into an existing document. Fails if the document is absent.
    async fn update_document(&self, path: &DocumentPath, fields: Fields)
        -> Result<(), StoreError>;

    /// Write `data` only if nothing exists at `path`. Returns whether it wrote.
    async fn create_document_if_absent(
        &self,
        path: &DocumentPath,
        data: Fields,
    ) -> Result<bool, StoreError>;
}
