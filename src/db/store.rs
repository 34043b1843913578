//! SQLite document store with live subscriptions.
//!
//! Every committed write announces the affected collection on a broadcast
//! channel; subscription pumps re-read and push a fresh snapshot.

use std::future::Future;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

use crate::backend::{
    CollectionPath, CollectionSnapshot, DocumentPath, DocumentSnapshot, DocumentStore, Fields,
    StoreError, StoredDocument, Subscription,
};

/// Snapshots buffered per subscriber before the pump waits.
const SUBSCRIPTION_BUFFER: usize = 16;

/// Pending change notifications before slow pumps lag.
const CHANGE_CAPACITY: usize = 64;

/// Document store persisted in SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<String>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { pool, changes }
    }

    /// Read one document.
    pub async fn get_document(&self, path: &DocumentPath) -> Result<Option<Fields>, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(path.parent().as_str())
            .bind(path.id())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| parse_fields(path.as_str(), row.get("data")))
            .transpose()
    }

    /// Read every document in a collection, oldest first.
    pub async fn list_documents(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY created_at, id",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredDocument, StoreError> {
                let id: String = row.get("id");
                let data = parse_fields(&format!("{}/{}", collection, id), row.get("data"))?;
                Ok(StoredDocument { id, data })
            })
            .collect()
    }

    fn notify(&self, collection: &CollectionPath) {
        // No receivers simply means no live subscriptions
        let _ = self.changes.send(collection.to_string());
    }

    /// Spawn a task that pushes `read()` now and after every change to `collection`.
    fn spawn_pump<T, F, Fut>(&self, collection: &CollectionPath, read: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Subscribe before the first read so no write slips between them
        let mut changes = self.changes.subscribe();
        let collection = collection.to_string();

        let task = tokio::spawn(async move {
            loop {
                let snapshot = read().await;
                if let Err(e) = &snapshot {
                    tracing::warn!("Snapshot read failed for {}: {}", collection, e);
                }
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                if !wait_for_change(&mut changes, &collection).await {
                    break;
                }
            }
            tracing::debug!("Subscription on {} released", collection);
        });

        Subscription::new(rx, Some(task.abort_handle()))
    }
}

async fn wait_for_change(changes: &mut broadcast::Receiver<String>, collection: &str) -> bool {
    loop {
        match changes.recv().await {
            Ok(changed) if changed == collection => return true,
            Ok(_) => continue,
            // Missed notifications: re-read to catch up
            Err(RecvError::Lagged(_)) => return true,
            Err(RecvError::Closed) => return false,
        }
    }
}

fn parse_fields(path: &str, raw: String) -> Result<Fields, StoreError> {
    serde_json::from_str(&raw).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn encode_fields(fields: &Fields) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|e| StoreError::Unavailable(e.to_string()))
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<DocumentSnapshot>, StoreError> {
        let store = self.clone();
        let path = path.clone();
        let collection = path.parent();

        Ok(self.spawn_pump(&collection, move || {
            let store = store.clone();
            let path = path.clone();
            async move {
                let data = store.get_document(&path).await?;
                Ok(DocumentSnapshot { path, data })
            }
        }))
    }

    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
    ) -> Result<Subscription<CollectionSnapshot>, StoreError> {
        let store = self.clone();
        let collection = path.clone();

        Ok(self.spawn_pump(path, move || {
            let store = store.clone();
            let collection = collection.clone();
            async move {
                let docs = store.list_documents(&collection).await?;
                Ok(CollectionSnapshot { docs })
            }
        }))
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        data: Fields,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = now();

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection.as_str())
        .bind(&id)
        .bind(encode_fields(&data)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.notify(collection);
        Ok(id)
    }

    async fn update_document(
        &self,
        path: &DocumentPath,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let collection = path.parent();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(path.id())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let mut data = parse_fields(path.as_str(), row.get("data"))?;
        for (key, value) in fields {
            data.insert(key, value);
        }

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(encode_fields(&data)?)
            .bind(now())
            .bind(collection.as_str())
            .bind(path.id())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.notify(&collection);
        Ok(())
    }

    async fn create_document_if_absent(
        &self,
        path: &DocumentPath,
        data: Fields,
    ) -> Result<bool, StoreError> {
        let collection = path.parent();
        let now = now();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection.as_str())
        .bind(path.id())
        .bind(encode_fields(&data)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        if created {
            self.notify(&collection);
        }
        Ok(created)
    }
}
