//! Live config/inquiry sync for one identity.
//!
//! Each sync cycle carries a generation number. Snapshots are applied only
//! while the shared state still carries that generation, so events that
//! arrive after teardown are dropped.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::SiteState;
use crate::backend::{
    CollectionSnapshot, DocumentPath, DocumentSnapshot, DocumentStore, Subscription,
};
use crate::models::{Inquiry, SiteConfig};

/// Shared handles each sync task needs.
#[derive(Clone)]
pub(crate) struct SyncContext {
    pub store: Arc<dyn DocumentStore>,
    pub state: Arc<RwLock<SiteState>>,
    pub config_path: DocumentPath,
}

/// Running subscriptions of one cycle.
///
/// Dropping the cycle aborts its tasks, and each task releases its
/// subscription as it goes. This holds even when the cycle is dropped
/// half-built.
#[derive(Default)]
pub(crate) struct SyncCycle {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncCycle {
    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }
}

impl Drop for SyncCycle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub(crate) async fn run_config_sync(
    ctx: SyncContext,
    mut subscription: Subscription<DocumentSnapshot>,
    generation: u64,
) {
    let mut seeded = false;
    while let Some(event) = subscription.next().await {
        match event {
            Ok(snapshot) => {
                if !apply_config_snapshot(&ctx, snapshot, generation, &mut seeded).await {
                    break;
                }
            }
            Err(e) => tracing::error!("Config fetch error: {}", e),
        }
    }
    subscription.unsubscribe();
}

pub(crate) async fn run_inquiry_sync(
    ctx: SyncContext,
    mut subscription: Subscription<CollectionSnapshot>,
    generation: u64,
) {
    while let Some(event) = subscription.next().await {
        match event {
            Ok(snapshot) => {
                if !apply_inquiry_snapshot(&ctx, snapshot, generation).await {
                    break;
                }
            }
            Err(e) => tracing::error!("Inquiry fetch error: {}", e),
        }
    }
    subscription.unsubscribe();
}

/// Returns false once the cycle is stale.
async fn apply_config_snapshot(
    ctx: &SyncContext,
    snapshot: DocumentSnapshot,
    generation: u64,
    seeded: &mut bool,
) -> bool {
    let Some(fields) = snapshot.data else {
        let current = {
            let state = ctx.state.read().await;
            if state.generation != generation {
                return false;
            }
            state.config.clone()
        };
        if *seeded {
            return true;
        }
        *seeded = true;

        match ctx
            .store
            .create_document_if_absent(&ctx.config_path, current.to_fields())
            .await
        {
            Ok(true) => tracing::info!("Seeded site config at {}", snapshot.path),
            Ok(false) => tracing::debug!("Site config already present at {}", snapshot.path),
            Err(e) => tracing::error!("Failed to seed site config: {}", e),
        }
        return true;
    };

    let config: SiteConfig = match serde_json::from_value(Value::Object(fields)) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring malformed site config at {}: {}", snapshot.path, e);
            return true;
        }
    };

    let mut state = ctx.state.write().await;
    if state.generation != generation {
        return false;
    }
    state.config = config;
    true
}

async fn apply_inquiry_snapshot(
    ctx: &SyncContext,
    snapshot: CollectionSnapshot,
    generation: u64,
) -> bool {
    let inquiries: Vec<Inquiry> = snapshot
        .docs
        .iter()
        .map(|doc| Inquiry::from_document(&doc.id, &doc.data))
        .collect();

    let mut state = ctx.state.write().await;
    if state.generation != generation {
        return false;
    }
    state.inquiries = inquiries;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_dropping_cycle_aborts_tasks() {
        let (alive, stopped) = oneshot::channel::<()>();
        let mut cycle = SyncCycle::default();
        cycle.push(tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        }));

        drop(cycle);
        // The sender is dropped only once the task has been aborted
        assert!(stopped.await.is_err());
    }
}
