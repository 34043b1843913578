//! The site application: identity bootstrap, live sync, and the two writes.
//!
//! Lifecycle: [`SiteApp::start`] watches auth state and signs in. Every
//! identity change tears down the running sync cycle and, if an identity is
//! present, opens the config and inquiry subscriptions again.

pub mod gate;
mod sync;

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::backend::{AuthService, DocumentStore, Identity, SitePaths, StoreError};
use crate::errors::AppError;
use crate::models::{
    sort_newest_first, Inquiry, InquiryForm, NewInquiry, ProgramClass, SiteConfig,
    SiteConfigUpdate,
};
use gate::{UiSession, View};
use sync::{run_config_sync, run_inquiry_sync, SyncContext, SyncCycle};

/// In-memory mirror of the store, plus the current identity.
#[derive(Debug, Clone)]
pub struct SiteState {
    pub identity: Option<Identity>,
    pub config: SiteConfig,
    pub inquiries: Vec<Inquiry>,
    generation: u64,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            identity: None,
            config: SiteConfig::default(),
            inquiries: Vec::new(),
            generation: 0,
        }
    }
}

impl SiteState {
    /// Identity not yet resolved.
    pub fn loading(&self) -> bool {
        self.identity.is_none()
    }
}

/// Deployment settings for the site.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub deployment_id: String,
    pub initial_auth_token: Option<String>,
    pub admin_passcode: String,
}

/// What a visitor's screen shows.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Page {
    Loading,
    Public {
        site: SiteConfig,
        programs: Vec<&'static str>,
        show_login: bool,
        passcode: String,
    },
    Admin {
        site: SiteConfig,
        inquiries: Vec<Inquiry>,
        inquiry_count: usize,
    },
}

pub struct SiteApp {
    auth: Arc<dyn AuthService>,
    store: Arc<dyn DocumentStore>,
    paths: SitePaths,
    initial_auth_token: Option<String>,
    admin_passcode: String,
    state: Arc<RwLock<SiteState>>,
    sync: Mutex<Option<SyncCycle>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SiteApp {
    pub fn new(
        auth: Arc<dyn AuthService>,
        store: Arc<dyn DocumentStore>,
        settings: SiteSettings,
    ) -> Result<Arc<Self>, StoreError> {
        let paths = SitePaths::new(&settings.deployment_id)?;
        Ok(Arc::new(Self {
            auth,
            store,
            paths,
            initial_auth_token: settings.initial_auth_token,
            admin_passcode: settings.admin_passcode,
            state: Arc::new(RwLock::new(SiteState::default())),
            sync: Mutex::new(None),
            watcher: Mutex::new(None),
        }))
    }

    pub fn paths(&self) -> &SitePaths {
        &self.paths
    }

    pub fn admin_passcode(&self) -> &str {
        &self.admin_passcode
    }

    /// Watch auth state, then sign in.
    ///
    /// Sign-in failure is only logged; the site stays in the loading state.
    pub async fn start(self: &Arc<Self>) {
        let mut changes = self.auth.on_auth_state_changed();
        let app: Weak<Self> = Arc::downgrade(self);

        let watcher = tokio::spawn(async move {
            loop {
                let identity = changes.borrow_and_update().clone();
                let Some(app) = app.upgrade() else { break };
                app.apply_identity(identity).await;
                drop(app);

                if changes.changed().await.is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.watcher.lock().await.replace(watcher) {
            previous.abort();
        }

        self.sign_in().await;
    }

    async fn sign_in(&self) {
        let result = match &self.initial_auth_token {
            Some(token) => self.auth.sign_in_with_custom_token(token).await,
            None => self.auth.sign_in_anonymously().await,
        };
        match result {
            Ok(identity) => tracing::info!(
                uid = %identity.uid,
                anonymous = identity.is_anonymous,
                "Signed in"
            ),
            Err(e) => tracing::error!("Authentication failed: {}", e),
        }
    }

    async fn apply_identity(&self, identity: Option<Identity>) {
        self.stop_sync().await;
        self.state.write().await.identity = identity.clone();
        if identity.is_some() {
            self.start_sync().await;
        }
    }

    async fn start_sync(&self) {
        let generation = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.generation
        };
        let ctx = SyncContext {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            config_path: self.paths.config().clone(),
        };

        // Held in the cycle from the first spawn, so cancelling this future
        // mid-way still aborts whatever was started
        let mut cycle = SyncCycle::default();
        match self.store.subscribe_document(self.paths.config()).await {
            Ok(sub) => cycle.push(tokio::spawn(run_config_sync(ctx.clone(), sub, generation))),
            Err(e) => tracing::error!("Config fetch error: {}", e),
        }
        match self.store.subscribe_collection(self.paths.inquiries()).await {
            Ok(sub) => cycle.push(tokio::spawn(run_inquiry_sync(ctx, sub, generation))),
            Err(e) => tracing::error!("Inquiry fetch error: {}", e),
        }

        tracing::debug!(generation, "Sync cycle started");
        let previous = self.sync.lock().await.replace(cycle);
        drop(previous);
    }

    async fn stop_sync(&self) {
        let cycle = self.sync.lock().await.take();
        // Invalidate first so nothing lands between here and the aborts
        self.state.write().await.generation += 1;
        if let Some(cycle) = cycle {
            drop(cycle);
            tracing::debug!("Sync cycle released");
        }
    }

    /// Stop watching auth state and release both subscriptions.
    ///
    /// Waits for the watcher to finish first, so no cycle it was building
    /// can be installed after the final teardown.
    pub async fn shutdown(&self) {
        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            watcher.abort();
            if let Err(e) = watcher.await {
                if !e.is_cancelled() {
                    tracing::error!("Auth watcher failed: {}", e);
                }
            }
        }
        self.stop_sync().await;
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading()
    }

    pub async fn site_config(&self) -> SiteConfig {
        self.state.read().await.config.clone()
    }

    /// Inquiries for the admin list, most recent first.
    pub async fn inquiries_newest_first(&self) -> Vec<Inquiry> {
        let mut inquiries = self.state.read().await.inquiries.clone();
        sort_newest_first(&mut inquiries);
        inquiries
    }

    /// Render the page for a visitor's UI session.
    pub async fn render(&self, session: &UiSession) -> Page {
        let state = self.state.read().await;
        if state.loading() {
            return Page::Loading;
        }
        match session.view() {
            View::Public => Page::Public {
                site: state.config.clone(),
                programs: ProgramClass::ALL.iter().map(|c| c.as_str()).collect(),
                show_login: session.show_login(),
                passcode: session.passcode().to_string(),
            },
            View::Admin => {
                let mut inquiries = state.inquiries.clone();
                sort_newest_first(&mut inquiries);
                Page::Admin {
                    site: state.config.clone(),
                    inquiry_count: inquiries.len(),
                    inquiries,
                }
            }
        }
    }

    async fn require_identity(&self) -> Result<(), AppError> {
        if self.is_loading().await {
            return Err(AppError::NotReady("Site is still loading".to_string()));
        }
        Ok(())
    }

    /// Record a public enrollment inquiry.
    pub async fn submit_inquiry(&self, form: &InquiryForm) -> Result<Inquiry, AppError> {
        self.require_identity().await?;
        let inquiry = NewInquiry::from_form(form, Utc::now())?;

        match self
            .store
            .create_document(self.paths.inquiries(), inquiry.to_fields())
            .await
        {
            Ok(id) => {
                tracing::info!(id = %id, class = inquiry.class.as_str(), "Inquiry submitted");
                Ok(inquiry.into_inquiry(id))
            }
            Err(e) => {
                tracing::error!("Inquiry submission failed: {}", e);
                Err(AppError::Store(
                    "Error submitting. Please try again.".to_string(),
                ))
            }
        }
    }

    /// Apply an admin content edit. Last writer wins.
    pub async fn update_site_config(&self, update: &SiteConfigUpdate) -> Result<(), AppError> {
        self.require_identity().await?;
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        self.store
            .update_document(self.paths.config(), update.to_fields())
            .await
            .map_err(|e| {
                tracing::error!("Site config update failed: {}", e);
                AppError::Store(format!("Failed to update website: {}", e))
            })?;

        tracing::info!("Site config updated");
        Ok(())
    }
}
