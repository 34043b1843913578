//! In-memory fakes for the collaborators, driven by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::*;

/// Store fake whose subscriptions are fed by the test.
pub struct FakeStore {
    doc_feeds: Mutex<HashMap<String, Vec<mpsc::Sender<Result<DocumentSnapshot, StoreError>>>>>,
    collection_feeds:
        Mutex<HashMap<String, Vec<mpsc::Sender<Result<CollectionSnapshot, StoreError>>>>>,
    docs: Mutex<HashMap<String, Fields>>,
    pub created: Mutex<Vec<(String, Fields)>>,
    pub if_absent_writes: Mutex<Vec<(String, Fields)>>,
    pub updates: Mutex<Vec<(String, Fields)>>,
    fail_writes: Mutex<Option<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            doc_feeds: Mutex::new(HashMap::new()),
            collection_feeds: Mutex::new(HashMap::new()),
            docs: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            if_absent_writes: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            fail_writes: Mutex::new(None),
        }
    }

    /// Make every write fail with the given message.
    pub fn fail_writes(&self, message: &str) {
        *self.fail_writes.lock().unwrap() = Some(message.to_string());
    }

    pub fn seed(&self, path: &DocumentPath, data: Fields) {
        self.docs.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn doc(&self, path: &DocumentPath) -> Option<Fields> {
        self.docs.lock().unwrap().get(path.as_str()).cloned()
    }

    /// Senders for every subscription ever opened on `path`, including released ones.
    pub fn doc_feeds(
        &self,
        path: &DocumentPath,
    ) -> Vec<mpsc::Sender<Result<DocumentSnapshot, StoreError>>> {
        self.doc_feeds
            .lock()
            .unwrap()
            .get(path.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn collection_feeds(
        &self,
        path: &CollectionPath,
    ) -> Vec<mpsc::Sender<Result<CollectionSnapshot, StoreError>>> {
        self.collection_feeds
            .lock()
            .unwrap()
            .get(path.as_str())
            .cloned()
            .unwrap_or_default()
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        match self.fail_writes.lock().unwrap().as_ref() {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<DocumentSnapshot>, StoreError> {
        let (tx, rx) = mpsc::channel(16);
        self.doc_feeds
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx, None))
    }

    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
    ) -> Result<Subscription<CollectionSnapshot>, StoreError> {
        let (tx, rx) = mpsc::channel(16);
        self.collection_feeds
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx, None))
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        data: Fields,
    ) -> Result<String, StoreError> {
        self.check_writes()?;
        let mut created = self.created.lock().unwrap();
        let id = format!("fake-{}", created.len() + 1);
        created.push((collection.to_string(), data));
        Ok(id)
    }

    async fn update_document(
        &self,
        path: &DocumentPath,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .get_mut(path.as_str())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        for (key, value) in fields.clone() {
            doc.insert(key, value);
        }
        self.updates.lock().unwrap().push((path.to_string(), fields));
        Ok(())
    }

    async fn create_document_if_absent(
        &self,
        path: &DocumentPath,
        data: Fields,
    ) -> Result<bool, StoreError> {
        self.check_writes()?;
        self.if_absent_writes
            .lock()
            .unwrap()
            .push((path.to_string(), data.clone()));
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(path.as_str()) {
            return Ok(false);
        }
        docs.insert(path.to_string(), data);
        Ok(true)
    }
}

/// Auth fake: anonymous sign-in always succeeds, custom tokens always fail.
pub struct FakeAuth {
    state: watch::Sender<Option<Identity>>,
}

impl FakeAuth {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Push an auth-state change as the service would.
    pub fn set(&self, identity: Option<Identity>) {
        self.state.send_replace(identity);
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        let identity = Identity {
            uid: "anon-1".to_string(),
            is_anonymous: true,
        };
        self.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_custom_token(&self, _token: &str) -> Result<Identity, AuthError> {
        Err(AuthError::InvalidToken)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set(None);
        Ok(())
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }
}
