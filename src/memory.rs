//! In-process collaborators.
//!
//! Stand-ins for the remote store, object storage, the notification service
//! and the device's image picker. They keep everything in memory, honour the
//! same contracts as the real services (owner scoping, ordering, create-only
//! uploads, owner-filtered change events) and let callers inject failures.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, WarrantyError};
use crate::models::{NewWarranty, OwnerId, Warranty};
use crate::notifications::{LocalNotifier, PermissionStatus, ReminderRequest};
use crate::realtime::{ChangeFeed, ChangeKind, FeedEvent, FeedSubscription, TransportStatus};
use crate::repository::WarrantyRepository;
use crate::storage::{ImageSource, ObjectStorage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remote operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    List,
    Insert,
    Update,
    Subscribe,
}

struct Subscriber {
    owner_id: OwnerId,
    tx: mpsc::UnboundedSender<FeedEvent>,
}

#[derive(Default)]
struct RemoteState {
    rows: Vec<Warranty>,
    failures: HashMap<RemoteOperation, String>,
    calls: HashMap<RemoteOperation, usize>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscription: u64,
    manual_ack: bool,
}

impl RemoteState {
    fn begin(&mut self, operation: RemoteOperation) -> Result<()> {
        *self.calls.entry(operation).or_default() += 1;
        match self.failures.remove(&operation) {
            Some(message) => Err(WarrantyError::Store(message)),
            None => Ok(()),
        }
    }

    fn broadcast(&mut self, owner_id: OwnerId, kind: ChangeKind) {
        self.subscribers
            .retain(|_, subscriber| {
                subscriber.owner_id != owner_id || subscriber.tx.send(FeedEvent::Change(kind)).is_ok()
            });
    }
}

/// The `warranties` table and its change feed, held in memory
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with `message`.
    pub fn fail_next(&self, operation: RemoteOperation, message: impl Into<String>) {
        lock(&self.state).failures.insert(operation, message.into());
    }

    /// How many times `operation` was attempted
    pub fn calls(&self, operation: RemoteOperation) -> usize {
        lock(&self.state).calls.get(&operation).copied().unwrap_or_default()
    }

    /// Every stored row regardless of owner
    pub fn rows(&self) -> Vec<Warranty> {
        lock(&self.state).rows.clone()
    }

    /// When set, subscriptions are not acknowledged until
    /// [`emit_status`](Self::emit_status) sends `Subscribed`.
    pub fn set_manual_ack(&self, manual: bool) {
        lock(&self.state).manual_ack = manual;
    }

    /// Open subscriptions
    pub fn subscription_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Owners with an open subscription
    pub fn subscribed_owners(&self) -> HashSet<OwnerId> {
        lock(&self.state)
            .subscribers
            .values()
            .map(|subscriber| subscriber.owner_id)
            .collect()
    }

    /// Deliver a transport status to every subscriber of `owner_id`.
    pub fn emit_status(&self, owner_id: OwnerId, status: &TransportStatus) {
        let state = lock(&self.state);
        for subscriber in state.subscribers.values().filter(|s| s.owner_id == owner_id) {
            let _ = subscriber.tx.send(FeedEvent::Status(status.clone()));
        }
    }

    /// Drop every subscription channel without a status, as a lost socket would.
    pub fn disconnect_all(&self) {
        lock(&self.state).subscribers.clear();
    }

    /// Delete a row, as another device or an admin would.
    pub fn delete_row(&self, id: Uuid) -> bool {
        let mut state = lock(&self.state);
        let Some(position) = state.rows.iter().position(|row| row.id == id) else {
            return false;
        };
        let removed = state.rows.remove(position);
        state.broadcast(removed.owner_id, ChangeKind::Delete);
        true
    }
}

#[async_trait]
impl WarrantyRepository for InMemoryRemoteStore {
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Warranty>> {
        let mut state = lock(&self.state);
        state.begin(RemoteOperation::List)?;
        let mut rows: Vec<Warranty> = state
            .rows
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.due_date);
        Ok(rows)
    }

    async fn insert(&self, fields: NewWarranty) -> Result<Warranty> {
        let mut state = lock(&self.state);
        state.begin(RemoteOperation::Insert)?;

        if fields.client_name.trim().is_empty() || fields.client_phone.trim().is_empty() {
            return Err(WarrantyError::Store("null value violates not-null constraint".into()));
        }

        let row = Warranty {
            id: Uuid::new_v4(),
            owner_id: fields.owner_id,
            client_name: fields.client_name,
            client_phone: fields.client_phone,
            exchange_date: fields.exchange_date,
            warranty_days: fields.warranty_days,
            due_date: fields.due_date,
            notes: fields.notes,
            image_url: fields.image_url,
            notification_id: None,
            created_at: Utc::now(),
        };
        state.rows.push(row.clone());
        state.broadcast(row.owner_id, ChangeKind::Insert);
        Ok(row)
    }

    async fn update_notification_id(&self, id: Uuid, notification_id: String) -> Result<Warranty> {
        let mut state = lock(&self.state);
        state.begin(RemoteOperation::Update)?;

        let row = state
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| WarrantyError::Store(format!("warranty {id} not found")))?;
        row.notification_id = Some(notification_id);
        let updated = row.clone();
        state.broadcast(updated.owner_id, ChangeKind::Update);
        Ok(updated)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryRemoteStore {
    async fn subscribe(&self, owner_id: OwnerId) -> Result<FeedSubscription> {
        let mut state = lock(&self.state);
        state.begin(RemoteOperation::Subscribe)?;

        let (tx, events) = mpsc::unbounded_channel();
        if !state.manual_ack {
            let _ = tx.send(FeedEvent::Status(TransportStatus::Subscribed));
        }
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscribers.insert(id, Subscriber { owner_id, tx });
        Ok(FeedSubscription { id, events })
    }

    async fn unsubscribe(&self, subscription_id: u64) {
        lock(&self.state).subscribers.remove(&subscription_id);
    }
}

/// A create-only object bucket
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        *lock(&self.fail_next) = Some(message.into());
    }

    /// Stored paths with their content types
    pub fn objects(&self) -> Vec<(String, String)> {
        lock(&self.objects)
            .iter()
            .map(|(path, (_, content_type))| (path.clone(), content_type.clone()))
            .collect()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if let Some(message) = lock(&self.fail_next).take() {
            return Err(WarrantyError::Upload(message));
        }
        let mut objects = lock(&self.objects);
        if objects.contains_key(path) {
            return Err(WarrantyError::Upload(format!("object {path} already exists")));
        }
        objects.insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Images addressed by reference, with an optional read delay
#[derive(Default)]
pub struct InMemoryImageSource {
    images: Mutex<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
}

impl InMemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read sleeps for `delay` first
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.images).insert(reference.into(), bytes);
    }
}

#[async_trait]
impl ImageSource for InMemoryImageSource {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.images)
            .get(reference)
            .cloned()
            .ok_or_else(|| WarrantyError::Upload(format!("no image at {reference}")))
    }
}

/// Notification service that records what it was asked to schedule
pub struct InMemoryNotifier {
    scheduled: Mutex<Vec<(String, ReminderRequest)>>,
    permission: Mutex<PermissionStatus>,
    fail_next: Mutex<Option<String>>,
    delay: Option<Duration>,
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self {
            scheduled: Mutex::new(Vec::new()),
            permission: Mutex::new(PermissionStatus::Undetermined),
            fail_next: Mutex::new(None),
            delay: None,
        }
    }
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every schedule call sleeps for `delay` first
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        *lock(&self.fail_next) = Some(message.into());
    }

    /// Handles and requests scheduled so far
    pub fn scheduled(&self) -> Vec<(String, ReminderRequest)> {
        lock(&self.scheduled).clone()
    }
}

#[async_trait]
impl LocalNotifier for InMemoryNotifier {
    async fn schedule(&self, request: ReminderRequest) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = lock(&self.fail_next).take() {
            return Err(WarrantyError::Notification(message));
        }
        let handle = Uuid::new_v4().to_string();
        lock(&self.scheduled).push((handle.clone(), request));
        Ok(handle)
    }

    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(*lock(&self.permission))
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        let mut permission = lock(&self.permission);
        *permission = PermissionStatus::Granted;
        Ok(*permission)
    }
}
