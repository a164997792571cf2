//! Application context.
//!
//! Owns the store and the realtime controller for one signed-in session and
//! drives them from auth changes. Built once at startup and passed around
//! explicitly; [`AppContext::dispose`] releases the live subscription.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{Result, WarrantyError};
use crate::models::OwnerId;
use crate::notifications::{LocalNotifier, PermissionStatus, ReminderScheduler};
use crate::realtime::{ChangeFeed, RealtimeSyncController, SyncStatus};
use crate::repository::WarrantyRepository;
use crate::storage::{ImageSource, ImageUploader, ObjectStorage};
use crate::store::WarrantyStore;

/// External services the core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn WarrantyRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub images: Arc<dyn ImageSource>,
    pub notifier: Arc<dyn LocalNotifier>,
    pub feed: Arc<dyn ChangeFeed>,
    pub clock: Arc<dyn Clock>,
}

/// Snapshot of the authentication provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Signed-in user, if any
    pub owner: Option<OwnerId>,
    /// Session still being restored; owner is not yet meaningful
    pub loading: bool,
}

/// Session-wide owner of the store and the realtime controller
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    store: WarrantyStore,
    realtime: Arc<Mutex<RealtimeSyncController>>,
    sync_status: watch::Receiver<SyncStatus>,
    notifier: Arc<dyn LocalNotifier>,
}

impl AppContext {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|e| WarrantyError::Config(e.to_string()))?;

        let uploader = ImageUploader::new(collaborators.storage, collaborators.images)
            .with_timeout(config.upload_timeout());
        let reminders = ReminderScheduler::new(
            Arc::clone(&collaborators.notifier),
            Arc::clone(&collaborators.clock),
        );
        let store = WarrantyStore::new(
            collaborators.repository,
            uploader,
            reminders,
            collaborators.clock,
        );
        let realtime = RealtimeSyncController::new(collaborators.feed, store.clone())
            .with_ack_timeout(config.subscribe_timeout());
        let sync_status = realtime.watch();

        Ok(Self {
            config: Arc::new(config),
            store,
            realtime: Arc::new(Mutex::new(realtime)),
            sync_status,
            notifier: collaborators.notifier,
        })
    }

    /// Startup work: make sure reminders may be shown.
    pub async fn init(&self) -> Result<PermissionStatus> {
        let status = self.notifier.permission_status().await?;
        if status == PermissionStatus::Granted {
            return Ok(status);
        }

        let status = self.notifier.request_permission().await?;
        if status == PermissionStatus::Granted {
            info!("Notification permission granted");
        } else {
            warn!(?status, "Notification permission not granted, reminders will not show");
        }
        Ok(status)
    }

    /// Apply an owner change: swap the collection, load it, then follow the
    /// new owner's changes. `None` signs out.
    pub async fn set_owner(&self, owner: Option<OwnerId>) {
        let mut realtime = self.realtime.lock().await;
        if self.store.owner() == owner && realtime.owner() == owner {
            return;
        }

        debug!(owner_id = ?owner, "Session owner changed");
        self.store.set_owner(owner);
        if owner.is_some() {
            if let Err(e) = self.store.refresh().await {
                warn!(error = %e, "Initial load failed");
            }
        }
        realtime.set_owner(owner).await;
    }

    /// Apply every settled auth state from `auth` until the sender goes away.
    pub fn follow_auth(&self, mut auth: watch::Receiver<AuthState>) -> JoinHandle<()> {
        let context = self.clone();
        tokio::spawn(async move {
            loop {
                let state = *auth.borrow_and_update();
                if state.loading {
                    debug!("Auth state still loading");
                } else {
                    context.set_owner(state.owner).await;
                }
                if auth.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Re-subscribe after the live connection degraded.
    pub async fn reconnect(&self) {
        self.realtime.lock().await.reconnect().await;
    }

    /// Release the live subscription and forget the owner.
    pub async fn dispose(&self) {
        self.realtime.lock().await.shutdown().await;
        self.store.set_owner(None);
        info!("Application context disposed");
    }

    pub fn store(&self) -> &WarrantyStore {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current realtime state
    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status.borrow().clone()
    }

    /// Receiver of realtime state transitions
    pub fn watch_sync(&self) -> watch::Receiver<SyncStatus> {
        self.sync_status.clone()
    }
}
