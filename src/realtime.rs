//! Live sync with the remote store.
//!
//! [`RealtimeSyncController`] keeps at most one owner-scoped subscription
//! open, folds transport callbacks into a single [`ConnectionState`] machine
//! and turns every change event into a full store refetch.
//!
//! ```text
//! idle -> connecting -> subscribing -> subscribed
//!                            |             |
//!                            +-> timed_out <+      (ack never arrived)
//!                            +-> channel_error     (subscription torn down)
//!                            +-> closed
//! any state -> idle on sign-out or shutdown
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WarrantyError};
use crate::metrics::MetricsCollector;
use crate::models::OwnerId;
use crate::store::WarrantyStore;

/// Message recorded when the transport reports an error without one
pub const CHANNEL_ERROR_MESSAGE: &str = "Erro na conexão com atualizações em tempo real.";
/// Message recorded when the subscription could not even be opened
pub const SUBSCRIBE_ERROR_MESSAGE: &str =
    "Erro ao iniciar a conexão com atualizações em tempo real.";
/// Message recorded when the acknowledgment never arrives
pub const TIMED_OUT_MESSAGE: &str = "A conexão com as atualizações expirou. Puxe para atualizar.";

/// Default bound on waiting for the subscription acknowledgment
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection status reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    /// The remote acknowledged the subscription
    Subscribed,
    /// The channel failed, optionally with a reason
    ChannelError(Option<String>),
    /// The transport gave up waiting for the acknowledgment
    TimedOut,
    /// The remote closed the channel
    Closed,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One item delivered on a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Status(TransportStatus),
    Change(ChangeKind),
}

/// An open owner-scoped subscription
#[derive(Debug)]
pub struct FeedSubscription {
    pub id: u64,
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
}

/// Change-notification capability of the remote store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription to changes of rows owned by `owner_id`.
    async fn subscribe(&self, owner_id: OwnerId) -> Result<FeedSubscription>;

    /// Close a subscription. Closing an unknown id is a no-op.
    async fn unsubscribe(&self, subscription_id: u64);
}

/// Realtime connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Subscribing,
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::ChannelError => "channel_error",
            Self::TimedOut => "timed_out",
            Self::Closed => "closed",
        }
    }

    /// Whether data may be stale and the user should refresh manually
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::ChannelError | Self::TimedOut)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State published to observers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: ConnectionState,
    /// User-facing message while degraded
    pub error: Option<String>,
}

impl SyncStatus {
    /// The degradation as a typed error, if any
    #[must_use]
    pub fn as_error(&self) -> Option<WarrantyError> {
        self.error
            .as_ref()
            .map(|message| WarrantyError::RealtimeTransport(message.clone()))
    }
}

struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
    metrics: MetricsCollector,
}

impl StatusPublisher {
    /// Publish a transition; repeated identical states are not re-sent.
    fn transition(&self, state: ConnectionState, error: Option<String>) {
        let next = SyncStatus { state, error };
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            debug!(state = %state, "Realtime state changed");
            self.metrics.record_realtime_transition(state.as_str());
        }
    }
}

/// Handle to the running subscription task.
struct ActiveSubscription {
    owner_id: OwnerId,
    subscription_id: u64,
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the live subscription for the current owner
pub struct RealtimeSyncController {
    feed: Arc<dyn ChangeFeed>,
    store: WarrantyStore,
    publisher: Arc<StatusPublisher>,
    ack_timeout: Duration,
    owner: Option<OwnerId>,
    active: Option<ActiveSubscription>,
}

impl RealtimeSyncController {
    pub fn new(feed: Arc<dyn ChangeFeed>, store: WarrantyStore) -> Self {
        let (tx, _) = watch::channel(SyncStatus::default());
        Self {
            feed,
            store,
            publisher: Arc::new(StatusPublisher {
                tx,
                metrics: MetricsCollector::default(),
            }),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            owner: None,
            active: None,
        }
    }

    #[must_use]
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Current state and message
    pub fn status(&self) -> SyncStatus {
        self.publisher.tx.borrow().clone()
    }

    /// Receiver that sees one update per transition
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.publisher.tx.subscribe()
    }

    /// Owner the controller is following
    pub const fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// Follow `owner`: tear down any previous subscription, then subscribe
    /// for the new owner. `None` means signed out.
    pub async fn set_owner(&mut self, owner: Option<OwnerId>) {
        if owner.is_some() && owner == self.owner && self.is_running() {
            return;
        }

        self.teardown().await;
        self.owner = owner;

        if let Some(owner_id) = owner {
            self.connect(owner_id).await;
        }
    }

    /// Re-subscribe for the current owner after a degraded state.
    pub async fn reconnect(&mut self) {
        if let Some(owner_id) = self.owner {
            self.teardown().await;
            self.connect(owner_id).await;
        }
    }

    /// Close the subscription and reset to idle.
    pub async fn shutdown(&mut self) {
        self.teardown().await;
        self.owner = None;
    }

    fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    async fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop();
            self.feed.unsubscribe(active.subscription_id).await;
            info!(
                owner_id = %active.owner_id,
                subscription_id = active.subscription_id,
                "Realtime subscription removed"
            );
        }
        self.publisher.transition(ConnectionState::Idle, None);
    }

    async fn connect(&mut self, owner_id: OwnerId) {
        self.publisher.transition(ConnectionState::Connecting, None);
        self.publisher.transition(ConnectionState::Subscribing, None);

        let subscription = match self.feed.subscribe(owner_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(owner_id = %owner_id, error = %e, "Failed to subscribe to warranty updates");
                self.publisher.transition(
                    ConnectionState::ChannelError,
                    Some(SUBSCRIBE_ERROR_MESSAGE.to_string()),
                );
                return;
            }
        };

        let live = Arc::new(AtomicBool::new(true));
        let worker = SubscriptionWorker {
            feed: Arc::clone(&self.feed),
            store: self.store.clone(),
            publisher: Arc::clone(&self.publisher),
            live: Arc::clone(&live),
            subscription_id: subscription.id,
            ack_timeout: self.ack_timeout,
        };
        let task = tokio::spawn(worker.run(subscription.events));

        debug!(owner_id = %owner_id, subscription_id = subscription.id, "Realtime subscription opened");
        self.active = Some(ActiveSubscription {
            owner_id,
            subscription_id: subscription.id,
            live,
            task,
        });
    }
}

struct SubscriptionWorker {
    feed: Arc<dyn ChangeFeed>,
    store: WarrantyStore,
    publisher: Arc<StatusPublisher>,
    live: Arc<AtomicBool>,
    subscription_id: u64,
    ack_timeout: Duration,
}

impl SubscriptionWorker {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn publish(&self, state: ConnectionState, error: Option<String>) {
        if self.is_live() {
            self.publisher.transition(state, error);
        }
    }

    async fn run(self, mut events: mpsc::UnboundedReceiver<FeedEvent>) {
        let ack_deadline = tokio::time::sleep(self.ack_timeout);
        tokio::pin!(ack_deadline);
        let mut awaiting_ack = true;
        let mut subscribed = false;

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                () = &mut ack_deadline, if awaiting_ack => {
                    awaiting_ack = false;
                    warn!(subscription_id = self.subscription_id, "Realtime subscription acknowledgment timed out");
                    self.publish(ConnectionState::TimedOut, Some(TIMED_OUT_MESSAGE.to_string()));
                    continue;
                }
            };

            if !self.is_live() {
                break;
            }

            let Some(event) = event else {
                debug!(subscription_id = self.subscription_id, "Realtime feed ended");
                self.publish(ConnectionState::Closed, None);
                break;
            };

            match event {
                FeedEvent::Status(TransportStatus::Subscribed) => {
                    awaiting_ack = false;
                    subscribed = true;
                    info!(subscription_id = self.subscription_id, "Realtime subscription acknowledged");
                    self.publish(ConnectionState::Subscribed, None);
                }
                FeedEvent::Status(TransportStatus::ChannelError(reason)) => {
                    let message = reason.unwrap_or_else(|| CHANNEL_ERROR_MESSAGE.to_string());
                    error!(subscription_id = self.subscription_id, error = %message, "Realtime subscription error");
                    self.publish(ConnectionState::ChannelError, Some(message));
                    self.feed.unsubscribe(self.subscription_id).await;
                    break;
                }
                FeedEvent::Status(TransportStatus::TimedOut) => {
                    awaiting_ack = false;
                    subscribed = false;
                    warn!(subscription_id = self.subscription_id, "Realtime subscription timed out");
                    self.publish(ConnectionState::TimedOut, Some(TIMED_OUT_MESSAGE.to_string()));
                }
                FeedEvent::Status(TransportStatus::Closed) => {
                    self.publish(ConnectionState::Closed, None);
                    break;
                }
                FeedEvent::Change(kind) if subscribed => {
                    debug!(?kind, "Warranty change received, refetching");
                    self.publisher.metrics.record_realtime_refetch();
                    if let Err(e) = self.store.refresh().await {
                        warn!(error = %e, "Refetch after realtime change failed");
                    }
                }
                FeedEvent::Change(kind) => {
                    debug!(?kind, "Ignoring change received before subscription was acknowledged");
                }
            }
        }
    }
}
