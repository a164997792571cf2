//! In-memory warranty collection for the signed-in owner.
//!
//! [`WarrantyStore`] is cheap to clone; clones share the same state. State is
//! kept behind a mutex that is never held across an await, so concurrent
//! refreshes interleave and whichever finishes last wins.

use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dates;
use crate::error::{Result, WarrantyError};
use crate::logging::OperationTimer;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{NewWarranty, OwnerId, StatusFilter, Warranty, WarrantyInput, WarrantyStatus};
use crate::notifications::{ReminderOutcome, ReminderScheduler};
use crate::repository::WarrantyRepository;
use crate::storage::ImageUploader;
use crate::validation::InputValidator;

/// Records passing `filter` on `today`, relative order preserved.
#[must_use]
pub fn filter_by_status(warranties: &[Warranty], filter: StatusFilter, today: NaiveDate) -> Vec<Warranty> {
    if filter == StatusFilter::All {
        return warranties.to_vec();
    }
    warranties
        .iter()
        .filter(|warranty| filter.matches(dates::determine_status(&warranty.due_date, today)))
        .cloned()
        .collect()
}

/// Memoized result of the filtered view
struct FilteredView {
    revision: u64,
    filter: StatusFilter,
    evaluated_on: NaiveDate,
    items: Vec<Warranty>,
}

#[derive(Default)]
struct StoreState {
    owner: Option<OwnerId>,
    warranties: Vec<Warranty>,
    status_filter: StatusFilter,
    in_flight: usize,
    last_error: Option<WarrantyError>,
    /// Bumped on every change to `warranties`
    revision: u64,
    view: Option<FilteredView>,
}

impl StoreState {
    fn replace_warranties(&mut self, warranties: Vec<Warranty>) {
        self.warranties = warranties;
        self.revision += 1;
    }

    /// Add `warranty`, or replace the row with the same id when a refetch
    /// already brought it in.
    fn upsert(&mut self, warranty: Warranty) {
        match self.warranties.iter_mut().find(|row| row.id == warranty.id) {
            Some(row) => *row = warranty,
            None => self.warranties.push(warranty),
        }
        self.revision += 1;
    }
}

struct StoreInner {
    repository: Arc<dyn WarrantyRepository>,
    uploader: ImageUploader,
    reminders: ReminderScheduler,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
    state: Mutex<StoreState>,
}

/// Marks the store as loading while alive
struct LoadingGuard<'a> {
    store: &'a WarrantyStore,
}

impl<'a> LoadingGuard<'a> {
    fn enter(store: &'a WarrantyStore) -> Self {
        store.state().in_flight += 1;
        Self { store }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Warranty collection, filter and create workflow for one owner at a time
#[derive(Clone)]
pub struct WarrantyStore {
    inner: Arc<StoreInner>,
}

impl WarrantyStore {
    pub fn new(
        repository: Arc<dyn WarrantyRepository>,
        uploader: ImageUploader,
        reminders: ReminderScheduler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                repository,
                uploader,
                reminders,
                clock,
                metrics: MetricsCollector::default(),
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to another owner (or none). The collection is cleared so no
    /// record of the previous owner stays visible.
    pub fn set_owner(&self, owner: Option<OwnerId>) {
        let mut state = self.state();
        if state.owner == owner {
            return;
        }
        debug!(owner_id = ?owner, "Warranty store owner changed");
        state.owner = owner;
        state.replace_warranties(Vec::new());
        state.last_error = None;
        state.view = None;
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.state().owner
    }

    /// Reload the full collection for the current owner.
    ///
    /// On failure the previous collection stays in place and the error is
    /// kept in [`last_error`](Self::last_error). Without an owner this does
    /// nothing.
    pub async fn refresh(&self) -> Result<()> {
        let Some(owner) = self.owner() else {
            debug!("Refresh skipped, no owner");
            return Ok(());
        };

        let _loading = LoadingGuard::enter(self);
        let timer = MetricsTimer::new(self.inner.metrics, "list_for_owner");
        let result = self.inner.repository.list_for_owner(owner).await;
        timer.finish(result.is_ok());

        let mut state = self.state();
        if state.owner != Some(owner) {
            debug!(owner_id = %owner, "Discarding refresh result for previous owner");
            return Ok(());
        }

        match result {
            Ok(warranties) => {
                info!(owner_id = %owner, count = warranties.len(), "Warranties loaded");
                self.inner.metrics.record_loaded(warranties.len());
                state.replace_warranties(warranties);
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                error!(owner_id = %owner, error = %e, "Failed to load warranties");
                self.inner.metrics.record_error(e.kind(), "list_for_owner");
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Create a warranty: compute the due date, upload the optional image,
    /// insert the record, schedule its reminder and remember the handle.
    ///
    /// Image and insert failures abort with nothing inserted. A failed
    /// reminder is recorded in `last_error` and the record is still
    /// returned. A failure to persist the reminder handle returns the error,
    /// but the inserted record stays (without handle) in the collection.
    ///
    /// Calls are not serialized; callers wanting append order should not
    /// start a second one while [`loading`](Self::loading) is true.
    pub async fn create_warranty(&self, input: WarrantyInput) -> Result<Warranty> {
        let owner = self.owner().ok_or(WarrantyError::NotAuthenticated)?;

        let _loading = LoadingGuard::enter(self);
        self.state().last_error = None;

        let timer = OperationTimer::new("create_warranty");
        let result = self.run_create(owner, input).await;
        timer.finish();
        result
    }

    async fn run_create(&self, owner: OwnerId, input: WarrantyInput) -> Result<Warranty> {
        InputValidator::validate_warranty_input(&input).map_err(|e| self.fail(e, "validate"))?;

        let exchange_date = dates::parse_calendar_date(&input.exchange_date)
            .map_err(|e| self.fail(e, "due_date"))?;
        let due_date = dates::due_date_from(exchange_date, i64::from(input.warranty_days))
            .map_err(|e| self.fail(e, "due_date"))?;

        let image_url = match input.image_uri.as_deref() {
            Some(reference) => Some(
                self.inner
                    .uploader
                    .upload(reference, owner)
                    .await
                    .map_err(|e| self.fail(e, "upload_image"))?,
            ),
            None => None,
        };
        let with_image = image_url.is_some();

        let fields = NewWarranty {
            owner_id: owner,
            client_name: input.client_name,
            client_phone: input.client_phone,
            exchange_date,
            warranty_days: input.warranty_days,
            due_date,
            notes: input.notes.filter(|notes| !notes.trim().is_empty()),
            image_url,
        };

        let timer = MetricsTimer::new(self.inner.metrics, "insert");
        let inserted = self.inner.repository.insert(fields).await;
        timer.finish(inserted.is_ok());
        let created = inserted.map_err(|e| self.fail(e, "insert"))?;
        info!(warranty_id = %created.id, owner_id = %owner, due_date = %created.due_date, "Warranty created");

        let (warranty, persist_error) = self.attach_reminder(created).await;

        {
            let mut state = self.state();
            if state.owner == Some(owner) {
                state.upsert(warranty.clone());
            }
        }
        self.inner.metrics.record_created(with_image);

        match persist_error {
            Some(e) => Err(e),
            None => Ok(warranty),
        }
    }

    /// Best-effort reminder step. Returns the final record and, when the
    /// handle could not be stored, the error to surface.
    async fn attach_reminder(&self, created: Warranty) -> (Warranty, Option<WarrantyError>) {
        let handle = match self.inner.reminders.schedule_expiry(&created).await {
            Ok(ReminderOutcome::Scheduled(handle)) => handle,
            Ok(ReminderOutcome::Skipped) => return (created, None),
            Err(e) => {
                warn!(warranty_id = %created.id, error = %e, "Reminder not scheduled");
                self.fail(e, "schedule_reminder");
                return (created, None);
            }
        };

        let timer = MetricsTimer::new(self.inner.metrics, "update_notification_id");
        let updated = self
            .inner
            .repository
            .update_notification_id(created.id, handle.clone())
            .await;
        timer.finish(updated.is_ok());

        match updated {
            Ok(updated) => (updated, None),
            Err(e) => {
                error!(
                    warranty_id = %created.id,
                    notification_id = %handle,
                    error = %e,
                    "Failed to persist notification identifier for warranty"
                );
                let e = self.fail(e, "update_notification_id");
                (created, Some(e))
            }
        }
    }

    /// Record `error` as the last error and hand it back.
    fn fail(&self, error: WarrantyError, operation: &str) -> WarrantyError {
        self.inner.metrics.record_error(error.kind(), operation);
        self.state().last_error = Some(error.clone());
        error
    }

    /// Full collection, in load order
    pub fn warranties(&self) -> Vec<Warranty> {
        self.state().warranties.clone()
    }

    /// Collection narrowed by the current status filter.
    ///
    /// Memoized on the collection revision, the filter and the current day;
    /// any of those changing forces a recompute.
    pub fn filtered_warranties(&self) -> Vec<Warranty> {
        let today = self.inner.clock.today();
        let mut state = self.state();

        if let Some(view) = &state.view {
            if view.revision == state.revision
                && view.filter == state.status_filter
                && view.evaluated_on == today
            {
                return view.items.clone();
            }
        }

        let items = filter_by_status(&state.warranties, state.status_filter, today);
        state.view = Some(FilteredView {
            revision: state.revision,
            filter: state.status_filter,
            evaluated_on: today,
            items: items.clone(),
        });
        items
    }

    /// Expiring and expired records, for the alerts list
    pub fn critical_warranties(&self) -> Vec<Warranty> {
        let today = self.inner.clock.today();
        self.state()
            .warranties
            .iter()
            .filter(|warranty| dates::determine_status(&warranty.due_date, today).is_critical())
            .cloned()
            .collect()
    }

    pub fn find(&self, id: Uuid) -> Option<Warranty> {
        self.state().warranties.iter().find(|warranty| warranty.id == id).cloned()
    }

    /// Status of a record as of now
    pub fn status_of(&self, warranty: &Warranty) -> WarrantyStatus {
        dates::determine_status(&warranty.due_date, self.inner.clock.today())
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.state().status_filter
    }

    pub fn set_status_filter(&self, filter: StatusFilter) {
        self.state().status_filter = filter;
    }

    /// Whether a refresh or create is in flight
    pub fn loading(&self) -> bool {
        self.state().in_flight > 0
    }

    pub fn last_error(&self) -> Option<WarrantyError> {
        self.state().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.state().last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notifications::{MockLocalNotifier, ReminderRequest};
    use crate::repository::MockWarrantyRepository;
    use crate::storage::{MockImageSource, MockObjectStorage};
    use chrono::Utc;

    fn owner() -> OwnerId {
        Uuid::parse_str("0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00").expect("uuid")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("date")
    }

    fn row_from(fields: &NewWarranty) -> Warranty {
        Warranty {
            id: Uuid::new_v4(),
            owner_id: fields.owner_id,
            client_name: fields.client_name.clone(),
            client_phone: fields.client_phone.clone(),
            exchange_date: fields.exchange_date,
            warranty_days: fields.warranty_days,
            due_date: fields.due_date,
            notes: fields.notes.clone(),
            image_url: fields.image_url.clone(),
            notification_id: None,
            created_at: Utc::now(),
        }
    }

    fn input(days: i32) -> WarrantyInput {
        WarrantyInput {
            client_name: "Maria".into(),
            client_phone: "11912345678".into(),
            exchange_date: "2024-06-01".into(),
            warranty_days: days,
            notes: Some("Troca de bateria".into()),
            image_uri: None,
        }
    }

    fn store_with(repository: MockWarrantyRepository, notifier: MockLocalNotifier) -> WarrantyStore {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_noon(today()));
        let uploader = ImageUploader::new(
            Arc::new(MockObjectStorage::new()),
            Arc::new(MockImageSource::new()),
        );
        let reminders = ReminderScheduler::new(Arc::new(notifier), Arc::clone(&clock));
        let store = WarrantyStore::new(Arc::new(repository), uploader, reminders, clock);
        store.set_owner(Some(owner()));
        store
    }

    #[tokio::test]
    async fn test_create_persists_notification_handle() {
        let mut repository = MockWarrantyRepository::new();
        repository
            .expect_insert()
            .times(1)
            .returning(|fields| Ok(row_from(&fields)));
        repository
            .expect_update_notification_id()
            .withf(|_, handle| handle == "notif-7")
            .times(1)
            .returning(|id, handle| {
                let mut row = row_from(&NewWarranty {
                    owner_id: owner(),
                    client_name: "Maria".into(),
                    client_phone: "11912345678".into(),
                    exchange_date: today(),
                    warranty_days: 90,
                    due_date: dates::due_date_from(today(), 90).expect("due"),
                    notes: None,
                    image_url: None,
                });
                row.id = id;
                row.notification_id = Some(handle);
                Ok(row)
            });
        let mut notifier = MockLocalNotifier::new();
        notifier
            .expect_schedule()
            .withf(|request: &ReminderRequest| request.body.starts_with("Maria vence em"))
            .returning(|_| Ok("notif-7".into()));

        let store = store_with(repository, notifier);
        let created = store.create_warranty(input(90)).await.expect("created");

        assert_eq!(created.notification_id.as_deref(), Some("notif-7"));
        assert_eq!(store.warranties(), vec![created]);
        assert!(store.last_error().is_none());
        assert!(!store.loading());
    }

    #[tokio::test]
    async fn test_insert_failure_aborts_before_reminder() {
        let mut repository = MockWarrantyRepository::new();
        repository
            .expect_insert()
            .returning(|_| Err(WarrantyError::Store("duplicate key".into())));
        repository.expect_update_notification_id().never();
        let mut notifier = MockLocalNotifier::new();
        notifier.expect_schedule().never();

        let store = store_with(repository, notifier);
        let err = store.create_warranty(input(90)).await.expect_err("fails");

        assert!(matches!(err, WarrantyError::Store(_)));
        assert_eq!(store.last_error(), Some(err));
        assert!(store.warranties().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_record() {
        let mut repository = MockWarrantyRepository::new();
        repository.expect_insert().returning(|fields| Ok(row_from(&fields)));
        repository
            .expect_update_notification_id()
            .returning(|_, _| Err(WarrantyError::Store("row vanished".into())));
        let mut notifier = MockLocalNotifier::new();
        notifier.expect_schedule().returning(|_| Ok("notif-1".into()));

        let store = store_with(repository, notifier);
        let err = store.create_warranty(input(90)).await.expect_err("surfaced");

        assert!(matches!(err, WarrantyError::Store(_)));
        let kept = store.warranties();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].notification_id.is_none());
    }

    #[tokio::test]
    async fn test_reminder_failure_is_not_fatal() {
        let mut repository = MockWarrantyRepository::new();
        repository.expect_insert().returning(|fields| Ok(row_from(&fields)));
        repository.expect_update_notification_id().never();
        let mut notifier = MockLocalNotifier::new();
        notifier
            .expect_schedule()
            .returning(|_| Err(WarrantyError::Notification("permission denied".into())));

        let store = store_with(repository, notifier);
        let created = store.create_warranty(input(90)).await.expect("created anyway");

        assert!(created.notification_id.is_none());
        assert!(matches!(store.last_error(), Some(WarrantyError::Notification(_))));
        assert_eq!(store.warranties().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_remote_calls() {
        let mut repository = MockWarrantyRepository::new();
        repository.expect_insert().never();
        let store = store_with(repository, MockLocalNotifier::new());

        let mut bad = input(90);
        bad.client_phone = "  ".into();
        let err = store.create_warranty(bad).await.expect_err("invalid");
        assert!(matches!(err, WarrantyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_collection() {
        let mut repository = MockWarrantyRepository::new();
        let mut calls = 0;
        repository.expect_list_for_owner().times(2).returning(move |owner_id| {
            calls += 1;
            if calls == 1 {
                Ok(vec![row_from(&NewWarranty {
                    owner_id,
                    client_name: "Ana".into(),
                    client_phone: "1".into(),
                    exchange_date: today(),
                    warranty_days: 30,
                    due_date: dates::due_date_from(today(), 30).expect("due"),
                    notes: None,
                    image_url: None,
                })])
            } else {
                Err(WarrantyError::Store("offline".into()))
            }
        });

        let store = store_with(repository, MockLocalNotifier::new());
        store.refresh().await.expect("first load");
        assert!(store.refresh().await.is_err());

        assert_eq!(store.warranties().len(), 1);
        assert!(matches!(store.last_error(), Some(WarrantyError::Store(_))));
    }

    #[tokio::test]
    async fn test_create_without_owner() {
        let store = store_with(MockWarrantyRepository::new(), MockLocalNotifier::new());
        store.set_owner(None);
        let err = store.create_warranty(input(90)).await.expect_err("signed out");
        assert_eq!(err, WarrantyError::NotAuthenticated);
    }
}
