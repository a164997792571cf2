//! Expiry reminders.
//!
//! A reminder fires two days before the due date. When that instant is
//! already behind us, scheduling is skipped rather than treated as failure.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dates;
use crate::error::{Result, WarrantyError};
use crate::metrics::MetricsCollector;
use crate::models::Warranty;

/// How many days before the due date the reminder fires
pub const REMINDER_LEAD_DAYS: i64 = 2;

/// Title shown on every expiry reminder
pub const REMINDER_TITLE: &str = "Garantia prestes a vencer";

/// Content and timing of a reminder to hand to the notification service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub title: String,
    pub body: String,
    /// Record the reminder refers to, delivered as payload
    pub warranty_id: Uuid,
    pub trigger_at: DateTime<Local>,
}

/// Notification permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// The device's local notification service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// Schedule `request` and return the handle the service allocated.
    async fn schedule(&self, request: ReminderRequest) -> Result<String>;

    async fn permission_status(&self) -> Result<PermissionStatus>;

    async fn request_permission(&self) -> Result<PermissionStatus>;
}

/// Outcome of a scheduling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Reminder scheduled under this handle
    Scheduled(String),
    /// Trigger instant was not in the future
    Skipped,
}

impl ReminderOutcome {
    /// Handle of a scheduled reminder
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        match self {
            Self::Scheduled(handle) => Some(handle),
            Self::Skipped => None,
        }
    }
}

/// Builds and schedules expiry reminders
#[derive(Clone)]
pub struct ReminderScheduler {
    notifier: Arc<dyn LocalNotifier>,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn LocalNotifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            notifier,
            clock,
            metrics: MetricsCollector::default(),
        }
    }

    /// Underlying notification service
    pub fn notifier(&self) -> &Arc<dyn LocalNotifier> {
        &self.notifier
    }

    /// Schedule the expiry reminder for `warranty`.
    pub async fn schedule_expiry(&self, warranty: &Warranty) -> Result<ReminderOutcome> {
        let request = build_request(warranty)?;
        let now = self.clock.now();

        if request.trigger_at <= now {
            warn!(
                warranty_id = %warranty.id,
                due_date = %warranty.due_date,
                trigger_at = %request.trigger_at,
                "Skipping notification scheduling for past trigger date"
            );
            self.metrics.record_reminder("skipped");
            return Ok(ReminderOutcome::Skipped);
        }

        let trigger_at = request.trigger_at;
        match self.notifier.schedule(request).await {
            Ok(handle) => {
                info!(warranty_id = %warranty.id, %trigger_at, handle = %handle, "Expiry reminder scheduled");
                self.metrics.record_reminder("scheduled");
                Ok(ReminderOutcome::Scheduled(handle))
            }
            Err(e) => {
                self.metrics.record_reminder("failed");
                Err(match e {
                    WarrantyError::Notification(_) => e,
                    other => WarrantyError::Notification(other.to_string()),
                })
            }
        }
    }
}

/// Instant the reminder for a record should fire.
pub fn trigger_instant(warranty: &Warranty) -> Result<DateTime<Local>> {
    let due_day = dates::local_day(&warranty.due_date);
    let trigger_day = dates::shift_days(due_day, -REMINDER_LEAD_DAYS)?;
    dates::start_of_day(trigger_day)
}

/// Localized reminder for a record.
pub fn build_request(warranty: &Warranty) -> Result<ReminderRequest> {
    Ok(ReminderRequest {
        title: REMINDER_TITLE.to_string(),
        body: format!(
            "{} vence em {}",
            warranty.client_name,
            dates::format_date(&warranty.due_date)
        ),
        warranty_id: warranty.id,
        trigger_at: trigger_instant(warranty)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{NaiveDate, Utc};

    fn warranty_due(due: &str) -> Warranty {
        Warranty {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            client_name: "Carlos".into(),
            client_phone: "11988887777".into(),
            exchange_date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"),
            warranty_days: 90,
            due_date: dates::calculate_due_date(due, 0).expect("due"),
            notes: None,
            image_url: None,
            notification_id: None,
            created_at: Utc::now(),
        }
    }

    fn clock_on(y: i32, m: u32, d: u32) -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_noon(NaiveDate::from_ymd_opt(y, m, d).expect("date")))
    }

    #[test]
    fn test_request_content() {
        let request = build_request(&warranty_due("2024-08-30")).expect("request");
        assert_eq!(request.title, "Garantia prestes a vencer");
        assert_eq!(request.body, "Carlos vence em 30/08/2024");
        assert_eq!(
            request.trigger_at.date_naive(),
            NaiveDate::from_ymd_opt(2024, 8, 28).expect("date")
        );
    }

    #[tokio::test]
    async fn test_schedules_future_reminder() {
        let mut notifier = MockLocalNotifier::new();
        notifier
            .expect_schedule()
            .times(1)
            .returning(|_| Ok("notif-1".to_string()));
        let scheduler = ReminderScheduler::new(Arc::new(notifier), clock_on(2024, 8, 1));

        let outcome = scheduler.schedule_expiry(&warranty_due("2024-08-30")).await.expect("ok");
        assert_eq!(outcome.handle(), Some("notif-1"));
    }

    #[tokio::test]
    async fn test_skips_past_trigger() {
        let mut notifier = MockLocalNotifier::new();
        notifier.expect_schedule().never();
        let scheduler = ReminderScheduler::new(Arc::new(notifier), clock_on(2024, 8, 29));

        let outcome = scheduler.schedule_expiry(&warranty_due("2024-08-30")).await.expect("ok");
        assert_eq!(outcome, ReminderOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_service_failure_is_notification_error() {
        let mut notifier = MockLocalNotifier::new();
        notifier
            .expect_schedule()
            .returning(|_| Err(WarrantyError::Store("daemon gone".into())));
        let scheduler = ReminderScheduler::new(Arc::new(notifier), clock_on(2024, 8, 1));

        let err = scheduler.schedule_expiry(&warranty_due("2024-08-30")).await.expect_err("fails");
        assert!(matches!(err, WarrantyError::Notification(_)));
    }
}
