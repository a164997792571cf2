use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewWarranty, OwnerId, Warranty};

/// Access to the remote `warranties` table.
///
/// Implementations never retry; callers decide what a failure means.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WarrantyRepository: Send + Sync {
    /// Every record owned by `owner_id`, ascending by due date. An owner
    /// without records gets an empty vector, not an error.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Warranty>>;

    /// Insert a record; the store assigns `id` and `created_at`.
    async fn insert(&self, fields: NewWarranty) -> Result<Warranty>;

    /// Attach a reminder handle to an existing record.
    async fn update_notification_id(&self, id: Uuid, notification_id: String) -> Result<Warranty>;
}
