//! Data models for warranty records
//!
//! This module contains the record shape shared with the remote store, the
//! input accepted by the create workflow, and the derived status types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an authenticated user.
pub type OwnerId = Uuid;

/// A tracked warranty, one row of the `warranties` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warranty {
    /// Assigned by the remote store on creation
    pub id: Uuid,
    /// Owner who created the record; all queries are scoped by it
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    /// Client's display name
    pub client_name: String,
    /// Client's phone number
    pub client_phone: String,
    /// Calendar day the item was exchanged or repaired
    pub exchange_date: NaiveDate,
    /// Days of coverage from `exchange_date`
    pub warranty_days: i32,
    /// `exchange_date + warranty_days`, fixed at creation
    pub due_date: DateTime<Utc>,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Public URL of the uploaded photo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Handle of the scheduled reminder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    /// Server-assigned creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Fields sent to the remote store on insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarranty {
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub client_name: String,
    pub client_phone: String,
    pub exchange_date: NaiveDate,
    pub warranty_days: i32,
    pub due_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Raw input of the create workflow, as collected by the UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarrantyInput {
    /// Client's display name
    pub client_name: String,
    /// Client's phone number
    pub client_phone: String,
    /// Exchange date, `YYYY-MM-DD` or any other date-like text
    pub exchange_date: String,
    /// Days of coverage
    pub warranty_days: i32,
    /// Free-text notes
    pub notes: Option<String>,
    /// Local reference to a photo to upload
    pub image_uri: Option<String>,
}

/// Derived warranty status, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarrantyStatus {
    /// Due more than a week from today
    Active,
    /// Due today or within the next seven days
    Expiring,
    /// Due date already passed
    Expired,
}

impl WarrantyStatus {
    /// Localized label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Active => "Ativa",
            Self::Expiring => "Vencendo",
            Self::Expired => "Vencida",
        }
    }

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
        }
    }

    /// Whether the record needs attention (expiring or expired)
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Expiring | Self::Expired)
    }
}

impl fmt::Display for WarrantyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter applied to the in-memory collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    /// No filtering
    #[default]
    All,
    Active,
    Expiring,
    Expired,
}

impl StatusFilter {
    /// Every filter option, in display order
    pub const OPTIONS: [Self; 4] = [Self::All, Self::Active, Self::Expiring, Self::Expired];

    /// Whether a record with `status` passes this filter
    #[must_use]
    pub const fn matches(&self, status: WarrantyStatus) -> bool {
        match self {
            Self::All => true,
            Self::Active => matches!(status, WarrantyStatus::Active),
            Self::Expiring => matches!(status, WarrantyStatus::Expiring),
            Self::Expired => matches!(status, WarrantyStatus::Expired),
        }
    }

    /// Localized label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::All => "Todas",
            Self::Active => "Ativas",
            Self::Expiring => "Vencendo",
            Self::Expired => "Vencidas",
        }
    }
}

impl From<WarrantyStatus> for StatusFilter {
    fn from(status: WarrantyStatus) -> Self {
        match status {
            WarrantyStatus::Active => Self::Active,
            WarrantyStatus::Expiring => Self::Expiring,
            WarrantyStatus::Expired => Self::Expired,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "todas" => Ok(Self::All),
            "active" | "ativa" | "ativas" => Ok(Self::Active),
            "expiring" | "vencendo" => Ok(Self::Expiring),
            "expired" | "vencida" | "vencidas" => Ok(Self::Expired),
            other => Err(format!(
                "Unknown status filter: {other}. Must be one of: all, active, expiring, expired"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all_matches_everything() {
        for status in [WarrantyStatus::Active, WarrantyStatus::Expiring, WarrantyStatus::Expired] {
            assert!(StatusFilter::All.matches(status));
            assert!(StatusFilter::from(status).matches(status));
        }
        assert!(!StatusFilter::Active.matches(WarrantyStatus::Expired));
    }

    #[test]
    fn test_filter_parses_localized_names() {
        assert_eq!("todas".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert_eq!("Vencendo".parse::<StatusFilter>(), Ok(StatusFilter::Expiring));
        assert!("soon".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn test_warranty_uses_user_id_column() {
        let json = serde_json::json!({
            "id": "6c1f1d0e-8a5b-4a53-9a6b-1f5d8a9f3c11",
            "user_id": "0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00",
            "client_name": "Ana",
            "client_phone": "11999990000",
            "exchange_date": "2024-06-01",
            "warranty_days": 90,
            "due_date": "2024-08-30T03:00:00+00:00",
            "created_at": "2024-06-01T15:04:05.123456+00:00"
        });
        let warranty: Warranty = serde_json::from_value(json).expect("valid row");
        assert_eq!(warranty.client_name, "Ana");
        assert!(warranty.notification_id.is_none());
        let back = serde_json::to_value(&warranty).expect("serializes");
        assert!(back.get("user_id").is_some());
        assert!(back.get("notes").is_none());
    }
}
