//! Warranty Watch - warranty lifecycle and live sync
//!
//! Core of a watch-repair shop's warranty tracker: each record is a
//! customer's repair whose warranty expires a number of days after the
//! exchange date.
//!
//! # Features
//!
//! - Due-date and status calculation on local calendar days
//! - Create workflow with optional photo upload and an expiry reminder
//! - Owner-scoped collection with a memoized status filter
//! - Live refetch on remote changes through a realtime subscription
//! - Supabase REST/Storage client and in-process collaborators

/// Wall-clock seam
pub mod clock;
/// Configuration management
pub mod config;
/// Application context and auth following
pub mod context;
/// Due-date and status calculators
pub mod dates;
/// Error taxonomy
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// In-process collaborators
pub mod memory;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Expiry reminders
pub mod notifications;
/// Realtime sync controller
pub mod realtime;
/// Repository pattern for data access
pub mod repository;
/// Image upload adapter
pub mod storage;
/// Warranty store
pub mod store;
/// Remote store and object storage over HTTP
pub mod supabase;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use context::{AppContext, AuthState, Collaborators};
pub use error::{Result, WarrantyError};
pub use models::{NewWarranty, OwnerId, StatusFilter, Warranty, WarrantyInput, WarrantyStatus};
pub use realtime::{ConnectionState, RealtimeSyncController, SyncStatus};
pub use store::WarrantyStore;
