//! Record store for users, reports, items and share grants.
//!
//! The store is the only shared mutable state. It is handed to the sharing
//! service and the orchestrator explicitly; nothing reaches it globally.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{Item, ItemId, Report, ReportId, User, UserId};
use std::collections::BTreeSet;

/// Durable storage with cascading deletes.
///
/// Every mutating method is atomic: it either applies completely or leaves
/// the store untouched.
pub trait RecordStore: Send + Sync {
    /// Register a user. Handles are unique.
    fn create_user(&self, handle: &str) -> Result<User, StoreError>;

    fn user(&self, id: UserId) -> Option<User>;

    fn user_by_handle(&self, handle: &str) -> Option<User>;

    /// All users ordered by handle.
    fn users(&self) -> Vec<User>;

    /// Delete a user together with the reports they own, those reports'
    /// items and grants, and every grant naming them as recipient.
    fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    fn next_report_id(&self) -> ReportId;

    fn next_item_id(&self) -> ItemId;

    /// Persist a report and its items as one unit.
    fn commit_report(&self, report: Report, items: Vec<Item>) -> Result<(), StoreError>;

    fn report(&self, id: ReportId) -> Option<Report>;

    /// Items of a report ordered by block position.
    fn items(&self, report: ReportId) -> Vec<Item>;

    /// Reports owned by `owner`, newest first.
    fn reports_owned_by(&self, owner: UserId) -> Vec<Report>;

    /// Delete a report together with its items and grants.
    fn delete_report(&self, id: ReportId) -> Result<(), StoreError>;

    fn recipients(&self, report: ReportId) -> BTreeSet<UserId>;

    fn has_grant(&self, report: ReportId, recipient: UserId) -> bool;

    /// Reports granted to `user` (never ones they own), newest first.
    fn reports_shared_with(&self, user: UserId) -> Vec<Report>;

    /// Add and remove grants on one report in a single step.
    ///
    /// Fails without changing anything if the report or any added recipient
    /// is unknown, or if an added recipient is the report owner. Adding an
    /// existing grant or removing a missing one is not an error.
    fn apply_grants(
        &self,
        report: ReportId,
        add: &BTreeSet<UserId>,
        remove: &BTreeSet<UserId>,
    ) -> Result<(), StoreError>;
}
