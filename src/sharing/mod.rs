//! Selective sharing of reports.
//!
//! Owners grant individual users read access to a report. Every mutating
//! call checks ownership itself, and mutations on one report are serialized
//! so concurrent reconciles cannot lose each other's updates.

use crate::error::{NewsLensError, Result};
use crate::models::{Report, ReportId, User, UserId};
use crate::store::RecordStore;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Grants applied by a [`SharingService::reconcile`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: BTreeSet<UserId>,
    pub removed: BTreeSet<UserId>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Grants, revokes and checks viewing rights on reports.
pub struct SharingService {
    store: Arc<dyn RecordStore>,
    writers: Mutex<HashMap<ReportId, Arc<Mutex<()>>>>,
}

impl SharingService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// The single-writer lock for one existing report.
    fn writer(&self, report: ReportId) -> Result<Arc<Mutex<()>>> {
        if self.store.report(report).is_none() {
            return Err(NewsLensError::report_not_found(report));
        }
        Ok(self.writers.lock().entry(report).or_default().clone())
    }

    /// Drop the writer lock of a deleted report.
    pub fn forget(&self, report: ReportId) {
        self.writers.lock().remove(&report);
    }

    /// Load a report and check that `acting` owns it.
    fn owned_report(&self, report: ReportId, acting: UserId) -> Result<Report> {
        let report = self
            .store
            .report(report)
            .ok_or_else(|| NewsLensError::report_not_found(report))?;

        if report.owner != acting {
            return Err(NewsLensError::Permission(format!(
                "only the owner can change sharing of {}",
                report.id
            )));
        }

        Ok(report)
    }

    fn check_recipient(&self, report: &Report, recipient: UserId) -> Result<()> {
        if recipient == report.owner {
            return Err(NewsLensError::Validation(
                "a report cannot be shared with its owner".to_string(),
            ));
        }
        if self.store.user(recipient).is_none() {
            return Err(NewsLensError::user_not_found(recipient));
        }
        Ok(())
    }

    /// Let `recipient` view `report`. Granting twice is a no-op.
    pub fn grant(&self, report: ReportId, acting: UserId, recipient: UserId) -> Result<()> {
        let writer = self.writer(report)?;
        let _guard = writer.lock();

        let report = self.owned_report(report, acting)?;
        self.check_recipient(&report, recipient)?;

        self.store
            .apply_grants(report.id, &BTreeSet::from([recipient]), &BTreeSet::new())?;

        info!("Shared {} with {}", report.id, recipient);
        Ok(())
    }

    /// Withdraw `recipient`'s access. Revoking a missing grant is a no-op.
    pub fn revoke(&self, report: ReportId, acting: UserId, recipient: UserId) -> Result<()> {
        let writer = self.writer(report)?;
        let _guard = writer.lock();

        let report = self.owned_report(report, acting)?;

        self.store
            .apply_grants(report.id, &BTreeSet::new(), &BTreeSet::from([recipient]))?;

        info!("Revoked {} from {}", report.id, recipient);
        Ok(())
    }

    /// Make the recipient set of `report` exactly `desired`.
    ///
    /// Additions and removals are applied together or not at all.
    pub fn reconcile(
        &self,
        report: ReportId,
        acting: UserId,
        desired: &BTreeSet<UserId>,
    ) -> Result<ReconcileOutcome> {
        let writer = self.writer(report)?;
        let _guard = writer.lock();

        let report = self.owned_report(report, acting)?;
        let current = self.store.recipients(report.id);

        let outcome = ReconcileOutcome {
            added: desired.difference(&current).copied().collect(),
            removed: current.difference(desired).copied().collect(),
        };

        for &recipient in &outcome.added {
            self.check_recipient(&report, recipient)?;
        }

        if outcome.is_noop() {
            debug!("Sharing of {} already up to date", report.id);
            return Ok(outcome);
        }

        self.store
            .apply_grants(report.id, &outcome.added, &outcome.removed)?;

        info!(
            "Reconciled sharing of {}: +{} -{}",
            report.id,
            outcome.added.len(),
            outcome.removed.len()
        );
        Ok(outcome)
    }

    /// Whether `user` may view `report`.
    pub fn can_view(&self, report: &Report, user: UserId) -> bool {
        report.owner == user || self.store.has_grant(report.id, user)
    }

    /// Users a report is shared with, ordered by handle.
    pub fn list_recipients(&self, report: ReportId) -> Result<Vec<User>> {
        if self.store.report(report).is_none() {
            return Err(NewsLensError::report_not_found(report));
        }

        let mut users: Vec<User> = self
            .store
            .recipients(report)
            .into_iter()
            .filter_map(|id| self.store.user(id))
            .collect();
        users.sort_by(|a, b| a.handle.cmp(&b.handle));

        Ok(users)
    }

    /// Reports shared with `user`, newest first.
    pub fn list_shared_with(&self, user: UserId) -> Result<Vec<Report>> {
        if self.store.user(user).is_none() {
            return Err(NewsLensError::user_not_found(user));
        }
        Ok(self.store.reports_shared_with(user))
    }
}
