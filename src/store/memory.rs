//! In-process record store with an optional JSON snapshot file.
//!
//! A file-backed store holds an exclusive advisory lock on `<snapshot>.lock`
//! from [`MemoryStore::open`] until it is dropped, so only one process at a
//! time can load, mutate and save a given snapshot.

use crate::error::StoreError;
use crate::models::{Item, ItemId, Report, ReportId, ShareGrant, User, UserId};
use crate::store::RecordStore;
use chrono::Utc;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Tables {
    next_user: u64,
    next_report: u64,
    next_item: u64,
    users: BTreeMap<UserId, User>,
    reports: BTreeMap<ReportId, Report>,
    items: BTreeMap<ReportId, Vec<Item>>,
    grants: BTreeSet<ShareGrant>,
}

/// On-disk form of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    next_user: u64,
    #[serde(default)]
    next_report: u64,
    #[serde(default)]
    next_item: u64,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    reports: Vec<Report>,
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    grants: Vec<ShareGrant>,
}

impl From<Snapshot> for Tables {
    fn from(snapshot: Snapshot) -> Self {
        let mut tables = Tables {
            next_user: snapshot.next_user,
            next_report: snapshot.next_report,
            next_item: snapshot.next_item,
            ..Tables::default()
        };

        for user in snapshot.users {
            tables.next_user = tables.next_user.max(user.id.0);
            tables.users.insert(user.id, user);
        }
        for report in snapshot.reports {
            tables.next_report = tables.next_report.max(report.id.0);
            tables.reports.insert(report.id, report);
        }
        for item in snapshot.items {
            tables.next_item = tables.next_item.max(item.id.0);
            tables.items.entry(item.report_id).or_default().push(item);
        }
        for items in tables.items.values_mut() {
            items.sort_by_key(|i| i.position);
        }
        for grant in snapshot.grants {
            if tables.grant_is_valid(&grant) {
                tables.grants.insert(grant);
            } else {
                warn!(
                    "Dropping invalid grant for {} on {}",
                    grant.recipient, grant.report_id
                );
            }
        }

        tables
    }
}

impl From<&Tables> for Snapshot {
    fn from(tables: &Tables) -> Self {
        Snapshot {
            next_user: tables.next_user,
            next_report: tables.next_report,
            next_item: tables.next_item,
            users: tables.users.values().cloned().collect(),
            reports: tables.reports.values().cloned().collect(),
            items: tables.items.values().flatten().cloned().collect(),
            grants: tables.grants.iter().copied().collect(),
        }
    }
}

impl Tables {
    /// Report and recipient exist, and the recipient is not the owner.
    fn grant_is_valid(&self, grant: &ShareGrant) -> bool {
        match self.reports.get(&grant.report_id) {
            Some(report) => {
                report.owner != grant.recipient && self.users.contains_key(&grant.recipient)
            }
            None => false,
        }
    }

    fn grants_on(&self, report: ReportId) -> impl Iterator<Item = &ShareGrant> {
        let start = ShareGrant {
            report_id: report,
            recipient: UserId(u64::MIN),
        };
        let end = ShareGrant {
            report_id: report,
            recipient: UserId(u64::MAX),
        };
        self.grants.range(start..=end)
    }

    fn remove_report(&mut self, id: ReportId) {
        self.reports.remove(&id);
        self.items.remove(&id);
        self.grants.retain(|g| g.report_id != id);
    }
}

fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Lock-guarded in-memory store.
///
/// Readers run concurrently; every mutation takes the write lock for its
/// whole duration, which makes it atomic with respect to all readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
    /// Released when the store is dropped.
    _lock: Option<File>,
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Take the exclusive lock guarding the snapshot at `path`.
fn acquire_lock(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    for attempt in 1..=LOCK_RETRIES {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!(
                    "{} is locked (attempt {}/{})",
                    lock_path.display(),
                    attempt,
                    LOCK_RETRIES
                );
                std::thread::sleep(LOCK_RETRY_SLEEP);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::Locked(path.to_path_buf()))
}

impl MemoryStore {
    /// Create an empty store that is never written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a snapshot file.
    ///
    /// A missing file yields an empty store; it is created on the first
    /// [`save`](Self::save). Fails with [`StoreError::Locked`] while another
    /// store holds the same snapshot open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let lock = acquire_lock(path)?;

        let tables = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            info!(
                "Loaded store from {} ({} users, {} reports)",
                path.display(),
                snapshot.users.len(),
                snapshot.reports.len()
            );
            Tables::from(snapshot)
        } else {
            debug!("No store at {}, starting empty", path.display());
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path.to_path_buf()),
            _lock: Some(lock),
        })
    }

    /// Write the snapshot file, if this store has one.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = {
            let tables = self.tables.read();
            serde_json::to_string_pretty(&Snapshot::from(&*tables))?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated snapshot.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;

        debug!("Saved store to {}", path.display());
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn create_user(&self, handle: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write();

        if tables.users.values().any(|u| u.handle == handle) {
            return Err(StoreError::DuplicateHandle(handle.to_string()));
        }

        tables.next_user += 1;
        let user = User {
            id: UserId(tables.next_user),
            handle: handle.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    fn user(&self, id: UserId) -> Option<User> {
        self.tables.read().users.get(&id).cloned()
    }

    fn user_by_handle(&self, handle: &str) -> Option<User> {
        self.tables
            .read()
            .users
            .values()
            .find(|u| u.handle == handle)
            .cloned()
    }

    fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.tables.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.handle.cmp(&b.handle));
        users
    }

    fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if tables.users.remove(&id).is_none() {
            return Err(StoreError::MissingUser(id));
        }

        let owned: Vec<ReportId> = tables
            .reports
            .values()
            .filter(|r| r.owner == id)
            .map(|r| r.id)
            .collect();
        for report in owned {
            tables.remove_report(report);
        }
        tables.grants.retain(|g| g.recipient != id);

        Ok(())
    }

    fn next_report_id(&self) -> ReportId {
        let mut tables = self.tables.write();
        tables.next_report += 1;
        ReportId(tables.next_report)
    }

    fn next_item_id(&self) -> ItemId {
        let mut tables = self.tables.write();
        tables.next_item += 1;
        ItemId(tables.next_item)
    }

    fn commit_report(&self, report: Report, mut items: Vec<Item>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if !tables.users.contains_key(&report.owner) {
            return Err(StoreError::MissingUser(report.owner));
        }
        if tables.reports.contains_key(&report.id) {
            return Err(StoreError::DuplicateReport(report.id));
        }
        if let Some(stray) = items.iter().find(|i| i.report_id != report.id) {
            return Err(StoreError::MissingReport(stray.report_id));
        }

        items.sort_by_key(|i| i.position);
        tables.items.insert(report.id, items);
        tables.reports.insert(report.id, report);

        Ok(())
    }

    fn report(&self, id: ReportId) -> Option<Report> {
        self.tables.read().reports.get(&id).cloned()
    }

    fn items(&self, report: ReportId) -> Vec<Item> {
        self.tables
            .read()
            .items
            .get(&report)
            .cloned()
            .unwrap_or_default()
    }

    fn reports_owned_by(&self, owner: UserId) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .tables
            .read()
            .reports
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        newest_first(&mut reports);
        reports
    }

    fn delete_report(&self, id: ReportId) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if !tables.reports.contains_key(&id) {
            return Err(StoreError::MissingReport(id));
        }
        tables.remove_report(id);

        Ok(())
    }

    fn recipients(&self, report: ReportId) -> BTreeSet<UserId> {
        self.tables
            .read()
            .grants_on(report)
            .map(|g| g.recipient)
            .collect()
    }

    fn has_grant(&self, report: ReportId, recipient: UserId) -> bool {
        self.tables.read().grants.contains(&ShareGrant {
            report_id: report,
            recipient,
        })
    }

    fn reports_shared_with(&self, user: UserId) -> Vec<Report> {
        let tables = self.tables.read();
        let mut reports: Vec<Report> = tables
            .grants
            .iter()
            .filter(|g| g.recipient == user)
            .filter_map(|g| tables.reports.get(&g.report_id))
            .filter(|r| r.owner != user)
            .cloned()
            .collect();
        newest_first(&mut reports);
        reports
    }

    fn apply_grants(
        &self,
        report: ReportId,
        add: &BTreeSet<UserId>,
        remove: &BTreeSet<UserId>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        let owner = tables
            .reports
            .get(&report)
            .map(|r| r.owner)
            .ok_or(StoreError::MissingReport(report))?;

        for &recipient in add {
            if !tables.users.contains_key(&recipient) {
                return Err(StoreError::MissingUser(recipient));
            }
            if recipient == owner {
                return Err(StoreError::InvalidGrant { report, recipient });
            }
        }

        for &recipient in remove {
            tables.grants.remove(&ShareGrant {
                report_id: report,
                recipient,
            });
        }
        for &recipient in add {
            tables.grants.insert(ShareGrant {
                report_id: report,
                recipient,
            });
        }

        Ok(())
    }
}
