//! Report creation and the report/sharing API.
//!
//! A new report goes through one pass: split the raw text into blocks,
//! analyze the blocks with a bounded number of concurrent analyzer calls,
//! aggregate the resulting items and commit report, items and aggregate to
//! the store as one unit. A block whose analysis fails or times out becomes
//! a neutral item; only a submission where every block fails is rejected.

pub mod split;

pub use split::{split_blocks, SplitPolicy};

use crate::analysis::aggregate;
use crate::analyzer::{Analysis, Analyzer};
use crate::config::Config;
use crate::error::{NewsLensError, Result};
use crate::models::{encode_tags, Item, Report, ReportId, User, UserId};
use crate::sharing::{ReconcileOutcome, SharingService};
use crate::store::RecordStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest accepted user handle.
pub const MAX_HANDLE_LEN: usize = 64;

/// Settings for report creation.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum analyzer calls in flight for one report.
    pub concurrency: usize,
    /// Deadline for each analyzer call.
    pub call_timeout: Duration,
    pub split: SplitPolicy,
    /// Largest number of blocks accepted in one submission.
    pub max_blocks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(60),
            split: SplitPolicy::default(),
            max_blocks: 200,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.general.concurrency.max(1),
            call_timeout: Duration::from_secs(config.model.timeout_seconds),
            split: config.analysis.split.clone(),
            max_blocks: config.analysis.max_blocks,
        }
    }
}

/// Creates reports and serves them to their owners and recipients.
pub struct ReportService {
    store: Arc<dyn RecordStore>,
    analyzer: Arc<dyn Analyzer>,
    sharing: SharingService,
    config: OrchestratorConfig,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        analyzer: Arc<dyn Analyzer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sharing: SharingService::new(store.clone()),
            store,
            analyzer,
            config,
        }
    }

    pub fn sharing(&self) -> &SharingService {
        &self.sharing
    }

    /// Register a user with a unique handle.
    pub fn register_user(&self, handle: &str) -> Result<User> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(NewsLensError::Validation("handle cannot be empty".to_string()));
        }
        if handle.chars().count() > MAX_HANDLE_LEN {
            return Err(NewsLensError::Validation(format!(
                "handle is longer than {} characters",
                MAX_HANDLE_LEN
            )));
        }

        let user = self.store.create_user(handle)?;
        info!("Registered {} as {}", user.handle, user.id);
        Ok(user)
    }

    pub fn find_user(&self, handle: &str) -> Result<User> {
        self.store
            .user_by_handle(handle.trim())
            .ok_or_else(|| NewsLensError::NotFound(format!("user '{}' does not exist", handle)))
    }

    pub fn user(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)
            .ok_or_else(|| NewsLensError::user_not_found(id))
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.users()
    }

    /// Delete a user, their reports and every grant involving them.
    pub fn remove_user(&self, user: UserId) -> Result<()> {
        let owned = self.store.reports_owned_by(user);
        self.store.delete_user(user)?;
        for report in owned {
            self.sharing.forget(report.id);
        }
        info!("Removed {}", user);
        Ok(())
    }

    /// Analyze `raw_text` and store it as a new report owned by `owner`.
    pub async fn create_report(
        &self,
        owner: UserId,
        raw_text: &str,
        name: Option<String>,
    ) -> Result<Report> {
        if self.store.user(owner).is_none() {
            return Err(NewsLensError::user_not_found(owner));
        }

        let blocks = split_blocks(raw_text, &self.config.split);
        if blocks.is_empty() {
            return Err(NewsLensError::Validation(
                "submission contains no text to analyze".to_string(),
            ));
        }
        if blocks.len() > self.config.max_blocks {
            return Err(NewsLensError::Validation(format!(
                "submission has {} blocks, the limit is {}",
                blocks.len(),
                self.config.max_blocks
            )));
        }

        info!(
            "Analyzing {} blocks for {} (concurrency {})",
            blocks.len(),
            owner,
            self.config.concurrency
        );

        let analyses: Vec<Option<Analysis>> = stream::iter(blocks.iter().enumerate())
            .map(|(index, block)| self.analyze_block(index, block))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let degraded = analyses.iter().filter(|a| a.is_none()).count();
        if degraded == blocks.len() {
            return Err(NewsLensError::AnalysisFailure(format!(
                "all {} blocks failed analysis",
                blocks.len()
            )));
        }
        if degraded > 0 {
            warn!(
                "{} of {} blocks fell back to a neutral result",
                degraded,
                blocks.len()
            );
        }

        let report_id = self.store.next_report_id();
        let items: Vec<Item> = blocks
            .into_iter()
            .zip(analyses)
            .enumerate()
            .map(|(position, (text, analysis))| {
                let analysis = analysis.unwrap_or_else(Analysis::neutral);
                Item {
                    id: self.store.next_item_id(),
                    report_id,
                    position,
                    text,
                    label: analysis.label,
                    score: analysis.score,
                    intents: encode_tags(&analysis.intents),
                    keywords: encode_tags(&analysis.keywords),
                    published_at: analysis.published_at,
                }
            })
            .collect();

        let aggregate = aggregate(&items);
        let report = Report {
            id: report_id,
            owner,
            created_at: Utc::now(),
            name: name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            overall_label: aggregate.overall_label,
            overall_score: aggregate.overall_score,
            aggregate,
            degraded_items: degraded,
        };

        self.store.commit_report(report.clone(), items)?;

        info!(
            "Created {} with overall sentiment {} ({:+.3})",
            report.id, report.overall_label, report.overall_score
        );
        Ok(report)
    }

    /// Analyze one block, absorbing errors and timeouts.
    async fn analyze_block(&self, index: usize, block: &str) -> Option<Analysis> {
        debug!("Analyzing block {} ({} chars)", index + 1, block.len());

        match tokio::time::timeout(self.config.call_timeout, self.analyzer.analyze(block)).await {
            Ok(Ok(analysis)) => Some(analysis),
            Ok(Err(e)) => {
                warn!("Analysis of block {} failed: {:#}", index + 1, e);
                None
            }
            Err(_) => {
                warn!(
                    "Analysis of block {} timed out after {:?}",
                    index + 1,
                    self.config.call_timeout
                );
                None
            }
        }
    }

    /// Load a report `requester` may view.
    pub fn get_report(&self, report: ReportId, requester: UserId) -> Result<Report> {
        let report = self
            .store
            .report(report)
            .ok_or_else(|| NewsLensError::report_not_found(report))?;

        if !self.sharing.can_view(&report, requester) {
            return Err(NewsLensError::Permission(format!(
                "{} is not shared with {}",
                report.id, requester
            )));
        }

        Ok(report)
    }

    /// Items of a report `requester` may view, in submission order.
    pub fn get_report_items(&self, report: ReportId, requester: UserId) -> Result<Vec<Item>> {
        let report = self.get_report(report, requester)?;
        Ok(self.store.items(report.id))
    }

    /// Reports owned by `user`, newest first.
    pub fn list_owned_reports(&self, user: UserId) -> Result<Vec<Report>> {
        if self.store.user(user).is_none() {
            return Err(NewsLensError::user_not_found(user));
        }
        Ok(self.store.reports_owned_by(user))
    }

    pub fn list_shared_reports(&self, user: UserId) -> Result<Vec<Report>> {
        self.sharing.list_shared_with(user)
    }

    pub fn grant_share(&self, report: ReportId, acting: UserId, recipient: UserId) -> Result<()> {
        self.sharing.grant(report, acting, recipient)
    }

    pub fn revoke_share(&self, report: ReportId, acting: UserId, recipient: UserId) -> Result<()> {
        self.sharing.revoke(report, acting, recipient)
    }

    pub fn reconcile_shares(
        &self,
        report: ReportId,
        acting: UserId,
        recipients: &BTreeSet<UserId>,
    ) -> Result<ReconcileOutcome> {
        self.sharing.reconcile(report, acting, recipients)
    }

    /// Delete a report with its items and grants. Owner only.
    pub fn delete_report(&self, report: ReportId, acting: UserId) -> Result<()> {
        let found = self
            .store
            .report(report)
            .ok_or_else(|| NewsLensError::report_not_found(report))?;

        if found.owner != acting {
            return Err(NewsLensError::Permission(format!(
                "only the owner can delete {}",
                report
            )));
        }

        self.store.delete_report(report)?;
        self.sharing.forget(report);
        info!("Deleted {}", report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentLabel;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Labels blocks by their words: "good" is positive, "bad" negative,
    /// "fail" errors and "slow" outlives any test timeout.
    #[derive(Default)]
    struct ScriptedAnalyzer {
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn analyze(&self, text: &str) -> anyhow::Result<Analysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if text.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if text.contains("fail") {
                return Err(anyhow!("analyzer unavailable"));
            }

            let (label, score) = if text.contains("good") {
                (SentimentLabel::Positive, 0.6)
            } else if text.contains("bad") {
                (SentimentLabel::Negative, -0.6)
            } else {
                (SentimentLabel::Neutral, 0.0)
            };

            Ok(Analysis {
                label,
                score,
                intents: BTreeSet::from(["inform".to_string()]),
                keywords: text
                    .split_whitespace()
                    .filter(|w| w.len() > 3)
                    .map(str::to_lowercase)
                    .collect(),
                published_at: None,
            })
        }
    }

    fn service_with(analyzer: Arc<ScriptedAnalyzer>, config: OrchestratorConfig) -> (Arc<MemoryStore>, ReportService) {
        let store = Arc::new(MemoryStore::new());
        let service = ReportService::new(store.clone(), analyzer, config);
        (store, service)
    }

    fn service() -> (Arc<MemoryStore>, ReportService) {
        service_with(Arc::new(ScriptedAnalyzer::default()), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_all_items() {
        let (store, service) = service();
        let alice = service.register_user("alice").unwrap();

        let raw = "good harvest news\n\nfail this block\n\nbad storm warning";
        let report = assert_ok!(service.create_report(alice.id, raw, None).await);

        let items = store.items(report.id);
        assert_eq!(items.len(), 3);
        assert_eq!(report.degraded_items, 1);

        let second = &items[1];
        assert_eq!(second.text, "fail this block");
        assert_eq!(second.label, SentimentLabel::Neutral);
        assert_eq!(second.score, 0.0);
        assert!(second.intent_set().unwrap().is_empty());
        assert!(second.keyword_set().unwrap().is_empty());
        assert!(second.published_at.is_none());

        assert_eq!(items[0].label, SentimentLabel::Positive);
        assert_eq!(items[2].label, SentimentLabel::Negative);
        assert_eq!(store.report(report.id).unwrap().aggregate, aggregate(&items));
    }

    #[tokio::test]
    async fn test_all_failures_abort_creation() {
        let (store, service) = service();
        let alice = service.register_user("alice").unwrap();

        let result = service
            .create_report(alice.id, "fail one\n\nfail two", None)
            .await;
        assert!(matches!(result, Err(NewsLensError::AnalysisFailure(_))));
        assert!(store.reports_owned_by(alice.id).is_empty());
        assert!(store.items(ReportId(1)).is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_neutral() {
        let config = OrchestratorConfig {
            call_timeout: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        };
        let (store, service) = service_with(Arc::new(ScriptedAnalyzer::default()), config);
        let alice = service.register_user("alice").unwrap();

        let report = assert_ok!(
            service
                .create_report(alice.id, "good morning\n\nslow story", None)
                .await
        );
        let items = store.items(report.id);
        assert_eq!(items[1].label, SentimentLabel::Neutral);
        assert_eq!(report.degraded_items, 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let analyzer = Arc::new(ScriptedAnalyzer {
            delay: Some(Duration::from_millis(20)),
            ..ScriptedAnalyzer::default()
        });
        let config = OrchestratorConfig {
            concurrency: 2,
            split: SplitPolicy::Line,
            ..OrchestratorConfig::default()
        };
        let (store, service) = service_with(analyzer.clone(), config);
        let alice = service.register_user("alice").unwrap();

        let raw = (0..8).map(|i| format!("block {}", i)).collect::<Vec<_>>().join("\n");
        let report = assert_ok!(service.create_report(alice.id, &raw, None).await);

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 8);
        assert!(analyzer.max_in_flight.load(Ordering::SeqCst) <= 2);
        let positions: Vec<usize> = store.items(report.id).iter().map(|i| i.position).collect();
        assert_eq!(positions, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_submission_rejected() {
        let (_, service) = service();
        let alice = service.register_user("alice").unwrap();

        let result = service.create_report(alice.id, " \n\n\t ", None).await;
        assert!(matches!(result, Err(NewsLensError::Validation(_))));
    }

    #[tokio::test]
    async fn test_block_limit() {
        let config = OrchestratorConfig {
            max_blocks: 2,
            split: SplitPolicy::Line,
            ..OrchestratorConfig::default()
        };
        let (_, service) = service_with(Arc::new(ScriptedAnalyzer::default()), config);
        let alice = service.register_user("alice").unwrap();

        let result = service.create_report(alice.id, "a\nb\nc", None).await;
        assert!(matches!(result, Err(NewsLensError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_owner() {
        let (_, service) = service();
        let result = service.create_report(UserId(9), "good news", None).await;
        assert!(matches!(result, Err(NewsLensError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_report_name_is_trimmed() {
        let (_, service) = service();
        let alice = service.register_user("alice").unwrap();

        let named = assert_ok!(
            service
                .create_report(alice.id, "good news", Some("  Markets  ".to_string()))
                .await
        );
        assert_eq!(named.name.as_deref(), Some("Markets"));

        let blank = assert_ok!(
            service
                .create_report(alice.id, "good news", Some("   ".to_string()))
                .await
        );
        assert!(blank.name.is_none());
    }

    #[tokio::test]
    async fn test_get_report_checks_visibility() {
        let (_, service) = service();
        let alice = service.register_user("alice").unwrap();
        let bob = service.register_user("bob").unwrap();
        let report = service
            .create_report(alice.id, "good news", None)
            .await
            .unwrap();

        assert_ok!(service.get_report(report.id, alice.id));
        let denied = assert_err!(service.get_report(report.id, bob.id));
        assert!(matches!(denied, NewsLensError::Permission(_)));

        service.grant_share(report.id, alice.id, bob.id).unwrap();
        assert_ok!(service.get_report(report.id, bob.id));
        assert_eq!(service.get_report_items(report.id, bob.id).unwrap().len(), 1);

        let missing = assert_err!(service.get_report(ReportId(999), alice.id));
        assert!(matches!(missing, NewsLensError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owned_and_shared_listings() {
        let (_, service) = service();
        let alice = service.register_user("alice").unwrap();
        let bob = service.register_user("bob").unwrap();

        let first = service.create_report(alice.id, "good", None).await.unwrap();
        let second = service.create_report(alice.id, "bad", None).await.unwrap();
        service.grant_share(first.id, alice.id, bob.id).unwrap();

        let owned: Vec<ReportId> = service
            .list_owned_reports(alice.id)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(owned, vec![second.id, first.id]);

        let shared = service.list_shared_reports(bob.id).unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, first.id);
    }

    #[tokio::test]
    async fn test_reconcile_shares_scenario() {
        let (store, service) = service();
        let alice = service.register_user("alice").unwrap();
        let b = service.register_user("b").unwrap();
        let c = service.register_user("c").unwrap();
        let d = service.register_user("d").unwrap();
        let report = service.create_report(alice.id, "good", None).await.unwrap();

        service.grant_share(report.id, alice.id, b.id).unwrap();
        service.grant_share(report.id, alice.id, c.id).unwrap();

        let desired = BTreeSet::from([c.id, d.id]);
        assert_ok!(service.reconcile_shares(report.id, alice.id, &desired));
        assert_eq!(store.recipients(report.id), desired);
    }

    #[tokio::test]
    async fn test_delete_report_owner_only() {
        let (store, service) = service();
        let alice = service.register_user("alice").unwrap();
        let bob = service.register_user("bob").unwrap();
        let report = service.create_report(alice.id, "good", None).await.unwrap();
        service.grant_share(report.id, alice.id, bob.id).unwrap();

        let denied = assert_err!(service.delete_report(report.id, bob.id));
        assert!(matches!(denied, NewsLensError::Permission(_)));

        assert_ok!(service.delete_report(report.id, alice.id));
        assert!(store.items(report.id).is_empty());
        assert!(service.list_shared_reports(bob.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_user_cascades() {
        let (store, service) = service();
        let alice = service.register_user("alice").unwrap();
        let bob = service.register_user("bob").unwrap();
        let report = service.create_report(alice.id, "good", None).await.unwrap();
        service.grant_share(report.id, alice.id, bob.id).unwrap();

        assert_ok!(service.remove_user(bob.id));
        assert!(store.recipients(report.id).is_empty());

        assert_ok!(service.remove_user(alice.id));
        assert!(store.report(report.id).is_none());
    }

    #[test]
    fn test_register_user_validation() {
        let (_, service) = service();
        assert!(matches!(
            service.register_user("   "),
            Err(NewsLensError::Validation(_))
        ));
        assert!(matches!(
            service.register_user(&"x".repeat(MAX_HANDLE_LEN + 1)),
            Err(NewsLensError::Validation(_))
        ));
        service.register_user(" alice ").unwrap();
        assert!(matches!(
            service.register_user("alice"),
            Err(NewsLensError::Validation(_))
        ));
        assert_eq!(service.find_user("alice").unwrap().handle, "alice");
    }
}
