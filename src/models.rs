//! Data models for sentiment reports.
//!
//! This module contains the core records kept by the store (users, reports,
//! items and share grants) and the derived report-level aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Mean scores above this are positive.
pub const POSITIVE_THRESHOLD: f64 = 0.2;
/// Mean scores below this are negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.2;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a [`User`].
    UserId,
    "user"
);
id_type!(
    /// Identifier of a [`Report`].
    ReportId,
    "report"
);
id_type!(
    /// Identifier of an [`Item`].
    ItemId,
    "item"
);

/// Sentiment of a single item or of a whole report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "Positive"),
            SentimentLabel::Neutral => write!(f, "Neutral"),
            SentimentLabel::Negative => write!(f, "Negative"),
        }
    }
}

impl SentimentLabel {
    /// Parse a label case-insensitively. Anything outside the three
    /// known values is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(SentimentLabel::Positive),
            "neutral" => Some(SentimentLabel::Neutral),
            "negative" => Some(SentimentLabel::Negative),
            _ => None,
        }
    }

    /// Label for a mean score using the fixed +/-0.2 thresholds.
    pub fn from_score(score: f64) -> Self {
        if score > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score < NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    /// Returns an emoji representation of the label.
    pub fn emoji(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "🟢",
            SentimentLabel::Neutral => "🟡",
            SentimentLabel::Negative => "🔴",
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique handle.
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// One sentiment-analysis session owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub overall_label: SentimentLabel,
    pub overall_score: f64,
    pub aggregate: ReportAggregate,
    /// Number of items that fell back to the neutral default.
    #[serde(default)]
    pub degraded_items: usize,
}

impl Report {
    /// Display name, falling back to the id.
    pub fn title(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Report {}", self.id.0),
        }
    }
}

/// One analyzed unit of text.
///
/// Intents and keywords are kept in their stored (JSON-encoded) form and
/// decoded on demand, so a corrupt record only loses its own tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub report_id: ReportId,
    /// Zero-based position of the source block in the submitted text.
    pub position: usize,
    pub text: String,
    pub label: SentimentLabel,
    pub score: f64,
    pub intents: String,
    pub keywords: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Decode the stored intent tags.
    pub fn intent_set(&self) -> Result<BTreeSet<String>, serde_json::Error> {
        serde_json::from_str(&self.intents)
    }

    /// Decode the stored keywords.
    pub fn keyword_set(&self) -> Result<BTreeSet<String>, serde_json::Error> {
        serde_json::from_str(&self.keywords)
    }

    /// Calendar day (UTC) of publication, if known.
    pub fn published_on(&self) -> Option<NaiveDate> {
        self.published_at.map(|ts| ts.date_naive())
    }
}

/// Encode a tag set in the stored form used by [`Item`].
pub fn encode_tags(tags: &BTreeSet<String>) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Permission for one non-owner user to view one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShareGrant {
    pub report_id: ReportId,
    pub recipient: UserId,
}

/// Colour bucket of a ranked keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBucket {
    Positive,
    Neutral,
    Negative,
}

impl ColorBucket {
    /// Bucket for an average sentiment. Both boundaries belong to neutral.
    pub fn from_average(avg: f64) -> Self {
        match SentimentLabel::from_score(avg) {
            SentimentLabel::Positive => ColorBucket::Positive,
            SentimentLabel::Neutral => ColorBucket::Neutral,
            SentimentLabel::Negative => ColorBucket::Negative,
        }
    }
}

impl fmt::Display for ColorBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorBucket::Positive => write!(f, "positive"),
            ColorBucket::Neutral => write!(f, "neutral"),
            ColorBucket::Negative => write!(f, "negative"),
        }
    }
}

/// A keyword in the report ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordStat {
    pub text: String,
    /// Number of items containing the keyword.
    pub count: usize,
    pub avg_sentiment: f64,
    pub color_bucket: ColorBucket,
}

/// Date-ordered sentiment series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub dates: Vec<NaiveDate>,
    pub overall_scores: Vec<f64>,
    /// Per-keyword series aligned to `dates`; `None` where the keyword
    /// has no item on that day.
    pub keyword_trends: BTreeMap<String, Vec<Option<f64>>>,
}

/// Count of items per sentiment label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl LabelCounts {
    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

/// Report-level analytics derived from a report's items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAggregate {
    pub overall_label: SentimentLabel,
    pub overall_score: f64,
    pub intent_share: BTreeMap<String, f64>,
    pub keyword_ranking: Vec<KeywordStat>,
    pub trend: Trend,
    #[serde(default)]
    pub label_counts: LabelCounts,
}

impl Default for ReportAggregate {
    fn default() -> Self {
        Self {
            overall_label: SentimentLabel::Neutral,
            overall_score: 0.0,
            intent_share: BTreeMap::new(),
            keyword_ranking: Vec::new(),
            trend: Trend::default(),
            label_counts: LabelCounts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse() {
        assert_eq!(SentimentLabel::parse("positive"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::parse(" NEGATIVE "), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::parse("Neutral"), Some(SentimentLabel::Neutral));
        assert_eq!(SentimentLabel::parse("mixed"), None);
    }

    #[test]
    fn test_label_from_score_boundaries() {
        assert_eq!(SentimentLabel::from_score(0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(0.2001), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(-0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.2001), SentimentLabel::Negative);
    }

    #[test]
    fn test_color_bucket_serializes_lowercase() {
        let json = serde_json::to_string(&ColorBucket::Neutral).unwrap();
        assert_eq!(json, "\"neutral\"");
    }

    #[test]
    fn test_item_tag_decoding() {
        let mut item = Item {
            id: ItemId(1),
            report_id: ReportId(1),
            position: 0,
            text: "text".to_string(),
            label: SentimentLabel::Neutral,
            score: 0.0,
            intents: encode_tags(&["inform".to_string()].into_iter().collect()),
            keywords: "not json".to_string(),
            published_at: None,
        };
        assert_eq!(item.intent_set().unwrap().len(), 1);
        assert!(item.keyword_set().is_err());

        item.keywords = "[]".to_string();
        assert!(item.keyword_set().unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_schema_field_names() {
        let json = serde_json::to_value(ReportAggregate::default()).unwrap();
        assert_eq!(json["overallLabel"], "Neutral");
        assert_eq!(json["overallScore"], 0.0);
        assert!(json["intentShare"].is_object());
        assert!(json["keywordRanking"].is_array());
        assert!(json["trend"]["dates"].is_array());
        assert!(json["trend"]["overallScores"].is_array());
        assert!(json["trend"]["keywordTrends"].is_object());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ReportId(7).to_string(), "report#7");
        assert_eq!(UserId(3).to_string(), "user#3");
    }
}
