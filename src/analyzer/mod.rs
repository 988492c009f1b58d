//! Per-block sentiment analysis.
//!
//! The [`Analyzer`] trait is the seam to the external labelling service.
//! Everything an analyzer returns passes through [`RawAnalysis::validate`],
//! so only the closed label set, finite scores and known intents reach the
//! rest of the crate.

pub mod ollama;

pub use ollama::{OllamaAnalyzer, OllamaConfig};

use crate::models::SentimentLabel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

/// The bounded intent vocabulary.
pub const INTENT_VOCABULARY: [&str; 8] = [
    "announce",
    "criticize",
    "entertain",
    "inform",
    "persuade",
    "praise",
    "speculate",
    "warn",
];

/// Validated labels for one block of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub label: SentimentLabel,
    /// In `-1.0..=1.0`.
    pub score: f64,
    pub intents: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Analysis {
    /// The result substituted for a block whose analysis failed.
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            intents: BTreeSet::new(),
            keywords: BTreeSet::new(),
            published_at: None,
        }
    }
}

/// Labels a block of text with sentiment, intents and keywords.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Analysis>;
}

/// Analyzer output as received, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub intents: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub published: Option<String>,
}

impl RawAnalysis {
    /// Coerce into an [`Analysis`].
    ///
    /// Unknown labels and missing or non-finite scores are errors. Scores
    /// are clamped to `[-1, 1]`, unknown intents are dropped, keywords are
    /// lowercased and capped at `max_keywords`, and an unparseable date
    /// becomes `None`.
    pub fn validate(self, max_keywords: usize) -> Result<Analysis> {
        let raw_label = self
            .sentiment
            .ok_or_else(|| anyhow!("missing sentiment label"))?;
        let label = SentimentLabel::parse(&raw_label)
            .ok_or_else(|| anyhow!("unknown sentiment label '{}'", raw_label))?;

        let score = self.score.ok_or_else(|| anyhow!("missing sentiment score"))?;
        if !score.is_finite() {
            return Err(anyhow!("non-finite sentiment score"));
        }
        let score = score.clamp(-1.0, 1.0);

        let intents = self
            .intents
            .unwrap_or_default()
            .iter()
            .map(|i| i.trim().to_lowercase())
            .filter(|i| INTENT_VOCABULARY.contains(&i.as_str()))
            .collect();

        let mut keywords = BTreeSet::new();
        for keyword in self.keywords.unwrap_or_default() {
            if keywords.len() >= max_keywords {
                break;
            }
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() {
                keywords.insert(keyword);
            }
        }

        let published_at = self.published.as_deref().and_then(parse_publication_date);

        Ok(Analysis {
            label,
            score,
            intents,
            keywords,
            published_at,
        })
    }
}

/// Parse a publication date given as `YYYY-MM-DD` or RFC 3339.
pub fn parse_publication_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn raw(sentiment: &str, score: f64) -> RawAnalysis {
        RawAnalysis {
            sentiment: Some(sentiment.to_string()),
            score: Some(score),
            ..RawAnalysis::default()
        }
    }

    #[test]
    fn test_validate_coerces_values() {
        let analysis = RawAnalysis {
            intents: Some(vec!["Inform".to_string(), "gossip".to_string()]),
            keywords: Some(vec![" Interest Rates ".to_string(), "".to_string()]),
            published: Some("2025-03-14".to_string()),
            ..raw("POSITIVE", 1.7)
        }
        .validate(10)
        .unwrap();

        assert_eq!(analysis.label, SentimentLabel::Positive);
        assert_eq!(analysis.score, 1.0);
        assert_eq!(analysis.intents.len(), 1);
        assert!(analysis.intents.contains("inform"));
        assert!(analysis.keywords.contains("interest rates"));
        assert_eq!(analysis.keywords.len(), 1);
        assert_eq!(analysis.published_at.unwrap().day(), 14);
    }

    #[test]
    fn test_validate_rejects_unknown_label() {
        assert!(raw("mixed", 0.1).validate(10).is_err());
        assert!(RawAnalysis::default().validate(10).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_score() {
        assert!(raw("Neutral", f64::NAN).validate(10).is_err());
        let missing = RawAnalysis {
            score: None,
            ..raw("Neutral", 0.0)
        };
        assert!(missing.validate(10).is_err());
    }

    #[test]
    fn test_validate_caps_keywords() {
        let analysis = RawAnalysis {
            keywords: Some((0..20).map(|i| format!("k{}", i)).collect()),
            ..raw("Neutral", 0.0)
        }
        .validate(5)
        .unwrap();
        assert_eq!(analysis.keywords.len(), 5);
    }

    #[test]
    fn test_null_lists_become_empty() {
        let raw: RawAnalysis = serde_json::from_str(
            r#"{"sentiment": "Positive", "score": 0.4, "intents": null, "keywords": null, "published": null}"#,
        )
        .unwrap();
        let analysis = raw.validate(10).unwrap();

        assert_eq!(analysis.label, SentimentLabel::Positive);
        assert_eq!(analysis.score, 0.4);
        assert!(analysis.intents.is_empty());
        assert!(analysis.keywords.is_empty());
    }

    #[test]
    fn test_parse_publication_date() {
        let ts = parse_publication_date("2025-01-02T23:30:00-02:00").unwrap();
        assert_eq!(ts.day(), 3);
        assert!(parse_publication_date("2025-01-02").is_some());
        assert!(parse_publication_date("yesterday").is_none());
    }
}
