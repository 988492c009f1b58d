//! Report aggregation.
//!
//! Reduces a report's items to the report-level analytics: overall
//! sentiment, intent share, keyword ranking and the sentiment trend.
//! The result depends only on the multiset of items, never on their order.

use crate::models::{
    ColorBucket, Item, KeywordStat, LabelCounts, ReportAggregate, SentimentLabel, Trend,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Number of intents kept in the intent share.
pub const TOP_INTENTS: usize = 5;
/// Number of keywords kept in the ranking.
pub const TOP_KEYWORDS: usize = 20;
/// Number of keywords that get their own trend line.
pub const TREND_KEYWORDS: usize = 3;

/// An item with its stored tags decoded.
struct DecodedItem {
    score: f64,
    label: SentimentLabel,
    day: Option<NaiveDate>,
    intents: BTreeSet<String>,
    keywords: BTreeSet<String>,
}

impl DecodedItem {
    fn from_item(item: &Item) -> Self {
        Self {
            score: item.score,
            label: item.label,
            day: item.published_on(),
            intents: decode_or_empty(item, "intents", item.intent_set()),
            keywords: decode_or_empty(item, "keywords", item.keyword_set()),
        }
    }
}

fn decode_or_empty(
    item: &Item,
    field: &str,
    decoded: Result<BTreeSet<String>, serde_json::Error>,
) -> BTreeSet<String> {
    match decoded {
        Ok(tags) => tags,
        Err(e) => {
            warn!("Ignoring undecodable {} of {}: {}", field, item.id, e);
            BTreeSet::new()
        }
    }
}

/// Compute the aggregate for a report's items.
///
/// Never fails: an empty slice yields a neutral aggregate with empty
/// structures, and items with corrupt tags contribute no tags.
pub fn aggregate(items: &[Item]) -> ReportAggregate {
    let decoded: Vec<DecodedItem> = items.iter().map(DecodedItem::from_item).collect();

    let overall_score = mean(decoded.iter().map(|d| d.score));

    let mut label_counts = LabelCounts::default();
    for item in &decoded {
        label_counts.record(item.label);
    }

    let keyword_ranking = keyword_ranking(&decoded);
    let trend_keywords: Vec<&str> = keyword_ranking
        .iter()
        .take(TREND_KEYWORDS)
        .map(|k| k.text.as_str())
        .collect();

    ReportAggregate {
        overall_label: SentimentLabel::from_score(overall_score),
        overall_score,
        intent_share: intent_share(&decoded),
        trend: trend(&decoded, &trend_keywords),
        keyword_ranking,
        label_counts,
    }
}

/// Arithmetic mean, `0.0` for no values.
///
/// Values are summed in sorted order so the result is bit-identical for
/// any permutation of the input.
fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

/// Count how many items carry each tag.
fn count_tags<'a>(tag_sets: impl Iterator<Item = &'a BTreeSet<String>>) -> BTreeMap<&'a str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tags in tag_sets {
        for tag in tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }
    counts
}

/// Top `n` entries by count descending, then name ascending.
fn top_by_count(counts: BTreeMap<&str, usize>, n: usize) -> Vec<(&str, usize)> {
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

/// Share of each top intent as a percentage of the top intents' total.
fn intent_share(items: &[DecodedItem]) -> BTreeMap<String, f64> {
    let top = top_by_count(count_tags(items.iter().map(|i| &i.intents)), TOP_INTENTS);
    let total: usize = top.iter().map(|(_, count)| count).sum();

    if total == 0 {
        return BTreeMap::new();
    }

    top.into_iter()
        .map(|(tag, count)| (tag.to_string(), count as f64 / total as f64 * 100.0))
        .collect()
}

/// Most frequent keywords with the mean score of the items containing them.
fn keyword_ranking(items: &[DecodedItem]) -> Vec<KeywordStat> {
    let top = top_by_count(count_tags(items.iter().map(|i| &i.keywords)), TOP_KEYWORDS);

    top.into_iter()
        .map(|(keyword, count)| {
            let avg_sentiment = mean(
                items
                    .iter()
                    .filter(|i| i.keywords.contains(keyword))
                    .map(|i| i.score),
            );
            KeywordStat {
                text: keyword.to_string(),
                count,
                avg_sentiment,
                color_bucket: ColorBucket::from_average(avg_sentiment),
            }
        })
        .collect()
}

/// Daily mean score over dated items, plus one aligned series per keyword.
fn trend(items: &[DecodedItem], keywords: &[&str]) -> Trend {
    let mut by_day: BTreeMap<NaiveDate, Vec<&DecodedItem>> = BTreeMap::new();
    for item in items {
        if let Some(day) = item.day {
            by_day.entry(day).or_default().push(item);
        }
    }

    let dates: Vec<NaiveDate> = by_day.keys().copied().collect();
    let overall_scores: Vec<f64> = by_day
        .values()
        .map(|day_items| mean(day_items.iter().map(|i| i.score)))
        .collect();

    let keyword_trends: BTreeMap<String, Vec<Option<f64>>> = keywords
        .iter()
        .map(|&keyword| {
            let series: Vec<Option<f64>> = by_day
                .values()
                .map(|day_items| {
                    let scores: Vec<f64> = day_items
                        .iter()
                        .filter(|i| i.keywords.contains(keyword))
                        .map(|i| i.score)
                        .collect();
                    if scores.is_empty() {
                        None
                    } else {
                        Some(mean(scores))
                    }
                })
                .collect();
            (keyword.to_string(), series)
        })
        .collect();

    Trend {
        dates,
        overall_scores,
        keyword_trends,
    }
}

/// Generate a text summary of an aggregate.
pub fn generate_summary_text(aggregate: &ReportAggregate) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Overall: {} {} ({:+.3})",
        aggregate.overall_label.emoji(),
        aggregate.overall_label,
        aggregate.overall_score
    ));
    lines.push(format!(
        "- {} Positive: {}",
        SentimentLabel::Positive.emoji(),
        aggregate.label_counts.positive
    ));
    lines.push(format!(
        "- {} Neutral: {}",
        SentimentLabel::Neutral.emoji(),
        aggregate.label_counts.neutral
    ));
    lines.push(format!(
        "- {} Negative: {}",
        SentimentLabel::Negative.emoji(),
        aggregate.label_counts.negative
    ));

    if !aggregate.intent_share.is_empty() {
        lines.push(String::new());
        lines.push("Intents:".to_string());

        let mut intents: Vec<_> = aggregate.intent_share.iter().collect();
        intents.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (intent, share) in intents {
            lines.push(format!("- {}: {:.1}%", intent, share));
        }
    }

    if !aggregate.keyword_ranking.is_empty() {
        lines.push(String::new());
        lines.push("Top keywords:".to_string());

        for keyword in aggregate.keyword_ranking.iter().take(5) {
            lines.push(format!(
                "- {} ({} items, {})",
                keyword.text, keyword.count, keyword.color_bucket
            ));
        }
    }

    lines.join("\n")
}
