//! Markdown and JSON report rendering.
//!
//! Renders a report together with its owner, recipients and items. The
//! aggregate is rendered as stored; nothing is recomputed here.

use crate::config::ReportConfig;
use crate::models::{
    ColorBucket, Item, ItemId, Report, ReportAggregate, SentimentLabel, Trend,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::Path;

/// Everything shown when a report is rendered.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub report: Report,
    /// Handle of the owner.
    pub owner: String,
    /// Recipient handles; only filled in for the owner.
    pub shared_with: Vec<String>,
    #[serde(serialize_with = "serialize_items")]
    pub items: Vec<Item>,
}

/// An item as rendered, with its tags decoded.
#[derive(Debug, Serialize)]
struct ItemView<'a> {
    id: ItemId,
    position: usize,
    text: &'a str,
    label: SentimentLabel,
    score: f64,
    intents: BTreeSet<String>,
    keywords: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Item> for ItemView<'a> {
    fn from(item: &'a Item) -> Self {
        Self {
            id: item.id,
            position: item.position,
            text: &item.text,
            label: item.label,
            score: item.score,
            intents: item.intent_set().unwrap_or_default(),
            keywords: item.keyword_set().unwrap_or_default(),
            published_at: item.published_at,
        }
    }
}

fn serialize_items<S: Serializer>(
    items: &[Item],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(items.iter().map(ItemView::from))
}

/// Rendering settings.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub include_items: bool,
    pub excerpt_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_items: true,
            excerpt_chars: 160,
        }
    }
}

impl From<&ReportConfig> for RenderOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            include_items: config.include_items,
            excerpt_chars: config.excerpt_chars,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(view: &ReportView, options: &RenderOptions) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", view.report.title()));

    output.push_str(&generate_metadata_section(view));
    output.push_str(&generate_overall_section(&view.report.aggregate));
    output.push_str(&generate_intent_section(&view.report.aggregate));
    output.push_str(&generate_keyword_section(&view.report.aggregate));
    output.push_str(&generate_trend_section(&view.report.aggregate.trend));

    if options.include_items {
        output.push_str(&generate_items_section(&view.items, options.excerpt_chars));
    }

    output.push_str("---\n\n");
    output.push_str("*Report generated by NewsLens*\n");

    output
}

fn generate_metadata_section(view: &ReportView) -> String {
    let report = &view.report;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Report:** {}\n", report.id));
    section.push_str(&format!("- **Owner:** {}\n", view.owner));
    section.push_str(&format!(
        "- **Created:** {}\n",
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Items:** {}\n",
        report.aggregate.label_counts.total()
    ));
    if report.degraded_items > 0 {
        section.push_str(&format!(
            "- **Items without analysis:** {}\n",
            report.degraded_items
        ));
    }
    if !view.shared_with.is_empty() {
        section.push_str(&format!(
            "- **Shared with:** {}\n",
            view.shared_with.join(", ")
        ));
    }
    section.push('\n');

    section
}

fn generate_overall_section(aggregate: &ReportAggregate) -> String {
    let counts = &aggregate.label_counts;
    let mut section = String::new();

    section.push_str("## Overall Sentiment\n\n");
    section.push_str(&format!(
        "**{} {}** (score {:+.3})\n\n",
        aggregate.overall_label.emoji(),
        aggregate.overall_label,
        aggregate.overall_score
    ));

    section.push_str(&format!(
        "| {} Positive | {} Neutral | {} Negative | **Total** |\n",
        SentimentLabel::Positive.emoji(),
        SentimentLabel::Neutral.emoji(),
        SentimentLabel::Negative.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        counts.positive,
        counts.neutral,
        counts.negative,
        counts.total()
    ));

    section
}

fn generate_intent_section(aggregate: &ReportAggregate) -> String {
    if aggregate.intent_share.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Intents\n\n");
    section.push_str("| Intent | Share |\n");
    section.push_str("|:---|---:|\n");

    let mut intents: Vec<_> = aggregate.intent_share.iter().collect();
    intents.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (intent, share) in intents {
        section.push_str(&format!("| {} | {:.1}% |\n", intent, share));
    }
    section.push('\n');

    section
}

fn generate_keyword_section(aggregate: &ReportAggregate) -> String {
    if aggregate.keyword_ranking.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Keywords\n\n");
    section.push_str("| Keyword | Items | Avg. sentiment | |\n");
    section.push_str("|:---|:---:|---:|:---:|\n");

    for stat in &aggregate.keyword_ranking {
        section.push_str(&format!(
            "| {} | {} | {:+.3} | {} |\n",
            stat.text,
            stat.count,
            stat.avg_sentiment,
            bucket_badge(stat.color_bucket)
        ));
    }
    section.push('\n');

    section
}

fn bucket_badge(bucket: ColorBucket) -> &'static str {
    match bucket {
        ColorBucket::Positive => "🟢",
        ColorBucket::Neutral => "⚪",
        ColorBucket::Negative => "🔴",
    }
}

fn generate_trend_section(trend: &Trend) -> String {
    if trend.dates.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Trend\n\n");

    let mut header = String::from("| Date | Overall |");
    let mut rule = String::from("|:---|---:|");
    for keyword in trend.keyword_trends.keys() {
        header.push_str(&format!(" {} |", keyword));
        rule.push_str("---:|");
    }
    section.push_str(&header);
    section.push('\n');
    section.push_str(&rule);
    section.push('\n');

    for (i, (date, score)) in trend.dates.iter().zip(&trend.overall_scores).enumerate() {
        let mut row = format!("| {} | {:+.3} |", date.format("%Y-%m-%d"), score);
        for series in trend.keyword_trends.values() {
            match series.get(i).copied().flatten() {
                Some(value) => row.push_str(&format!(" {:+.3} |", value)),
                None => row.push_str(" - |"),
            }
        }
        section.push_str(&row);
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_items_section(items: &[Item], excerpt_chars: usize) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Items\n\n");

    for item in items {
        section.push_str(&format!(
            "### {}. {} {} ({:+.3})\n\n",
            item.position + 1,
            item.label.emoji(),
            item.label,
            item.score
        ));

        if let Some(day) = item.published_on() {
            section.push_str(&format!("*Published {}*\n\n", day.format("%Y-%m-%d")));
        }

        for line in excerpt(&item.text, excerpt_chars).lines() {
            section.push_str(&format!("> {}\n", line));
        }
        section.push('\n');

        let intents = item.intent_set().unwrap_or_default();
        if !intents.is_empty() {
            let intents: Vec<&str> = intents.iter().map(String::as_str).collect();
            section.push_str(&format!("**Intents:** {}\n\n", intents.join(", ")));
        }
        let keywords = item.keyword_set().unwrap_or_default();
        if !keywords.is_empty() {
            let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
            section.push_str(&format!("**Keywords:** {}\n\n", keywords.join(", ")));
        }
    }

    section
}

/// The first `max_chars` characters of `text`, with an ellipsis if cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// One line of a report listing; `shared_by` names the owner of a report
/// shared with the viewer.
pub fn report_list_line(report: &Report, shared_by: Option<&str>) -> String {
    let mut line = format!(
        "{:>10}  {} {:<8} {:+.3}  {}  {}",
        report.id.to_string(),
        report.overall_label.emoji(),
        report.overall_label.to_string(),
        report.overall_score,
        report.created_at.format("%Y-%m-%d %H:%M"),
        report.title()
    );
    if let Some(owner) = shared_by {
        line.push_str(&format!("  (shared by {})", owner));
    }
    line
}

/// Generate a JSON report.
pub fn generate_json_report(view: &ReportView) -> Result<String> {
    serde_json::to_string_pretty(view).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate;
    use crate::models::{ItemId, ReportId, UserId};
    use chrono::{TimeZone, Utc};

    fn item(position: usize, text: &str, score: f64, keywords: &str, day: Option<u32>) -> Item {
        Item {
            id: ItemId(position as u64 + 1),
            report_id: ReportId(1),
            position,
            text: text.to_string(),
            label: SentimentLabel::from_score(score),
            score,
            intents: r#"["inform"]"#.to_string(),
            keywords: keywords.to_string(),
            published_at: day.map(|d| Utc.with_ymd_and_hms(2025, 3, d, 8, 0, 0).unwrap()),
        }
    }

    fn create_test_view() -> ReportView {
        let items = vec![
            item(0, "Markets rallied on strong earnings.", 0.7, r#"["markets"]"#, Some(1)),
            item(1, "Storm warnings issued along the coast.", -0.5, r#"["storm"]"#, Some(2)),
            item(2, "Council meets on Tuesday.", 0.0, "[]", None),
        ];
        let aggregate = aggregate(&items);

        ReportView {
            report: Report {
                id: ReportId(1),
                owner: UserId(1),
                created_at: Utc::now(),
                name: Some("Morning wire".to_string()),
                overall_label: aggregate.overall_label,
                overall_score: aggregate.overall_score,
                aggregate,
                degraded_items: 1,
            },
            owner: "alice".to_string(),
            shared_with: vec!["bob".to_string()],
            items,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let view = create_test_view();
        let markdown = generate_markdown_report(&view, &RenderOptions::default());

        assert!(markdown.contains("# Morning wire"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Owner:** alice"));
        assert!(markdown.contains("- **Shared with:** bob"));
        assert!(markdown.contains("- **Items without analysis:** 1"));
        assert!(markdown.contains("## Overall Sentiment"));
        assert!(markdown.contains("| inform | 100.0% |"));
        assert!(markdown.contains("| markets | 1 | +0.700 | 🟢 |"));
        assert!(markdown.contains("| storm | 1 | -0.500 | 🔴 |"));
        assert!(markdown.contains("## Trend"));
        assert!(markdown.contains("> Council meets on Tuesday."));
    }

    #[test]
    fn test_trend_table_marks_gaps() {
        let view = create_test_view();
        let section = generate_trend_section(&view.report.aggregate.trend);

        assert!(section.contains("| Date | Overall | markets | storm |"));
        assert!(section.contains("| 2025-03-01 | +0.700 | +0.700 | - |"));
        assert!(section.contains("| 2025-03-02 | -0.500 | - | -0.500 |"));
    }

    #[test]
    fn test_items_can_be_omitted() {
        let view = create_test_view();
        let options = RenderOptions {
            include_items: false,
            ..RenderOptions::default()
        };
        let markdown = generate_markdown_report(&view, &options);
        assert!(!markdown.contains("## Items"));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("héllo wörld", 5), "héllo…");
        assert_eq!(excerpt("abc def", 4), "abc…");
    }

    #[test]
    fn test_generate_json_report() {
        let view = create_test_view();
        let json = generate_json_report(&view).unwrap();

        assert!(json.contains("\"keywordRanking\""));
        assert!(json.contains("\"labelCounts\""));
        assert!(json.contains("\"shared_with\""));
        assert!(json.contains("\"items\""));
    }

    #[test]
    fn test_report_list_line_names_owner() {
        let view = create_test_view();

        let own = report_list_line(&view.report, None);
        assert!(own.contains("report#1"));
        assert!(own.contains("Morning wire"));
        assert!(!own.contains("shared by"));

        let shared = report_list_line(&view.report, Some("alice"));
        assert!(shared.ends_with("(shared by alice)"));
    }

    #[test]
    fn test_json_items_carry_tag_lists() {
        let view = create_test_view();
        let json = generate_json_report(&view).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let first = &value["items"][0];
        assert_eq!(first["intents"], serde_json::json!(["inform"]));
        assert_eq!(first["keywords"], serde_json::json!(["markets"]));
        assert_eq!(value["items"][2]["keywords"], serde_json::json!([]));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# hello\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hello\n");
    }
}
