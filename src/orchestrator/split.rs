//! Splitting raw submissions into analysis blocks.

use serde::{Deserialize, Serialize};

/// How raw text is cut into blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Blocks are separated by one or more empty lines.
    #[default]
    BlankLine,
    /// Every non-empty line is a block.
    Line,
    /// Blocks are separated by lines consisting of this marker.
    Marker(String),
}

/// Split `raw` into trimmed, non-empty blocks.
pub fn split_blocks(raw: &str, policy: &SplitPolicy) -> Vec<String> {
    match policy {
        SplitPolicy::Line => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        SplitPolicy::BlankLine => split_on(raw, |line| line.trim().is_empty()),
        SplitPolicy::Marker(marker) => {
            let marker = marker.trim();
            split_on(raw, |line| line.trim() == marker)
        }
    }
}

fn split_on(raw: &str, is_separator: impl Fn(&str) -> bool) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if is_separator(line) {
            push_block(&mut blocks, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_block(&mut blocks, &current);

    blocks
}

fn push_block(blocks: &mut Vec<String>, lines: &[&str]) {
    let block = lines.join("\n");
    let block = block.trim();
    if !block.is_empty() {
        blocks.push(block.to_string());
    }
}
