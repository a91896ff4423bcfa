//! # Trending
//!
//! Groups recent verification records by summary and ranks the groups.
//!
//! - Grouping key is the trimmed, lowercased summary
//! - The display label is the first raw summary seen for a key
//! - Ranking is by count, ties keep the order groups were first formed
//! - Records without a summary are skipped
//! - Records without a usable score count toward the group but not its mean
//!
//! Scores are expected to be in `[0, 100]`. This is not checked here.
use std::collections::{HashMap, hash_map::Entry};

use crate::models::{TrendingTopic, VerificationRecord};

struct Group {
    label: String,
    count: usize,
    score_sum: f64,
    scored: usize,
}

pub fn normalize(summary: &str) -> String {
    summary.trim().to_lowercase()
}

pub fn compute_trending(records: &[VerificationRecord], limit: usize) -> Vec<TrendingTopic> {
    if limit == 0 {
        return Vec::new();
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for record in records {
        let Some(summary) = record.summary.as_deref() else {
            continue;
        };

        let key = normalize(summary);
        if key.is_empty() {
            continue;
        }

        let slot = match index.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                groups.push(Group {
                    label: summary.to_string(),
                    count: 0,
                    score_sum: 0.0,
                    scored: 0,
                });
                *entry.insert(groups.len() - 1)
            }
        };

        let group = &mut groups[slot];
        group.count += 1;

        if let Some(score) = record.score.filter(|s| s.is_finite()) {
            group.score_sum += score;
            group.scored += 1;
        }
    }

    // stable, so equal counts stay in formation order
    groups.sort_by(|a, b| b.count.cmp(&a.count));

    groups
        .into_iter()
        .take(limit)
        .map(|group| TrendingTopic {
            average_score: average(group.score_sum, group.scored),
            summary: group.label,
            count: group.count,
        })
        .collect()
}

fn average(sum: f64, n: usize) -> u32 {
    if n == 0 {
        return 0;
    }

    // half rounds up, same as for the non-negative scores we expect
    (sum / n as f64 + 0.5).floor().max(0.0) as u32
}
