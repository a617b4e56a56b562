//! Aggregated change summary: folds every live (non-reverted) change log entry into
//! per-category highlights, totals, an interview-prep hint and section touch counts.
//!
//! Pure and idempotent: the same entry list always yields the same summary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::improvements::categorize::{
    category_position, extend_unique, push_unique, CATEGORY_TABLE, TRANSITION_ARROW,
};
use crate::improvements::models::{ChangeLogEntry, SectionTouch};

const GENERIC_INTERVIEW_PREP: &str =
    "Review each accepted change so you can speak to it confidently in interviews.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryHighlight {
    pub key: String,
    pub label: String,
    pub description: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// `before → after` transitions. Only designation renders pairs this way.
    pub changed: Vec<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub entry_count: usize,
    pub category_count: usize,
    pub added_count: usize,
    pub removed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSummary {
    pub categories: Vec<CategoryHighlight>,
    pub totals: SummaryTotals,
    pub interview_prep: String,
    pub sections_touched: Vec<SectionTouch>,
}

#[derive(Default)]
struct HighlightAcc {
    key: String,
    label: String,
    description: String,
    added: Vec<String>,
    removed: Vec<String>,
    changed: Vec<String>,
    reasons: Vec<String>,
}

impl HighlightAcc {
    fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.reasons.is_empty()
    }

    fn finish(self) -> CategoryHighlight {
        CategoryHighlight {
            key: self.key,
            label: self.label,
            description: self.description,
            added: self.added,
            removed: self.removed,
            changed: self.changed,
            reasons: self.reasons,
        }
    }
}

pub fn build_aggregated_summary(entries: &[ChangeLogEntry]) -> AggregatedSummary {
    let live: Vec<&ChangeLogEntry> = entries.iter().filter(|e| !e.reverted).collect();

    // Known categories sort by table position; unknown keys trail, ordered by key.
    let mut highlights: BTreeMap<(usize, String), HighlightAcc> = BTreeMap::new();
    let mut added_items: BTreeSet<&str> = BTreeSet::new();
    let mut removed_items: BTreeSet<&str> = BTreeSet::new();
    let mut sections: Vec<SectionTouch> = Vec::new();

    for entry in &live {
        for category in &entry.categories {
            let position = category_position(&category.key).unwrap_or(CATEGORY_TABLE.len());
            let acc = highlights
                .entry((position, category.key.clone()))
                .or_insert_with(|| HighlightAcc {
                    key: category.key.clone(),
                    label: category.label.clone(),
                    description: category.description.clone(),
                    ..HighlightAcc::default()
                });

            if category.key == "designation" {
                let paired = category.added.len().min(category.removed.len());
                for (before, after) in category.removed.iter().zip(&category.added) {
                    push_unique(
                        &mut acc.changed,
                        &format!("{before}{TRANSITION_ARROW}{after}"),
                    );
                }
                extend_unique(&mut acc.added, &category.added[paired..]);
                extend_unique(&mut acc.removed, &category.removed[paired..]);
            } else {
                extend_unique(&mut acc.added, &category.added);
                extend_unique(&mut acc.removed, &category.removed);
            }
            extend_unique(&mut acc.reasons, &category.reasons);
        }

        added_items.extend(entry.added_items.iter().map(String::as_str));
        removed_items.extend(entry.removed_items.iter().map(String::as_str));

        for touch in &entry.sections_touched {
            match sections.iter_mut().find(|t| t.section == touch.section) {
                Some(existing) => existing.count += touch.count,
                None => sections.push(touch.clone()),
            }
        }
    }

    let categories: Vec<CategoryHighlight> = highlights
        .into_values()
        .filter(|acc| !acc.is_empty())
        .map(HighlightAcc::finish)
        .collect();

    let interview_prep = interview_prep_sentence(&categories);

    AggregatedSummary {
        totals: SummaryTotals {
            entry_count: live.len(),
            category_count: categories.len(),
            added_count: added_items.len(),
            removed_count: removed_items.len(),
        },
        categories,
        interview_prep,
        sections_touched: sections,
    }
}

fn interview_prep_sentence(categories: &[CategoryHighlight]) -> String {
    let new_skills = categories
        .iter()
        .find(|c| c.key == "skills")
        .map(|c| c.added.as_slice())
        .unwrap_or_default();

    match new_skills {
        [] => GENERIC_INTERVIEW_PREP.to_string(),
        [only] => format!("Be ready to discuss hands-on experience with {only}."),
        [rest @ .., last] => format!(
            "Be ready to discuss hands-on experience with {} and {last}.",
            rest.join(", ")
        ),
    }
}
