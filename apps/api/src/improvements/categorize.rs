//! Change Categorization: turns a suggestion's before/after excerpts and caller-supplied
//! segments into an itemized, category-grouped change log entry.
//!
//! Pattern-based only. Section labels are matched against a fixed, ordered keyword table;
//! nothing here tries to understand the resume content.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::improvements::models::{
    CategoryChangelog, ChangeLogEntry, ChangeType, ImprovementSuggestion, ItemChangeKind,
    ItemizedChange, SectionTouch, SuggestionType, SummarySegment,
};

/// Separator used for positional `before → after` pairs.
pub const TRANSITION_ARROW: &str = " → ";

/// Leading markers stripped from excerpts before they are split into items.
const EXCERPT_MARKERS: &[&str] = &["added:", "add:", "removed:", "remove:", "new:"];

/// Suggestion types whose in-place edits are corrections rather than rewording.
const FIX_TYPES: &[SuggestionType] = &[SuggestionType::Designation, SuggestionType::Certifications];

// ────────────────────────────────────────────────────────────────────────────
// Category table
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CategoryDef {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    /// Lowercase substrings matched against a segment's section label.
    pub keywords: &'static [&'static str],
}

/// Ordered category table. Order here is the display order of aggregated summaries.
pub const CATEGORY_TABLE: &[CategoryDef] = &[
    CategoryDef {
        key: "skills",
        label: "Skills & Keywords",
        description: "Technical skills and job keywords added or removed",
        keywords: &["skill", "keyword", "technolog", "tool", "competenc", "stack"],
    },
    CategoryDef {
        key: "designation",
        label: "Designation",
        description: "Job title and headline alignment",
        keywords: &["designation", "title", "role", "position", "headline"],
    },
    CategoryDef {
        key: "summary",
        label: "Professional Summary",
        description: "Summary and profile statement",
        keywords: &["summary", "profile", "objective", "about"],
    },
    CategoryDef {
        key: "experience",
        label: "Experience",
        description: "Work history bullets and responsibilities",
        keywords: &["experience", "work", "employment", "responsibilit", "bullet"],
    },
    CategoryDef {
        key: "projects",
        label: "Projects",
        description: "Project descriptions and outcomes",
        keywords: &["project", "portfolio"],
    },
    CategoryDef {
        key: "certifications",
        label: "Certifications",
        description: "Certifications, licenses and courses",
        keywords: &["certif", "license", "credential", "course"],
    },
    CategoryDef {
        key: "highlights",
        label: "Highlights",
        description: "Achievements and stand-out accomplishments",
        keywords: &["highlight", "achievement", "accomplishment", "award"],
    },
    CategoryDef {
        key: "education",
        label: "Education",
        description: "Degrees and academic history",
        keywords: &["education", "degree", "academic", "university"],
    },
    CategoryDef {
        key: "general",
        label: "General",
        description: "Changes spanning the whole document",
        keywords: &[],
    },
];

/// Position of a category key in `CATEGORY_TABLE`, if it is a known key.
pub fn category_position(key: &str) -> Option<usize> {
    CATEGORY_TABLE.iter().position(|c| c.key == key)
}

fn category_by_key(key: &str) -> &'static CategoryDef {
    CATEGORY_TABLE
        .iter()
        .find(|c| c.key == key)
        .unwrap_or(&CATEGORY_TABLE[CATEGORY_TABLE.len() - 1])
}

/// Resolves a free-text section label to every category whose keywords it contains.
/// A label may map to several categories, or to none.
pub fn resolve_categories(section_label: &str) -> Vec<&'static CategoryDef> {
    let label = section_label.to_lowercase();
    CATEGORY_TABLE
        .iter()
        .filter(|c| c.keywords.iter().any(|kw| label.contains(kw)))
        .collect()
}

/// Category used when a segment's label matches nothing in the table.
pub fn default_category(suggestion_type: SuggestionType) -> &'static CategoryDef {
    let key = match suggestion_type {
        SuggestionType::Skills => "skills",
        SuggestionType::Summary => "summary",
        SuggestionType::Experience => "experience",
        SuggestionType::Designation => "designation",
        SuggestionType::Certifications => "certifications",
        SuggestionType::Projects => "projects",
        SuggestionType::Highlights => "highlights",
        SuggestionType::ApplyAll => "general",
    };
    category_by_key(key)
}

// ────────────────────────────────────────────────────────────────────────────
// Buckets
// ────────────────────────────────────────────────────────────────────────────

/// Per-category accumulator. Items keep first-seen order with case-sensitive
/// exact-string deduplication, so positional pairing stays meaningful downstream.
#[derive(Debug)]
pub struct CategoryBucket {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub reasons: Vec<String>,
}

impl CategoryBucket {
    fn new(def: &'static CategoryDef) -> Self {
        Self {
            key: def.key,
            label: def.label,
            description: def.description,
            added: Vec::new(),
            removed: Vec::new(),
            reasons: Vec::new(),
        }
    }

    fn absorb(&mut self, segment: &SummarySegment) {
        extend_unique(&mut self.added, &segment.added);
        extend_unique(&mut self.removed, &segment.removed);
        extend_unique(&mut self.reasons, &segment.reasons);
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.reasons.is_empty()
    }

    fn finalize(self) -> CategoryChangelog {
        CategoryChangelog {
            key: self.key.to_string(),
            label: self.label.to_string(),
            description: self.description.to_string(),
            added: self.added,
            removed: self.removed,
            reasons: self.reasons,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic change-type lookup from excerpt presence and suggestion type.
pub fn classify_change(suggestion: &ImprovementSuggestion) -> ChangeType {
    let before = suggestion.before_excerpt.trim();
    let after = suggestion.after_excerpt.trim();
    match (before.is_empty(), after.is_empty()) {
        (true, false) => ChangeType::Added,
        (false, true) => ChangeType::Removed,
        _ if FIX_TYPES.contains(&suggestion.suggestion_type) => ChangeType::Fixed,
        _ => ChangeType::Rephrased,
    }
}

fn default_detail(label: ChangeType, suggestion_type: SuggestionType) -> String {
    let section = suggestion_type.label();
    match label {
        ChangeType::Added => format!("Added to {section}"),
        ChangeType::Removed => format!("Removed from {section}"),
        ChangeType::Rephrased => format!("Rephrased {section}"),
        ChangeType::Fixed => format!("Fixed {section}"),
    }
}

fn strip_marker(text: &str) -> &str {
    let text = text.trim();
    for marker in EXCERPT_MARKERS {
        if text
            .get(..marker.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(marker))
        {
            return text[marker.len()..].trim();
        }
    }
    text
}

/// Splits an excerpt into items. List-like excerpts split on separators; prose stays whole.
pub fn parse_items(text: &str, list_like: bool) -> Vec<String> {
    let text = strip_marker(text);
    if text.is_empty() {
        return Vec::new();
    }
    if !list_like {
        return vec![text.to_string()];
    }
    let mut items = Vec::new();
    for part in text.split([',', ';', '\n', '•', '|']) {
        let item = part.trim().trim_start_matches(['-', '*']).trim();
        push_unique(&mut items, item);
    }
    items
}

/// Builds a segment from the excerpts when the caller supplied none.
fn fallback_segment(suggestion: &ImprovementSuggestion) -> SummarySegment {
    let list_like = suggestion.suggestion_type.is_list_like();
    let before = parse_items(&suggestion.before_excerpt, list_like);
    let after = parse_items(&suggestion.after_excerpt, list_like);

    let (added, removed) = if list_like {
        (
            after.iter().filter(|i| !before.contains(i)).cloned().collect(),
            before.iter().filter(|i| !after.contains(i)).cloned().collect(),
        )
    } else if before == after {
        (Vec::new(), Vec::new())
    } else {
        (after, before)
    };

    SummarySegment {
        section: suggestion.suggestion_type.label().to_string(),
        added,
        removed,
        reasons: suggestion.explanation.iter().cloned().collect(),
    }
}

fn clean_segment(segment: &SummarySegment) -> SummarySegment {
    let clean = |items: &[String]| {
        let mut out = Vec::new();
        for item in items {
            push_unique(&mut out, item.trim());
        }
        out
    };
    SummarySegment {
        section: segment.section.trim().to_string(),
        added: clean(&segment.added),
        removed: clean(&segment.removed),
        reasons: clean(&segment.reasons),
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, item: &str) {
    if !item.is_empty() && !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

pub(crate) fn extend_unique(list: &mut Vec<String>, items: &[String]) {
    for item in items {
        push_unique(list, item);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Itemized pairing
// ────────────────────────────────────────────────────────────────────────────

/// Pairs the first `min(added, removed)` items by index into `replaced` changes
/// (`"removed → added"`); the rest become plain additions or removals.
///
/// Index alignment only. Paired items are not checked for being "the same thing".
pub fn itemize_segment(segment: &SummarySegment) -> Vec<ItemizedChange> {
    let paired = segment.added.len().min(segment.removed.len());
    let mut changes = Vec::with_capacity(segment.added.len() + segment.removed.len() - paired);

    for (removed, added) in segment.removed.iter().zip(&segment.added).take(paired) {
        changes.push(ItemizedChange {
            item: format!("{removed}{TRANSITION_ARROW}{added}"),
            kind: ItemChangeKind::Replaced,
            reasons: segment.reasons.clone(),
        });
    }
    for added in &segment.added[paired..] {
        changes.push(ItemizedChange {
            item: added.clone(),
            kind: ItemChangeKind::Added,
            reasons: segment.reasons.clone(),
        });
    }
    for removed in &segment.removed[paired..] {
        changes.push(ItemizedChange {
            item: removed.clone(),
            kind: ItemChangeKind::Removed,
            reasons: segment.reasons.clone(),
        });
    }
    changes
}

fn merge_itemized(into: &mut Vec<ItemizedChange>, change: ItemizedChange) {
    match into
        .iter_mut()
        .find(|c| c.kind == change.kind && c.item == change.item)
    {
        Some(existing) => {
            for reason in &change.reasons {
                push_unique(&mut existing.reasons, reason);
            }
        }
        None => into.push(change),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entry construction
// ────────────────────────────────────────────────────────────────────────────

/// Builds the change log entry recorded when `suggestion` is accepted.
pub fn build_entry(suggestion: &ImprovementSuggestion, now: DateTime<Utc>) -> ChangeLogEntry {
    let label = classify_change(suggestion);

    let segments: Vec<SummarySegment> = if suggestion.segments.is_empty() {
        vec![fallback_segment(suggestion)]
    } else {
        suggestion.segments.iter().map(clean_segment).collect()
    };

    let mut buckets: BTreeMap<usize, CategoryBucket> = BTreeMap::new();
    let mut itemized = Vec::new();
    let mut added_items = Vec::new();
    let mut removed_items = Vec::new();
    let mut sections_touched: Vec<SectionTouch> = Vec::new();

    for segment in &segments {
        let mut categories = resolve_categories(&segment.section);
        if categories.is_empty() {
            categories.push(default_category(suggestion.suggestion_type));
        }
        for def in categories {
            let position = category_position(def.key).unwrap_or(CATEGORY_TABLE.len());
            buckets
                .entry(position)
                .or_insert_with(|| CategoryBucket::new(def))
                .absorb(segment);
        }

        for change in itemize_segment(segment) {
            merge_itemized(&mut itemized, change);
        }
        extend_unique(&mut added_items, &segment.added);
        extend_unique(&mut removed_items, &segment.removed);

        if !segment.section.is_empty() {
            match sections_touched
                .iter_mut()
                .find(|t| t.section == segment.section)
            {
                Some(touch) => touch.count += 1,
                None => sections_touched.push(SectionTouch {
                    section: segment.section.clone(),
                    count: 1,
                }),
            }
        }
    }

    let categories = buckets
        .into_values()
        .filter(|b| !b.is_empty())
        .map(CategoryBucket::finalize)
        .collect();

    ChangeLogEntry {
        id: suggestion.id.clone(),
        title: suggestion.title.clone(),
        label,
        detail: suggestion
            .explanation
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| default_detail(label, suggestion.suggestion_type)),
        before: suggestion.before_excerpt.clone(),
        after: suggestion.after_excerpt.clone(),
        segments,
        added_items,
        removed_items,
        itemized,
        categories,
        sections_touched,
        score_delta: None,
        reverted: false,
        reverted_at: None,
        created_at: now,
    }
}
