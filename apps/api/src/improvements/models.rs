use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Suggestions
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Skills,
    Summary,
    Experience,
    Designation,
    Certifications,
    Projects,
    Highlights,
    /// "Apply everything": a bundled rewrite of the whole document.
    ApplyAll,
}

impl SuggestionType {
    pub fn label(&self) -> &'static str {
        match self {
            SuggestionType::Skills => "Skills",
            SuggestionType::Summary => "Summary",
            SuggestionType::Experience => "Experience",
            SuggestionType::Designation => "Designation",
            SuggestionType::Certifications => "Certifications",
            SuggestionType::Projects => "Projects",
            SuggestionType::Highlights => "Highlights",
            SuggestionType::ApplyAll => "All Sections",
        }
    }

    /// Types whose excerpts are comma/line separated lists rather than prose.
    pub fn is_list_like(&self) -> bool {
        matches!(
            self,
            SuggestionType::Skills | SuggestionType::Certifications | SuggestionType::Highlights
        )
    }
}

/// Tri-state acceptance. `Undecided` is a long-lived state of its own, not a default boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceState {
    #[default]
    Undecided,
    Accepted,
    Rejected,
}

impl std::fmt::Display for AcceptanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AcceptanceState::Undecided => "undecided",
            AcceptanceState::Accepted => "accepted",
            AcceptanceState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Skipped,
    Unknown,
}

/// Job-alignment verdict attached to a suggestion by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: ValidationStatus,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    pub reason: Option<String>,
}

/// Caller-supplied diff fragment for one document section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarySegment {
    pub section: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub title: String,
    #[serde(default)]
    pub before_excerpt: String,
    #[serde(default)]
    pub after_excerpt: String,
    /// Full document text once this suggestion is applied.
    pub updated_text: String,
    pub confidence: f64,
    #[serde(default)]
    pub acceptance: AcceptanceState,
    pub validation: Option<ValidationVerdict>,
    #[serde(default)]
    pub segments: Vec<SummarySegment>,
    pub explanation: Option<String>,
    pub rescore_summary: Option<RescoreSummary>,
    pub score_delta: Option<f64>,
    #[serde(default)]
    pub rescore_pending: bool,
    pub rescore_error: Option<String>,
}

impl ImprovementSuggestion {
    pub fn validation_failed(&self) -> bool {
        self.validation
            .as_ref()
            .is_some_and(|v| v.status == ValidationStatus::Failed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Change log
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Rephrased,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemChangeKind {
    Added,
    Removed,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemizedChange {
    pub item: String,
    pub kind: ItemChangeKind,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Changes grouped by semantic category rather than by document section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryChangelog {
    pub key: String,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTouch {
    pub section: String,
    pub count: usize,
}

/// Persisted record of one accepted edit. Append/mark-only: reverts flag it, never delete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Shared with the originating suggestion and its history snapshot.
    pub id: String,
    pub title: String,
    pub label: ChangeType,
    pub detail: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub segments: Vec<SummarySegment>,
    #[serde(default)]
    pub added_items: Vec<String>,
    #[serde(default)]
    pub removed_items: Vec<String>,
    #[serde(default)]
    pub itemized: Vec<ItemizedChange>,
    #[serde(default)]
    pub categories: Vec<CategoryChangelog>,
    #[serde(default)]
    pub sections_touched: Vec<SectionTouch>,
    pub score_delta: Option<f64>,
    #[serde(default)]
    pub reverted: bool,
    pub reverted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Document and score state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdownItem {
    pub category: String,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionProbability {
    pub before: f64,
    pub after: f64,
    #[serde(default)]
    pub factors: Vec<String>,
}

/// The scorer's match object for the current document against the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub overall_score: f64,
    #[serde(default)]
    pub covered_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    pub selection_probability: Option<SelectionProbability>,
}

/// Everything the orchestrator treats as "the current document".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub text: String,
    pub match_result: Option<MatchResult>,
    #[serde(default)]
    pub score_breakdown: Vec<ScoreBreakdownItem>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl DocumentState {
    pub fn overall_score(&self) -> f64 {
        self.match_result
            .as_ref()
            .map(|m| m.overall_score)
            .unwrap_or(0.0)
    }

    pub fn missing_skills(&self) -> Vec<String> {
        self.match_result
            .as_ref()
            .map(|m| m.missing_skills.clone())
            .unwrap_or_default()
    }
}

/// Full state captured immediately before a suggestion is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeHistorySnapshot {
    pub document: DocumentState,
    pub change_log: Vec<ChangeLogEntry>,
}

/// Job the document is being tailored against. Passed through to the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_title: Option<String>,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// What the scoring oracle returns for one rescore call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescoreSummary {
    pub overall_score: f64,
    #[serde(default)]
    pub score_breakdown: Vec<ScoreBreakdownItem>,
    #[serde(default)]
    pub covered_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub selection_probability: SelectionProbability,
    /// Oracle-reported delta. Preferred over a locally computed difference.
    pub delta: Option<f64>,
}

impl RescoreSummary {
    pub fn delta_from(&self, baseline_score: f64) -> f64 {
        self.delta
            .unwrap_or(self.overall_score - baseline_score)
    }

    pub fn to_match_result(&self) -> MatchResult {
        MatchResult {
            overall_score: self.overall_score,
            covered_skills: self.covered_skills.clone(),
            missing_skills: self.missing_skills.clone(),
            selection_probability: Some(self.selection_probability.clone()),
        }
    }
}
