//! Core data model: search plans, retrieved documents, the grounding set, and
//! the final report.

use crate::trace::AnalysisTrace;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use uuid::Uuid;

/// Which retrieval strategy a search plan implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanLabel {
    /// Broad search over the general field of the invention.
    BaseTechnology,
    /// Narrow search over the specific improvements being claimed.
    NovelFeatures,
}

impl PlanLabel {
    /// Every label, in generation order.
    pub const ALL: [PlanLabel; 2] = [PlanLabel::BaseTechnology, PlanLabel::NovelFeatures];

    /// Key of this plan's object in the planner's structured output.
    pub fn schema_key(&self) -> &'static str {
        match self {
            PlanLabel::BaseTechnology => "base_technology_search",
            PlanLabel::NovelFeatures => "novel_features_search",
        }
    }

    /// Instruction given to the model for this plan.
    pub fn guidance(&self) -> &'static str {
        match self {
            PlanLabel::BaseTechnology => {
                "Artifacts for the general field of the invention. This search should be broad \
                 to find foundational patents."
            }
            PlanLabel::NovelFeatures => {
                "Artifacts for the specific, new improvements the user is claiming. This search \
                 should be narrow and specific."
            }
        }
    }
}

impl std::fmt::Display for PlanLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanLabel::BaseTechnology => write!(f, "base-technology"),
            PlanLabel::NovelFeatures => write!(f, "novel-features"),
        }
    }
}

static CPC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-HY][0-9]{2}[A-Z][0-9]{1,4}/[0-9]{1,6}$")
        .expect("classification code pattern is valid")
});

/// A validated CPC-style classification code in compact canonical form
/// (`H01L31/18`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassificationCode(String);

impl ClassificationCode {
    /// Canonicalise and validate a raw code. Whitespace is removed and letters
    /// are upper-cased, so `"h01l 31/18"` parses as `H01L31/18`.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect();
        CPC_PATTERN.is_match(&compact).then_some(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClassificationCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("malformed classification code '{value}'"))
    }
}

impl From<ClassificationCode> for String {
    fn from(code: ClassificationCode) -> Self {
        code.0
    }
}

/// One structured retrieval strategy derived from the idea text.
///
/// Only the planner constructs plans; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    label: PlanLabel,
    keywords: Vec<String>,
    hypothetical_abstract: String,
    classification_codes: BTreeSet<ClassificationCode>,
}

impl SearchPlan {
    pub(crate) fn new(
        label: PlanLabel,
        keywords: Vec<String>,
        hypothetical_abstract: String,
        classification_codes: BTreeSet<ClassificationCode>,
    ) -> Self {
        Self {
            label,
            keywords,
            hypothetical_abstract,
            classification_codes,
        }
    }

    pub fn label(&self) -> PlanLabel {
        self.label
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn hypothetical_abstract(&self) -> &str {
        &self.hypothetical_abstract
    }

    pub fn classification_codes(&self) -> &BTreeSet<ClassificationCode> {
        &self.classification_codes
    }
}

/// A document returned by one plan's hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub document_id: String,
    pub title: String,
    pub snippet: String,
    pub classification_codes: Vec<String>,
    pub score: f32,
    pub source_plan: PlanLabel,
}

/// Score a document received from one contributing plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanScore {
    pub plan: PlanLabel,
    pub score: f32,
}

/// A grounding-set member: display fields from the first plan that found it,
/// scores from every plan that did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedDocument {
    pub document: RetrievedDocument,
    pub scores: Vec<PlanScore>,
}

impl GroundedDocument {
    pub fn id(&self) -> &str {
        &self.document.document_id
    }

    /// Best score across contributing plans.
    pub fn best_score(&self) -> f32 {
        self.scores
            .iter()
            .map(|s| s.score)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn plans(&self) -> Vec<PlanLabel> {
        self.scores.iter().map(|s| s.plan).collect()
    }
}

/// Deduplicated evidence the synthesizer may cite, in citation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingSet {
    documents: Vec<GroundedDocument>,
}

impl GroundingSet {
    /// Built by the merger, which guarantees id uniqueness.
    pub(crate) fn from_unique(documents: Vec<GroundedDocument>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &[GroundedDocument] {
        &self.documents
    }

    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(GroundedDocument::id).collect()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.iter().any(|d| d.id() == document_id)
    }

    pub fn get(&self, document_id: &str) -> Option<&GroundedDocument> {
        self.documents.iter().find(|d| d.id() == document_id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Coarse signal of how much the retrieved prior art overlaps the idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltySignal {
    SignificantOverlap,
    PartialOverlap,
    LikelyNovel,
    #[default]
    Undetermined,
}

impl NoveltySignal {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "significant_overlap" | "significant" | "high_overlap" => {
                Some(NoveltySignal::SignificantOverlap)
            }
            "partial_overlap" | "partial" | "moderate_overlap" => {
                Some(NoveltySignal::PartialOverlap)
            }
            "likely_novel" | "novel" | "low_overlap" => Some(NoveltySignal::LikelyNovel),
            "undetermined" | "unknown" => Some(NoveltySignal::Undetermined),
            _ => None,
        }
    }
}

impl std::fmt::Display for NoveltySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoveltySignal::SignificantOverlap => write!(f, "significant overlap"),
            NoveltySignal::PartialOverlap => write!(f, "partial overlap"),
            NoveltySignal::LikelyNovel => write!(f, "likely novel"),
            NoveltySignal::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// Overlap analysis for one cited reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOverlap {
    pub document_id: String,
    pub title: String,
    pub analysis: String,
}

/// The structured sections of the analyst's report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub overlaps: Vec<ReferenceOverlap>,
    pub differentiators: Vec<String>,
    pub novelty: NoveltySignal,
    pub conclusion: String,
}

/// Whether the report was grounded in retrieved evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Grounded,
    NoPriorArtFound,
}

/// Grounding-set entry as exposed to report consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSummary {
    pub document_id: String,
    pub title: String,
    pub classification_codes: Vec<String>,
    pub best_score: f32,
    pub plans: Vec<PlanLabel>,
}

impl From<&GroundedDocument> for ReferenceSummary {
    fn from(doc: &GroundedDocument) -> Self {
        Self {
            document_id: doc.document.document_id.clone(),
            title: doc.document.title.clone(),
            classification_codes: doc.document.classification_codes.clone(),
            best_score: doc.best_score(),
            plans: doc.plans(),
        }
    }
}

/// Terminal artifact of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub idea: String,
    pub outcome: ReportOutcome,
    pub narrative: Narrative,
    /// Always a subset of `references`' ids, in grounding order.
    pub cited_ids: Vec<String>,
    pub references: Vec<ReferenceSummary>,
    pub plans: Vec<SearchPlan>,
    pub trace: AnalysisTrace,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Ids of every document the synthesis was allowed to cite.
    pub fn grounding_ids(&self) -> Vec<&str> {
        self.references
            .iter()
            .map(|r| r.document_id.as_str())
            .collect()
    }

    pub fn plan_labels(&self) -> Vec<PlanLabel> {
        self.plans.iter().map(SearchPlan::label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_code_canonical_form() {
        let code = ClassificationCode::parse("h01l 31/18").unwrap();
        assert_eq!(code.as_str(), "H01L31/18");
        assert_eq!(
            ClassificationCode::parse("Y02E10/549").unwrap().as_str(),
            "Y02E10/549"
        );
        assert_eq!(
            ClassificationCode::parse(" C08J 2300/16 ").unwrap().as_str(),
            "C08J2300/16"
        );
    }

    #[test]
    fn test_classification_code_rejects_malformed() {
        for raw in ["", "H01L", "H01L 31", "Z01L 31/18", "H1L 31/18", "H01L31/18x", "G06N-3/08"] {
            assert!(ClassificationCode::parse(raw).is_none(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_classification_code_serde() {
        let code: ClassificationCode = serde_json::from_str("\"G06N 3/08\"").unwrap();
        assert_eq!(code.as_str(), "G06N3/08");
        assert!(serde_json::from_str::<ClassificationCode>("\"nonsense\"").is_err());
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"G06N3/08\"");
    }

    #[test]
    fn test_plan_label_display_and_serde() {
        assert_eq!(PlanLabel::BaseTechnology.to_string(), "base-technology");
        assert_eq!(
            serde_json::to_string(&PlanLabel::NovelFeatures).unwrap(),
            "\"novel-features\""
        );
        assert_eq!(PlanLabel::ALL[0].schema_key(), "base_technology_search");
    }

    #[test]
    fn test_best_score_takes_max() {
        let doc = GroundedDocument {
            document: RetrievedDocument {
                document_id: "US1".into(),
                title: "t".into(),
                snippet: "s".into(),
                classification_codes: vec![],
                score: 0.4,
                source_plan: PlanLabel::BaseTechnology,
            },
            scores: vec![
                PlanScore {
                    plan: PlanLabel::BaseTechnology,
                    score: 0.4,
                },
                PlanScore {
                    plan: PlanLabel::NovelFeatures,
                    score: 0.9,
                },
            ],
        };
        assert!((doc.best_score() - 0.9).abs() < f32::EPSILON);
        assert_eq!(
            doc.plans(),
            vec![PlanLabel::BaseTechnology, PlanLabel::NovelFeatures]
        );
    }

    #[test]
    fn test_novelty_signal_parse() {
        assert_eq!(
            NoveltySignal::parse("Significant Overlap"),
            Some(NoveltySignal::SignificantOverlap)
        );
        assert_eq!(
            NoveltySignal::parse("likely-novel"),
            Some(NoveltySignal::LikelyNovel)
        );
        assert_eq!(NoveltySignal::parse("maybe"), None);
    }
}
