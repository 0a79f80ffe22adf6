//! Schema validation between loosely-typed model output and the core types.
//!
//! Model output is never trusted: every field is checked, non-conformant
//! values are dropped or reported as [`FieldError`]s.

use crate::brain::Generation;
use crate::error::FieldError;
use crate::providers::openai_compat::strip_code_fences;
use crate::types::{ClassificationCode, Narrative, NoveltySignal, PlanLabel, ReferenceOverlap, SearchPlan};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Structured value of a generation, falling back to parsing its text.
pub fn structured_value(generation: &Generation) -> Result<Value, FieldError> {
    if let Some(value) = &generation.structured {
        return Ok(value.clone());
    }
    serde_json::from_str(strip_code_fences(&generation.text))
        .map_err(|e| FieldError::new("$", format!("output is not valid JSON: {e}")))
}

/// A plan that passed validation, plus the codes dropped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPlan {
    pub plan: SearchPlan,
    pub dropped_codes: Vec<String>,
}

/// Validate the planner object for one label.
pub fn parse_plan(root: &Value, label: PlanLabel) -> Result<ValidatedPlan, Vec<FieldError>> {
    let key = label.schema_key();
    let Some(object) = root.get(key).and_then(Value::as_object) else {
        return Err(vec![FieldError::missing(key)]);
    };

    let mut errors = Vec::new();

    let keywords = object
        .get("technical_keywords")
        .map(string_list)
        .map(dedup_keywords)
        .unwrap_or_default();
    if keywords.is_empty() {
        errors.push(FieldError::missing(format!("{key}.technical_keywords")));
    }

    let hypothetical_abstract = object
        .get("hyde_abstract")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if hypothetical_abstract.is_empty() {
        errors.push(FieldError::missing(format!("{key}.hyde_abstract")));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut codes = BTreeSet::new();
    let mut dropped_codes = Vec::new();
    if let Some(raw_codes) = object.get("cpc_codes") {
        let items: Vec<Value> = match raw_codes {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        for item in items {
            match item.as_str().and_then(ClassificationCode::parse) {
                Some(code) => {
                    codes.insert(code);
                }
                None => dropped_codes.push(match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            }
        }
    }

    Ok(ValidatedPlan {
        plan: SearchPlan::new(label, keywords, hypothetical_abstract.to_string(), codes),
        dropped_codes,
    })
}

/// Strings from an array, or from a comma-separated string.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Trim, drop blanks, and remove case-insensitive duplicates keeping first order.
pub fn dedup_keywords(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

/// The analyst's output after shape validation, before citation checks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftReport {
    pub narrative: Narrative,
    pub cited_ids: Vec<String>,
}

/// Validate the analyst's structured output.
///
/// Only `summary` is required; the other sections default to empty or
/// `Undetermined`. Malformed overlap entries are dropped.
pub fn parse_report(root: &Value) -> Result<DraftReport, Vec<FieldError>> {
    let Some(object) = root.as_object() else {
        return Err(vec![FieldError::new("$", "expected a JSON object")]);
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if summary.is_empty() {
        return Err(vec![FieldError::missing("summary")]);
    }

    let overlaps = object
        .get("overlaps")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_overlap).collect())
        .unwrap_or_default();

    let differentiators = object
        .get("differentiators")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();

    let novelty = object
        .get("novelty")
        .and_then(Value::as_str)
        .and_then(NoveltySignal::parse)
        .unwrap_or_default();

    let conclusion = object
        .get("conclusion")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let cited_ids = object
        .get("cited_ids")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    Ok(DraftReport {
        narrative: Narrative {
            summary: summary.to_string(),
            overlaps,
            differentiators,
            novelty,
            conclusion,
        },
        cited_ids,
    })
}

fn parse_overlap(value: &Value) -> Option<ReferenceOverlap> {
    let document_id = value.get("document_id")?.as_str()?.trim();
    let analysis = value.get("analysis")?.as_str()?.trim();
    if document_id.is_empty() || analysis.is_empty() {
        return None;
    }
    Some(ReferenceOverlap {
        document_id: document_id.to_string(),
        title: value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        analysis: analysis.to_string(),
    })
}
