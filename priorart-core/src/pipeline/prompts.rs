//! Prompt templates and output schemas for the two generation calls.

use crate::types::{GroundingSet, PlanLabel};
use serde_json::{Map, Value, json};

pub const PLANNER_SYSTEM: &str = "You are an expert patent researcher. You turn invention \
descriptions into structured search artifacts for a patent database. Output JSON only, with no \
preamble or explanation.";

pub const ANALYST_SYSTEM: &str = "You are a professional patent analyst. You compare a client's \
proposed invention against retrieved prior art. Tone: professional, analytical, and objective. \
Output JSON only.";

/// Name of the planner's output schema.
pub const PLANNER_SCHEMA_NAME: &str = "search_plans";
/// Name of the synthesizer's output schema.
pub const ANALYST_SCHEMA_NAME: &str = "prior_art_report";

fn plan_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "technical_keywords": {"type": "array", "items": {"type": "string"}},
            "hyde_abstract": {"type": "string"},
            "cpc_codes": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["technical_keywords", "hyde_abstract", "cpc_codes"],
        "additionalProperties": false
    })
}

/// JSON schema for the planner: one object per requested label.
pub fn planner_schema(labels: &[PlanLabel]) -> Value {
    let mut properties = Map::new();
    for label in labels {
        properties.insert(label.schema_key().to_string(), plan_object_schema());
    }
    let required: Vec<&str> = labels.iter().map(PlanLabel::schema_key).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn planner_prompt(idea: &str, labels: &[PlanLabel]) -> String {
    let mut prompt = format!(
        "Analyze the invention description below and produce {} set(s) of search artifacts.\n\n",
        labels.len()
    );
    for (i, label) in labels.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. **{}**: {}\n",
            i + 1,
            label.schema_key(),
            label.guidance()
        ));
    }
    prompt.push_str(
        "\nFor each set, generate:\n\
         - technical_keywords: 5-7 specific technical keywords and synonyms.\n\
         - hyde_abstract: a one-paragraph hypothetical patent abstract for that part of the invention.\n\
         - cpc_codes: the 3-5 most likely Cooperative Patent Classification codes \
           (e.g. \"H01L 31/18\"). Leave the list empty if you have no confident guess.\n\n\
         If the idea is an improvement (e.g. \"a better solar panel\"), the base technology is \
         \"solar panel\" and the novel features are the improvement.\n\n",
    );
    prompt.push_str(&format!("**Invention description:**\n\"{}\"\n", idea.trim()));
    prompt
}

/// JSON schema for the analyst report.
pub fn analyst_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string"},
            "overlaps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "document_id": {"type": "string"},
                        "title": {"type": "string"},
                        "analysis": {"type": "string"}
                    },
                    "required": ["document_id", "title", "analysis"],
                    "additionalProperties": false
                }
            },
            "differentiators": {"type": "array", "items": {"type": "string"}},
            "novelty": {
                "type": "string",
                "enum": ["significant_overlap", "partial_overlap", "likely_novel", "undetermined"]
            },
            "conclusion": {"type": "string"},
            "cited_ids": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["summary", "overlaps", "differentiators", "novelty", "conclusion", "cited_ids"],
        "additionalProperties": false
    })
}

/// Render the grounding set as numbered context blocks.
pub fn format_grounding(grounding: &GroundingSet) -> String {
    grounding
        .documents()
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let d = &doc.document;
            let codes = if d.classification_codes.is_empty() {
                "none".to_string()
            } else {
                d.classification_codes.join(", ")
            };
            format!(
                "[{}] Document ID: {}\nTitle: {}\nCPC codes: {}\nAbstract: {}",
                i + 1,
                d.document_id,
                d.title,
                codes,
                d.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn analyst_prompt(idea: &str, grounding: &GroundingSet) -> String {
    format!(
        "**Client's invention description:**\n---\n{}\n---\n\n\
         **Retrieved prior art documents:**\n---\n{}\n---\n\n\
         Produce a report with these sections:\n\
         1. summary: a brief executive summary stating whether the prior art shows significant \
            overlap with the client's idea.\n\
         2. overlaps: for each relevant document, its document_id, title, and the specific \
            technologies that overlap with the invention.\n\
         3. differentiators: aspects of the idea that do not appear in the retrieved prior art, \
            based only on the documents above.\n\
         4. novelty: one of significant_overlap, partial_overlap, likely_novel, undetermined.\n\
         5. conclusion: a final assessment and recommendation.\n\
         6. cited_ids: every document id your analysis relies on.\n\n\
         Ground every claim in a document listed above. Cite only the document ids shown; \
         never cite documents that are not in the list.",
        idea.trim(),
        format_grounding(grounding)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_schema_follows_labels() {
        let schema = planner_schema(&[PlanLabel::BaseTechnology]);
        assert!(schema["properties"]["base_technology_search"].is_object());
        assert!(schema["properties"].get("novel_features_search").is_none());
        assert_eq!(schema["required"], json!(["base_technology_search"]));
    }

    #[test]
    fn test_planner_prompt_mentions_each_label() {
        let prompt = planner_prompt("  a foldable kayak ", &PlanLabel::ALL);
        assert!(prompt.contains("base_technology_search"));
        assert!(prompt.contains("novel_features_search"));
        assert!(prompt.contains("\"a foldable kayak\""));
    }

    #[test]
    fn test_format_grounding_empty() {
        assert_eq!(format_grounding(&GroundingSet::default()), "");
        assert!(analyst_prompt("idea", &GroundingSet::default()).contains("idea"));
    }

    #[test]
    fn test_analyst_schema_requires_summary() {
        let schema = analyst_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("summary")));
        assert!(required.contains(&json!("cited_ids")));
    }
}
