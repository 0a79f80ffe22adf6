//! Report rendering for the terminal and for exported files.

use chrono::{DateTime, TimeZone};
use priorart_core::trace::TraceEvent;
use priorart_core::types::{Report, ReportOutcome};
use std::fmt::Write;

/// Output format selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Text,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }
}

/// `patent_analysis_YYYYMMDD_HHMMSS.<ext>`
pub fn default_filename<Tz: TimeZone>(at: &DateTime<Tz>, format: OutputFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "patent_analysis_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn render(report: &Report, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Markdown => render_markdown(report),
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    })
}

/// One-line, human-readable description of a trace event.
pub fn describe_event(event: &TraceEvent) -> String {
    match event {
        TraceEvent::PlansGenerated { labels } => {
            let labels: Vec<String> = labels.iter().map(ToString::to_string).collect();
            format!("Generated search plans: {}", labels.join(", "))
        }
        TraceEvent::PlanRejected { label, errors } => {
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            format!("Rejected {label} plan: {}", errors.join("; "))
        }
        TraceEvent::CodesDropped { label, codes } => {
            format!("Dropped malformed codes from {label} plan: {}", codes.join(", "))
        }
        TraceEvent::FilterRelaxed {
            label,
            filtered_results,
            threshold,
        } => format!(
            "Relaxed classification filter for {label} plan ({filtered_results} results, wanted {threshold})"
        ),
        TraceEvent::RelaxedQueryFailed { label, error } => {
            format!("Unfiltered retry for {label} plan failed: {error}")
        }
        TraceEvent::RetrievalDegraded { label, error } => {
            format!("Retrieval failed for {label} plan: {error}")
        }
        TraceEvent::GroundingCapped { kept, dropped } => format!(
            "Kept the {kept} strongest documents, dropped {}",
            dropped.join(", ")
        ),
        TraceEvent::CitationsStripped { ids } => {
            format!("Removed citations outside the evidence: {}", ids.join(", "))
        }
    }
}

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let n = &report.narrative;

    let _ = writeln!(out, "# Prior-Art Analysis Report\n");
    let _ = writeln!(
        out,
        "_Generated {} (report {})_\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.id
    );
    let _ = writeln!(out, "## Invention\n\n{}\n", report.idea);

    let _ = writeln!(out, "## Executive Summary\n\n{}\n", n.summary);
    let _ = writeln!(out, "**Novelty signal:** {}\n", n.novelty);

    if report.outcome == ReportOutcome::Grounded {
        let _ = writeln!(out, "## Key Technological Overlaps\n");
        if n.overlaps.is_empty() {
            let _ = writeln!(out, "No specific overlaps were identified.\n");
        }
        for overlap in &n.overlaps {
            let _ = writeln!(out, "### {}: {}\n\n{}\n", overlap.document_id, overlap.title, overlap.analysis);
        }

        let _ = writeln!(out, "## Potential Differentiators\n");
        if n.differentiators.is_empty() {
            let _ = writeln!(out, "None identified from the retrieved documents.\n");
        } else {
            for d in &n.differentiators {
                let _ = writeln!(out, "- {d}");
            }
            out.push('\n');
        }
    }

    if !n.conclusion.is_empty() {
        let _ = writeln!(out, "## Conclusion & Recommendation\n\n{}\n", n.conclusion);
    }

    if !report.references.is_empty() {
        let _ = writeln!(out, "## References\n");
        let _ = writeln!(out, "| | Document | Title | Best score | Plans |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for r in &report.references {
            let cited = if report.cited_ids.contains(&r.document_id) {
                "*"
            } else {
                ""
            };
            let plans: Vec<String> = r.plans.iter().map(ToString::to_string).collect();
            let _ = writeln!(
                out,
                "| {cited} | {} | {} | {:.3} | {} |",
                r.document_id,
                r.title,
                r.best_score,
                plans.join(", ")
            );
        }
        let _ = writeln!(out, "\n`*` cited in the analysis\n");
    }

    let _ = writeln!(out, "## Search Plans\n");
    for plan in &report.plans {
        let codes: Vec<&str> = plan.classification_codes().iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "### {}\n", plan.label());
        let _ = writeln!(out, "- **Keywords:** {}", plan.keywords().join(", "));
        let _ = writeln!(
            out,
            "- **Classification codes:** {}",
            if codes.is_empty() { "none".to_string() } else { codes.join(", ") }
        );
        let _ = writeln!(out, "- **Hypothetical abstract:** {}\n", plan.hypothetical_abstract());
    }

    if !report.trace.is_empty() {
        let _ = writeln!(out, "## Analysis Notes\n");
        for event in report.trace.events() {
            let marker = if event.is_degraded() { " (degraded)" } else { "" };
            let _ = writeln!(out, "- {}{marker}", describe_event(event));
        }
    }

    out
}

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let n = &report.narrative;

    let _ = writeln!(out, "PRIOR-ART ANALYSIS REPORT");
    let _ = writeln!(out, "Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "\nINVENTION\n{}", report.idea);
    let _ = writeln!(out, "\nEXECUTIVE SUMMARY\n{}", n.summary);
    let _ = writeln!(out, "Novelty signal: {}", n.novelty);

    if !n.overlaps.is_empty() {
        let _ = writeln!(out, "\nKEY TECHNOLOGICAL OVERLAPS");
        for overlap in &n.overlaps {
            let _ = writeln!(out, "* {} ({})\n  {}", overlap.document_id, overlap.title, overlap.analysis);
        }
    }
    if !n.differentiators.is_empty() {
        let _ = writeln!(out, "\nPOTENTIAL DIFFERENTIATORS");
        for d in &n.differentiators {
            let _ = writeln!(out, "* {d}");
        }
    }
    if !n.conclusion.is_empty() {
        let _ = writeln!(out, "\nCONCLUSION & RECOMMENDATION\n{}", n.conclusion);
    }
    if !report.cited_ids.is_empty() {
        let _ = writeln!(out, "\nCITED: {}", report.cited_ids.join(", "));
    }
    let labels: Vec<String> = report.plan_labels().iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "SEARCH PLANS: {}", labels.join(", "));
    if report.trace.is_degraded() {
        let _ = writeln!(out, "\nNOTES");
        for event in report.trace.events().filter(|e| e.is_degraded()) {
            let _ = writeln!(out, "* {}", describe_event(event));
        }
    }
    out
}
