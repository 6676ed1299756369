//! Pure projections from workflow state to what a UI should show.
//!
//! The fraud-check narrative is copied into a view only for roles that may see it.
//! Restricted views carry no field for it at all, so no serialization can leak it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    analysis::AnalysisResult,
    draft::{ClaimDraft, ImageBlob},
    session::Role,
    task::TaskState,
};

pub const GENERATING_PLACEHOLDER: &str = "AI is writing a description...";
pub const DESCRIPTION_PROMPT: &str = "Click the \"Generate AI Description\" button above. The description will appear here and cannot be edited.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum RenderState {
    /// Nothing submitted yet.
    Initial,
    Loading,
    Error { message: String },
    Report(ReportView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub overall_severity: String,
    pub total_estimated_cost: f64,
    pub total_estimated_cost_display: String,
    pub damaged_parts: Vec<PartRow>,
    pub original_image: ImageBlob,
    pub highlighted_image: ImageBlob,
    pub analyzed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_check: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartRow {
    pub part_name: String,
    pub severity: String,
    pub estimated_cost: f64,
    pub estimated_cost_display: String,
    pub reasoning: String,
}

/// Project the analysis task's state for a viewer with `role`.
pub fn present(state: &TaskState<AnalysisResult>, role: Role) -> RenderState {
    match state {
        TaskState::Idle => RenderState::Initial,
        TaskState::Running => RenderState::Loading,
        TaskState::Failed(message) => RenderState::Error {
            message: message.clone(),
        },
        TaskState::Succeeded(result) => RenderState::Report(report_view(result, role)),
    }
}

fn report_view(result: &AnalysisResult, role: Role) -> ReportView {
    let fraud_check = if role.can_view_fraud_check() && !result.fraud_narrative().is_empty() {
        Some(result.fraud_narrative().to_string())
    } else {
        None
    };

    ReportView {
        overall_severity: result.overall_severity().to_string(),
        total_estimated_cost: result.total_estimated_cost(),
        total_estimated_cost_display: format_currency(result.total_estimated_cost()),
        damaged_parts: result
            .damaged_parts()
            .iter()
            .map(|part| PartRow {
                part_name: part.part_name.clone(),
                severity: part.severity.clone(),
                estimated_cost: part.estimated_cost,
                estimated_cost_display: format_currency(part.estimated_cost),
                reasoning: part.reasoning.clone(),
            })
            .collect(),
        original_image: result.source_image().clone(),
        highlighted_image: result.highlighted_image().clone(),
        analyzed_at: result.analyzed_at(),
        fraud_check,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DescriptionPanel {
    /// Read-only placeholder while generation runs.
    Generating,
    Text(String),
    Prompt,
}

impl DescriptionPanel {
    pub fn display_text(&self) -> &str {
        match self {
            DescriptionPanel::Generating => GENERATING_PLACEHOLDER,
            DescriptionPanel::Text(text) => text,
            DescriptionPanel::Prompt => DESCRIPTION_PROMPT,
        }
    }
}

/// What the claim form shows and which actions are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub has_image: bool,
    pub description: DescriptionPanel,
    /// Why the last description generation failed, until the next attempt or image swap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_error: Option<String>,
    pub can_generate: bool,
    pub can_submit: bool,
    pub submit_label: &'static str,
    pub generate_label: &'static str,
}

pub fn form_view(
    draft: &ClaimDraft,
    description: &TaskState<String>,
    analysis: &TaskState<AnalysisResult>,
) -> FormView {
    let generating = description.is_running();
    let analyzing = analysis.is_running();

    let panel = if generating {
        DescriptionPanel::Generating
    } else if !draft.description().is_empty() {
        DescriptionPanel::Text(draft.description().to_string())
    } else {
        DescriptionPanel::Prompt
    };

    FormView {
        has_image: draft.image().is_some(),
        description: panel,
        description_error: description.failure().map(str::to_string),
        can_generate: draft.image().is_some() && !generating && draft.description().is_empty(),
        can_submit: !analyzing && draft.is_submittable(),
        submit_label: if analyzing { "Analyzing..." } else { "Run Assessment" },
        generate_label: if generating {
            "Generating..."
        } else {
            "Generate AI Description"
        },
    }
}

/// `1200.0` -> `$1,200`, `1234.5` -> `$1,234.5`. Up to three fraction digits, trailing
/// zeros dropped, the way `en-US` number formatting shows them.
pub fn format_currency(amount: f64) -> String {
    let millis = (amount.abs() * 1000.0).round() as u64;
    let whole = (millis / 1000).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && millis > 0 { "-" } else { "" };
    let fraction = format!("{:03}", millis % 1000);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{sign}${grouped}")
    } else {
        format!("{sign}${grouped}.{fraction}")
    }
}
