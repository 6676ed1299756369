use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    backend::{ClaimsBackend, bounded},
    draft::{ClaimDraft, ImageBlob, lock_draft},
    error::{BackendError, ClaimError, Result},
    task::{TaskCell, TaskState},
};

pub const ANALYSIS_FALLBACK: &str = "Analysis failed on the server.";
pub const SUBMIT_REQUIRES: &str =
    "Please upload an image and provide or generate a damage description.";
pub const SUPERSEDED: &str = "the analysis was superseded before it completed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamagedPart {
    pub part_name: String,
    pub severity: String,
    pub estimated_cost: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageReport {
    pub overall_severity: String,
    pub total_estimated_cost: f64,
    pub damaged_parts: Vec<DamagedPart>,
}

impl DamageReport {
    /// Reject costs that cannot be right: negative or not finite.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !is_valid_cost(self.total_estimated_cost) {
            return Err(format!(
                "totalEstimatedCost must be a non-negative number, got {}",
                self.total_estimated_cost
            ));
        }
        for part in &self.damaged_parts {
            if !is_valid_cost(part.estimated_cost) {
                return Err(format!(
                    "estimatedCost for {} must be a non-negative number, got {}",
                    part.part_name, part.estimated_cost
                ));
            }
        }
        Ok(())
    }
}

fn is_valid_cost(cost: f64) -> bool {
    cost.is_finite() && cost >= 0.0
}

/// The three outputs of one analysis call, as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPayload {
    pub report: DamageReport,
    pub highlighted_image: ImageBlob,
    pub fraud_check: String,
}

/// Outcome of a successful analysis. Built in one step and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    report: DamageReport,
    source_image: ImageBlob,
    highlighted_image: ImageBlob,
    fraud_narrative: String,
    analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(payload: AnalysisPayload, source_image: ImageBlob) -> Self {
        Self {
            report: payload.report,
            source_image,
            highlighted_image: payload.highlighted_image,
            fraud_narrative: payload.fraud_check,
            analyzed_at: Utc::now(),
        }
    }

    pub fn report(&self) -> &DamageReport {
        &self.report
    }

    pub fn overall_severity(&self) -> &str {
        &self.report.overall_severity
    }

    pub fn total_estimated_cost(&self) -> f64 {
        self.report.total_estimated_cost
    }

    pub fn damaged_parts(&self) -> &[DamagedPart] {
        &self.report.damaged_parts
    }

    /// The photo that was submitted.
    pub fn source_image(&self) -> &ImageBlob {
        &self.source_image
    }

    pub fn highlighted_image(&self) -> &ImageBlob {
        &self.highlighted_image
    }

    /// Fraud-check text. Only the presenter should read this, and only for privileged roles.
    pub fn fraud_narrative(&self) -> &str {
        &self.fraud_narrative
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }
}

/// Submits a snapshot of the draft for analysis and holds the outcome.
pub struct AnalysisTask {
    backend: Arc<dyn ClaimsBackend>,
    cell: TaskCell<AnalysisResult>,
    request_timeout: Option<Duration>,
}

impl AnalysisTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>, request_timeout: Option<Duration>) -> Self {
        Self {
            backend,
            cell: TaskCell::new("analysis"),
            request_timeout,
        }
    }

    pub fn state(&self) -> TaskState<AnalysisResult> {
        self.cell.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState<AnalysisResult>> {
        self.cell.subscribe()
    }

    /// Drop the current result and make any in-flight run stale.
    pub fn invalidate(&self) {
        self.cell.reset();
    }

    /// Snapshot `draft` and run one analysis of it.
    ///
    /// The previous result disappears as soon as the new run starts. The snapshot is taken
    /// on the first poll; later edits to the live draft do not reach the request. Dropping
    /// the returned future mid-flight puts the task back to `Idle`.
    pub async fn submit(&self, draft: &Mutex<ClaimDraft>) -> Result<AnalysisResult> {
        let (run, snapshot) = {
            let draft = lock_draft(draft);
            let snapshot = draft
                .snapshot()
                .ok_or_else(|| ClaimError::Validation(SUBMIT_REQUIRES.to_string()))?;
            (self.cell.guard(self.cell.begin()?), snapshot)
        };

        info!(
            image_id = %snapshot.image.id(),
            generation = run.ticket().generation(),
            accident_type = %snapshot.fields.accident_type,
            "Submitting claim for analysis"
        );

        let outcome = bounded(self.request_timeout, self.backend.analyze(&snapshot))
            .await
            .and_then(|payload| {
                payload.report.validate().map_err(BackendError::Malformed)?;
                Ok(AnalysisResult::new(payload, snapshot.image.clone()))
            })
            .map_err(|e| {
                warn!(image_id = %snapshot.image.id(), error = %e, "Analysis failed");
                e.user_message(ANALYSIS_FALLBACK)
            });

        if !run.complete(outcome.clone()) {
            return Err(ClaimError::Conflict(SUPERSEDED.to_string()));
        }
        if let Ok(result) = &outcome {
            info!(
                severity = %result.overall_severity(),
                total_cost = result.total_estimated_cost(),
                parts = result.damaged_parts().len(),
                "Analysis complete"
            );
        }
        outcome.map_err(ClaimError::Remote)
    }
}
