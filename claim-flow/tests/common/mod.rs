#![allow(dead_code)]

use async_trait::async_trait;
use claim_flow::{
    AnalysisPayload, BackendError, ClaimSnapshot, ClaimsBackend, DamageReport, DamagedPart,
    ImageBlob, Principal, Role,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
pub const FRAUD_NARRATIVE: &str =
    "Image metadata is consistent with the reported time and place; no signs of editing.";

pub fn png(name: &str) -> ImageBlob {
    ImageBlob::from_bytes(name, PNG.to_vec()).unwrap()
}

/// A backend call waiting for the test to answer it.
pub struct Pending<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<Result<Resp, BackendError>>,
}

impl<Req, Resp> Pending<Req, Resp> {
    pub fn respond(self, outcome: Result<Resp, BackendError>) {
        let _ = self.reply.send(outcome);
    }
}

/// Backend whose description and analysis calls block until the test releases them.
pub struct ScriptedBackend {
    describe_tx: mpsc::UnboundedSender<Pending<ImageBlob, String>>,
    analyze_tx: mpsc::UnboundedSender<Pending<ClaimSnapshot, AnalysisPayload>>,
    pub login_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
}

pub struct Controller {
    describe_rx: mpsc::UnboundedReceiver<Pending<ImageBlob, String>>,
    analyze_rx: mpsc::UnboundedReceiver<Pending<ClaimSnapshot, AnalysisPayload>>,
}

impl Controller {
    pub async fn next_description(&mut self) -> Pending<ImageBlob, String> {
        self.describe_rx
            .recv()
            .await
            .expect("backend dropped before a description call arrived")
    }

    pub async fn next_analysis(&mut self) -> Pending<ClaimSnapshot, AnalysisPayload> {
        self.analyze_rx
            .recv()
            .await
            .expect("backend dropped before an analysis call arrived")
    }
}

pub fn scripted() -> (Arc<ScriptedBackend>, Controller) {
    let (describe_tx, describe_rx) = mpsc::unbounded_channel();
    let (analyze_tx, analyze_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(ScriptedBackend {
        describe_tx,
        analyze_tx,
        login_calls: AtomicUsize::new(0),
        describe_calls: AtomicUsize::new(0),
        analyze_calls: AtomicUsize::new(0),
    });
    (
        backend,
        Controller {
            describe_rx,
            analyze_rx,
        },
    )
}

async fn wait_for<Req, Resp>(
    tx: &mpsc::UnboundedSender<Pending<Req, Resp>>,
    request: Req,
) -> Result<Resp, BackendError> {
    let (reply, rx) = oneshot::channel();
    tx.send(Pending { request, reply })
        .map_err(|_| BackendError::Unreachable("controller gone".into()))?;
    rx.await
        .unwrap_or_else(|_| Err(BackendError::Unreachable("call abandoned".into())))
}

#[async_trait]
impl ClaimsBackend for ScriptedBackend {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, BackendError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let role = match (username, password) {
            ("manager", "manager-pass") => Role::Manager,
            ("adjuster", "adjuster-pass") => Role::Adjuster,
            _ => {
                return Err(BackendError::Rejected {
                    status: 401,
                    reason: Some("Invalid credentials".into()),
                });
            }
        };
        Ok(Principal {
            id: if role == Role::Manager { 1 } else { 2 },
            username: username.to_string(),
            role,
        })
    }

    async fn generate_description(&self, image: &ImageBlob) -> Result<String, BackendError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        wait_for(&self.describe_tx, image.clone()).await
    }

    async fn analyze(&self, claim: &ClaimSnapshot) -> Result<AnalysisPayload, BackendError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        wait_for(&self.analyze_tx, claim.clone()).await
    }
}

/// The backend answer used by the end-to-end scenarios.
pub fn moderate_damage() -> AnalysisPayload {
    AnalysisPayload {
        report: DamageReport {
            overall_severity: "Moderate".into(),
            total_estimated_cost: 1200.0,
            damaged_parts: vec![DamagedPart {
                part_name: "Front bumper".into(),
                severity: "Moderate".into(),
                estimated_cost: 1200.0,
                reasoning: "Paint transfer and a shallow dent on the left corner.".into(),
            }],
        },
        highlighted_image: png("highlighted.png"),
        fraud_check: FRAUD_NARRATIVE.into(),
    }
}
