//! `ClaimWorkflow` – the orchestrator that owns the claim draft and both tasks, and keeps
//! them behind the session gate.
//!
//! All handles are cheap `Arc` clones of the same workflow, so a UI can keep one copy for
//! input handling while another awaits a long-running call:
//!
//! ```rust,ignore
//! let workflow = ClaimWorkflow::builder(backend).build();
//! workflow.login("manager", "secret").await?;
//! workflow.set_image(ImageBlob::from_bytes("dent.jpg", bytes)?)?;
//!
//! let generating = tokio::spawn({
//!     let workflow = workflow.clone();
//!     async move { workflow.generate_description().await }
//! });
//! // Swapping the image here makes the pending description stale; it will be dropped.
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::{
    analysis::{AnalysisResult, AnalysisTask},
    backend::ClaimsBackend,
    describe::DescriptionTask,
    draft::{ClaimDraft, ClaimField, ImageBlob, MetadataFields, lock_draft},
    error::{ClaimError, Result},
    presenter::{FormView, RenderState, form_view, present},
    session::{Principal, SessionGate},
    storage::{InMemorySessionStore, SessionStore},
    task::TaskState,
};

pub const DESCRIPTION_READ_ONLY: &str = "the description can only be filled in by generation";

/// Builder for [`ClaimWorkflow`].
pub struct WorkflowBuilder {
    backend: Arc<dyn ClaimsBackend>,
    store: Arc<dyn SessionStore>,
    request_timeout: Option<Duration>,
    defaults: MetadataFields,
}

impl WorkflowBuilder {
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Metadata a fresh draft starts with, and returns to after logout.
    pub fn defaults(mut self, defaults: MetadataFields) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> ClaimWorkflow {
        let session = SessionGate::new(self.backend.clone(), self.store)
            .with_request_timeout(self.request_timeout);
        ClaimWorkflow {
            session: Arc::new(session),
            draft: Arc::new(Mutex::new(ClaimDraft::new(self.defaults.clone()))),
            description: Arc::new(DescriptionTask::new(
                self.backend.clone(),
                self.request_timeout,
            )),
            analysis: Arc::new(AnalysisTask::new(self.backend, self.request_timeout)),
            defaults: self.defaults,
        }
    }
}

#[derive(Clone)]
pub struct ClaimWorkflow {
    session: Arc<SessionGate>,
    draft: Arc<Mutex<ClaimDraft>>,
    description: Arc<DescriptionTask>,
    analysis: Arc<AnalysisTask>,
    defaults: MetadataFields,
}

impl ClaimWorkflow {
    pub fn builder(backend: Arc<dyn ClaimsBackend>) -> WorkflowBuilder {
        WorkflowBuilder {
            backend,
            store: Arc::new(InMemorySessionStore::new()),
            request_timeout: None,
            defaults: MetadataFields::default(),
        }
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn principal(&self) -> Option<Principal> {
        self.session.current_principal()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        self.session.authenticate(username, password).await
    }

    pub async fn restore_session(&self) -> Result<Option<Principal>> {
        self.session.restore().await
    }

    /// Sign out and throw away the claim in progress. Results still in flight are dropped.
    pub async fn logout(&self) {
        self.session.end_session().await;
        {
            let mut draft = lock_draft(&self.draft);
            *draft = ClaimDraft::new(self.defaults.clone());
            self.description.invalidate();
        }
        self.analysis.invalidate();
        info!("Claim workspace cleared");
    }

    /// Copy of the draft as it is now.
    pub fn draft(&self) -> ClaimDraft {
        lock_draft(&self.draft).clone()
    }

    pub fn is_submittable(&self) -> bool {
        lock_draft(&self.draft).is_submittable()
    }

    /// Edit one of the free-text fields.
    pub fn set_field(&self, field: ClaimField, value: impl Into<String>) -> Result<()> {
        self.session.require_principal()?;
        if field == ClaimField::Description {
            return Err(ClaimError::Validation(DESCRIPTION_READ_ONLY.to_string()));
        }
        lock_draft(&self.draft).set_field(field, value);
        Ok(())
    }

    /// Replace the photo. Clears the description and re-arms generation in the same step,
    /// so a description still being generated for the old photo can never land.
    pub fn set_image(&self, image: ImageBlob) -> Result<()> {
        self.session.require_principal()?;
        let mut draft = lock_draft(&self.draft);
        info!(image_id = %image.id(), file_name = image.file_name(), "Image replaced");
        draft.set_image(image);
        self.description.invalidate();
        Ok(())
    }

    pub async fn generate_description(&self) -> Result<String> {
        self.session.require_principal()?;
        self.description.run(&self.draft).await
    }

    pub async fn submit(&self) -> Result<AnalysisResult> {
        self.session.require_principal()?;
        self.analysis.submit(&self.draft).await
    }

    pub fn description_state(&self) -> TaskState<String> {
        self.description.state()
    }

    pub fn analysis_state(&self) -> TaskState<AnalysisResult> {
        self.analysis.state()
    }

    pub fn subscribe_description(&self) -> watch::Receiver<TaskState<String>> {
        self.description.subscribe()
    }

    pub fn subscribe_analysis(&self) -> watch::Receiver<TaskState<AnalysisResult>> {
        self.analysis.subscribe()
    }

    /// Results panel for the signed-in principal.
    pub fn render(&self) -> Result<RenderState> {
        let principal = self.session.require_principal()?;
        Ok(present(&self.analysis.state(), principal.role))
    }

    /// Claim form panel.
    pub fn form(&self) -> Result<FormView> {
        self.session.require_principal()?;
        let draft = lock_draft(&self.draft);
        Ok(form_view(
            &draft,
            &self.description.state(),
            &self.analysis.state(),
        ))
    }
}
