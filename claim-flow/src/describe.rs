use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    backend::{ClaimsBackend, bounded},
    draft::{ClaimDraft, ClaimField, lock_draft},
    error::{BackendError, ClaimError, Result},
    task::{TaskCell, TaskState},
};

pub const DESCRIPTION_FALLBACK: &str = "Failed to generate description from server.";
pub const IMAGE_REQUIRED: &str = "image required";
pub const ALREADY_DESCRIBED: &str = "a description has already been generated for this image";
pub const IMAGE_CHANGED: &str = "the image changed while its description was being generated";

/// Turns the draft's current image into a damage description, one run at a time.
pub struct DescriptionTask {
    backend: Arc<dyn ClaimsBackend>,
    cell: TaskCell<String>,
    request_timeout: Option<Duration>,
}

impl DescriptionTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>, request_timeout: Option<Duration>) -> Self {
        Self {
            backend,
            cell: TaskCell::new("description generation"),
            request_timeout,
        }
    }

    pub fn state(&self) -> TaskState<String> {
        self.cell.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState<String>> {
        self.cell.subscribe()
    }

    /// Forget the current run; a result still in flight will be dropped on arrival.
    pub fn invalidate(&self) {
        self.cell.reset();
    }

    /// Generate a description for the image currently held by `draft` and store it there.
    ///
    /// The result is written only if the draft still holds the same image when the
    /// backend answers.
    pub async fn run(&self, draft: &Mutex<ClaimDraft>) -> Result<String> {
        let (run, image) = {
            let draft = lock_draft(draft);
            let image = draft
                .image()
                .cloned()
                .ok_or_else(|| ClaimError::Validation(IMAGE_REQUIRED.to_string()))?;
            if !draft.description().is_empty() {
                return Err(ClaimError::Validation(ALREADY_DESCRIBED.to_string()));
            }
            (self.cell.guard(self.cell.begin()?), image)
        };

        info!(
            image_id = %image.id(),
            generation = run.ticket().generation(),
            "Requesting damage description"
        );

        let outcome = bounded(
            self.request_timeout,
            self.backend.generate_description(&image),
        )
        .await
        .and_then(|text| {
            let text = text.trim().to_string();
            if text.is_empty() {
                Err(BackendError::Malformed("description is empty".to_string()))
            } else {
                Ok(text)
            }
        })
        .map_err(|e| {
            warn!(image_id = %image.id(), error = %e, "Description generation failed");
            e.user_message(DESCRIPTION_FALLBACK)
        });

        let applied = {
            let mut draft = lock_draft(draft);
            if draft.image().map(|current| current.id()) != Some(image.id()) {
                warn!(image_id = %image.id(), "Dropping description for replaced image");
                false
            } else {
                run.complete_with(|| {
                    let text = outcome.clone()?;
                    draft.set_field(ClaimField::Description, text.clone());
                    Ok(text)
                })
            }
        };

        if !applied {
            return Err(ClaimError::Conflict(IMAGE_CHANGED.to_string()));
        }
        outcome.map_err(ClaimError::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisPayload;
    use crate::draft::tests::png;
    use crate::draft::{ClaimSnapshot, ImageBlob, MetadataFields};
    use crate::presenter::form_view;
    use crate::session::Principal;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Describer {
        reply: std::result::Result<String, BackendError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClaimsBackend for Describer {
        async fn authenticate(
            &self,
            _: &str,
            _: &str,
        ) -> std::result::Result<Principal, BackendError> {
            unreachable!()
        }

        async fn generate_description(
            &self,
            _image: &ImageBlob,
        ) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }

        async fn analyze(
            &self,
            _: &ClaimSnapshot,
        ) -> std::result::Result<AnalysisPayload, BackendError> {
            unreachable!()
        }
    }

    fn task(reply: std::result::Result<String, BackendError>) -> (DescriptionTask, Arc<Describer>) {
        let backend = Arc::new(Describer {
            reply,
            calls: AtomicUsize::new(0),
        });
        (DescriptionTask::new(backend.clone(), None), backend)
    }

    #[tokio::test]
    async fn no_image_fails_without_calling_backend() {
        let (task, backend) = task(Ok("x".into()));
        let draft = Mutex::new(ClaimDraft::default());
        let err = task.run(&draft).await.unwrap_err();
        assert_eq!(err, ClaimError::Validation(IMAGE_REQUIRED.into()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn success_stores_description_and_disables_rerun() {
        let (task, backend) = task(Ok("  Front bumper scratch\n".into()));
        let mut initial = ClaimDraft::new(MetadataFields::sample());
        initial.set_image(png("a.png"));
        let draft = Mutex::new(initial);

        let text = task.run(&draft).await.unwrap();
        assert_eq!(text, "Front bumper scratch");
        assert_eq!(lock_draft(&draft).description(), "Front bumper scratch");
        assert_eq!(task.state(), TaskState::Succeeded(text));
        assert!(!form_view(&lock_draft(&draft), &task.state(), &TaskState::Idle).can_generate);

        let err = task.run(&draft).await.unwrap_err();
        assert_eq!(err, ClaimError::Validation(ALREADY_DESCRIBED.into()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_leaves_description_empty() {
        let (task, _) = task(Err(BackendError::Rejected {
            status: 503,
            reason: Some("Model overloaded".into()),
        }));
        let mut initial = ClaimDraft::default();
        initial.set_image(png("a.png"));
        let draft = Mutex::new(initial);

        let err = task.run(&draft).await.unwrap_err();
        assert_eq!(err, ClaimError::Remote("Model overloaded".into()));
        assert_eq!(task.state(), TaskState::Failed("Model overloaded".into()));
        assert_eq!(lock_draft(&draft).description(), "");
        let form = form_view(&lock_draft(&draft), &task.state(), &TaskState::Idle);
        assert!(form.can_generate);
        assert_eq!(form.description_error.as_deref(), Some("Model overloaded"));
    }

    #[tokio::test]
    async fn blank_description_counts_as_failure() {
        let (task, _) = task(Ok("   ".into()));
        let mut initial = ClaimDraft::default();
        initial.set_image(png("a.png"));
        let draft = Mutex::new(initial);

        let err = task.run(&draft).await.unwrap_err();
        assert_eq!(err, ClaimError::Remote(DESCRIPTION_FALLBACK.into()));
    }
}
