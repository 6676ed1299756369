pub mod analysis;
pub mod backend;
pub mod config;
pub mod describe;
pub mod draft;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod presenter;
pub mod session;
pub mod storage;
pub mod task;
pub mod workflow;

// Re-export commonly used types
pub use analysis::{AnalysisPayload, AnalysisResult, AnalysisTask, DamageReport, DamagedPart};
pub use backend::ClaimsBackend;
pub use config::ClientConfig;
pub use describe::DescriptionTask;
pub use draft::{ClaimDraft, ClaimField, ClaimSnapshot, ImageBlob, MetadataFields};
pub use error::{BackendError, ClaimError, Result};
#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use presenter::{DescriptionPanel, FormView, PartRow, RenderState, ReportView, form_view, present};
pub use session::{Principal, Role, SessionGate};
pub use storage::{InMemorySessionStore, SessionStore};
pub use task::{RunGuard, RunTicket, TaskCell, TaskState};
pub use workflow::{ClaimWorkflow, WorkflowBuilder};
