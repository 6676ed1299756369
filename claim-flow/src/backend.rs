use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::{
    analysis::AnalysisPayload,
    draft::{ClaimSnapshot, ImageBlob},
    error::BackendError,
    session::Principal,
};

/// The remote service the workflow depends on.
///
/// Implementations report failures as [`BackendError`]; turning them into user-facing
/// messages is the caller's job.
#[async_trait]
pub trait ClaimsBackend: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<Principal, BackendError>;

    /// Natural-language description of the damage shown in `image`.
    async fn generate_description(&self, image: &ImageBlob) -> Result<String, BackendError>;

    /// Damage report, highlighted image and fraud check for one claim, all or nothing.
    async fn analyze(&self, claim: &ClaimSnapshot) -> Result<AnalysisPayload, BackendError>;
}

/// Await `call`, giving up after `timeout` when one is set.
pub async fn bounded<T, F>(timeout: Option<Duration>, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(BackendError::TimedOut(limit))),
        None => call.await,
    }
}
