use async_trait::async_trait;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    analysis::{AnalysisPayload, DamageReport},
    backend::ClaimsBackend,
    config::ClientConfig,
    draft::{ClaimSnapshot, ImageBlob},
    error::BackendError,
    session::Principal,
};

pub const LOGIN_PATH: &str = "/api/login";
pub const DESCRIBE_PATH: &str = "/api/generate-description";
pub const ANALYZE_PATH: &str = "/api/analyze";

#[derive(Deserialize)]
struct DescriptionResponse {
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    report: DamageReport,
    highlighted_img: String,
    fraud_check: String,
}

/// [`ClaimsBackend`] speaking JSON and multipart over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn image_part(image: &ImageBlob) -> Result<Part, BackendError> {
        Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime())
            .map_err(|e| BackendError::Malformed(format!("invalid image type {}: {e}", image.mime())))
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T, BackendError> {
        let url = self.config.endpoint(path);
        debug!(%url, "POST multipart");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        decode(response).await
    }
}

/// Turn a response into `T`, lifting the backend's `{ "error": ... }` body into the error.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Unreachable(e.to_string()))?;
    let value = serde_json::from_str::<Value>(&body).ok();

    if !status.is_success() {
        let reason = value
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(BackendError::Rejected {
            status: status.as_u16(),
            reason,
        });
    }

    let value = value.ok_or_else(|| BackendError::Malformed("response body is not JSON".to_string()))?;
    serde_json::from_value(value).map_err(|e| BackendError::Malformed(e.to_string()))
}

#[async_trait]
impl ClaimsBackend for HttpBackend {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, BackendError> {
        let url = self.config.endpoint(LOGIN_PATH);
        debug!(%url, username, "POST login");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        decode(response).await
    }

    async fn generate_description(&self, image: &ImageBlob) -> Result<String, BackendError> {
        let form = Form::new().part("image", Self::image_part(image)?);
        let response: DescriptionResponse = self.post_form(DESCRIBE_PATH, form).await?;
        Ok(response.description)
    }

    async fn analyze(&self, claim: &ClaimSnapshot) -> Result<AnalysisPayload, BackendError> {
        let mut form = Form::new().part("image", Self::image_part(&claim.image)?);
        for (name, value) in claim.form_parts() {
            form = form.text(name, value);
        }
        let response: AnalyzeResponse = self.post_form(ANALYZE_PATH, form).await?;
        let highlighted_image = ImageBlob::from_data_url(
            format!("highlighted-{}", claim.image.file_name()),
            &response.highlighted_img,
        )
        .map_err(BackendError::Malformed)?;

        Ok(AnalysisPayload {
            report: response.report,
            highlighted_image,
            fraud_check: response.fraud_check,
        })
    }
}
