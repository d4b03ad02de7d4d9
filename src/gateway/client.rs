use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

use super::public::{ErrorBody, UploadResponse, reply_text};
use super::{
    BackendGateway, ChatRequest, DocumentUpload, FileChatRequest, GatewayError, GatewayResult,
    HealthStatus,
};
use crate::session::DocumentDescriptor;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to the backend over HTTP.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    api_base_url: String,
    client: Client,
}

impl HttpGateway {
    pub fn new(api_base_url: &str, request_timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }

    async fn reply(&self, path: &str, payload: &impl serde::Serialize) -> GatewayResult<String> {
        let resp = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let body = resp.text().await?;
        Ok(reply_text(&body))
    }
}

/// Turns a non-2xx response into a `GatewayError::Request` carrying the
/// backend's `detail` when it sent one.
async fn check_status(resp: Response) -> GatewayResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => err.detail_text(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => format!("Request failed with status {}", status),
    };
    tracing::debug!("Backend returned {}: {}", status, detail);

    Err(GatewayError::Request {
        status: status.as_u16(),
        detail,
    })
}

fn mime_for(filename: &str) -> &'static str {
    if filename.to_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn check_health(&self) -> HealthStatus {
        let result = self
            .client
            .get(self.url("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => HealthStatus::Healthy,
            Ok(resp) => {
                tracing::debug!("Health check returned {}", resp.status());
                HealthStatus::Unhealthy
            }
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                HealthStatus::Unhealthy
            }
        }
    }

    async fn send_chat(&self, request: &ChatRequest) -> GatewayResult<String> {
        self.reply("chat", request).await
    }

    async fn send_file_chat(&self, request: &FileChatRequest) -> GatewayResult<String> {
        self.reply("file_chat", request).await
    }

    async fn upload_document(
        &self,
        upload: DocumentUpload,
        api_key: &str,
    ) -> GatewayResult<DocumentDescriptor> {
        let DocumentUpload { filename, bytes } = upload;
        let part = Part::bytes(bytes)
            .file_name(filename.clone())
            .mime_str(mime_for(&filename))?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", api_key.to_string());

        let resp = self
            .client
            .post(self.url("upload_pdf"))
            .multipart(form)
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        let upload_resp: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Decode(format!("{}: {}", e, body)))?;

        Ok(upload_resp.into_descriptor(&filename))
    }

    async fn remove_document(&self, document_session_id: &str) -> GatewayResult<()> {
        let resp = self
            .client
            .post(self.url("remove_pdf"))
            .query(&[("session_id", document_session_id)])
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
