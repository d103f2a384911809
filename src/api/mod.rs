use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub mod models;

pub use models::{fallback_models, load_models, sort_models, DEFAULT_MODEL};

use crate::stream::ByteStream;
use crate::TransportError;

/// A translation model offered by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider-qualified model id, e.g. `openai/gpt-4o`
    pub id: String,

    /// Human-readable name
    #[serde(rename = "name")]
    pub display_name: String,

    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelDescriptor {
    pub fn new(id: &str, display_name: &str, description: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: description.map(|d| d.to_string()),
        }
    }
}

/// Payload of the transcription service health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub available: bool,

    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    srt: &'a str,
    model: &'a str,
}

/// Streaming endpoints of the pipeline server
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Start the audio download for a video; the body is opaque progress output
    async fn download_audio(&self, video_id: &str) -> Result<ByteStream, TransportError>;

    /// Transcribe the downloaded audio; the body is SRT text
    async fn transcribe(&self, video_id: &str) -> Result<ByteStream, TransportError>;

    /// Translate SRT text with the given model; the body is translated lines
    async fn translate(&self, srt: &str, model: &str) -> Result<ByteStream, TransportError>;

    /// Fetch the list of translation models
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError>;
}

/// Health check of the transcription service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check_service(&self) -> Result<StatusReport, TransportError>;
}

/// reqwest-backed client for the pipeline server
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str, connect_timeout: Option<Duration>) -> crate::Result<Self> {
        let mut base_url = crate::utils::validate_url(base_url)?;

        // Url::join replaces the last path segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Stream(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn video_endpoint(&self, path: &str, video_id: &str) -> Result<Url, TransportError> {
        self.endpoint(&format!("{}?video_id={}", path, urlencoding::encode(video_id)))
    }

    fn check_status(endpoint: &Url, response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.path().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn into_byte_stream(response: Response) -> ByteStream {
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed()
    }

    async fn open_stream(&self, url: Url) -> Result<ByteStream, TransportError> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let response = Self::check_status(&url, response)?;
        Ok(Self::into_byte_stream(response))
    }
}

#[async_trait]
impl PipelineApi for HttpApi {
    async fn download_audio(&self, video_id: &str) -> Result<ByteStream, TransportError> {
        let url = self.video_endpoint("api/audio", video_id)?;
        self.open_stream(url).await
    }

    async fn transcribe(&self, video_id: &str) -> Result<ByteStream, TransportError> {
        let url = self.video_endpoint("api/transcript", video_id)?;
        self.open_stream(url).await
    }

    async fn translate(&self, srt: &str, model: &str) -> Result<ByteStream, TransportError> {
        let url = self.endpoint("api/translate")?;
        tracing::debug!("POST {} ({} bytes of SRT, model {})", url, srt.len(), model);

        let response = self
            .client
            .post(url.clone())
            .json(&TranslateRequest { srt, model })
            .send()
            .await?;
        let response = Self::check_status(&url, response)?;

        Ok(Self::into_byte_stream(response))
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = self.endpoint("api/models")?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let response = Self::check_status(&url, response)?;
        let body: ModelsResponse = response.json().await?;

        Ok(body.models)
    }
}

#[async_trait]
impl StatusProbe for HttpApi {
    async fn check_service(&self) -> Result<StatusReport, TransportError> {
        let url = self.endpoint("api/check-transcription-service")?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let response = Self::check_status(&url, response)?;

        Ok(response.json().await?)
    }
}
