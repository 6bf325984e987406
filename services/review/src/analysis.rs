//! Image analysis models and client
//!
//! The analysis service receives the photo as a data URL and answers with the
//! business it recognized plus suggestion tags for the review.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use common::{ClientError, ClientResult, config::ClientConfig};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of analyzing one photo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Analysis {
    #[serde(deserialize_with = "null_as_default")]
    pub business_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub business_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    /// Display glyph for the category
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    /// Advisory only, never copied into the user's rating
    #[serde(deserialize_with = "null_as_default")]
    pub suggested_rating: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub positive_suggestions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub negative_suggestions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub suggested_vendors: Vec<String>,
    /// Pre-written review text, when the service offers one
    pub review: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct AnalysisEnvelope {
    analysis: Analysis,
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    image: &'a str,
}

/// Errors raised while turning a file into an image payload
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("Image is empty")]
    Empty,

    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Photo selected by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl ImagePayload {
    /// Wrap raw bytes; only `image/*` MIME types are accepted
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ImageError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(ImageError::NotAnImage(mime_type));
        }
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self { mime_type, bytes })
    }

    /// Read a photo from disk, inferring its type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let mime_type = mime_for_extension(&extension)
            .ok_or_else(|| ImageError::NotAnImage(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;

        Self::new(mime_type, bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<payload>` form expected by the analysis service
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Anything that can turn a photo into an [`Analysis`]
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> ClientResult<Analysis>;
}

/// Analyzer backed by the remote HTTP service
#[derive(Clone, Debug)]
pub struct HttpImageAnalyzer {
    http: reqwest::Client,
    url: String,
}

impl HttpImageAnalyzer {
    /// Create an analyzer posting to `url`.
    ///
    /// No transport timeout is set here; the review controller bounds each
    /// analysis itself.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        // Leave headroom so the controller's bound fires first
        let http = reqwest::Client::builder()
            .timeout(config.analysis_timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| ClientError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.analysis_url.clone(),
        })
    }
}

#[async_trait]
impl ImageAnalyzer for HttpImageAnalyzer {
    async fn analyze(&self, image: &ImagePayload) -> ClientResult<Analysis> {
        info!(
            "Submitting {} image ({} bytes) for analysis",
            image.mime_type(),
            image.len()
        );

        let data_url = image.to_data_url();
        let response = self
            .http
            .post(&self.url)
            .json(&AnalysisRequest { image: &data_url })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = ClientError::from_response(response).await;
            warn!("Image analysis rejected: {}", err);
            return Err(err);
        }

        let envelope: AnalysisEnvelope = response.json().await?;
        debug!(
            "Analysis recognized '{}' ({}) with confidence {:.2}",
            envelope.analysis.business_name,
            envelope.analysis.category,
            envelope.analysis.confidence
        );
        Ok(envelope.analysis)
    }
}
