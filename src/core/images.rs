//! Image reference resolution for vision-capable models.

use async_trait::async_trait;
use base64::Engine as _;
use tracing::warn;

use crate::core::error::ChatError;
use crate::core::message::{ImageUrl, MessageContent, MultimodalContent};

#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Returns the URL to send for an image reference.
    async fn resolve(&self, url: &str) -> Result<String, ChatError>;
}

/// Sends image URLs exactly as given.
pub struct PassthroughImages;

#[async_trait]
impl ImageResolver for PassthroughImages {
    async fn resolve(&self, url: &str) -> Result<String, ChatError> {
        Ok(url.to_string())
    }
}

/// Downloads remote images and inlines them as `data:` URLs so the provider
/// does not need to reach the original host.
pub struct InlineImageResolver {
    client: reqwest::Client,
}

impl InlineImageResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageResolver for InlineImageResolver {
    async fn resolve(&self, url: &str) -> Result<String, ChatError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Ok(url.to_string());
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Protocol {
                status: status.as_u16(),
                body: format!("image fetch failed for {url}"),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().await?;
        Ok(data_url(&mime, &bytes))
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Resolves every image part; a failed resolution keeps the original URL.
pub async fn preprocess_image_content(
    content: MessageContent,
    resolver: &dyn ImageResolver,
) -> MessageContent {
    let parts = match content {
        MessageContent::Text(_) => return content,
        MessageContent::Parts(parts) => parts,
    };

    let mut resolved = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            MultimodalContent::ImageUrl { image_url } => {
                let url = match resolver.resolve(&image_url.url).await {
                    Ok(url) => url,
                    Err(err) => {
                        warn!("keeping unresolved image reference {}: {err}", image_url.url);
                        image_url.url
                    }
                };
                resolved.push(MultimodalContent::ImageUrl {
                    image_url: ImageUrl { url },
                });
            }
            other => resolved.push(other),
        }
    }
    MessageContent::Parts(resolved)
}
