use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::{ContentPart, MediaType, NormalizedMessage};

use super::{
    ensure_supported_media, extra_header_map, http_client, read_json, ProviderAdapter,
    ProviderError,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    media_types: Vec<MediaType>,
    headers: HeaderMap,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: MediaType,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            name: config.name.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            media_types: if config.vision {
                MediaType::ALL.to_vec()
            } else {
                Vec::new()
            },
            headers: extra_header_map(&config.extra_headers)?,
        })
    }

    fn build_request(&self, message: &NormalizedMessage) -> MessagesRequest {
        let content = message
            .parts()
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => ContentBlock::Text { text: text.clone() },
                ContentPart::Image { media_type, data } => ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: *media_type,
                        data: data.clone(),
                    },
                },
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
        }
    }

    fn extract_text(response: MessagesResponse) -> String {
        response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    async fn invoke(&self, message: &NormalizedMessage) -> std::result::Result<String, ProviderError> {
        ensure_supported_media(&self.name, &self.media_types, message)?;

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .headers(self.headers.clone())
            .json(&self.build_request(message))
            .send()
            .await?;

        let body: MessagesResponse = read_json(response).await?;
        Ok(Self::extract_text(body))
    }
}
