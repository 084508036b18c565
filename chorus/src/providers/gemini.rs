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

/// Gemini accepts no GIF input.
const GEMINI_MEDIA_TYPES: &[MediaType] = &[MediaType::Jpeg, MediaType::Png, MediaType::Webp];

#[derive(Clone, Debug)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    media_types: &'static [MediaType],
    headers: HeaderMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiAdapter {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            name: config.name.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            media_types: if config.vision { GEMINI_MEDIA_TYPES } else { &[] },
            headers: extra_header_map(&config.extra_headers)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, message: &NormalizedMessage) -> GenerateContentRequest {
        let parts = message
            .parts()
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => Part::Text { text: text.clone() },
                ContentPart::Image { media_type, data } => Part::InlineData {
                    inline_data: InlineData {
                        mime_type: media_type.to_string(),
                        data: data.clone(),
                    },
                },
            })
            .collect();

        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
            },
        }
    }

    fn extract_text(
        response: GenerateContentResponse,
    ) -> std::result::Result<String, ProviderError> {
        if response.candidates.is_empty() {
            if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ProviderError::api(
                    None,
                    format!("Response was blocked due to {reason}"),
                ));
            }
        }

        Ok(response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_media_types(&self) -> &[MediaType] {
        self.media_types
    }

    async fn invoke(&self, message: &NormalizedMessage) -> std::result::Result<String, ProviderError> {
        ensure_supported_media(&self.name, self.media_types, message)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .headers(self.headers.clone())
            .json(&self.build_request(message))
            .send()
            .await?;

        let body: GenerateContentResponse = read_json(response).await?;
        Self::extract_text(body)
    }
}
