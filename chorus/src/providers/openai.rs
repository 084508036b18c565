use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ImageUrl,
};
use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::{ContentPart, MediaType, NormalizedMessage};

use super::{
    ensure_supported_media, extra_header_map, http_client, read_json, ProviderAdapter,
    ProviderError,
};

/// OpenAI chat completions. Also serves DeepSeek and OpenRouter, which speak
/// the same contract.
#[derive(Clone, Debug)]
pub struct OpenAiChatAdapter {
    client: reqwest::Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    media_types: Vec<MediaType>,
    headers: HeaderMap,
}

impl OpenAiChatAdapter {
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Text-only input is sent as a plain string; anything with an image
    /// becomes an array of `text` / `image_url` parts with a data URL.
    fn build_request(
        &self,
        message: &NormalizedMessage,
    ) -> std::result::Result<CreateChatCompletionRequest, ProviderError> {
        let content = if message.has_images() {
            let parts = message
                .parts()
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText { text: text.clone() },
                    ),
                    ContentPart::Image { media_type, data } => {
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImage {
                                image_url: ImageUrl {
                                    url: format!("data:{media_type};base64,{data}"),
                                    detail: None,
                                },
                            },
                        )
                    }
                })
                .collect();
            ChatCompletionRequestUserMessageContent::Array(parts)
        } else {
            ChatCompletionRequestUserMessageContent::Text(message.text())
        };

        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| ProviderError::api(None, format!("Invalid user message: {e}")))?;

        CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(vec![user.into()])
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| ProviderError::api(None, format!("Invalid completion request: {e}")))
    }

    fn extract_content(response: CreateChatCompletionResponse) -> String {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiChatAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    async fn invoke(&self, message: &NormalizedMessage) -> std::result::Result<String, ProviderError> {
        ensure_supported_media(&self.name, &self.media_types, message)?;

        let request = self.build_request(message)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;

        let completion: CreateChatCompletionResponse = read_json(response).await?;
        Ok(Self::extract_content(completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use serde_json::json;

    fn test_config(vision: bool) -> ProviderConfig {
        ProviderConfig {
            name: "chatgpt".to_string(),
            kind: ProviderKind::OpenAiChat,
            api_key: "sk-test".to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 512,
            vision,
            extra_headers: vec![("X-Title".to_string(), "chorus".to_string())],
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        let adapter = OpenAiChatAdapter::new(&test_config(true), Duration::from_secs(1)).unwrap();
        assert_eq!(adapter.base_url(), "https://api.openai.com/v1");
        assert_eq!(adapter.headers["x-title"], "chorus");
    }

    #[test]
    fn test_text_only_request_uses_string_content() {
        let adapter = OpenAiChatAdapter::new(&test_config(true), Duration::from_secs(1)).unwrap();
        let request = adapter
            .build_request(&NormalizedMessage::build("Explain gravity", None))
            .unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["max_tokens"], 512);
        assert_eq!(
            value["messages"],
            json!([{ "role": "user", "content": "Explain gravity" }])
        );
    }

    #[test]
    fn test_image_request_uses_data_url_part() {
        let adapter = OpenAiChatAdapter::new(&test_config(true), Duration::from_secs(1)).unwrap();
        let message = NormalizedMessage::build("What is this?", Some((MediaType::Jpeg, b"abc")));
        let request = adapter.build_request(&message).unwrap();

        let value = serde_json::to_value(&request).unwrap();
        let content = &value["messages"][0]["content"];
        assert_eq!(content[0], json!({ "type": "text", "text": "What is this?" }));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/jpeg;base64,YWJj"
        );
    }

    #[test]
    fn test_text_only_model_supports_no_media() {
        let adapter = OpenAiChatAdapter::new(&test_config(false), Duration::from_secs(1)).unwrap();
        assert!(adapter.supported_media_types().is_empty());
    }
}
