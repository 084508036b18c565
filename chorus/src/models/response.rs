use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of one provider call after sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutcome {
    pub provider: String,
    /// Empty when the call failed.
    pub text: String,
    pub error: Option<String>,
}

impl ProviderOutcome {
    pub fn success(provider: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            text: text.into(),
            error: None,
        }
    }

    pub fn failure(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            text: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Client-facing result of one chat request.
///
/// ```json
/// { "chatgpt": "...", "claude": "", "gemini": "...", "errors": { "claude": "..." } }
/// ```
///
/// Every configured provider always has a string field. Maps are ordered so
/// the same outcomes always serialize to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResponse {
    #[serde(flatten)]
    pub responses: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl AggregateResponse {
    /// Seeds an empty field for every provider so the key set is fixed
    /// before any outcome arrives.
    pub fn for_providers<'a>(providers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            responses: providers
                .into_iter()
                .map(|name| (name.to_string(), String::new()))
                .collect(),
            errors: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, outcome: ProviderOutcome) {
        self.responses.insert(outcome.provider.clone(), outcome.text);
        if let Some(error) = outcome.error {
            self.errors.insert(outcome.provider, error);
        }
    }

    pub fn text(&self, provider: &str) -> Option<&str> {
        self.responses.get(provider).map(String::as_str)
    }

    pub fn error(&self, provider: &str) -> Option<&str> {
        self.errors.get(provider).map(String::as_str)
    }
}
