mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AiError;
use crate::traits::JsonGenerator;
use crate::util::json_object_span;
use client::GeminiClient;
use types::{GenerateRequest, GenerateResponse};

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

// =============================================================================
// Gemini
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl JsonGenerator for Gemini {
    async fn generate_json(&self, prompt: &str, timeout: Duration) -> Result<Value, AiError> {
        let request = GenerateRequest::json_prompt(prompt);
        let response = self.client().generate(&self.model, &request, timeout).await?;
        parse_json_response(&response)
    }
}

fn parse_json_response(response: &GenerateResponse) -> Result<Value, AiError> {
    let text = response.text().ok_or(AiError::EmptyResponse)?;
    Ok(serde_json::from_str(json_object_span(&text))?)
}
