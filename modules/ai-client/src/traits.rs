use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AiError;

// =============================================================================
// JsonGenerator Trait
// =============================================================================

/// A model call that must answer with a single JSON document.
#[async_trait]
pub trait JsonGenerator: Send + Sync {
    async fn generate_json(&self, prompt: &str, timeout: Duration) -> Result<Value, AiError>;
}
