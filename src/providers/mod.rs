//! AI Providers module.

use std::sync::Arc;

pub mod ollama;
pub mod openai;
pub mod provider;

pub use provider::{Provider, ProviderError};

use crate::config::Settings;
use crate::error::Error;

/// Provider factory.
///
/// An unknown provider name is a configuration error: engine construction
/// for the agent aborts rather than silently picking a fallback.
pub fn create_provider(
    name: &str,
    api_key: Option<String>,
    settings: &Settings,
) -> Result<Arc<dyn Provider>, Error> {
    match name {
        "ollama" => {
            if let Some(url) = &settings.models.ollama.base_url {
                Ok(Arc::new(ollama::OllamaProvider::with_base_url(url.clone())))
            } else {
                Ok(Arc::new(ollama::OllamaProvider::new()))
            }
        }
        "openai" => {
            let key = api_key.or_else(|| settings.models.openai.api_key.clone());
            if let Some(url) = &settings.models.openai.base_url {
                Ok(Arc::new(openai::OpenAiProvider::with_base_url(key, url.clone())))
            } else {
                Ok(Arc::new(openai::OpenAiProvider::new(key)))
            }
        }
        other => Err(Error::Provider(format!("unknown provider: {}", other))),
    }
}
