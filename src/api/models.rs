use std::cmp::Ordering;

use super::{ModelDescriptor, PipelineApi};

/// Model used when none is selected
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Models recommended for translation, listed first and in this order
pub const RECOMMENDED_MODELS: &[&str] = &[
    "openai/gpt-4o",
    "anthropic/claude-3-opus",
    "anthropic/claude-3-sonnet",
    "google/gemini-1.5-pro",
    "google/gemini-1.5-flash",
    "mistralai/mistral-large",
    "meta-llama/llama-3-70b-instruct",
];

/// Built-in list used when the server cannot provide one
pub fn fallback_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(
            "openai/gpt-4o",
            "OpenAI - GPT-4o",
            Some("OpenAI's latest multimodal model"),
        ),
        ModelDescriptor::new(
            "anthropic/claude-3-sonnet",
            "Anthropic - Claude 3 Sonnet",
            Some("Anthropic's fast and efficient model"),
        ),
        ModelDescriptor::new(
            "google/gemini-1.5-flash",
            "Google - Gemini 1.5 Flash",
            Some("Google's fast response model"),
        ),
    ]
}

fn recommended_rank(id: &str) -> Option<usize> {
    RECOMMENDED_MODELS.iter().position(|candidate| *candidate == id)
}

/// Recommended models first in recommended order, the rest by display name
pub fn sort_models(models: &mut [ModelDescriptor]) {
    models.sort_by(|a, b| {
        match (recommended_rank(&a.id), recommended_rank(&b.id)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.display_name.cmp(&b.display_name),
        }
    });
}

/// Fetch the model list once, falling back to the built-in list on failure
pub async fn load_models(api: &dyn PipelineApi) -> Vec<ModelDescriptor> {
    match api.list_models().await {
        Ok(mut models) if !models.is_empty() => {
            sort_models(&mut models);
            tracing::debug!("Loaded {} models from server", models.len());
            models
        }
        Ok(_) => {
            tracing::warn!("Server returned no models, using built-in list");
            fallback_models()
        }
        Err(e) => {
            tracing::warn!("Failed to fetch models ({}), using built-in list", e);
            fallback_models()
        }
    }
}
