use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::catalog::CatalogItem;
use crate::settings::GeneratorSettings;

const SYSTEM_PROMPT: &str = "You are an SEO copywriter for a Romanian online store selling \
packaging and catering supplies. Write in Romanian. Answer with a single JSON object and nothing else.";

/// Longest existing description passed back to the model.
const MAX_SOURCE_CHARS: usize = 6000;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One completion for `prompt`. The text may be fenced, wrapped or truncated.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatGenerator {
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("generator.api_key is not set (SEO_GENERATOR__API_KEY)")?;
        Ok(ChatGenerator {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for ChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });
        let resp: ChatResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .context("Completion request rejected")?
            .json()
            .await
            .context("Unexpected completion response")?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Completion had no content"))?;
        debug!("Completion: {} chars", text.len());
        Ok(text)
    }
}

/// Prompt asking for a rewritten description as `{"new_content_html": ...}`.
pub fn build_prompt(item: &CatalogItem) -> String {
    let current: String = item
        .description
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(MAX_SOURCE_CHARS)
        .collect();
    format!(
        "Rewrite the product description below for search engines.\n\
         Product: {title}\n\
         \n\
         Rules:\n\
         - Return JSON: {{\"new_title\": \"...\", \"new_content_html\": \"...\"}}\n\
         - new_content_html is an HTML fragment using <h2>, <p>, <ul>, <li> only.\n\
         - Keep every factual specification; list them under <h2>Specificatii tehnice</h2>.\n\
         - Do not include JSON-LD, scripts or a related products section.\n\
         \n\
         Current description:\n{current}",
        title = item.title,
        current = if current.trim().is_empty() { "(none)" } else { current.as_str() },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_title_and_description() {
        let mut item = CatalogItem::new("1", "Cutie Pizza 30cm");
        item.description = Some("<p>Carton alb</p>".into());
        let prompt = build_prompt(&item);
        assert!(prompt.contains("Product: Cutie Pizza 30cm"));
        assert!(prompt.contains("<p>Carton alb</p>"));
        assert!(prompt.contains("\"new_content_html\""));
    }

    #[test]
    fn prompt_marks_missing_description() {
        let prompt = build_prompt(&CatalogItem::new("1", "Pahar"));
        assert!(prompt.ends_with("(none)"));
    }

    #[test]
    fn long_descriptions_are_cut() {
        let mut item = CatalogItem::new("1", "Pahar");
        item.description = Some("ă".repeat(MAX_SOURCE_CHARS + 50));
        let prompt = build_prompt(&item);
        assert_eq!(prompt.matches('ă').count(), MAX_SOURCE_CHARS);
    }

    #[test]
    fn api_key_is_required() {
        let settings = GeneratorSettings::default();
        assert!(ChatGenerator::from_settings(&settings).is_err());
        let settings = GeneratorSettings {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert!(ChatGenerator::from_settings(&settings).is_ok());
    }
}
