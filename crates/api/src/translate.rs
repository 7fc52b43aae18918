//! Prompt translation through an OpenAI-compatible chat completion endpoint.
//!
//! Translation is best effort: any failure, including a missing API key,
//! hands the caller's prompt back unchanged.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are a translator. Translate Turkish to English and optimize for \
AI image generation. Output only the optimized English prompt, nothing else.";

/// Completion endpoint settings.
#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub api_url: String,
    /// Requests are skipped entirely when unset.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl TranslateConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var        | Default                                      |
    /// |----------------|----------------------------------------------|
    /// | `LLM_API_URL`  | `https://api.openai.com/v1/chat/completions` |
    /// | `LLM_API_KEY`  | -- (falls back to `OPENAI_API_KEY`)          |
    /// | `LLM_MODEL`    | `gpt-4o-mini`                                |
    pub fn from_env() -> Self {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            api_key,
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            timeout: Duration::from_secs(20),
        }
    }

    /// A configuration that never calls out.
    pub fn disabled() -> Self {
        Self {
            api_url: String::new(),
            api_key: None,
            model: String::new(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Translator {
    client: reqwest::Client,
    config: TranslateConfig,
}

impl Translator {
    pub fn new(config: TranslateConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Translate `prompt`, or return it unchanged if anything goes wrong.
    pub async fn translate(&self, prompt: &str) -> String {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return prompt.to_string();
        };
        if prompt.trim().is_empty() {
            return prompt.to_string();
        }

        match self.complete(api_key, prompt).await {
            Ok(Some(translated)) => translated,
            Ok(None) => {
                tracing::warn!("Translation response had no content, using original prompt");
                prompt.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Translation failed, using original prompt");
                prompt.to_string()
            }
        }
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<Option<String>, reqwest::Error> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.3,
            "max_tokens": 200,
        });

        let completion: Completion = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_translator_returns_input() {
        let translator = Translator::new(TranslateConfig::disabled());
        assert_eq!(translator.translate("kırmızı bir kedi").await, "kırmızı bir kedi");
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_input() {
        let translator = Translator::new(TranslateConfig {
            api_url: "http://127.0.0.1:9/v1/chat/completions".into(),
            api_key: Some("key".into()),
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(2),
        });
        assert_eq!(translator.translate("bir köpek").await, "bir köpek");
    }

    #[test]
    fn first_choice_content_is_used() {
        let completion: Completion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" a red cat \n"}}]}"#,
        )
        .unwrap();
        let content = completion.choices[0].message.content.as_deref().map(str::trim);
        assert_eq!(content, Some("a red cat"));
    }
}
