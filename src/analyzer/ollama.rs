//! Ollama-backed analyzer.
//!
//! Sends each block to the Ollama chat API and asks for a single JSON
//! object describing its sentiment, intents, keywords and date.

use crate::analyzer::{Analysis, Analyzer, RawAnalysis, INTENT_VOCABULARY};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the Ollama analyzer.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Keywords kept per block.
    pub max_keywords: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 60,
            max_keywords: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Analyzer calling a local or remote Ollama server.
pub struct OllamaAnalyzer {
    config: OllamaConfig,
    http_client: reqwest::Client,
    system_prompt: String,
}

impl OllamaAnalyzer {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            system_prompt: system_prompt(),
            config,
            http_client,
        })
    }

    async fn send_prompt(&self, text: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Analyze this text:\n\n{}", text),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow!("Cannot connect to Ollama at {}", self.config.ollama_url)
                } else {
                    anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl Analyzer for OllamaAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis> {
        let content = self.send_prompt(text).await?;
        debug!("Ollama replied with {} bytes", content.len());
        parse_analysis(&content, self.config.max_keywords)
    }
}

/// Parse the model's reply into a validated analysis.
fn parse_analysis(content: &str, max_keywords: usize) -> Result<Analysis> {
    let json = extract_json_object(content)
        .ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let raw: RawAnalysis =
        serde_json::from_str(json).context("reply does not match the analysis format")?;
    raw.validate(max_keywords)
}

/// The outermost `{...}` span, tolerating code fences and chatter.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn system_prompt() -> String {
    format!(
        r#"You are a sentiment analyzer for news text.
Respond ONLY with a JSON object of this exact shape:
{{"sentiment": "Positive|Neutral|Negative", "score": <number from -1.0 to 1.0>, "intents": [<zero or more of: {}>], "keywords": [<short lowercase key phrases>], "published": "<YYYY-MM-DD if the text states a publication date, otherwise null>"}}
No explanations or markdown."#,
        INTENT_VOCABULARY.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentLabel;

    #[test]
    fn test_ollama_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.model_name, "llama3.2:latest");
        assert_eq!(config.timeout_seconds, 60);
    }

    #[test]
    fn test_extract_json_object() {
        let fenced = "```json\n{\"sentiment\": \"Neutral\"}\n```";
        assert_eq!(
            extract_json_object(fenced),
            Some("{\"sentiment\": \"Neutral\"}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_analysis() {
        let reply = r#"Sure! {"sentiment": "negative", "score": -0.6, "intents": ["warn"], "keywords": ["Floods"], "published": null}"#;
        let analysis = parse_analysis(reply, 10).unwrap();
        assert_eq!(analysis.label, SentimentLabel::Negative);
        assert_eq!(analysis.score, -0.6);
        assert!(analysis.intents.contains("warn"));
        assert!(analysis.keywords.contains("floods"));
        assert!(analysis.published_at.is_none());
    }

    #[test]
    fn test_parse_analysis_malformed() {
        assert!(parse_analysis(r#"{"sentiment": 5}"#, 10).is_err());
        assert!(parse_analysis(r#"{"sentiment": "happy", "score": 0.3}"#, 10).is_err());
    }

    #[test]
    fn test_system_prompt_lists_vocabulary() {
        let prompt = system_prompt();
        for intent in INTENT_VOCABULARY {
            assert!(prompt.contains(intent));
        }
    }

    #[test]
    fn test_request_serialization() {
        let request = OllamaChatRequest {
            model: "m".to_string(),
            messages: vec![],
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.1 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
    }
}
