use super::{audit_prompt, http_client, send_with_retry, AuditGateway, Vendor, VendorSettings};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ClaudeClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl ClaudeClient {
    pub fn new(settings: &VendorSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("Claude API key must be provided via SOL_AUDIT_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));
        Ok(Self {
            http: http_client(settings, "Claude")?,
            url,
            api_key: settings.api_key.clone(),
            model: settings.model_or_default(),
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl AuditGateway for ClaudeClient {
    fn vendor(&self) -> Vendor {
        Vendor::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn submit(&self, source: &str) -> Result<String> {
        let payload = AnthropicRequest {
            model: self.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".into(),
                content: audit_prompt(source),
            }],
            temperature: 0.0,
            max_tokens: 2048,
        };

        let response = send_with_retry("Claude", self.max_retries, || {
            self.http
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
        })
        .await?;

        let message: AnthropicResponse = response
            .json()
            .await
            .context("failed to parse Claude response")?;
        message
            .content
            .into_iter()
            .filter(|part| part.kind == "text")
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("Claude response missing message content"))
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
