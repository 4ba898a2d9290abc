use super::{audit_prompt, http_client, send_with_retry, AuditGateway, Vendor, VendorSettings};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE: &str = "https://api.openai.com";
const XAI_BASE: &str = "https://api.x.ai";

/// OpenAI-compatible chat completions client, shared by OpenAI and Grok (xAI).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    vendor: Vendor,
    max_retries: u32,
}

impl ChatCompletionsClient {
    pub fn openai(settings: &VendorSettings) -> Result<Self> {
        Self::new(settings, Vendor::OpenAi, OPENAI_BASE)
    }

    pub fn grok(settings: &VendorSettings) -> Result<Self> {
        Self::new(settings, Vendor::Grok, XAI_BASE)
    }

    fn new(settings: &VendorSettings, vendor: Vendor, default_base: &str) -> Result<Self> {
        let label = vendor.display_name();
        if settings.api_key.trim().is_empty() {
            bail!("{label} API key must be provided via SOL_AUDIT_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| default_base.to_string());
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        Ok(Self {
            http: http_client(settings, label)?,
            url,
            api_key: settings.api_key.clone(),
            model: settings.model_or_default(),
            vendor,
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl AuditGateway for ChatCompletionsClient {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn submit(&self, source: &str) -> Result<String> {
        let label = self.vendor.display_name();
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: audit_prompt(source),
            }],
            temperature: 0.0,
            max_tokens: 1500,
        };

        let response = send_with_retry(label, self.max_retries, || {
            self.http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&payload)
        })
        .await?;

        let chat: ChatCompletionResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse {label} response"))?;
        chat.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("{label} response missing message content"))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_settings(vendor: Vendor, url: String) -> VendorSettings {
        VendorSettings {
            vendor,
            api_key: "test-key".into(),
            endpoint: Some(url),
            model: Some("gpt-test".into()),
            timeout_secs: Some(5),
            max_retries: 0,
        }
    }

    #[test]
    fn requires_api_key() {
        let mut settings = base_settings(Vendor::OpenAi, "http://localhost".into());
        settings.api_key.clear();
        let err = ChatCompletionsClient::openai(&settings).unwrap_err();
        assert!(err.to_string().contains("OpenAI API key"));
    }

    #[test]
    fn defaults_model_when_missing() {
        let mut settings = base_settings(Vendor::Grok, "http://localhost".into());
        settings.model = None;
        let client = ChatCompletionsClient::grok(&settings).unwrap();
        assert_eq!(client.model(), "grok-1.5");
        assert_eq!(client.vendor(), Vendor::Grok);
    }

    #[tokio::test]
    async fn submit_returns_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .body_contains("contract Vault");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "{\"vulnerabilities\":[]}" } }
                    ]
                }));
            })
            .await;

        let client =
            ChatCompletionsClient::openai(&base_settings(Vendor::OpenAi, server.base_url()))
                .unwrap();
        let raw = client.submit("contract Vault {}").await.unwrap();
        assert_eq!(raw, "{\"vulnerabilities\":[]}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_then_reports_vendor_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("upstream unavailable");
            })
            .await;

        let mut settings = base_settings(Vendor::Grok, server.base_url());
        settings.max_retries = 1;
        let client = ChatCompletionsClient::grok(&settings).unwrap();
        let err = client.submit("contract A {}").await.unwrap_err();
        assert!(err.to_string().contains("Grok API error"));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .json_body(json!({ "choices": [ { "message": { "content": null } } ] }));
            })
            .await;

        let client =
            ChatCompletionsClient::openai(&base_settings(Vendor::OpenAi, server.base_url()))
                .unwrap();
        let err = client.submit("contract A {}").await.unwrap_err();
        assert!(err.to_string().contains("missing message content"));
    }
}
