mod anthropic;
mod gemini;
mod openai;
mod settings;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::audit::AuditResult;
use crate::parser::parse_audit_response;

pub use anthropic::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::ChatCompletionsClient;
pub use settings::{VendorProfile, VendorProfiles, VendorSettings};

/// Transport to a single LLM vendor: submit Solidity source, receive the raw text reply.
#[async_trait]
pub trait AuditGateway: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn model(&self) -> &str;

    /// Send the source for review and return the vendor's textual payload, unparsed.
    async fn submit(&self, source: &str) -> Result<String>;
}

/// Produces a structured audit for one source text.
#[async_trait]
pub trait SourceAuditor: Send + Sync {
    async fn audit(&self, source: &str) -> Result<AuditResult>;
}

/// Gateway call followed by best-effort parsing of the reply.
pub struct GatewayAuditor<G: ?Sized> {
    gateway: Box<G>,
}

impl<G: AuditGateway + ?Sized> GatewayAuditor<G> {
    pub fn new(gateway: Box<G>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

#[async_trait]
impl<G: AuditGateway + ?Sized> SourceAuditor for GatewayAuditor<G> {
    async fn audit(&self, source: &str) -> Result<AuditResult> {
        let raw = self.gateway.submit(source).await?;
        debug!(
            vendor = %self.gateway.vendor(),
            model = self.gateway.model(),
            reply_len = raw.len(),
            "received vendor reply"
        );
        let result = parse_audit_response(&raw).with_context(|| {
            format!(
                "{} returned an audit that could not be parsed",
                self.gateway.vendor().display_name()
            )
        })?;
        Ok(result)
    }
}

/// Supported LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Gemini,
    #[serde(alias = "open_ai")]
    OpenAi,
    #[serde(alias = "anthropic")]
    Claude,
    #[serde(alias = "xai")]
    Grok,
}

/// A selectable model offered for a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub vendor: Vendor,
    pub id: &'static str,
    pub label: &'static str,
}

const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        vendor: Vendor::Gemini,
        id: "gemini-1.5-flash-latest",
        label: "Gemini 1.5 Flash (fast, less accurate)",
    },
    ModelInfo {
        vendor: Vendor::Gemini,
        id: "gemini-1.5-pro-latest",
        label: "Gemini 1.5 Pro (better results)",
    },
    ModelInfo {
        vendor: Vendor::OpenAi,
        id: "gpt-4o-mini",
        label: "OpenAI GPT-4o Mini",
    },
    ModelInfo {
        vendor: Vendor::OpenAi,
        id: "gpt-4o",
        label: "OpenAI GPT-4o",
    },
    ModelInfo {
        vendor: Vendor::Claude,
        id: "claude-opus-4-20250514",
        label: "Claude 4 Opus",
    },
    ModelInfo {
        vendor: Vendor::Claude,
        id: "claude-sonnet-4-20250514",
        label: "Claude 4 Sonnet",
    },
    ModelInfo {
        vendor: Vendor::Grok,
        id: "grok-1.5",
        label: "Grok 1.5",
    },
];

impl Vendor {
    pub const ALL: [Vendor; 4] = [Self::Gemini, Self::OpenAi, Self::Claude, Self::Grok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Grok => "grok",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
            Self::Claude => "Claude",
            Self::Grok => "Grok",
        }
    }

    /// Models offered for this vendor; the first entry is the default.
    pub fn models(&self) -> impl Iterator<Item = &'static ModelInfo> + '_ {
        MODEL_CATALOG.iter().filter(move |m| m.vendor == *self)
    }

    pub fn default_model(&self) -> &'static str {
        self.models().next().map(|m| m.id).unwrap_or_default()
    }

    pub fn catalog() -> &'static [ModelInfo] {
        MODEL_CATALOG
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "claude" | "anthropic" => Ok(Self::Claude),
            "grok" | "xai" => Ok(Self::Grok),
            other => bail!(
                "unsupported vendor `{other}` (expected one of: gemini, openai, claude, grok)"
            ),
        }
    }
}

/// Build the gateway matching the configured vendor.
pub fn build_gateway(settings: &VendorSettings) -> Result<Box<dyn AuditGateway>> {
    let gateway: Box<dyn AuditGateway> = match settings.vendor {
        Vendor::Gemini => Box::new(GeminiClient::new(settings)?),
        Vendor::OpenAi => Box::new(ChatCompletionsClient::openai(settings)?),
        Vendor::Grok => Box::new(ChatCompletionsClient::grok(settings)?),
        Vendor::Claude => Box::new(ClaudeClient::new(settings)?),
    };
    Ok(gateway)
}

pub(crate) fn audit_prompt(source: &str) -> String {
    format!(
        r#"You are a Solidity smart contract auditor.
Analyze this Solidity contract for security vulnerabilities.
Provide:
1. Vulnerabilities as a JSON array with fields: line, type, message, severity ("high"|"medium"|"low").
2. Line-by-line explanations as a JSON array: {{ line, explanation }}
3. Suggested fixes as a JSON array: {{ line, fix }}

Solidity code:
```solidity
{source}
```
Return your answer as a JSON object with these properties: vulnerabilities, explanations, suggestedFixes. No commentary or formatting."#
    )
}

pub(crate) fn http_client(settings: &VendorSettings, label: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("sol-audit/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(30)))
        .build()
        .with_context(|| format!("failed to build {label} HTTP client"))
}

/// Rate limits and server errors are transient; other client errors are not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request, retrying transport errors and transient statuses with
/// exponential backoff (200ms doubling, capped at 5s).
pub(crate) async fn send_with_retry<F>(label: &str, max_retries: u32, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder + Send + Sync,
{
    let mut attempt = 0u32;
    let mut backoff = Duration::from_millis(200);
    loop {
        let response = match build().send().await {
            Ok(resp) => resp,
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err).with_context(|| format!("failed to call {label} API"));
                }
                warn!(attempt, error = %err, "{label} request failed; retrying");
                sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(5));
                attempt += 1;
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            if attempt >= max_retries || !is_retryable(status) {
                let body = response.text().await.unwrap_or_default();
                bail!("{label} API error ({status}): {body}");
            }
            warn!(attempt, %status, "{label} returned an error; retrying");
            sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(5));
            attempt += 1;
            continue;
        }

        return Ok(response);
    }
}
