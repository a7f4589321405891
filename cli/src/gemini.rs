use anyhow::{Context, Result, bail};

use catlog_core::chat::{ChatProvider, ChatRequest};
use catlog_core::gemini::{ErrorResponse, GenerateContentResponse, build_request, response_text};

use crate::config::ChatConfig;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Must be called from inside a tokio runtime.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "catlog-cli/{} (cat health log)",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt: tokio::runtime::Handle::current(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }

    pub async fn generate_async(&self, request: &ChatRequest<'_>) -> Result<Option<String>> {
        let body = build_request(request);
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            bail!("Gemini API returned {status}: {message}");
        }

        let data: GenerateContentResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        Ok(response_text(data))
    }
}

impl ChatProvider for GeminiClient {
    /// Blocks on the runtime handle; call from a blocking thread.
    fn generate(&self, request: &ChatRequest<'_>) -> Result<Option<String>> {
        self.rt.block_on(self.generate_async(request))
    }
}
