// =============================================================================
// AnalystOracle — the single seam touching the opaque LLM vendor
// =============================================================================

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonObject,
};
use async_openai::Client as OpenAiClient;
use async_trait::async_trait;
use tracing::instrument;

use super::AnalystProfile;

/// The only boundary between the pipeline and an LLM vendor. Callers pass a
/// fully composed prompt; implementations return raw JSON for the caller's
/// stage-specific structural validator to deserialize.
#[async_trait]
pub trait AnalystOracle: Send + Sync {
    async fn ask(&self, profile: &AnalystProfile, prompt: &str) -> anyhow::Result<serde_json::Value>;
}

/// Production oracle backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiOracle {
    client: OpenAiClient<OpenAIConfig>,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, model: impl Into<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key.into());
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }

        Self {
            client: OpenAiClient::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnalystOracle for OpenAiOracle {
    #[instrument(skip(self, prompt), name = "oracle::ask")]
    async fn ask(&self, profile: &AnalystProfile, prompt: &str) -> anyhow::Result<serde_json::Value> {
        let system = format!(
            "You are {}, a trading analyst applying a {:?} methodology. \
             Respond with a single JSON object and nothing else.",
            profile.display_name, profile.methodology
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .response_format(ResponseFormat::JsonObject(ResponseFormatJsonObject::default()))
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.to_string())
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("oracle returned no message content"))?;

        let parsed: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("oracle response was not valid JSON: {e}"))?;

        Ok(parsed)
    }
}

impl std::fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("model", &self.model)
            .field("client", &"<redacted>")
            .finish()
    }
}
