use super::{OPENAI_API_BASE, require_api_key};
use crate::provider::{ChatMessage, LanguageModel, Role};
use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatCompletionParams {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

impl Default for ChatCompletionParams {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_API_BASE.to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
        }
    }
}

/// A language model behind any OpenAI-compatible chat completions API.
pub struct ChatCompletionModel {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: Option<u32>,
}

impl ChatCompletionModel {
    /// Creates a client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `params` - API key, base URL and the model identifier used for completions.
    pub fn new(params: ChatCompletionParams) -> Result<Self> {
        let config = OpenAIConfig::new()
            .with_api_key(require_api_key(params.api_key)?)
            .with_api_base(params.base_url);
        Ok(Self {
            client: Client::with_config(config),
            model: params.model,
            max_tokens: params.max_tokens,
        })
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl LanguageModel for ChatCompletionModel {
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if let Some(max_tokens) = self.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args.build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("LLM response had no choices."))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("LLM response had no text content."))
    }
}
