use crate::config::Endpoint;
use crate::error::{ClientError, JudgeError};
use crate::judge::{build_judge_prompt, parse_judgement};
use crate::models::Judgement;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use tracing::debug;

/// Produces answers from the model under test
#[async_trait]
pub trait Answerer {
    async fn answer(&self, question: &str) -> Result<String, ClientError>;
}

/// Scores a candidate answer against the reference answer
#[async_trait]
pub trait Judge {
    async fn judge(
        &self,
        question: &str,
        reference_answer: &str,
        model_answer: &str,
    ) -> Result<Judgement, JudgeError>;
}

/// Thin wrapper around an OpenAI-compatible chat completion endpoint
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    endpoint: Endpoint,
}

impl ChatClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(endpoint.api_key.clone())
            .with_api_base(endpoint.base_url.trim_end_matches('/'));

        Self {
            client: Client::with_config(openai_config),
            endpoint: endpoint.clone(),
        }
    }

    /// Build a chat completion request, optionally forcing a JSON object reply
    fn build_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        json_mode: bool,
    ) -> Result<CreateChatCompletionRequest, ClientError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.endpoint.model)
            .messages(messages)
            .temperature(self.endpoint.temperature as f32);

        if let Some(max_tokens) = self.endpoint.max_tokens {
            builder.max_tokens(u16::try_from(max_tokens).unwrap_or(u16::MAX));
        }
        if json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }

        Ok(builder.build()?)
    }

    /// Send the request and return the first choice's content
    async fn complete(&self, request: CreateChatCompletionRequest) -> Result<String, ClientError> {
        let response = self.client.chat().create(request).await?;
        Self::extract_content(response)
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String, ClientError> {
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion finished"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClientError::EmptyResponse)
    }
}

/// The model being benchmarked, prompted with a fixed system preamble
pub struct ModelUnderTest {
    chat: ChatClient,
    system_prompt: String,
}

impl ModelUnderTest {
    pub fn new(endpoint: &Endpoint, system_prompt: impl Into<String>) -> Self {
        Self {
            chat: ChatClient::new(endpoint),
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl Answerer for ModelUnderTest {
    async fn answer(&self, question: &str) -> Result<String, ClientError> {
        let system_message: ChatCompletionRequestMessage =
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()?
                .into();

        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(question.to_string())
                .build()?
                .into();

        let request = self
            .chat
            .build_request(vec![system_message, user_message], false)?;
        self.chat.complete(request).await
    }
}

/// Judge backed by a chat model in JSON mode
pub struct ChatJudge {
    chat: ChatClient,
}

impl ChatJudge {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            chat: ChatClient::new(endpoint),
        }
    }
}

#[async_trait]
impl Judge for ChatJudge {
    async fn judge(
        &self,
        question: &str,
        reference_answer: &str,
        model_answer: &str,
    ) -> Result<Judgement, JudgeError> {
        let prompt = build_judge_prompt(question, reference_answer, model_answer);

        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(ClientError::from)?
                .into();

        let request = self.chat.build_request(vec![user_message], true)?;
        let content = self.chat.complete(request).await?;

        parse_judgement(&content)
    }
}
