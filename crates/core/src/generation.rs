//! The hosted language model, used both to draft answers (optionally with
//! tool calls) and to reformat them.

use crate::config::ProviderConfig;
use crate::embeddings::api_error_message;
use crate::GenerationError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

const OPENAI_PROVIDER: &str = "openai";

/// A function the model may call, described with a JSON schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    Answer(String),
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Single prompt in, text out.
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    /// One chat turn. With an empty `tools` slice the model must answer.
    async fn converse(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, GenerationError>;
}

pub struct OpenAiChatModel {
    client: Client,
    provider: ProviderConfig,
}

impl OpenAiChatModel {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            provider,
        }
    }

    async fn send(&self, body: Value) -> Result<ChatCompletionMessage, GenerationError> {
        let api_key = self
            .provider
            .api_key()
            .ok_or_else(|| GenerationError::Unauthorized {
                provider: OPENAI_PROVIDER.to_string(),
            })?;
        let endpoint = self.provider.endpoint("chat/completions")?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!(%status, "chat completion rejected");
            return Err(GenerationError::Unauthorized {
                provider: OPENAI_PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat completion failed");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: api_error_message(body),
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.provider.chat_model,
            "temperature": self.provider.temperature,
            "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_wire).collect());
        }
        body
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

fn message_to_wire(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System(content) => json!({ "role": "system", "content": content }),
        ChatMessage::User(content) => json!({ "role": "user", "content": content }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut wire = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                wire["tool_calls"] = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments },
                        })
                    })
                    .collect();
            }
            wire
        }
        ChatMessage::Tool { call_id, content } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

fn tool_to_wire(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn into_turn(message: ChatCompletionMessage) -> Result<AssistantTurn, GenerationError> {
    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        return Ok(AssistantTurn::ToolCalls {
            content: message.content,
            calls,
        });
    }

    match (message.content, message.refusal) {
        (Some(content), _) => Ok(AssistantTurn::Answer(content)),
        (None, Some(refusal)) => Err(GenerationError::MalformedResponse(format!(
            "model refused: {refusal}"
        ))),
        (None, None) => Err(GenerationError::MalformedResponse(
            "message has neither content nor tool calls".to_string(),
        )),
    }
}

#[async_trait]
impl Generator for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        match self
            .converse(&[ChatMessage::User(prompt.to_string())], &[])
            .await?
        {
            AssistantTurn::Answer(text) => Ok(text),
            AssistantTurn::ToolCalls { .. } => Err(GenerationError::MalformedResponse(
                "model requested tools for a plain completion".to_string(),
            )),
        }
    }

    async fn converse(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, GenerationError> {
        debug!(
            model = %self.provider.chat_model,
            messages = messages.len(),
            tools = tools.len(),
            "chat completion"
        );
        let message = self.send(self.request_body(messages, tools)).await?;
        into_turn(message)
    }
}
