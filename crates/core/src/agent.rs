use crate::config::StoreInfo;
use crate::generation::{AssistantTurn, ChatMessage, Generator, ToolCall, ToolSpec};
use crate::index::IndexHandle;
use crate::{AnswerError, SearchError, SimilarityResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the draft answer to a question. Implementations decide how
/// retrieval is used.
#[async_trait]
pub trait AnswerStrategy: Send + Sync {
    async fn draft(&self, question: &str) -> Result<String, AnswerError>;
}

/// Similarity search over the index, exposed as the agent's only tool.
#[derive(Clone)]
pub struct SimilaritySearchTool {
    index: IndexHandle,
    info: StoreInfo,
    top_k: usize,
}

#[derive(Deserialize)]
struct SearchArguments {
    query: String,
}

impl SimilaritySearchTool {
    pub fn new(index: IndexHandle, info: StoreInfo, top_k: usize) -> Self {
        Self {
            index,
            info,
            top_k: top_k.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.info.name.clone(),
            description: format!(
                "Useful for when you need to answer questions about {}. \
                 Whatever you are asked, pass the full question as input. {}",
                self.info.name, self.info.description
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to search the document for"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub async fn search(&self, query: &str) -> Result<SimilarityResult, SearchError> {
        self.index.similarity_search_with_score(query, self.top_k).await
    }

    async fn call(&self, call: &ToolCall) -> Result<String, AnswerError> {
        if call.name != self.info.name {
            return Err(AnswerError::ToolMisuse {
                tool: call.name.clone(),
                details: "no such tool".to_string(),
            });
        }

        let arguments: SearchArguments =
            serde_json::from_str(&call.arguments).map_err(|error| AnswerError::ToolMisuse {
                tool: call.name.clone(),
                details: format!("invalid arguments: {error}"),
            })?;

        let hits = self.search(&arguments.query).await?;
        debug!(query = %arguments.query, hits = hits.len(), "tool search");
        Ok(format_hits(&hits))
    }
}

/// Renders search hits as numbered passages for a prompt.
pub fn format_hits(hits: &SimilarityResult) -> String {
    if hits.is_empty() {
        return "No matching passages found.".to_string();
    }

    let mut rendered = String::new();
    for (position, hit) in hits.iter().enumerate() {
        let page = hit
            .metadata
            .as_ref()
            .map(|metadata| format!(" (page {})", metadata.page))
            .unwrap_or_default();
        let _ = writeln!(rendered, "[{}]{}\n{}\n", position + 1, page, hit.text.trim());
    }
    rendered.trim_end().to_string()
}

/// Agent loop: the model may call the search tool for up to `max_rounds`
/// rounds. Once the budget is spent it gets one more turn with the tool
/// withheld, so it has to answer from what it has gathered.
pub struct ToolUsingAgent {
    tool: SimilaritySearchTool,
    generator: Arc<dyn Generator>,
    max_rounds: usize,
}

impl ToolUsingAgent {
    pub fn new(tool: SimilaritySearchTool, generator: Arc<dyn Generator>, max_rounds: usize) -> Self {
        Self {
            tool,
            generator,
            max_rounds,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an agent designed to answer questions about sets of documents. \
             You have access to a tool for interacting with {name}: {description}. \
             Use it to look up the facts you need before answering. \
             If the question does not seem relevant to {name}, say that you do not know.",
            name = self.tool.name(),
            description = self.tool.info.description,
        )
    }
}

#[async_trait]
impl AnswerStrategy for ToolUsingAgent {
    async fn draft(&self, question: &str) -> Result<String, AnswerError> {
        let spec = [self.tool.spec()];
        let mut messages = vec![
            ChatMessage::System(self.system_prompt()),
            ChatMessage::User(question.to_string()),
        ];

        let mut round = 0;
        loop {
            let tools: &[ToolSpec] = if round < self.max_rounds { &spec } else { &[] };

            match self.generator.converse(&messages, tools).await? {
                AssistantTurn::Answer(text) => {
                    info!(rounds = round, "agent answered");
                    return Ok(text);
                }
                AssistantTurn::ToolCalls { content, calls } => {
                    if tools.is_empty() {
                        warn!(max_rounds = self.max_rounds, "tool call after the budget");
                        return Err(AnswerError::ToolMisuse {
                            tool: calls
                                .first()
                                .map(|call| call.name.clone())
                                .unwrap_or_default(),
                            details: "tool called after the retrieval budget was spent"
                                .to_string(),
                        });
                    }

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(ChatMessage::Tool {
                            call_id: call.id.clone(),
                            content: self.tool.call(call).await?,
                        });
                    }

                    messages.push(ChatMessage::Assistant {
                        content,
                        tool_calls: calls,
                    });
                    messages.extend(results);
                    round += 1;
                }
            }
        }
    }
}

/// One search, one completion over the retrieved passages.
pub struct RetrieveThenGenerate {
    tool: SimilaritySearchTool,
    generator: Arc<dyn Generator>,
}

impl RetrieveThenGenerate {
    pub fn new(tool: SimilaritySearchTool, generator: Arc<dyn Generator>) -> Self {
        Self { tool, generator }
    }
}

pub fn grounded_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the following passages from the document to answer the question. \
         If the answer is not in the passages, say that you do not know.\n\n\
         {context}\n\nQuestion: {question}\nAnswer:"
    )
}

#[async_trait]
impl AnswerStrategy for RetrieveThenGenerate {
    async fn draft(&self, question: &str) -> Result<String, AnswerError> {
        let hits = self.tool.search(question).await?;
        let prompt = grounded_prompt(question, &format_hits(&hits));
        Ok(self.generator.complete(&prompt).await?)
    }
}
