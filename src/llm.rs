//! Language-model tool selection over an OpenAI-compatible chat API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatcher::{ToolCall, ToolSelector};
use crate::error::{Error, Result};
use crate::models::ToolName;

const SYSTEM_PROMPT: &str = "\
Help the user access streamflow data from the GEOGLOWS service. \
Answer every request by calling exactly one of the provided tools. \
River reaches are identified by an integer river_id. \
Dates are passed in YYYYMMDD format; leave them out unless the user asks \
for a specific date or period.";

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// A function tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&rmcp::model::Tool> for ToolDefinition {
    fn from(tool: &rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.as_deref().unwrap_or("").to_string(),
            parameters: Value::Object((*tool.input_schema).clone()),
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    tools: Vec<FunctionTool<'a>>,
    tool_choice: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCallMessage>,
}

#[derive(Debug, Deserialize)]
struct ToolCallMessage {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments, as the API sends them.
    #[serde(default)]
    arguments: String,
}

// ============================================================================
// Selector
// ============================================================================

pub struct LlmToolSelector {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    tools: Vec<ToolDefinition>,
}

impl LlmToolSelector {
    /// Creates a selector offering the given registry tools.
    pub fn new(config: &Config, tools: Vec<ToolDefinition>) -> Result<Self> {
        let api_key = config
            .llm_api_key
            .clone()
            .ok_or_else(|| Error::Config("LLM_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        info!(model = %config.llm_model, tools = tools.len(), "tool selector initialized");

        Ok(Self {
            client,
            api_url: config.llm_api_url.clone(),
            api_key,
            model: config.llm_model.clone(),
            tools,
        })
    }
}

#[async_trait]
impl ToolSelector for LlmToolSelector {
    async fn select_tool(&self, task: &str) -> Result<ToolCall> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: task.to_string(),
                },
            ],
            tools: self
                .tools
                .iter()
                .map(|function| FunctionTool {
                    kind: "function",
                    function,
                })
                .collect(),
            tool_choice: "required",
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Selection(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Selection(format!(
                "chat request failed with status {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Selection(format!("unreadable chat response: {}", e)))?;

        parse_tool_call(completion)
    }
}

fn parse_tool_call(completion: ChatCompletionResponse) -> Result<ToolCall> {
    let call = completion
        .choices
        .into_iter()
        .flat_map(|c| c.message.tool_calls)
        .next()
        .ok_or_else(|| Error::Selection("model did not call a tool".to_string()))?;

    debug!(name = %call.function.name, arguments = %call.function.arguments, "model chose tool");

    let tool: ToolName = call.function.name.parse()?;
    let arguments = if call.function.arguments.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&call.function.arguments).map_err(|e| {
            Error::Selection(format!("tool arguments are not valid JSON: {}", e))
        })?
    };

    ToolCall::new(tool, arguments)
}
