//! Maps a free-form task to a single tool call and passes its result through.
//!
//! The decision of *which* tool to call is delegated to a [`ToolSelector`];
//! the call itself goes through a [`ToolInvoker`]. The dispatcher makes at
//! most one call per task and never rewrites the result or the error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::ToolName;

/// A concrete tool invocation: which tool and with what arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: ToolName,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Builds a call from JSON arguments, which must be an object.
    pub fn new(tool: ToolName, arguments: Value) -> Result<Self> {
        match arguments {
            Value::Object(arguments) => Ok(Self { tool, arguments }),
            Value::Null => Ok(Self {
                tool,
                arguments: Map::new(),
            }),
            other => Err(Error::Selection(format!(
                "arguments for {} must be a JSON object, got {}",
                tool, other
            ))),
        }
    }

    /// The river reach the call targets, when it is an integer.
    pub fn river_id(&self) -> Option<i64> {
        self.arguments.get("river_id").and_then(Value::as_i64)
    }
}

/// Decides which tool answers a task.
#[async_trait]
pub trait ToolSelector: Send + Sync {
    async fn select_tool(&self, task: &str) -> Result<ToolCall>;
}

/// Executes a tool call against the registry.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> Result<Value>;
}

#[async_trait]
impl<T: ToolInvoker + ?Sized> ToolInvoker for Arc<T> {
    async fn invoke(&self, call: &ToolCall) -> Result<Value> {
        (**self).invoke(call).await
    }
}

/// Result of a dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    #[serde(rename = "data_request")]
    pub tool: ToolName,
    #[serde(rename = "reach_id")]
    pub river_id: Option<i64>,
    /// Raw JSON returned by the tool.
    pub data: Value,
}

pub struct Dispatcher<S, I> {
    selector: S,
    invoker: I,
}

impl<S: ToolSelector, I: ToolInvoker> Dispatcher<S, I> {
    pub fn new(selector: S, invoker: I) -> Self {
        Self { selector, invoker }
    }

    pub async fn dispatch(&self, task: &str) -> Result<DispatchOutcome> {
        let call = self.selector.select_tool(task).await?;
        info!(tool = %call.tool, river_id = ?call.river_id(), "dispatching task");
        debug!(arguments = ?call.arguments, "tool arguments");

        let data = self.invoker.invoke(&call).await?;

        Ok(DispatchOutcome {
            tool: call.tool,
            river_id: call.river_id(),
            data,
        })
    }
}
