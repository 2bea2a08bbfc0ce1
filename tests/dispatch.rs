mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{connect, FakeUpstream, Reply};
use geoglows_mcp::dispatcher::{Dispatcher, ToolCall, ToolInvoker, ToolSelector};
use geoglows_mcp::models::{ReturnPeriodTable, ToolName};
use geoglows_mcp::{Error, Result};

/// Picks a tool from keywords and takes the first number as the river id.
struct KeywordSelector;

#[async_trait]
impl ToolSelector for KeywordSelector {
    async fn select_tool(&self, task: &str) -> Result<ToolCall> {
        let task = task.to_lowercase();
        let tool = if task.contains("return period") {
            ToolName::GetReturnPeriods
        } else if task.contains("historical") {
            ToolName::GetHistoricalStreamflow
        } else if task.contains("stats") {
            ToolName::GetForecastStats
        } else if task.contains("forecast") {
            ToolName::GetForecastedStreamflow
        } else {
            return Err(Error::Selection(format!("no tool for {:?}", task)));
        };

        let river_id: i64 = task
            .split(|c: char| !c.is_ascii_digit() && c != '-')
            .find_map(|word| word.parse().ok())
            .ok_or_else(|| Error::Selection("no river id in task".to_string()))?;

        ToolCall::new(tool, json!({ "river_id": river_id }))
    }
}

/// Replies with a canned result and counts invocations.
struct CannedInvoker {
    reply: fn() -> Result<Value>,
    calls: AtomicUsize,
}

impl CannedInvoker {
    fn new(reply: fn() -> Result<Value>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInvoker for CannedInvoker {
    async fn invoke(&self, _call: &ToolCall) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

fn forecast_payload() -> Value {
    json!([{"time": "2025-10-24T00:00:00+00:00", "flow_median": 3752.61}])
}

#[tokio::test]
async fn result_is_passed_through_verbatim() {
    let invoker = CannedInvoker::new(|| Ok(forecast_payload()));
    let dispatcher = Dispatcher::new(KeywordSelector, invoker.clone());

    let outcome = dispatcher
        .dispatch("Forecast for river 760701588")
        .await
        .unwrap();

    assert_eq!(outcome.tool, ToolName::GetForecastedStreamflow);
    assert_eq!(outcome.river_id, Some(760701588));
    assert_eq!(outcome.data, forecast_payload());
    assert_eq!(invoker.calls(), 1);
}

#[tokio::test]
async fn selection_failure_makes_no_call() {
    let invoker = CannedInvoker::new(|| Ok(Value::Null));
    let dispatcher = Dispatcher::new(KeywordSelector, invoker.clone());

    let err = dispatcher.dispatch("what's the weather?").await.unwrap_err();

    assert!(matches!(err, Error::Selection(_)));
    assert_eq!(invoker.calls(), 0);
}

#[tokio::test]
async fn tool_errors_propagate_unchanged() {
    let cases: [(fn() -> Result<Value>, fn(&Error) -> bool); 3] = [
        (
            || Err(Error::InvalidParameter("river_id must be positive".into())),
            Error::is_invalid_parameter,
        ),
        (
            || Err(Error::Upstream("status: 500".into())),
            Error::is_upstream,
        ),
        (
            || Err(Error::Transport("channel closed".into())),
            Error::is_transport,
        ),
    ];

    for (reply, is_kind) in cases {
        let invoker = CannedInvoker::new(reply);
        let dispatcher = Dispatcher::new(KeywordSelector, invoker.clone());

        let err = dispatcher.dispatch("stats for river 12345").await.unwrap_err();

        assert!(is_kind(&err), "got {err:?}");
        assert_eq!(err.to_string(), reply().unwrap_err().to_string());
        assert_eq!(invoker.calls(), 1);
    }
}

#[tokio::test]
async fn return_periods_end_to_end() {
    let fixture = json!({
        "12345": {"2-year": 22801.988, "5-year": 29457.746, "100-year": 45235.886}
    });
    let upstream = FakeUpstream::start(Reply::Json(fixture.clone())).await;
    let (session, _server) = connect(&upstream).await;
    let dispatcher = Dispatcher::new(KeywordSelector, Arc::new(session));

    let outcome = dispatcher
        .dispatch("Return periods for river 12345")
        .await
        .unwrap();

    assert_eq!(outcome.tool, ToolName::GetReturnPeriods);
    assert_eq!(outcome.data, fixture);
    assert_eq!(upstream.hits().len(), 1);

    let table = ReturnPeriodTable::from_payload(&outcome.data).unwrap();
    assert!(table.contains("2-year"));
    assert!(table.contains("100-year"));
}

#[tokio::test]
async fn invalid_river_id_end_to_end() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;
    let (session, _server) = connect(&upstream).await;
    let dispatcher = Dispatcher::new(KeywordSelector, Arc::new(session));

    let err = dispatcher
        .dispatch("historical flow for river -5")
        .await
        .unwrap_err();

    assert!(err.is_invalid_parameter(), "got {err:?}");
    assert!(upstream.hits().is_empty());
}
