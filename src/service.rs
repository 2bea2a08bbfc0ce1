use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;
use std::sync::Arc;

use crate::client::GeoglowsClient;
use crate::error::Error;
use crate::formatters::format_payload;
use crate::models::{ForecastRequest, HistoricalRequest, ReturnPeriodsRequest};

/// Tool registry that serves GEOGLOWS streamflow data over MCP
#[derive(Clone)]
pub struct Geoglows {
    client: Arc<GeoglowsClient>,
    tool_router: ToolRouter<Self>,
}

impl Geoglows {
    pub fn new(client: GeoglowsClient) -> Self {
        Self {
            client: Arc::new(client),
            tool_router: Self::tool_router(),
        }
    }

    /// Wraps an upstream payload as a single pretty-printed JSON text item
    fn respond(result: Result<Value, Error>) -> Result<CallToolResult, McpError> {
        match result {
            Ok(payload) => {
                let text = format_payload(&payload).map_err(McpError::from)?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool call failed");
                Err(e.into())
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for Geoglows {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "geoglows".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                title: None,
                website_url: None,
            },
            instructions: Some(
                "Streamflow data from the GEOGLOWS global hydrology model. \
                Provides ensemble forecasts, forecast statistics, retrospective \
                simulations and return periods for a river reach ID."
                    .to_string(),
            ),
        }
    }
}

#[tool_router]
impl Geoglows {
    #[tool(description = "Get the forecasted streamflow for a given river_id. Optionally provide the forecast date in YYYYMMDD format; defaults to the latest forecast.")]
    async fn get_forecasted_streamflow(
        &self,
        Parameters(request): Parameters<ForecastRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Getting forecast for river: {}", request.river_id);

        Self::respond(
            self.client
                .forecasted_streamflow(request.river_id, request.date.as_deref())
                .await,
        )
    }

    #[tool(description = "Get the historical (retrospective) streamflow for a given river_id. Optionally bound it with start_date and end_date in YYYYMMDD format.")]
    async fn get_historical_streamflow(
        &self,
        Parameters(request): Parameters<HistoricalRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            "Getting historical streamflow for river: {} ({:?} to {:?})",
            request.river_id,
            request.start_date,
            request.end_date
        );

        Self::respond(
            self.client
                .historical_streamflow(
                    request.river_id,
                    request.start_date.as_deref(),
                    request.end_date.as_deref(),
                )
                .await,
        )
    }

    #[tool(description = "Get the forecast statistics (min, percentiles, average, max per timestep) for a given river_id. Optionally provide the forecast date in YYYYMMDD format.")]
    async fn get_forecast_stats(
        &self,
        Parameters(request): Parameters<ForecastRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Getting forecast stats for river: {}", request.river_id);

        Self::respond(
            self.client
                .forecast_stats(request.river_id, request.date.as_deref())
                .await,
        )
    }

    #[tool(description = "Get the return periods (discharge thresholds such as the 2-year and 100-year flow) for a given river_id.")]
    async fn get_return_periods(
        &self,
        Parameters(request): Parameters<ReturnPeriodsRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Getting return periods for river: {}", request.river_id);

        Self::respond(self.client.return_periods(request.river_id).await)
    }
}
