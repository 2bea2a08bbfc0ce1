//! HTTP client for the GEOGLOWS hydrology API.
//!
//! Every operation validates its arguments first and then issues exactly one
//! GET request. There is no retry and no caching; the upstream response (or
//! the connection error) is surfaced as-is.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::error::{Error, Result};
use crate::models::{parse_optional_date, upstream_date, DateRange, RiverReachId};

#[derive(Debug, Clone)]
pub struct GeoglowsClient {
    client: Client,
    api_base: String,
}

impl GeoglowsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }

    /// Ensemble forecast for a reach. Without a date the latest forecast is returned.
    pub async fn forecasted_streamflow(&self, river_id: i64, date: Option<&str>) -> Result<Value> {
        let river_id = RiverReachId::new(river_id)?;
        let date = parse_optional_date("date", date)?;
        self.make_request("forecast", river_id, &date_query(date)).await
    }

    /// Retrospective simulation, optionally bounded to a date window.
    pub async fn historical_streamflow(
        &self,
        river_id: i64,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Value> {
        let river_id = RiverReachId::new(river_id)?;
        let range = DateRange::parse(start_date, end_date)?;

        let mut query = Vec::new();
        if let Some(start) = range.start {
            query.push(("start_date", upstream_date(start)));
        }
        if let Some(end) = range.end {
            query.push(("end_date", upstream_date(end)));
        }
        self.make_request("retrospective", river_id, &query).await
    }

    /// Per-timestep ensemble statistics for a forecast.
    pub async fn forecast_stats(&self, river_id: i64, date: Option<&str>) -> Result<Value> {
        let river_id = RiverReachId::new(river_id)?;
        let date = parse_optional_date("date", date)?;
        self.make_request("forecaststats", river_id, &date_query(date))
            .await
    }

    pub async fn return_periods(&self, river_id: i64) -> Result<Value> {
        let river_id = RiverReachId::new(river_id)?;
        self.make_request("returnperiods", river_id, &[]).await
    }

    /// Makes an HTTP GET request and parses the JSON response
    async fn make_request(
        &self,
        endpoint: &str,
        river_id: RiverReachId,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let url = format!("{}/{}/{}", self.api_base, endpoint, river_id);
        tracing::debug!(%url, ?query, "requesting upstream");

        let response = self
            .client
            .get(&url)
            .query(&[("format", "json")])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, %status, "upstream request failed");
            return Err(Error::Upstream(format!(
                "{} for river {} failed with status: {}",
                endpoint, river_id, status
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            Error::Upstream(format!(
                "{} for river {} returned malformed JSON: {}",
                endpoint, river_id, e
            ))
        })
    }
}

fn date_query(date: Option<NaiveDate>) -> Vec<(&'static str, String)> {
    date.map(|d| vec![("date", upstream_date(d))])
        .unwrap_or_default()
}
