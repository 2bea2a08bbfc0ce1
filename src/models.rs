use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Identifiers and Dates
// ============================================================================

/// Identifier of a river reach in the hydrology model. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RiverReachId(u64);

impl RiverReachId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw <= 0 {
            return Err(Error::invalid(format!(
                "river_id must be a positive integer, got {}",
                raw
            )));
        }
        Ok(Self(raw as u64))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RiverReachId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a calendar date given as `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| {
            Error::invalid(format!(
                "{} must be a calendar date (YYYYMMDD or YYYY-MM-DD), got {:?}",
                field, raw
            ))
        })
}

/// Parses an optional date parameter. Blank strings count as absent.
pub fn parse_optional_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(field, s).map(Some),
    }
}

/// Formats a date the way the upstream API expects it.
pub fn upstream_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Optional bounds for a retrospective query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(Error::invalid(format!(
                    "end_date {} precedes start_date {}",
                    e, s
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Self::new(
            parse_optional_date("start_date", start)?,
            parse_optional_date("end_date", end)?,
        )
    }
}

// ============================================================================
// Tool Names
// ============================================================================

/// The operations exposed by the tool registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetForecastedStreamflow,
    GetHistoricalStreamflow,
    GetForecastStats,
    GetReturnPeriods,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::GetForecastedStreamflow,
        ToolName::GetHistoricalStreamflow,
        ToolName::GetForecastStats,
        ToolName::GetReturnPeriods,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetForecastedStreamflow => "get_forecasted_streamflow",
            Self::GetHistoricalStreamflow => "get_historical_streamflow",
            Self::GetForecastStats => "get_forecast_stats",
            Self::GetReturnPeriods => "get_return_periods",
        }
    }

    /// Whether the tool returns a time series that can be plotted.
    pub fn is_time_series(self) -> bool {
        !matches!(self, Self::GetReturnPeriods)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Selection(format!("unknown tool: {}", s)))
    }
}

// ============================================================================
// MCP Tool Request Models
// ============================================================================

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ForecastRequest {
    /// The ID of the river reach.
    pub river_id: i64,
    /// Forecast issue date in YYYYMMDD format. Defaults to the latest forecast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct HistoricalRequest {
    /// The ID of the river reach.
    pub river_id: i64,
    /// First day of the retrospective window in YYYYMMDD format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Last day of the retrospective window in YYYYMMDD format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ReturnPeriodsRequest {
    /// The ID of the river reach.
    pub river_id: i64,
}

// ============================================================================
// Return Periods
// ============================================================================

/// Discharge thresholds keyed by return-period label, as the upstream names them.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPeriodTable {
    entries: Vec<(String, f64)>,
}

impl ReturnPeriodTable {
    /// Builds the table from an upstream payload.
    ///
    /// Accepts thresholds nested a level down (e.g. keyed by river id) or a
    /// flat `{label: value}` object. A nested table wins over top-level
    /// numbers, and known metadata keys are never thresholds. Labels are
    /// kept verbatim.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::Upstream("return periods payload is not an object".into()))?;

        let nested = obj
            .values()
            .filter_map(Value::as_object)
            .map(numeric_entries)
            .find(|e| !e.is_empty());
        let entries = nested.unwrap_or_else(|| numeric_entries(obj));

        if entries.is_empty() {
            return Err(Error::Upstream(
                "return periods payload holds no thresholds".into(),
            ));
        }

        let mut table = Self { entries };
        table
            .entries
            .sort_by_key(|(label, _)| leading_years(label).unwrap_or(u64::MAX));
        Ok(table)
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Entries ordered by return period, shortest first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Numeric fields that describe the payload rather than a threshold.
const METADATA_KEYS: [&str; 4] = ["river_id", "reach_id", "units", "ensemble_members"];

fn numeric_entries(obj: &serde_json::Map<String, Value>) -> Vec<(String, f64)> {
    obj.iter()
        .filter(|(k, _)| !METADATA_KEYS.contains(&k.as_str()))
        .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
        .collect()
}

fn leading_years(label: &str) -> Option<u64> {
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
