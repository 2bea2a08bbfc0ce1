use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{ReturnPeriodTable, RiverReachId};

/// Serializes an upstream payload with two-space indentation
pub fn format_payload(payload: &Value) -> Result<String> {
    serde_json::to_string_pretty(payload)
        .map_err(|e| Error::Upstream(format!("failed to serialize payload: {}", e)))
}

/// Formats return periods into a human-readable table
pub fn format_return_periods(river_id: RiverReachId, table: &ReturnPeriodTable) -> String {
    let mut output = format!("Return Periods for river {}:\n\n", river_id);
    for (label, discharge) in table.iter() {
        output.push_str(&format!("  {:>10}: {:.1} m\u{00b3}/s\n", label, discharge));
    }
    output
}
