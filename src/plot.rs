//! Renders streamflow time series to PNG charts.
//!
//! Payloads come in two layouts: a list of records (`[{"time": .., "flow_median": ..}]`)
//! or parallel columns (`{"datetime": [..], "flow_median": [..]}`). Both are
//! reduced to a [`StreamflowSeries`] before anything is drawn, and the chart is
//! encoded in memory so a failed render never leaves a file behind.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use plotters::prelude::*;
use plotters::style::FontStyle;
use serde_json::{Map, Value};
use tracing::info;

use crate::constants::{PLOT_HEIGHT, PLOT_WIDTH};
use crate::dispatcher::DispatchOutcome;
use crate::error::{Error, Result};
use crate::models::ToolName;

const TIME_KEYS: [&str; 2] = ["time", "datetime"];

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Which columns of a payload make up the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub value_column: String,
    /// Legend entry for the value line.
    pub label: String,
    /// Lower and upper bound columns drawn as a shaded band.
    pub band: Option<(String, String)>,
    /// Use the only numeric column when `value_column` is absent.
    pub fallback_to_sole_column: bool,
}

impl ChartSpec {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: "Streamflow".to_string(),
            label: name.clone(),
            value_column: name,
            band: None,
            fallback_to_sole_column: false,
        }
    }

    /// Chart layout for a tool's result, or `None` when it is not a time series.
    pub fn for_tool(tool: ToolName, river_id: Option<i64>) -> Option<Self> {
        let reach = river_id
            .map(|id| format!(" for River {}", id))
            .unwrap_or_default();
        match tool {
            ToolName::GetForecastedStreamflow => Some(Self {
                title: format!("Forecasted Streamflow{}", reach),
                value_column: "flow_median".to_string(),
                label: "Median Flow".to_string(),
                band: Some((
                    "flow_uncertainty_lower".to_string(),
                    "flow_uncertainty_upper".to_string(),
                )),
                fallback_to_sole_column: false,
            }),
            ToolName::GetHistoricalStreamflow => Some(Self {
                title: format!("Historical Streamflow{}", reach),
                value_column: river_id.map(|id| id.to_string()).unwrap_or_default(),
                label: "Retrospective Flow".to_string(),
                band: None,
                fallback_to_sole_column: true,
            }),
            ToolName::GetForecastStats => Some(Self {
                title: format!("Forecast Statistics{}", reach),
                label: "Average Flow".to_string(),
                ..Self::column("flow_avg")
            }),
            ToolName::GetReturnPeriods => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowPoint {
    pub time: DateTime<Utc>,
    /// Discharge in m³/s.
    pub value: f64,
    pub band: Option<(f64, f64)>,
}

/// A discharge series in strictly ascending time order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamflowSeries {
    points: Vec<FlowPoint>,
}

impl StreamflowSeries {
    pub fn new(points: Vec<FlowPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::Render("series has no data points".to_string()));
        }
        if let Some(w) = points.windows(2).find(|w| w[1].time <= w[0].time) {
            return Err(Error::Render(format!(
                "series is not time-ordered: {} follows {}",
                w[1].time, w[0].time
            )));
        }
        Ok(Self { points })
    }

    /// Extracts the series described by `spec` from an upstream payload.
    ///
    /// Samples that are null or not finite are skipped.
    pub fn from_payload(payload: &Value, spec: &ChartSpec) -> Result<Self> {
        let table = Table::from_payload(payload)?;
        let value_column = table.resolve_column(spec)?;

        let mut points = Vec::with_capacity(table.times.len());
        for (i, raw_time) in table.times.iter().enumerate() {
            let Some(value) = table.sample(&value_column, i) else {
                continue;
            };
            let band = spec.band.as_ref().and_then(|(lo, hi)| {
                Some((table.sample(lo, i)?, table.sample(hi, i)?))
            });
            points.push(FlowPoint {
                time: parse_timestamp(raw_time)?,
                value,
                band,
            });
        }

        Self::new(points)
    }

    pub fn points(&self) -> &[FlowPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn value_bounds(&self) -> (f64, f64) {
        let values = self.points.iter().flat_map(|p| {
            std::iter::once(p.value).chain(p.band.into_iter().flat_map(|(lo, hi)| [lo, hi]))
        });
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        if (max - min).abs() < f64::EPSILON {
            (min - 1.0, max + 1.0)
        } else {
            let pad = (max - min) * 0.05;
            (min - pad, max + pad)
        }
    }
}

/// Row-aligned view over either payload layout.
struct Table<'a> {
    times: Vec<&'a str>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

impl<'a> Table<'a> {
    fn from_payload(payload: &'a Value) -> Result<Self> {
        match payload {
            Value::Array(rows) => Self::from_records(rows),
            Value::Object(obj) => Self::from_columns(obj),
            _ => Err(Error::Render(
                "payload is neither a record list nor a column table".to_string(),
            )),
        }
    }

    fn from_records(rows: &'a [Value]) -> Result<Self> {
        let mut times = Vec::with_capacity(rows.len());
        let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();

        for (i, row) in rows.iter().enumerate() {
            let obj = row
                .as_object()
                .ok_or_else(|| Error::Render(format!("record {} is not an object", i)))?;
            let time = time_field(obj)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Render(format!("record {} has no timestamp", i)))?;
            times.push(time);

            for (key, value) in obj.iter().filter(|(k, _)| !TIME_KEYS.contains(&k.as_str())) {
                let idx = match columns.iter().position(|(name, _)| name == key) {
                    Some(idx) => idx,
                    None => {
                        columns.push((key.clone(), vec![None; i]));
                        columns.len() - 1
                    }
                };
                columns[idx].1.push(finite(value));
            }
            for (_, samples) in columns.iter_mut() {
                samples.resize(i + 1, None);
            }
        }

        Ok(Self { times, columns })
    }

    fn from_columns(obj: &'a Map<String, Value>) -> Result<Self> {
        let times = time_field(obj)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Render("column table has no time column".to_string()))?
            .iter()
            .map(|t| {
                t.as_str()
                    .ok_or_else(|| Error::Render(format!("timestamp {} is not a string", t)))
            })
            .collect::<Result<Vec<_>>>()?;

        let columns = obj
            .iter()
            .filter(|(k, _)| !TIME_KEYS.contains(&k.as_str()))
            .filter_map(|(k, v)| v.as_array().map(|a| (k, a)))
            .filter(|(_, a)| a.len() == times.len())
            .map(|(k, a)| (k.clone(), a.iter().map(finite).collect()))
            .collect();

        Ok(Self { times, columns })
    }

    fn resolve_column(&self, spec: &ChartSpec) -> Result<String> {
        if self.columns.iter().any(|(name, _)| *name == spec.value_column) {
            return Ok(spec.value_column.clone());
        }

        if spec.fallback_to_sole_column {
            let numeric: Vec<&String> = self
                .columns
                .iter()
                .filter(|(_, samples)| samples.iter().any(Option::is_some))
                .map(|(name, _)| name)
                .collect();
            if let [only] = numeric.as_slice() {
                return Ok((*only).clone());
            }
        }

        Err(Error::Render(format!(
            "payload has no column named {:?}",
            spec.value_column
        )))
    }

    fn sample(&self, column: &str, row: usize) -> Option<f64> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, samples)| samples.get(row).copied().flatten())
    }
}

fn time_field(obj: &Map<String, Value>) -> Option<&Value> {
    TIME_KEYS.iter().find_map(|k| obj.get(*k))
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Parses RFC 3339 timestamps, naive date-times (taken as UTC) and bare dates.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::Render(format!("unrecognized timestamp {:?}", raw)))
}

fn render_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Render(format!("{:?}", e))
}

/// Registers the bundled font with plotters, once per process.
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "invalid font data".to_string())
        })
        .clone()
        .map_err(|e| Error::Render(format!("cannot load chart font: {}", e)))
}

/// Draws the series and returns the PNG bytes.
///
/// The x axis counts hours from the first sample; tick labels show the
/// UTC date and time.
pub fn render_png(series: &StreamflowSeries, spec: &ChartSpec) -> Result<Vec<u8>> {
    ensure_font()?;

    let (width, height) = (PLOT_WIDTH, PLOT_HEIGHT);
    let mut buffer = vec![0u8; (width * height * 3) as usize];

    let start = series.points[0].time;
    let hours = |t: DateTime<Utc>| (t - start).num_seconds() as f64 / 3600.0;
    let x_max = hours(series.points[series.len() - 1].time).max(1.0);
    let (y_min, y_max) = series.value_bounds();

    let time_label = |x: &f64| {
        (start + Duration::seconds((x * 3600.0).round() as i64))
            .format("%Y-%m-%d %H:%M")
            .to_string()
    };
    let value_label = |y: &f64| format!("{:.0}", y);

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, (FONT_FAMILY, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(80)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("Time (UTC)")
            .y_desc("Discharge (m³/s)")
            .x_labels(6)
            .x_label_formatter(&time_label)
            .y_label_formatter(&value_label)
            .label_style((FONT_FAMILY, 13))
            .axis_desc_style((FONT_FAMILY, 15))
            .light_line_style(RGBColor(235, 235, 235))
            .draw()
            .map_err(render_err)?;

        let band: Vec<(f64, f64, f64)> = series
            .points
            .iter()
            .filter_map(|p| p.band.map(|(lo, hi)| (hours(p.time), lo, hi)))
            .collect();
        if band.len() > 1 {
            let outline: Vec<(f64, f64)> = band
                .iter()
                .map(|(x, _, hi)| (*x, *hi))
                .chain(band.iter().rev().map(|(x, lo, _)| (*x, *lo)))
                .collect();
            let fill = RGBColor(192, 192, 192).mix(0.5);
            chart
                .draw_series(std::iter::once(Polygon::new(outline, fill.filled())))
                .map_err(render_err)?
                .label("Uncertainty Bounds")
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], fill.filled()));
        }

        chart
            .draw_series(LineSeries::new(
                series.points.iter().map(|p| (hours(p.time), p.value)),
                BLUE.stroke_width(2),
            ))
            .map_err(render_err)?
            .label(spec.label.as_str())
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font((FONT_FAMILY, 13))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    let bitmap = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| Error::Render("bitmap buffer has the wrong size".to_string()))?;
    let mut png = Vec::new();
    bitmap
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| Error::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

/// Renders the series to `path`. Nothing is written if rendering fails.
pub fn save_chart(series: &StreamflowSeries, spec: &ChartSpec, path: &Path) -> Result<()> {
    let png = render_png(series, spec)?;

    let staging = path.with_extension("png.partial");
    std::fs::write(&staging, &png)
        .and_then(|_| std::fs::rename(&staging, path))
        .map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            Error::Render(format!("failed to write {}: {}", path.display(), e))
        })?;

    info!(path = %path.display(), points = series.len(), "chart saved");
    Ok(())
}

/// Plots a dispatched result. Returns `None` for results that are not time series.
pub fn plot_outcome(outcome: &DispatchOutcome, path: &Path) -> Result<Option<PathBuf>> {
    let Some(spec) = ChartSpec::for_tool(outcome.tool, outcome.river_id) else {
        info!(tool = %outcome.tool, "result is not a time series, skipping plot");
        return Ok(None);
    };

    let series = StreamflowSeries::from_payload(&outcome.data, &spec)?;
    save_chart(&series, &spec, path)?;
    Ok(Some(path.to_path_buf()))
}
