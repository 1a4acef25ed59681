//! `timeseries-json` handler
//!
//! File layout:
//!
//! ```json
//! {"metadata": {...}, "parameter": "streamflow", "unit": "cfs",
//!  "data": [{"time": "2024-01-01T00:00:00Z", "value": 1.5}]}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{DataBody, DatasetData, IoHandler, IoType, TimeSeries};
use crate::error::{QuestError, Result};
use crate::fs::write_atomic;
use crate::models::{Metadata, OptionSchema, ParamSpec};

pub const TIMESERIES_JSON: &str = "timeseries-json";

#[derive(Serialize, Deserialize)]
struct TimeSeriesFile {
    #[serde(default)]
    metadata: Metadata,
    #[serde(flatten)]
    series: TimeSeries,
}

pub struct TimeSeriesJsonHandler;

#[async_trait]
impl IoHandler for TimeSeriesJsonHandler {
    fn name(&self) -> &str {
        TIMESERIES_JSON
    }

    fn iotype(&self) -> IoType {
        IoType::Timeseries
    }

    fn extension(&self) -> &str {
        ".json"
    }

    async fn read(&self, path: &Path) -> Result<DatasetData> {
        let content = tokio::fs::read_to_string(path).await?;
        let file: TimeSeriesFile = serde_json::from_str(&content).map_err(|e| {
            QuestError::Serialization(format!(
                "{} is not a time series file: {}",
                path.display(),
                e
            ))
        })?;
        Ok(DatasetData::timeseries(file.series, file.metadata))
    }

    async fn write(&self, path: &Path, data: &DatasetData) -> Result<()> {
        let series = match &data.body {
            DataBody::Timeseries(series) => series.clone(),
            DataBody::Features(_) => {
                return Err(QuestError::NotSupported {
                    plugin: TIMESERIES_JSON.to_string(),
                    operation: "writing feature collections".to_string(),
                })
            }
        };
        let file = TimeSeriesFile {
            metadata: data.metadata.clone(),
            series,
        };
        write_atomic(path, serde_json::to_string_pretty(&file)?.as_bytes())
    }

    async fn visualize(
        &self,
        path: &Path,
        output_dir: &Path,
        options: &Metadata,
    ) -> Result<PathBuf> {
        let options = self.visualize_options().validate(TIMESERIES_JSON, options)?;
        let width = options.get("width").and_then(|v| v.as_f64()).unwrap_or(800.0);
        let height = options.get("height").and_then(|v| v.as_f64()).unwrap_or(400.0);

        let data = self.read(path).await?;
        let series = data.as_timeseries().cloned().unwrap_or_default();
        let title = options
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| series.parameter.clone())
            .unwrap_or_default();

        let svg = render_svg(&series, &title, width, height);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("timeseries");
        let output = output_dir.join(format!("{}.svg", stem));
        write_atomic(&output, svg.as_bytes())?;
        Ok(output)
    }

    fn visualize_options(&self) -> OptionSchema {
        OptionSchema::new("Time series line chart")
            .with(
                ParamSpec::string("title")
                    .with_description("Chart title, defaults to the parameter"),
            )
            .with(ParamSpec::number("width").with_default(800.0))
            .with(ParamSpec::number("height").with_default(400.0))
    }
}

const MARGIN: f64 = 40.0;

/// Render a plain SVG line chart of the present values
fn render_svg(series: &TimeSeries, title: &str, width: f64, height: f64) -> String {
    let points: Vec<(f64, f64)> = series
        .points
        .iter()
        .filter_map(|p| p.value.map(|v| (p.time.timestamp() as f64, v)))
        .collect();

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="{ns}" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        ns = "http://www.w3.org/2000/svg",
        w = width,
        h = height
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" font-family="sans-serif" font-size="14">{}</text>"#,
        MARGIN,
        MARGIN / 2.0,
        escape(title)
    );

    if let Some(((t_min, t_max), (v_min, v_max))) = extent(&points) {
        let plot_w = (width - 2.0 * MARGIN).max(1.0);
        let plot_h = (height - 2.0 * MARGIN).max(1.0);
        let t_span = if t_max > t_min { t_max - t_min } else { 1.0 };
        let v_span = if v_max > v_min { v_max - v_min } else { 1.0 };

        let coords: Vec<String> = points
            .iter()
            .map(|(t, v)| {
                let x = MARGIN + (t - t_min) / t_span * plot_w;
                let y = height - MARGIN - (v - v_min) / v_span * plot_h;
                format!("{:.2},{:.2}", x, y)
            })
            .collect();

        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="steelblue" stroke-width="1.5" points="{}"/>"#,
            coords.join(" ")
        );
        let unit = series.unit.as_deref().unwrap_or("");
        let _ = writeln!(
            svg,
            r#"<text x="4" y="{}" font-family="sans-serif" font-size="10">{} {}</text>"#,
            MARGIN,
            v_max,
            escape(unit)
        );
        let _ = writeln!(
            svg,
            r#"<text x="4" y="{}" font-family="sans-serif" font-size="10">{} {}</text>"#,
            height - MARGIN,
            v_min,
            escape(unit)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn extent(points: &[(f64, f64)]) -> Option<((f64, f64), (f64, f64))> {
    let first = points.first()?;
    let init = ((first.0, first.0), (first.1, first.1));
    Some(points.iter().fold(init, |((t0, t1), (v0, v1)), (t, v)| {
        ((t0.min(*t), t1.max(*t)), (v0.min(*v), v1.max(*v)))
    }))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
