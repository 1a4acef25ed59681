use async_trait::async_trait;
use quest_core::error::Result;
use quest_core::formats::timeseries::TIMESERIES_JSON;
use quest_core::formats::{DatasetData, TimeSeries};
use quest_core::models::{Metadata, OptionSchema, ParamSpec};
use serde_json::{json, Value};
use tracing::debug;

use super::{DataKinds, DerivedDataset, Tool, ToolContext, ToolMetadata, ToolOutput};

/// Drops time-series values further than `sigma` standard deviations from the mean
pub struct RemoveOutliers;

impl RemoveOutliers {
    pub const NAME: &'static str = "ts-remove-outliers";
}

/// Mean and population standard deviation of the present values
fn mean_std(series: &TimeSeries) -> Option<(f64, f64)> {
    let values: Vec<f64> = series.values().collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// The series without outliers, and how many points were dropped; gaps are kept
pub(crate) fn remove_outliers(series: &TimeSeries, sigma: f64) -> (TimeSeries, usize) {
    let Some((mean, std)) = mean_std(series) else {
        return (series.clone(), 0);
    };

    let limit = sigma * std;
    let points: Vec<_> = series
        .points
        .iter()
        .filter(|p| p.value.map_or(true, |v| (v - mean).abs() <= limit))
        .cloned()
        .collect();
    let removed = series.points.len() - points.len();

    (
        TimeSeries {
            parameter: series.parameter.clone(),
            unit: series.unit.clone(),
            points,
        },
        removed,
    )
}

#[async_trait]
impl Tool for RemoveOutliers {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            group: "Time Series".to_string(),
            display_name: "Remove outliers".to_string(),
            description: "Remove values more than sigma standard deviations from the mean"
                .to_string(),
            operates_on: DataKinds {
                datatype: Some(vec!["timeseries".to_string()]),
                geotype: None,
                parameters: None,
            },
            produces: DataKinds {
                datatype: Some(vec!["timeseries".to_string()]),
                geotype: None,
                parameters: None,
            },
            marks_filtered: false,
        }
    }

    fn parameters(&self) -> OptionSchema {
        OptionSchema::new("Remove outliers")
            .with(ParamSpec::dataset("dataset").required())
            .with(
                ParamSpec::number("sigma")
                    .with_default(3.0)
                    .with_description("Number of standard deviations to keep"),
            )
    }

    async fn run(&self, ctx: &ToolContext, options: &Metadata) -> Result<ToolOutput> {
        let name = match options.get("dataset") {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Array(items)) if items.len() == 1 => {
                items[0].as_str().unwrap_or_default().to_string()
            }
            _ => return Err(ctx.incompatible("expects exactly one dataset")),
        };
        let sigma = options.get("sigma").and_then(Value::as_f64).unwrap_or(3.0);

        let input = ctx.dataset(&name).await?;
        let data = ctx.read_dataset(&input).await?;
        let Some(series) = data.as_timeseries() else {
            return Err(ctx.incompatible(format!("{} is not a time series", name)));
        };

        let (filtered, removed) = remove_outliers(series, sigma);
        debug!(dataset = %name, sigma, removed, "Removed outliers");

        let mut derived = DerivedDataset::new(TIMESERIES_JSON);
        derived.parameter = series.parameter.clone();
        derived.unit = series.unit.clone();
        let output = ctx.create_new_dataset(&input, derived).await?;

        let mut metadata = data.metadata.clone();
        metadata.insert("outliers_removed".to_string(), json!(removed));
        metadata.insert("sigma".to_string(), json!(sigma));
        ctx.write_dataset(&output, &DatasetData::timeseries(filtered, metadata))
            .await?;

        Ok(ToolOutput {
            datasets: vec![output.name],
            catalog_entries: vec![output.catalog_entry],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use quest_core::formats::TimePoint;

    fn series(values: &[Option<f64>]) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TimeSeries {
            parameter: Some("streamflow".to_string()),
            unit: Some("cfs".to_string()),
            points: values
                .iter()
                .enumerate()
                .map(|(i, value)| TimePoint {
                    time: start + Duration::hours(i as i64),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_spike_is_removed() {
        let mut values = vec![Some(10.0); 20];
        values.push(Some(1000.0));
        values.push(None);
        let (filtered, removed) = remove_outliers(&series(&values), 3.0);

        assert_eq!(removed, 1);
        assert_eq!(filtered.points.len(), 21);
        assert!(filtered.values().all(|v| v == 10.0));
        assert_eq!(filtered.unit.as_deref(), Some("cfs"));
    }

    #[test]
    fn test_constant_and_empty_series_are_unchanged() {
        let (filtered, removed) = remove_outliers(&series(&[Some(1.0), Some(1.0)]), 3.0);
        assert_eq!((filtered.points.len(), removed), (2, 0));

        let (filtered, removed) = remove_outliers(&series(&[None]), 3.0);
        assert_eq!((filtered.points.len(), removed), (1, 0));
    }
}
