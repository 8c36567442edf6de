//! View dispatch over an injected trade table
//!
//! Each view computes a plain report from the table it is handed. Reports
//! implement `Display` so the binary can print them; charting is left to
//! whatever consumes them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Days, NaiveDate};
use clap::ValueEnum;
use ndarray::Array2;
use polars::prelude::DataFrame;

use crate::data;
use crate::error::{Result, TradeError};
use crate::forecast::{self, Forecast, ForecastMethod, Forecaster, DEFAULT_STEPS};
use crate::model::{self, SegmentConfig};

/// Views offered by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum View {
    /// Top exporters and yearly trade totals
    Overview,
    /// Countries grouped by export/import profile
    Segments,
    /// Projection of one trade column
    Forecast,
}

/// Settings shared by all views
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Identifier column used to label rows
    pub id_column: String,
    /// Number of exporters listed in the overview
    pub top_n: usize,
    pub segment: SegmentConfig,
    pub forecaster: Forecaster,
    /// Column projected by the forecast view
    pub forecast_column: String,
    pub forecast_steps: usize,
    /// First date of the forecast horizon
    pub forecast_start: NaiveDate,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            id_column: data::COUNTRY.to_string(),
            top_n: 5,
            segment: SegmentConfig::default(),
            forecaster: Forecaster::default(),
            forecast_column: data::EXPORT.to_string(),
            forecast_steps: DEFAULT_STEPS,
            forecast_start: NaiveDate::from_ymd_opt(2025, 11, 15).unwrap_or(NaiveDate::MIN),
        }
    }
}

/// Yearly sums of exports and imports
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyTotals {
    pub year: i64,
    pub export: f64,
    pub import: f64,
}

#[derive(Debug, Clone)]
pub struct Overview {
    /// (identifier, export value), largest first
    pub top_exporters: Vec<(String, f64)>,
    pub yearly: Vec<YearlyTotals>,
}

#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub table: DataFrame,
    pub ids: Vec<String>,
    pub labels: Vec<usize>,
    pub sizes: Vec<usize>,
    pub centroids: Array2<f64>,
    pub feature_names: Vec<String>,
    pub inertia: f64,
    pub silhouette: f64,
}

#[derive(Debug, Clone)]
pub struct ForecastReport {
    pub column: String,
    pub points: Vec<(NaiveDate, f64)>,
    pub method: ForecastMethod,
    pub history_mean: f64,
    pub history_len: usize,
}

#[derive(Debug, Clone)]
pub enum ViewOutput {
    Overview(Overview),
    Segments(SegmentReport),
    Forecast(ForecastReport),
}

/// Render `view` from `data`
pub fn dispatch(data: &DataFrame, view: View, config: &DashboardConfig) -> Result<ViewOutput> {
    let output = match view {
        View::Overview => ViewOutput::Overview(overview(data, config)?),
        View::Segments => ViewOutput::Segments(segments(data, config)?),
        View::Forecast => ViewOutput::Forecast(forecast_view(data, config)?),
    };
    Ok(output)
}

/// `steps` consecutive daily dates starting at `start`.
///
/// Fails when the horizon runs past the last representable date.
pub fn future_periods(start: NaiveDate, steps: usize) -> Result<Vec<NaiveDate>> {
    (0..steps as u64)
        .map(|i| {
            start.checked_add_days(Days::new(i)).ok_or_else(|| {
                TradeError::invalid_argument(
                    "forecast_start",
                    format!("{} plus {} days is out of the calendar range", start, i),
                )
            })
        })
        .collect()
}

fn overview(df: &DataFrame, config: &DashboardConfig) -> Result<Overview> {
    let ids = data::text_column(df, &config.id_column)?;
    let exports = data::feature_matrix(df, &[data::EXPORT.to_string(), data::IMPORT.to_string()])?;

    let mut top_exporters: Vec<(String, f64)> = ids
        .iter()
        .cloned()
        .zip(exports.column(0).iter().copied())
        .collect();
    top_exporters.sort_by(|a, b| b.1.total_cmp(&a.1));
    top_exporters.truncate(config.top_n);

    let years = data::integer_column(df, data::YEAR)?;
    let mut totals: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for (i, year) in years.iter().enumerate() {
        if let Some(year) = year {
            let entry = totals.entry(*year).or_insert((0.0, 0.0));
            entry.0 += exports[[i, 0]];
            entry.1 += exports[[i, 1]];
        }
    }
    let yearly = totals
        .into_iter()
        .map(|(year, (export, import))| YearlyTotals {
            year,
            export,
            import,
        })
        .collect();

    Ok(Overview {
        top_exporters,
        yearly,
    })
}

fn segments(df: &DataFrame, config: &DashboardConfig) -> Result<SegmentReport> {
    let segmentation = model::segment_with(df, &config.segment)?;
    let ids = data::text_column(df, &config.id_column)?;
    let model = &segmentation.model;

    Ok(SegmentReport {
        ids,
        labels: model.labels.to_vec(),
        sizes: model.cluster_sizes(),
        centroids: model.centroids.clone(),
        feature_names: config.segment.features.clone(),
        inertia: model.inertia,
        silhouette: model.compute_silhouette_sample(&segmentation.features, 100),
        table: segmentation.table,
    })
}

fn forecast_view(df: &DataFrame, config: &DashboardConfig) -> Result<ForecastReport> {
    let series = data::series_from_column(df, &config.forecast_column)?;
    let Forecast { values, method } = config.forecaster.forecast(&series, config.forecast_steps);
    let points = future_periods(config.forecast_start, values.len())?
        .into_iter()
        .zip(values)
        .collect();

    Ok(ForecastReport {
        column: config.forecast_column.clone(),
        points,
        method,
        history_mean: forecast::series_mean(&series),
        history_len: series.len(),
    })
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Top Exporting Countries ===")?;
        for (rank, (id, export)) in self.top_exporters.iter().enumerate() {
            writeln!(f, "  {:>2}. {:<12} {:>12.1}", rank + 1, id, export)?;
        }

        writeln!(f, "\n=== Yearly Trade Totals ===")?;
        writeln!(f, "  Year | {:>12} | {:>12}", "Export", "Import")?;
        for totals in &self.yearly {
            writeln!(
                f,
                "  {:4} | {:>12.1} | {:>12.1}",
                totals.year, totals.export, totals.import
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for SegmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: usize = self.sizes.iter().sum();

        writeln!(f, "=== Segment Assignments ===")?;
        for (id, label) in self.ids.iter().zip(&self.labels) {
            writeln!(f, "  {:<12} -> segment {}", id, label)?;
        }

        writeln!(f, "\n=== Segment Statistics ===")?;
        for (i, &size) in self.sizes.iter().enumerate() {
            let percentage = if total == 0 {
                0.0
            } else {
                size as f64 / total as f64 * 100.0
            };
            writeln!(f, "  Segment {}: {} entities ({:.1}%)", i, size, percentage)?;
        }

        writeln!(f, "\n  Centroids ({}):", self.feature_names.join(", "))?;
        for (i, centroid) in self.centroids.outer_iter().enumerate() {
            let coords: Vec<String> = centroid.iter().map(|v| format!("{:.2}", v)).collect();
            writeln!(f, "    {}: [{}]", i, coords.join(", "))?;
        }

        writeln!(f, "\n  Within-cluster sum of squares: {:.2}", self.inertia)?;
        writeln!(f, "  Silhouette score (sample): {:.3}", self.silhouette)
    }
}

impl fmt::Display for ForecastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Next {}-period {} Forecast ===",
            self.points.len(),
            self.column
        )?;
        writeln!(f, "  Method: {}", self.method)?;
        for (date, value) in &self.points {
            writeln!(f, "  {}  {:>12.2}", date, value)?;
        }
        writeln!(
            f,
            "\n  Current average {}: {:.0} ({} observations)",
            self.column.to_lowercase(),
            self.history_mean,
            self.history_len
        )
    }
}

impl fmt::Display for ViewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewOutput::Overview(report) => fmt::Display::fmt(report, f),
            ViewOutput::Segments(report) => fmt::Display::fmt(report, f),
            ViewOutput::Forecast(report) => fmt::Display::fmt(report, f),
        }
    }
}
