//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::dashboard::{future_periods, DashboardConfig, View};
use crate::forecast::Forecaster;
use crate::model::SegmentConfig;

/// Trade analytics over the built-in sample table: overview, segmentation and forecasting
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// View to compute
    #[arg(long, value_enum, default_value = "overview")]
    pub view: View,

    /// Number of segments for K-Means
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Maximum iterations for K-Means
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Seed for centroid initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Standardise export/import values before clustering
    #[arg(long)]
    pub standardize: bool,

    /// Column to forecast
    #[arg(long, default_value = "Export")]
    pub column: String,

    /// Number of periods to forecast
    #[arg(long, default_value = "30")]
    pub steps: usize,

    /// First forecast date (YYYY-MM-DD)
    #[arg(long, default_value = "2025-11-15")]
    pub start: String,

    /// Number of exporters listed in the overview
    #[arg(long, default_value = "5")]
    pub top: usize,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the forecast start date
    pub fn parse_start_date(&self) -> anyhow::Result<NaiveDate> {
        NaiveDate::parse_from_str(self.start.trim(), "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("Invalid start date '{}': expected YYYY-MM-DD", self.start))
    }

    /// Build the dashboard settings from the arguments
    pub fn dashboard_config(&self) -> anyhow::Result<DashboardConfig> {
        if self.steps == 0 {
            anyhow::bail!("Forecast steps must be at least 1");
        }

        let start = self.parse_start_date()?;
        if future_periods(start, self.steps).is_err() {
            anyhow::bail!(
                "Forecast of {} days from {} runs past the last supported date",
                self.steps,
                start
            );
        }

        let defaults = DashboardConfig::default();
        Ok(DashboardConfig {
            top_n: self.top,
            segment: SegmentConfig {
                k: self.clusters,
                max_iters: self.max_iters,
                seed: self.seed,
                standardize: self.standardize,
                ..SegmentConfig::default()
            },
            forecaster: Forecaster::default(),
            forecast_column: self.column.clone(),
            forecast_steps: self.steps,
            forecast_start: start,
            ..defaults
        })
    }
}
