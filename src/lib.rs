//! tradelens: trade analytics core
//!
//! Groups countries into segments by their export/import profile using
//! K-Means, and projects trade series forward with ARIMA(1,1,1) and a
//! mean fallback. The dashboard module dispatches views over an explicitly
//! passed table.

pub mod arima;
pub mod cli;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod forecast;
pub mod model;

// Re-export public items for easier access
pub use cli::Args;
pub use dashboard::{dispatch, DashboardConfig, View, ViewOutput};
pub use data::sample_trade_table;
pub use error::{FitError, Result, TradeError};
pub use forecast::{forecast, Forecast, ForecastConfig, ForecastMethod, Forecaster};
pub use model::{fit_kmeans, segment, segment_with, KMeansModel, SegmentConfig, Segmentation};
