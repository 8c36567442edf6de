//! Trade series forecasting with a mean fallback
//!
//! [`Forecaster::forecast`] always returns exactly `steps` values. Series
//! that are empty or too short get a flat forecast; longer series are fitted
//! with ARIMA, and any fitting failure degrades to the flat mean.

use std::fmt;

use tracing::{debug, warn};

use crate::arima::{Arima, ArimaOrder};
use crate::error::{Result, TradeError};

/// Minimum number of observations before a model fit is attempted
pub const MIN_HISTORY: usize = 10;
/// Default forecast horizon
pub const DEFAULT_STEPS: usize = 30;

/// Which branch of the forecasting policy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMethod {
    /// Empty history, so every value is zero
    ZeroFill,
    /// History shorter than the minimum; repeated mean
    ShortHistoryMean,
    /// ARIMA point forecasts
    Arima,
    /// ARIMA could not be fitted; repeated mean
    FailedFitMean,
}

impl ForecastMethod {
    /// True for every branch except a successful model fit
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ForecastMethod::Arima)
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForecastMethod::ZeroFill => "zero fill (no history)",
            ForecastMethod::ShortHistoryMean => "historical mean (short history)",
            ForecastMethod::Arima => "ARIMA",
            ForecastMethod::FailedFitMean => "historical mean (model fit failed)",
        };
        f.write_str(name)
    }
}

/// Projected values, one per future period, without timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub values: Vec<f64>,
    pub method: ForecastMethod,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Forecasting policy settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastConfig {
    /// Series shorter than this use the mean fallback
    pub min_history: usize,
    /// ARIMA order for the primary forecast
    pub order: ArimaOrder,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: MIN_HISTORY,
            order: ArimaOrder::DEFAULT,
        }
    }
}

/// Stateless forecaster applying the fallback policy
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        if config.min_history == 0 {
            return Err(TradeError::invalid_argument(
                "min_history",
                "must be at least 1",
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Project `series` forward by `steps` periods.
    ///
    /// Never fails: the result always holds exactly `steps` values.
    pub fn forecast(&self, series: &[f64], steps: usize) -> Forecast {
        if series.is_empty() {
            return Forecast {
                values: vec![0.0; steps],
                method: ForecastMethod::ZeroFill,
            };
        }

        let mean = series_mean(series);
        if series.len() < self.config.min_history {
            debug!(
                len = series.len(),
                min_history = self.config.min_history,
                "history too short for a model fit, repeating the mean"
            );
            return Forecast {
                values: vec![mean; steps],
                method: ForecastMethod::ShortHistoryMean,
            };
        }

        match Arima::fit(self.config.order, series).and_then(|fit| fit.forecast(steps)) {
            Ok(values) => Forecast {
                values,
                method: ForecastMethod::Arima,
            },
            Err(error) => {
                warn!(%error, len = series.len(), "ARIMA fit failed, repeating the mean");
                Forecast {
                    values: vec![mean; steps],
                    method: ForecastMethod::FailedFitMean,
                }
            }
        }
    }
}

/// Forecast `steps` periods with the default policy and ARIMA(1,1,1)
pub fn forecast(series: &[f64], steps: usize) -> Forecast {
    Forecaster::default().forecast(series, steps)
}

/// Arithmetic mean; 0.0 for an empty series
pub fn series_mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_series_is_zero_filled() {
        let result = forecast(&[], 5);
        assert_eq!(result.values, vec![0.0; 5]);
        assert_eq!(result.method, ForecastMethod::ZeroFill);
    }

    #[test]
    fn test_short_series_repeats_mean() {
        let result = forecast(&[10.0, 20.0, 30.0], 3);
        assert_eq!(result.values, vec![20.0, 20.0, 20.0]);
        assert_eq!(result.method, ForecastMethod::ShortHistoryMean);
        assert!(result.method.is_fallback());
    }

    #[test]
    fn test_linear_trend_uses_model() {
        let series: Vec<f64> = (0..10).map(|i| 100.0 + 10.0 * i as f64).collect();
        let result = forecast(&series, 4);

        assert_eq!(result.method, ForecastMethod::Arima);
        assert_eq!(result.len(), 4);
        let mean = series_mean(&series);
        assert!((result.values[0] - 200.0).abs() < (result.values[0] - mean).abs());
    }

    #[test]
    fn test_noisy_trend_uses_model() {
        let series: Vec<f64> = (0..12)
            .map(|i| 100.0 + 10.0 * i as f64 + if i % 3 == 0 { 1.0 } else { -0.5 })
            .collect();
        let result = forecast(&series, 3);

        assert_eq!(result.method, ForecastMethod::Arima);
        let last = series[series.len() - 1];
        assert!(result.values[0] > last);
        assert!(result.values[2] > result.values[0]);
    }

    #[test]
    fn test_constant_series_falls_back() {
        let result = forecast(&[5.0; 11], 6);
        assert_eq!(result.values, vec![5.0; 6]);
        assert_eq!(result.method, ForecastMethod::FailedFitMean);
    }

    #[test]
    fn test_non_finite_series_falls_back() {
        let mut series: Vec<f64> = (0..12).map(|i| i as f64).collect();
        series[3] = f64::INFINITY;
        let result = forecast(&series, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result.method, ForecastMethod::FailedFitMean);
    }

    #[test]
    fn test_zero_steps() {
        assert!(forecast(&[1.0, 2.0], 0).is_empty());
        assert!(forecast(&[], 0).is_empty());
    }

    #[test]
    fn test_custom_min_history() {
        let forecaster = Forecaster::new(ForecastConfig {
            min_history: 4,
            ..ForecastConfig::default()
        })
        .unwrap();
        let series = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = forecaster.forecast(&series, 2);

        assert_eq!(result.method, ForecastMethod::Arima);
        assert!((result.values[0] - 7.0).abs() < 1e-9);
        assert!((result.values[1] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config() {
        let result = Forecaster::new(ForecastConfig {
            min_history: 0,
            ..ForecastConfig::default()
        });
        assert!(matches!(result, Err(TradeError::InvalidArgument { .. })));
    }

    #[test]
    fn test_repeated_calls_agree() {
        let series: Vec<f64> = (0..40)
            .map(|i| 50.0 + i as f64 * 1.5 + ((i * 7) % 5) as f64)
            .collect();
        assert_eq!(forecast(&series, 10), forecast(&series, 10));
    }
}
