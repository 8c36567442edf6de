//! Entity tables, feature extraction and scaling using Polars

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

use crate::error::{Result, TradeError};

pub const COUNTRY: &str = "Country";
pub const EXPORT: &str = "Export";
pub const IMPORT: &str = "Import";
pub const TRADE_BALANCE: &str = "Trade_Balance";
pub const YEAR: &str = "Year";

/// Built-in trade table: one row per country for 2023, values in millions
pub fn sample_trade_table() -> Result<DataFrame> {
    let df = df![
        COUNTRY => &["USA", "China", "Germany", "India", "Brazil"],
        EXPORT => &[2500.0, 2200.0, 1500.0, 800.0, 400.0],
        IMPORT => &[2000.0, 1800.0, 1200.0, 600.0, 300.0],
        TRADE_BALANCE => &[500.0, 400.0, 300.0, 200.0, 100.0],
        YEAR => &[2023i32, 2023, 2023, 2023, 2023],
    ]?;
    Ok(df)
}

/// Look up a column that must hold numbers (or only nulls)
fn numeric_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    let column = df.column(name).map_err(|_| {
        TradeError::invalid_argument(name, "column is missing from the entity table")
    })?;

    let dtype = column.dtype();
    if !(dtype.is_numeric() || matches!(dtype, DataType::Null)) {
        return Err(TradeError::invalid_argument(
            name,
            format!("expected a numeric column, found {}", dtype),
        ));
    }

    Ok(column)
}

/// Convert the given columns into a feature matrix of shape (rows, columns).
///
/// Nulls and NaN are imputed as 0.0. Infinite values are rejected.
pub fn feature_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    if columns.is_empty() {
        return Err(TradeError::invalid_argument(
            "features",
            "at least one feature column is required",
        ));
    }

    let n_rows = df.height();
    let mut matrix = Array2::zeros((n_rows, columns.len()));

    for (j, name) in columns.iter().enumerate() {
        let values = numeric_column(df, name)?.cast(&DataType::Float64)?;
        for (i, value) in values.f64()?.iter().enumerate() {
            let value = match value {
                Some(v) if v.is_nan() => 0.0,
                Some(v) if v.is_infinite() => {
                    return Err(TradeError::invalid_argument(
                        name.as_str(),
                        format!("row {} holds a non-finite value", i),
                    ));
                }
                Some(v) => v,
                None => 0.0,
            };
            matrix[[i, j]] = value;
        }
    }

    Ok(matrix)
}

/// Extract a time series from a numeric column, skipping nulls and NaN
pub fn series_from_column(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let values = numeric_column(df, column)?.cast(&DataType::Float64)?;
    let series = values
        .f64()?
        .iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect();
    Ok(series)
}

/// Extract an integer column such as the observation year
pub fn integer_column(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let values = numeric_column(df, column)?.cast(&DataType::Int64)?;
    let values = values.i64()?.iter().collect();
    Ok(values)
}

/// Extract an identifier column as strings; nulls become empty strings
pub fn text_column(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let values = df
        .column(column)
        .map_err(|_| TradeError::invalid_argument(column, "column is missing from the entity table"))?
        .cast(&DataType::String)?;
    let values = values
        .str()?
        .iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// Z-score scaler fitted per feature column
#[derive(Debug, Clone)]
pub struct StandardScaler {
    /// Column means
    pub mean: Array1<f64>,
    /// Column standard deviations (1.0 where a column has no spread)
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let n_features = features.ncols();
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = if features.nrows() == 0 {
            Array1::ones(n_features)
        } else {
            features
                .std_axis(Axis(0), 0.0)
                .mapv(|s| if s > f64::EPSILON { s } else { 1.0 })
        };

        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sample_trade_table() {
        let df = sample_trade_table().unwrap();
        assert_eq!(df.height(), 5);
        assert_eq!(df.width(), 5);
        assert_eq!(text_column(&df, COUNTRY).unwrap()[0], "USA");
    }

    #[test]
    fn test_feature_matrix_imputes_missing_values() {
        let df = df![
            COUNTRY => &["A", "B", "C"],
            EXPORT => &[Some(10.0), None, Some(f64::NAN)],
            IMPORT => &[Some(1.0), Some(2.0), None],
        ]
        .unwrap();

        let matrix = feature_matrix(&df, &features(&[EXPORT, IMPORT])).unwrap();
        assert_eq!(matrix.shape(), &[3, 2]);
        assert_eq!(matrix.row(0).to_vec(), vec![10.0, 1.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![0.0, 2.0]);
        assert_eq!(matrix.row(2).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_feature_matrix_accepts_integer_columns() {
        let df = df![
            EXPORT => &[1i64, 2, 3],
            IMPORT => &[4i32, 5, 6],
        ]
        .unwrap();

        let matrix = feature_matrix(&df, &features(&[EXPORT, IMPORT])).unwrap();
        assert_eq!(matrix.column(1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_feature_matrix_rejects_bad_schema() {
        let df = df![
            COUNTRY => &["A", "B"],
            EXPORT => &[1.0, 2.0],
        ]
        .unwrap();

        let missing = feature_matrix(&df, &features(&[EXPORT, IMPORT]));
        assert!(matches!(missing, Err(TradeError::InvalidArgument { .. })));

        let textual = feature_matrix(&df, &features(&[COUNTRY]));
        assert!(matches!(textual, Err(TradeError::InvalidArgument { .. })));

        let none = feature_matrix(&df, &[]);
        assert!(matches!(none, Err(TradeError::InvalidArgument { .. })));
    }

    #[test]
    fn test_feature_matrix_rejects_infinite_values() {
        let df = df![EXPORT => &[1.0, f64::INFINITY]].unwrap();
        let result = feature_matrix(&df, &features(&[EXPORT]));
        assert!(matches!(result, Err(TradeError::InvalidArgument { .. })));
    }

    #[test]
    fn test_series_from_column_skips_gaps() {
        let df = df![EXPORT => &[Some(1.0), None, Some(3.0), Some(f64::NAN)]].unwrap();
        assert_eq!(series_from_column(&df, EXPORT).unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_standard_scaler() {
        let raw = Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(&raw);

        assert!((scaler.mean[0] - 2.0).abs() < 1e-12);
        assert_eq!(scaler.scale[1], 1.0);
        assert!(scaled[[1, 0]].abs() < 1e-12);
        assert!(scaled.column(1).iter().all(|v| v.abs() < 1e-12));
    }
}
