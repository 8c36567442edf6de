//! Integration tests for tradelens

use polars::prelude::*;
use tradelens::dashboard::future_periods;
use tradelens::{
    dispatch, forecast, sample_trade_table, segment, segment_with, DashboardConfig,
    ForecastMethod, SegmentConfig, TradeError, View, ViewOutput,
};

/// Two clear trade profiles plus a country with missing values
fn create_test_table() -> DataFrame {
    df![
        "Country" => &["USA", "China", "Germany", "India", "Brazil", "Chile", "Peru"],
        "Export" => &[Some(2500.0), Some(2200.0), Some(2350.0), Some(80.0), Some(40.0), None, Some(60.0)],
        "Import" => &[Some(2000.0), Some(1800.0), Some(2100.0), Some(60.0), Some(30.0), Some(20.0), None],
        "Trade_Balance" => &[500.0, 400.0, 250.0, 20.0, 10.0, -20.0, 60.0],
        "Year" => &[2023i32, 2023, 2023, 2023, 2023, 2023, 2023],
    ]
    .unwrap()
}

fn labels(table: &DataFrame) -> Vec<u32> {
    table
        .column("Cluster")
        .unwrap()
        .u32()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn test_segmentation_end_to_end() {
    let df = create_test_table();
    let segmented = segment(&df, 2).unwrap();

    assert_eq!(segmented.height(), 7);
    let labels = labels(&segmented);
    assert!(labels.iter().all(|&l| l < 2));

    // Large traders share a segment; small traders share the other
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[0], labels[2]);
    assert!(labels[3..].iter().all(|&l| l == labels[3]));
    assert_ne!(labels[0], labels[3]);

    // Pass-through columns are unchanged
    assert!(segmented
        .column("Trade_Balance")
        .unwrap()
        .equals(df.column("Trade_Balance").unwrap()));
}

#[test]
fn test_segmentation_is_deterministic() {
    let df = create_test_table();
    for k in 1..=4 {
        let first = labels(&segment(&df, k).unwrap());
        let second = labels(&segment(&df, k).unwrap());
        assert_eq!(first, second, "labels differ for k = {}", k);
    }
}

#[test]
fn test_missing_values_match_explicit_zeros() {
    let with_gaps = create_test_table();
    let explicit = df![
        "Country" => &["USA", "China", "Germany", "India", "Brazil", "Chile", "Peru"],
        "Export" => &[2500.0, 2200.0, 2350.0, 80.0, 40.0, 0.0, 60.0],
        "Import" => &[2000.0, 1800.0, 2100.0, 60.0, 30.0, 20.0, 0.0],
    ]
    .unwrap();

    for k in 1..=3 {
        assert_eq!(
            labels(&segment(&with_gaps, k).unwrap()),
            labels(&segment(&explicit, k).unwrap())
        );
    }
}

#[test]
fn test_oversubscribed_segments_fail() {
    let df = sample_trade_table().unwrap();
    let result = segment(&df, df.height() + 1);
    assert!(matches!(result, Err(TradeError::InvalidArgument { .. })));

    let empty = df.head(Some(0));
    assert!(matches!(segment(&empty, 1), Err(TradeError::InvalidArgument { .. })));
}

#[test]
fn test_every_row_labelled_for_every_k() {
    let df = sample_trade_table().unwrap();
    for k in 1..=df.height() {
        let result = segment_with(
            &df,
            &SegmentConfig {
                k,
                ..SegmentConfig::default()
            },
        )
        .unwrap();
        assert_eq!(result.table.height(), df.height());
        assert_eq!(result.model.cluster_sizes().iter().sum::<usize>(), df.height());
        assert!(result.model.labels.iter().all(|&l| l < k));
    }
}

#[test]
fn test_forecast_shape_for_all_inputs() {
    let constant = vec![5.0; 11];
    let trend: Vec<f64> = (0..25).map(|i| 10.0 + 2.5 * i as f64).collect();
    let wavy: Vec<f64> = (0..60)
        .map(|i| 100.0 + i as f64 + 8.0 * (i as f64 * 0.7).sin())
        .collect();
    let inputs: [&[f64]; 6] = [&[], &[1.0], &[10.0, 20.0, 30.0], &constant, &trend, &wavy];

    for series in inputs {
        for steps in [1, 5, 30] {
            let result = forecast(series, steps);
            assert_eq!(result.len(), steps);
            assert!(result.values.iter().all(|v| v.is_finite()));
        }
    }
}

#[test]
fn test_forecast_fallbacks() {
    assert_eq!(forecast(&[], 5).values, vec![0.0; 5]);
    assert_eq!(forecast(&[10.0, 20.0, 30.0], 3).values, vec![20.0; 3]);

    let constant = forecast(&[5.0; 11], 4);
    assert_eq!(constant.values, vec![5.0; 4]);
}

#[test]
fn test_forecast_follows_linear_trend() {
    let series: Vec<f64> = (0..10).map(|i| 100.0 + 10.0 * i as f64).collect();
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    let result = forecast(&series, 3);

    assert_eq!(result.method, ForecastMethod::Arima);
    let next = 200.0;
    assert!((result.values[0] - next).abs() < (result.values[0] - mean).abs());
}

#[test]
fn test_forecast_follows_noisy_trend() {
    let jittered: Vec<f64> = (0..40)
        .map(|i| 100.0 + 10.0 * i as f64 + 0.5 * (((i * 7) % 5) as f64 - 2.0))
        .collect();
    let cases: [(&[f64], f64); 2] = [
        (
            &[100.0, 111.0, 119.0, 131.0, 140.0, 149.0, 161.0, 170.0, 179.0, 191.0],
            200.0,
        ),
        (&jittered, 500.0),
    ];

    for (series, next) in cases {
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        let result = forecast(series, 3);

        assert_eq!(result.method, ForecastMethod::Arima);
        assert!(
            (result.values[0] - next).abs() < (result.values[0] - mean).abs(),
            "first value {} is closer to the mean {} than to {}",
            result.values[0],
            mean,
            next
        );
    }
}

#[test]
fn test_dashboard_views() {
    let df = sample_trade_table().unwrap();
    let config = DashboardConfig::default();

    for view in [View::Overview, View::Segments, View::Forecast] {
        let output = dispatch(&df, view, &config).unwrap();
        assert!(!output.to_string().is_empty());
    }

    let ViewOutput::Forecast(report) = dispatch(&df, View::Forecast, &config).unwrap() else {
        panic!("expected forecast report");
    };
    let dates: Vec<_> = report.points.iter().map(|(d, _)| *d).collect();
    assert_eq!(dates, future_periods(config.forecast_start, 30).unwrap());
    assert!(report.points.iter().all(|(_, v)| *v == 1480.0));
}
