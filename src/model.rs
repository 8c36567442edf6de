//! K-Means segmentation of entities by trade profile

use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::data::{self, StandardScaler};
use crate::error::{Result, TradeError};

/// Parameters for one segmentation run
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Number of segments
    pub k: usize,
    /// Numeric columns forming the feature vector
    pub features: Vec<String>,
    /// Maximum number of Lloyd iterations
    pub max_iters: usize,
    /// Seed for centroid initialisation
    pub seed: u64,
    /// Standardise features before clustering
    pub standardize: bool,
    /// Name of the segment label column added to the output
    pub label_column: String,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            k: 3,
            features: vec![data::EXPORT.to_string(), data::IMPORT.to_string()],
            max_iters: 300,
            seed: 42,
            standardize: false,
            label_column: "Cluster".to_string(),
        }
    }
}

/// Fitted K-Means model
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment for each training row
    pub labels: Array1<usize>,
    /// Cluster centroids in the (possibly standardised) feature space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Lloyd iterations performed
    pub n_iterations: usize,
    /// Whether assignments stopped changing before the iteration cap
    pub converged: bool,
}

impl KMeansModel {
    /// Nearest centroid for a feature vector; ties go to the lower index
    pub fn predict(&self, features: ArrayView1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(TradeError::invalid_argument(
                "features",
                format!(
                    "expected {} dimensions, got {}",
                    self.centroids.ncols(),
                    features.len()
                ),
            ));
        }
        Ok(nearest_centroid(features, &self.centroids))
    }

    /// Number of entities in each segment, indexed by label
    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.labels.iter().fold(vec![0; self.n_clusters], |mut sizes, &label| {
            if let Some(size) = sizes.get_mut(label) {
                *size += 1;
            }
            sizes
        })
    }

    /// Mean silhouette over the first `sample_size` entities.
    ///
    /// Entities alone in their segment score 0, as does a single-segment model.
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n = features.nrows().min(sample_size).min(self.labels.len());
        if n < 2 || self.n_clusters < 2 {
            return 0.0;
        }

        let total: f64 = (0..n)
            .map(|i| {
                // Summed distance and count towards every segment among the sampled rows
                let mut sums = vec![0.0; self.n_clusters];
                let mut counts = vec![0usize; self.n_clusters];
                for j in (0..n).filter(|&j| j != i) {
                    let label = self.labels[j];
                    if label < self.n_clusters {
                        sums[label] += squared_distance(features.row(i), features.row(j)).sqrt();
                        counts[label] += 1;
                    }
                }

                let own = self.labels[i];
                if counts.get(own).copied().unwrap_or(0) == 0 {
                    return 0.0;
                }
                let cohesion = sums[own] / counts[own] as f64;
                let separation = (0..self.n_clusters)
                    .filter(|&c| c != own && counts[c] > 0)
                    .map(|c| sums[c] / counts[c] as f64)
                    .fold(f64::INFINITY, f64::min);

                let spread = cohesion.max(separation);
                if separation.is_infinite() || spread == 0.0 {
                    0.0
                } else {
                    (separation - cohesion) / spread
                }
            })
            .sum();

        total / n as f64
    }
}

/// Result of [`segment_with`]: the labelled table and the model behind it
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Copy of the input table with the label column attached
    pub table: DataFrame,
    /// Fitted model
    pub model: KMeansModel,
    /// Feature matrix the model was fitted on
    pub features: Array2<f64>,
}

/// Attach a segment label in `[0, k)` to every row of `entities`.
///
/// Uses the default feature columns (`Export`, `Import`) and seed. The input
/// table is left untouched.
pub fn segment(entities: &DataFrame, k: usize) -> Result<DataFrame> {
    let config = SegmentConfig {
        k,
        ..SegmentConfig::default()
    };
    Ok(segment_with(entities, &config)?.table)
}

/// Segment `entities` with explicit settings
pub fn segment_with(entities: &DataFrame, config: &SegmentConfig) -> Result<Segmentation> {
    let n_rows = entities.height();
    if config.k == 0 {
        return Err(TradeError::invalid_argument("k", "must be at least 1"));
    }
    if n_rows == 0 {
        return Err(TradeError::invalid_argument("entities", "table is empty"));
    }
    if config.k > n_rows {
        return Err(TradeError::invalid_argument(
            "k",
            format!("{} segments requested for {} entities", config.k, n_rows),
        ));
    }

    let raw = data::feature_matrix(entities, &config.features)?;
    let features = if config.standardize {
        StandardScaler::fit(&raw).transform(&raw)
    } else {
        raw
    };

    let model = fit_kmeans(&features, config.k, config.max_iters, config.seed)?;

    let labels: Vec<u32> = model.labels.iter().map(|&l| l as u32).collect();
    let mut table = entities.clone();
    table.with_column(Series::new(config.label_column.as_str(), labels))?;

    Ok(Segmentation {
        table,
        model,
        features,
    })
}

/// Fit K-Means by Lloyd's algorithm with seeded k-means++ initialisation
///
/// # Arguments
/// * `features` - Feature matrix (rows are entities)
/// * `n_clusters` - Number of clusters, between 1 and the number of rows
/// * `max_iters` - Iteration cap for the relocation loop
/// * `seed` - Seed for the initialisation; equal seeds give equal labels
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    max_iters: usize,
    seed: u64,
) -> crate::Result<KMeansModel> {
    if n_clusters == 0 || n_clusters > features.nrows() {
        return Err(TradeError::invalid_argument(
            "n_clusters",
            format!(
                "must be between 1 and the number of data points ({})",
                features.nrows()
            ),
        ));
    }
    if max_iters == 0 {
        return Err(TradeError::invalid_argument("max_iters", "must be at least 1"));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_centroids(features, n_clusters, &mut rng);
    let mut labels = assign(features, &centroids);

    let mut n_iterations = 0;
    let mut converged = false;
    while n_iterations < max_iters {
        n_iterations += 1;
        centroids = update_centroids(features, &labels, &centroids);
        let next = assign(features, &centroids);
        if next == labels {
            converged = true;
            break;
        }
        labels = next;
    }

    let inertia = compute_inertia(features, &labels, &centroids);
    debug!(
        k = n_clusters,
        iterations = n_iterations,
        converged,
        inertia,
        "k-means fitted"
    );

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
        n_iterations,
        converged,
    })
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen centroid
fn init_centroids(features: &Array2<f64>, n_clusters: usize, rng: &mut StdRng) -> Array2<f64> {
    let n_samples = features.nrows();
    let mut chosen = Vec::with_capacity(n_clusters);
    chosen.push(rng.gen_range(0..n_samples));

    let mut min_dists: Vec<f64> = features
        .outer_iter()
        .map(|row| squared_distance(row, features.row(chosen[0])))
        .collect();

    while chosen.len() < n_clusters {
        let total: f64 = min_dists.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, &d) in min_dists.iter().enumerate() {
                cumulative += d;
                if d > 0.0 && cumulative > target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave the target at the very end of the range
            pick.or_else(|| min_dists.iter().rposition(|&d| d > 0.0))
        } else {
            None
        };
        // Every remaining point coincides with a centroid
        let next = next
            .or_else(|| (0..n_samples).find(|i| !chosen.contains(i)))
            .unwrap_or(0);

        chosen.push(next);
        for (i, row) in features.outer_iter().enumerate() {
            let d = squared_distance(row, features.row(next));
            if d < min_dists[i] {
                min_dists[i] = d;
            }
        }
    }

    let mut centroids = Array2::zeros((n_clusters, features.ncols()));
    for (c, &idx) in chosen.iter().enumerate() {
        centroids.row_mut(c).assign(&features.row(idx));
    }
    centroids
}

/// Label every row with its nearest centroid
fn assign(features: &Array2<f64>, centroids: &Array2<f64>) -> Array1<usize> {
    features
        .outer_iter()
        .map(|row| nearest_centroid(row, centroids))
        .collect()
}

/// Mean of each cluster's members; empty clusters keep their previous centroid
fn update_centroids(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (row, &label) in features.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    let mut centroids = previous.clone();
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mean = &sums.row(c) / count as f64;
            centroids.row_mut(c).assign(&mean);
        }
    }
    centroids
}

fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    closest_cluster
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(features.row(i), centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
