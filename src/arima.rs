//! ARIMA (AutoRegressive Integrated Moving Average) estimation
//!
//! The series is differenced `d` times, an ARMA(p, q) model with a constant
//! is estimated on the differenced values by the Hannan–Rissanen procedure,
//! and point forecasts are integrated back to the original scale.
//!
//! Estimation:
//!
//! 1. Fit a long autoregression by Levinson–Durbin to estimate the innovations.
//! 2. Regress `w_t` on `[1, w_{t-1..t-p}, e_{t-1..t-q}]` by ordinary least squares.
//! 3. Shrink a non-stationary AR or non-invertible MA polynomial until its
//!    roots lie outside the unit circle.
//!
//! A singular regression is retried with the MA terms dropped, then with the
//! constant alone.

use tracing::debug;

use crate::error::FitError;

/// Upper bound on the autoregressive and moving-average orders
pub const MAX_ARMA_ORDER: usize = 5;
/// Upper bound on the differencing order
pub const MAX_DIFFERENCING: usize = 2;

/// Relative pivot threshold below which the normal equations count as singular
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Factor applied per lag when shrinking a polynomial towards zero
const SHRINK_FACTOR: f64 = 0.97;
/// Shrink rounds before giving up; 0.97^500 is below 1e-6
const MAX_SHRINK_ROUNDS: usize = 500;

/// Model order (p, d, q)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArimaOrder {
    p: usize,
    d: usize,
    q: usize,
}

impl ArimaOrder {
    /// The order used by the trade forecaster
    pub const DEFAULT: ArimaOrder = ArimaOrder { p: 1, d: 1, q: 1 };

    /// Returns `None` when an order exceeds [`MAX_ARMA_ORDER`] or [`MAX_DIFFERENCING`]
    pub fn new(p: usize, d: usize, q: usize) -> Option<Self> {
        if p > MAX_ARMA_ORDER || q > MAX_ARMA_ORDER || d > MAX_DIFFERENCING {
            return None;
        }
        Some(Self { p, d, q })
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn q(&self) -> usize {
        self.q
    }
}

impl Default for ArimaOrder {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Entry point for estimation
pub struct Arima;

impl Arima {
    /// Fit an ARIMA model of the given order to `data`
    pub fn fit(order: ArimaOrder, data: &[f64]) -> Result<ArimaFit, FitError> {
        if data.iter().any(|x| !x.is_finite()) {
            return Err(FitError::NonFinite("input series".to_string()));
        }

        let required = order.d + order.p + order.q + 3;
        if data.len() < required {
            return Err(FitError::InsufficientData {
                required,
                actual: data.len(),
            });
        }

        if !has_variation(data) {
            return Err(FitError::Degenerate("series is constant".to_string()));
        }

        let (differenced, tails) = difference(data, order.d);

        // Exact drift: nothing left for the AR or MA terms to explain
        if !has_variation(&differenced) {
            return Ok(ArimaFit {
                order,
                constant: mean(&differenced),
                ar_coeffs: vec![0.0; order.p],
                ma_coeffs: vec![0.0; order.q],
                sigma2: 0.0,
                residuals: vec![0.0; differenced.len()],
                differenced,
                tails,
            });
        }

        let (mut constant, mut ar_coeffs, mut ma_coeffs) =
            estimate_with_fallback(&differenced, order.p, order.q)?;

        let ar_adjusted = pull_inside_unit_circle(&mut ar_coeffs, FitError::NonStationary)?;
        let mut negated_ma: Vec<f64> = ma_coeffs.iter().map(|c| -c).collect();
        let ma_adjusted = pull_inside_unit_circle(&mut negated_ma, FitError::NonInvertible)?;
        if ma_adjusted {
            ma_coeffs = negated_ma.iter().map(|c| -c).collect();
        }
        if ar_adjusted || ma_adjusted {
            // Keep the implied process mean equal to the sample mean
            constant = mean(&differenced) * (1.0 - ar_coeffs.iter().sum::<f64>());
            debug!(
                constant,
                ?ar_coeffs,
                ?ma_coeffs,
                "estimates moved inside the admissible region"
            );
        }

        let residuals = conditional_residuals(&differenced, constant, &ar_coeffs, &ma_coeffs);
        let start = order.p;
        let sigma2 = if differenced.len() > start {
            residuals[start..].iter().map(|e| e * e).sum::<f64>()
                / (differenced.len() - start) as f64
        } else {
            0.0
        };

        if !constant.is_finite() || !sigma2.is_finite() {
            return Err(FitError::NonFinite("fitted parameters".to_string()));
        }

        Ok(ArimaFit {
            order,
            constant,
            ar_coeffs,
            ma_coeffs,
            sigma2,
            residuals,
            differenced,
            tails,
        })
    }
}

/// A fitted ARIMA model ready to project forward
#[derive(Debug, Clone)]
pub struct ArimaFit {
    order: ArimaOrder,
    constant: f64,
    ar_coeffs: Vec<f64>,
    ma_coeffs: Vec<f64>,
    sigma2: f64,
    residuals: Vec<f64>,
    differenced: Vec<f64>,
    /// Last value of the series at each differencing level, outermost first
    tails: Vec<f64>,
}

impl ArimaFit {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Constant term on the differenced scale
    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar_coeffs
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma_coeffs
    }

    /// Variance of the conditional residuals
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Point forecasts for the next `steps` periods on the original scale
    pub fn forecast(&self, steps: usize) -> Result<Vec<f64>, FitError> {
        if steps == 0 {
            return Ok(Vec::new());
        }

        let n = self.differenced.len();
        let mut extended = self.differenced.clone();
        let mut innovations = self.residuals.clone();

        for _ in 0..steps {
            let t = extended.len();
            let mut next = self.constant;
            for (j, phi) in self.ar_coeffs.iter().enumerate() {
                if t > j {
                    next += phi * extended[t - j - 1];
                }
            }
            for (j, theta) in self.ma_coeffs.iter().enumerate() {
                if t > j {
                    next += theta * innovations[t - j - 1];
                }
            }
            extended.push(next);
            innovations.push(0.0);
        }

        let forecasts = integrate(&extended[n..], &self.tails);
        if forecasts.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite("forecast".to_string()));
        }
        Ok(forecasts)
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// True when the values are not all (numerically) equal
fn has_variation(data: &[f64]) -> bool {
    let m = mean(data);
    let scale = data.iter().fold(0.0f64, |acc, x| acc.max(x.abs())).max(1.0);
    data.iter().any(|x| (x - m).abs() > 1e-9 * scale)
}

/// Difference `order` times; also return the last value seen at each level
fn difference(data: &[f64], order: usize) -> (Vec<f64>, Vec<f64>) {
    let mut current = data.to_vec();
    let mut tails = Vec::with_capacity(order);
    for _ in 0..order {
        tails.push(current.last().copied().unwrap_or(0.0));
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (current, tails)
}

/// Undo [`difference`] for values that continue the differenced series
fn integrate(values: &[f64], tails: &[f64]) -> Vec<f64> {
    let mut result = values.to_vec();
    for &last in tails.iter().rev() {
        let mut level = last;
        for v in result.iter_mut() {
            level += *v;
            *v = level;
        }
    }
    result
}

/// Autoregression coefficients of the given order by Levinson–Durbin on
/// the sample autocovariances of mean-centred data
fn yule_walker(centered: &[f64], order: usize) -> Vec<f64> {
    let n = centered.len();
    let autocov: Vec<f64> = (0..=order)
        .map(|k| {
            (k..n).map(|i| centered[i] * centered[i - k]).sum::<f64>() / n as f64
        })
        .collect();

    let mut coeffs = vec![0.0; order];
    if order == 0 || autocov[0].abs() < f64::EPSILON {
        return coeffs;
    }

    let mut error = autocov[0];
    for k in 0..order {
        let mut acc = autocov[k + 1];
        for j in 0..k {
            acc -= coeffs[j] * autocov[k - j];
        }
        if error.abs() < f64::EPSILON {
            break;
        }
        let reflection = acc / error;
        let previous = coeffs.clone();
        coeffs[k] = reflection;
        for j in 0..k {
            coeffs[j] = previous[j] - reflection * previous[k - 1 - j];
        }
        error *= 1.0 - reflection * reflection;
    }

    coeffs
}

/// Two-stage ARMA(p, q) estimation with a constant; returns (c, phi, theta)
fn hannan_rissanen(w: &[f64], p: usize, q: usize) -> Result<(f64, Vec<f64>, Vec<f64>), FitError> {
    let n = w.len();
    let n_params = 1 + p + q;

    // Stage 1: innovations from a long autoregression
    let (long_order, innovations) = if q > 0 {
        let long_order = ((n as f64).sqrt().ceil() as usize).max(p + q).min(n / 3).max(1);
        let mu = mean(w);
        let centered: Vec<f64> = w.iter().map(|x| x - mu).collect();
        let long_ar = yule_walker(&centered, long_order);

        let mut innovations = vec![0.0; n];
        for t in long_order..n {
            let mut predicted = 0.0;
            for (j, a) in long_ar.iter().enumerate() {
                predicted += a * centered[t - j - 1];
            }
            innovations[t] = centered[t] - predicted;
        }
        (long_order, innovations)
    } else {
        (0, vec![0.0; n])
    };

    // Stage 2: least squares on lagged values and lagged innovations
    let start = if q > 0 { p.max(long_order + q) } else { p };
    let n_rows = n.saturating_sub(start);
    if n_rows <= n_params {
        return Err(FitError::InsufficientData {
            required: start + n_params + 1,
            actual: n,
        });
    }

    let mut xtx = vec![vec![0.0; n_params]; n_params];
    let mut xty = vec![0.0; n_params];
    let mut row = vec![0.0; n_params];
    for t in start..n {
        row[0] = 1.0;
        for j in 0..p {
            row[1 + j] = w[t - j - 1];
        }
        for j in 0..q {
            row[1 + p + j] = innovations[t - j - 1];
        }
        for a in 0..n_params {
            xty[a] += row[a] * w[t];
            for b in 0..n_params {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }

    let beta = solve_linear_system(xtx, xty)?;
    let constant = beta[0];
    let ar_coeffs = beta[1..=p].to_vec();
    let ma_coeffs = beta[1 + p..].to_vec();

    Ok((constant, ar_coeffs, ma_coeffs))
}

/// Hannan–Rissanen at the requested order, falling back to ARMA(p, 0) and
/// then to the constant alone when the regression is singular or has too
/// few rows.
///
/// Coefficient vectors keep the requested lengths; dropped terms are zero.
fn estimate_with_fallback(
    w: &[f64],
    p: usize,
    q: usize,
) -> Result<(f64, Vec<f64>, Vec<f64>), FitError> {
    let mut last_error = FitError::Singular;
    for (ar_order, ma_order) in [(p, q), (p, 0), (0, 0)] {
        match hannan_rissanen(w, ar_order, ma_order) {
            Ok((constant, mut ar, mut ma)) => {
                if (ar_order, ma_order) != (p, q) {
                    debug!(p, q, ar_order, ma_order, reason = %last_error, "reduced the model");
                }
                ar.resize(p, 0.0);
                ma.resize(q, 0.0);
                return Ok((constant, ar, ma));
            }
            Err(error @ (FitError::Singular | FitError::InsufficientData { .. })) => {
                last_error = error;
            }
            Err(error) => return Err(error),
        }
    }
    Err(last_error)
}

/// Scale lag `j` by `SHRINK_FACTOR^j` until `x_t = sum(c_j x_{t-j})` is
/// stationary. Returns whether the coefficients changed.
fn pull_inside_unit_circle(coeffs: &mut [f64], exhausted: FitError) -> Result<bool, FitError> {
    if is_stationary(coeffs) {
        return Ok(false);
    }
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(FitError::NonFinite("polynomial coefficients".to_string()));
    }
    for _ in 0..MAX_SHRINK_ROUNDS {
        let mut factor = 1.0;
        for c in coeffs.iter_mut() {
            factor *= SHRINK_FACTOR;
            *c *= factor;
        }
        if is_stationary(coeffs) {
            return Ok(true);
        }
    }
    Err(exhausted)
}

/// Gaussian elimination with partial pivoting
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, FitError> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= SINGULAR_TOLERANCE * scale {
            return Err(FitError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for r in (col + 1)..n {
            let factor = a[r][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[r][c] -= factor * a[col][c];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite("regression coefficients".to_string()));
    }
    Ok(x)
}

/// Stationarity of `x_t = sum(phi_j x_{t-j})` via the step-down recursion:
/// every partial autocorrelation must lie strictly inside (-1, 1)
fn is_stationary(coeffs: &[f64]) -> bool {
    let mut current = coeffs.to_vec();
    while let Some(&kappa) = current.last() {
        if !kappa.is_finite() || kappa.abs() >= 1.0 {
            return false;
        }
        let k = current.len();
        let denom = 1.0 - kappa * kappa;
        current = (0..k - 1)
            .map(|j| (current[j] + kappa * current[k - 2 - j]) / denom)
            .collect();
    }
    true
}

/// One-step-ahead errors of the fitted ARMA model on the differenced series
fn conditional_residuals(w: &[f64], constant: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut residuals = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut predicted = constant;
        for (j, phi) in ar.iter().enumerate() {
            predicted += phi * w[t - j - 1];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                predicted += theta * residuals[t - j - 1];
            }
        }
        residuals[t] = w[t] - predicted;
    }
    residuals
}
