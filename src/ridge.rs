use crate::error::PipelineError;
use log::debug;

/// `n` regularization strengths, log-spaced between `10^lo_log10` and
/// `10^hi_log10` inclusive. The pipeline default is 40 points over [1e-1, 1e5].
pub fn alpha_grid(lo_log10: f64, hi_log10: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![10f64.powf(lo_log10)];
    }
    let step = (hi_log10 - lo_log10) / (n - 1) as f64;
    (0..n).map(|i| 10f64.powf(lo_log10 + i as f64 * step)).collect()
}

/// One fitted ridge model: a weight per feature, an intercept, the strength
/// chosen by leave-one-out cross-validation and the error it achieved.
#[derive(Clone, Debug, PartialEq)]
pub struct RidgeFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub alpha: f64,
    pub loo_mse: f64,
}

impl RidgeFit {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }
}

/// Ridge regression with the strength selected by exact leave-one-out
/// cross-validation over a candidate grid.
///
/// Works in the dual: with centered rows Xc and targets yc, the smoother is
/// H = K(K + aI)^-1 for the Gram matrix K = Xc Xc^T, and the held-out
/// residual of row i is r_i / (1 - h_ii) without any refitting. The winning
/// alpha is refit on all rows, w = Xc^T (K + aI)^-1 yc. The dual form keeps
/// every factorization at n x n, which is the cheap side when features far
/// outnumber specimens.
pub fn fit(
    x: &[f64],
    n: usize,
    p: usize,
    y: &[f64],
    alphas: &[f64],
) -> Result<RidgeFit, PipelineError> {
    if n < 2 {
        return Err(PipelineError::DimensionMismatch {
            reason: format!("leave-one-out cross-validation requires at least 2 rows, got {}", n),
        });
    }
    if x.len() != n * p {
        return Err(PipelineError::DimensionMismatch {
            reason: format!("x has wrong length: expected n*p={}, got {}", n * p, x.len()),
        });
    }
    if y.len() != n {
        return Err(PipelineError::DimensionMismatch {
            reason: format!("y has wrong length: expected n={}, got {}", n, y.len()),
        });
    }
    if alphas.is_empty() {
        return Err(PipelineError::DimensionMismatch {
            reason: "candidate alpha grid is empty".to_string(),
        });
    }

    // Center columns and targets; the intercept is recovered at the end.
    let mut xbar = vec![0.0f64; p];
    for i in 0..n {
        for j in 0..p {
            xbar[j] += x[i * p + j];
        }
    }
    for m in &mut xbar {
        *m /= n as f64;
    }
    let ybar = y.iter().sum::<f64>() / n as f64;

    let mut xc = vec![0.0f64; n * p];
    for i in 0..n {
        for j in 0..p {
            xc[i * p + j] = x[i * p + j] - xbar[j];
        }
    }
    let yc: Vec<f64> = y.iter().map(|v| v - ybar).collect();

    // Gram matrix K = Xc Xc^T
    let mut k = vec![0.0f64; n * n];
    for i in 0..n {
        for l in i..n {
            let dot = (0..p).map(|j| xc[i * p + j] * xc[l * p + j]).sum::<f64>();
            k[i * n + l] = dot;
            k[l * n + i] = dot;
        }
    }

    let mut best: Option<(f64, f64)> = None; // (alpha, loo_mse)
    for &alpha in alphas {
        let factor = cholesky_factor(&k, n, alpha)?;
        let c = cholesky_solve(&factor, &yc, n);
        let inv = cholesky_inverse(&factor, n);

        let mut sse = 0.0f64;
        for i in 0..n {
            let fitted = (0..n).map(|l| k[i * n + l] * c[l]).sum::<f64>();
            let h_ii = (0..n).map(|l| k[i * n + l] * inv[l * n + i]).sum::<f64>();
            let denom = 1.0 - h_ii;
            // h_ii -> 1 means the point is fit exactly; treat as unusable alpha
            if denom.abs() < 1e-12 {
                sse = f64::INFINITY;
                break;
            }
            let loo_residual = (yc[i] - fitted) / denom;
            sse += loo_residual * loo_residual;
        }
        let mse = sse / n as f64;
        debug!("alpha={:.4e} loo_mse={:.6e}", alpha, mse);

        if best.map_or(true, |(_, best_mse)| mse < best_mse) {
            best = Some((alpha, mse));
        }
    }

    let (alpha, loo_mse) = best.unwrap();

    // Refit on all rows at the winning strength
    let factor = cholesky_factor(&k, n, alpha)?;
    let c = cholesky_solve(&factor, &yc, n);
    let mut coefficients = vec![0.0f64; p];
    for j in 0..p {
        coefficients[j] = (0..n).map(|i| xc[i * p + j] * c[i]).sum::<f64>();
    }
    let intercept = ybar
        - coefficients
            .iter()
            .zip(xbar.iter())
            .map(|(w, m)| w * m)
            .sum::<f64>();

    Ok(RidgeFit {
        coefficients,
        intercept,
        alpha,
        loo_mse,
    })
}

/// Cholesky factor L of (K + alpha I), lower triangular, row-major.
fn cholesky_factor(k: &[f64], n: usize, alpha: f64) -> Result<Vec<f64>, PipelineError> {
    let mut l = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = k[i * n + j] + if i == j { alpha } else { 0.0 };
            for m in 0..j {
                sum -= l[i * n + m] * l[j * n + m];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(PipelineError::NotPositiveDefinite { row: i, value: sum });
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Ok(l)
}

/// Solve (L L^T) z = b by forward then backward substitution.
fn cholesky_solve(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut z = vec![0.0f64; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * z[j];
        }
        z[i] = sum / l[i * n + i];
    }
    let mut out = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * out[j];
        }
        out[i] = sum / l[i * n + i];
    }
    out
}

/// (K + alpha I)^-1 from its Cholesky factor, one identity column at a time.
fn cholesky_inverse(l: &[f64], n: usize) -> Vec<f64> {
    let mut inv = vec![0.0f64; n * n];
    let mut e = vec![0.0f64; n];
    for col in 0..n {
        e[col] = 1.0;
        let column = cholesky_solve(l, &e, n);
        for row in 0..n {
            inv[row * n + col] = column[row];
        }
        e[col] = 0.0;
    }
    inv
}
