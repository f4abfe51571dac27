//! Dense linear-algebra helpers built on nalgebra.
//!
//! Inner estimators only: column moments, correlation, least squares,
//! PSD factorisation and principal components. Callers decide which
//! error a numerical failure becomes, so these return `Option`.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn, SymmetricEigen};

/// Eigenvalues above this (negated) tolerance still count as PSD.
pub const PSD_TOLERANCE: f64 = 1e-8;

/// Per-column mean and sample standard deviation (n − 1 denominator).
pub fn column_moments(data: &DMatrix<f64>) -> (Vec<f64>, Vec<f64>) {
    let n = data.nrows() as f64;
    let mut means = Vec::with_capacity(data.ncols());
    let mut sds = Vec::with_capacity(data.ncols());
    for col in data.column_iter() {
        let mean = col.sum() / n;
        let ss: f64 = col.iter().map(|v| (v - mean).powi(2)).sum();
        means.push(mean);
        sds.push((ss / (n - 1.0)).sqrt());
    }
    (means, sds)
}

/// Sample covariance matrix of the columns.
pub fn covariance(data: &DMatrix<f64>) -> DMatrix<f64> {
    let (means, _) = column_moments(data);
    let mut centred = data.clone();
    for (j, mut col) in centred.column_iter_mut().enumerate() {
        col.add_scalar_mut(-means[j]);
    }
    let denom = (data.nrows() as f64 - 1.0).max(1.0);
    (centred.transpose() * &centred) / denom
}

/// Sample correlation matrix of the columns. Constant columns get zero
/// off-diagonal correlation and a unit diagonal.
pub fn correlation(data: &DMatrix<f64>) -> DMatrix<f64> {
    let cov = covariance(data);
    let p = cov.nrows();
    DMatrix::from_fn(p, p, |i, j| {
        if i == j {
            return 1.0;
        }
        let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
        if denom > 0.0 { cov[(i, j)] / denom } else { 0.0 }
    })
}

/// Lower factor `L` with `L Lᵀ = cov` for a positive semi-definite matrix.
///
/// Cholesky first; when that fails the symmetric eigendecomposition decides.
/// Returns `Err(min_eigenvalue)` if the matrix is not PSD.
pub fn psd_factor(cov: &DMatrix<f64>) -> Result<DMatrix<f64>, f64> {
    if let Some(chol) = Cholesky::new(cov.clone()) {
        let l = chol.l();
        if l.iter().all(|v| v.is_finite()) {
            return Ok(l);
        }
    }
    let eig = SymmetricEigen::new(cov.clone());
    let min_eigenvalue = eig.eigenvalues.min();
    if min_eigenvalue < -PSD_TOLERANCE || !min_eigenvalue.is_finite() {
        return Err(min_eigenvalue);
    }
    let root = DMatrix::from_diagonal(&eig.eigenvalues.map(|l| l.max(0.0).sqrt()));
    Ok(eig.eigenvectors * root)
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn spd_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    Cholesky::new(m.clone()).map(|c| c.inverse())
}

/// Ordinary least-squares fit with an optional ridge on the diagonal of XᵀX.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta:  DVector<f64>,
    /// Residual variance RSS / (n − p).
    pub sigma2: f64,
    /// Residual degrees of freedom n − p.
    pub df:    usize,
    /// Cholesky factor of (XᵀX)⁻¹, for parameter draws.
    pub xtx_inv_factor: DMatrix<f64>,
    /// (XᵀX)⁻¹ itself, for standard errors.
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    /// Fit `y ~ X`. `X` must already contain an intercept column if one is wanted.
    pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>, ridge: f64) -> Option<Self> {
        let (n, p) = x.shape();
        if n <= p || y.len() != n {
            return None;
        }
        let mut xtx = x.transpose() * x;
        if ridge > 0.0 {
            for i in 0..p {
                xtx[(i, i)] += ridge * xtx[(i, i)].max(1e-12);
            }
        }
        let chol: Cholesky<f64, Dyn> = Cholesky::new(xtx)?;
        let beta = chol.solve(&(x.transpose() * y));
        if beta.iter().any(|b| !b.is_finite()) {
            return None;
        }
        let resid = y - x * &beta;
        let df = n - p;
        let sigma2 = resid.norm_squared() / df as f64;
        let xtx_inv = chol.inverse();
        let xtx_inv_factor = Cholesky::new(xtx_inv.clone())?.l();
        Some(Self { beta, sigma2, df, xtx_inv_factor, xtx_inv })
    }

    /// Standard error of coefficient `j`.
    pub fn std_error(&self, j: usize) -> f64 {
        (self.sigma2 * self.xtx_inv[(j, j)]).sqrt()
    }
}

/// Scores on the leading `k` principal components of the standardised
/// columns of `data`. Component signs are fixed so the largest-magnitude
/// loading is positive.
pub fn principal_component_scores(data: &DMatrix<f64>, k: usize) -> Option<DMatrix<f64>> {
    let (n, p) = data.shape();
    if k == 0 || k > p || n < 2 {
        return None;
    }
    let (means, sds) = column_moments(data);
    let z = DMatrix::from_fn(n, p, |i, j| {
        if sds[j] > 0.0 { (data[(i, j)] - means[j]) / sds[j] } else { 0.0 }
    });
    let eig = SymmetricEigen::new(correlation(data));

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let mut loadings = DMatrix::<f64>::zeros(p, k);
    for (c, &idx) in order.iter().take(k).enumerate() {
        let mut v = eig.eigenvectors.column(idx).clone_owned();
        let pivot = v.iter().copied().fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if pivot < 0.0 {
            v.neg_mut();
        }
        loadings.set_column(c, &v);
    }
    Some(z * loadings)
}
