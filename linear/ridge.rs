//! Ridge regression and minimum-norm least squares.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::Solve;

use super::{Centered, GramSpectrum, LinearError, LinearFit, check_alpha};

/// Ridge alphas searched when no grid is given: `1, 101, ..., 9901`.
pub fn default_alpha_grid() -> Vec<f64> {
    (1..10_000).step_by(100).map(|a| a as f64).collect()
}

/// Minimizes `||y - Xw - b||² + α||w||²`.
///
/// Solves the `p × p` normal equations when there are at least as many rows as markers
/// and the `n × n` kernel system `(XXᵀ + αI) a = y`, `w = Xᵀa`, otherwise.
pub fn fit_ridge(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Result<LinearFit, LinearError> {
    check_alpha(alpha)?;
    let centered = Centered::new(x, y)?;
    let coefficients = if centered.n_rows() >= centered.n_features() {
        solve_primal(&centered.x, &centered.y, alpha)?
    } else {
        solve_dual(&centered.x, &centered.y, alpha)?
    };
    Ok(centered.finish(coefficients))
}

fn solve_primal(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>, LinearError> {
    let mut gram = x.t().dot(x);
    gram.diag_mut().mapv_inplace(|d| d + alpha);
    let rhs = x.t().dot(y);
    gram.solve(&rhs).map_err(LinearError::LinearSystemSolveFailed)
}

fn solve_dual(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>, LinearError> {
    let mut kernel = x.dot(&x.t());
    kernel.diag_mut().mapv_inplace(|d| d + alpha);
    let dual_coefficients = kernel
        .solve(y)
        .map_err(LinearError::LinearSystemSolveFailed)?;
    Ok(x.t().dot(&dual_coefficients))
}

/// Ordinary least squares. When the system is underdetermined or collinear the
/// minimum-norm solution is returned.
pub fn fit_ols(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LinearFit, LinearError> {
    let centered = Centered::new(x, y)?;
    let spectrum = GramSpectrum::of(&centered.x)?;
    let tolerance = spectrum.rank_tolerance(&centered.x);
    let coefficients = spectrum.filtered_solution(&centered.x, &centered.y, |s| {
        if s > tolerance { 1.0 / s } else { 0.0 }
    });
    Ok(centered.finish(coefficients))
}
