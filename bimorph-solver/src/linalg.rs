//! Dense linear algebra on top of faer.
use faer::{ColRef, Mat, MatRef};

use crate::Error;

/// Singular values below this fraction of the largest one are treated as zero,
/// the same cutoff numpy's `pinv` uses by default.
const PINV_RCOND: f64 = 1e-15;

/// Moore-Penrose pseudo-inverse, via the thin SVD `A = UΣVᵀ`.
///
/// Rank-deficient matrices are fine: singular values under the cutoff are
/// dropped instead of inverted, giving the minimum-norm least-squares inverse.
pub fn pseudo_inverse(a: MatRef<'_, f64>) -> Result<Mat<f64>, Error> {
    let (m, n) = (a.nrows(), a.ncols());
    if m == 0 || n == 0 {
        return Ok(Mat::zeros(n, m));
    }
    let svd = a.thin_svd()?;
    let sigma = svd.S().column_vector();
    let largest = sigma.iter().copied().fold(0.0, libm::fmax);
    let cutoff = PINV_RCOND * largest;

    // A⁺ = V Σ⁺ Uᵀ
    let v = svd.V();
    let v_sigma_inv = Mat::from_fn(n, sigma.nrows(), |i, k| {
        let s = sigma[k];
        if s > cutoff { *v.get(i, k) / s } else { 0.0 }
    });
    Ok(v_sigma_inv.as_ref() * svd.U().transpose())
}

/// Computes `A x`.
pub fn mat_vec(a: MatRef<'_, f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(
        a.ncols(),
        x.len(),
        "Matrix has {} columns but the vector has {} elements",
        a.ncols(),
        x.len()
    );
    let ax = a * ColRef::from_slice(x);
    ax.iter().copied().collect()
}

/// Round to 2 decimal places, the precision voltages are reported at.
/// Halves go to the even neighbour, like numpy's `round`.
pub fn round_to_centivolts(volts: f64) -> f64 {
    (volts * 100.0).round_ties_even() / 100.0
}
