//! Numeric rank of the interaction matrix, and which actuators can't be told apart.
use faer::MatRef;

use crate::Error;

/// How well the scans pin down every unknown.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankAnalysis {
    /// Numeric rank of the interaction matrix.
    pub rank: usize,
    /// Number of columns (actuators plus the bias term).
    pub columns: usize,
    /// Actuators whose correction can move without changing the fit,
    /// i.e. they have a component in the matrix's null space.
    pub unresolved_actuators: Vec<usize>,
}

impl RankAnalysis {
    pub fn is_full_rank(&self) -> bool {
        self.rank == self.columns
    }
}

/// SVD the interaction matrix `H = UΣVᵀ` and count its non-negligible singular values.
/// Columns of V past the rank span the null space. Any actuator with a noticeable
/// component there is unresolved.
pub(crate) fn rank_analysis(h: MatRef<'_, f64>) -> Result<RankAnalysis, Error> {
    let (m, n) = (h.nrows(), h.ncols());
    if m == 0 || n == 0 {
        return Ok(RankAnalysis {
            rank: 0,
            columns: n,
            unresolved_actuators: (0..n.saturating_sub(1)).collect(),
        });
    }

    let svd = h.svd()?;
    let sigma_col = svd.S().column_vector();

    // LAPACK's recommended rank-revealing cutoff.
    let largest_singular_value = sigma_col.iter().copied().fold(0.0, libm::fmax);
    let tolerance = f64::EPSILON * (m.max(n) as f64) * largest_singular_value;
    let rank = sigma_col.iter().filter(|&&s| s > tolerance).count();

    // Participation of each column in the null space.
    let v = svd.V();
    let participation: Vec<f64> = (0..n)
        .map(|j| {
            (rank..n)
                .map(|k| {
                    let v_jk = v.get(j, k);
                    v_jk * v_jk
                })
                .sum::<f64>()
                .sqrt()
        })
        .collect();
    let max_participation = participation.iter().copied().fold(0.0, libm::fmax);
    let noise_floor = 10.0 * libm::sqrt(n as f64) * f64::EPSILON;
    let var_tol = libm::fmax(1e-3 * max_participation, noise_floor);

    // Column 0 is the bias, not an actuator.
    let unresolved_actuators = (1..n)
        .filter(|&j| participation[j] > var_tol)
        .map(|j| j - 1)
        .collect();

    Ok(RankAnalysis {
        rank,
        columns: n,
        unresolved_actuators,
    })
}
