//! Dual active-set solver for strictly convex quadratic programs,
//! after Goldfarb and Idnani (1983).
//!
//! Minimises `½ xᵀGx + gᵀx` subject to linear inequalities `nᵢᵀx ≥ bᵢ`.
//! Starts from the unconstrained minimum and repeatedly adds the most violated
//! constraint to the active set, dropping constraints whose multipliers would
//! turn negative. Every iterate is optimal for the constraints it has added,
//! so the first feasible iterate is the solution.
//!
//! `G` is never inverted. It's factored once as `LLᵀ`, and the solver keeps
//! `J = L⁻ᵀQ` and an upper triangular `R` with `JᵀN = [R; 0]` for the active
//! normals `N`, updating `Q` and `R` with Givens rotations as constraints come and go.
use faer::{
    ColRef, Mat, Par, Side, linalg::triangular_solve::solve_upper_triangular_in_place,
};

use crate::{
    Config, Error,
    constraints::{LinearInequality, VIOLATION_TOLERANCE},
};

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Every constraint is satisfied and the objective is minimal.
    Optimal,
    /// Ran out of iterations before satisfying every constraint.
    IterationLimit,
    /// The constraints contradict each other, nothing satisfies them all.
    Infeasible,
    /// Reached the optimum for its active set, but rounding error left
    /// some constraint violated by more than 1e-6.
    Inaccurate,
}

/// A quadratic program with a symmetric positive definite Hessian.
pub(crate) struct QuadraticProgram<'c> {
    pub hessian: Mat<f64>,
    pub linear: Vec<f64>,
    pub constraints: &'c [LinearInequality],
}

#[derive(Debug)]
pub(crate) struct QpSolution {
    pub x: Vec<f64>,
    pub iterations: usize,
    pub status: SolveStatus,
}

/// Tracks the least-violating iterate seen so far,
/// so there's something sensible to return if the solve doesn't finish.
struct BestIterate {
    x: Vec<f64>,
    worst_violation: f64,
}

impl BestIterate {
    fn offer(&mut self, x: &[f64], worst_violation: f64) {
        if worst_violation < self.worst_violation {
            self.x.clear();
            self.x.extend_from_slice(x);
            self.worst_violation = worst_violation;
        }
    }
}

/// A constraint in the active set, and its Lagrange multiplier.
#[derive(Clone, Copy, Debug)]
struct Active {
    constraint: usize,
    multiplier: f64,
}

impl QuadraticProgram<'_> {
    pub fn solve(&self, config: Config) -> Result<QpSolution, Error> {
        let n = self.linear.len();
        debug_assert_eq!(
            (self.hessian.nrows(), self.hessian.ncols()),
            (n, n),
            "Hessian must be square and match the linear term"
        );
        let tolerance = config.feasibility_tolerance;

        // G = LLᵀ, so J = L⁻ᵀ satisfies JᵀGJ = I.
        let llt = self.hessian.llt(Side::Lower)?;
        let mut j = Mat::<f64>::identity(n, n);
        solve_upper_triangular_in_place(llt.L().transpose(), j.as_mut(), Par::Seq);
        let mut r_factor = Mat::<f64>::zeros(n, n);

        // Unconstrained minimum: x = −G⁻¹g = −JJᵀg.
        let jtg = j.transpose() * ColRef::from_slice(&self.linear);
        let mut x: Vec<f64> = (j.as_ref() * jtg.as_ref()).iter().map(|v| -v).collect();

        let normals: Vec<Vec<f64>> = self.constraints.iter().map(|c| c.to_dense(n)).collect();
        let mut active: Vec<Active> = Vec::with_capacity(n);
        let mut iterations = 0;
        let mut best = BestIterate {
            x: x.clone(),
            worst_violation: f64::INFINITY,
        };

        loop {
            best.offer(&x, self.worst_violation(&x));
            // Pick the most violated constraint which isn't already active.
            let most_violated = self
                .constraints
                .iter()
                .enumerate()
                .filter(|(i, _)| !active.iter().any(|a| a.constraint == *i))
                .map(|(i, c)| (i, c.slack(&x)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let p = match most_violated {
                Some((p, slack)) if slack < -tolerance => p,
                _ => {
                    // Active constraints are only satisfied up to rounding, so check them too.
                    let status = if self.worst_violation(&x) <= VIOLATION_TOLERANCE {
                        SolveStatus::Optimal
                    } else {
                        tracing::warn!(
                            worst_violation = self.worst_violation(&x),
                            "QP solver lost accuracy"
                        );
                        SolveStatus::Inaccurate
                    };
                    return Ok(QpSolution {
                        x,
                        iterations,
                        status,
                    });
                }
            };
            let constraint_p = &self.constraints[p];
            let mut new_multiplier = 0.0;

            loop {
                iterations += 1;
                if iterations > config.max_iterations {
                    tracing::warn!(iterations, "QP solver hit its iteration limit");
                    return Ok(QpSolution {
                        x: best.x,
                        iterations: config.max_iterations,
                        status: SolveStatus::IterationLimit,
                    });
                }

                let q = active.len();
                let mut d: Vec<f64> = (j.transpose() * ColRef::from_slice(&normals[p]))
                    .iter()
                    .copied()
                    .collect();

                // Primal step direction z (in the null space of the active constraints)
                // and the matching change r in the active multipliers.
                let z: Vec<f64> = (j.as_ref().subcols(q, n - q) * ColRef::from_slice(&d[q..]))
                    .iter()
                    .copied()
                    .collect();
                let mut r = Mat::from_fn(q, 1, |i, _| d[i]);
                solve_upper_triangular_in_place(
                    r_factor.as_ref().submatrix(0, 0, q, q),
                    r.as_mut(),
                    Par::Seq,
                );

                // Longest step before an active multiplier hits zero.
                let partial_step = active
                    .iter()
                    .enumerate()
                    .filter(|(a, _)| r[(*a, 0)] > 0.0)
                    .map(|(a, entry)| (a, entry.multiplier / r[(a, 0)]))
                    .min_by(|a, b| a.1.total_cmp(&b.1));

                // Step which makes constraint p exactly active.
                let curvature = constraint_p.dot(&z);
                let d_norm_squared: f64 = d.iter().map(|d| d * d).sum();
                let full_step = if curvature > CURVATURE_CUTOFF * d_norm_squared {
                    Some(-constraint_p.slack(&x) / curvature)
                } else {
                    None
                };

                let (step, drop) = match (full_step, partial_step) {
                    (None, None) => {
                        tracing::warn!(
                            constraint = p,
                            iterations,
                            "QP constraints are infeasible"
                        );
                        return Ok(QpSolution {
                            x: best.x,
                            iterations,
                            status: SolveStatus::Infeasible,
                        });
                    }
                    (Some(full), Some((a, partial))) if partial < full => (partial, Some(a)),
                    (Some(full), _) => (full, None),
                    (None, Some((a, partial))) => (partial, Some(a)),
                };

                for (a, entry) in active.iter_mut().enumerate() {
                    entry.multiplier -= step * r[(a, 0)];
                }
                new_multiplier += step;
                if full_step.is_some() {
                    for (x_i, z_i) in x.iter_mut().zip(&z) {
                        *x_i += step * z_i;
                    }
                }

                match drop {
                    None => {
                        // Rotate d so only its first q + 1 entries are nonzero.
                        // The new column of R is then d[..=q].
                        for k in (q + 1..n).rev() {
                            let rotation = Givens::zeroing(d[k - 1], d[k]);
                            d[k - 1] = rotation.norm;
                            d[k] = 0.0;
                            rotation.apply_to_columns(&mut j, k - 1);
                        }
                        for (i, d_i) in d.iter().take(q + 1).enumerate() {
                            r_factor[(i, q)] = *d_i;
                        }
                        active.push(Active {
                            constraint: p,
                            multiplier: new_multiplier,
                        });
                        break;
                    }
                    Some(a) => {
                        active.remove(a);
                        drop_column(&mut r_factor, &mut j, a, q);
                    }
                }
            }
        }
    }

    /// How far the worst constraint is from holding. Zero if they all hold.
    fn worst_violation(&self, x: &[f64]) -> f64 {
        self.constraints
            .iter()
            .map(|c| -c.slack(x))
            .fold(0.0, libm::fmax)
    }
}

/// Steps along directions with less curvature than this (relative to `‖Jᵀn‖²`)
/// can't make a constraint active.
const CURVATURE_CUTOFF: f64 = 1e-12;

/// A plane rotation taking `(a, b)` to `(‖(a, b)‖, 0)`.
#[derive(Clone, Copy, Debug)]
struct Givens {
    cos: f64,
    sin: f64,
    norm: f64,
}

impl Givens {
    fn zeroing(a: f64, b: f64) -> Self {
        let norm = libm::hypot(a, b);
        if norm == 0.0 {
            return Self {
                cos: 1.0,
                sin: 0.0,
                norm,
            };
        }
        Self {
            cos: a / norm,
            sin: b / norm,
            norm,
        }
    }

    /// Rotates columns `k` and `k + 1` of `m`.
    fn apply_to_columns(self, m: &mut Mat<f64>, k: usize) {
        for i in 0..m.nrows() {
            let (a, b) = (m[(i, k)], m[(i, k + 1)]);
            m[(i, k)] = self.cos * a + self.sin * b;
            m[(i, k + 1)] = -self.sin * a + self.cos * b;
        }
    }

    /// Rotates rows `k` and `k + 1` of `m`, in columns `columns`.
    fn apply_to_rows(self, m: &mut Mat<f64>, k: usize, columns: std::ops::Range<usize>) {
        for c in columns {
            let (a, b) = (m[(k, c)], m[(k + 1, c)]);
            m[(k, c)] = self.cos * a + self.sin * b;
            m[(k + 1, c)] = -self.sin * a + self.cos * b;
        }
    }
}

/// Remove column `a` from the first `q` columns of `R`, then restore its
/// upper triangular shape with rotations, applying the same rotations to `J`.
fn drop_column(r_factor: &mut Mat<f64>, j: &mut Mat<f64>, a: usize, q: usize) {
    for c in a..q - 1 {
        for i in 0..=c + 1 {
            r_factor[(i, c)] = r_factor[(i, c + 1)];
        }
    }
    for i in 0..q {
        r_factor[(i, q - 1)] = 0.0;
    }
    // Columns a.. now have one nonzero below the diagonal.
    for k in a..q - 1 {
        let rotation = Givens::zeroing(r_factor[(k, k)], r_factor[(k + 1, k)]);
        rotation.apply_to_rows(r_factor, k, k..q - 1);
        r_factor[(k + 1, k)] = 0.0;
        rotation.apply_to_columns(j, k);
    }
}
