use faer::ColRef;

pub use self::active_set::SolveStatus;
pub(crate) use self::find_rank::rank_analysis;
use self::active_set::QuadraticProgram;
use crate::{
    ConstrainedOutcome, Error,
    constraints::ConstraintSet,
    datatypes::VoltageLimits,
    interaction::InteractionModel,
    linalg::{self, round_to_centivolts},
};

mod active_set;
mod find_rank;

/// Initial guess for every unknown in the constrained solve.
const INITIAL_GUESS: f64 = 1.0;

/// Regularization used on rank-deficient problems when [`Config::regularization`] is smaller.
const MIN_RANK_DEFICIENT_REGULARIZATION: f64 = 1e-9;

/// Tuning for the constrained solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Give up after this many active-set changes.
    pub max_iterations: usize,
    /// Constraints violated by less than this count as satisfied.
    pub feasibility_tolerance: f64,
    /// Relative Tikhonov regularization, added to each diagonal of the normal matrix.
    /// Keeps rank-deficient problems solvable. Zero disables it on full rank problems,
    /// rank-deficient ones always get at least 1e-9.
    pub regularization: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: 300_000,
            feasibility_tolerance: 1e-9,
            regularization: 1e-9,
        }
    }
}

impl Config {
    /// Set [`Config::max_iterations`].
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set [`Config::feasibility_tolerance`].
    pub fn with_feasibility_tolerance(mut self, feasibility_tolerance: f64) -> Self {
        self.feasibility_tolerance = feasibility_tolerance;
        self
    }

    /// Set [`Config::regularization`].
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }
}

/// Least-squares voltage corrections, ignoring every physical limit.
///
/// Solves `H x ≈ y` with the pseudo-inverse of the interaction matrix,
/// discards the bias term `x[0]` and rounds to 2 decimal places.
/// Rank-deficient matrices get the minimum-norm solution.
pub fn solve_unconstrained(model: &InteractionModel) -> Result<Vec<f64>, Error> {
    let h_pinv = linalg::pseudo_inverse(model.interaction_matrix())?;
    let x = linalg::mat_vec(h_pinv.as_ref(), model.desired_correction());
    Ok(x[1..].iter().copied().map(round_to_centivolts).collect())
}

/// Least-squares voltage corrections which keep the mirror inside its limits.
///
/// Minimises `‖H x − y‖²` subject to every absolute voltage `initial + correction`
/// lying in the allowed range, and neighbouring absolute voltages differing by
/// at most the max adjacent difference. Non-convergence isn't an error: the
/// outcome carries the best iterate found and a status saying what went wrong.
pub fn solve_constrained(
    model: &InteractionModel,
    initial_voltages: &[f64],
    limits: VoltageLimits,
    config: Config,
) -> Result<ConstrainedOutcome, Error> {
    if initial_voltages.len() != model.num_actuators() {
        return Err(Error::WrongNumberInitialVoltages {
            actuators: model.num_actuators(),
            voltages: initial_voltages.len(),
        });
    }
    let h = model.interaction_matrix();
    let n = model.num_unknowns();

    // Rank-deficient problems have a whole subspace of minimisers, and only the
    // regularization makes the QP strictly convex. Never let it fall to zero there.
    let regularization = if rank_analysis(h)?.is_full_rank() {
        config.regularization
    } else {
        libm::fmax(config.regularization, MIN_RANK_DEFICIENT_REGULARIZATION)
    };

    // ‖Hx − y‖² + (x − x₀)ᵀΛ(x − x₀) expands to ½xᵀGx + gᵀx (up to a constant and a factor of 2)
    // with G = HᵀH + Λ and g = −(Hᵀy + Λx₀).
    let mut hessian = h.transpose() * h;
    let largest_diagonal = (0..n).map(|i| hessian[(i, i)]).fold(0.0, libm::fmax);
    let floor = 1e-12 * largest_diagonal;
    let lambda: Vec<f64> = (0..n)
        .map(|i| regularization * libm::fmax(hessian[(i, i)], floor))
        .collect();
    for (i, l) in lambda.iter().enumerate() {
        hessian[(i, i)] += l;
    }
    let hty = h.transpose() * ColRef::from_slice(model.desired_correction());
    let linear = hty
        .iter()
        .zip(&lambda)
        .map(|(hty, l)| -(hty + l * INITIAL_GUESS))
        .collect();

    let constraint_set = ConstraintSet::new(initial_voltages, limits);
    let rows = constraint_set.linear_rows();
    tracing::debug!(
        unknowns = n,
        constraint_rows = rows.len(),
        "starting constrained solve"
    );
    let qp = QuadraticProgram {
        hessian,
        linear,
        constraints: &rows,
    };
    let solution = qp.solve(config)?;

    let out_of_range = constraint_set.out_of_range(&solution.x);
    let adjacent_violations = constraint_set.adjacent_violations(&solution.x);
    tracing::debug!(
        iterations = solution.iterations,
        status = ?solution.status,
        residual = model.squared_residual(&solution.x),
        "constrained solve finished"
    );
    if solution.status != SolveStatus::Optimal {
        tracing::warn!(
            status = ?solution.status,
            out_of_range = out_of_range.len(),
            adjacent_violations = adjacent_violations.len(),
            "constrained solve did not find an optimal solution, returning the best found"
        );
    }

    Ok(ConstrainedOutcome {
        corrections: solution.x[1..]
            .iter()
            .copied()
            .map(round_to_centivolts)
            .collect(),
        iterations: solution.iterations,
        status: solution.status,
        out_of_range,
        adjacent_violations,
    })
}
