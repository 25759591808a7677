//! Bimorph mirror voltage optimisation.
//! Works out which voltages flatten a bimorph mirror, from pencil beam scans
//! taken while stepping each actuator in turn.

pub use crate::constraints::{check_voltages_fit_constraints, check_voltages_fit_limits};
pub use crate::datatypes::{
    BaselineScan, CentroidMatrix, VoltageIncrement, VoltageLimits, VoltageRange,
};
pub use crate::error::Error;
pub use crate::interaction::InteractionModel;
pub use crate::solve_outcome::{
    ConstrainedOutcome, CorrectionOutcome, CorrectionRequest, Strategy,
};
pub use crate::solver::{Config, SolveStatus};
pub use crate::warnings::{Warning, WarningContent, lint};
use crate::solve_outcome::Stage;
use crate::warnings::lint_outcome;

/// Checking voltages against the mirror's limits.
mod constraints;
/// Validated inputs (centroid matrices, voltages, limits).
pub mod datatypes;
mod error;
/// The mirror's linear response model.
mod interaction;
/// Dense linear algebra helpers.
mod linalg;
mod solve_outcome;
/// Least-squares solvers, with and without limits.
pub mod solver;
/// Unit tests
#[cfg(test)]
mod tests;
mod warnings;

/// Voltage corrections which best flatten the baseline scan, ignoring the mirror's limits.
/// One correction per actuator, rounded to 2 decimal places.
pub fn find_voltage_corrections(
    data: &CentroidMatrix,
    increment: VoltageIncrement,
    baseline: BaselineScan,
) -> Result<Vec<f64>, Error> {
    let model = InteractionModel::build(data, increment, baseline)?;
    solver::solve_unconstrained(&model)
}

/// Voltage corrections which best flatten the baseline scan, while keeping every
/// absolute voltage (`initial_voltages + correction`) inside `limits`.
pub fn find_voltage_corrections_with_restraints(
    data: &CentroidMatrix,
    increment: VoltageIncrement,
    initial_voltages: &[f64],
    limits: VoltageLimits,
    baseline: BaselineScan,
    config: Config,
) -> Result<ConstrainedOutcome, Error> {
    let model = InteractionModel::build(data, increment, baseline)?;
    solver::solve_constrained(&model, initial_voltages, limits, config)
}

/// Find the best voltages for the mirror.
///
/// Solves without limits first. If the request has limits and the resulting
/// absolute voltages break them, solves again with the limits enforced.
pub fn calculate_optimal_voltages(request: &CorrectionRequest) -> Result<CorrectionOutcome, Error> {
    let initial_voltages = request.initial_voltages();
    let mut strategy = Strategy::Unconstrained;
    let mut iterations = 0;
    let mut warnings = Vec::new();

    let mut stage = Stage::Start;
    let corrections = loop {
        tracing::debug!(%stage, "optimal voltages");
        stage = match stage {
            Stage::Start => {
                if initial_voltages.len() != request.data.num_actuators() {
                    return Err(Error::WrongNumberInitialVoltages {
                        actuators: request.data.num_actuators(),
                        voltages: initial_voltages.len(),
                    });
                }
                Stage::BuildModel
            }
            Stage::BuildModel => {
                let model =
                    InteractionModel::build(&request.data, request.increment, request.baseline)?;
                warnings.extend(lint(
                    &model,
                    request.limits.map(|limits| (initial_voltages.as_slice(), limits)),
                ));
                Stage::UnconstrainedSolve { model }
            }
            Stage::UnconstrainedSolve { model } => {
                let corrections = solver::solve_unconstrained(&model)?;
                Stage::CheckConstraints { model, corrections }
            }
            Stage::CheckConstraints { model, corrections } => match request.limits {
                Some(limits)
                    if !check_voltages_fit_limits(
                        &absolute(&initial_voltages, &corrections),
                        limits,
                    ) =>
                {
                    Stage::ConstrainedSolve { model, limits }
                }
                _ => Stage::Done { corrections },
            },
            Stage::ConstrainedSolve { model, limits } => {
                let outcome =
                    solver::solve_constrained(&model, &initial_voltages, limits, request.config)?;
                warnings.extend(lint_outcome(&outcome));
                iterations = outcome.iterations();
                strategy = Strategy::Constrained;
                Stage::Done {
                    corrections: outcome.into_corrections(),
                }
            }
            Stage::Done { corrections } => break corrections,
        };
    };

    let optimal_voltages = absolute(&initial_voltages, &corrections);
    let satisfies_limits = request
        .limits
        .is_none_or(|limits| check_voltages_fit_limits(&optimal_voltages, limits));
    tracing::info!(
        ?strategy,
        iterations,
        satisfies_limits,
        warnings = warnings.len(),
        "calculated optimal voltages"
    );
    Ok(CorrectionOutcome {
        corrections,
        optimal_voltages,
        strategy,
        iterations,
        satisfies_limits,
        warnings,
    })
}

/// Absolute voltage on each actuator after applying the corrections.
fn absolute(initial_voltages: &[f64], corrections: &[f64]) -> Vec<f64> {
    initial_voltages
        .iter()
        .zip(corrections)
        .map(|(v, c)| linalg::round_to_centivolts(v + c))
        .collect()
}
