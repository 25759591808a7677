use crate::{
    ConstrainedOutcome,
    constraints::check_voltages_fit_limits,
    datatypes::VoltageLimits,
    interaction::InteractionModel,
    solver::{SolveStatus, rank_analysis},
};

/// Something suspicious about a problem or its solution. Never fatal.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Warning {
    /// Which actuator this is about, if any.
    pub about_actuator: Option<usize>,
    /// What's wrong.
    pub content: WarningContent,
}

/// The different things [`lint`] looks for.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
#[non_exhaustive]
pub enum WarningContent {
    /// Stepping this actuator didn't move the beam at all.
    DeadActuator,
    /// The interaction matrix has fewer independent columns than unknowns.
    RankDeficient {
        /// Numeric rank of the interaction matrix.
        rank: usize,
        /// Actuators plus the bias term.
        columns: usize,
    },
    /// This actuator's correction can't be told apart from some other combination of actuators.
    Unresolved,
    /// Fewer slit positions than unknowns, so the fit can't be unique.
    Underdetermined {
        /// Rows of the interaction matrix.
        slit_positions: usize,
        /// Actuators plus the bias term.
        unknowns: usize,
    },
    /// The voltages the mirror starts at already break the limits.
    InitialVoltagesOutsideLimits,
    /// The constrained solver hit its iteration limit.
    DidNotConverge {
        /// Iterations run before giving up.
        iterations: usize,
    },
    /// No voltages can satisfy every limit at once.
    Infeasible,
    /// The constrained solver lost accuracy to rounding error.
    Inaccurate,
    /// The final voltages still break a limit.
    ConstraintsStillViolated,
}

/// Centroid responses this much smaller than the largest response count as zero.
const DEAD_RESPONSE_RATIO: f64 = 1e-12;

/// Look for problems with the interaction model, and with the starting voltages if given.
pub fn lint(model: &InteractionModel, start: Option<(&[f64], VoltageLimits)>) -> Vec<Warning> {
    let mut warnings = Vec::default();

    let responses: Vec<f64> = (0..model.num_actuators())
        .map(|k| {
            model
                .influence_function(k)
                .unwrap_or_default()
                .iter()
                .map(|r| r.abs())
                .fold(0.0, libm::fmax)
        })
        .collect();
    let largest = responses.iter().copied().fold(0.0, libm::fmax);
    let dead: Vec<usize> = responses
        .iter()
        .enumerate()
        .filter(|(_, r)| **r <= DEAD_RESPONSE_RATIO * largest)
        .map(|(k, _)| k)
        .collect();
    warnings.extend(dead.iter().map(|&k| Warning {
        about_actuator: Some(k),
        content: WarningContent::DeadActuator,
    }));

    let unknowns = model.num_actuators() + 1;
    if model.num_slit_positions() < unknowns {
        warnings.push(Warning {
            about_actuator: None,
            content: WarningContent::Underdetermined {
                slit_positions: model.num_slit_positions(),
                unknowns,
            },
        });
    }

    match rank_analysis(model.interaction_matrix()) {
        Ok(analysis) if !analysis.is_full_rank() => {
            tracing::warn!(
                rank = analysis.rank,
                columns = analysis.columns,
                "interaction matrix is rank deficient"
            );
            warnings.push(Warning {
                about_actuator: None,
                content: WarningContent::RankDeficient {
                    rank: analysis.rank,
                    columns: analysis.columns,
                },
            });
            warnings.extend(
                analysis
                    .unresolved_actuators
                    .into_iter()
                    .filter(|k| !dead.contains(k))
                    .map(|k| Warning {
                        about_actuator: Some(k),
                        content: WarningContent::Unresolved,
                    }),
            );
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "skipped rank analysis"),
    }

    if let Some((initial_voltages, limits)) = start {
        let range = limits.range();
        let out_of_range: Vec<usize> = initial_voltages
            .iter()
            .enumerate()
            .filter(|(_, v)| !range.contains(**v))
            .map(|(i, _)| i)
            .collect();
        if !out_of_range.is_empty() {
            warnings.extend(out_of_range.into_iter().map(|i| Warning {
                about_actuator: Some(i),
                content: WarningContent::InitialVoltagesOutsideLimits,
            }));
        } else if !check_voltages_fit_limits(initial_voltages, limits) {
            warnings.push(Warning {
                about_actuator: None,
                content: WarningContent::InitialVoltagesOutsideLimits,
            });
        }
    }
    warnings
}

/// Warnings about how a constrained solve went.
pub(crate) fn lint_outcome(outcome: &ConstrainedOutcome) -> Vec<Warning> {
    let mut warnings = Vec::default();
    match outcome.status() {
        SolveStatus::Optimal => {}
        SolveStatus::IterationLimit => warnings.push(Warning {
            about_actuator: None,
            content: WarningContent::DidNotConverge {
                iterations: outcome.iterations(),
            },
        }),
        SolveStatus::Infeasible => warnings.push(Warning {
            about_actuator: None,
            content: WarningContent::Infeasible,
        }),
        SolveStatus::Inaccurate => warnings.push(Warning {
            about_actuator: None,
            content: WarningContent::Inaccurate,
        }),
    }
    let mut violated: Vec<usize> = outcome
        .out_of_range()
        .iter()
        .chain(outcome.adjacent_violations())
        .copied()
        .collect();
    violated.sort_unstable();
    violated.dedup();
    warnings.extend(violated.into_iter().map(|k| Warning {
        about_actuator: Some(k),
        content: WarningContent::ConstraintsStillViolated,
    }));
    warnings
}

impl std::fmt::Display for WarningContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningContent::DeadActuator => write!(
                f,
                "Stepping this actuator didn't move the beam centroid at any slit position. Check it's connected, and that the voltage increment was actually applied."
            ),
            WarningContent::RankDeficient { rank, columns } => write!(
                f,
                "The interaction matrix has rank {rank} but {columns} columns, so some actuators have the same effect as a combination of others. The corrections found are one of many equally good answers."
            ),
            WarningContent::Unresolved => write!(
                f,
                "This actuator's correction could be traded off against other actuators without changing the fit"
            ),
            WarningContent::Underdetermined {
                slit_positions,
                unknowns,
            } => write!(
                f,
                "There are {slit_positions} slit positions but {unknowns} unknowns (one per actuator, plus a bias). Scan more slit positions."
            ),
            WarningContent::InitialVoltagesOutsideLimits => write!(
                f,
                "The initial voltages are already outside the voltage limits"
            ),
            WarningContent::DidNotConverge { iterations } => write!(
                f,
                "The constrained solver gave up after {iterations} iterations, these are the best voltages it found"
            ),
            WarningContent::Infeasible => write!(
                f,
                "No voltages satisfy every limit at once, these are the closest the solver found"
            ),
            WarningContent::Inaccurate => write!(
                f,
                "Rounding error built up in the constrained solver, so the voltages may be slightly outside the limits"
            ),
            WarningContent::ConstraintsStillViolated => write!(
                f,
                "This actuator's final voltage is outside the range or too far from its neighbour"
            ),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.about_actuator {
            Some(k) => write!(f, "actuator {k}: {}", self.content),
            None => write!(f, "{}", self.content),
        }
    }
}
