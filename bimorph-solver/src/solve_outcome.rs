use crate::{
    Warning,
    datatypes::{BaselineScan, CentroidMatrix, VoltageIncrement, VoltageLimits},
    interaction::InteractionModel,
    solver::{Config, SolveStatus},
};

/// Result of a constrained solve.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct ConstrainedOutcome {
    /// One correction per actuator, rounded to 2 decimal places.
    pub(crate) corrections: Vec<f64>,
    /// How many active-set changes the solver made.
    pub(crate) iterations: usize,
    /// Did the solver find the optimum, or give up early?
    pub(crate) status: SolveStatus,
    /// Actuators whose absolute voltage is still outside the range.
    pub(crate) out_of_range: Vec<usize>,
    /// Left-hand actuator of each neighbouring pair still too far apart.
    pub(crate) adjacent_violations: Vec<usize>,
}

impl ConstrainedOutcome {
    /// One correction per actuator, rounded to 2 decimal places.
    pub fn corrections(&self) -> &[f64] {
        &self.corrections
    }

    /// How many active-set changes the solver made.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Did the solver find the optimum, or give up early?
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Actuators whose absolute voltage is still outside the range.
    pub fn out_of_range(&self) -> &[usize] {
        &self.out_of_range
    }

    /// Left-hand actuator of each neighbouring pair still too far apart.
    pub fn adjacent_violations(&self) -> &[usize] {
        &self.adjacent_violations
    }

    /// True if the solver finished and every constraint holds.
    pub fn is_satisfied(&self) -> bool {
        self.status == SolveStatus::Optimal
            && self.out_of_range.is_empty()
            && self.adjacent_violations.is_empty()
    }

    /// Take ownership of the corrections.
    pub fn into_corrections(self) -> Vec<f64> {
        self.corrections
    }
}

/// Which solver produced the final corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain least squares. Either no limits were given, or the result already respected them.
    Unconstrained,
    /// Least squares subject to the voltage limits.
    Constrained,
}

/// Everything needed to work out the best voltages for a mirror.
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub(crate) data: CentroidMatrix,
    pub(crate) increment: VoltageIncrement,
    pub(crate) baseline: BaselineScan,
    pub(crate) initial_voltages: Option<Vec<f64>>,
    pub(crate) limits: Option<VoltageLimits>,
    pub(crate) config: Config,
}

impl CorrectionRequest {
    /// Correct the first scan, starting from 0 V on every actuator, with no limits.
    pub fn new(data: CentroidMatrix, increment: VoltageIncrement) -> Self {
        Self {
            data,
            increment,
            baseline: BaselineScan::default(),
            initial_voltages: None,
            limits: None,
            config: Config::default(),
        }
    }

    /// Which scan's shape to correct.
    pub fn with_baseline(mut self, baseline: BaselineScan) -> Self {
        self.baseline = baseline;
        self
    }

    /// The voltages already applied when the baseline scan was taken.
    pub fn with_initial_voltages(mut self, initial_voltages: Vec<f64>) -> Self {
        self.initial_voltages = Some(initial_voltages);
        self
    }

    /// Keep the absolute voltages inside these limits.
    pub fn with_limits(mut self, limits: VoltageLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Tune the constrained solver.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The initial voltages, defaulting to 0 V on every actuator.
    pub(crate) fn initial_voltages(&self) -> Vec<f64> {
        self.initial_voltages
            .clone()
            .unwrap_or_else(|| vec![0.0; self.data.num_actuators()])
    }
}

/// Final answer from [`crate::calculate_optimal_voltages`].
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct CorrectionOutcome {
    pub(crate) corrections: Vec<f64>,
    pub(crate) optimal_voltages: Vec<f64>,
    pub(crate) strategy: Strategy,
    pub(crate) iterations: usize,
    pub(crate) satisfies_limits: bool,
    pub(crate) warnings: Vec<Warning>,
}

impl CorrectionOutcome {
    /// Change to apply to each actuator, rounded to 2 decimal places.
    pub fn corrections(&self) -> &[f64] {
        &self.corrections
    }

    /// Absolute voltage for each actuator, i.e. initial voltage plus correction.
    pub fn optimal_voltages(&self) -> &[f64] {
        &self.optimal_voltages
    }

    /// Which solver produced the corrections.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Iterations of the constrained solver. Zero if it never ran.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Do the optimal voltages pass [`crate::check_voltages_fit_constraints`]?
    /// Always true when the request had no limits.
    pub fn satisfies_limits(&self) -> bool {
        self.satisfies_limits
    }

    /// Anything suspicious about the problem or its solution.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Steps of [`crate::calculate_optimal_voltages`], carrying what each step needs.
#[derive(Debug)]
pub(crate) enum Stage {
    Start,
    BuildModel,
    UnconstrainedSolve {
        model: InteractionModel,
    },
    CheckConstraints {
        model: InteractionModel,
        corrections: Vec<f64>,
    },
    ConstrainedSolve {
        model: InteractionModel,
        limits: VoltageLimits,
    },
    Done {
        corrections: Vec<f64>,
    },
}

impl std::fmt::Display for Stage {
    #[mutants::skip]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::BuildModel => "build model",
            Stage::UnconstrainedSolve { .. } => "unconstrained solve",
            Stage::CheckConstraints { .. } => "check constraints",
            Stage::ConstrainedSolve { .. } => "constrained solve",
            Stage::Done { .. } => "done",
        };
        f.write_str(name)
    }
}
