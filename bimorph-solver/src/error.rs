use faer::linalg::{solvers::LltError, svd::SvdError};

/// Errors that stop a voltage correction from being calculated.
///
/// Numerical trouble (a near-singular interaction matrix, an optimizer that
/// runs out of iterations) is never reported here. Those show up as
/// [`crate::Warning`]s on an otherwise successful outcome.
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum Error {
    /// The baseline scan index doesn't select any column of the centroid matrix.
    #[error("baseline scan {index} is out of range, it must be between {min} and {max}")]
    BaselineScanOutOfRange {
        /// The index that was requested.
        index: isize,
        /// Smallest valid index (inclusive), counting back from the last scan.
        min: isize,
        /// Largest valid index (inclusive).
        max: isize,
    },
    /// The centroid matrix had no rows.
    #[error("The centroid matrix must contain at least one slit position")]
    NoSlitPositions,
    /// The centroid matrix needs a baseline scan and at least one perturbed scan.
    #[error("The centroid matrix must contain at least 2 pencil beam scans, but it had {scans}")]
    TooFewScans {
        /// How many scans (columns) were given.
        scans: usize,
    },
    /// Rows of the centroid matrix had different lengths.
    #[error("Row {row} of the centroid matrix has {actual} scans, but row 0 has {expected}")]
    RaggedRows {
        /// The offending row.
        row: usize,
        /// Number of scans in the first row.
        expected: usize,
        /// Number of scans in the offending row.
        actual: usize,
    },
    /// Scans (columns) of the centroid matrix had different lengths.
    #[error("Scan {scan} has {actual} slit positions, but scan 0 has {expected}")]
    RaggedScans {
        /// The offending scan.
        scan: usize,
        /// Number of slit positions in the first scan.
        expected: usize,
        /// Number of slit positions in the offending scan.
        actual: usize,
    },
    /// A centroid was NaN or infinite.
    #[error("Centroid at slit position {row}, scan {scan} is not a finite number")]
    NonFiniteCentroid {
        /// Slit position (row).
        row: usize,
        /// Scan (column).
        scan: usize,
    },
    /// The voltage increment between scans must be a finite, nonzero number.
    #[error("The voltage increment must be finite and nonzero, but it was {0}")]
    InvalidVoltageIncrement(f64),
    /// There must be exactly one initial voltage per actuator.
    #[error(
        "There should be exactly 1 initial voltage per actuator, but there are {actuators} actuators and {voltages} initial voltages"
    )]
    WrongNumberInitialVoltages {
        /// Actuators in the interaction model.
        actuators: usize,
        /// Initial voltages supplied.
        voltages: usize,
    },
    /// There must be exactly one correction per actuator.
    #[error(
        "There should be exactly 1 correction per actuator, but there are {actuators} actuators and {corrections} corrections"
    )]
    WrongNumberCorrections {
        /// Actuators in the interaction model.
        actuators: usize,
        /// Corrections supplied.
        corrections: usize,
    },
    /// The voltage range was empty or contained NaN.
    #[error("Invalid voltage range ({min}, {max}), the minimum must not exceed the maximum")]
    InvalidVoltageRange {
        /// Lower end of the range.
        min: f64,
        /// Upper end of the range.
        max: f64,
    },
    /// The maximum difference between adjacent actuators was negative or NaN.
    #[error("The maximum adjacent voltage difference must be non-negative, but it was {0}")]
    InvalidMaxAdjacentDifference(f64),
    /// Faer: could not decompose a matrix.
    #[error("Something went wrong doing SVD in faer")]
    Svd(SvdError),
    /// Faer: the constrained solver's Hessian wasn't positive definite,
    /// so it couldn't be Cholesky factored. Only happens with regularization disabled.
    #[error("The constrained problem is not strictly convex, try enabling regularization")]
    NotPositiveDefinite(LltError),
}

impl From<SvdError> for Error {
    fn from(error: SvdError) -> Self {
        Self::Svd(error)
    }
}

impl From<LltError> for Error {
    fn from(error: LltError) -> Self {
        Self::NotPositiveDefinite(error)
    }
}
