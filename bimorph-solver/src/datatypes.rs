use faer::{Mat, MatRef};

use crate::Error;

/// Beam centroid positions from a series of pencil beam scans.
///
/// Rows are slit positions, columns are scans. Each scan after the first
/// was taken after stepping one more actuator by the voltage increment,
/// so there is one more scan than there are actuators.
#[derive(Clone, Debug)]
pub struct CentroidMatrix {
    centroids: Mat<f64>,
}

impl CentroidMatrix {
    /// Build the matrix from rows, one row per slit position,
    /// each holding that slit position's centroid in every scan.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, Error> {
        let Some(first) = rows.first() else {
            return Err(Error::NoSlitPositions);
        };
        let num_scans = first.as_ref().len();
        for (row, values) in rows.iter().enumerate() {
            let actual = values.as_ref().len();
            if actual != num_scans {
                return Err(Error::RaggedRows {
                    row,
                    expected: num_scans,
                    actual,
                });
            }
        }
        let centroids = Mat::from_fn(rows.len(), num_scans, |i, j| rows[i].as_ref()[j]);
        Self::new(centroids)
    }

    /// Build the matrix from scans, one slice per pencil beam scan,
    /// each holding the centroid at every slit position.
    /// This is the layout you get from pivoting scan data on the scan index.
    pub fn from_columns<C: AsRef<[f64]>>(scans: &[C]) -> Result<Self, Error> {
        let num_slit_positions = scans.first().map(|s| s.as_ref().len()).unwrap_or_default();
        for (scan, values) in scans.iter().enumerate() {
            let actual = values.as_ref().len();
            if actual != num_slit_positions {
                return Err(Error::RaggedScans {
                    scan,
                    expected: num_slit_positions,
                    actual,
                });
            }
        }
        let centroids = Mat::from_fn(num_slit_positions, scans.len(), |i, j| {
            scans[j].as_ref()[i]
        });
        Self::new(centroids)
    }

    /// Wrap an existing faer matrix (rows are slit positions, columns are scans).
    pub fn new(centroids: Mat<f64>) -> Result<Self, Error> {
        if centroids.nrows() == 0 {
            return Err(Error::NoSlitPositions);
        }
        if centroids.ncols() < 2 {
            return Err(Error::TooFewScans {
                scans: centroids.ncols(),
            });
        }
        for scan in 0..centroids.ncols() {
            for row in 0..centroids.nrows() {
                if !centroids[(row, scan)].is_finite() {
                    return Err(Error::NonFiniteCentroid { row, scan });
                }
            }
        }
        Ok(Self { centroids })
    }

    /// Number of slit positions (rows).
    pub fn num_slit_positions(&self) -> usize {
        self.centroids.nrows()
    }

    /// Number of pencil beam scans (columns).
    pub fn num_scans(&self) -> usize {
        self.centroids.ncols()
    }

    /// Number of actuators these scans characterise.
    pub fn num_actuators(&self) -> usize {
        self.num_scans() - 1
    }

    /// Centroid measured at this slit position during this scan.
    pub fn centroid(&self, slit_position: usize, scan: usize) -> f64 {
        self.centroids[(slit_position, scan)]
    }

    /// Every centroid from one scan, ordered by slit position.
    pub fn scan(&self, scan: usize) -> Vec<f64> {
        (0..self.num_slit_positions())
            .map(|row| self.centroids[(row, scan)])
            .collect()
    }

    /// View the underlying matrix.
    pub fn as_mat(&self) -> MatRef<'_, f64> {
        self.centroids.as_ref()
    }
}

/// The voltage step applied to each actuator between consecutive scans.
/// May be negative, but never zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageIncrement(f64);

impl VoltageIncrement {
    /// Validate the increment.
    pub fn new(volts: f64) -> Result<Self, Error> {
        if volts == 0.0 || !volts.is_finite() {
            return Err(Error::InvalidVoltageIncrement(volts));
        }
        Ok(Self(volts))
    }

    /// The increment, in volts.
    pub fn volts(self) -> f64 {
        self.0
    }
}

/// Which scan to treat as the baseline, i.e. the mirror shape being corrected.
/// Negative values count back from the last scan, so -1 is the last scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct BaselineScan(
    /// Column index, or counting back from the end if negative.
    pub isize,
);

impl BaselineScan {
    /// The first scan, taken before any actuator was stepped.
    pub const FIRST: Self = Self(0);
    /// The last scan, taken after every actuator was stepped.
    pub const LAST: Self = Self(-1);

    /// Turn this (possibly negative) index into a column index,
    /// for a matrix with `num_scans` columns.
    pub fn resolve(self, num_scans: usize) -> Result<usize, Error> {
        let len = isize::try_from(num_scans).unwrap_or(isize::MAX);
        let index = self.0;
        if index < -len || index >= len {
            return Err(Error::BaselineScanOutOfRange {
                index,
                min: -len,
                max: len - 1,
            });
        }
        let resolved = if index >= 0 { index } else { len + index };
        Ok(resolved as usize)
    }
}

impl From<isize> for BaselineScan {
    fn from(index: isize) -> Self {
        Self(index)
    }
}

/// Bounds on any single actuator's absolute voltage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageRange {
    min: f64,
    max: f64,
}

impl VoltageRange {
    /// Both ends are inclusive. Infinite ends are allowed.
    pub fn new(min: f64, max: f64) -> Result<Self, Error> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidVoltageRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// A range which allows any voltage.
    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Lowest allowed voltage.
    pub fn min(self) -> f64 {
        self.min
    }

    /// Highest allowed voltage.
    pub fn max(self) -> f64 {
        self.max
    }

    /// Is this voltage inside the range?
    pub fn contains(self, volts: f64) -> bool {
        self.min <= volts && volts <= self.max
    }

    /// Bounds on a correction added to `initial`, such that
    /// `initial + correction` stays inside this range.
    pub fn for_correction_from(self, initial: f64) -> (f64, f64) {
        (self.min - initial, self.max - initial)
    }
}

impl TryFrom<(f64, f64)> for VoltageRange {
    type Error = Error;

    fn try_from((min, max): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

/// Physical limits the mirror's voltages must respect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageLimits {
    range: VoltageRange,
    max_adjacent_difference: f64,
}

impl VoltageLimits {
    /// `max_adjacent_difference` bounds the voltage difference between
    /// physically neighbouring actuators. It may be infinite.
    pub fn new(range: VoltageRange, max_adjacent_difference: f64) -> Result<Self, Error> {
        if max_adjacent_difference.is_nan() || max_adjacent_difference < 0.0 {
            return Err(Error::InvalidMaxAdjacentDifference(max_adjacent_difference));
        }
        Ok(Self {
            range,
            max_adjacent_difference,
        })
    }

    /// Limits which every voltage vector satisfies.
    pub fn unbounded() -> Self {
        Self {
            range: VoltageRange::unbounded(),
            max_adjacent_difference: f64::INFINITY,
        }
    }

    /// Bounds on each actuator's absolute voltage.
    pub fn range(self) -> VoltageRange {
        self.range
    }

    /// Largest allowed voltage difference between neighbouring actuators.
    pub fn max_adjacent_difference(self) -> f64 {
        self.max_adjacent_difference
    }
}
