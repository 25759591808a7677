use crate::datatypes::{VoltageLimits, VoltageRange};

/// Constraint residuals this close to violation still count as satisfied.
pub(crate) const VIOLATION_TOLERANCE: f64 = 1e-6;

/// Do these voltages respect the mirror's limits?
///
/// True if every voltage lies inside `range` and every step from one actuator
/// to the next, `voltages[i + 1] - voltages[i]`, is at most `max_adjacent_difference`.
/// Note that step is signed: a large *drop* between neighbours passes.
/// The constrained solver itself limits the absolute difference.
/// An empty vector passes.
pub fn check_voltages_fit_constraints(
    voltages: &[f64],
    range: VoltageRange,
    max_adjacent_difference: f64,
) -> bool {
    let in_range = voltages.iter().all(|&v| range.contains(v));
    let small_steps = voltages
        .windows(2)
        .all(|pair| pair[1] - pair[0] <= max_adjacent_difference);
    in_range && small_steps
}

/// Like [`check_voltages_fit_constraints`] but takes the limits bundled together.
pub fn check_voltages_fit_limits(voltages: &[f64], limits: VoltageLimits) -> bool {
    check_voltages_fit_constraints(voltages, limits.range(), limits.max_adjacent_difference())
}

/// Describes one nonzero coefficient in a row of the constraint matrix.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Coefficient {
    /// Which unknown this multiplies.
    /// Corresponds to one column in the row.
    pub index: usize,
    /// The coefficient.
    pub value: f64,
}

/// The linear inequality `Σ coefficient · x ≥ lower`.
#[derive(Clone, Debug)]
pub(crate) struct LinearInequality {
    pub coefficients: Vec<Coefficient>,
    pub lower: f64,
}

impl LinearInequality {
    /// Inner product of this row's coefficients with a dense vector.
    pub fn dot(&self, v: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .map(|c| c.value * v[c.index])
            .sum()
    }

    /// The row as a dense vector of `n` coefficients.
    pub fn to_dense(&self, n: usize) -> Vec<f64> {
        let mut dense = vec![0.0; n];
        for c in &self.coefficients {
            dense[c.index] += c.value;
        }
        dense
    }

    /// How far `x` is inside the feasible side. Negative means violated.
    pub fn slack(&self, x: &[f64]) -> f64 {
        self.dot(x) - self.lower
    }
}

/// Keeps one unknown between two values.
#[derive(Clone, Copy, Debug)]
pub(crate) struct VariableBound {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
}

impl VariableBound {
    fn is_satisfied(&self, x: &[f64]) -> bool {
        let v = x[self.index];
        v >= self.lower - VIOLATION_TOLERANCE && v <= self.upper + VIOLATION_TOLERANCE
    }

    /// `x ≥ lower` and `−x ≥ −upper`. Infinite sides contribute nothing.
    fn linear_rows(&self, out: &mut Vec<LinearInequality>) {
        if self.lower.is_finite() {
            out.push(LinearInequality {
                coefficients: vec![Coefficient {
                    index: self.index,
                    value: 1.0,
                }],
                lower: self.lower,
            });
        }
        if self.upper.is_finite() {
            out.push(LinearInequality {
                coefficients: vec![Coefficient {
                    index: self.index,
                    value: -1.0,
                }],
                lower: -self.upper,
            });
        }
    }
}

/// Limits the voltage difference between actuator `actuator` and its neighbour
/// `actuator + 1`, after corrections are applied to their initial voltages:
///
/// `max_difference − |(initial[i] + x[i+1]) − (initial[i+1] + x[i+2])| ≥ 0`
///
/// where `x[0]` is the bias term, so actuator `i`'s correction is `x[i + 1]`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AdjacentDifference {
    pub actuator: usize,
    /// `initial[i] − initial[i+1]`.
    pub offset: f64,
    pub max_difference: f64,
}

impl AdjacentDifference {
    /// Difference in absolute voltage between the two actuators.
    fn difference(&self, x: &[f64]) -> f64 {
        let left = self.actuator + 1;
        self.offset + x[left] - x[left + 1]
    }

    /// Non-negative when the constraint holds.
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.max_difference - self.difference(x).abs()
    }

    /// `|offset + e| ≤ max` splits into `−e ≥ offset − max` and `e ≥ −max − offset`,
    /// where `e = x[i+1] − x[i+2]`.
    fn linear_rows(&self, out: &mut Vec<LinearInequality>) {
        if !self.max_difference.is_finite() {
            return;
        }
        let left = self.actuator + 1;
        let e = |sign: f64| {
            vec![
                Coefficient {
                    index: left,
                    value: sign,
                },
                Coefficient {
                    index: left + 1,
                    value: -sign,
                },
            ]
        };
        out.push(LinearInequality {
            coefficients: e(-1.0),
            lower: self.offset - self.max_difference,
        });
        out.push(LinearInequality {
            coefficients: e(1.0),
            lower: -self.max_difference - self.offset,
        });
    }
}

/// Every constraint on the unknowns `[bias, correction_0, .., correction_n-1]`,
/// generated up front from the limits and initial voltages.
#[derive(Clone, Debug)]
pub(crate) struct ConstraintSet {
    bounds: Vec<VariableBound>,
    adjacent: Vec<AdjacentDifference>,
}

impl ConstraintSet {
    /// `initial_voltages` must have one entry per actuator.
    pub fn new(initial_voltages: &[f64], limits: VoltageLimits) -> Self {
        let range = limits.range();
        // The bias term isn't a voltage, but it's bounded by the range directly.
        let bias = VariableBound {
            index: 0,
            lower: range.min(),
            upper: range.max(),
        };
        let corrections = initial_voltages.iter().enumerate().map(|(i, &initial)| {
            let (lower, upper) = range.for_correction_from(initial);
            VariableBound {
                index: i + 1,
                lower,
                upper,
            }
        });
        let bounds = std::iter::once(bias).chain(corrections).collect();
        let adjacent = initial_voltages
            .windows(2)
            .enumerate()
            .map(|(actuator, pair)| AdjacentDifference {
                actuator,
                offset: pair[0] - pair[1],
                max_difference: limits.max_adjacent_difference(),
            })
            .collect();
        Self { bounds, adjacent }
    }

    /// Expand every constraint into linear inequality rows for the QP solver.
    pub fn linear_rows(&self) -> Vec<LinearInequality> {
        let mut rows = Vec::with_capacity(2 * (self.bounds.len() + self.adjacent.len()));
        for bound in &self.bounds {
            bound.linear_rows(&mut rows);
        }
        for pair in &self.adjacent {
            pair.linear_rows(&mut rows);
        }
        rows
    }

    /// Actuators whose corrected voltage falls outside the range.
    pub fn out_of_range(&self, x: &[f64]) -> Vec<usize> {
        self.bounds
            .iter()
            .filter(|b| b.index > 0 && !b.is_satisfied(x))
            .map(|b| b.index - 1)
            .collect()
    }

    /// Left-hand actuator of each neighbouring pair that is too far apart.
    pub fn adjacent_violations(&self, x: &[f64]) -> Vec<usize> {
        self.adjacent
            .iter()
            .filter(|pair| pair.margin(x) < -VIOLATION_TOLERANCE)
            .map(|pair| pair.actuator)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> VoltageRange {
        VoltageRange::new(-1000.0, 1000.0).unwrap()
    }

    #[test]
    fn checker_examples() {
        assert!(check_voltages_fit_constraints(&[0.0, 0.0, 0.0], range(), 500.0));
        assert!(check_voltages_fit_constraints(
            &[-1000.0, -500.0, 0.0, 500.0, 1000.0],
            range(),
            500.0
        ));
        // Difference too big.
        assert!(!check_voltages_fit_constraints(&[0.0, 0.0, 501.0], range(), 500.0));
        // Value out of range.
        assert!(!check_voltages_fit_constraints(&[1000.0, 1000.0, 1001.0], range(), 500.0));
    }

    #[test]
    fn checker_only_limits_upward_steps() {
        assert!(check_voltages_fit_constraints(&[500.0, -500.0], range(), 500.0));
        assert!(!check_voltages_fit_constraints(&[-500.0, 500.0], range(), 500.0));
    }

    #[test]
    fn checker_edge_cases() {
        assert!(check_voltages_fit_constraints(&[], range(), 0.0));
        assert!(check_voltages_fit_constraints(&[999.0], range(), 0.0));
        assert!(!check_voltages_fit_constraints(&[f64::NAN], range(), 500.0));
        assert!(check_voltages_fit_limits(
            &[1e9, -1e9],
            VoltageLimits::unbounded()
        ));
    }

    #[test]
    fn bounds_are_shifted_by_initial_voltages() {
        let limits = VoltageLimits::new(range(), 500.0).unwrap();
        let set = ConstraintSet::new(&[100.0, -200.0], limits);
        // bias, 2 corrections, 1 adjacent pair, each splitting into 2 rows.
        let rows = set.linear_rows();
        assert_eq!(rows.len(), 8);

        // Correction of 900 on top of 100 V is exactly at the limit.
        assert!(set.out_of_range(&[0.0, 900.0, 0.0]).is_empty());
        assert_eq!(set.out_of_range(&[0.0, 901.0, 0.0]), vec![0]);
        assert_eq!(set.out_of_range(&[0.0, 0.0, -801.0]), vec![1]);
    }

    #[test]
    fn adjacent_difference_is_absolute() {
        let pair = AdjacentDifference {
            actuator: 0,
            offset: 100.0 - (-200.0),
            max_difference: 500.0,
        };
        // Absolute voltages 100 and -200: 300 apart.
        assert!((pair.margin(&[0.0, 0.0, 0.0]) - 200.0).abs() < 1e-12);
        // 100 + 250 and -200 - 0: 550 apart.
        assert!(pair.margin(&[0.0, 250.0, 0.0]) < 0.0);
        // -450 and -200 + 300 = 100: 550 apart, the other way.
        assert!(pair.margin(&[0.0, -550.0, 300.0]) < 0.0);

        let mut rows = Vec::new();
        pair.linear_rows(&mut rows);
        for x in [[0.0, 0.0, 0.0], [0.0, 200.0, 0.0], [0.0, -800.0, 0.0]] {
            let rows_hold = rows.iter().all(|r| r.slack(&x) >= 0.0);
            assert_eq!(rows_hold, pair.margin(&x) >= 0.0, "disagree at {x:?}");
        }
    }

    #[test]
    fn dense_row() {
        let row = LinearInequality {
            coefficients: vec![
                Coefficient {
                    index: 1,
                    value: 1.0,
                },
                Coefficient {
                    index: 3,
                    value: -1.0,
                },
            ],
            lower: 0.0,
        };
        assert_eq!(row.to_dense(4), vec![0.0, 1.0, 0.0, -1.0]);
        assert_eq!(row.dot(&[9.0, 2.0, 9.0, 5.0]), -3.0);
    }

    #[test]
    fn infinite_limits_produce_no_rows() {
        let set = ConstraintSet::new(&[0.0, 0.0, 0.0], VoltageLimits::unbounded());
        assert!(set.linear_rows().is_empty());
    }
}
