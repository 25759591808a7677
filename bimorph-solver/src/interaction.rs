//! Building the linear response model of the mirror from its pencil beam scans.
use faer::{ColRef, Mat, MatRef};

use crate::{
    Error,
    datatypes::{BaselineScan, CentroidMatrix, VoltageIncrement},
    linalg,
};

/// Linear model of how each actuator moves the beam centroid,
/// plus the correction that would flatten the baseline scan.
#[derive(Clone, Debug)]
pub struct InteractionModel {
    /// One row per slit position. Column 0 is the bias term (all ones),
    /// column `k + 1` is actuator `k`'s centroid response per volt.
    matrix: Mat<f64>,
    /// Mean of the baseline scan minus each of its centroids.
    desired_correction: Vec<f64>,
    /// Centroids of the baseline scan.
    baseline_centroids: Vec<f64>,
    /// Resolved (non-negative) column of the baseline scan.
    baseline_scan: usize,
    increment: VoltageIncrement,
}

impl InteractionModel {
    /// Difference consecutive scans to find each actuator's response,
    /// and work out the correction needed to flatten the baseline scan.
    pub fn build(
        data: &CentroidMatrix,
        increment: VoltageIncrement,
        baseline: BaselineScan,
    ) -> Result<Self, Error> {
        // Validate before doing any arithmetic.
        let baseline_scan = baseline.resolve(data.num_scans())?;
        let rows = data.num_slit_positions();
        let cols = data.num_scans();
        let v = increment.volts();

        let matrix = Mat::from_fn(rows, cols, |i, j| {
            if j == 0 {
                1.0
            } else {
                (data.centroid(i, j) - data.centroid(i, j - 1)) / v
            }
        });

        let baseline_centroids = data.scan(baseline_scan);
        let target = baseline_centroids.iter().sum::<f64>() / rows as f64;
        let desired_correction = baseline_centroids.iter().map(|c| target - c).collect();

        tracing::debug!(
            slit_positions = rows,
            actuators = cols - 1,
            baseline_scan,
            "built interaction model"
        );
        Ok(Self {
            matrix,
            desired_correction,
            baseline_centroids,
            baseline_scan,
            increment,
        })
    }

    /// The interaction matrix, shape (slit positions, actuators + 1).
    pub fn interaction_matrix(&self) -> MatRef<'_, f64> {
        self.matrix.as_ref()
    }

    /// How far each slit position's centroid is from the baseline scan's mean.
    pub fn desired_correction(&self) -> &[f64] {
        &self.desired_correction
    }

    /// The scan whose shape is being corrected.
    pub fn baseline_centroids(&self) -> &[f64] {
        &self.baseline_centroids
    }

    /// Column index of the baseline scan in the original centroid matrix.
    pub fn baseline_scan(&self) -> usize {
        self.baseline_scan
    }

    /// Number of slit positions (rows).
    pub fn num_slit_positions(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of actuators. The bias column isn't an actuator.
    pub fn num_actuators(&self) -> usize {
        self.matrix.ncols() - 1
    }

    /// Number of unknowns when solving against this model (actuators plus the bias term).
    pub(crate) fn num_unknowns(&self) -> usize {
        self.matrix.ncols()
    }

    /// Centroid response to this actuator, per volt, at every slit position.
    pub fn influence_function(&self, actuator: usize) -> Option<Vec<f64>> {
        if actuator >= self.num_actuators() {
            return None;
        }
        Some(
            (0..self.num_slit_positions())
                .map(|row| self.matrix[(row, actuator + 1)])
                .collect(),
        )
    }

    /// Change in centroids between the scan before and after this actuator was stepped,
    /// i.e. the influence function scaled back up by the voltage increment.
    pub fn scan_difference(&self, actuator: usize) -> Option<Vec<f64>> {
        let v = self.increment.volts();
        self.influence_function(actuator)
            .map(|f| f.into_iter().map(|r| r * v).collect())
    }

    /// Where the model predicts the centroids will end up once these
    /// corrections are applied on top of the baseline voltages.
    pub fn predicted_centroids(&self, corrections: &[f64]) -> Result<Vec<f64>, Error> {
        if corrections.len() != self.num_actuators() {
            return Err(Error::WrongNumberCorrections {
                actuators: self.num_actuators(),
                corrections: corrections.len(),
            });
        }
        let responses = self
            .matrix
            .as_ref()
            .subcols(1, self.num_actuators());
        let shift = linalg::mat_vec(responses, corrections);
        Ok(self
            .baseline_centroids
            .iter()
            .zip(shift)
            .map(|(c, s)| c + s)
            .collect())
    }

    /// Sum of squared residuals `‖H x − y‖²`, where `x` includes the bias term.
    pub(crate) fn squared_residual(&self, x: &[f64]) -> f64 {
        let hx = self.matrix.as_ref() * ColRef::from_slice(x);
        let residual = hx.as_ref() - ColRef::from_slice(&self.desired_correction);
        residual.as_ref().squared_norm_l2()
    }
}
