#![no_main]

use arbitrary::Arbitrary;
use bimorph_solver::{
    BaselineScan, CentroidMatrix, Config, CorrectionRequest, VoltageIncrement, VoltageLimits,
    VoltageRange, calculate_optimal_voltages,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|setup: Setup| {
    // Invalid inputs must be rejected with an error, never a panic.
    let Ok(data) = CentroidMatrix::from_rows(&setup.rows) else {
        return;
    };
    let Ok(increment) = VoltageIncrement::new(setup.increment) else {
        return;
    };
    let mut request = CorrectionRequest::new(data, increment)
        .with_baseline(setup.baseline)
        .with_initial_voltages(setup.initial_voltages)
        .with_config(Config::default().with_max_iterations(1_000));
    if let Some((min, max, max_adjacent_difference)) = setup.limits {
        let Ok(range) = VoltageRange::new(min, max) else {
            return;
        };
        let Ok(limits) = VoltageLimits::new(range, max_adjacent_difference) else {
            return;
        };
        request = request.with_limits(limits);
    }
    let _ = calculate_optimal_voltages(&request);
});

#[derive(Debug, Arbitrary)]
struct Setup {
    rows: Vec<Vec<f64>>,
    increment: f64,
    baseline: BaselineScan,
    initial_voltages: Vec<f64>,
    limits: Option<(f64, f64, f64)>,
}
