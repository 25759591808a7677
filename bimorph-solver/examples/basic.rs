//! A basic example for how to find a bimorph mirror's optimal voltages.
use bimorph_solver::{
    BaselineScan, CentroidMatrix, CorrectionRequest, VoltageIncrement, VoltageLimits,
    VoltageRange, calculate_optimal_voltages, check_voltages_fit_constraints,
};

fn main() {
    // Log what the solver is doing. Try `RUST_LOG=bimorph_solver=debug`.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Centroids from 4 pencil beam scans of a 3 actuator mirror.
    // Each row is one slit position, each column is one scan.
    // Between scans, the next actuator was stepped by -100 V.
    let data = CentroidMatrix::from_rows(&[
        [150.30, 149.90, 149.85, 149.84],
        [150.10, 149.80, 149.60, 149.58],
        [149.90, 149.85, 149.55, 149.40],
        [149.70, 149.69, 149.60, 149.30],
        [149.50, 149.50, 149.48, 149.25],
    ])
    .unwrap();
    let increment = VoltageIncrement::new(-100.0).unwrap();

    // The mirror can't go past ±500 V, and neighbouring actuators
    // shouldn't be more than 200 V apart.
    let range = VoltageRange::new(-500.0, 500.0).unwrap();
    let limits = VoltageLimits::new(range, 200.0).unwrap();

    // Correct the shape measured in the last scan.
    let request = CorrectionRequest::new(data, increment)
        .with_baseline(BaselineScan::LAST)
        .with_initial_voltages(vec![0.0, 0.0, 0.0])
        .with_limits(limits);

    // Run the solver!
    let outcome = match calculate_optimal_voltages(&request) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Could not calculate voltages: {e}");
            std::process::exit(1);
        }
    };

    println!("Strategy: {:?}", outcome.strategy());
    println!("Corrections: {:?}", outcome.corrections());
    println!("Optimal voltages: {:?}", outcome.optimal_voltages());
    println!(
        "Fits limits: {}",
        check_voltages_fit_constraints(outcome.optimal_voltages(), range, 200.0)
    );
    for warning in outcome.warnings() {
        println!("Warning: {warning}");
    }
}
