use super::*;


const EPSILON: f64 = 1e-9;

/// The increment every fixture was recorded with.
const FIXTURE_INCREMENT: f64 = -100.0;

#[track_caller]
pub(crate) fn assert_nearly_eq(actual: f64, expected: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff < EPSILON,
        "Expected {expected} but got {actual} (diff {diff})"
    );
}

#[track_caller]
fn assert_all_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "lengths differ");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {i}: expected {e} but got {a}\nactual:   {actual:?}\nexpected: {expected:?}"
        );
    }
}

fn parse_numbers(txt: &str) -> Vec<f64> {
    txt.split_whitespace().map(|n| n.parse().unwrap()).collect()
}

struct TestCase {
    data: CentroidMatrix,
    expected: Vec<f64>,
    initial_voltages: Vec<f64>,
}

/// Opens a given test case from the `test_cases/` dir.
fn load_case(test_case: &str) -> TestCase {
    let read = |file: &str| {
        std::fs::read_to_string(format!("test_cases/{test_case}/{file}.txt")).unwrap()
    };
    let rows: Vec<Vec<f64>> = read("data")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_numbers)
        .collect();
    TestCase {
        data: CentroidMatrix::from_rows(&rows).unwrap(),
        expected: parse_numbers(&read("expected")),
        initial_voltages: parse_numbers(&read("initial_voltages")),
    }
}

fn increment() -> VoltageIncrement {
    VoltageIncrement::new(FIXTURE_INCREMENT).unwrap()
}

fn limits(min: f64, max: f64, max_adjacent_difference: f64) -> VoltageLimits {
    VoltageLimits::new(VoltageRange::new(min, max).unwrap(), max_adjacent_difference).unwrap()
}

fn absolute(initial: &[f64], corrections: &[f64]) -> Vec<f64> {
    initial.iter().zip(corrections).map(|(v, c)| v + c).collect()
}

#[track_caller]
fn assert_absolute_steps_at_most(voltages: &[f64], max_adjacent_difference: f64) {
    for (i, pair) in voltages.windows(2).enumerate() {
        let step = (pair[1] - pair[0]).abs();
        assert!(
            step <= max_adjacent_difference + 0.02,
            "actuators {i} and {} are {step} V apart",
            i + 1
        );
    }
}

#[test]
fn eight_actuator_unconstrained() {
    let case = load_case("8_actuator");
    let corrections =
        find_voltage_corrections(&case.data, increment(), BaselineScan::LAST).unwrap();
    assert_all_close(&corrections, &case.expected, 0.011);
}

#[test]
fn sixteen_actuator_unconstrained() {
    let case = load_case("16_actuator");
    let corrections =
        find_voltage_corrections(&case.data, increment(), BaselineScan::LAST).unwrap();
    assert_all_close(&corrections, &case.expected, 0.011);
}

#[test]
fn unconstrained_is_idempotent() {
    let case = load_case("16_actuator");
    let a = find_voltage_corrections(&case.data, increment(), BaselineScan::LAST).unwrap();
    let b = find_voltage_corrections(&case.data, increment(), BaselineScan::LAST).unwrap();
    assert_eq!(a, b);
}

#[test]
fn flipping_the_increment_flips_the_corrections() {
    let case = load_case("8_actuator");
    let corrections = find_voltage_corrections(
        &case.data,
        VoltageIncrement::new(-FIXTURE_INCREMENT).unwrap(),
        BaselineScan::LAST,
    )
    .unwrap();
    let flipped: Vec<f64> = case.expected.iter().map(|e| -e).collect();
    assert_all_close(&corrections, &flipped, 0.011);
}

#[test]
fn loose_limits_agree_with_unconstrained() {
    for test_case in ["8_actuator", "16_actuator"] {
        let case = load_case(test_case);
        let outcome = find_voltage_corrections_with_restraints(
            &case.data,
            increment(),
            &case.initial_voltages,
            limits(-1000.0, 1000.0, 500.0),
            BaselineScan::LAST,
            Config::default(),
        )
        .unwrap();
        assert!(outcome.is_satisfied(), "{test_case}: {outcome:?}");
        assert_all_close(outcome.corrections(), &case.expected, 0.1);
        let voltages = absolute(&case.initial_voltages, outcome.corrections());
        assert!(
            check_voltages_fit_constraints(
                &voltages,
                VoltageRange::new(-1000.0, 1000.0).unwrap(),
                500.0
            ),
            "{test_case}: {voltages:?}"
        );
    }
}

#[test]
fn adjacent_difference_binds() {
    let case = load_case("8_actuator");
    let outcome = find_voltage_corrections_with_restraints(
        &case.data,
        increment(),
        &case.initial_voltages,
        limits(-1000.0, 1000.0, 60.0),
        BaselineScan::LAST,
        Config::default(),
    )
    .unwrap();
    assert_eq!(outcome.status(), SolveStatus::Optimal);
    assert!(outcome.is_satisfied());
    assert!(outcome.iterations() > 0);
    assert_all_close(
        outcome.corrections(),
        &[57.55, -102.45, 37.55, -146.2, -122.54, -12.54, -102.54, 57.46],
        0.1,
    );
    let voltages = absolute(&case.initial_voltages, outcome.corrections());
    assert_absolute_steps_at_most(&voltages, 60.0);
}

#[test]
fn range_binds() {
    let case = load_case("8_actuator");
    let outcome = find_voltage_corrections_with_restraints(
        &case.data,
        increment(),
        &case.initial_voltages,
        limits(-60.0, 60.0, 1000.0),
        BaselineScan::LAST,
        Config::default(),
    )
    .unwrap();
    assert!(outcome.is_satisfied());
    assert_all_close(
        outcome.corrections(),
        &[60.0, -40.0, 40.0, -110.0, -60.0, -10.0, -40.0, 60.0],
        0.1,
    );
    let voltages = absolute(&case.initial_voltages, outcome.corrections());
    assert!(voltages.iter().all(|v| v.abs() <= 60.01), "{voltages:?}");
}

#[test]
fn both_limits_bind_on_sixteen_actuators() {
    let case = load_case("16_actuator");
    let outcome = find_voltage_corrections_with_restraints(
        &case.data,
        increment(),
        &case.initial_voltages,
        limits(-100.0, 100.0, 80.0),
        BaselineScan::LAST,
        Config::default(),
    )
    .unwrap();
    assert!(outcome.is_satisfied());
    let voltages = absolute(&case.initial_voltages, outcome.corrections());
    assert!(voltages.iter().all(|v| v.abs() <= 100.01), "{voltages:?}");
    assert_absolute_steps_at_most(&voltages, 80.0);
    // The signed checker is looser than the absolute limit the solver enforces.
    assert!(check_voltages_fit_constraints(
        &voltages,
        VoltageRange::new(-100.01, 100.01).unwrap(),
        80.02
    ));
}

#[test]
fn baseline_out_of_range() {
    let case = load_case("8_actuator");
    let err = find_voltage_corrections(&case.data, increment(), BaselineScan(12)).unwrap_err();
    assert!(matches!(
        err,
        Error::BaselineScanOutOfRange {
            index: 12,
            min: -9,
            max: 8
        }
    ));
    assert_eq!(
        err.to_string(),
        "baseline scan 12 is out of range, it must be between -9 and 8"
    );
}

#[test]
fn constrained_baseline_out_of_range() {
    let case = load_case("8_actuator");
    let err = find_voltage_corrections_with_restraints(
        &case.data,
        increment(),
        &case.initial_voltages,
        limits(-1000.0, 1000.0, 500.0),
        BaselineScan(12),
        Config::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::BaselineScanOutOfRange {
            index: 12,
            min: -9,
            max: 8
        }
    ));
}

#[test]
fn one_actuator() {
    // The smallest valid problem: one actuator, two scans.
    let data = CentroidMatrix::from_rows(&[[1.0, 2.0], [2.0, 2.0], [3.0, 2.0]]).unwrap();
    let corrections =
        find_voltage_corrections(&data, VoltageIncrement::new(1.0).unwrap(), BaselineScan::FIRST)
            .unwrap();
    assert_eq!(corrections.len(), 1);
    // Baseline [1, 2, 3] wants [1, 0, -1], and the actuator moves by [1, 0, -1] per volt.
    assert_nearly_eq(corrections[0], 1.0);
}

#[test]
fn predicted_centroids_are_flat() {
    let case = load_case("8_actuator");
    let model = InteractionModel::build(&case.data, increment(), BaselineScan::LAST).unwrap();
    let corrections = solver::solve_unconstrained(&model).unwrap();
    let predicted = model.predicted_centroids(&corrections).unwrap();

    let spread = |v: &[f64]| {
        let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = v.iter().copied().fold(f64::INFINITY, f64::min);
        max - min
    };
    let before = spread(model.baseline_centroids());
    let after = spread(&predicted);
    assert!(after < before * 1e-3, "spread went from {before} to {after}");
}

#[test]
fn orchestration_without_limits() {
    let case = load_case("8_actuator");
    let request = CorrectionRequest::new(case.data, increment())
        .with_baseline(BaselineScan::LAST)
        .with_initial_voltages(case.initial_voltages.clone());
    let outcome = calculate_optimal_voltages(&request).unwrap();
    assert_eq!(outcome.strategy(), Strategy::Unconstrained);
    assert_eq!(outcome.iterations(), 0);
    assert!(outcome.satisfies_limits());
    assert!(outcome.warnings().is_empty(), "{:?}", outcome.warnings());
    assert_all_close(outcome.corrections(), &case.expected, 0.011);
    assert_all_close(
        outcome.optimal_voltages(),
        &absolute(&case.initial_voltages, outcome.corrections()),
        1e-9,
    );
}

#[test]
fn orchestration_skips_constrained_solve_when_limits_hold() {
    let case = load_case("8_actuator");
    let request = CorrectionRequest::new(case.data, increment())
        .with_baseline(BaselineScan::LAST)
        .with_initial_voltages(case.initial_voltages)
        .with_limits(limits(-1000.0, 1000.0, 500.0));
    let outcome = calculate_optimal_voltages(&request).unwrap();
    assert_eq!(outcome.strategy(), Strategy::Unconstrained);
    assert!(outcome.satisfies_limits());
    assert_all_close(outcome.corrections(), &case.expected, 0.011);
}

#[test]
fn orchestration_falls_back_to_constrained_solve() {
    let case = load_case("8_actuator");
    let request = CorrectionRequest::new(case.data, increment())
        .with_baseline(BaselineScan::LAST)
        .with_initial_voltages(case.initial_voltages.clone())
        .with_limits(limits(-1000.0, 1000.0, 60.0));
    let outcome = calculate_optimal_voltages(&request).unwrap();
    assert_eq!(outcome.strategy(), Strategy::Constrained);
    assert!(outcome.iterations() > 0);
    assert!(outcome.satisfies_limits());
    // Actuator 0 to 1 already steps up by 100 V.
    assert_eq!(
        outcome.warnings(),
        &[Warning {
            about_actuator: None,
            content: WarningContent::InitialVoltagesOutsideLimits,
        }]
    );
    assert_absolute_steps_at_most(outcome.optimal_voltages(), 60.0);
}

#[test]
fn orchestration_defaults_to_zero_initial_voltages() {
    let case = load_case("16_actuator");
    let request = CorrectionRequest::new(case.data, increment())
        .with_baseline(BaselineScan::LAST)
        .with_limits(limits(-60.0, 60.0, 1000.0));
    let outcome = calculate_optimal_voltages(&request).unwrap();
    assert_eq!(outcome.strategy(), Strategy::Constrained);
    assert!(outcome.satisfies_limits());
    assert_eq!(outcome.corrections(), outcome.optimal_voltages());
}

#[test]
fn orchestration_rejects_wrong_number_of_initial_voltages() {
    let case = load_case("8_actuator");
    let request =
        CorrectionRequest::new(case.data, increment()).with_initial_voltages(vec![0.0; 3]);
    let err = calculate_optimal_voltages(&request).unwrap_err();
    assert!(matches!(
        err,
        Error::WrongNumberInitialVoltages {
            actuators: 8,
            voltages: 3
        }
    ));
}

#[test]
fn iteration_limit_is_reported_not_raised() {
    let case = load_case("16_actuator");
    let request = CorrectionRequest::new(case.data, increment())
        .with_baseline(BaselineScan::LAST)
        .with_initial_voltages(case.initial_voltages)
        .with_limits(limits(-60.0, 60.0, 1000.0))
        .with_config(Config::default().with_max_iterations(1));
    let outcome = calculate_optimal_voltages(&request).unwrap();
    assert_eq!(outcome.strategy(), Strategy::Constrained);
    assert_eq!(outcome.iterations(), 1);
    assert!(
        outcome
            .warnings()
            .iter()
            .any(|w| w.content == WarningContent::DidNotConverge { iterations: 1 })
    );
    assert_eq!(outcome.corrections().len(), 16);
}
