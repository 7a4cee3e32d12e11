//! Reference scenarios as cargo tests.

use crate::{all_tests, config_path, dam_break_test, quiescent_cube_test, wave_tank_test, ReferenceTest};
use pbf_orchestrator::config::SimulationConfig;

fn run_and_assert(test: ReferenceTest) {
    let name = test.name.clone();
    let result = test.run().expect("Test execution failed");
    result.print_summary();
    assert!(result.passed, "{} failed", name);
}

#[test]
fn test_scenario_files_parse() {
    for test in all_tests() {
        let config = SimulationConfig::load(&test.config_path).unwrap();
        assert!(config.max_frames.is_some(), "{} needs max_frames", test.name);
    }
}

#[test]
fn test_missing_scenario_is_an_error() {
    let test = ReferenceTest {
        name: "Missing".to_string(),
        config_path: config_path("no-such-scenario.json"),
        expected: Default::default(),
    };
    assert!(test.run().is_err());
}

#[test]
fn test_quiescent_cube() {
    run_and_assert(quiescent_cube_test());
}

#[test]
fn test_dam_break() {
    run_and_assert(dam_break_test());
}

#[test]
fn test_wave_tank() {
    run_and_assert(wave_tank_test());
}
