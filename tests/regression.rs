use dsptb::bridge::{self, Bridge, InterchangeFiles};
use dsptb::config::Config;
use dsptb::engine::InProcessEngine;
use dsptb::prelude::*;
use dsptb::scenarios;

#[test]
fn every_scenario_passes() {
    let cfg = Config::default();
    let mut suites = scenarios::all();
    for suite in suites.iter_mut() {
        dsptb::run_suite(suite, &cfg);
        for t in suite.iter() {
            assert!(t.passed(), "{}::{} -> {:?}", suite.name, t.name, t.result);
        }
    }
    assert!(dsptb::all_passed(&suites));
}

#[test]
fn scenario_selection() {
    let cfg = Config {
        testcase: vec!["signed_adder::basic_simulation".to_string()],
        ..Config::default()
    };
    let mut suites = scenarios::all();
    for suite in suites.iter_mut() {
        dsptb::run_suite(suite, &cfg);
    }
    let ran: Vec<String> = suites
        .iter()
        .flat_map(|s| s.iter().filter(|t| t.result.is_some()).map(move |t| format!("{}::{}", s.name, t.name)))
        .collect();
    assert_eq!(ran, vec!["signed_adder::basic_simulation".to_string()]);
}

#[test]
fn bridge_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Bridge::new(Box::new(InProcessEngine), dir.path());
    let a = [-10.0, 0.0, 15.0, 7.0];
    let b = [3.0, -4.0, 15.0, -7.0];
    let sum = [-7.0, -4.0, 30.0, 0.0];

    let first = bridge.check(ArithOp::Add, &a, &b, &sum).unwrap();
    let second = bridge.check(ArithOp::Add, &a, &b, &sum).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, sum.to_vec());

    // the interchange files stay behind for inspection
    let files = InterchangeFiles::new(dir.path(), ArithOp::Add);
    assert_eq!(bridge::read_vector(&files.a, 4).unwrap(), a.to_vec());
    assert_eq!(bridge::read_vector(&files.out, 4).unwrap(), sum.to_vec());
    bridge.verify_files(ArithOp::Add, 4, &sum).unwrap();
}

#[test]
fn bridge_reports_the_first_disagreeing_sample() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Bridge::new(Box::new(InProcessEngine), dir.path());
    let err = bridge
        .check(ArithOp::Multiply, &[2.0, 3.0, 4.0], &[5.0, 6.0, 7.0], &[10.0, 18.0, 29.0])
        .unwrap_err();
    match err {
        TbError::CrossEngineMismatch { index, left_value, right_value, .. } => {
            assert_eq!(index, 2);
            assert_eq!(left_value, 28.0);
            assert_eq!(right_value, 29.0);
        }
        other => panic!("unexpected {:?}", other),
    }
}
