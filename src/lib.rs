pub mod behavioral;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod driver;
pub mod dut;
pub mod engine;
pub mod error;
mod executor;
mod junit;
pub mod model;
pub mod monitor;
pub mod prelude;
pub mod scenarios;
pub mod scoreboard;
pub mod signal;
pub mod sim_if;
pub mod stimulus;
pub mod tb_obj;
pub mod test;
pub mod testbench;
mod trigger;
pub mod utils;

use futures::future::{self, Either};
use prettytable::{Cell, Row, Table};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time;

use behavioral::{BehavioralSim, SimEnd};
use config::Config;
use error::{TbError, TbResult};
use executor::Task;
use sim_if::SimIf;
use tb_obj::TbObj;
use test::{Test, TestSuite};
use trigger::Trigger;

/// Simulation steps are picoseconds.
pub const SIM_PRECISION: i8 = -12;

type ResultSlot = TbObj<Option<TbResult<String>>>;

// The scenario running on this thread: its top level task and where its
// result goes.
thread_local! {
    static CURRENT_TEST: RefCell<Option<(Arc<Task>, ResultSlot)>> = RefCell::new(None);
}

/// Passes the running test, unless it already ended.
pub fn pass_test(msg: &str) {
    end_test(Ok(msg.to_string()));
}

/// Fails the running test, unless it already ended.
pub fn fail_test(msg: &str) {
    end_test(Err(TbError::Failed(msg.to_string())));
}

pub(crate) fn fail_test_with(err: TbError) {
    end_test(Err(err));
}

fn end_test(result: TbResult<String>) {
    if let Some((task, slot)) = CURRENT_TEST.with(|c| c.borrow_mut().take()) {
        slot.with_mut(|s| *s = Some(result));
        tear_down_test(task);
    }
}

fn tear_down_test(task: Arc<Task>) {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    task.cancel();
    if let Ok(sim) = sim_if::try_current() {
        sim.finish();
    }
}

/// Runs one scenario in a fresh simulator and stores its outcome in `test`.
pub fn run_test(suite: &str, dut: fn() -> Box<dyn dut::Circuit>, test: &mut Test, cfg: &Config) {
    let real_start = time::Instant::now();
    let max_steps = cfg.max_sim_ns.saturating_mul(1000);
    let sim = match BehavioralSim::new(dut(), SIM_PRECISION, max_steps) {
        Ok(sim) => Rc::new(sim),
        Err(e) => {
            test.set_result(Err(e));
            return;
        }
    };
    sim_if::install(sim.clone());
    // scenario code reads the same configuration the log line reports
    Config::set_active(Some(cfg.clone()));
    sim.log(&format!(
        "running {}::{} (RANDOM_SEED={})",
        suite,
        test.name,
        cfg.seed
    ));

    let slot: ResultSlot = TbObj::new(None);
    let name = test.name.clone();
    let generator = test.generator;
    let timeout = test.timeout;
    let root = match sim.get_root_object() {
        Ok(root) => root,
        Err(e) => {
            sim_if::uninstall();
            Config::set_active(None);
            test.set_result(Err(e));
            return;
        }
    };
    let wrapper = async move {
        let body = (generator)(root);
        let result = match timeout {
            Some((time, unit)) => {
                let budget = Trigger::timer(time, unit)?;
                match future::select(body, budget).await {
                    Either::Left((result, _)) => result,
                    Either::Right(_) => Err(TbError::Timeout {
                        test: name,
                        budget: format!("{} {}", time, unit),
                    }),
                }
            }
            None => body.await,
        };
        match result {
            Ok(()) => pass_test("passed"),
            Err(e) => fail_test_with(e),
        }
        Ok(())
    };
    let handle = Task::spawn(wrapper, &test.name);
    if let Some(task) = handle.task() {
        let task = task.clone();
        let slot = slot.clone();
        CURRENT_TEST.with(|c| c.replace(Some((task, slot))));
    }

    executor::run_once();
    let end = sim.run();

    // the test may have ended without passing or failing
    let result = slot.with_mut(|s| s.take()).unwrap_or_else(|| match end {
        SimEnd::TimeLimit => Err(TbError::Timeout {
            test: test.name.clone(),
            budget: format!("{} ns (DSPTB_MAX_SIM_NS)", cfg.max_sim_ns),
        }),
        _ => Err(TbError::Aborted(test.name.clone())),
    });
    CURRENT_TEST.with(|c| c.borrow_mut().take());
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();

    match &result {
        Ok(msg) => sim.log(&format!("{} {}", test.name, msg)),
        Err(e) => sim.log(&format!("{} failed: {}", test.name, e)),
    }
    test.time_secs = real_start.elapsed().as_secs_f64();
    test.sim_time_ns = sim.get_sim_time("ns");
    test.set_result(result);
    sim_if::uninstall();
    Config::set_active(None);
}

/// Runs every selected, non-skipped scenario of `suite`. A failing scenario
/// does not stop the ones after it.
pub fn run_suite(suite: &mut TestSuite, cfg: &Config) {
    let dut = suite.dut;
    for test in suite.tests.iter_mut() {
        if test.skip || !cfg.selects(&suite.name, &test.name) {
            continue;
        }
        run_test(&suite.name, dut, test, cfg);
    }
}

/// Runs all suites, prints the summary and writes the junit report. Returns
/// whether every scenario that ran passed.
pub fn run_suites(suites: &mut [TestSuite], cfg: &Config) -> bool {
    let start = time::Instant::now();
    for suite in suites.iter_mut() {
        run_suite(suite, cfg);
    }
    print_summary(suites, start.elapsed().as_secs_f64());
    if let Err(e) = junit::create_junit_xml(suites, &cfg.results) {
        sim_if::log(&format!("could not write {}: {}", cfg.results.display(), e));
    }
    all_passed(suites)
}

pub fn all_passed(suites: &[TestSuite]) -> bool {
    suites
        .iter()
        .flat_map(|s| s.iter())
        .all(|t| t.result.as_ref().map_or(true, |r| r.is_ok()))
}

fn print_summary(suites: &[TestSuite], real_time: f64) {
    let mut table = Table::new();
    table.set_titles(Row::new(
        ["TEST", "RESULT", "SIM TIME (ns)", "REAL TIME (s)", "RATIO (ns/s)"]
            .iter()
            .map(|t| Cell::new(t))
            .collect(),
    ));
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for suite in suites {
        for t in suite.iter() {
            let result = match &t.result {
                Some(Ok(_)) => {
                    passed += 1;
                    "PASS".to_string()
                }
                Some(Err(e)) => {
                    failed += 1;
                    format!("FAIL ({})", e.kind())
                }
                None => {
                    skipped += 1;
                    "SKIP".to_string()
                }
            };
            let ratio = if t.time_secs > 0.0 {
                t.sim_time_ns / t.time_secs
            } else {
                0.0
            };
            table.add_row(Row::new(vec![
                Cell::new(&format!("{}::{}", suite.name, t.name)),
                Cell::new(&result),
                Cell::new(&format!("{:.3}", t.sim_time_ns)),
                Cell::new(&format!("{:.3}", t.time_secs)),
                Cell::new(&format!("{:.1}", ratio)),
            ]));
        }
    }
    table.printstd();
    println!(
        "TESTS={} PASS={} FAIL={} SKIP={} REAL TIME={:.3}s",
        passed + failed + skipped,
        passed,
        failed,
        skipped,
        real_time
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_case;
    use signal::SimObject;

    async fn passes(_: SimObject) -> TbResult {
        Ok(())
    }

    async fn hangs(dut: SimObject) -> TbResult {
        let clk = dut.get_child("i_clk")?;
        Task::fork(testbench::clock(clk, 10, "ns"));
        loop {
            clk.rising_edge().await;
        }
    }

    async fn fails_early(dut: SimObject) -> TbResult {
        let clk = dut.get_child("i_clk")?;
        Task::fork(testbench::clock(clk, 10, "ns"));
        clk.rising_edge().await;
        fail_test("stop here");
        // never reached: the task was cancelled
        clk.rising_edge().await;
        Ok(())
    }

    async fn twenty_cycles(dut: SimObject) -> TbResult {
        let clk = dut.get_child("i_clk")?;
        Task::fork(testbench::clock(clk, 10, "ns"));
        for _ in 0..20 {
            clk.rising_edge().await;
        }
        Ok(())
    }

    async fn reads_its_seed(_: SimObject) -> TbResult {
        match Config::current().seed {
            42 => Ok(()),
            seed => Err(TbError::Failed(format!("scenario saw seed {}", seed))),
        }
    }

    fn run(test: Test) -> Test {
        let mut test = test;
        run_test("signed_adder", dut::signed_adder, &mut test, &Config::default());
        test
    }

    #[test]
    fn passing_test() {
        let t = run(test_case!(passes));
        assert_eq!(t.result, Some(Ok("passed".to_string())));
    }

    #[test]
    fn budget_exceeded_is_a_timeout() {
        let t = run(test_case!(hangs).timeout(100, "ns"));
        match t.result {
            Some(Err(TbError::Timeout { test, budget })) => {
                assert_eq!(test, "hangs");
                assert_eq!(budget, "100 ns");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(t.sim_time_ns, 100.0);
    }

    #[test]
    fn waking_on_edges_does_not_spend_the_budget() {
        let t = run(test_case!(twenty_cycles).timeout(1000, "ns"));
        assert_eq!(t.result, Some(Ok("passed".to_string())));
        assert_eq!(t.sim_time_ns, 195.0);
    }

    #[test]
    fn scenario_runs_with_the_config_it_was_given() {
        let cfg = Config {
            seed: 42,
            ..Config::default()
        };
        let mut t = test_case!(reads_its_seed);
        run_test("signed_adder", dut::signed_adder, &mut t, &cfg);
        assert_eq!(t.result, Some(Ok("passed".to_string())));
        // cleared between scenarios
        assert_eq!(Config::current(), *Config::global());
    }

    #[test]
    fn fail_test_ends_the_scenario() {
        let t = run(test_case!(fails_early));
        assert_eq!(t.result, Some(Err(TbError::Failed("stop here".into()))));
        assert_eq!(t.sim_time_ns, 5.0);
    }

    #[test]
    fn skipped_tests_do_not_run() {
        let mut suite = TestSuite::new("signed_adder", dut::signed_adder)
            .test(test_case!(passes))
            .test(test_case!(hangs).skip(true));
        run_suite(&mut suite, &Config::default());
        assert!(suite.tests[0].passed());
        assert!(suite.tests[1].result.is_none());
        assert!(all_passed(&[suite]));
    }
}
