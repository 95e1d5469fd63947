use dsptb::config::Config;
use dsptb::driver::DutyCycleDriver;
use dsptb::dut;
use dsptb::monitor::Monitor;
use dsptb::prelude::*;
use dsptb::stimulus::{RangeSampler, ScriptedSampler};
use dsptb::test::Test;

fn run(suite: &str, circuit: fn() -> Box<dyn dut::Circuit>, test: Test) -> Test {
    let mut test = test;
    dsptb::run_test(suite, circuit, &mut test, &Config::default());
    test
}

async fn drained(dut: SimObject) -> TbResult {
    let clk = dut.get_child("i_clk")?;
    Task::fork(clock(clk, 10, "ns"));
    let stimulus = Box::new(RangeSampler::new(0, 100, 7));
    let mut tb = ArithTb::new(dut, ArithOp::Add, Mode::Unsigned, stimulus, Strictness::CollectAll)?;
    let verdict = tb.run(10).await?;
    if verdict.contains("o_sum: 10 matched") {
        Ok(())
    } else {
        Err(TbError::Failed(verdict))
    }
}

async fn undrained(dut: SimObject) -> TbResult {
    let clk = dut.get_child("i_clk")?;
    Task::fork(clock(clk, 10, "ns"));
    let stimulus = Box::new(RangeSampler::new(0, 100, 7));
    let mut tb = ArithTb::new(dut, ArithOp::Add, Mode::Unsigned, stimulus, Strictness::CollectAll)?;
    match tb.run_with_drain(10, false).await {
        Err(TbError::CountImbalance {
            expected: 10,
            observed: 9,
            ..
        }) => Ok(()),
        other => Err(TbError::Failed(format!("unexpected {:?}", other))),
    }
}

#[test]
fn drain_cycle_balances_the_scoreboard() {
    let t = run("unsigned_adder", dut::unsigned_adder, test_case!(drained));
    assert!(t.passed(), "{:?}", t.result);
    let t = run("unsigned_adder", dut::unsigned_adder, test_case!(undrained));
    assert!(t.passed(), "{:?}", t.result);
}

async fn negative_sum(dut: SimObject) -> TbResult {
    let clk = dut.get_child("i_clk")?;
    let sum = dut.get_child("o_sum")?;
    Task::fork(clock(clk, 10, "ns"));
    dut.get_child("i_a")?.write(10, Mode::Signed)?;
    dut.get_child("i_b")?.write(-15, Mode::Signed)?;
    clk.rising_edge().await;
    Trigger::read_write().await;
    assert_eq!(sum.int(Mode::Signed)?, -5);
    assert_eq!(sum.raw()?, 0b1_1111_1011);
    Ok(())
}

#[test]
fn signed_sum_goes_negative() {
    let t = run("signed_adder", dut::signed_adder, test_case!(negative_sum));
    assert!(t.passed(), "{:?}", t.result);
}

async fn held_level(dut: SimObject) -> TbResult {
    let clk = dut.get_child("i_clk")?;
    let ce = dut.get_child("i_ce")?;
    Task::fork(clock(clk, 10, "ns"));

    let samples = TbObj::new(Vec::new());
    let monitor = Monitor::new("i_ce", clk, ce, Mode::Unsigned);
    let sink = samples.clone();
    monitor.add_callback(move |tr| sink.with_mut(|s| s.push(tr.value.raw())));
    let mut queue = monitor.subscribe();

    // high for two cycles, low for one, forever
    let script = ScriptedSampler::new(vec![(2, 1)]);
    let mut driver = DutyCycleDriver::new(clk, ce, script, StopToken::new());
    driver.start();
    // stop in the middle of the high phase, before it would end on the third edge
    clk.rising_edge_ro().await;
    driver.stop();
    for _ in 0..4 {
        clk.rising_edge().await;
    }
    clk.falling_edge().await;
    driver.join().await?;

    let samples = samples.get().clone();
    assert_eq!(samples, vec![1, 1, 1, 1, 1]);
    assert_eq!(ce.u64()?, 1);
    let mut ordinals = Vec::new();
    while let Ok(tr) = queue.try_recv() {
        ordinals.push(tr.ordinal);
    }
    assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn stopped_driver_keeps_its_level() {
    let t = run("int_clk_div", dut::int_clk_div, test_case!(held_level));
    assert!(t.passed(), "{:?}", t.result);
}

async fn fail_fast(dut: SimObject) -> TbResult {
    let clk = dut.get_child("i_clk")?;
    let sum = dut.get_child("o_sum")?;
    Task::fork(clock(clk, 10, "ns"));

    let monitor = Monitor::new("o_sum", clk, sum, Mode::Signed);
    let sb = Scoreboard::new("signed_adder", Strictness::FailFast);
    // the output resets to 0
    sb.add_interface("o_sum", vec![BitVector::from_int(1, sum.width()?, Mode::Signed)?]);
    sb.connect(&monitor);
    loop {
        clk.rising_edge().await;
    }
}

#[test]
fn fail_fast_scoreboard_ends_the_test() {
    let t = run("signed_adder", dut::signed_adder, test_case!(fail_fast));
    match &t.result {
        Some(Err(TbError::Mismatch { interface, mismatches })) => {
            assert_eq!(interface, "o_sum");
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].expected, "1 (0b000000001)");
            assert_eq!(mismatches[0].observed, "0 (0b000000000)");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(t.sim_time_ns, 5.0);
}
