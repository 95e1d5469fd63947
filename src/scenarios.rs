//! The regression: one suite per circuit.

use crate::bridge::Bridge;
use crate::codec::Mode;
use crate::config::Config;
use crate::error::{MismatchEntry, TbError, TbResult};
use crate::executor::Task;
use crate::model::ArithOp;
use crate::scoreboard::Strictness;
use crate::signal::SimObject;
use crate::sim_if;
use crate::stimulus::{RangeSampler, StimulusPair};
use crate::test::TestSuite;
use crate::testbench::{clock, ArithTb, CLOCK_PERIOD_NS};
use crate::trigger::Trigger;
use crate::utils;

pub fn all() -> Vec<TestSuite> {
    vec![
        signed_adder::suite(),
        unsigned_adder::suite(),
        signed_multiply::suite(),
        unsigned_multiply::suite(),
        int_clk_div::suite(),
    ]
}

fn start_clock(dut: SimObject) -> TbResult<SimObject> {
    let clk = dut.get_child("i_clk")?;
    Task::spawn(clock(clk, CLOCK_PERIOD_NS, "ns"), "clock");
    Ok(clk)
}

fn sampler(suite: &str, test: &str, mode: Mode) -> RangeSampler {
    let (low, high) = match mode {
        Mode::Signed => (-10, 15),
        Mode::Unsigned => (0, 100),
    };
    RangeSampler::new(low, high, utils::scenario_seed(Config::current().seed, suite, test))
}

fn output_name(op: ArithOp) -> String {
    format!("o_{}", op.result_name())
}

/// Applies `n` random pairs and checks the output one cycle later, decoding
/// it signed only when the model result is negative.
async fn check_every_cycle(dut: SimObject, suite: &str, op: ArithOp, mode: Mode, n: usize) -> TbResult {
    let clk = start_clock(dut)?;
    let a = dut.get_child("i_a")?;
    let b = dut.get_child("i_b")?;
    let out_name = output_name(op);
    let out = dut.get_child(&out_name)?;

    // synchronize with the clock
    utils::clock_cycles(clk, 1).await?;

    for (index, (x, y)) in sampler(suite, "basic_test", mode).take(n).enumerate() {
        a.write(x, mode)?;
        b.write(y, mode)?;
        clk.rising_edge().await;
        Trigger::read_write().await;

        let expected = op.apply(x, y);
        let observed = out.int(Mode::for_result(expected))?;
        let origin = format!("{} {} {}", x, op.symbol(), y);
        if observed != expected {
            return Err(TbError::Mismatch {
                interface: out_name,
                mismatches: vec![MismatchEntry {
                    index,
                    expected: expected.to_string(),
                    observed: observed.to_string(),
                    origin: Some(origin),
                }],
            });
        }
        sim_if::debug(&format!("Randomised test passed with: {} = {}", origin, observed));
    }
    Ok(())
}

/// Driver, monitor, model and scoreboard for `n` cycles.
async fn class_flow(dut: SimObject, suite: &str, op: ArithOp, mode: Mode, n: u32) -> TbResult {
    start_clock(dut)?;
    let stimulus = Box::new(sampler(suite, "class_test", mode));
    let mut tb = ArithTb::new(dut, op, mode, stimulus, Strictness::CollectAll)?;
    let verdict = tb.run(n).await?;
    sim_if::log(&verdict);
    Ok(())
}

/// Runs `n` cycles, then has the streaming engine recompute the recorded
/// vectors and compares all three results.
async fn cross_engine(dut: SimObject, suite: &str, op: ArithOp, mode: Mode, n: u32) -> TbResult {
    start_clock(dut)?;
    let stimulus = Box::new(sampler(suite, "gr_test", mode));
    let mut tb = ArithTb::new(dut, op, mode, stimulus, Strictness::CollectAll)?;
    tb.run(n).await?;

    let vectors = tb.recorder.get().vectors()?;
    // one interchange directory per suite
    let run = Config::current();
    let cfg = Config {
        work_dir: run.work_dir.join(suite),
        ..run
    };
    let bridge = Bridge::from_config(&cfg)?;
    bridge.check(op, &vectors.a, &vectors.b, &vectors.out)?;
    sim_if::log(&format!(
        "{} samples agree across simulation, model and engine",
        vectors.out.len()
    ));
    Ok(())
}

pub mod signed_adder {
    use super::*;
    use crate::dut;
    use crate::stimulus::ScriptedSampler;
    use crate::test_case;

    const SUITE: &str = "signed_adder";
    const OP: ArithOp = ArithOp::Add;
    const MODE: Mode = Mode::Signed;

    pub fn suite() -> TestSuite {
        TestSuite::new(SUITE, dut::signed_adder)
            .test(test_case!(basic_simulation).timeout(50, "ns"))
            .test(test_case!(basic_test).timeout(200, "ns"))
            .test(test_case!(class_test).timeout(2000, "ns"))
            .test(test_case!(gr_test).timeout(200, "ns"))
    }

    /// Three hand written pairs, including a negative result.
    pub async fn basic_simulation(dut: SimObject) -> TbResult {
        let clk = start_clock(dut)?;
        let a = dut.get_child("i_a")?;
        let b = dut.get_child("i_b")?;
        let out = dut.get_child("o_sum")?;
        let script: Vec<StimulusPair> = vec![(1, 2), (2, 3), (10, -15)];
        for (x, y) in ScriptedSampler::new(script).take(3) {
            a.write(x, MODE)?;
            b.write(y, MODE)?;
            clk.rising_edge().await;
            Trigger::read_write().await;
            let sum = out.int(MODE)?;
            sim_if::log(&format!("{} + {} = {} (0b{})", x, y, sum, out.bin()?));
            if sum != x + y {
                return Err(TbError::Failed(format!("{} + {} gave {}", x, y, sum)));
            }
        }
        Ok(())
    }

    pub async fn basic_test(dut: SimObject) -> TbResult {
        check_every_cycle(dut, SUITE, OP, MODE, 10).await
    }

    pub async fn class_test(dut: SimObject) -> TbResult {
        class_flow(dut, SUITE, OP, MODE, 100).await
    }

    pub async fn gr_test(dut: SimObject) -> TbResult {
        cross_engine(dut, SUITE, OP, MODE, 10).await
    }
}

pub mod unsigned_adder {
    use super::*;
    use crate::dut;
    use crate::test_case;

    const SUITE: &str = "unsigned_adder";
    const OP: ArithOp = ArithOp::Add;
    const MODE: Mode = Mode::Unsigned;

    pub fn suite() -> TestSuite {
        TestSuite::new(SUITE, dut::unsigned_adder)
            .test(test_case!(basic_test).timeout(200, "ns"))
            .test(test_case!(class_test).timeout(2000, "ns"))
            .test(test_case!(gr_test).timeout(200, "ns"))
    }

    pub async fn basic_test(dut: SimObject) -> TbResult {
        check_every_cycle(dut, SUITE, OP, MODE, 10).await
    }

    pub async fn class_test(dut: SimObject) -> TbResult {
        class_flow(dut, SUITE, OP, MODE, 100).await
    }

    pub async fn gr_test(dut: SimObject) -> TbResult {
        cross_engine(dut, SUITE, OP, MODE, 10).await
    }
}

pub mod signed_multiply {
    use super::*;
    use crate::dut;
    use crate::test_case;

    const SUITE: &str = "signed_multiply";
    const OP: ArithOp = ArithOp::Multiply;
    const MODE: Mode = Mode::Signed;

    pub fn suite() -> TestSuite {
        TestSuite::new(SUITE, dut::signed_multiply)
            .test(test_case!(basic_test).timeout(200, "ns"))
            .test(test_case!(gr_test).timeout(200, "ns"))
    }

    pub async fn basic_test(dut: SimObject) -> TbResult {
        check_every_cycle(dut, SUITE, OP, MODE, 10).await
    }

    pub async fn gr_test(dut: SimObject) -> TbResult {
        cross_engine(dut, SUITE, OP, MODE, 10).await
    }
}

pub mod unsigned_multiply {
    use super::*;
    use crate::dut;
    use crate::test_case;

    const SUITE: &str = "unsigned_multiply";
    const OP: ArithOp = ArithOp::Multiply;
    const MODE: Mode = Mode::Unsigned;

    pub fn suite() -> TestSuite {
        TestSuite::new(SUITE, dut::unsigned_multiply)
            .test(test_case!(basic_test).timeout(200, "ns"))
            .test(test_case!(gr_test).timeout(200, "ns"))
    }

    pub async fn basic_test(dut: SimObject) -> TbResult {
        check_every_cycle(dut, SUITE, OP, MODE, 10).await
    }

    pub async fn gr_test(dut: SimObject) -> TbResult {
        cross_engine(dut, SUITE, OP, MODE, 10).await
    }
}

pub mod int_clk_div {
    use super::*;
    use crate::dut::{self, DEFAULT_DIVIDE_RATIO};
    use crate::test_case;
    use crate::testbench::DividerTb;

    const SUITE: &str = "int_clk_div";

    pub fn suite() -> TestSuite {
        TestSuite::new(SUITE, dut::int_clk_div)
            .test(test_case!(class_test))
            .test(test_case!(reset_test).timeout(200, "ns"))
    }

    /// Random clock enable pattern for 100 cycles against the live model.
    pub async fn class_test(dut: SimObject) -> TbResult {
        start_clock(dut)?;
        let seed = utils::scenario_seed(Config::current().seed, SUITE, "class_test");
        let mut tb = DividerTb::new(dut, DEFAULT_DIVIDE_RATIO, seed, Strictness::CollectAll)?;
        let verdict = tb.run(100).await?;
        sim_if::log(&verdict);
        Ok(())
    }

    /// Reset clears the divider in the middle of a high phase.
    pub async fn reset_test(dut: SimObject) -> TbResult {
        let clk = start_clock(dut)?;
        let rstn = dut.get_child("i_rstn")?;
        let ce = dut.get_child("i_ce")?;
        let o_clk = dut.get_child("o_clk")?;
        let counter = dut.get_child("counter")?;
        let half = DEFAULT_DIVIDE_RATIO / 2;

        ce.set_bit(true)?;
        rstn.set_bit(true)?;
        for _ in 0..half + 1 {
            clk.rising_edge_ro().await;
        }
        if o_clk.u64()? != 1 {
            return Err(TbError::Failed("divided clock did not rise".to_string()));
        }

        // takes effect before the next edge
        rstn.set_bit(false)?;
        clk.rising_edge_ro().await;
        if o_clk.u64()? != 0 || counter.u64()? != 0 {
            return Err(TbError::Failed(format!(
                "reset left o_clk={} counter={}",
                o_clk.u64()?,
                counter.u64()?
            )));
        }

        rstn.set_bit(true)?;
        for _ in 0..half {
            clk.rising_edge_ro().await;
        }
        if o_clk.u64()? != 1 {
            return Err(TbError::Failed(
                "divided clock did not restart after reset".to_string(),
            ));
        }
        Ok(())
    }
}
