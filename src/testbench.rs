use crate::bridge::VectorRecorder;
use crate::codec::{BitVector, Mode};
use crate::driver::{DutyCycleDriver, EveryCycleDriver};
use crate::error::TbResult;
use crate::model::{ArithOp, ClockDividerModel, ModelHook, PureModelHook};
use crate::monitor::Monitor;
use crate::scoreboard::{Scoreboard, Strictness};
use crate::signal::SimObject;
use crate::sim_if;
use crate::stimulus::{DutyCycleSampler, StimulusPair};
use crate::tb_obj::{StopToken, TbObj};
use crate::trigger::Trigger;

/*
 * CLOCK
 */
/// Free running clock, starting low. Never returns.
pub async fn clock(clk: SimObject, period: u64, unit: &'static str) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        sim_if::log(&format!(
            "Warning: Clock period {period}{unit} not dividable by 2. High time will be {high_t}{unit}; low time will be {low_t}{unit}."
        ));
    }
    let high = Trigger::timer(high_t, unit)?;
    let low = Trigger::timer(low_t, unit)?;
    loop {
        clk.set_bit(false)?;
        low.clone().await;
        clk.set_bit(true)?;
        high.clone().await;
    }
}

pub const CLOCK_PERIOD_NS: u64 = 10;

/// Output samples taken before the first stimulus reached the device.
const RESET_SAMPLES: u64 = 1;

/// Lets `n_cycles` rising edges pass, stops the stimulus at the next falling
/// edge and, with `drain`, waits one more cycle so the last applied stimulus
/// shows up on the outputs.
async fn run_cycles(clk: SimObject, stop: &StopToken, n_cycles: u32, drain: bool) {
    for _ in 0..n_cycles {
        clk.rising_edge().await;
    }
    clk.falling_edge().await;
    stop.stop();
    if drain {
        clk.rising_edge().await;
        clk.falling_edge().await;
    }
}

/*
 * ARITHMETIC BENCH
 */
pub type PairSource = Box<dyn Iterator<Item = StimulusPair> + Send>;

/// Driver, output monitor, pure model and scoreboard around a two-operand
/// arithmetic circuit. The output sample of the first edge still shows the
/// reset value, before any stimulus arrived, and is not scored. `n` cycles
/// plus the drain therefore score exactly `n` results.
pub struct ArithTb {
    pub clk: SimObject,
    pub op: ArithOp,
    pub driver: EveryCycleDriver<PairSource>,
    pub output_mon: Monitor<BitVector>,
    pub scoreboard: Scoreboard<BitVector>,
    pub recorder: TbObj<VectorRecorder>,
    stop: StopToken,
}

impl ArithTb {
    pub fn new(dut: SimObject, op: ArithOp, mode: Mode, stimulus: PairSource, strictness: Strictness) -> TbResult<Self> {
        let clk = dut.get_child("i_clk")?;
        let out_name = format!("o_{}", op.result_name());
        let out = dut.get_child(&out_name)?;
        let out_width = out.width()?;
        let stop = StopToken::new();

        let driver = EveryCycleDriver::new(
            clk,
            dut.get_child("i_a")?,
            dut.get_child("i_b")?,
            mode,
            stimulus,
            stop.clone(),
        );
        let output_mon = Monitor::new(&out_name, clk, out, mode);

        let scoreboard = Scoreboard::new(&dut.name(), strictness);
        scoreboard.connect_after(&output_mon, RESET_SAMPLES);
        PureModelHook::new(op, out_width, scoreboard.clone(), &out_name, stop.clone()).attach(&driver);

        let recorder = TbObj::new(VectorRecorder::new(op, 1));
        let rec = recorder.clone();
        driver.add_callback(move |&pair| rec.with_mut(|r| r.record_pair(pair)));
        let rec = recorder.clone();
        output_mon.add_callback(move |tr| rec.with_mut(|r| r.record_output(tr.value)));

        Ok(Self {
            clk,
            op,
            driver,
            output_mon,
            scoreboard,
            recorder,
            stop,
        })
    }

    pub fn start(&mut self) {
        self.driver.start();
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Runs `n_cycles` of stimulus plus the drain cycle, then returns the
    /// scoreboard verdict.
    pub async fn run(&mut self, n_cycles: u32) -> TbResult<String> {
        self.run_with_drain(n_cycles, true).await
    }

    pub async fn run_with_drain(&mut self, n_cycles: u32, drain: bool) -> TbResult<String> {
        self.start();
        run_cycles(self.clk, &self.stop, n_cycles, drain).await;
        if drain {
            self.driver.join().await?;
        }
        self.scoreboard.result()
    }
}

/*
 * CLOCK DIVIDER BENCH
 */
/// Duty cycled clock enable, a live model fed by a monitor on `i_ce`, and a
/// monitor on the divided clock. As for [`ArithTb`], the first output sample
/// is not scored.
pub struct DividerTb {
    pub clk: SimObject,
    pub driver: DutyCycleDriver<DutyCycleSampler>,
    pub input_mon: Monitor<BitVector>,
    pub output_mon: Monitor<BitVector>,
    pub scoreboard: Scoreboard<BitVector>,
    stop: StopToken,
}

impl DividerTb {
    pub fn new(dut: SimObject, ratio: u32, seed: u64, strictness: Strictness) -> TbResult<Self> {
        let clk = dut.get_child("i_clk")?;
        let ce = dut.get_child("i_ce")?;
        let o_clk = dut.get_child("o_clk")?;
        let stop = StopToken::new();

        let driver = DutyCycleDriver::new(clk, ce, DutyCycleSampler::new(seed), stop.clone());
        let output_mon = Monitor::new("o_clk", clk, o_clk, Mode::Unsigned);
        let scoreboard = Scoreboard::new(&dut.name(), strictness);
        scoreboard.connect_after(&output_mon, RESET_SAMPLES);

        let input_mon = Monitor::new("i_ce", clk, ce, Mode::Unsigned);
        ModelHook::new(ClockDividerModel::new(ratio), scoreboard.clone(), "o_clk", stop.clone()).attach(&input_mon);

        Ok(Self {
            clk,
            driver,
            input_mon,
            output_mon,
            scoreboard,
            stop,
        })
    }

    pub fn start(&mut self) {
        self.driver.start();
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub async fn run(&mut self, n_cycles: u32) -> TbResult<String> {
        self.start();
        run_cycles(self.clk, &self.stop, n_cycles, true).await;
        self.driver.join().await?;
        self.scoreboard.result()
    }
}
