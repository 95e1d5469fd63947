//! Reference models. Pure arithmetic for the adders and multipliers, and
//! live models that predict the next output from what a monitor saw.

use crate::codec::{BitVector, Mode};
use crate::driver::EveryCycleDriver;
use crate::error::TbResult;
use crate::monitor::{Monitor, Transaction};
use crate::scoreboard::Scoreboard;
use crate::stimulus::StimulusPair;
use crate::tb_obj::{StopToken, TbObj};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Multiply,
}

impl ArithOp {
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Multiply => a.wrapping_mul(b),
        }
    }

    pub fn apply_f32(self, a: f32, b: f32) -> f32 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Multiply => a * b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Multiply => "*",
        }
    }

    /// Name of the result in file names and port names.
    pub fn result_name(self) -> &'static str {
        match self {
            ArithOp::Add => "sum",
            ArithOp::Multiply => "prod",
        }
    }

    /// The expected output as the circuit would present it.
    pub fn expected(self, (a, b): StimulusPair, out_width: u32) -> TbResult<BitVector> {
        let r = self.apply(a, b);
        BitVector::from_int(r, out_width, Mode::for_result(r))
    }
}

/// A model fed by observed transactions. `predict` has no side effects: all
/// memory lives in `State`, which the hook threads through the calls.
pub trait LiveModel: Send + 'static {
    type Input;
    type Output;
    type State: Default + Send + 'static;

    fn predict(&self, state: &Self::State, tr: &Transaction<Self::Input>) -> (Self::State, Self::Output);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DividerState {
    pub counter: u32,
    pub level: bool,
}

/// Output of the clock divider one edge after the sampled clock enable.
#[derive(Debug, Clone, Copy)]
pub struct ClockDividerModel {
    ratio: u32,
}

impl ClockDividerModel {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(2),
        }
    }
}

impl LiveModel for ClockDividerModel {
    type Input = BitVector;
    type Output = BitVector;
    type State = DividerState;

    fn predict(&self, state: &DividerState, tr: &Transaction<BitVector>) -> (DividerState, BitVector) {
        let mut next = *state;
        if tr.value.raw() != 0 {
            next.counter += 1;
            if next.counter >= self.ratio / 2 {
                next.counter = 0;
                next.level = !next.level;
            }
        }
        (next, BitVector::bit(next.level))
    }
}

/// Appends the predictions of a live model to a scoreboard interface until
/// the stop token is set.
pub struct ModelHook<M: LiveModel> {
    model: M,
    scoreboard: Scoreboard<M::Output>,
    interface: String,
    stop: StopToken,
}

impl<M> ModelHook<M>
where
    M: LiveModel,
    M::Input: Clone + Send + 'static,
    M::Output: PartialEq + std::fmt::Display + Clone + Send + 'static,
{
    pub fn new(model: M, scoreboard: Scoreboard<M::Output>, interface: &str, stop: StopToken) -> Self {
        Self {
            model,
            scoreboard,
            interface: interface.to_string(),
            stop,
        }
    }

    pub fn attach(self, monitor: &Monitor<M::Input>) {
        let state = TbObj::new(M::State::default());
        let source = monitor.name().to_string();
        let ModelHook {
            model,
            scoreboard,
            interface,
            stop,
        } = self;
        monitor.add_callback(move |tr| {
            if stop.is_stopped() {
                return;
            }
            let out = state.with_mut(|s| {
                let (next, out) = model.predict(s, tr);
                *s = next;
                out
            });
            scoreboard.expect(&interface, out, Some(format!("{} #{}", source, tr.ordinal)));
        });
    }
}

/// Feeds the pure model with every pair a driver applies.
pub struct PureModelHook {
    op: ArithOp,
    out_width: u32,
    scoreboard: Scoreboard<BitVector>,
    interface: String,
    stop: StopToken,
}

impl PureModelHook {
    pub fn new(op: ArithOp, out_width: u32, scoreboard: Scoreboard<BitVector>, interface: &str, stop: StopToken) -> Self {
        Self {
            op,
            out_width,
            scoreboard,
            interface: interface.to_string(),
            stop,
        }
    }

    pub fn attach<G>(self, driver: &EveryCycleDriver<G>)
    where
        G: Iterator<Item = StimulusPair> + Send + 'static,
    {
        driver.add_callback(move |&(a, b)| {
            if self.stop.is_stopped() {
                return;
            }
            match self.op.expected((a, b), self.out_width) {
                Ok(exp) => self.scoreboard.expect(
                    &self.interface,
                    exp,
                    Some(format!("{} {} {}", a, self.op.symbol(), b)),
                ),
                Err(e) => crate::fail_test_with(e),
            }
        });
    }
}
