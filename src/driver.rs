use crate::codec::Mode;
use crate::error::TbResult;
use crate::executor::{JoinHandle, Task};
use crate::signal::SimObject;
use crate::stimulus::{DutyCycle, StimulusPair};
use crate::tb_obj::{StopToken, TbObj};

/// Subscriber of a driver or monitor, called synchronously in registration
/// order.
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

pub(crate) type Callbacks<T> = TbObj<Vec<Callback<T>>>;

pub(crate) fn notify<T>(callbacks: &Callbacks<T>, item: &T) {
    callbacks.with_mut(|cbs| {
        for cb in cbs.iter_mut() {
            cb(item);
        }
    });
}

/// Writes a fresh pair to two inputs after every rising edge.
pub struct EveryCycleDriver<G> {
    clk: SimObject,
    a: SimObject,
    b: SimObject,
    mode: Mode,
    generator: Option<G>,
    callbacks: Callbacks<StimulusPair>,
    stop: StopToken,
    handle: Option<JoinHandle>,
}

impl<G> EveryCycleDriver<G>
where
    G: Iterator<Item = StimulusPair> + Send + 'static,
{
    pub fn new(clk: SimObject, a: SimObject, b: SimObject, mode: Mode, generator: G, stop: StopToken) -> Self {
        Self {
            clk,
            a,
            b,
            mode,
            generator: Some(generator),
            callbacks: TbObj::new(Vec::new()),
            stop,
            handle: None,
        }
    }

    /// Called with every pair right after it was written.
    pub fn add_callback(&self, cb: impl FnMut(&StimulusPair) + Send + 'static) {
        self.callbacks.with_mut(|cbs| cbs.push(Box::new(cb)));
    }

    /// Forks the driving loop. A driver runs once; later calls do nothing.
    pub fn start(&mut self) {
        let Some(mut generator) = self.generator.take() else {
            return;
        };
        let (clk, a, b, mode) = (self.clk, self.a, self.b, self.mode);
        let callbacks = self.callbacks.clone();
        let stop = self.stop.clone();
        self.handle = Some(Task::spawn(
            async move {
                loop {
                    clk.rising_edge_rw().await;
                    if stop.is_stopped() {
                        break;
                    }
                    let Some((x, y)) = generator.next() else {
                        break;
                    };
                    a.write(x, mode)?;
                    b.write(y, mode)?;
                    notify(&callbacks, &(x, y));
                }
                Ok(())
            },
            "every_cycle_driver",
        ));
    }

    /// The loop exits at its next edge without writing again. Values already
    /// applied stay on the inputs.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Waits for the loop to exit and hands back the error it hit, if any.
    pub async fn join(&mut self) -> TbResult {
        match self.handle.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}

/// Drives a single bit high for `on` cycles, then low for `off` cycles, then
/// moves on to the next pair.
pub struct DutyCycleDriver<G> {
    clk: SimObject,
    signal: SimObject,
    generator: Option<G>,
    callbacks: Callbacks<bool>,
    stop: StopToken,
    handle: Option<JoinHandle>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DutyState {
    level: bool,
    remaining: u32,
    off: u32,
}

impl DutyState {
    /// Level to assert this cycle.
    pub(crate) fn step(&mut self, next_pair: &mut impl FnMut() -> Option<DutyCycle>) -> Option<bool> {
        if self.remaining == 0 {
            if self.level {
                self.level = false;
                self.remaining = self.off;
            } else {
                let (on, off) = next_pair()?;
                if on == 0 && off == 0 {
                    return None;
                }
                self.level = true;
                self.remaining = on;
                self.off = off;
            }
        }
        // zero length phases are skipped over
        if self.remaining == 0 {
            return self.step(next_pair);
        }
        self.remaining -= 1;
        Some(self.level)
    }
}

impl<G> DutyCycleDriver<G>
where
    G: Iterator<Item = DutyCycle> + Send + 'static,
{
    pub fn new(clk: SimObject, signal: SimObject, generator: G, stop: StopToken) -> Self {
        Self {
            clk,
            signal,
            generator: Some(generator),
            callbacks: TbObj::new(Vec::new()),
            stop,
            handle: None,
        }
    }

    pub fn add_callback(&self, cb: impl FnMut(&bool) + Send + 'static) {
        self.callbacks.with_mut(|cbs| cbs.push(Box::new(cb)));
    }

    pub fn start(&mut self) {
        let Some(mut generator) = self.generator.take() else {
            return;
        };
        let (clk, signal) = (self.clk, self.signal);
        let callbacks = self.callbacks.clone();
        let stop = self.stop.clone();
        self.handle = Some(Task::spawn(
            async move {
                let mut state = DutyState::default();
                loop {
                    clk.rising_edge_rw().await;
                    if stop.is_stopped() {
                        break;
                    }
                    let Some(level) = state.step(&mut || generator.next()) else {
                        break;
                    };
                    signal.set_bit(level)?;
                    notify(&callbacks, &level);
                }
                Ok(())
            },
            "duty_cycle_driver",
        ));
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn join(&mut self) -> TbResult {
        match self.handle.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}
