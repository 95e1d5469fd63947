use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::codec::{BitVector, Mode};
use crate::driver::{notify, Callbacks};
use crate::error::TbResult;
use crate::executor::{JoinHandle, Task};
use crate::signal::SimObject;
use crate::tb_obj::TbObj;

/// One sampled value. `ordinal` counts rising edges since the monitor started.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<T> {
    pub ordinal: u64,
    pub value: T,
}

/// Samples once per rising edge, after the edge has settled, and hands the
/// value to every subscriber. Runs until the test ends.
pub struct Monitor<T> {
    name: String,
    callbacks: Callbacks<Transaction<T>>,
    queues: TbObj<Vec<UnboundedSender<Transaction<T>>>>,
    handle: JoinHandle,
}

impl Monitor<BitVector> {
    /// Watches `signal`, read in `mode`.
    pub fn new(name: &str, clk: SimObject, signal: SimObject, mode: Mode) -> Self {
        Monitor::with_sampler(name, clk, move || signal.read(mode))
    }
}

impl<T: Clone + Send + 'static> Monitor<T> {
    pub fn with_sampler(
        name: &str,
        clk: SimObject,
        sample: impl FnMut() -> TbResult<T> + Send + 'static,
    ) -> Self {
        let callbacks: Callbacks<Transaction<T>> = TbObj::new(Vec::new());
        let queues: TbObj<Vec<UnboundedSender<Transaction<T>>>> = TbObj::new(Vec::new());
        let (cbs, qs) = (callbacks.clone(), queues.clone());
        let handle = Task::spawn(sample_loop(clk, sample, cbs, qs), &format!("monitor {}", name));
        Self {
            name: name.to_string(),
            callbacks,
            queues,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_callback(&self, cb: impl FnMut(&Transaction<T>) + Send + 'static) {
        self.callbacks.with_mut(|cbs| cbs.push(Box::new(cb)));
    }

    /// A queue receiving every transaction from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<Transaction<T>> {
        let (tx, rx) = mpsc::unbounded();
        self.queues.with_mut(|qs| qs.push(tx));
        rx
    }

    /// Resolves only if sampling failed; a healthy monitor never returns.
    pub fn join(self) -> JoinHandle {
        self.handle
    }
}

async fn sample_loop<T: Clone>(
    clk: SimObject,
    mut sample: impl FnMut() -> TbResult<T>,
    callbacks: Callbacks<Transaction<T>>,
    queues: TbObj<Vec<UnboundedSender<Transaction<T>>>>,
) -> TbResult {
    let mut ordinal = 0;
    loop {
        clk.rising_edge_ro().await;
        let tr = Transaction {
            ordinal,
            value: sample()?,
        };
        ordinal += 1;
        notify(&callbacks, &tr);
        // receivers that went away are forgotten
        queues.with_mut(|qs| qs.retain(|q| q.unbounded_send(tr.clone()).is_ok()));
    }
}
