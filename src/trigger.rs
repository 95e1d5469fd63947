use intmap::IntMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::TbResult;
use crate::executor;
use crate::signal::SimObject;
use crate::sim_if::{self, SimCallback};

// IntMap specializes on u64 keys, nothing needs to be hashed
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

/// Drops every pending trigger, and with it the wakers of every task
/// waiting on one.
pub(crate) fn cancel_all_triggers() {
    let sim = sim_if::try_current().ok();
    let mut handles = Vec::new();
    READ_ONLY.with(|ro| {
        let mut ro = ro.borrow_mut();
        ro.callbacks.clear();
        handles.extend(ro.handle.take());
    });
    READ_WRITE.with(|rw| {
        let mut rw = rw.borrow_mut();
        rw.callbacks.clear();
        handles.extend(rw.handle.take());
    });
    TIMER_MAP.with(|m| {
        for (_, cb) in m.borrow_mut().drain() {
            handles.extend(cb.handle);
        }
    });
    EDGE_MAP.with(|m| {
        for (_, cb) in m.borrow_mut().drain() {
            handles.extend(cb.handle);
        }
    });
    if let Some(sim) = sim {
        for h in handles {
            sim.cancel_callback(h);
        }
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    // set right before waking, so the trigger can tell its own event from
    // any other wake of the same task
    fired: Arc<AtomicBool>,
    // An edge callback fires on any change, so the trigger needs to remember
    // which kind of edge it is waiting for.
    edge_kind: EdgeKind,
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

/// Suspension point of a task. Awaiting it registers the task with the
/// simulator; the task resumes when the simulator reports the event.
///
/// # Panics
///
/// Polling a trigger panics when no simulator is installed on the thread.
#[derive(Debug)]
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

// A clone waits for the next event of the same kind.
impl Clone for Trigger {
    fn clone(&self) -> Self {
        Trigger::new(self.kind)
    }
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }
    pub fn timer(time: u64, unit: &str) -> TbResult<Self> {
        let steps = sim_if::try_current()?.get_sim_steps(time, unit)?;
        Ok(Trigger::timer_steps(steps))
    }
    /// Zero-length timers fire one step later.
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps.max(1)))
    }
    pub async fn timer_ro(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit)?.await;
        Trigger::read_only().await;
        Ok(())
    }
    pub async fn timer_rw(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit)?.await;
        Trigger::read_write().await;
        Ok(())
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    /// Resumes once all updates of the current step have propagated, while
    /// writes are still allowed.
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    /// Resumes at the end of the current step. Values are final; writes made
    /// here only take effect in the next step.
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Once registered, only the event itself completes the trigger. The
        // owning task may be polled earlier, e.g. by `select`.
        if let Some(fired) = &self.fired {
            return if fired.load(Ordering::Acquire) {
                Poll::Ready(())
            } else {
                Poll::Pending
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        self.fired = Some(fired.clone());
        let mut shared = TrigShared {
            waker: cx.waker().clone(),
            fired,
            edge_kind: EdgeKind::Any,
        };
        let sim = sim_if::current();

        match self.kind {
            TrigKind::ReadWrite => READ_WRITE.with(|rw| {
                let mut rw = rw.borrow_mut();
                rw.callbacks.push_back(shared);
                if rw.handle.is_none() {
                    rw.handle = Some(sim.register_callback(SimCallback::ReadWrite));
                }
            }),
            TrigKind::ReadOnly => READ_ONLY.with(|ro| {
                let mut ro = ro.borrow_mut();
                ro.callbacks.push_back(shared);
                if ro.handle.is_none() {
                    ro.handle = Some(sim.register_callback(SimCallback::ReadOnly));
                }
            }),
            TrigKind::Timer(t) => {
                // simulator reports absolute time, not the delay
                let abs_time = t + sim.get_sim_time_steps();
                TIMER_MAP.with(|m| {
                    let mut m = m.borrow_mut();
                    if let Some(callbacks) = m.get_mut(abs_time) {
                        callbacks.callbacks.push_back(shared);
                    } else {
                        let handle = sim.register_callback(SimCallback::Time(t));
                        let mut callbacks = VecDeque::new();
                        callbacks.push_back(shared);
                        m.insert(
                            abs_time,
                            CallbackHandles {
                                handle: Some(handle),
                                callbacks,
                            },
                        );
                    }
                });
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                shared.edge_kind = edge_kind;
                EDGE_MAP.with(|m| {
                    let mut m = m.borrow_mut();
                    if let Some(callbacks) = m.get_mut(sig_hdl as u64) {
                        callbacks.callbacks.push_back(shared);
                    } else {
                        let handle = sim.register_callback(SimCallback::Edge(sig_hdl));
                        let mut callbacks = VecDeque::new();
                        callbacks.push_back(shared);
                        m.insert(
                            sig_hdl as u64,
                            CallbackHandles {
                                handle: Some(handle),
                                callbacks,
                            },
                        );
                    }
                });
            }
        }
        Poll::Pending
    }
}

fn wake_all(wake: VecDeque<TrigShared>) {
    if wake.is_empty() {
        return;
    }
    for shared in wake {
        shared.fired.store(true, Ordering::Release);
        shared.waker.wake();
    }
    // execute woken tasks
    executor::run_once();
}

pub fn react_edge(sig_hdl: usize, edge: EdgeKind) {
    let mut cancel = None;
    let wake = EDGE_MAP.with(|m| {
        let mut m = m.borrow_mut();
        let Some(mut callbacks) = m.remove(sig_hdl as u64) else {
            return VecDeque::new();
        };
        let (wake, resched): (VecDeque<_>, VecDeque<_>) =
            callbacks.callbacks.drain(..).partition(|trig| {
                edge == EdgeKind::Any
                    || trig.edge_kind == EdgeKind::Any
                    || trig.edge_kind == edge
            });
        if resched.is_empty() {
            // nobody left waiting on this signal
            cancel = callbacks.handle;
        } else {
            callbacks.callbacks = resched;
            m.insert(sig_hdl as u64, callbacks);
        }
        wake
    });
    if let (Some(handle), Ok(sim)) = (cancel, sim_if::try_current()) {
        sim.cancel_callback(handle);
    }
    wake_all(wake);
}

pub fn react_time(abs_time: u64) {
    let wake = TIMER_MAP.with(|m| {
        m.borrow_mut()
            .remove(abs_time)
            .map(|cb| cb.callbacks)
            .unwrap_or_default()
    });
    wake_all(wake);
}

pub fn react_ro() {
    let wake = READ_ONLY.with(|ro| {
        let mut ro = ro.borrow_mut();
        ro.handle = None;
        std::mem::take(&mut ro.callbacks)
    });
    wake_all(wake);
}

pub fn react_rw() {
    let wake = READ_WRITE.with(|rw| {
        let mut rw = rw.borrow_mut();
        rw.handle = None;
        std::mem::take(&mut rw.callbacks)
    });
    wake_all(wake);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Task;

    #[test]
    #[should_panic(expected = "no simulator installed")]
    fn awaiting_without_a_simulator_panics() {
        Task::spawn(
            async {
                Trigger::read_write().await;
                Ok(())
            },
            "orphan",
        );
        executor::run_once();
    }

    #[test]
    fn clone_is_not_registered() {
        let trig = Trigger::timer_steps(0);
        assert!(trig.fired.is_none());
        assert!(matches!(trig.clone().kind, TrigKind::Timer(1)));
    }
}
