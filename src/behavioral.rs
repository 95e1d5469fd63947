//! In-process event driven simulator for behavioral circuit models.
//!
//! One time step runs through these regions:
//!
//! 1. timer callbacks (clock generators, delays)
//! 2. update loop: pending writes are committed; a rising edge on the circuit
//!    clock evaluates the circuit, whose outputs are committed in the next
//!    delta; value change callbacks wake edge waiters
//! 3. read-write callbacks, then back to 2 if they wrote anything
//! 4. read-only callbacks; writes made here land in the next time step

use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use crate::dut::{Circuit, Direction, Port, PortIo};
use crate::error::{TbError, TbResult};
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};

pub const ROOT_HANDLE: usize = 0;

/// Why [`BehavioralSim::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEnd {
    /// `finish()` was called.
    Finished,
    /// Nothing left to schedule.
    Exhausted,
    /// The next event lies past the time limit.
    TimeLimit,
}

struct Signal {
    name: String,
    width: u32,
    value: u64,
    dir: Direction,
}

enum Registered {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

struct SimState {
    time: u64,
    signals: Vec<Signal>,
    names: HashMap<String, usize>,
    pending: Vec<(usize, u64)>,
    deferred: Vec<(usize, u64)>,
    next_cb: usize,
    callbacks: IntMap<Registered>,
    timers: BTreeMap<u64, Vec<usize>>,
    // signal handle -> callback handle
    edge_cbs: IntMap<usize>,
    rw_cb: Option<usize>,
    ro_cb: Option<usize>,
    read_only: bool,
}

pub struct BehavioralSim {
    name: String,
    precision: i8,
    max_steps: u64,
    clock: usize,
    circuit: RefCell<Box<dyn Circuit>>,
    state: RefCell<SimState>,
    finished: Cell<bool>,
}

// Handles are 1-based so that 0 can stand for the root scope.
fn sig_index(handle: usize) -> Option<usize> {
    handle.checked_sub(1)
}

impl BehavioralSim {
    /// `precision` is the exponent of one simulation step in seconds (-12 is
    /// one picosecond); `max_steps` bounds the simulation time.
    pub fn new(circuit: Box<dyn Circuit>, precision: i8, max_steps: u64) -> TbResult<Self> {
        let name = circuit.name().to_string();
        let mut signals = Vec::new();
        let mut names = HashMap::new();
        for Port {
            name: port,
            width,
            dir,
            init,
        } in circuit.ports()
        {
            let full = format!("{}.{}", name, port);
            if names.insert(full.clone(), signals.len() + 1).is_some() {
                return Err(TbError::Signal(format!("duplicate port {}", full)));
            }
            signals.push(Signal {
                name: full,
                width,
                value: init,
                dir,
            });
        }
        let clock = *names
            .get(&format!("{}.{}", name, circuit.clock()))
            .ok_or_else(|| TbError::Signal(format!("{} has no clock port", name)))?;

        Ok(Self {
            name,
            precision,
            max_steps,
            clock,
            circuit: RefCell::new(circuit),
            state: RefCell::new(SimState {
                time: 0,
                signals,
                names,
                pending: Vec::new(),
                deferred: Vec::new(),
                next_cb: 1,
                callbacks: IntMap::new(),
                timers: BTreeMap::new(),
                edge_cbs: IntMap::new(),
                rw_cb: None,
                ro_cb: None,
                read_only: false,
            }),
            finished: Cell::new(false),
        })
    }

    /// Runs the event loop until the simulation finishes, runs out of events
    /// or hits the time limit.
    pub fn run(&self) -> SimEnd {
        // whatever the test scheduled before the first step
        self.settle();
        loop {
            if self.finished.get() {
                return SimEnd::Finished;
            }
            let next = {
                let st = self.state.borrow();
                st.timers.keys().next().copied()
            };
            let Some(next) = next else {
                return SimEnd::Exhausted;
            };
            if next > self.max_steps {
                return SimEnd::TimeLimit;
            }
            let fired = {
                let mut st = self.state.borrow_mut();
                st.time = next;
                let deferred = std::mem::take(&mut st.deferred);
                st.pending.extend(deferred);
                let handles = st.timers.remove(&next).unwrap_or_default();
                handles
                    .into_iter()
                    .filter(|h| st.callbacks.remove(*h as u64).is_some())
                    .count()
            };
            if fired > 0 {
                trigger::react_time(next);
            }
            self.settle();
        }
    }

    fn settle(&self) {
        loop {
            while self.has_pending() {
                if self.finished.get() {
                    return;
                }
                self.delta();
            }
            if self.finished.get() {
                return;
            }
            let rw = self.state.borrow_mut().rw_cb.take();
            match rw {
                Some(h) if self.take_callback(h) => trigger::react_rw(),
                _ => break,
            }
        }
        if self.finished.get() {
            return;
        }
        let ro = self.state.borrow_mut().ro_cb.take();
        if let Some(h) = ro {
            if self.take_callback(h) {
                self.state.borrow_mut().read_only = true;
                trigger::react_ro();
                self.state.borrow_mut().read_only = false;
            }
        }
    }

    fn has_pending(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    fn take_callback(&self, h: usize) -> bool {
        self.state.borrow_mut().callbacks.remove(h as u64).is_some()
    }

    /// Commits pending writes, evaluates the circuit on a clock edge and
    /// reports value changes.
    fn delta(&self) {
        let changes: Vec<(usize, u64, u64)> = {
            let mut st = self.state.borrow_mut();
            let pending = std::mem::take(&mut st.pending);
            let mut changes = Vec::new();
            for (handle, value) in pending {
                let Some(sig) = sig_index(handle).and_then(|i| st.signals.get_mut(i)) else {
                    continue;
                };
                if sig.value != value {
                    changes.push((handle, sig.value, value));
                    sig.value = value;
                }
            }
            changes
        };

        let clock_rose = changes
            .iter()
            .any(|&(h, old, new)| h == self.clock && old == 0 && new == 1);
        if clock_rose {
            self.evaluate_circuit();
        }

        for (handle, _, new) in changes {
            let (has_cb, width) = {
                let st = self.state.borrow();
                let width = sig_index(handle)
                    .and_then(|i| st.signals.get(i))
                    .map(|s| s.width)
                    .unwrap_or(0);
                (st.edge_cbs.contains_key(handle as u64), width)
            };
            if !has_cb {
                continue;
            }
            let edge = match (width, new) {
                (1, 0) => EdgeKind::Falling,
                (1, _) => EdgeKind::Rising,
                _ => EdgeKind::Any,
            };
            trigger::react_edge(handle, edge);
        }
    }

    fn evaluate_circuit(&self) {
        let mut io = EdgeIo {
            before: {
                let st = self.state.borrow();
                let prefix = self.name.len() + 1;
                st.signals
                    .iter()
                    .map(|s| (s.name[prefix..].to_string(), s.value))
                    .collect()
            },
            writes: Vec::new(),
        };
        self.circuit.borrow_mut().on_rising_edge(&mut io);

        let mut st = self.state.borrow_mut();
        for (port, value) in io.writes {
            let full = format!("{}.{}", self.name, port);
            if let Some(&handle) = st.names.get(&full) {
                let width = st.signals[handle - 1].width;
                let masked = if width >= 64 {
                    value
                } else {
                    value & ((1u64 << width) - 1)
                };
                st.pending.push((handle, masked));
            }
        }
    }

    fn object(&self, handle: usize) -> TbResult<SimObject> {
        if handle == ROOT_HANDLE {
            return Ok(SimObject {
                handle,
                kind: ObjectKind::Hier,
            });
        }
        let st = self.state.borrow();
        let sig = sig_index(handle)
            .and_then(|i| st.signals.get(i))
            .ok_or_else(|| TbError::Signal(format!("invalid handle {}", handle)))?;
        Ok(SimObject {
            handle,
            kind: ObjectKind::Int(sig.width),
        })
    }
}

struct EdgeIo {
    before: HashMap<String, u64>,
    writes: Vec<(String, u64)>,
}

impl PortIo for EdgeIo {
    fn get(&self, port: &str) -> u64 {
        self.before.get(port).copied().unwrap_or(0)
    }
    fn set(&mut self, port: &str, value: u64) {
        self.writes.push((port.to_string(), value));
    }
}

impl SimIf for BehavioralSim {
    fn set_value(&self, obj: &SimObject, value: u64) -> TbResult<()> {
        let mut st = self.state.borrow_mut();
        let idx = sig_index(obj.handle)
            .filter(|&i| i < st.signals.len())
            .ok_or_else(|| TbError::Signal(format!("can't write handle {}", obj.handle)))?;
        let sig = &st.signals[idx];
        if sig.dir == Direction::Output {
            return Err(TbError::Signal(format!("{} is an output", sig.name)));
        }
        if st.read_only {
            st.deferred.push((obj.handle, value));
        } else {
            st.pending.push((obj.handle, value));
        }
        Ok(())
    }

    fn get_value(&self, obj: &SimObject) -> TbResult<u64> {
        let st = self.state.borrow();
        sig_index(obj.handle)
            .and_then(|i| st.signals.get(i))
            .map(|s| s.value)
            .ok_or_else(|| TbError::Signal(format!("can't read handle {}", obj.handle)))
    }

    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject> {
        if name == self.name {
            return self.object(ROOT_HANDLE);
        }
        let handle = {
            let st = self.state.borrow();
            st.names
                .get(name)
                .or_else(|| st.names.get(&format!("{}.{}", self.name, name)))
                .copied()
        };
        match handle {
            Some(h) => self.object(h),
            None => Err(TbError::Signal(format!("no object named {}", name))),
        }
    }

    fn get_root_object(&self) -> TbResult<SimObject> {
        self.object(ROOT_HANDLE)
    }

    fn get_full_name(&self, obj: &SimObject) -> TbResult<String> {
        if obj.handle == ROOT_HANDLE {
            return Ok(self.name.clone());
        }
        let st = self.state.borrow();
        sig_index(obj.handle)
            .and_then(|i| st.signals.get(i))
            .map(|s| s.name.clone())
            .ok_or_else(|| TbError::Signal(format!("invalid handle {}", obj.handle)))
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.state.borrow().time
    }

    fn get_sim_precision(&self) -> i8 {
        self.precision
    }

    fn register_callback(&self, cb: SimCallback) -> usize {
        let mut st = self.state.borrow_mut();
        let handle = st.next_cb;
        st.next_cb += 1;
        let registered = match cb {
            SimCallback::Time(t) => {
                let abs = st.time + t.max(1);
                st.timers.entry(abs).or_default().push(handle);
                Registered::Time(abs)
            }
            SimCallback::Edge(sig) => {
                st.edge_cbs.insert(sig as u64, handle);
                Registered::Edge(sig)
            }
            SimCallback::ReadWrite => {
                st.rw_cb = Some(handle);
                Registered::ReadWrite
            }
            SimCallback::ReadOnly => {
                st.ro_cb = Some(handle);
                Registered::ReadOnly
            }
        };
        st.callbacks.insert(handle as u64, registered);
        handle
    }

    fn cancel_callback(&self, cb_hdl: usize) {
        let mut st = self.state.borrow_mut();
        match st.callbacks.remove(cb_hdl as u64) {
            Some(Registered::Edge(sig)) => {
                if st.edge_cbs.get(sig as u64) == Some(&cb_hdl) {
                    st.edge_cbs.remove(sig as u64);
                }
            }
            Some(Registered::Time(abs)) => {
                if let Some(handles) = st.timers.get_mut(&abs) {
                    handles.retain(|&h| h != cb_hdl);
                    if handles.is_empty() {
                        st.timers.remove(&abs);
                    }
                }
            }
            Some(Registered::ReadWrite) if st.rw_cb == Some(cb_hdl) => st.rw_cb = None,
            Some(Registered::ReadOnly) if st.ro_cb == Some(cb_hdl) => st.ro_cb = None,
            Some(_) | None => {}
        }
    }

    fn finish(&self) {
        self.finished.set(true);
    }
}
