use std::collections::VecDeque;
use std::fmt::Display;

use crate::error::{MismatchEntry, TbError, TbResult};
use crate::monitor::Monitor;
use crate::sim_if;
use crate::tb_obj::TbObj;

/// What happens on the first mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Record every mismatch, report them all from `result()`.
    CollectAll,
    /// End the running test right away.
    FailFast,
}

struct Interface<T> {
    name: String,
    exp_q: VecDeque<(T, Option<String>)>,
    recv_q: VecDeque<T>,
    expected: usize,
    observed: usize,
    matched: usize,
    mismatches: Vec<MismatchEntry>,
}

impl<T: PartialEq + Display> Interface<T> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            expected: 0,
            observed: 0,
            matched: 0,
            mismatches: Vec::new(),
        }
    }

    // Pairs up expected and observed entries in arrival order. Returns the
    // mismatches found in this call.
    fn compare(&mut self) -> Vec<MismatchEntry> {
        let mut new = Vec::new();
        while !self.exp_q.is_empty() && !self.recv_q.is_empty() {
            let (Some((exp, origin)), Some(recv)) = (self.exp_q.pop_front(), self.recv_q.pop_front())
            else {
                break;
            };
            let index = self.matched + self.mismatches.len() + new.len();
            if exp == recv {
                self.matched += 1;
                sim_if::debug(&format!("{} #{}: {} ok", self.name, index, recv));
            } else {
                new.push(MismatchEntry {
                    index,
                    expected: exp.to_string(),
                    observed: recv.to_string(),
                    origin,
                });
            }
        }
        self.mismatches.extend(new.iter().cloned());
        new
    }
}

struct ScoreboardInner<T> {
    name: String,
    strictness: Strictness,
    interfaces: Vec<Interface<T>>,
    verdict: Option<TbResult<String>>,
}

/// Compares what monitors observe against what models expect, per interface,
/// first in first out.
pub struct Scoreboard<T>(TbObj<ScoreboardInner<T>>);

impl<T> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Scoreboard(self.0.clone())
    }
}

impl<T: PartialEq + Display + Clone + Send + 'static> Scoreboard<T> {
    pub fn new(name: &str, strictness: Strictness) -> Self {
        Self(TbObj::new(ScoreboardInner {
            name: name.to_string(),
            strictness,
            interfaces: Vec::new(),
            verdict: None,
        }))
    }

    /// Registers an interface, seeded with values expected before any model
    /// produced something (e.g. the reset value of an output).
    pub fn add_interface(&self, name: &str, initial_expected: Vec<T>) {
        self.0.with_mut(|sb| {
            if sb.interfaces.iter().any(|i| i.name == name) {
                return;
            }
            let mut iface = Interface::new(name);
            iface.expected = initial_expected.len();
            iface
                .exp_q
                .extend(initial_expected.into_iter().map(|v| (v, None)));
            sb.interfaces.push(iface);
        });
    }

    /// Feeds every transaction of `monitor` in as observed on the interface
    /// named after the monitor.
    pub fn connect(&self, monitor: &Monitor<T>) {
        self.connect_after(monitor, 0);
    }

    /// Like [`connect`](Self::connect), but ignores the first `skip`
    /// transactions, e.g. samples taken before any stimulus could reach
    /// the sampled output.
    pub fn connect_after(&self, monitor: &Monitor<T>, skip: u64) {
        let name = monitor.name().to_string();
        self.add_interface(&name, Vec::new());
        let sb = self.clone();
        monitor.add_callback(move |tr| {
            if tr.ordinal >= skip {
                sb.observe(&name, tr.value.clone());
            }
        });
    }

    pub fn expect(&self, interface: &str, value: T, origin: Option<String>) {
        self.update(interface, |i| {
            i.exp_q.push_back((value, origin));
            i.expected += 1;
        });
    }

    pub fn observe(&self, interface: &str, value: T) {
        self.update(interface, |i| {
            i.recv_q.push_back(value);
            i.observed += 1;
        });
    }

    fn update(&self, interface: &str, f: impl FnOnce(&mut Interface<T>)) {
        let failure = self.0.with_mut(|sb| {
            if sb.verdict.is_some() {
                // finalized, late arrivals don't count anymore
                return None;
            }
            let pos = match sb.interfaces.iter().position(|i| i.name == interface) {
                Some(pos) => pos,
                None => {
                    sb.interfaces.push(Interface::new(interface));
                    sb.interfaces.len() - 1
                }
            };
            let iface = &mut sb.interfaces[pos];
            f(iface);
            let new = iface.compare();
            if new.is_empty() || sb.strictness != Strictness::FailFast {
                return None;
            }
            let err = TbError::Mismatch {
                interface: interface.to_string(),
                mismatches: new,
            };
            sb.verdict = Some(Err(err.clone()));
            Some(err)
        });
        if let Some(err) = failure {
            crate::fail_test_with(err);
        }
    }

    /// The final verdict: mismatches first, then count imbalances, else a
    /// summary. Later calls return the same verdict.
    pub fn result(&self) -> TbResult<String> {
        self.0.with_mut(|sb| {
            if let Some(verdict) = &sb.verdict {
                return verdict.clone();
            }
            let verdict = sb.evaluate();
            sb.verdict = Some(verdict.clone());
            verdict
        })
    }

    pub fn passed(&self) -> bool {
        self.result().is_ok()
    }
}

impl<T> ScoreboardInner<T> {
    fn evaluate(&self) -> TbResult<String> {
        if let Some(iface) = self.interfaces.iter().find(|i| !i.mismatches.is_empty()) {
            return Err(TbError::Mismatch {
                interface: iface.name.clone(),
                mismatches: iface.mismatches.clone(),
            });
        }
        if let Some(iface) = self.interfaces.iter().find(|i| i.expected != i.observed) {
            return Err(TbError::CountImbalance {
                interface: iface.name.clone(),
                expected: iface.expected,
                observed: iface.observed,
            });
        }
        let summary: Vec<String> = self
            .interfaces
            .iter()
            .map(|i| format!("{}: {} matched", i.name, i.matched))
            .collect();
        Ok(format!("{} passed ({})", self.name, summary.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_streams_pass() {
        let sb = Scoreboard::new("sb", Strictness::CollectAll);
        sb.add_interface("out", vec![0]);
        for v in [0, 3, 5] {
            sb.observe("out", v);
        }
        sb.expect("out", 3, None);
        sb.expect("out", 5, None);
        assert_eq!(sb.result(), Ok("sb passed (out: 3 matched)".to_string()));
    }

    #[test]
    fn count_imbalance_reports_both_totals() {
        let sb = Scoreboard::new("sb", Strictness::CollectAll);
        sb.add_interface("out", vec![0]);
        sb.expect("out", 1, None);
        sb.observe("out", 0);
        assert_eq!(
            sb.result(),
            Err(TbError::CountImbalance {
                interface: "out".into(),
                expected: 2,
                observed: 1
            })
        );
    }

    #[test]
    fn mismatch_wins_over_imbalance() {
        let sb = Scoreboard::new("sb", Strictness::CollectAll);
        sb.add_interface("out", vec![]);
        sb.expect("out", 7, Some("(3, 4)".into()));
        sb.observe("out", 8);
        sb.observe("out", 9);
        match sb.result() {
            Err(TbError::Mismatch {
                interface,
                mismatches,
            }) => {
                assert_eq!(interface, "out");
                assert_eq!(
                    mismatches,
                    vec![MismatchEntry {
                        index: 0,
                        expected: "7".into(),
                        observed: "8".into(),
                        origin: Some("(3, 4)".into()),
                    }]
                );
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn verdict_is_final() {
        let sb = Scoreboard::new("sb", Strictness::CollectAll);
        sb.add_interface("out", vec![1]);
        sb.observe("out", 1);
        let first = sb.result();
        sb.observe("out", 2);
        assert_eq!(sb.result(), first);
        assert!(sb.passed());
    }

    #[test]
    fn fail_fast_freezes_first_mismatch() {
        let sb = Scoreboard::new("sb", Strictness::FailFast);
        sb.add_interface("out", vec![1, 2]);
        sb.observe("out", 5);
        sb.observe("out", 6);
        match sb.result() {
            Err(TbError::Mismatch { mismatches, .. }) => assert_eq!(mismatches.len(), 1),
            other => panic!("unexpected verdict {:?}", other),
        }
    }
}
