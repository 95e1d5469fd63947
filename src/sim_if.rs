use num_format::{Locale, ToFormattedString};
use std::{cell::RefCell, rc::Rc};

use crate::config::Config;
use crate::error::{TbError, TbResult};
use crate::signal::SimObject;

// The simulator a test talks to is installed per thread for the duration of
// one scenario.
thread_local! {
    static SIM_IF: RefCell<Option<Rc<dyn SimIf>>> = RefCell::new(None);
}

pub fn install(sim: Rc<dyn SimIf>) {
    SIM_IF.with(|s| s.replace(Some(sim)));
}

pub fn uninstall() -> Option<Rc<dyn SimIf>> {
    SIM_IF.with(|s| s.borrow_mut().take())
}

pub fn try_current() -> TbResult<Rc<dyn SimIf>> {
    SIM_IF
        .with(|s| s.borrow().clone())
        .ok_or_else(|| TbError::Signal("no simulator installed on this thread".to_string()))
}

/// The installed simulator. Triggers can only be created while a simulation
/// runs, so there is nothing sensible to fall back to.
///
/// # Panics
///
/// Panics when no simulator is installed on this thread. Code that may run
/// outside a simulation uses [`try_current`].
pub(crate) fn current() -> Rc<dyn SimIf> {
    match try_current() {
        Ok(sim) => sim,
        Err(e) => panic!("{}", e),
    }
}

/// Logs through the simulator when one is running, with the simulation time
/// in front.
pub fn log(msg: &str) {
    match try_current() {
        Ok(sim) => sim.log(msg),
        Err(_) => println!("{}", msg),
    }
}

/// Only printed when running verbose.
pub fn debug(msg: &str) {
    if Config::with_current(|c| c.verbose) {
        log(msg);
    }
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Relative delay in simulation steps.
    Time(u64),
    /// Value change on the signal with this handle.
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: u64) -> TbResult<()>;
    fn get_value(&self, obj: &SimObject) -> TbResult<u64>;
    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject>;
    fn get_root_object(&self) -> TbResult<SimObject>;
    fn get_full_name(&self, obj: &SimObject) -> TbResult<String>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&self, cb: SimCallback) -> usize;
    fn cancel_callback(&self, cb_hdl: usize);
    /// Ends the simulation after the current step.
    fn finish(&self);

    fn log(&self, msg: &str) {
        println!("{} {}", format_time_ns(self.get_sim_time("ns")), msg);
    }
    fn get_sim_time(&self, unit: &str) -> f64 {
        // does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        match time_scale(unit) {
            Ok(scale) => ldexp10(t, precision - scale),
            Err(_) => t,
        }
    }
    fn get_sim_steps(&self, time: u64, unit: &str) -> TbResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time as f64, time_scale(unit)? - precision);
        if steps % 1.0 == 0.0 {
            Ok(steps as u64)
        } else {
            Err(TbError::Signal(format!(
                "can't convert {} {} to sim steps without rounding (sim precision: {})",
                time,
                unit,
                scale_time(precision)?
            )))
        }
    }
}

pub fn format_time_ns(t: f64) -> String {
    let int = t.floor() as u64;
    let mut frac_str = format!("{:.3}", t % 1.0);
    frac_str.remove(0);
    format!("{}{}ns", int.to_formatted_string(&Locale::en), frac_str)
}

pub(crate) fn time_scale(unit: &str) -> TbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(TbError::Signal(format!("unknown time unit '{}'", unit))),
    }
}

fn scale_time(unit: i8) -> TbResult<&'static str> {
    match unit {
        -15 => Ok("fs"),
        -12 => Ok("ps"),
        -9 => Ok("ns"),
        -6 => Ok("us"),
        -3 => Ok("ms"),
        0 => Ok("sec"),
        _ => Err(TbError::Signal(format!("unsupported precision 1e{}", unit))),
    }
}

// Like math.ldexp, but base 10
fn ldexp10(frac: f64, exp: i8) -> f64 {
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
