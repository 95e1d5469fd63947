//! Behavioral models of the devices under test.
//!
//! Every model is a synchronous design: outputs are registered on the rising
//! edge of `i_clk` from the input values present just before the edge.

use crate::codec::{self, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: &'static str,
    pub width: u32,
    pub dir: Direction,
    pub init: u64,
}

impl Port {
    pub const fn input(name: &'static str, width: u32) -> Self {
        Port {
            name,
            width,
            dir: Direction::Input,
            init: 0,
        }
    }
    pub const fn output(name: &'static str, width: u32) -> Self {
        Port {
            name,
            width,
            dir: Direction::Output,
            init: 0,
        }
    }
    pub const fn with_init(mut self, init: u64) -> Self {
        self.init = init;
        self
    }
}

/// Access to the port values of a circuit during one clock edge. `get` sees
/// the values from before the edge; `set` schedules a non-blocking update.
pub trait PortIo {
    fn get(&self, port: &str) -> u64;
    fn set(&mut self, port: &str, value: u64);
}

pub trait Circuit: Send {
    fn name(&self) -> &str;
    fn ports(&self) -> Vec<Port>;
    fn clock(&self) -> &str {
        "i_clk"
    }
    fn on_rising_edge(&mut self, io: &mut dyn PortIo);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Multiply,
}

/// Registered two-operand arithmetic unit (`o_sum` or `o_prod`). The result
/// is truncated to the output width, as the hardware does.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    name: &'static str,
    op: Operation,
    mode: Mode,
    in_width: u32,
    out_width: u32,
}

impl Arithmetic {
    pub fn new(name: &'static str, op: Operation, mode: Mode, in_width: u32, out_width: u32) -> Self {
        Self {
            name,
            op,
            mode,
            in_width,
            out_width,
        }
    }

    pub fn output_port(&self) -> &'static str {
        match self.op {
            Operation::Add => "o_sum",
            Operation::Multiply => "o_prod",
        }
    }
}

fn truncate(value: i64, width: u32) -> u64 {
    if width >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << width) - 1)
    }
}

impl Circuit for Arithmetic {
    fn name(&self) -> &str {
        self.name
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::input("i_clk", 1),
            Port::input("i_a", self.in_width),
            Port::input("i_b", self.in_width),
            Port::output(self.output_port(), self.out_width),
        ]
    }

    fn on_rising_edge(&mut self, io: &mut dyn PortIo) {
        // port values always fit their width, decoding can't fail
        let a = codec::decode(io.get("i_a"), self.in_width, self.mode).unwrap_or_default();
        let b = codec::decode(io.get("i_b"), self.in_width, self.mode).unwrap_or_default();
        let r = match self.op {
            Operation::Add => a.wrapping_add(b),
            Operation::Multiply => a.wrapping_mul(b),
        };
        io.set(self.output_port(), truncate(r, self.out_width));
    }
}

pub fn signed_adder() -> Box<dyn Circuit> {
    Box::new(Arithmetic::new("signed_adder", Operation::Add, Mode::Signed, 8, 9))
}

pub fn unsigned_adder() -> Box<dyn Circuit> {
    Box::new(Arithmetic::new("unsigned_adder", Operation::Add, Mode::Unsigned, 8, 9))
}

pub fn signed_multiply() -> Box<dyn Circuit> {
    Box::new(Arithmetic::new("signed_multiply", Operation::Multiply, Mode::Signed, 8, 16))
}

pub fn unsigned_multiply() -> Box<dyn Circuit> {
    Box::new(Arithmetic::new("unsigned_multiply", Operation::Multiply, Mode::Unsigned, 8, 16))
}

/// Integer clock divider: `o_clk` toggles after every `ratio / 2` cycles in
/// which `i_ce` is high. Active low synchronous reset.
#[derive(Debug, Clone)]
pub struct ClockDivider {
    ratio: u32,
    counter: u32,
    level: bool,
}

impl ClockDivider {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(2),
            counter: 0,
            level: false,
        }
    }
}

pub const DEFAULT_DIVIDE_RATIO: u32 = 4;

impl Circuit for ClockDivider {
    fn name(&self) -> &str {
        "int_clk_div"
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::input("i_clk", 1),
            Port::input("i_rstn", 1).with_init(1),
            Port::input("i_ce", 1),
            Port::output("o_clk", 1),
            Port::output("counter", 32),
        ]
    }

    fn on_rising_edge(&mut self, io: &mut dyn PortIo) {
        if io.get("i_rstn") == 0 {
            self.counter = 0;
            self.level = false;
        } else if io.get("i_ce") != 0 {
            self.counter += 1;
            if self.counter >= self.ratio / 2 {
                self.counter = 0;
                self.level = !self.level;
            }
        }
        io.set("o_clk", self.level as u64);
        io.set("counter", self.counter as u64);
    }
}

pub fn int_clk_div() -> Box<dyn Circuit> {
    Box::new(ClockDivider::new(DEFAULT_DIVIDE_RATIO))
}
