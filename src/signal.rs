use crate::codec::{self, BitVector, Mode};
use crate::error::{TbError, TbResult};
use crate::sim_if;
use crate::trigger::Trigger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Bit vector of the given width.
    Int(u32),
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> String {
        sim_if::try_current()
            .and_then(|sim| sim.get_full_name(self))
            .unwrap_or_else(|_| format!("<handle {}>", self.handle))
    }

    pub fn width(&self) -> TbResult<u32> {
        match self.kind {
            ObjectKind::Int(size) => Ok(size),
            ObjectKind::Hier => Err(TbError::Signal(format!(
                "{} is a scope and has no width",
                self.name()
            ))),
        }
    }

    pub fn get_child(&self, name: &str) -> TbResult<Self> {
        let sim = sim_if::try_current()?;
        let mut child_name = sim.get_full_name(self)?;
        child_name.push('.');
        child_name.push_str(name);
        sim.get_object_by_name(&child_name)
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        sim_if::try_current()?.get_object_by_name(full_name)
    }

    pub fn get_root() -> TbResult<Self> {
        sim_if::try_current()?.get_root_object()
    }

    pub fn raw(&self) -> TbResult<u64> {
        self.width()?;
        sim_if::try_current()?.get_value(self)
    }

    pub fn u64(&self) -> TbResult<u64> {
        self.raw()
    }

    /// Current value, to be read in `mode`.
    pub fn read(&self, mode: Mode) -> TbResult<BitVector> {
        BitVector::from_raw(self.raw()?, self.width()?, mode)
    }

    pub fn int(&self, mode: Mode) -> TbResult<i64> {
        codec::decode(self.raw()?, self.width()?, mode)
    }

    pub fn bin(&self) -> TbResult<String> {
        // any width fits in two's complement
        Ok(self.read(Mode::Signed)?.bin())
    }

    pub fn set_raw(&self, val: u64) -> TbResult<()> {
        let width = self.width()?;
        // validates the raw value against the width
        BitVector::from_raw(val, width, Mode::Signed)?;
        sim_if::try_current()?.set_value(self, val)
    }

    /// Writes `val` encoded for this signal's width in `mode`.
    pub fn write(&self, val: i64, mode: Mode) -> TbResult<()> {
        let raw = codec::encode(val, self.width()?, mode)?;
        sim_if::try_current()?.set_value(self, raw)
    }

    pub fn set_bit(&self, level: bool) -> TbResult<()> {
        self.set_raw(level as u64)
    }

    pub fn set_bin(&self, val: &str) -> TbResult<()> {
        // remove '_' and 0b
        let stripped = val.replace("0b", "").replace('_', "");
        let width = self.width()?;
        if stripped.len() != width as usize {
            return Err(TbError::Signal(format!(
                "can't set {} to {}: length mismatch",
                self.name(),
                val
            )));
        }
        let raw = u64::from_str_radix(&stripped, 2).map_err(|_| {
            TbError::Signal(format!(
                "can't set {} to {}: invalid characters",
                self.name(),
                val
            ))
        })?;
        self.set_raw(raw)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(self) {
        self.rising_edge().await;
        Trigger::read_only().await;
    }
    pub async fn rising_edge_rw(self) {
        self.rising_edge().await;
        Trigger::read_write().await;
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
