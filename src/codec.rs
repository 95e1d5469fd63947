//! Conversion between raw signal bits and host integers.
//!
//! The interpretation mode is always chosen by the caller. Nothing in here
//! looks at the raw bits to guess whether a value is signed.

use crate::error::{TbError, TbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Unsigned,
    /// Two's complement.
    Signed,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Unsigned => "unsigned",
            Mode::Signed => "signed",
        }
    }

    /// Mode a reference result has to be encoded/decoded with when the
    /// device's representation of a non-negative result is plain binary.
    pub fn for_result(value: i64) -> Self {
        if value < 0 {
            Mode::Signed
        } else {
            Mode::Unsigned
        }
    }
}

pub const MAX_WIDTH: u32 = 64;

#[inline]
fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn check_width(width: u32) -> TbResult<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(TbError::Signal(format!(
            "bit width {} outside 1..={}",
            width, MAX_WIDTH
        )));
    }
    Ok(())
}

/// Representable interval for `width` bits in `mode`.
pub fn range(width: u32, mode: Mode) -> (i128, i128) {
    let w = width as i128;
    match mode {
        Mode::Unsigned => (0, (1i128 << w) - 1),
        Mode::Signed => (-(1i128 << (w - 1)), (1i128 << (w - 1)) - 1),
    }
}

// Unsigned values above i64::MAX have no host representation.
fn check_unsigned(raw: u64, width: u32) -> TbResult<()> {
    if raw > i64::MAX as u64 {
        return Err(TbError::Range {
            value: raw as i128,
            width,
            mode: Mode::Unsigned.name(),
        });
    }
    Ok(())
}

pub fn decode(raw: u64, width: u32, mode: Mode) -> TbResult<i64> {
    check_width(width)?;
    if raw & !mask(width) != 0 {
        return Err(TbError::Range {
            value: raw as i128,
            width,
            mode: "raw",
        });
    }
    Ok(match mode {
        Mode::Unsigned => {
            check_unsigned(raw, width)?;
            raw as i64
        }
        Mode::Signed => {
            let sign = 1u64 << (width - 1);
            if raw & sign != 0 {
                (raw as i128 - (1i128 << width)) as i64
            } else {
                raw as i64
            }
        }
    })
}

pub fn encode(value: i64, width: u32, mode: Mode) -> TbResult<u64> {
    check_width(width)?;
    let (lo, hi) = range(width, mode);
    let v = value as i128;
    if v < lo || v > hi {
        return Err(TbError::Range {
            value: v,
            width,
            mode: mode.name(),
        });
    }
    Ok((value as u64) & mask(width))
}

/// Raw bits plus the mode they are meant to be read with. Construction
/// guarantees the bits decode to an `i64` in that mode.
#[derive(Debug, Clone, Copy)]
pub struct BitVector {
    raw: u64,
    width: u32,
    mode: Mode,
}

impl BitVector {
    pub fn from_raw(raw: u64, width: u32, mode: Mode) -> TbResult<Self> {
        check_width(width)?;
        if raw & !mask(width) != 0 {
            return Err(TbError::Range {
                value: raw as i128,
                width,
                mode: "raw",
            });
        }
        if mode == Mode::Unsigned {
            check_unsigned(raw, width)?;
        }
        Ok(Self { raw, width, mode })
    }

    pub fn from_int(value: i64, width: u32, mode: Mode) -> TbResult<Self> {
        Ok(Self {
            raw: encode(value, width, mode)?,
            width,
            mode,
        })
    }

    pub fn bit(level: bool) -> Self {
        Self {
            raw: level as u64,
            width: 1,
            mode: Mode::Unsigned,
        }
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn to_int(&self) -> i64 {
        // width and raw were validated on construction
        match self.mode {
            Mode::Unsigned => self.raw as i64,
            Mode::Signed => {
                let sign = 1u64 << (self.width - 1);
                if self.raw & sign != 0 {
                    (self.raw as i128 - (1i128 << self.width)) as i64
                } else {
                    self.raw as i64
                }
            }
        }
    }

    /// Same bits, read differently.
    pub fn reinterpret(&self, mode: Mode) -> TbResult<Self> {
        Self::from_raw(self.raw, self.width, mode)
    }

    pub fn bin(&self) -> String {
        format!("{:0width$b}", self.raw, width = self.width as usize)
    }
}

// Bit level equality: two vectors holding the same bits are the same value
// on the wire, whichever way they are meant to be read.
impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.raw == other.raw
    }
}

impl Eq for BitVector {}

impl std::fmt::Display for BitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0b{})", self.to_int(), self.bin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_round_trip_all_8bit() {
        for x in -128i64..=127 {
            let raw = encode(x, 8, Mode::Signed).unwrap();
            assert_eq!(decode(raw, 8, Mode::Signed).unwrap(), x);
        }
    }

    #[test]
    fn signed_round_trip_wide() {
        for &w in &[1u32, 9, 16, 33, 63, 64] {
            let (lo, hi) = range(w, Mode::Signed);
            for x in [lo, lo + 1, -1, 0, hi - 1, hi] {
                if x < lo || x > hi {
                    continue;
                }
                let x = x as i64;
                let raw = encode(x, w, Mode::Signed).unwrap();
                assert_eq!(decode(raw, w, Mode::Signed).unwrap(), x, "w={}", w);
            }
        }
    }

    #[test]
    fn minus_five_in_nine_bits() {
        let raw = encode(-5, 9, Mode::Signed).unwrap();
        assert_eq!(raw, 0b1_1111_1011);
        assert_eq!(decode(raw, 9, Mode::Signed).unwrap(), -5);
        // same bits read as unsigned are not -5
        assert_eq!(decode(raw, 9, Mode::Unsigned).unwrap(), 507);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            encode(128, 8, Mode::Signed),
            Err(TbError::Range { value: 128, width: 8, .. })
        ));
        assert!(matches!(encode(-1, 8, Mode::Unsigned), Err(TbError::Range { .. })));
        assert!(matches!(encode(256, 8, Mode::Unsigned), Err(TbError::Range { .. })));
        assert!(encode(255, 8, Mode::Unsigned).is_ok());
        assert!(decode(0x100, 8, Mode::Unsigned).is_err());
    }

    #[test]
    fn zero_width_is_an_error() {
        assert!(encode(0, 0, Mode::Unsigned).is_err());
        assert!(decode(0, 65, Mode::Signed).is_err());
    }

    #[test]
    fn mode_for_result_follows_sign() {
        assert_eq!(Mode::for_result(-5), Mode::Signed);
        assert_eq!(Mode::for_result(0), Mode::Unsigned);
        assert_eq!(Mode::for_result(7), Mode::Unsigned);
    }

    #[test]
    fn bitvector_equality_ignores_mode() {
        let a = BitVector::from_int(-1, 4, Mode::Signed).unwrap();
        let b = BitVector::from_raw(0xf, 4, Mode::Unsigned).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_int(), -1);
        assert_eq!(b.to_int(), 15);
        assert_eq!(b.reinterpret(Mode::Signed).unwrap().to_int(), -1);
        assert_eq!(a.to_string(), "-1 (0b1111)");
    }

    #[test]
    fn unsigned_64_bit_values_beyond_i64_are_rejected() {
        assert!(matches!(
            decode(u64::MAX, 64, Mode::Unsigned),
            Err(TbError::Range { width: 64, mode: "unsigned", .. })
        ));
        assert_eq!(decode(i64::MAX as u64, 64, Mode::Unsigned).unwrap(), i64::MAX);
        // the same bits are fine as two's complement
        assert_eq!(decode(u64::MAX, 64, Mode::Signed).unwrap(), -1);

        assert!(BitVector::from_raw(1 << 63, 64, Mode::Unsigned).is_err());
        let min = BitVector::from_raw(1 << 63, 64, Mode::Signed).unwrap();
        assert_eq!(min.to_int(), i64::MIN);
        assert!(min.reinterpret(Mode::Unsigned).is_err());
    }
}
