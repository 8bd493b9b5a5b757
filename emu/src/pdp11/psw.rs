//! # Processor Status word
//!
//! ```text
//!  15 14 13 12 11     8 7   5 4 3 2 1 0
//! ┌─────┬─────┬────────┬─────┬─┬─┬─┬─┬─┐
//! │ Cur │Prev │ unused │ Pri │T│N│Z│V│C│
//! └─────┴─────┴────────┴─────┴─┴─┴─┴─┴─┘
//! ```
//!
//! - **Cur / Prev (15-12)**: current and previous mode, `00` kernel, `11` user
//! - **Pri (7-5)**: interrupts at or above this priority are taken
//! - **T (4)**: trace trap after every instruction
//! - **NZVC (3-0)**: condition codes

use std::fmt;

use crate::bitwise::Bits;

/// Condition codes as produced by the ALU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub n: bool,
    pub z: bool,
    pub v: bool,
    pub c: bool,
}

impl Flags {
    #[must_use]
    pub const fn bits(self) -> u16 {
        (self.n as u16) << 3 | (self.z as u16) << 2 | (self.v as u16) << 1 | self.c as u16
    }

    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self {
            n: bits & 0b1000 != 0,
            z: bits & 0b0100 != 0,
            v: bits & 0b0010 != 0,
            c: bits & 0b0001 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Kernel,
    User,
}

impl Mode {
    /// Only `00` selects kernel; supervisor does not exist on this machine.
    const fn from_bits(bits: u16) -> Self {
        if bits == 0 { Self::Kernel } else { Self::User }
    }

    const fn bits(self) -> u16 {
        match self {
            Self::Kernel => 0b00,
            Self::User => 0b11,
        }
    }

    /// Index into banked register arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Kernel => 0,
            Self::User => 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ps(u16);

impl Ps {
    pub const FLAGS_MASK: u16 = 0o17;
    pub const TRACE_BIT: u16 = 0o20;

    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn current_mode(self) -> Mode {
        Mode::from_bits(self.0.get_bits(14..=15))
    }

    #[must_use]
    pub fn previous_mode(self) -> Mode {
        Mode::from_bits(self.0.get_bits(12..=13))
    }

    #[must_use]
    pub const fn with_current_mode(self, mode: Mode) -> Self {
        Self((self.0 & !0o140_000) | (mode.bits() << 14))
    }

    #[must_use]
    pub const fn with_previous_mode(self, mode: Mode) -> Self {
        Self((self.0 & !0o030_000) | (mode.bits() << 12))
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn priority(self) -> u8 {
        self.0.get_bits(5..=7) as u8
    }

    #[must_use]
    pub const fn with_priority(self, priority: u8) -> Self {
        Self((self.0 & !0o340) | ((priority as u16 & 7) << 5))
    }

    #[must_use]
    pub fn trace(self) -> bool {
        self.0.get_bit(4)
    }

    #[must_use]
    pub const fn flags(self) -> Flags {
        Flags::from_bits(self.0)
    }

    #[must_use]
    pub const fn with_flags(self, flags: Flags) -> Self {
        Self((self.0 & !Self::FLAGS_MASK) | flags.bits())
    }
}

/// `KU 7 T.Z.C`: current and previous mode, priority, then TNZVC with `.`
/// for clear bits.
impl fmt::Display for Ps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = |m: Mode| match m {
            Mode::Kernel => 'K',
            Mode::User => 'U',
        };
        let bit = |set: bool, c: char| if set { c } else { '.' };
        let flags = self.flags();
        write!(
            f,
            "{}{} {} {}{}{}{}{}",
            mode(self.current_mode()),
            mode(self.previous_mode()),
            self.priority(),
            bit(self.trace(), 'T'),
            bit(flags.n, 'N'),
            bit(flags.z, 'Z'),
            bit(flags.v, 'V'),
            bit(flags.c, 'C'),
        )
    }
}
