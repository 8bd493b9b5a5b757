use std::fmt;

/// NMI from the Tube: highest priority.
pub const NMI_VECTOR: u16 = 0x80;
pub const NMI_PRIORITY: u8 = 7;

/// Level-sensitive IRQ from the Tube.
pub const IRQ_VECTOR: u16 = 0x84;
pub const IRQ_PRIORITY: u8 = 6;

/// A synchronous condition raised while executing an instruction. Returned
/// as `Err` through decode and operand resolution and taken by the step
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Odd address for a word access.
    BusError,
    Illegal,
    Bpt,
    /// T bit set in the PS once the instruction has completed.
    Trace,
    Iot,
    Emt,
    Trap,
}

pub const TRAP_NAMES: &[&str] = &[
    "bus error",
    "illegal instruction",
    "BPT",
    "trace",
    "IOT",
    "EMT",
    "TRAP",
];

impl Trap {
    #[must_use]
    pub const fn vector(self) -> u16 {
        match self {
            Self::BusError => 0o4,
            Self::Illegal => 0o10,
            Self::Bpt | Self::Trace => 0o14,
            Self::Iot => 0o20,
            Self::Emt => 0o30,
            Self::Trap => 0o34,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        TRAP_NAMES[self as usize]
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (vector {:o})", self.name(), self.vector())
    }
}
