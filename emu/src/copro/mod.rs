//! # Co-processors
//!
//! Every emulated CPU plugs into the same [`harness::Harness`] through the
//! [`Coprocessor`] trait. The harness owns the reset and interrupt-bit
//! sequencing; an implementation only has to run one unit of work at a time
//! and accept NMI/IRQ deliveries.

pub mod harness;
pub mod registry;

use std::fmt;

use crate::probe::{Introspect, ProbeSlot};
use crate::tube::ParasitePort;

/// Why a co-processor stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The guest executed a privileged halt instruction.
    Halt { address: u32 },
    /// A trap was raised while entering a trap handler.
    DoubleFault { vector: u32 },
    /// More pending interrupt sources than the table can hold.
    InterruptTableFull,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt { address } => write!(f, "halt at {address:#o}"),
            Self::DoubleFault { vector } => write!(f, "double fault through vector {vector:#o}"),
            Self::InterruptTableFull => write!(f, "interrupt table full"),
        }
    }
}

/// Result of a single unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Continue,
    /// The access hook asked to stop after this unit.
    Suspend,
    Halted(HaltReason),
}

pub trait Coprocessor {
    fn name(&self) -> &'static str;

    /// Once per harness: clears memory.
    fn power_on(&mut self);

    /// Reinstalls the ROM and loads power-up register values.
    fn soft_reset(&mut self);

    /// Runs one unit of work. A halted co-processor does nothing and reports
    /// the halt again.
    fn execute(&mut self, port: &mut dyn ParasitePort, probe: ProbeSlot<'_>) -> UnitOutcome;

    /// Queues the architecture's non-maskable interrupt.
    fn nmi(&mut self);

    /// Queues (or refreshes) the architecture's level-sensitive interrupt.
    fn irq(&mut self);

    /// Whether the next [`Coprocessor::execute`] runs an instruction rather
    /// than idling or taking an interrupt.
    fn next_unit_executes(&self) -> bool;

    fn next_instruction_address(&self) -> u32;

    fn introspect(&mut self) -> &mut dyn Introspect;
}
