//! # Co-processor Harness
//!
//! The reset and interrupt-bit sequencing shared by every co-processor.
//!
//! ```text
//!  PowerOnReset ──► SoftReset ──► Run ──┬──► ExitForReselect
//!                      ▲                │
//!                      └── RESET edge ──┘  (same co-processor selected)
//! ```
//!
//! Each unit of work in `Run`:
//!
//! 1. stop when [`Tube::is_running`] says so;
//! 2. call the probe's pre-exec hook, which may suspend before executing;
//!    skipped for units that run no instruction;
//! 3. run one unit on the co-processor;
//! 4. take one [`TubeSnapshot`] and act on it in fixed order:
//!    RESET (reselect or soft reset, NMI and IRQ skipped), then NMI (delivered
//!    and acknowledged), then IRQ (delivered every unit while the level is
//!    high).
//!
//! Reselection is only checked on a RESET edge.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::copro::{Coprocessor, HaltReason, UnitOutcome};
use crate::probe::{DebugProbe, ProbeAction};
use crate::tube::{Tube, TubeSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    PowerOnReset,
    SoftReset,
    Run,
    ExitForReselect,
}

/// Why [`Harness::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessExit {
    /// RESET arrived with a different co-processor selected.
    Reselect { from: usize, to: usize },
    /// The Tube asked for an orderly stop.
    Stopped,
    Halted(HaltReason),
    /// The probe asked to suspend; `address` is the next instruction.
    Suspended { address: u32 },
}

/// Instructions executed and wall time since the last soft reset.
#[derive(Debug)]
pub struct PerfCounters {
    instructions: u64,
    since: Instant,
}

impl PerfCounters {
    fn new() -> Self {
        Self {
            instructions: 0,
            since: Instant::now(),
        }
    }

    #[must_use]
    pub const fn instructions(&self) -> u64 {
        self.instructions
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }

    /// Returns the current readings and starts counting from zero.
    fn take(&mut self) -> (u64, Duration) {
        let readings = (self.instructions, self.elapsed());
        *self = Self::new();
        readings
    }
}

pub struct Harness {
    copro: Box<dyn Coprocessor>,
    probe: Option<Box<dyn DebugProbe>>,
    slot: usize,
    state: HarnessState,
    perf: PerfCounters,
}

impl Harness {
    /// `slot` is the selector value this harness was started for.
    #[must_use]
    pub fn new(copro: Box<dyn Coprocessor>, slot: usize) -> Self {
        Self {
            copro,
            probe: None,
            slot,
            state: HarnessState::PowerOnReset,
            perf: PerfCounters::new(),
        }
    }

    pub fn set_probe(&mut self, probe: Option<Box<dyn DebugProbe>>) {
        self.probe = probe;
    }

    pub fn take_probe(&mut self) -> Option<Box<dyn DebugProbe>> {
        self.probe.take()
    }

    pub fn probe_mut(&mut self) -> Option<&mut (dyn DebugProbe + 'static)> {
        self.probe.as_deref_mut()
    }

    #[must_use]
    pub const fn state(&self) -> HarnessState {
        self.state
    }

    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn coprocessor(&self) -> &dyn Coprocessor {
        self.copro.as_ref()
    }

    pub fn coprocessor_mut(&mut self) -> &mut dyn Coprocessor {
        self.copro.as_mut()
    }

    #[must_use]
    pub const fn perf(&self) -> &PerfCounters {
        &self.perf
    }

    /// Powers on and resets on first use, then runs until an exit condition.
    /// Calling it again after [`HarnessExit::Suspended`] continues where the
    /// probe stopped.
    pub fn run(&mut self, tube: &mut dyn Tube) -> HarnessExit {
        match self.state {
            HarnessState::PowerOnReset => {
                info!(slot = self.slot, "{} power on", self.copro.name());
                self.copro.power_on();
                self.soft_reset(tube);
            }
            HarnessState::SoftReset => self.soft_reset(tube),
            HarnessState::Run => {}
            HarnessState::ExitForReselect => {
                return HarnessExit::Reselect {
                    from: self.slot,
                    to: tube.snapshot().copro,
                };
            }
        }
        self.run_loop(tube)
    }

    /// Re-enters `Run` after a suspension without resetting anything.
    pub fn resume(&mut self, tube: &mut dyn Tube) -> HarnessExit {
        if self.state == HarnessState::Run {
            self.run_loop(tube)
        } else {
            self.run(tube)
        }
    }

    /// Parks a halted co-processor until the host pulses RESET or stops the
    /// run. Returns `None` after a soft reset in place, ready for
    /// [`Harness::run`].
    pub fn await_reset(&mut self, tube: &mut dyn Tube) -> Option<HarnessExit> {
        loop {
            if !tube.is_running() {
                return Some(HarnessExit::Stopped);
            }
            let snapshot = tube.snapshot();
            if snapshot.irq.reset() {
                return self.on_reset(tube, snapshot);
            }
            std::hint::spin_loop();
        }
    }

    fn run_loop(&mut self, tube: &mut dyn Tube) -> HarnessExit {
        loop {
            if !tube.is_running() {
                debug!(slot = self.slot, "tube stopped");
                return HarnessExit::Stopped;
            }

            let executes = self.copro.next_unit_executes();
            if let Some(probe) = self.probe.as_deref_mut().filter(|p| executes && p.is_enabled()) {
                let address = self.copro.next_instruction_address();
                if probe.pre_exec(self.copro.introspect(), address) == ProbeAction::Suspend {
                    return HarnessExit::Suspended { address };
                }
            }

            let probe = self.probe.as_deref_mut().filter(|p| p.is_enabled());
            let outcome = self.copro.execute(tube.port(), probe);
            if executes {
                self.perf.instructions += 1;
            }

            let snapshot = tube.snapshot();
            if snapshot.irq.reset() {
                match self.on_reset(tube, snapshot) {
                    Some(exit) => return exit,
                    None => continue,
                }
            }
            if snapshot.irq.nmi() {
                self.copro.nmi();
                tube.ack_nmi();
            }
            if snapshot.irq.irq() {
                self.copro.irq();
            }

            match outcome {
                UnitOutcome::Continue => {}
                UnitOutcome::Suspend => {
                    return HarnessExit::Suspended {
                        address: self.copro.next_instruction_address(),
                    };
                }
                UnitOutcome::Halted(reason) => {
                    warn!(slot = self.slot, "{} halted: {reason}", self.copro.name());
                    return HarnessExit::Halted(reason);
                }
            }
        }
    }

    fn on_reset(&mut self, tube: &mut dyn Tube, snapshot: TubeSnapshot) -> Option<HarnessExit> {
        if snapshot.copro != self.slot {
            info!(from = self.slot, to = snapshot.copro, "co-processor changed");
            self.state = HarnessState::ExitForReselect;
            return Some(HarnessExit::Reselect {
                from: self.slot,
                to: snapshot.copro,
            });
        }
        self.soft_reset(tube);
        None
    }

    fn soft_reset(&mut self, tube: &mut dyn Tube) {
        self.state = HarnessState::SoftReset;

        let (instructions, elapsed) = self.perf.take();
        if instructions > 0 {
            let secs = elapsed.as_secs_f64();
            #[allow(clippy::cast_precision_loss)]
            let rate = if secs > 0.0 { instructions as f64 / secs } else { 0.0 };
            info!(
                instructions,
                ?elapsed,
                "{} reset after {rate:.0} instructions/s",
                self.copro.name()
            );
        }

        self.copro.soft_reset();
        tube.wait_for_reset_release();
        self.state = HarnessState::Run;
    }
}
