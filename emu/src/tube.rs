//! # Tube Signal Source
//!
//! The Tube is the hardware boundary between the BBC Micro (the host) and the
//! second processor (the parasite). Seen from an emulated CPU it offers:
//!
//! - eight parasite registers, addressed by a 3-bit channel index
//!   (even channels are status, odd channels are data for R1..R4);
//! - a latched interrupt-bit register with three flags:
//!
//! ```text
//!  31                3   2   1   0
//! ┌───────────────────┬───┬───┬───┐
//! │     unused        │IRQ│NMI│RST│
//! └───────────────────┴───┴───┴───┘
//! ```
//!
//! RESET and NMI are edges, latched until the consumer acknowledges them.
//! IRQ follows the host's line level.
//!
//! [`TubeSignals`] holds that register and the current co-processor selector
//! as atomics so the side that raises them (the host link, an interrupt
//! handler, a test) can live on another thread. The harness reads them once
//! per unit of work through [`Tube::snapshot`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use tracing::{debug, trace};

pub const RESET_BIT: u32 = 0b001;
pub const NMI_BIT: u32 = 0b010;
pub const IRQ_BIT: u32 = 0b100;

/// Status register bits of the parasite side.
pub const STATUS_DATA_AVAILABLE: u8 = 0x80;
pub const STATUS_NOT_FULL: u8 = 0x40;

/// A snapshot of the interrupt-bit register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IrqBits(u32);

impl IrqBits {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw & (RESET_BIT | NMI_BIT | IRQ_BIT))
    }

    #[must_use]
    pub const fn reset(self) -> bool {
        self.0 & RESET_BIT != 0
    }

    #[must_use]
    pub const fn nmi(self) -> bool {
        self.0 & NMI_BIT != 0
    }

    #[must_use]
    pub const fn irq(self) -> bool {
        self.0 & IRQ_BIT != 0
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Everything the harness reads from the Tube in one unit of work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TubeSnapshot {
    pub irq: IrqBits,
    /// Currently selected co-processor slot.
    pub copro: usize,
}

/// Shared signal state. One instance per board, shared by `Arc`.
#[derive(Debug, Default)]
pub struct TubeSignals {
    irq: AtomicU32,
    copro: AtomicUsize,
    reset_line: AtomicBool,
    stopped: AtomicBool,
}

impl TubeSignals {
    #[must_use]
    pub fn new(copro: usize) -> Self {
        Self {
            copro: AtomicUsize::new(copro),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> TubeSnapshot {
        TubeSnapshot {
            irq: IrqBits::new(self.irq.load(Ordering::Acquire)),
            copro: self.copro.load(Ordering::Acquire),
        }
    }

    pub fn raise(&self, bits: u32) {
        self.irq.fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear(&self, bits: u32) {
        self.irq.fetch_and(!bits, Ordering::AcqRel);
    }

    pub fn set_irq_level(&self, level: bool) {
        if level {
            self.raise(IRQ_BIT);
        } else {
            self.clear(IRQ_BIT);
        }
    }

    /// Drives the reset line active and latches the RESET edge.
    pub fn assert_reset(&self) {
        self.reset_line.store(true, Ordering::Release);
        self.raise(RESET_BIT);
    }

    pub fn release_reset(&self) {
        self.reset_line.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn reset_line_active(&self) -> bool {
        self.reset_line.load(Ordering::Acquire)
    }

    pub fn select(&self, slot: usize) {
        self.copro.store(slot, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Parasite-side register access, used by interpreters for the addresses
/// that fall in their Tube window.
pub trait ParasitePort {
    fn read(&mut self, channel: u8) -> u8;
    fn write(&mut self, channel: u8, value: u8);
}

/// The full Tube interface consumed by the harness.
pub trait Tube: ParasitePort {
    /// The parasite half, handed to the interpreter for each unit of work.
    fn port(&mut self) -> &mut dyn ParasitePort;

    /// Reads the interrupt bits and selector once.
    fn snapshot(&self) -> TubeSnapshot;

    /// Clears the latched NMI edge.
    fn ack_nmi(&mut self);

    /// Blocks until the host releases the reset line, then clears the
    /// latched RESET edge. There is no timeout.
    fn wait_for_reset_release(&mut self);

    /// Polled once per instruction; `false` asks for an orderly stop.
    fn is_running(&mut self) -> bool;
}

/// Host-side actions for [`LoopbackTube`] scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Reset,
    ReleaseReset,
    Nmi,
    Irq(bool),
    Select(usize),
    Send { register: u8, value: u8 },
    Stop,
}

/// An in-process Tube: the host side is a script of [`HostEvent`]s keyed by
/// run-predicate poll count, plus byte queues per register.
pub struct LoopbackTube {
    signals: Arc<TubeSignals>,
    to_parasite: [VecDeque<u8>; 4],
    from_parasite: [Vec<u8>; 4],
    script: BTreeMap<u64, Vec<HostEvent>>,
    polls: u64,
    poll_limit: Option<u64>,
    nmi_acks: u64,
}

impl LoopbackTube {
    #[must_use]
    pub fn new(copro: usize) -> Self {
        Self::with_signals(Arc::new(TubeSignals::new(copro)))
    }

    #[must_use]
    pub fn with_signals(signals: Arc<TubeSignals>) -> Self {
        Self {
            signals,
            to_parasite: Default::default(),
            from_parasite: Default::default(),
            script: BTreeMap::new(),
            polls: 0,
            poll_limit: None,
            nmi_acks: 0,
        }
    }

    #[must_use]
    pub fn signals(&self) -> Arc<TubeSignals> {
        Arc::clone(&self.signals)
    }

    /// Stop after `limit` polls of [`Tube::is_running`].
    pub const fn set_poll_limit(&mut self, limit: Option<u64>) {
        self.poll_limit = limit;
    }

    /// Applies `event` when the run predicate has been polled `at_poll`
    /// times.
    pub fn schedule(&mut self, at_poll: u64, event: HostEvent) {
        self.script.entry(at_poll).or_default().push(event);
    }

    /// Queues a byte from the host into data register `register` (1..=4).
    pub fn send(&mut self, register: u8, value: u8) {
        if let Some(queue) = register_index(register).and_then(|i| self.to_parasite.get_mut(i)) {
            queue.push_back(value);
        }
    }

    /// Bytes the parasite wrote to data register `register` (1..=4).
    #[must_use]
    pub fn received(&self, register: u8) -> &[u8] {
        register_index(register)
            .and_then(|i| self.from_parasite.get(i))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn take_received(&mut self, register: u8) -> Vec<u8> {
        register_index(register)
            .and_then(|i| self.from_parasite.get_mut(i))
            .map(std::mem::take)
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn polls(&self) -> u64 {
        self.polls
    }

    #[must_use]
    pub const fn nmi_acks(&self) -> u64 {
        self.nmi_acks
    }

    fn apply(&mut self, event: HostEvent) {
        debug!(?event, poll = self.polls, "host event");
        match event {
            HostEvent::Reset => self.signals.assert_reset(),
            HostEvent::ReleaseReset => self.signals.release_reset(),
            HostEvent::Nmi => self.signals.raise(NMI_BIT),
            HostEvent::Irq(level) => self.signals.set_irq_level(level),
            HostEvent::Select(slot) => self.signals.select(slot),
            HostEvent::Send { register, value } => self.send(register, value),
            HostEvent::Stop => self.signals.stop(),
        }
    }

    fn apply_due(&mut self) {
        while let Some(entry) = self.script.first_entry() {
            if *entry.key() > self.polls {
                break;
            }
            for event in entry.remove() {
                self.apply(event);
            }
        }
    }

    /// Fast-forwards to the next scripted poll, if any. Returns `false` when
    /// the script is exhausted.
    fn advance_script(&mut self) -> bool {
        match self.script.pop_first() {
            Some((at, events)) => {
                self.polls = self.polls.max(at);
                for event in events {
                    self.apply(event);
                }
                true
            }
            None => false,
        }
    }
}

/// Channels 0..=7 map to R1..R4, two channels per register.
const fn register_index(register: u8) -> Option<usize> {
    match register {
        1..=4 => Some((register - 1) as usize),
        _ => None,
    }
}

impl ParasitePort for LoopbackTube {
    fn read(&mut self, channel: u8) -> u8 {
        let register = usize::from((channel & 7) >> 1);
        if channel & 1 == 0 {
            let available = if self.to_parasite[register].is_empty() {
                0
            } else {
                STATUS_DATA_AVAILABLE
            };
            available | STATUS_NOT_FULL
        } else {
            let value = self.to_parasite[register].pop_front().unwrap_or(0);
            trace!(register = register + 1, value, "parasite read");
            value
        }
    }

    fn write(&mut self, channel: u8, value: u8) {
        let register = usize::from((channel & 7) >> 1);
        if channel & 1 == 0 {
            trace!(register = register + 1, value, "status write ignored");
        } else {
            trace!(register = register + 1, value, "parasite write");
            self.from_parasite[register].push(value);
        }
    }
}

impl Tube for LoopbackTube {
    fn port(&mut self) -> &mut dyn ParasitePort {
        self
    }

    fn snapshot(&self) -> TubeSnapshot {
        self.signals.snapshot()
    }

    fn ack_nmi(&mut self) {
        self.nmi_acks += 1;
        self.signals.clear(NMI_BIT);
    }

    fn wait_for_reset_release(&mut self) {
        while self.signals.reset_line_active() {
            if !self.advance_script() {
                std::hint::spin_loop();
            }
        }
        self.signals.clear(RESET_BIT);
    }

    fn is_running(&mut self) -> bool {
        self.polls += 1;
        self.apply_due();
        let within_limit = self.poll_limit.is_none_or(|limit| self.polls <= limit);
        within_limit && !self.signals.is_stopped()
    }
}
