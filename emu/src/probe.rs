//! # Debug Probe contract
//!
//! The harness and the interpreters yield to an optional probe at two points:
//!
//! - **pre-exec**: right before an instruction executes, with its address
//!   and mutable access to the CPU through [`Introspect`]. Units that only
//!   idle or take an interrupt do not call it;
//! - **access**: on every guest memory or IO access.
//!
//! Both hooks are skipped when no probe is attached or when it reports
//! itself disabled. A hook can only ask the harness to suspend; the core
//! never depends on anything else the probe does.
//!
//! [`Introspect`] is the per-architecture half: register table, value
//! formatting, disassembly, raw memory access. It is usable on its own,
//! independent of the run loop.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use tracing::{debug, info};

use crate::error::Result;

/// What a hook wants the harness to do next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAction {
    #[default]
    Continue,
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Word,
}

/// A guest memory or IO access as seen by the access hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub address: u32,
    pub value: u32,
    pub width: AccessWidth,
    pub kind: AccessKind,
    /// The access went to the Tube instead of memory.
    pub io: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub bits: u8,
}

/// Architecture-side introspection.
pub trait Introspect {
    fn registers(&self) -> &'static [RegisterInfo];

    fn register(&self, index: usize) -> Option<u32>;

    fn set_register(&mut self, index: usize, value: u32) -> Result<()>;

    /// Canonical display form of `value` for register `index`.
    fn format_register(&self, index: usize, value: u32) -> Option<String>;

    /// Inverse of [`Introspect::format_register`].
    fn parse_register(&self, index: usize, text: &str) -> Result<u32>;

    /// Disassembles the instruction at `address`, returning the text and the
    /// address of the following instruction.
    fn disassemble(&self, address: u32) -> (String, u32);

    /// Raw memory access; never touches the Tube.
    fn read_memory(&self, address: u32) -> u8;

    fn write_memory(&mut self, address: u32, value: u8);

    /// Separate IO space, for architectures that have one.
    fn read_io(&mut self, _address: u32) -> Option<u8> {
        None
    }

    fn write_io(&mut self, _address: u32, _value: u8) -> bool {
        false
    }

    fn current_instruction_address(&self) -> u32;

    fn trap_names(&self) -> &'static [&'static str];

    fn register_index(&self, name: &str) -> Option<usize> {
        self.registers()
            .iter()
            .position(|info| info.name.eq_ignore_ascii_case(name))
    }
}

/// The hooks a probe exposes to the run loop.
pub trait DebugProbe {
    fn is_enabled(&self) -> bool;

    fn pre_exec(&mut self, target: &mut dyn Introspect, address: u32) -> ProbeAction;

    fn on_access(&mut self, _access: &Access) -> ProbeAction {
        ProbeAction::Continue
    }

    fn on_trap(&mut self, _name: &'static str) {}
}

/// What the interpreters receive for the access hook: already filtered, so
/// `Some` means "enabled".
pub type ProbeSlot<'a> = Option<&'a mut (dyn DebugProbe + 'static)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    Read,
    Write,
    ReadWrite,
}

impl Watch {
    const fn matches(self, kind: AccessKind) -> bool {
        matches!(
            (self, kind),
            (Self::ReadWrite, _) | (Self::Read, AccessKind::Read) | (Self::Write, AccessKind::Write)
        )
    }
}

/// Why the probe last asked to suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Breakpoint(u32),
    Watchpoint { address: u32, kind: AccessKind },
}

/// Addresses print in octal, like the rest of the debugger output.
impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breakpoint(address) => write!(f, "breakpoint at {address:06o}"),
            Self::Watchpoint { address, kind } => {
                let kind = match kind {
                    AccessKind::Read => "read",
                    AccessKind::Write => "write",
                };
                write!(f, "{kind} watchpoint at {address:06o}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub address: u32,
    pub text: String,
}

/// Breakpoints, watchpoints and a bounded execution history.
pub struct Breakpoints {
    enabled: bool,
    breakpoints: BTreeSet<u32>,
    watchpoints: BTreeMap<u32, Watch>,
    history: VecDeque<HistoryEntry>,
    history_capacity: usize,
    traps: BTreeMap<&'static str, u64>,
    last_hit: Option<Hit>,
    // The breakpoint that suspended us fires again on resume otherwise.
    skip_once: Option<u32>,
}

impl Breakpoints {
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            enabled: true,
            breakpoints: BTreeSet::new(),
            watchpoints: BTreeMap::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            traps: BTreeMap::new(),
            last_hit: None,
            skip_once: None,
        }
    }

    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn add_breakpoint(&mut self, address: u32) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: u32) {
        self.breakpoints.remove(&address);
    }

    pub fn add_watchpoint(&mut self, address: u32, watch: Watch) {
        self.watchpoints.insert(address, watch);
    }

    pub fn remove_watchpoint(&mut self, address: u32) {
        self.watchpoints.remove(&address);
    }

    #[must_use]
    pub const fn last_hit(&self) -> Option<Hit> {
        self.last_hit
    }

    /// Executed instructions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    #[must_use]
    pub fn trap_count(&self, name: &str) -> u64 {
        self.traps.get(name).copied().unwrap_or(0)
    }

    fn record(&mut self, entry: HistoryEntry) {
        if self.history_capacity == 0 {
            return;
        }
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}

impl DebugProbe for Breakpoints {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn pre_exec(&mut self, target: &mut dyn Introspect, address: u32) -> ProbeAction {
        if self.skip_once.take() == Some(address) {
            // resuming from this very breakpoint
        } else if self.breakpoints.contains(&address) {
            let hit = Hit::Breakpoint(address);
            info!("{hit}");
            self.last_hit = Some(hit);
            self.skip_once = Some(address);
            return ProbeAction::Suspend;
        }

        if self.history_capacity > 0 {
            let (text, _) = target.disassemble(address);
            self.record(HistoryEntry { address, text });
        }
        ProbeAction::Continue
    }

    fn on_access(&mut self, access: &Access) -> ProbeAction {
        match self.watchpoints.get(&access.address) {
            Some(watch) if watch.matches(access.kind) => {
                let hit = Hit::Watchpoint {
                    address: access.address,
                    kind: access.kind,
                };
                info!("{hit}, value {:o}", access.value);
                self.last_hit = Some(hit);
                ProbeAction::Suspend
            }
            _ => ProbeAction::Continue,
        }
    }

    fn on_trap(&mut self, name: &'static str) {
        debug!("trap: {name}");
        *self.traps.entry(name).or_default() += 1;
    }
}
