//! # PDP-11 co-processor
//!
//! A 16-bit PDP-11 with kernel and user modes, no memory management and no
//! floating point. The whole 64 KiB address space is RAM except for the
//! Tube window at `0xFFF0..=0xFFFF`; the client ROM is copied to
//! [`rom::ROM_BASE`] on every soft reset and stays writable.
//!
//! | Source | Vector | Priority |
//! |--------|--------|----------|
//! | NMI    | `0x80` | 7        |
//! | IRQ    | `0x84` | 6        |

pub mod alu;
pub mod bus;
pub mod cpu;
pub mod disasm;
pub mod instruction;
pub mod introspect;
pub mod itab;
mod operand;
pub mod psw;
pub mod registers;
pub mod rom;
pub mod trap;

use tracing::{debug, info};

use crate::config::Pdp11Config;
use crate::copro::{Coprocessor, UnitOutcome};
use crate::error::Result;
use crate::memory::Memory;
use crate::pdp11::bus::Bus;
use crate::pdp11::cpu::Cpu;
use crate::pdp11::psw::Ps;
use crate::pdp11::trap::{IRQ_PRIORITY, IRQ_VECTOR, NMI_PRIORITY, NMI_VECTOR};
use crate::probe::{Introspect, ProbeSlot};
use crate::tube::ParasitePort;

pub const MEMORY_SIZE: usize = 0x1_0000;

pub struct Pdp11 {
    cpu: Cpu,
    memory: Memory,
    rom: Vec<u8>,
    allow_unaligned: bool,
}

impl Pdp11 {
    /// Uses the built-in boot stub when `rom` is `None`.
    pub fn new(rom: Option<Vec<u8>>, allow_unaligned: bool) -> Result<Self> {
        let rom = match rom {
            Some(image) => rom::validate(image)?,
            None => rom::boot_stub(),
        };
        Ok(Self {
            cpu: Cpu::default(),
            memory: Memory::new(MEMORY_SIZE),
            rom,
            allow_unaligned,
        })
    }

    /// `rom` is the already loaded image from [`Pdp11Config::load_rom`].
    pub fn from_config(config: &Pdp11Config, rom: Option<Vec<u8>>) -> Result<Self> {
        Self::new(rom, config.allow_unaligned)
    }

    #[must_use]
    pub const fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub const fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    pub const fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    #[must_use]
    pub const fn allow_unaligned(&self) -> bool {
        self.allow_unaligned
    }
}

impl Coprocessor for Pdp11 {
    fn name(&self) -> &'static str {
        "PDP-11"
    }

    fn power_on(&mut self) {
        info!("PDP-11 power on, {} KiB", MEMORY_SIZE / 1024);
        self.memory.clear();
    }

    fn soft_reset(&mut self) {
        let copied = self.memory.load(usize::from(rom::ROM_BASE), &self.rom);
        debug!("ROM reinstalled, {copied} bytes at {:06o}", rom::ROM_BASE);
        self.cpu.reset(rom::ROM_BASE, Ps::new(rom::RESET_PS));
    }

    fn execute(&mut self, port: &mut dyn ParasitePort, probe: ProbeSlot<'_>) -> UnitOutcome {
        let mut bus = Bus::new(&mut self.memory, port, probe, self.allow_unaligned);
        match self.cpu.step(&mut bus) {
            UnitOutcome::Continue if bus.suspend_requested() => UnitOutcome::Suspend,
            outcome => outcome,
        }
    }

    fn nmi(&mut self) {
        self.cpu.interrupt(NMI_VECTOR, NMI_PRIORITY);
    }

    fn irq(&mut self) {
        self.cpu.interrupt(IRQ_VECTOR, IRQ_PRIORITY);
    }

    fn next_unit_executes(&self) -> bool {
        self.cpu.next_step_executes()
    }

    fn next_instruction_address(&self) -> u32 {
        self.cpu.registers().pc().into()
    }

    fn introspect(&mut self) -> &mut dyn Introspect {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copro::harness::{Harness, HarnessExit};
    use crate::copro::HaltReason;
    use crate::probe::{Breakpoints, DebugProbe};
    use crate::tube::{LoopbackTube, Tube};
    use pretty_assertions::assert_eq;

    fn booted(rom: Option<Vec<u8>>) -> Pdp11 {
        let mut pdp11 = Pdp11::new(rom, false).unwrap();
        pdp11.power_on();
        pdp11.soft_reset();
        pdp11
    }

    fn run(pdp11: &mut Pdp11, tube: &mut LoopbackTube, units: usize) {
        for _ in 0..units {
            pdp11.execute(tube.port(), None);
        }
    }

    #[test]
    fn reset_state() {
        let pdp11 = booted(None);
        let regs = pdp11.cpu().registers();
        assert_eq!(regs.pc(), 0o174000);
        assert_eq!(regs.ps().raw(), 0o340);
        assert_eq!(pdp11.memory().slice(0xF800, 2), &[0o306, 0o025]);
    }

    #[test]
    fn soft_reset_is_idempotent() {
        let mut pdp11 = booted(None);
        let mut tube = LoopbackTube::new(0);
        run(&mut pdp11, &mut tube, 20);
        pdp11.memory_mut().write_word(0xF800, 0);

        pdp11.soft_reset();
        let cpu = pdp11.cpu().clone();
        let memory = pdp11.memory().clone();
        pdp11.soft_reset();
        assert_eq!(pdp11.cpu(), &cpu);
        assert!(pdp11.memory() == &memory);
        assert_eq!(pdp11.memory().read_word(0xF800), 0o012706);
    }

    #[test]
    fn load_absolute_into_r0() {
        let mut pdp11 = booted(None);
        // MOV @#1234,R0 at the reset PC
        pdp11.memory_mut().write_word(0xF800, 0o013700);
        pdp11.memory_mut().write_word(0xF802, 0x1234);
        pdp11.memory_mut().write_word(0x1234, 0xBEEF);
        let mut tube = LoopbackTube::new(0);

        assert_eq!(pdp11.execute(tube.port(), None), UnitOutcome::Continue);
        assert_eq!(pdp11.cpu().registers().pc(), 0xF804);
        assert_eq!(pdp11.cpu().registers().get(0), 0xBEEF);
    }

    #[test]
    fn tube_writes_bypass_memory() {
        // MOV #125,@#177762 ; MOVB @#177766,R1 ; HALT
        let image = [0o012737, 0o125, 0o177762, 0o113701, 0o177766, 0o000000]
            .iter()
            .flat_map(|w: &u16| w.to_le_bytes())
            .collect();
        let mut pdp11 = booted(Some(image));
        pdp11.memory_mut().write_word(0xFFF2, 0xA5A5);
        let mut tube = LoopbackTube::new(0);
        tube.send(2, 0x99);

        run(&mut pdp11, &mut tube, 2);
        assert_eq!(
            pdp11.execute(tube.port(), None),
            UnitOutcome::Halted(HaltReason::Halt { address: 0xF80A })
        );
        assert_eq!(tube.received(1), &[0o125]);
        assert_eq!(pdp11.memory().read_word(0xFFF2), 0xA5A5);
        assert_eq!(pdp11.cpu().registers().get(1), 0xFF99);
    }

    #[test]
    fn oversized_rom_fails() {
        assert!(Pdp11::new(Some(vec![0; 0x801]), false).is_err());
    }

    #[test]
    fn boot_stub_prints_banner_then_waits() {
        let mut tube = LoopbackTube::new(0);
        tube.set_poll_limit(Some(500));
        let mut harness = Harness::new(Box::new(booted(None)), 0);

        assert_eq!(harness.run(&mut tube), HarnessExit::Stopped);
        assert_eq!(tube.received(1), b"\r\nPDP-11 TUBE\r\n");
    }

    #[test]
    fn nmi_wakes_boot_stub() {
        let mut pdp11 = booted(None);
        // handler at 0o1000: MOVB #41,@#177762 ; RTI
        let memory = pdp11.memory_mut();
        memory.write_word(0x80, 0o1000);
        memory.write_word(0x82, 0o340);
        for (i, word) in [0o112737u16, 0o41, 0o177762, 0o000002].iter().enumerate() {
            memory.write_word(0o1000 + 2 * i, *word);
        }
        let mut tube = LoopbackTube::new(0);
        run(&mut pdp11, &mut tube, 200);
        assert!(pdp11.cpu().is_waiting());

        pdp11.nmi();
        run(&mut pdp11, &mut tube, 3);
        assert_eq!(tube.received(1).last(), Some(&b'!'));
        assert_eq!(pdp11.cpu().registers().pc(), 0o174034);
        run(&mut pdp11, &mut tube, 2);
        assert!(pdp11.cpu().is_waiting());
    }

    #[test]
    fn breakpoint_in_rom() {
        let mut tube = LoopbackTube::new(0);
        let mut probe = Breakpoints::new(8);
        probe.set_enabled(true);
        probe.add_breakpoint(0o174032);
        let mut harness = Harness::new(Box::new(booted(None)), 0);
        harness.set_probe(Some(Box::new(probe) as Box<dyn DebugProbe>));

        assert_eq!(
            harness.run(&mut tube),
            HarnessExit::Suspended { address: 0o174032 }
        );
        assert_eq!(tube.received(1), b"\r\nPDP-11 TUBE\r\n");
        let target = harness.coprocessor_mut().introspect();
        assert_eq!(target.disassemble(0o174032).0, "WAIT");
    }

    #[test]
    fn breakpoint_after_wait_stays_quiet_while_idle() {
        let mut tube = LoopbackTube::new(0);
        tube.set_poll_limit(Some(2000));
        let mut probe = Breakpoints::new(8);
        probe.add_breakpoint(0o174034);
        let mut harness = Harness::new(Box::new(booted(None)), 0);
        harness.set_probe(Some(Box::new(probe) as Box<dyn DebugProbe>));

        // the WAIT never ends, so the BR behind it never runs
        assert_eq!(harness.run(&mut tube), HarnessExit::Stopped);
        assert_eq!(harness.coprocessor().next_instruction_address(), 0o174034);
    }

    #[test]
    fn idle_units_are_not_counted_as_instructions() {
        // WAIT ; HALT
        let image = [0o000001u16, 0o000000]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        let mut tube = LoopbackTube::new(0);
        tube.set_poll_limit(Some(50));
        let mut harness = Harness::new(Box::new(booted(Some(image))), 0);

        assert_eq!(harness.run(&mut tube), HarnessExit::Stopped);
        assert_eq!(harness.perf().instructions(), 1);
    }
}
