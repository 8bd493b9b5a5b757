//! # PDP-11 execution
//!
//! One call to [`Cpu::step`] is one unit of work, in this order:
//!
//! 1. a pending interrupt at or above the PS priority is taken, and that is
//!    the whole unit;
//! 2. a CPU parked by `WAIT` does nothing;
//! 3. otherwise one instruction is fetched, decoded and executed.
//!
//! Traps raised anywhere in 3 come back as `Err(Trap)` and are taken before
//! the step returns. A trap raised while entering a trap handler halts the
//! CPU instead.

use tracing::{debug, error, trace, warn};

use crate::bitwise::Bits;
use crate::copro::{HaltReason, UnitOutcome};
use crate::pdp11::alu::{self, Width};
use crate::pdp11::bus::Bus;
use crate::pdp11::instruction::{
    Condition, DoubleOp, Instruction, Operand, PreviousSpace, RegisterOp, SingleOp,
};
use crate::pdp11::itab::{InsertError, Interrupt, InterruptTable};
use crate::pdp11::operand::Location;
use crate::pdp11::psw::{Flags, Mode, Ps};
use crate::pdp11::registers::Registers;
use crate::pdp11::trap::Trap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    #[default]
    Running,
    /// An instruction raised a trap that has not been entered yet.
    TrapPending,
    /// Pushing PS/PC and loading the vector.
    ServicingTrap,
    Halted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cpu {
    pub(super) regs: Registers,
    itab: InterruptTable,
    state: CpuState,
    halt: Option<HaltReason>,
    waiting: bool,
    instruction_address: u16,
    suppress_trace: bool,
}

impl Cpu {
    /// Power-up state: registers cleared, no pending interrupts, running.
    pub fn reset(&mut self, pc: u16, ps: Ps) {
        *self = Self {
            regs: Registers::new(pc, ps),
            instruction_address: pc,
            ..Self::default()
        };
    }

    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.regs
    }

    pub const fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub const fn interrupts(&self) -> &InterruptTable {
        &self.itab
    }

    #[must_use]
    pub const fn state(&self) -> CpuState {
        self.state
    }

    #[must_use]
    pub const fn halt_reason(&self) -> Option<HaltReason> {
        self.halt
    }

    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Address of the instruction being (or last) executed.
    #[must_use]
    pub const fn instruction_address(&self) -> u16 {
        self.instruction_address
    }

    /// False when the next [`Cpu::step`] runs no instruction: halted, taking
    /// an interrupt, or parked by `WAIT`.
    #[must_use]
    pub fn next_step_executes(&self) -> bool {
        self.halt.is_none() && self.serviceable().is_none() && !self.waiting
    }

    /// Queues an external interrupt.
    pub fn interrupt(&mut self, vector: u16, priority: u8) {
        match self.itab.insert(vector, priority) {
            Ok(()) => trace!("interrupt {vector:o} pending at priority {priority}"),
            Err(InsertError::Full) => {
                error!("interrupt table full, cannot queue vector {vector:o}");
                self.stop(HaltReason::InterruptTableFull);
            }
            Err(InsertError::InvalidVector(vector)) => {
                error!("ignoring interrupt with invalid vector {vector:o}");
            }
        }
    }

    pub fn step(&mut self, bus: &mut Bus) -> UnitOutcome {
        if let Some(reason) = self.halt {
            return UnitOutcome::Halted(reason);
        }
        if self.service_interrupt(bus) || self.waiting {
            return self.outcome();
        }

        self.instruction_address = self.regs.pc();
        match self.execute_next(bus) {
            Ok(()) => {
                let rtt = std::mem::take(&mut self.suppress_trace);
                if self.regs.ps().trace() && !rtt && self.halt.is_none() {
                    self.take_trap(bus, Trap::Trace);
                }
            }
            Err(trap) => self.take_trap(bus, trap),
        }
        self.outcome()
    }

    const fn outcome(&self) -> UnitOutcome {
        match self.halt {
            Some(reason) => UnitOutcome::Halted(reason),
            None => UnitOutcome::Continue,
        }
    }

    fn stop(&mut self, reason: HaltReason) {
        self.halt = Some(reason);
        self.state = CpuState::Halted;
        self.waiting = false;
    }

    /// The front of the table, if its priority is high enough to be taken.
    fn serviceable(&self) -> Option<Interrupt> {
        self.itab
            .front()
            .filter(|next| next.priority >= self.regs.ps().priority())
    }

    fn service_interrupt(&mut self, bus: &mut Bus) -> bool {
        let Some(next) = self.serviceable() else {
            return false;
        };
        self.itab.pop_front();
        self.waiting = false;
        debug!(
            "interrupt {:o} at priority {} (PS priority {})",
            next.vector,
            next.priority,
            self.regs.ps().priority()
        );
        self.enter(bus, next.vector);
        true
    }

    fn take_trap(&mut self, bus: &mut Bus, trap: Trap) {
        debug!("{trap} at {:06o}", self.instruction_address);
        self.state = CpuState::TrapPending;
        bus.trap(trap.name());
        self.enter(bus, trap.vector());
    }

    fn enter(&mut self, bus: &mut Bus, vector: u16) {
        self.state = CpuState::ServicingTrap;
        match self.switch_to_vector(bus, vector) {
            Ok(()) => self.state = CpuState::Running,
            Err(fault) => {
                error!("{fault} while entering vector {vector:o}, halting");
                self.stop(HaltReason::DoubleFault {
                    vector: vector.into(),
                });
            }
        }
    }

    /// Pushes PS and PC on the kernel stack and loads the new pair from
    /// `vector`.
    fn switch_to_vector(&mut self, bus: &mut Bus, vector: u16) -> Result<(), Trap> {
        let old = self.regs.ps();
        let mode = old.current_mode();
        self.regs
            .set_ps(old.with_current_mode(Mode::Kernel).with_previous_mode(mode));
        self.push(bus, old.raw())?;
        self.push(bus, self.regs.pc())?;

        let pc = bus.read_word(vector)?;
        let mut ps = Ps::new(bus.read_word(vector.wrapping_add(2))?);
        if mode == Mode::User {
            ps = ps.with_previous_mode(Mode::User);
        }
        self.regs.set_pc(pc);
        self.regs.set_ps(ps);
        Ok(())
    }

    fn return_from_trap(&mut self, bus: &mut Bus) -> Result<(), Trap> {
        let pc = self.pop(bus)?;
        let popped = self.pop(bus)?;
        let old = self.regs.ps();
        let ps = match old.current_mode() {
            Mode::Kernel => Ps::new(popped),
            Mode::User => {
                let user_bits = Ps::TRACE_BIT | Ps::FLAGS_MASK;
                Ps::new((old.raw() & !user_bits) | (popped & user_bits))
            }
        };
        self.regs.set_pc(pc);
        self.regs.set_ps(ps);
        Ok(())
    }

    fn execute_next(&mut self, bus: &mut Bus) -> Result<(), Trap> {
        let word = self.fetch(bus)?;
        let instruction = Instruction::try_from(word)?;
        trace!("{:06o}: {word:06o} {instruction:?}", self.instruction_address);
        self.execute(bus, instruction)
    }

    fn execute(&mut self, bus: &mut Bus, instruction: Instruction) -> Result<(), Trap> {
        let kernel = self.regs.ps().current_mode() == Mode::Kernel;
        match instruction {
            Instruction::Double { op, byte, src, dst } => self.double_operand(bus, op, byte, src, dst)?,
            Instruction::Register { op, reg, operand } => self.register_operand(bus, op, reg, operand)?,
            Instruction::Sob { reg, offset } => {
                let reg = usize::from(reg);
                let count = self.regs.get(reg).wrapping_sub(1);
                self.regs.set(reg, count);
                if count != 0 {
                    let pc = self.regs.pc().wrapping_sub(u16::from(offset) * 2);
                    self.regs.set_pc(pc);
                }
            }
            Instruction::Single { op, byte, dst } => self.single_operand(bus, op, byte, dst)?,
            Instruction::Swab(dst) => {
                let location = self.resolve(bus, dst, false)?;
                let (value, flags) = alu::swab(self.load(bus, location, false)?);
                self.store(bus, location, false, value)?;
                self.regs.set_flags(flags);
            }
            Instruction::Sxt(dst) => {
                let flags = self.regs.ps().flags();
                let location = self.resolve(bus, dst, false)?;
                self.store(bus, location, false, if flags.n { 0xFFFF } else { 0 })?;
                self.regs.set_flags(Flags {
                    z: !flags.n,
                    v: false,
                    ..flags
                });
            }
            Instruction::Mark(count) => {
                let sp = self.regs.pc().wrapping_add(u16::from(count) * 2);
                self.regs.set_sp(sp);
                self.regs.set_pc(self.regs.get(5));
                let frame = self.pop(bus)?;
                self.regs.set(5, frame);
            }
            Instruction::Previous { op, operand } => self.previous_space(bus, op, operand)?,
            Instruction::Mtps(src) => {
                let value = self.read_operand(bus, src, true)?;
                let old = self.regs.ps().raw();
                // T cannot be set this way; user mode only reaches NZVC
                let writable = if kernel { 0o357 } else { Ps::FLAGS_MASK };
                self.regs.set_ps(Ps::new((old & !writable) | (value & writable)));
            }
            Instruction::Mfps(dst) => {
                let value = self.regs.ps().raw() & 0xFF;
                let (value, flags) = alu::logic(value, Width::BYTE, self.regs.ps().flags().c);
                match self.resolve(bus, dst, true)? {
                    Location::Register(reg) => self.regs.set(usize::from(reg), value.sign_extended(8)),
                    location => self.store(bus, location, true, value)?,
                }
                self.regs.set_flags(flags);
            }
            Instruction::Branch { condition, offset } => {
                if self.condition(condition) {
                    let pc = self.regs.pc().wrapping_add_signed(i16::from(offset) * 2);
                    self.regs.set_pc(pc);
                }
            }
            Instruction::Jmp(dst) => {
                let target = self.resolve_address(bus, dst)?;
                self.regs.set_pc(target);
            }
            Instruction::Jsr { reg, dst } => {
                let target = self.resolve_address(bus, dst)?;
                let reg = usize::from(reg);
                self.push(bus, self.regs.get(reg))?;
                self.regs.set(reg, self.regs.pc());
                self.regs.set_pc(target);
            }
            Instruction::Rts(reg) => {
                let reg = usize::from(reg);
                self.regs.set_pc(self.regs.get(reg));
                let value = self.pop(bus)?;
                self.regs.set(reg, value);
            }
            Instruction::Spl(priority) => {
                if kernel {
                    self.regs.set_ps(self.regs.ps().with_priority(priority));
                }
            }
            Instruction::ConditionCodes { set, mask } => {
                let bits = self.regs.ps().flags().bits();
                let mask = u16::from(mask);
                let bits = if set { bits | mask } else { bits & !mask };
                self.regs.set_flags(Flags::from_bits(bits));
            }
            Instruction::Emt(_) => return Err(Trap::Emt),
            Instruction::Trap(_) => return Err(Trap::Trap),
            Instruction::Bpt => return Err(Trap::Bpt),
            Instruction::Iot => return Err(Trap::Iot),
            Instruction::Halt => {
                if kernel {
                    warn!("HALT at {:06o}", self.instruction_address);
                    self.stop(HaltReason::Halt {
                        address: self.instruction_address.into(),
                    });
                }
            }
            Instruction::Wait => {
                if kernel {
                    self.waiting = true;
                }
            }
            // no bus devices to reset
            Instruction::Reset => {}
            Instruction::Rti => self.return_from_trap(bus)?,
            Instruction::Rtt => {
                self.return_from_trap(bus)?;
                self.suppress_trace = true;
            }
        }
        Ok(())
    }

    fn double_operand(
        &mut self,
        bus: &mut Bus,
        op: DoubleOp,
        byte: bool,
        src: Operand,
        dst: Operand,
    ) -> Result<(), Trap> {
        let w = Width::of(byte);
        let source = self.read_operand(bus, src, byte)?;
        let location = self.resolve(bus, dst, byte)?;
        let c = self.regs.ps().flags().c;

        let flags = match op {
            DoubleOp::Mov => {
                let (value, flags) = alu::logic(source, w, c);
                match location {
                    // MOVB into a register sign-extends
                    Location::Register(reg) if byte => {
                        self.regs.set(usize::from(reg), value.sign_extended(8));
                    }
                    _ => self.store(bus, location, byte, value)?,
                }
                flags
            }
            DoubleOp::Cmp => {
                let dest = self.load(bus, location, byte)?;
                alu::subtract(source, dest, w).1
            }
            DoubleOp::Bit => {
                let dest = self.load(bus, location, byte)?;
                alu::logic(source & dest, w, c).1
            }
            DoubleOp::Bic | DoubleOp::Bis | DoubleOp::Add | DoubleOp::Sub => {
                let dest = self.load(bus, location, byte)?;
                let (value, flags) = match op {
                    DoubleOp::Bic => alu::logic(!source & dest, w, c),
                    DoubleOp::Bis => alu::logic(source | dest, w, c),
                    DoubleOp::Add => alu::add(dest, source, w),
                    _ => alu::subtract(dest, source, w),
                };
                self.store(bus, location, byte, value)?;
                flags
            }
        };
        self.regs.set_flags(flags);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn register_operand(
        &mut self,
        bus: &mut Bus,
        op: RegisterOp,
        reg: u8,
        operand: Operand,
    ) -> Result<(), Trap> {
        let r = usize::from(reg);
        let pair = r | 1;
        let even = reg & 1 == 0;

        let flags = match op {
            RegisterOp::Xor => {
                let location = self.resolve(bus, operand, false)?;
                let value = self.load(bus, location, false)? ^ self.regs.get(r);
                let (value, flags) = alu::logic(value, Width::WORD, self.regs.ps().flags().c);
                self.store(bus, location, false, value)?;
                flags
            }
            RegisterOp::Mul => {
                let src = self.read_operand(bus, operand, false)?;
                let (product, flags) = alu::mul(self.regs.get(r), src);
                let product = product as u32;
                if even {
                    self.regs.set(r, (product >> 16) as u16);
                    self.regs.set(pair, product as u16);
                } else {
                    self.regs.set(r, product as u16);
                }
                flags
            }
            RegisterOp::Div => {
                let divisor = self.read_operand(bus, operand, false)?;
                let dividend = (u32::from(self.regs.get(r)) << 16) | u32::from(self.regs.get(pair));
                let (result, flags) = alu::div(dividend, divisor, self.regs.ps().flags());
                if let Some((quotient, remainder)) = result {
                    self.regs.set(r, quotient);
                    self.regs.set(pair, remainder);
                }
                flags
            }
            RegisterOp::Ash => {
                let count = alu::shift_count(self.read_operand(bus, operand, false)?);
                let (value, flags) = alu::ash(self.regs.get(r), count);
                self.regs.set(r, value);
                flags
            }
            RegisterOp::Ashc => {
                let count = alu::shift_count(self.read_operand(bus, operand, false)?);
                // an odd register is shifted against itself
                let value = (u32::from(self.regs.get(r)) << 16) | u32::from(self.regs.get(pair));
                let (value, flags) = alu::ashc(value, count);
                if even {
                    self.regs.set(r, (value >> 16) as u16);
                    self.regs.set(pair, value as u16);
                } else {
                    self.regs.set(r, value as u16);
                }
                flags
            }
        };
        self.regs.set_flags(flags);
        Ok(())
    }

    fn single_operand(&mut self, bus: &mut Bus, op: SingleOp, byte: bool, dst: Operand) -> Result<(), Trap> {
        let w = Width::of(byte);
        let location = self.resolve(bus, dst, byte)?;
        let c = self.regs.ps().flags().c;
        let dest = if op == SingleOp::Clr {
            0
        } else {
            self.load(bus, location, byte)?
        };

        let (value, flags) = match op {
            SingleOp::Clr => alu::clr(w),
            SingleOp::Com => alu::com(dest, w),
            SingleOp::Inc => alu::inc(dest, w, c),
            SingleOp::Dec => alu::dec(dest, w, c),
            SingleOp::Neg => alu::neg(dest, w),
            SingleOp::Adc => alu::adc(dest, w, c),
            SingleOp::Sbc => alu::sbc(dest, w, c),
            SingleOp::Ror => alu::ror(dest, w, c),
            SingleOp::Rol => alu::rol(dest, w, c),
            SingleOp::Asr => alu::asr(dest, w),
            SingleOp::Asl => alu::asl(dest, w),
            SingleOp::Tst => {
                self.regs.set_flags(alu::tst(dest, w).1);
                return Ok(());
            }
        };
        self.store(bus, location, byte, value)?;
        self.regs.set_flags(flags);
        Ok(())
    }

    /// MFPx/MTPx. Without memory management both spaces are the same
    /// memory; only R6 differs, as the previous mode's stack pointer.
    fn previous_space(&mut self, bus: &mut Bus, op: PreviousSpace, operand: Operand) -> Result<(), Trap> {
        let previous = self.regs.ps().previous_mode();
        let c = self.regs.ps().flags().c;
        let value = match op {
            PreviousSpace::Mfpi | PreviousSpace::Mfpd => {
                let value = match self.resolve(bus, operand, false)? {
                    Location::Register(6) => self.regs.stack_pointer(previous),
                    location => self.load(bus, location, false)?,
                };
                self.push(bus, value)?;
                value
            }
            PreviousSpace::Mtpi | PreviousSpace::Mtpd => {
                let value = self.pop(bus)?;
                match self.resolve(bus, operand, false)? {
                    Location::Register(6) => self.regs.set_stack_pointer(previous, value),
                    location => self.store(bus, location, false, value)?,
                }
                value
            }
        };
        self.regs.set_flags(alu::logic(value, Width::WORD, c).1);
        Ok(())
    }

    fn condition(&self, condition: Condition) -> bool {
        let Flags { n, z, v, c } = self.regs.ps().flags();
        match condition {
            Condition::Always => true,
            Condition::Ne => !z,
            Condition::Eq => z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && n == v,
            Condition::Le => z || n != v,
            Condition::Pl => !n,
            Condition::Mi => n,
            Condition::Hi => !c && !z,
            Condition::Los => c || z,
            Condition::Vc => !v,
            Condition::Vs => v,
            Condition::Cc => !c,
            Condition::Cs => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::pdp11::trap::{IRQ_PRIORITY, IRQ_VECTOR, NMI_PRIORITY, NMI_VECTOR};
    use crate::tube::LoopbackTube;
    use pretty_assertions::assert_eq;

    const NOP: u16 = 0o000240;
    const RTI: u16 = 0o000002;
    const RTT: u16 = 0o000006;

    struct Rig {
        cpu: Cpu,
        mem: Memory,
        tube: LoopbackTube,
    }

    impl Rig {
        /// Kernel mode, priority from `ps`, stack at 0o1000, code at 0o2000.
        fn new(ps: u16) -> Self {
            let mut cpu = Cpu::default();
            cpu.reset(0o2000, Ps::new(ps));
            cpu.regs.set_sp(0o1000);
            Self {
                cpu,
                mem: Memory::new(0x1_0000),
                tube: LoopbackTube::new(0),
            }
        }

        fn load(&mut self, address: u16, words: &[u16]) {
            for (i, word) in words.iter().enumerate() {
                self.mem.write_word(usize::from(address) + 2 * i, *word);
            }
        }

        fn vector(&mut self, vector: u16, pc: u16, ps: u16) {
            self.load(vector, &[pc, ps]);
        }

        fn step(&mut self) -> UnitOutcome {
            let mut bus = Bus::new(&mut self.mem, &mut self.tube, None, false);
            self.cpu.step(&mut bus)
        }

        fn word(&self, address: u16) -> u16 {
            self.mem.read_word(usize::from(address))
        }

        fn reg(&self, index: usize) -> u16 {
            self.cpu.regs.get(index)
        }
    }

    #[test]
    fn nmi_at_lower_priority_vectors_through_kernel_stack() {
        let mut rig = Rig::new(0o300);
        rig.vector(NMI_VECTOR, 0o3000, 0o340);

        rig.cpu.interrupt(NMI_VECTOR, NMI_PRIORITY);
        assert_eq!(rig.step(), UnitOutcome::Continue);

        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert_eq!(rig.cpu.regs.ps().raw(), 0o340);
        let sp = rig.cpu.regs.sp();
        assert_eq!(sp, 0o774);
        assert_eq!(rig.word(sp), 0o2000, "old PC at SP");
        assert_eq!(rig.word(sp + 2), 0o300, "old PS at SP+2");
        assert!(rig.cpu.interrupts().is_empty());
    }

    #[test]
    fn irq_waits_for_priority_to_drop() {
        let mut rig = Rig::new(0o340);
        rig.vector(IRQ_VECTOR, 0o3000, 0o340);
        rig.load(0o2000, &[NOP, 0o000230]); // NOP; SPL 0

        rig.cpu.interrupt(IRQ_VECTOR, IRQ_PRIORITY);
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o2002, "NOP executed, IRQ still pending");
        assert_eq!(rig.cpu.interrupts().front().map(|i| i.vector), Some(IRQ_VECTOR));

        rig.step();
        assert_eq!(rig.cpu.regs.ps().priority(), 0);
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
    }

    #[test]
    fn interrupt_then_rti_restores_registers() {
        let mut rig = Rig::new(0o000);
        for r in 0..6 {
            rig.cpu.regs.set(r, 0o100 + r as u16);
        }
        rig.cpu.regs.set_flags(Flags {
            n: true,
            c: true,
            ..Flags::default()
        });
        rig.vector(0o60, 0o3000, 0o340);
        rig.load(0o3000, &[RTI]);
        let before = rig.cpu.regs.clone();

        rig.cpu.interrupt(0o60, 4);
        rig.step();
        assert_ne!(rig.cpu.regs, before);
        rig.step();
        assert_eq!(rig.cpu.regs, before);
    }

    #[test]
    fn trap_from_user_mode_uses_kernel_stack() {
        let mut rig = Rig::new(0o000);
        rig.cpu.regs.set_stack_pointer(Mode::User, 0o1400);
        rig.cpu.regs.set_ps(Ps::new(0o140_000));
        assert_eq!(rig.cpu.regs.sp(), 0o1400);
        rig.load(0o2000, &[0o104400]); // TRAP 0
        rig.vector(0o34, 0o3000, 0o000);
        rig.load(0o3000, &[RTI]);
        let user = rig.cpu.regs.clone();

        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert_eq!(rig.cpu.regs.ps().current_mode(), Mode::Kernel);
        assert_eq!(rig.cpu.regs.ps().previous_mode(), Mode::User);
        assert_eq!(rig.cpu.regs.sp(), 0o774);
        assert_eq!(rig.word(0o774), 0o2002);
        assert_eq!(rig.word(0o776), 0o140_000);
        assert_eq!(rig.cpu.regs.stack_pointer(Mode::User), 0o1400);

        rig.step();
        assert_eq!(rig.cpu.regs.ps().current_mode(), Mode::User);
        assert_eq!(rig.cpu.regs.sp(), 0o1400);
        assert_eq!(rig.cpu.regs.pc(), 0o2002);
        assert_eq!(rig.cpu.regs.stack_pointer(Mode::Kernel), 0o1000);
        assert_eq!(rig.reg(0), user.get(0));
    }

    #[test]
    fn rti_in_user_mode_keeps_privileged_bits() {
        let mut rig = Rig::new(0o000);
        rig.cpu.regs.set_stack_pointer(Mode::User, 0o1400);
        rig.cpu.regs.set_ps(Ps::new(0o140_000));
        // popped PC then PS asking for kernel mode and priority 7
        rig.load(0o1400, &[0o2100, 0o000_357]);
        rig.load(0o2000, &[RTI]);

        rig.step();
        let ps = rig.cpu.regs.ps();
        assert_eq!(rig.cpu.regs.pc(), 0o2100);
        assert_eq!(ps.current_mode(), Mode::User);
        assert_eq!(ps.priority(), 0);
        assert_eq!(ps.raw() & 0o37, 0o17);
    }

    #[test]
    fn illegal_instruction_traps_to_10() {
        let mut rig = Rig::new(0o340);
        rig.vector(0o10, 0o3000, 0o340);
        rig.load(0o2000, &[0o000100]); // JMP R0

        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert_eq!(rig.word(rig.cpu.regs.sp()), 0o2002);
        assert_eq!(rig.cpu.state(), CpuState::Running);
    }

    #[test]
    fn odd_word_access_traps_to_4_after_autoincrement() {
        let mut rig = Rig::new(0o340);
        rig.vector(0o4, 0o3000, 0o340);
        rig.cpu.regs.set(1, 0o1001);
        rig.load(0o2000, &[0o012100]); // MOV (R1)+,R0

        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert_eq!(rig.reg(1), 0o1003);
        assert_eq!(rig.reg(0), 0);
    }

    #[test]
    fn software_traps() {
        for (word, vector) in [(0o104001, 0o30), (0o104401, 0o34), (0o000003, 0o14), (0o000004, 0o20)] {
            let mut rig = Rig::new(0o000);
            rig.vector(vector, 0o3000 + vector, 0o340);
            rig.load(0o2000, &[word]);
            rig.step();
            assert_eq!(rig.cpu.regs.pc(), 0o3000 + vector, "{word:06o}");
        }
    }

    #[test]
    fn double_fault_halts() {
        let mut rig = Rig::new(0o340);
        rig.cpu.regs.set_sp(0o1001);
        rig.load(0o2000, &[0o000003]); // BPT

        assert_eq!(
            rig.step(),
            UnitOutcome::Halted(HaltReason::DoubleFault { vector: 0o14 })
        );
        assert_eq!(rig.cpu.state(), CpuState::Halted);
        // halted for good until reset
        assert!(matches!(rig.step(), UnitOutcome::Halted(_)));
    }

    #[test]
    fn halt_only_in_kernel_mode() {
        let mut rig = Rig::new(0o140_000);
        rig.load(0o2000, &[0, 0]);
        assert_eq!(rig.step(), UnitOutcome::Continue);
        assert_eq!(rig.cpu.regs.pc(), 0o2002);

        let mut rig = Rig::new(0o000);
        rig.load(0o2000, &[0]);
        assert_eq!(
            rig.step(),
            UnitOutcome::Halted(HaltReason::Halt { address: 0o2000 })
        );
    }

    #[test]
    fn wait_parks_until_interrupt() {
        let mut rig = Rig::new(0o000);
        rig.load(0o2000, &[0o000001]);
        rig.vector(0o60, 0o3000, 0o340);

        rig.step();
        assert!(rig.cpu.is_waiting());
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o2002);

        rig.cpu.interrupt(0o60, 4);
        rig.step();
        assert!(!rig.cpu.is_waiting());
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
    }

    #[test]
    fn idle_and_interrupt_steps_execute_nothing() {
        let mut rig = Rig::new(0o200);
        rig.load(0o2000, &[0o000001]);
        rig.vector(0o60, 0o3000, 0o340);
        assert!(rig.cpu.next_step_executes());

        rig.step();
        assert!(rig.cpu.is_waiting());
        assert!(!rig.cpu.next_step_executes());

        // below the PS priority: still idle
        rig.cpu.interrupt(0o60, 3);
        assert!(!rig.cpu.next_step_executes());
        rig.cpu.regs.set_ps(Ps::new(0o000));
        assert!(!rig.cpu.next_step_executes(), "next step takes the interrupt");

        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert!(rig.cpu.next_step_executes());
    }

    #[test]
    fn trace_trap_except_after_rtt() {
        let mut rig = Rig::new(0o020);
        rig.vector(0o14, 0o3000, 0o340);
        rig.load(0o2000, &[NOP]);
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);

        let mut rig = Rig::new(0o000);
        rig.load(0o776, &[0o2100, 0o020]); // stacked PC, PS with T
        rig.cpu.regs.set_sp(0o776);
        rig.load(0o2000, &[RTT]);
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o2100);
        assert!(rig.cpu.regs.ps().trace());
    }

    #[test]
    fn full_interrupt_table_halts() {
        let mut rig = Rig::new(0o340);
        for n in 1..=8u16 {
            rig.cpu.interrupt(0o100 + n * 4, 4);
        }
        assert_eq!(rig.cpu.halt_reason(), None);
        rig.cpu.interrupt(0o200, 4);
        assert_eq!(rig.cpu.halt_reason(), Some(HaltReason::InterruptTableFull));
        assert_eq!(
            rig.step(),
            UnitOutcome::Halted(HaltReason::InterruptTableFull)
        );
    }

    #[test]
    fn subroutine_call_and_return() {
        let mut rig = Rig::new(0o340);
        // JSR PC,@#3000 ; at 3000: RTS PC
        rig.load(0o2000, &[0o004737, 0o3000]);
        rig.load(0o3000, &[0o000207]);

        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o3000);
        assert_eq!(rig.word(rig.cpu.regs.sp()), 0o2004);
        rig.step();
        assert_eq!(rig.cpu.regs.pc(), 0o2004);
        assert_eq!(rig.cpu.regs.sp(), 0o1000);
    }

    #[test]
    fn sob_loops() {
        let mut rig = Rig::new(0o340);
        // 2000: INC R0 ; SOB R1,2000
        rig.load(0o2000, &[0o005200, 0o077102]);
        rig.cpu.regs.set(1, 3);
        for _ in 0..6 {
            rig.step();
        }
        assert_eq!(rig.reg(0), 3);
        assert_eq!(rig.reg(1), 0);
        assert_eq!(rig.cpu.regs.pc(), 0o2004);
    }

    #[test]
    fn movb_sign_extends_into_register() {
        let mut rig = Rig::new(0o340);
        // MOVB #200,R0 ; MOVB #1,@#4000
        rig.load(0o2000, &[0o112700, 0o200, 0o112737, 0o1, 0o4000]);
        rig.mem.write_word(0o4000, 0xAA00);
        rig.step();
        assert_eq!(rig.reg(0), 0xFF80);
        assert!(rig.cpu.regs.ps().flags().n);
        rig.step();
        assert_eq!(rig.word(0o4000), 0xAA01);
    }

    #[test]
    fn multiply_divide_registers() {
        let mut rig = Rig::new(0o340);
        // MUL #7,R2 ; DIV #5,R2
        rig.load(0o2000, &[0o070227, 7, 0o071227, 5]);
        rig.cpu.regs.set(2, 6);
        rig.step();
        assert_eq!((rig.reg(2), rig.reg(3)), (0, 42));
        rig.step();
        assert_eq!((rig.reg(2), rig.reg(3)), (8, 2));
    }

    #[test]
    fn mfpi_reads_previous_stack_pointer() {
        let mut rig = Rig::new(0o030_000); // kernel, previous user
        rig.cpu.regs.set_stack_pointer(Mode::User, 0o1400);
        // MFPI SP ; MTPI SP
        rig.load(0o2000, &[0o006506, 0o006606]);
        rig.step();
        assert_eq!(rig.word(rig.cpu.regs.sp()), 0o1400);

        rig.mem.write_word(usize::from(rig.cpu.regs.sp()), 0o1600);
        rig.step();
        assert_eq!(rig.cpu.regs.stack_pointer(Mode::User), 0o1600);
        assert_eq!(rig.cpu.regs.sp(), 0o1000);
    }

    #[test]
    fn mtps_and_mfps() {
        let mut rig = Rig::new(0o000);
        // MTPS #371 ; MFPS R0
        rig.load(0o2000, &[0o106427, 0o371, 0o106700]);
        rig.step();
        assert_eq!(rig.cpu.regs.ps().raw(), 0o351, "T is not writable");
        rig.step();
        assert_eq!(rig.reg(0), 0xFFE9);
    }

    #[test]
    fn soft_reset_is_repeatable() {
        let mut cpu = Cpu::default();
        cpu.reset(0xF800, Ps::new(0o340));
        let first = cpu.clone();
        cpu.regs.set(3, 7);
        cpu.interrupt(0o60, 4);
        cpu.reset(0xF800, Ps::new(0o340));
        assert_eq!(cpu, first);
        cpu.reset(0xF800, Ps::new(0o340));
        assert_eq!(cpu, first);
    }
}
