use crate::pdp11::psw::{Flags, Mode, Ps};

pub const SP: usize = 6;
pub const PC: usize = 7;

/// R0-R7 and PS, with one stack pointer per mode.
///
/// R6 always holds the stack pointer of the mode in PS bits 15-14; the other
/// mode's stack pointer waits in `banked_sp` until a PS write switches modes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    r: [u16; 8],
    ps: Ps,
    banked_sp: [u16; 2],
}

impl Registers {
    /// Power-up values: everything zero except PC and PS.
    #[must_use]
    pub fn new(pc: u16, ps: Ps) -> Self {
        let mut regs = Self::default();
        regs.set_ps(ps);
        regs.r[PC] = pc;
        regs
    }

    #[must_use]
    pub const fn get(&self, index: usize) -> u16 {
        self.r[index & 7]
    }

    pub const fn set(&mut self, index: usize, value: u16) {
        self.r[index & 7] = value;
    }

    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.r[PC]
    }

    pub const fn set_pc(&mut self, value: u16) {
        self.r[PC] = value;
    }

    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.r[SP]
    }

    pub const fn set_sp(&mut self, value: u16) {
        self.r[SP] = value;
    }

    #[must_use]
    pub const fn ps(&self) -> Ps {
        self.ps
    }

    /// Writes PS, re-banking R6 when the current mode changes.
    pub fn set_ps(&mut self, ps: Ps) {
        let old = self.ps.current_mode();
        let new = ps.current_mode();
        if old != new {
            self.banked_sp[old.index()] = self.r[SP];
            self.r[SP] = self.banked_sp[new.index()];
        }
        self.ps = ps;
    }

    pub const fn set_flags(&mut self, flags: Flags) {
        self.ps = self.ps.with_flags(flags);
    }

    /// The stack pointer belonging to `mode`, live or banked.
    #[must_use]
    pub fn stack_pointer(&self, mode: Mode) -> u16 {
        if mode == self.ps.current_mode() {
            self.r[SP]
        } else {
            self.banked_sp[mode.index()]
        }
    }

    pub fn set_stack_pointer(&mut self, mode: Mode, value: u16) {
        if mode == self.ps.current_mode() {
            self.r[SP] = value;
        } else {
            self.banked_sp[mode.index()] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn power_up_values() {
        let regs = Registers::new(0xF800, Ps::new(0o340));
        assert_eq!(regs.pc(), 0xF800);
        assert_eq!(regs.ps(), Ps::new(0o340));
        assert_eq!((0..7).map(|i| regs.get(i)).sum::<u16>(), 0);
    }

    #[test]
    fn mode_switch_banks_stack_pointer() {
        let mut regs = Registers::new(0, Ps::new(0));
        regs.set_sp(0o1000);

        regs.set_ps(regs.ps().with_current_mode(Mode::User));
        assert_eq!(regs.sp(), 0);
        regs.set_sp(0o2000);
        assert_eq!(regs.stack_pointer(Mode::Kernel), 0o1000);

        regs.set_ps(regs.ps().with_current_mode(Mode::Kernel));
        assert_eq!(regs.sp(), 0o1000);
        assert_eq!(regs.stack_pointer(Mode::User), 0o2000);
    }

    #[test]
    fn flag_writes_do_not_rebank() {
        let mut regs = Registers::new(0, Ps::new(0));
        regs.set_sp(0o1000);
        regs.set_flags(Flags {
            z: true,
            ..Flags::default()
        });
        assert_eq!(regs.sp(), 0o1000);
        assert_eq!(regs.ps().raw(), 0o4);
    }

    #[test]
    fn banked_stack_pointer_writes() {
        let mut regs = Registers::new(0, Ps::new(0));
        regs.set_stack_pointer(Mode::User, 0o3000);
        regs.set_stack_pointer(Mode::Kernel, 0o500);
        assert_eq!(regs.sp(), 0o500);
        regs.set_ps(Ps::new(0o140_000));
        assert_eq!(regs.sp(), 0o3000);
    }
}
