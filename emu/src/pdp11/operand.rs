//! Operand resolution for the eight addressing modes.
//!
//! Resolving commits autoincrement/autodecrement immediately, so a trap
//! raised later in the same instruction leaves the register stepped.

use crate::pdp11::bus::Bus;
use crate::pdp11::cpu::Cpu;
use crate::pdp11::instruction::{AddressMode, Operand};
use crate::pdp11::registers::SP;
use crate::pdp11::trap::Trap;

/// Where a resolved operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(u8),
    Memory(u16),
}

impl Cpu {
    /// Next word at PC.
    pub(super) fn fetch(&mut self, bus: &mut Bus) -> Result<u16, Trap> {
        let pc = self.regs.pc();
        let word = bus.read_word(pc)?;
        self.regs.set_pc(pc.wrapping_add(2));
        Ok(word)
    }

    pub(super) fn resolve(&mut self, bus: &mut Bus, operand: Operand, byte: bool) -> Result<Location, Trap> {
        let reg = usize::from(operand.reg);
        // SP and PC always step by a word
        let step = if byte && reg < SP { 1 } else { 2 };
        let value = self.regs.get(reg);

        let address = match operand.mode {
            AddressMode::Register => return Ok(Location::Register(operand.reg)),
            AddressMode::Deferred => value,
            AddressMode::AutoIncrement => {
                self.regs.set(reg, value.wrapping_add(step));
                value
            }
            AddressMode::AutoIncrementDeferred => {
                self.regs.set(reg, value.wrapping_add(2));
                bus.read_word(value)?
            }
            AddressMode::AutoDecrement => {
                let address = value.wrapping_sub(step);
                self.regs.set(reg, address);
                address
            }
            AddressMode::AutoDecrementDeferred => {
                let address = value.wrapping_sub(2);
                self.regs.set(reg, address);
                bus.read_word(address)?
            }
            AddressMode::Index => {
                let index = self.fetch(bus)?;
                // re-read: with R7 the base is the PC after the index word
                self.regs.get(reg).wrapping_add(index)
            }
            AddressMode::IndexDeferred => {
                let index = self.fetch(bus)?;
                bus.read_word(self.regs.get(reg).wrapping_add(index))?
            }
        };
        Ok(Location::Memory(address))
    }

    /// Memory address of an operand that must not be a register (JMP, JSR).
    pub(super) fn resolve_address(&mut self, bus: &mut Bus, operand: Operand) -> Result<u16, Trap> {
        match self.resolve(bus, operand, false)? {
            Location::Memory(address) => Ok(address),
            Location::Register(_) => Err(Trap::Illegal),
        }
    }

    /// Byte reads of a register see only its low byte.
    pub(super) fn load(&mut self, bus: &mut Bus, location: Location, byte: bool) -> Result<u16, Trap> {
        match location {
            Location::Register(reg) => {
                let value = self.regs.get(usize::from(reg));
                Ok(if byte { value & 0xFF } else { value })
            }
            Location::Memory(address) if byte => Ok(u16::from(bus.read_byte(address))),
            Location::Memory(address) => bus.read_word(address),
        }
    }

    /// Byte writes to a register keep its high byte.
    pub(super) fn store(&mut self, bus: &mut Bus, location: Location, byte: bool, value: u16) -> Result<(), Trap> {
        match location {
            Location::Register(reg) => {
                let reg = usize::from(reg);
                let value = if byte {
                    (self.regs.get(reg) & 0xFF00) | (value & 0xFF)
                } else {
                    value
                };
                self.regs.set(reg, value);
                Ok(())
            }
            Location::Memory(address) if byte => {
                bus.write_byte(address, value.to_le_bytes()[0]);
                Ok(())
            }
            Location::Memory(address) => bus.write_word(address, value),
        }
    }

    pub(super) fn read_operand(&mut self, bus: &mut Bus, operand: Operand, byte: bool) -> Result<u16, Trap> {
        let location = self.resolve(bus, operand, byte)?;
        self.load(bus, location, byte)
    }

    pub(super) fn push(&mut self, bus: &mut Bus, value: u16) -> Result<(), Trap> {
        let sp = self.regs.sp().wrapping_sub(2);
        self.regs.set_sp(sp);
        bus.write_word(sp, value)
    }

    pub(super) fn pop(&mut self, bus: &mut Bus) -> Result<u16, Trap> {
        let sp = self.regs.sp();
        let value = bus.read_word(sp)?;
        self.regs.set_sp(sp.wrapping_add(2));
        Ok(value)
    }
}
