use crate::error::{Error, Result};
use crate::pdp11::disasm;
use crate::pdp11::psw::{Mode, Ps};
use crate::pdp11::trap::TRAP_NAMES;
use crate::pdp11::Pdp11;
use crate::probe::{Introspect, RegisterInfo};

const fn reg(name: &'static str) -> RegisterInfo {
    RegisterInfo { name, bits: 16 }
}

/// R0-R7 in order, then PS and both banked stack pointers.
pub const REGISTERS: &[RegisterInfo] = &[
    reg("R0"),
    reg("R1"),
    reg("R2"),
    reg("R3"),
    reg("R4"),
    reg("R5"),
    reg("SP"),
    reg("PC"),
    reg("PS"),
    reg("KSP"),
    reg("USP"),
];

const PS: usize = 8;
const KSP: usize = 9;
const USP: usize = 10;

#[allow(clippy::cast_possible_truncation)]
const fn word(address: u32) -> usize {
    (address & 0xFFFF) as usize
}

impl Introspect for Pdp11 {
    fn registers(&self) -> &'static [RegisterInfo] {
        REGISTERS
    }

    fn register(&self, index: usize) -> Option<u32> {
        let regs = self.cpu.registers();
        let value = match index {
            0..=7 => regs.get(index),
            PS => regs.ps().raw(),
            KSP => regs.stack_pointer(Mode::Kernel),
            USP => regs.stack_pointer(Mode::User),
            _ => return None,
        };
        Some(value.into())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_register(&mut self, index: usize, value: u32) -> Result<()> {
        let value = (value & 0xFFFF) as u16;
        let regs = self.cpu.registers_mut();
        match index {
            0..=7 => regs.set(index, value),
            PS => regs.set_ps(Ps::new(value)),
            KSP => regs.set_stack_pointer(Mode::Kernel, value),
            USP => regs.set_stack_pointer(Mode::User, value),
            _ => return Err(Error::RegisterIndex(index)),
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn format_register(&self, index: usize, value: u32) -> Option<String> {
        match index {
            PS => Some(format!("{value:06o} {}", Ps::new(value as u16))),
            i if i < REGISTERS.len() => Some(format!("{value:06o}")),
            _ => None,
        }
    }

    /// Octal; anything after the first token (such as the decoded PS) is
    /// ignored.
    fn parse_register(&self, index: usize, text: &str) -> Result<u32> {
        let info = REGISTERS.get(index).ok_or(Error::RegisterIndex(index))?;
        let error = || Error::RegisterParse {
            register: info.name,
            text: text.to_string(),
        };
        let token = text.split_whitespace().next().ok_or_else(error)?;
        let value = u32::from_str_radix(token, 8).map_err(|_| error())?;
        if value > 0xFFFF {
            return Err(error());
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn disassemble(&self, address: u32) -> (String, u32) {
        let (text, next) = disasm::disassemble(&self.memory, word(address) as u16);
        (text, next.into())
    }

    fn read_memory(&self, address: u32) -> u8 {
        self.memory.read_byte(word(address))
    }

    fn write_memory(&mut self, address: u32, value: u8) {
        self.memory.write_byte(word(address), value);
    }

    fn current_instruction_address(&self) -> u32 {
        self.cpu.instruction_address().into()
    }

    fn trap_names(&self) -> &'static [&'static str] {
        TRAP_NAMES
    }
}
