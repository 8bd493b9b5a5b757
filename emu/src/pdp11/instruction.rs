//! # Instruction decode
//!
//! Turns one 16-bit word into an [`Instruction`]. Decoding is pure: operand
//! words that follow the opcode are fetched later, while the operands are
//! resolved.
//!
//! ```text
//!  15 14  12 11   9 8    6 5    3 2    0
//! ┌──┬──────┬──────┬──────┬──────┬──────┐
//! │B │  op  │ src mode/reg│ dst mode/reg│   double operand
//! └──┴──────┴──────┴──────┴──────┴──────┘
//! ```

use crate::bitwise::Bits;
use crate::pdp11::trap::Trap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Register,
    Deferred,
    AutoIncrement,
    AutoIncrementDeferred,
    AutoDecrement,
    AutoDecrementDeferred,
    Index,
    IndexDeferred,
}

/// A six-bit mode/register operand specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub mode: AddressMode,
    pub reg: u8,
}

impl Operand {
    /// Decodes the specifier in the low six bits of `bits`.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        let mode = match bits.get_bits(3..=5) {
            0 => AddressMode::Register,
            1 => AddressMode::Deferred,
            2 => AddressMode::AutoIncrement,
            3 => AddressMode::AutoIncrementDeferred,
            4 => AddressMode::AutoDecrement,
            5 => AddressMode::AutoDecrementDeferred,
            6 => AddressMode::Index,
            _ => AddressMode::IndexDeferred,
        };
        Self {
            mode,
            reg: bits.get_bits(0..=2) as u8,
        }
    }

    #[must_use]
    pub fn is_register(self) -> bool {
        self.mode == AddressMode::Register
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleOp {
    Mov,
    Cmp,
    Bit,
    Bic,
    Bis,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleOp {
    Clr,
    Com,
    Inc,
    Dec,
    Neg,
    Adc,
    Sbc,
    Tst,
    Ror,
    Rol,
    Asr,
    Asl,
}

/// Register + source operand group (`07RSS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Mul,
    Div,
    Ash,
    Ashc,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    Ne,
    Eq,
    Ge,
    Lt,
    Gt,
    Le,
    Pl,
    Mi,
    Hi,
    Los,
    Vc,
    Vs,
    Cc,
    Cs,
}

/// Moves to and from the previous mode's address space or the PS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousSpace {
    Mfpi,
    Mtpi,
    Mfpd,
    Mtpd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Double {
        op: DoubleOp,
        byte: bool,
        src: Operand,
        dst: Operand,
    },
    Register {
        op: RegisterOp,
        reg: u8,
        operand: Operand,
    },
    Sob {
        reg: u8,
        offset: u8,
    },
    Single {
        op: SingleOp,
        byte: bool,
        dst: Operand,
    },
    Swab(Operand),
    Sxt(Operand),
    Mark(u8),
    Previous {
        op: PreviousSpace,
        operand: Operand,
    },
    Mtps(Operand),
    Mfps(Operand),
    Branch {
        condition: Condition,
        offset: i8,
    },
    Jmp(Operand),
    Jsr {
        reg: u8,
        dst: Operand,
    },
    Rts(u8),
    Spl(u8),
    /// `CLx`/`SEx`: `mask` selects NZVC in the low four bits.
    ConditionCodes {
        set: bool,
        mask: u8,
    },
    Emt(u8),
    Trap(u8),
    Bpt,
    Iot,
    Halt,
    Wait,
    Reset,
    Rti,
    Rtt,
}

impl TryFrom<u16> for Instruction {
    type Error = Trap;

    fn try_from(word: u16) -> Result<Self, Trap> {
        match word.get_bits(12..=14) {
            0 => decode_misc(word),
            7 if !word.get_bit(15) => decode_register(word),
            7 => Err(Trap::Illegal),
            op => decode_double(word, op),
        }
    }
}

fn decode_double(word: u16, op: u16) -> Result<Instruction, Trap> {
    let byte = word.get_bit(15);
    let (op, byte) = match (op, byte) {
        (1, b) => (DoubleOp::Mov, b),
        (2, b) => (DoubleOp::Cmp, b),
        (3, b) => (DoubleOp::Bit, b),
        (4, b) => (DoubleOp::Bic, b),
        (5, b) => (DoubleOp::Bis, b),
        (6, false) => (DoubleOp::Add, false),
        (6, true) => (DoubleOp::Sub, false),
        _ => return Err(Trap::Illegal),
    };
    Ok(Instruction::Double {
        op,
        byte,
        src: Operand::from_bits(word >> 6),
        dst: Operand::from_bits(word),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn decode_register(word: u16) -> Result<Instruction, Trap> {
    let reg = word.get_bits(6..=8) as u8;
    let operand = Operand::from_bits(word);
    let op = match word.get_bits(9..=11) {
        0 => RegisterOp::Mul,
        1 if reg & 1 != 0 => return Err(Trap::Illegal),
        1 => RegisterOp::Div,
        2 => RegisterOp::Ash,
        3 => RegisterOp::Ashc,
        4 => RegisterOp::Xor,
        7 => {
            return Ok(Instruction::Sob {
                reg,
                offset: word.get_bits(0..=5) as u8,
            });
        }
        _ => return Err(Trap::Illegal),
    };
    Ok(Instruction::Register { op, reg, operand })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn decode_misc(word: u16) -> Result<Instruction, Trap> {
    let operand = Operand::from_bits(word);
    let low_byte = word.get_bits(0..=7) as u8;
    // bit 15 and bits 11-6
    let group = (word >> 6) & 0o1777;

    let instruction = match group {
        0o0000 => match word {
            0 => Instruction::Halt,
            1 => Instruction::Wait,
            2 => Instruction::Rti,
            3 => Instruction::Bpt,
            4 => Instruction::Iot,
            5 => Instruction::Reset,
            6 => Instruction::Rtt,
            _ => return Err(Trap::Illegal),
        },
        0o0001 if operand.is_register() => return Err(Trap::Illegal),
        0o0001 => Instruction::Jmp(operand),
        0o0002 => match word.get_bits(3..=5) {
            0 => Instruction::Rts(operand.reg),
            3 => Instruction::Spl(operand.reg),
            4..=7 => Instruction::ConditionCodes {
                set: word.get_bit(4),
                mask: (word & 0o17) as u8,
            },
            _ => return Err(Trap::Illegal),
        },
        0o0003 => Instruction::Swab(operand),
        0o0004..=0o0037 | 0o1000..=0o1037 => Instruction::Branch {
            condition: branch_condition(word),
            offset: low_byte as i8,
        },
        0o0040..=0o0047 if operand.is_register() => return Err(Trap::Illegal),
        0o0040..=0o0047 => Instruction::Jsr {
            reg: word.get_bits(6..=8) as u8,
            dst: operand,
        },
        0o0050..=0o0063 | 0o1050..=0o1063 => Instruction::Single {
            op: single_op(group & 0o77),
            byte: word.get_bit(15),
            dst: operand,
        },
        0o0064 => Instruction::Mark(word.get_bits(0..=5) as u8),
        0o0065 => Instruction::Previous {
            op: PreviousSpace::Mfpi,
            operand,
        },
        0o0066 => Instruction::Previous {
            op: PreviousSpace::Mtpi,
            operand,
        },
        0o0067 => Instruction::Sxt(operand),
        0o1040..=0o1043 => Instruction::Emt(low_byte),
        0o1044..=0o1047 => Instruction::Trap(low_byte),
        0o1064 => Instruction::Mtps(operand),
        0o1065 => Instruction::Previous {
            op: PreviousSpace::Mfpd,
            operand,
        },
        0o1066 => Instruction::Previous {
            op: PreviousSpace::Mtpd,
            operand,
        },
        0o1067 => Instruction::Mfps(operand),
        _ => return Err(Trap::Illegal),
    };
    Ok(instruction)
}

/// Bit 15 and bits 10-8 select one of the 15 branches; `0o000000` itself is
/// not a branch and never reaches here.
fn branch_condition(word: u16) -> Condition {
    const LOW: [Condition; 8] = [
        Condition::Always, // unused slot: 0o0000xx is HALT and friends
        Condition::Always,
        Condition::Ne,
        Condition::Eq,
        Condition::Ge,
        Condition::Lt,
        Condition::Gt,
        Condition::Le,
    ];
    const HIGH: [Condition; 8] = [
        Condition::Pl,
        Condition::Mi,
        Condition::Hi,
        Condition::Los,
        Condition::Vc,
        Condition::Vs,
        Condition::Cc,
        Condition::Cs,
    ];
    let index = usize::from(word.get_bits(8..=10));
    if word.get_bit(15) { HIGH[index] } else { LOW[index] }
}

fn single_op(code: u16) -> SingleOp {
    match code {
        0o50 => SingleOp::Clr,
        0o51 => SingleOp::Com,
        0o52 => SingleOp::Inc,
        0o53 => SingleOp::Dec,
        0o54 => SingleOp::Neg,
        0o55 => SingleOp::Adc,
        0o56 => SingleOp::Sbc,
        0o57 => SingleOp::Tst,
        0o60 => SingleOp::Ror,
        0o61 => SingleOp::Rol,
        0o62 => SingleOp::Asr,
        _ => SingleOp::Asl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reg(reg: u8) -> Operand {
        Operand {
            mode: AddressMode::Register,
            reg,
        }
    }

    #[test]
    fn double_operand() {
        assert_eq!(
            Instruction::try_from(0o013700),
            Ok(Instruction::Double {
                op: DoubleOp::Mov,
                byte: false,
                src: Operand {
                    mode: AddressMode::AutoIncrementDeferred,
                    reg: 7
                },
                dst: reg(0),
            })
        );
        assert_eq!(
            Instruction::try_from(0o162701),
            Ok(Instruction::Double {
                op: DoubleOp::Sub,
                byte: false,
                src: Operand {
                    mode: AddressMode::AutoIncrement,
                    reg: 7
                },
                dst: reg(1),
            })
        );
        assert!(matches!(
            Instruction::try_from(0o112100),
            Ok(Instruction::Double {
                op: DoubleOp::Mov,
                byte: true,
                ..
            })
        ));
    }

    #[test]
    fn control_group() {
        assert_eq!(Instruction::try_from(0), Ok(Instruction::Halt));
        assert_eq!(Instruction::try_from(0o000006), Ok(Instruction::Rtt));
        assert_eq!(Instruction::try_from(0o000207), Ok(Instruction::Rts(7)));
        assert_eq!(Instruction::try_from(0o000234), Ok(Instruction::Spl(4)));
        assert_eq!(
            Instruction::try_from(0o000241),
            Ok(Instruction::ConditionCodes {
                set: false,
                mask: 0o1
            })
        );
        assert_eq!(
            Instruction::try_from(0o000277),
            Ok(Instruction::ConditionCodes {
                set: true,
                mask: 0o17
            })
        );
        assert_eq!(Instruction::try_from(0o104005), Ok(Instruction::Emt(5)));
        assert_eq!(Instruction::try_from(0o104777), Ok(Instruction::Trap(0o377)));
    }

    #[test]
    fn branches() {
        assert_eq!(
            Instruction::try_from(0o000776),
            Ok(Instruction::Branch {
                condition: Condition::Always,
                offset: -2
            })
        );
        assert_eq!(
            Instruction::try_from(0o001407),
            Ok(Instruction::Branch {
                condition: Condition::Eq,
                offset: 7
            })
        );
        assert_eq!(
            Instruction::try_from(0o103401),
            Ok(Instruction::Branch {
                condition: Condition::Cs,
                offset: 1
            })
        );
    }

    #[test]
    fn register_group() {
        assert_eq!(
            Instruction::try_from(0o077203),
            Ok(Instruction::Sob { reg: 2, offset: 3 })
        );
        assert_eq!(
            Instruction::try_from(0o071200),
            Ok(Instruction::Register {
                op: RegisterOp::Div,
                reg: 2,
                operand: reg(0)
            })
        );
    }

    #[test]
    fn illegal_encodings() {
        for word in [
            0o000007, // unassigned
            0o000100, // JMP R0
            0o004500, // JSR R5,R0
            0o071300, // DIV with odd register
            0o075000, // floating point instruction set
            0o170000, // FPU
            0o107000, // unassigned byte group
            0o000210, // between RTS and SPL
        ] {
            assert_eq!(Instruction::try_from(word), Err(Trap::Illegal), "{word:06o}");
        }
    }

    #[test]
    fn decode_is_deterministic() {
        for word in 0..=u16::MAX {
            assert_eq!(Instruction::try_from(word), Instruction::try_from(word));
        }
    }
}
