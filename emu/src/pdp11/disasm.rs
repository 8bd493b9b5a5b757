//! Textual disassembly in MACRO-11 style, octal throughout.

use crate::memory::Memory;
use crate::pdp11::instruction::{
    AddressMode, Condition, DoubleOp, Instruction, Operand, PreviousSpace, RegisterOp, SingleOp,
};

pub const REGISTER_NAMES: [&str; 8] = ["R0", "R1", "R2", "R3", "R4", "R5", "SP", "PC"];

/// Disassembles the instruction at `address`, returning its text and the
/// address of the following instruction. Reads memory directly, never the
/// Tube window.
#[must_use]
pub fn disassemble(memory: &Memory, address: u16) -> (String, u16) {
    let mut reader = Reader {
        memory,
        next: address,
    };
    let word = reader.word();
    let text = match Instruction::try_from(word) {
        Ok(instruction) => reader.instruction(instruction),
        Err(_) => format!(".WORD  {word:06o}"),
    };
    (text, reader.next)
}

struct Reader<'a> {
    memory: &'a Memory,
    next: u16,
}

impl Reader<'_> {
    fn word(&mut self) -> u16 {
        let word = self.memory.read_word(usize::from(self.next));
        self.next = self.next.wrapping_add(2);
        word
    }

    fn operand(&mut self, operand: Operand) -> String {
        let r = REGISTER_NAMES[usize::from(operand.reg & 7)];
        match (operand.mode, operand.reg) {
            (AddressMode::AutoIncrement, 7) => format!("#{:o}", self.word()),
            (AddressMode::AutoIncrementDeferred, 7) => format!("@#{:06o}", self.word()),
            (AddressMode::Index, 7) => {
                let offset = self.word();
                format!("{:06o}", self.next.wrapping_add(offset))
            }
            (AddressMode::IndexDeferred, 7) => {
                let offset = self.word();
                format!("@{:06o}", self.next.wrapping_add(offset))
            }
            (AddressMode::Register, _) => r.to_string(),
            (AddressMode::Deferred, _) => format!("({r})"),
            (AddressMode::AutoIncrement, _) => format!("({r})+"),
            (AddressMode::AutoIncrementDeferred, _) => format!("@({r})+"),
            (AddressMode::AutoDecrement, _) => format!("-({r})"),
            (AddressMode::AutoDecrementDeferred, _) => format!("@-({r})"),
            (AddressMode::Index, _) => format!("{:o}({r})", self.word()),
            (AddressMode::IndexDeferred, _) => format!("@{:o}({r})", self.word()),
        }
    }

    fn instruction(&mut self, instruction: Instruction) -> String {
        let (mnemonic, operands) = match instruction {
            Instruction::Double { op, byte, src, dst } => {
                let src = self.operand(src);
                let dst = self.operand(dst);
                (with_byte(double_mnemonic(op), byte), format!("{src},{dst}"))
            }
            Instruction::Register { op, reg, operand } => {
                let reg = REGISTER_NAMES[usize::from(reg)];
                let operand = self.operand(operand);
                let operands = if op == RegisterOp::Xor {
                    format!("{reg},{operand}")
                } else {
                    format!("{operand},{reg}")
                };
                (register_mnemonic(op).to_string(), operands)
            }
            Instruction::Sob { reg, offset } => {
                let target = self.next.wrapping_sub(u16::from(offset) * 2);
                ("SOB".into(), format!("{},{target:06o}", REGISTER_NAMES[usize::from(reg)]))
            }
            Instruction::Single { op, byte, dst } => {
                (with_byte(single_mnemonic(op), byte), self.operand(dst))
            }
            Instruction::Swab(dst) => ("SWAB".into(), self.operand(dst)),
            Instruction::Sxt(dst) => ("SXT".into(), self.operand(dst)),
            Instruction::Mark(count) => ("MARK".into(), format!("{count:o}")),
            Instruction::Previous { op, operand } => {
                let mnemonic = match op {
                    PreviousSpace::Mfpi => "MFPI",
                    PreviousSpace::Mtpi => "MTPI",
                    PreviousSpace::Mfpd => "MFPD",
                    PreviousSpace::Mtpd => "MTPD",
                };
                (mnemonic.into(), self.operand(operand))
            }
            Instruction::Mtps(src) => ("MTPS".into(), self.operand(src)),
            Instruction::Mfps(dst) => ("MFPS".into(), self.operand(dst)),
            Instruction::Branch { condition, offset } => {
                let target = self.next.wrapping_add_signed(i16::from(offset) * 2);
                (branch_mnemonic(condition).into(), format!("{target:06o}"))
            }
            Instruction::Jmp(dst) => ("JMP".into(), self.operand(dst)),
            Instruction::Jsr { reg, dst } => {
                let dst = self.operand(dst);
                ("JSR".into(), format!("{},{dst}", REGISTER_NAMES[usize::from(reg)]))
            }
            Instruction::Rts(reg) => ("RTS".into(), REGISTER_NAMES[usize::from(reg)].into()),
            Instruction::Spl(level) => ("SPL".into(), level.to_string()),
            Instruction::ConditionCodes { set, mask } => (condition_codes(set, mask), String::new()),
            Instruction::Emt(code) => ("EMT".into(), format!("{code:o}")),
            Instruction::Trap(code) => ("TRAP".into(), format!("{code:o}")),
            Instruction::Bpt => ("BPT".into(), String::new()),
            Instruction::Iot => ("IOT".into(), String::new()),
            Instruction::Halt => ("HALT".into(), String::new()),
            Instruction::Wait => ("WAIT".into(), String::new()),
            Instruction::Reset => ("RESET".into(), String::new()),
            Instruction::Rti => ("RTI".into(), String::new()),
            Instruction::Rtt => ("RTT".into(), String::new()),
        };
        if operands.is_empty() {
            mnemonic
        } else {
            format!("{mnemonic:<7}{operands}")
        }
    }
}

fn with_byte(mnemonic: &str, byte: bool) -> String {
    if byte {
        format!("{mnemonic}B")
    } else {
        mnemonic.to_string()
    }
}

const fn double_mnemonic(op: DoubleOp) -> &'static str {
    match op {
        DoubleOp::Mov => "MOV",
        DoubleOp::Cmp => "CMP",
        DoubleOp::Bit => "BIT",
        DoubleOp::Bic => "BIC",
        DoubleOp::Bis => "BIS",
        DoubleOp::Add => "ADD",
        DoubleOp::Sub => "SUB",
    }
}

const fn single_mnemonic(op: SingleOp) -> &'static str {
    match op {
        SingleOp::Clr => "CLR",
        SingleOp::Com => "COM",
        SingleOp::Inc => "INC",
        SingleOp::Dec => "DEC",
        SingleOp::Neg => "NEG",
        SingleOp::Adc => "ADC",
        SingleOp::Sbc => "SBC",
        SingleOp::Tst => "TST",
        SingleOp::Ror => "ROR",
        SingleOp::Rol => "ROL",
        SingleOp::Asr => "ASR",
        SingleOp::Asl => "ASL",
    }
}

const fn register_mnemonic(op: RegisterOp) -> &'static str {
    match op {
        RegisterOp::Mul => "MUL",
        RegisterOp::Div => "DIV",
        RegisterOp::Ash => "ASH",
        RegisterOp::Ashc => "ASHC",
        RegisterOp::Xor => "XOR",
    }
}

const fn branch_mnemonic(condition: Condition) -> &'static str {
    match condition {
        Condition::Always => "BR",
        Condition::Ne => "BNE",
        Condition::Eq => "BEQ",
        Condition::Ge => "BGE",
        Condition::Lt => "BLT",
        Condition::Gt => "BGT",
        Condition::Le => "BLE",
        Condition::Pl => "BPL",
        Condition::Mi => "BMI",
        Condition::Hi => "BHI",
        Condition::Los => "BLOS",
        Condition::Vc => "BVC",
        Condition::Vs => "BVS",
        Condition::Cc => "BCC",
        Condition::Cs => "BCS",
    }
}

fn condition_codes(set: bool, mask: u8) -> String {
    match (set, mask & 0o17) {
        (_, 0) => "NOP".into(),
        (true, 0o17) => "SCC".into(),
        (false, 0o17) => "CCC".into(),
        (set, mask) => {
            let prefix = if set { "SE" } else { "CL" };
            [(0o10, 'N'), (0o4, 'Z'), (0o2, 'V'), (0o1, 'C')]
                .into_iter()
                .filter(|(bit, _)| mask & bit != 0)
                .map(|(_, flag)| format!("{prefix}{flag}"))
                .collect::<Vec<_>>()
                .join("|")
        }
    }
}
