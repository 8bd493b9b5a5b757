//! Arithmetic with condition codes, for both operand widths.
//!
//! Every function takes values already truncated to the width and returns
//! the truncated result plus the new NZVC. Codes an instruction leaves
//! untouched are passed in through `c`.

use crate::pdp11::psw::Flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Width {
    mask: u16,
    sign: u16,
}

impl Width {
    pub const WORD: Self = Self {
        mask: 0xFFFF,
        sign: 0x8000,
    };
    pub const BYTE: Self = Self {
        mask: 0x00FF,
        sign: 0x0080,
    };

    #[must_use]
    pub const fn of(byte: bool) -> Self {
        if byte { Self::BYTE } else { Self::WORD }
    }

    #[must_use]
    pub const fn mask(self) -> u16 {
        self.mask
    }

    const fn negative(self, value: u16) -> bool {
        value & self.sign != 0
    }

    /// Largest positive value.
    const fn max_positive(self) -> u16 {
        self.sign - 1
    }
}

const fn nz(value: u16, w: Width, v: bool, c: bool) -> Flags {
    Flags {
        n: w.negative(value),
        z: value & w.mask == 0,
        v,
        c,
    }
}

/// MOV, BIT, BIC, BIS, XOR: V cleared, C kept.
#[must_use]
pub const fn logic(value: u16, w: Width, c: bool) -> (u16, Flags) {
    let value = value & w.mask;
    (value, nz(value, w, false, c))
}

#[must_use]
pub const fn add(dst: u16, src: u16, w: Width) -> (u16, Flags) {
    let result = dst.wrapping_add(src) & w.mask;
    let v = w.negative(!(dst ^ src) & (dst ^ result));
    let c = (dst as u32 + src as u32) > w.mask as u32;
    (result, nz(result, w, v, c))
}

/// `a - b`, with C set on borrow. SUB is `subtract(dst, src)`, CMP is
/// `subtract(src, dst)`.
#[must_use]
pub const fn subtract(a: u16, b: u16, w: Width) -> (u16, Flags) {
    let result = a.wrapping_sub(b) & w.mask;
    let v = w.negative((a ^ b) & (a ^ result));
    (result, nz(result, w, v, b > a))
}

#[must_use]
pub const fn clr(w: Width) -> (u16, Flags) {
    (0, nz(0, w, false, false))
}

#[must_use]
pub const fn com(dst: u16, w: Width) -> (u16, Flags) {
    let result = !dst & w.mask;
    (result, nz(result, w, false, true))
}

#[must_use]
pub const fn inc(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    let result = dst.wrapping_add(1) & w.mask;
    (result, nz(result, w, dst == w.max_positive(), c))
}

#[must_use]
pub const fn dec(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    let result = dst.wrapping_sub(1) & w.mask;
    (result, nz(result, w, dst == w.sign, c))
}

#[must_use]
pub const fn neg(dst: u16, w: Width) -> (u16, Flags) {
    let result = dst.wrapping_neg() & w.mask;
    (result, nz(result, w, result == w.sign, result != 0))
}

#[must_use]
pub const fn adc(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    let result = dst.wrapping_add(c as u16) & w.mask;
    (
        result,
        nz(result, w, c && dst == w.max_positive(), c && dst == w.mask),
    )
}

#[must_use]
pub const fn sbc(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    let result = dst.wrapping_sub(c as u16) & w.mask;
    (result, nz(result, w, dst == w.sign, c && dst == 0))
}

#[must_use]
pub const fn tst(dst: u16, w: Width) -> (u16, Flags) {
    let dst = dst & w.mask;
    (dst, nz(dst, w, false, false))
}

/// Shifts and rotates: C is the bit shifted out, V = N xor C.
const fn shifted(result: u16, w: Width, c: bool) -> (u16, Flags) {
    let result = result & w.mask;
    let n = w.negative(result);
    (result, nz(result, w, n != c, c))
}

#[must_use]
pub const fn ror(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    let carry_in = if c { w.sign } else { 0 };
    shifted((dst & w.mask) >> 1 | carry_in, w, dst & 1 != 0)
}

#[must_use]
pub const fn rol(dst: u16, w: Width, c: bool) -> (u16, Flags) {
    shifted(dst << 1 | c as u16, w, w.negative(dst))
}

#[must_use]
pub const fn asr(dst: u16, w: Width) -> (u16, Flags) {
    let dst = dst & w.mask;
    shifted(dst >> 1 | (dst & w.sign), w, dst & 1 != 0)
}

#[must_use]
pub const fn asl(dst: u16, w: Width) -> (u16, Flags) {
    shifted(dst << 1, w, w.negative(dst))
}

/// N and Z come from the new low byte.
#[must_use]
pub const fn swab(dst: u16) -> (u16, Flags) {
    let result = dst.swap_bytes();
    (result, nz(result, Width::BYTE, false, false))
}

/// Signed 16 x 16 multiply. C is set when the product does not fit in 16
/// bits.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn mul(a: u16, b: u16) -> (i32, Flags) {
    let product = (a as i16 as i32) * (b as i16 as i32);
    let flags = Flags {
        n: product < 0,
        z: product == 0,
        v: false,
        c: product < i16::MIN as i32 || product > i16::MAX as i32,
    };
    (product, flags)
}

/// Signed 32 / 16 divide. `None` leaves the registers untouched: division by
/// zero (V and C set) or a quotient that does not fit (V set).
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub const fn div(dividend: u32, divisor: u16, c_flags: Flags) -> (Option<(u16, u16)>, Flags) {
    let divisor = divisor as i16 as i32;
    if divisor == 0 {
        let flags = Flags {
            v: true,
            c: true,
            ..c_flags
        };
        return (None, flags);
    }
    let dividend = dividend as i32;
    // i32::MIN / -1 overflows i32 itself
    let (quotient, remainder) = match (dividend.checked_div(divisor), dividend.checked_rem(divisor)) {
        (Some(q), Some(r)) => (q, r),
        _ => (i32::MAX, 0),
    };
    if quotient < i16::MIN as i32 || quotient > i16::MAX as i32 {
        let flags = Flags {
            v: true,
            c: false,
            ..c_flags
        };
        return (None, flags);
    }
    let flags = Flags {
        n: quotient < 0,
        z: quotient == 0,
        v: false,
        c: false,
    };
    (Some((quotient as u16, remainder as u16)), flags)
}

/// Shift count from the low six bits of the source, as a signed value:
/// positive shifts left.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn shift_count(src: u16) -> i32 {
    (((src & 0o77) as i8) << 2 >> 2) as i32
}

/// Right shift distance for a negative count. A count of -32 shifts out
/// every bit, the same as 31 for an arithmetic shift.
const fn right_shift(count: i32) -> i32 {
    if count < -31 { 31 } else { -count }
}

/// ASH: arithmetic shift of a word.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub const fn ash(value: u16, count: i32) -> (u16, Flags) {
    let value = value as i16 as i32;
    let (result, c) = if count > 0 {
        // the bit shifted out last is bit (16 - count) of the original
        let c = count <= 16 && (value >> (16 - count)) & 1 != 0;
        (value << count, c)
    } else if count < 0 {
        let n = right_shift(count);
        let c = (value >> (n - 1)) & 1 != 0;
        (value >> n, c)
    } else {
        (value, false)
    };
    let result = result as u16;
    let v = (value < 0) != Width::WORD.negative(result);
    (result, nz(result, Width::WORD, v, c))
}

/// ASHC: arithmetic shift of a register pair as one 32-bit value.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub const fn ashc(value: u32, count: i32) -> (u32, Flags) {
    let value = value as i32;
    let (result, c) = if count > 0 {
        let c = (value >> (32 - count)) & 1 != 0;
        (value << count, c)
    } else if count < 0 {
        let n = right_shift(count);
        let c = (value >> (n - 1)) & 1 != 0;
        (value >> n, c)
    } else {
        (value, false)
    };
    let flags = Flags {
        n: result < 0,
        z: result == 0,
        v: (value < 0) != (result < 0),
        c,
    };
    (result as u32, flags)
}
