use std::ops::RangeInclusive;

/// Bit helpers for the register and opcode widths the interpreters use.
/// Bit indexes count from the lsb (bit 0) to the msb.
pub trait Bits: Copy {
    const WIDTH: u8;

    fn get_bit(self, bit_idx: u8) -> bool;

    /// Extracts `bits_range` and moves it down to bit 0.
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    /// Sign-extends the lowest `number_of_bits` bits to the full width.
    #[must_use]
    fn sign_extended(self, number_of_bits: u8) -> Self;
}

macro_rules! impl_bits {
    ($t:ty, $signed:ty) => {
        impl Bits for $t {
            const WIDTH: u8 = <$t>::BITS as u8;

            fn get_bit(self, bit_idx: u8) -> bool {
                debug_assert!(bit_idx < Self::WIDTH);
                (self >> bit_idx) & 1 == 1
            }

            fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                let start = *bits_range.start();
                let length = u32::from(*bits_range.end() - start + 1);
                debug_assert!(start + (length as u8) <= Self::WIDTH);

                // A full-width range would overflow the mask shift.
                let mask = <$t>::MAX.checked_shr(<$t>::BITS - length).unwrap_or(0);
                (self >> start) & mask
            }

            fn sign_extended(self, number_of_bits: u8) -> Self {
                debug_assert!(number_of_bits > 0 && number_of_bits <= Self::WIDTH);
                let unused = Self::WIDTH - number_of_bits;
                (((self << unused) as $signed) >> unused) as $t
            }
        }
    };
}

impl_bits!(u8, i8);
impl_bits!(u16, i16);
impl_bits!(u32, i32);
