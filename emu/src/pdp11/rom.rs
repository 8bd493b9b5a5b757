//! Client ROM placement and the built-in boot stub.

use crate::error::{Error, Result};

/// `0o174000`: the ROM area is the top 2 KiB; its last 16 bytes are shadowed
/// by the Tube window.
pub const ROM_BASE: u16 = 0xF800;
pub const ROM_SIZE: usize = 0x800;
/// Kernel mode, priority 7.
pub const RESET_PS: u16 = 0o340;

/// Prints [`BANNER`] through Tube register 1, then waits for interrupts
/// forever.
const BOOT_STUB: [u16; 16] = [
    0o012706, 0o174000, // MOV #174000,SP
    0o012701, 0o174040, // MOV #174040,R1
    0o112100, //           MOVB (R1)+,R0
    0o001407, //           BEQ done
    0o132737, 0o000100, 0o177760, // BITB #100,@#177760
    0o001774, //           BEQ .-6
    0o110037, 0o177762, // MOVB R0,@#177762
    0o000767, //           BR .-16
    0o000001, // done:     WAIT
    0o000776, //           BR done
    0o000000,
];

pub const BANNER: &[u8] = b"\r\nPDP-11 TUBE\r\n\0";

/// The stub image, code followed by its message at `0o174040`.
#[must_use]
pub fn boot_stub() -> Vec<u8> {
    BOOT_STUB
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .chain(BANNER.iter().copied())
        .collect()
}

/// Rejects images larger than the 2 KiB ROM area.
pub fn validate(image: Vec<u8>) -> Result<Vec<u8>> {
    if image.len() > ROM_SIZE {
        return Err(Error::RomTooLarge {
            len: image.len(),
            max: ROM_SIZE,
            base: ROM_BASE,
        });
    }
    Ok(image)
}
