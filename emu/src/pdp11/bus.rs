//! # PDP-11 bus
//!
//! Routes guest accesses for one unit of work: the Tube window
//! (`0xFFF0..=0xFFFF`) goes to the parasite port, everything else to memory.
//! Word accesses are alignment-checked here, and every access is reported to
//! the probe when one is attached.

use tracing::debug;

use crate::memory::Memory;
use crate::pdp11::trap::Trap;
use crate::probe::{Access, AccessKind, AccessWidth, ProbeAction, ProbeSlot};
use crate::tube::ParasitePort;

pub const TUBE_MASK: u16 = 0xFFF0;

#[must_use]
pub const fn is_tube(address: u16) -> bool {
    address & TUBE_MASK == TUBE_MASK
}

/// Parasite channel for a Tube window address.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub const fn tube_channel(address: u16) -> u8 {
    ((address >> 1) & 7) as u8
}

pub struct Bus<'a> {
    memory: &'a mut Memory,
    port: &'a mut dyn ParasitePort,
    probe: ProbeSlot<'a>,
    allow_unaligned: bool,
    suspend: bool,
}

impl<'a> Bus<'a> {
    pub fn new(
        memory: &'a mut Memory,
        port: &'a mut dyn ParasitePort,
        probe: ProbeSlot<'a>,
        allow_unaligned: bool,
    ) -> Self {
        Self {
            memory,
            port,
            probe,
            allow_unaligned,
            suspend: false,
        }
    }

    /// An access hook asked to stop after this unit.
    #[must_use]
    pub const fn suspend_requested(&self) -> bool {
        self.suspend
    }

    pub fn read_byte(&mut self, address: u16) -> u8 {
        let value = if is_tube(address) {
            self.port.read(tube_channel(address))
        } else {
            self.memory.read_byte(usize::from(address))
        };
        self.notify(address, value.into(), AccessWidth::Byte, AccessKind::Read);
        value
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        self.notify(address, value.into(), AccessWidth::Byte, AccessKind::Write);
        if is_tube(address) {
            self.port.write(tube_channel(address), value);
        } else {
            self.memory.write_byte(usize::from(address), value);
        }
    }

    /// Tube registers are a byte wide: reads zero-extend.
    pub fn read_word(&mut self, address: u16) -> Result<u16, Trap> {
        let address = self.align(address)?;
        let value = if is_tube(address) {
            u16::from(self.port.read(tube_channel(address)))
        } else {
            self.memory.read_word(usize::from(address))
        };
        self.notify(address, value.into(), AccessWidth::Word, AccessKind::Read);
        Ok(value)
    }

    /// Tube registers are a byte wide: only the low byte is sent.
    pub fn write_word(&mut self, address: u16, value: u16) -> Result<(), Trap> {
        let address = self.align(address)?;
        self.notify(address, value.into(), AccessWidth::Word, AccessKind::Write);
        if is_tube(address) {
            self.port.write(tube_channel(address), value.to_le_bytes()[0]);
        } else {
            self.memory.write_word(usize::from(address), value);
        }
        Ok(())
    }

    /// Reports a trap to the probe.
    pub fn trap(&mut self, name: &'static str) {
        if let Some(probe) = self.probe.as_deref_mut() {
            probe.on_trap(name);
        }
    }

    fn align(&self, address: u16) -> Result<u16, Trap> {
        if address & 1 == 0 {
            Ok(address)
        } else if self.allow_unaligned {
            Ok(address & !1)
        } else {
            debug!("odd word access at {address:06o}");
            Err(Trap::BusError)
        }
    }

    fn notify(&mut self, address: u16, value: u32, width: AccessWidth, kind: AccessKind) {
        let Some(probe) = self.probe.as_deref_mut() else {
            return;
        };
        let access = Access {
            address: address.into(),
            value,
            width,
            kind,
            io: is_tube(address),
        };
        if probe.on_access(&access) == ProbeAction::Suspend {
            self.suspend = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Breakpoints, DebugProbe, Watch};
    use crate::tube::LoopbackTube;
    use pretty_assertions::assert_eq;

    fn memory() -> Memory {
        Memory::new(0x1_0000)
    }

    #[test]
    fn window_mask() {
        assert!(!is_tube(0xFFEF));
        assert!(is_tube(0xFFF0));
        assert!(is_tube(0xFFFF));
        assert_eq!(tube_channel(0xFFF0), 0);
        assert_eq!(tube_channel(0xFFF2), 1);
        assert_eq!(tube_channel(0xFFFE), 7);
    }

    #[test]
    fn last_even_address_is_fine_odd_traps() {
        let mut mem = memory();
        mem.write_word(0xFFEE, 0xBEEF);
        let mut tube = LoopbackTube::new(0);
        let mut bus = Bus::new(&mut mem, &mut tube, None, false);

        assert_eq!(bus.read_word(0xFFEE), Ok(0xBEEF));
        assert_eq!(bus.read_word(0xFFEF), Err(Trap::BusError));
        assert_eq!(bus.write_word(0xFFEF, 1), Err(Trap::BusError));
        // the last word of the address space is a Tube register
        assert_eq!(bus.read_word(0xFFFE), Ok(0));
        assert_eq!(bus.read_word(0xFFFF), Err(Trap::BusError));
    }

    #[test]
    fn unaligned_masks_low_bit() {
        let mut mem = memory();
        mem.write_word(0xFFEE, 0xBEEF);
        let mut tube = LoopbackTube::new(0);
        tube.send(4, 0x5A);
        let mut bus = Bus::new(&mut mem, &mut tube, None, true);

        assert_eq!(bus.read_word(0xFFEF), Ok(0xBEEF));
        assert_eq!(bus.read_word(0xFFFF), Ok(0x5A));
    }

    #[test]
    fn tube_window_never_touches_memory() {
        let mut mem = memory();
        mem.write_word(0xFFF2, 0xA5A5);
        let mut tube = LoopbackTube::new(0);
        let mut bus = Bus::new(&mut mem, &mut tube, None, false);

        bus.write_word(0xFFF2, 0x1234).unwrap();
        bus.write_byte(0xFFF3, 0x56);
        assert_eq!(bus.read_byte(0xFFF0), 0x40);

        assert_eq!(mem.read_word(0xFFF2), 0xA5A5);
        assert_eq!(tube.received(1), &[0x34, 0x56]);
    }

    #[test]
    fn watchpoint_requests_suspend() {
        let mut mem = memory();
        let mut tube = LoopbackTube::new(0);
        let mut probe = Breakpoints::new(0);
        probe.add_watchpoint(0o1000, Watch::Write);
        let probe: &mut (dyn DebugProbe + 'static) = &mut probe;
        let mut bus = Bus::new(&mut mem, &mut tube, Some(probe), false);

        bus.write_word(0o2000, 1).unwrap();
        assert!(!bus.suspend_requested());
        bus.read_word(0o1000).unwrap();
        assert!(!bus.suspend_requested());
        bus.write_word(0o1000, 1).unwrap();
        assert!(bus.suspend_requested());
    }
}
