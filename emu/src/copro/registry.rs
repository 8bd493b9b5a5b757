//! # Co-processor selection
//!
//! [`Registry`] maps selector values to co-processor factories.
//! [`Dispatcher`] owns the running [`Harness`] and swaps it out whenever the
//! harness exits for reselection, handing the debug probe over to the new
//! one.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::Config;
use crate::copro::harness::{Harness, HarnessExit};
use crate::copro::Coprocessor;
use crate::error::{Error, Result};
use crate::pdp11::Pdp11;
use crate::probe::DebugProbe;
use crate::tube::Tube;

type Factory = Box<dyn Fn() -> Result<Box<dyn Coprocessor>>>;

struct Entry {
    name: &'static str,
    factory: Factory,
}

#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<usize, Entry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in co-processors, placed where `config` says. The ROM image
    /// is read and checked once, here.
    pub fn from_config(config: &Config) -> Result<Self> {
        let pdp11 = config.pdp11.clone();
        let rom = pdp11.load_rom()?;
        // fail now rather than on the first reset
        Pdp11::from_config(&pdp11, rom.clone())?;

        let mut registry = Self::new();
        registry.register(pdp11.slot, "PDP-11", move || {
            Ok(Box::new(Pdp11::from_config(&pdp11, rom.clone())?) as Box<dyn Coprocessor>)
        });
        Ok(registry)
    }

    /// Replaces whatever was in `slot`.
    pub fn register<F>(&mut self, slot: usize, name: &'static str, factory: F)
    where
        F: Fn() -> Result<Box<dyn Coprocessor>> + 'static,
    {
        let entry = Entry {
            name,
            factory: Box::new(factory),
        };
        if let Some(old) = self.entries.insert(slot, entry) {
            warn!(slot, "{} replaced by {name}", old.name);
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.entries.iter().map(|(slot, entry)| (*slot, entry.name))
    }

    #[must_use]
    pub fn name(&self, slot: usize) -> Option<&'static str> {
        self.entries.get(&slot).map(|entry| entry.name)
    }

    pub fn build(&self, slot: usize) -> Result<Box<dyn Coprocessor>> {
        let entry = self.entries.get(&slot).ok_or(Error::UnknownSlot(slot))?;
        (entry.factory)()
    }
}

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    Stopped,
    Suspended { slot: usize, address: u32 },
}

pub struct Dispatcher {
    registry: Registry,
    harness: Option<Harness>,
    /// Parked here between harnesses.
    probe: Option<Box<dyn DebugProbe>>,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(registry: Registry) -> Self {
        Self {
            registry,
            harness: None,
            probe: None,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn DebugProbe>) -> Self {
        match self.harness.as_mut() {
            Some(harness) => harness.set_probe(Some(probe)),
            None => self.probe = Some(probe),
        }
        self
    }

    #[must_use]
    pub const fn harness(&self) -> Option<&Harness> {
        self.harness.as_ref()
    }

    pub const fn harness_mut(&mut self) -> Option<&mut Harness> {
        self.harness.as_mut()
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs whichever co-processor the Tube selects, switching on reselect,
    /// until the Tube stops or the probe suspends. Call again to resume.
    pub fn run(&mut self, tube: &mut dyn Tube) -> Result<DispatchExit> {
        loop {
            let mut harness = match self.harness.take() {
                Some(harness) => harness,
                None => self.start(tube.snapshot().copro)?,
            };

            let exit = match harness.resume(tube) {
                HarnessExit::Halted(_) => harness.await_reset(tube),
                exit => Some(exit),
            };
            match exit {
                Some(HarnessExit::Reselect { from, to }) => {
                    info!(from, to, "switching co-processor");
                    self.probe = harness.take_probe();
                }
                Some(HarnessExit::Stopped) => {
                    self.harness = Some(harness);
                    return Ok(DispatchExit::Stopped);
                }
                Some(HarnessExit::Suspended { address }) => {
                    let slot = harness.slot();
                    self.harness = Some(harness);
                    return Ok(DispatchExit::Suspended { slot, address });
                }
                // reset in place after a halt
                Some(HarnessExit::Halted(_)) | None => self.harness = Some(harness),
            }
        }
    }

    fn start(&mut self, slot: usize) -> Result<Harness> {
        let copro = self.registry.build(slot)?;
        info!(slot, "starting {}", copro.name());
        let mut harness = Harness::new(copro, slot);
        harness.set_probe(self.probe.take());
        Ok(harness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdp11::rom::BANNER;
    use crate::probe::Breakpoints;
    use crate::tube::{HostEvent, LoopbackTube};
    use pretty_assertions::assert_eq;

    fn banner() -> &'static [u8] {
        &BANNER[..BANNER.len() - 1]
    }

    fn pdp11_in(registry: &mut Registry, slot: usize, rom: Option<Vec<u8>>) {
        registry.register(slot, "PDP-11", move || {
            Ok(Box::new(Pdp11::new(rom.clone(), false)?) as Box<dyn Coprocessor>)
        });
    }

    fn words(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn from_config_places_pdp11() {
        let mut config = Config::default();
        config.pdp11.slot = 4;
        let registry = Registry::from_config(&config).unwrap();
        assert_eq!(registry.slots().collect::<Vec<_>>(), vec![(4, "PDP-11")]);
        assert!(registry.build(4).is_ok());
        assert!(matches!(registry.build(0), Err(Error::UnknownSlot(0))));
    }

    #[test]
    fn from_config_reports_missing_rom() {
        let mut config = Config::default();
        config.pdp11.rom = Some("/nonexistent/client.rom".into());
        assert!(matches!(Registry::from_config(&config), Err(Error::Io { .. })));
    }

    #[test]
    fn unknown_selection_is_an_error() {
        let mut registry = Registry::new();
        pdp11_in(&mut registry, 0, None);
        let mut tube = LoopbackTube::new(5);
        let mut dispatcher = Dispatcher::new(registry);
        assert!(matches!(dispatcher.run(&mut tube), Err(Error::UnknownSlot(5))));
    }

    #[test]
    fn reselect_starts_other_slot() {
        let mut registry = Registry::new();
        pdp11_in(&mut registry, 0, None);
        pdp11_in(&mut registry, 3, None);
        let mut tube = LoopbackTube::new(0);
        tube.schedule(300, HostEvent::Select(3));
        tube.schedule(300, HostEvent::Reset);
        tube.schedule(310, HostEvent::ReleaseReset);
        tube.set_poll_limit(Some(800));
        let mut dispatcher = Dispatcher::new(registry);

        assert_eq!(dispatcher.run(&mut tube).unwrap(), DispatchExit::Stopped);
        assert_eq!(dispatcher.harness().map(Harness::slot), Some(3));
        assert_eq!(tube.received(1), [banner(), banner()].concat());
    }

    #[test]
    fn halt_then_reset_in_place() {
        // MOVB #101,@#177762 ; HALT
        let rom = words(&[0o112737, 0o101, 0o177762, 0o000000]);
        let mut registry = Registry::new();
        pdp11_in(&mut registry, 0, Some(rom));
        let mut tube = LoopbackTube::new(0);
        tube.schedule(5, HostEvent::Reset);
        tube.schedule(6, HostEvent::ReleaseReset);
        tube.set_poll_limit(Some(20));
        let mut dispatcher = Dispatcher::new(registry);

        assert_eq!(dispatcher.run(&mut tube).unwrap(), DispatchExit::Stopped);
        assert_eq!(tube.received(1), b"AA");
        assert_eq!(dispatcher.harness().map(Harness::slot), Some(0));
    }

    #[test]
    fn probe_follows_reselection() {
        let mut registry = Registry::new();
        pdp11_in(&mut registry, 0, None);
        pdp11_in(&mut registry, 1, None);
        let mut tube = LoopbackTube::new(0);
        tube.schedule(300, HostEvent::Select(1));
        tube.schedule(300, HostEvent::Reset);
        tube.schedule(301, HostEvent::ReleaseReset);
        let mut probe = Breakpoints::new(4);
        probe.set_enabled(true);
        probe.add_breakpoint(0o174032);
        let mut dispatcher = Dispatcher::new(registry).with_probe(Box::new(probe));

        let first = dispatcher.run(&mut tube).unwrap();
        assert_eq!(first, DispatchExit::Suspended { slot: 0, address: 0o174032 });

        let second = dispatcher.run(&mut tube).unwrap();
        assert_eq!(second, DispatchExit::Suspended { slot: 1, address: 0o174032 });
        assert_eq!(tube.received(1), [banner(), banner()].concat());
        assert!(dispatcher.harness_mut().and_then(Harness::probe_mut).is_some());
    }
}
