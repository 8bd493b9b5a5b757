use std::io::{self, Write};

use emu::tube::{LoopbackTube, ParasitePort, Tube, TubeSnapshot};
use tracing::warn;

/// R1 data channel: the host's VDU stream.
const VDU_CHANNEL: u8 = 1;

/// A [`LoopbackTube`] whose R1 output goes straight to stdout instead of
/// being captured.
pub struct ConsoleTube {
    inner: LoopbackTube,
    out: io::Stdout,
}

impl ConsoleTube {
    pub fn new(copro: usize) -> Self {
        Self {
            inner: LoopbackTube::new(copro),
            out: io::stdout(),
        }
    }

    pub const fn set_instruction_limit(&mut self, limit: Option<u64>) {
        self.inner.set_poll_limit(limit);
    }

    /// Queues host-to-parasite bytes on R1.
    pub fn type_text(&mut self, text: &str) {
        for byte in text.bytes() {
            self.inner.send(1, byte);
        }
    }

    fn echo(&mut self, value: u8) {
        let mut out = self.out.lock();
        let result = out
            .write_all(&[value])
            .and_then(|()| if value == b'\n' { out.flush() } else { Ok(()) });
        if let Err(e) = result {
            warn!("stdout: {e}");
        }
    }
}

impl ParasitePort for ConsoleTube {
    fn read(&mut self, channel: u8) -> u8 {
        self.inner.read(channel)
    }

    fn write(&mut self, channel: u8, value: u8) {
        if channel & 7 == VDU_CHANNEL {
            self.echo(value);
        } else {
            self.inner.write(channel, value);
        }
    }
}

impl Tube for ConsoleTube {
    fn port(&mut self) -> &mut dyn ParasitePort {
        self
    }

    fn snapshot(&self) -> TubeSnapshot {
        self.inner.snapshot()
    }

    fn ack_nmi(&mut self) {
        self.inner.ack_nmi();
    }

    fn wait_for_reset_release(&mut self) {
        self.inner.wait_for_reset_release();
    }

    fn is_running(&mut self) -> bool {
        let running = self.inner.is_running();
        if !running {
            if let Err(e) = self.out.flush() {
                warn!("stdout: {e}");
            }
        }
        running
    }
}
