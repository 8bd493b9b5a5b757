use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while setting up a co-processor. Nothing the guest does ends up
/// here: guest faults are traps handled inside the interpreter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("rom image is {len} bytes, at most {max} fit at {base:#06X}")]
    RomTooLarge { len: usize, max: usize, base: u16 },
    #[error("no co-processor registered in slot {0}")]
    UnknownSlot(usize),
    #[error("invalid register value {text:?} for {register}")]
    RegisterParse { register: &'static str, text: String },
    #[error("register index {0} out of range")]
    RegisterIndex(usize),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
