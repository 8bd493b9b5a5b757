//! Second-processor harness for the BBC Micro Tube and the PDP-11
//! co-processor that runs inside it.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;

pub mod config;
pub mod copro;
pub mod error;
pub mod memory;

#[allow(clippy::missing_panics_doc)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::unreadable_literal)]
#[allow(clippy::similar_names)]
pub mod pdp11;

pub mod probe;
pub mod tube;
