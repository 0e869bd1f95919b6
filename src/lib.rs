//! # Solfa
//!
//! Solfa is an interactive ear-training drill. Each set plays a cadence
//! to establish a key, then short random melodies whose notes the listener
//! names by scale degree.
//!
//! The drill logic lives in `solfa-core`; this crate supplies the parts that
//! touch the outside world.
//!
//! ## Modules
//!
//! - `audio`: Voice engines behind the core's clock abstraction: a built-in
//!   cpal synth and a MIDI output driver.
//! - `commands`: The REPL command registry and the handlers that feed a
//!   drill session and render its events.
//! - `repl`: Provides the Read-Eval-Print Loop the drill runs in.

pub mod audio;
pub mod commands;
pub mod repl;

pub use crate::audio::{AudioContext, Backend, MidiClock};
