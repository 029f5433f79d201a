//! MIDI input subsystem for the ostinato host.
//!
//! Messages arrive on the MIDI backend's thread, are stamped with their
//! arrival instant and pushed into a lock-free queue. The audio thread drains
//! that queue once per block through [`MidiInputReader`], which implements
//! [`ostinato_core::MidiInputQueue`].
//!
//! Feature gates: `midi-io` (hardware input via midir).

pub mod error;
pub use error::{Error, Result};

mod queue;
pub use queue::{input_queue, MidiInputProducer, MidiInputReader};

#[cfg(feature = "midi-io")]
mod input;
#[cfg(feature = "midi-io")]
pub use input::{InputMode, MessageSink, MidiInputDevice, MidiInputInfo, MidiInputs};
