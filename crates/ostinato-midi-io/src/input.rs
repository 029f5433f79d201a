//! Hardware MIDI input via midir.

use crate::queue::{input_queue, MidiInputReader};
use crate::{Error, Result};
use midir::{MidiInput, MidiInputConnection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const CLIENT_NAME: &str = "ostinato";

/// Closure receiving raw message bytes on the MIDI backend thread.
pub type MessageSink = Box<dyn FnMut(&[u8]) + Send>;

/// A MIDI input port as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiInputInfo {
    pub index: usize,
    pub name: String,
}

/// Port enumeration.
pub struct MidiInputs;

impl MidiInputs {
    pub fn enumerate() -> Result<Vec<MidiInputInfo>> {
        let input = MidiInput::new(CLIENT_NAME)?;
        input
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                Ok(MidiInputInfo {
                    index,
                    name: input.port_name(port)?,
                })
            })
            .collect()
    }
}

/// Where incoming messages go.
pub enum InputMode {
    /// Into a lock-free queue of `capacity` messages, drained by the
    /// returned [`MidiInputReader`].
    Queue { capacity: usize },
    /// To a closure on the backend thread. No reader is returned.
    Callback(MessageSink),
}

/// An open MIDI input port.
///
/// Messages are only accepted between [`start`](Self::start) and
/// [`stop`](Self::stop). Dropping the device disconnects it.
pub struct MidiInputDevice {
    name: String,
    running: Arc<AtomicBool>,
    connection: Option<MidiInputConnection<()>>,
}

impl MidiInputDevice {
    /// Open the port at `index` in [`MidiInputs::enumerate`] order.
    pub fn open(index: usize, mode: InputMode) -> Result<(Self, Option<MidiInputReader>)> {
        let input = MidiInput::new(CLIENT_NAME)?;
        let ports = input.ports();
        let port = ports
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("index {index} (available: {})", ports.len())))?;
        let name = input.port_name(port)?;
        Self::connect(input, port, name, mode)
    }

    /// Open the first port whose name matches exactly.
    pub fn open_by_name(name: &str, mode: InputMode) -> Result<(Self, Option<MidiInputReader>)> {
        let input = MidiInput::new(CLIENT_NAME)?;
        let ports = input.ports();
        let port = ports
            .iter()
            .find(|port| input.port_name(port).is_ok_and(|n| n == name))
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Self::connect(input, port, name.to_string(), mode)
    }

    fn connect(
        input: MidiInput,
        port: &midir::MidiInputPort,
        name: String,
        mode: InputMode,
    ) -> Result<(Self, Option<MidiInputReader>)> {
        let running = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&running);

        let (mut sink, reader): (MessageSink, _) = match mode {
            InputMode::Queue { capacity } => {
                if capacity == 0 {
                    return Err(Error::InvalidConfig("queue capacity must be non-zero".into()));
                }
                let (mut producer, reader) = input_queue(capacity);
                let sink = move |bytes: &[u8]| {
                    if !producer.push(bytes, Instant::now()) {
                        debug!(len = bytes.len(), "MIDI input message dropped");
                    }
                };
                (Box::new(sink) as MessageSink, Some(reader))
            }
            InputMode::Callback(handler) => (handler, None),
        };

        let connection = input.connect(
            port,
            "ostinato-input",
            move |_stamp, bytes, _| {
                if gate.load(Ordering::Acquire) {
                    sink(bytes);
                }
            },
            (),
        )?;

        info!(port = %name, "opened MIDI input");
        Ok((
            Self {
                name,
                running,
                connection: Some(connection),
            },
            reader,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        debug!(port = %self.name, "MIDI input started");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        debug!(port = %self.name, "MIDI input stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn close(mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.running.store(false, Ordering::Release);
            let _ = connection.close();
            info!(port = %self.name, "closed MIDI input");
        }
    }
}

impl Drop for MidiInputDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}
