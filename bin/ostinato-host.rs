//! Host binary: runs one plugin on one audio device until Enter is pressed.
//!
//! ```text
//! ostinato-host <config.toml>
//! ostinato-host --list
//! ```

use crossbeam_channel::{bounded, RecvTimeoutError};
use ostinato::{HostConfig, Result, SessionBuilder};
use std::env;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EDITOR_IDLE_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(arg) = env::args().nth(1) else {
        eprintln!("usage: ostinato-host <config.toml> | --list");
        return ExitCode::from(2);
    };

    let result = if arg == "--list" {
        list_devices()
    } else {
        run(PathBuf::from(arg))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ostinato-host failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: PathBuf) -> Result<()> {
    let config = HostConfig::load(&config_path)?;
    let mut session = SessionBuilder::from_config(config).build()?;

    let properties = session.plugin_properties();
    tracing::info!(
        inputs = properties.num_inputs,
        outputs = properties.num_outputs,
        instrument = properties.is_instrument,
        "plugin ready"
    );

    session.start()?;
    println!("Running. Press Enter to stop.");

    let (quit_tx, quit_rx) = bounded::<()>(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = quit_tx.send(());
    });

    loop {
        match quit_rx.recv_timeout(EDITOR_IDLE_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        for notification in session.poll_host_notifications() {
            tracing::info!(?notification, "plugin notification");
        }
        session.editor_idle();
    }

    let dropped = session.dropped_midi();
    if dropped > 0 {
        tracing::warn!(dropped, "MIDI messages dropped past the per-block batch");
    }
    session.stop()?;
    Ok(())
}

fn list_devices() -> Result<()> {
    #[cfg(feature = "cpal")]
    {
        use ostinato::core::driver::CpalDriver;
        println!("Audio outputs:");
        for device in CpalDriver::list_output_devices()? {
            println!("  [{}] {}", device.index, device.name);
        }
        println!("Audio inputs:");
        for device in CpalDriver::list_input_devices()? {
            println!("  [{}] {}", device.index, device.name);
        }
    }

    #[cfg(feature = "midi-hardware")]
    {
        println!("MIDI inputs:");
        for input in ostinato::midi_io::MidiInputs::enumerate()? {
            println!("  [{}] {}", input.index, input.name);
        }
    }

    Ok(())
}
