// SPDX-License-Identifier: GPL-3.0-or-later

//! MIDI transport adapter. spec.md §6 draws the boundary at "a read function
//! that delivers raw MIDI bytes; a write function that accepts raw MIDI
//! bytes" — this module is the concrete adapter implementing that boundary
//! with `midir`, the way the teacher's `hinawa`/`hitaki` FFI wrappers sit
//! behind `core::dispatcher`'s `attach_*` calls without the dispatcher
//! itself knowing about FireWire.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use oscmix_core::Error;

/// Bytes in, bytes out; `midir`'s callback-driven input is adapted to a
/// blocking `read()` so it can feed `oscmix_core::Dispatcher::attach_midi_reader`,
/// which expects a blocking closure per logical reader thread.
pub struct MidiEndpoint {
    _input: MidiInputConnection<()>,
    output: Arc<Mutex<MidiOutputConnection>>,
    incoming: Receiver<Vec<u8>>,
}

impl MidiEndpoint {
    pub fn open(port_name: &str) -> Result<Self, Error> {
        let midi_in =
            MidiInput::new("oscmix-in").map_err(|e| Error::Fatal(format!("midi input: {e}")))?;
        let midi_out = MidiOutput::new("oscmix-out")
            .map_err(|e| Error::Fatal(format!("midi output: {e}")))?;

        let in_port = find_port(&midi_in.ports(), |p| midi_in.port_name(p).ok(), port_name)
            .ok_or_else(|| Error::Fatal(format!("no MIDI input port named {port_name:?}")))?;
        let out_port = find_port(&midi_out.ports(), |p| midi_out.port_name(p).ok(), port_name)
            .ok_or_else(|| Error::Fatal(format!("no MIDI output port named {port_name:?}")))?;

        let (tx, rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = mpsc::channel();
        let connection = midi_in
            .connect(
                &in_port,
                "oscmix-in-conn",
                move |_stamp, message, _ctx| {
                    let _ = tx.send(message.to_vec());
                },
                (),
            )
            .map_err(|e| Error::Fatal(format!("midi connect: {e}")))?;

        let out_conn = midi_out
            .connect(&out_port, "oscmix-out-conn")
            .map_err(|e| Error::Fatal(format!("midi connect: {e}")))?;

        Ok(MidiEndpoint {
            _input: connection,
            output: Arc::new(Mutex::new(out_conn)),
            incoming: rx,
        })
    }

    /// Blocking read of the next complete MIDI message delivered by the
    /// backend callback.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        self.incoming
            .recv()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }

    /// A cloneable writer handle so the consumption loop can send framed
    /// SysEx without holding the endpoint itself.
    pub fn writer(&self) -> MidiWriter {
        MidiWriter {
            output: self.output.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MidiWriter {
    output: Arc<Mutex<MidiOutputConnection>>,
}

impl MidiWriter {
    pub fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "midi output poisoned"))?;
        out.send(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

fn find_port<P: Clone>(ports: &[P], name_of: impl Fn(&P) -> Option<String>, wanted: &str) -> Option<P> {
    ports
        .iter()
        .find(|p| name_of(p).as_deref() == Some(wanted))
        .cloned()
}
