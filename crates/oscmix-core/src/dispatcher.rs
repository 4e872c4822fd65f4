// SPDX-License-Identifier: GPL-3.0-or-later

//! Scheduler/Dispatcher (spec.md §4.5): interleaves the MIDI reader, the OSC
//! reader, and a periodic tick, and totally orders their effect on the
//! Device Model. Grounded on the teacher's `Dispatcher`
//! (`runtime/core/src/dispatcher.rs`): one thread per I/O source, each
//! `attach_*` call registering a source against it. The teacher attaches
//! GLib sources to a single `MainLoop` thread; there is no GLib here, so
//! each source gets its own OS thread that forwards into one `mpsc`
//! channel, and that channel — not a mutex — is the single exclusive
//! section spec.md §5 requires: only the thread draining it ever touches
//! the Device Model.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One unit of work crossing into the Device Model's exclusive section.
#[derive(Debug)]
pub enum Event {
    /// Raw bytes read from the MIDI input endpoint, not yet SysEx-framed.
    Midi(Vec<u8>),
    /// One raw UDP datagram read from the OSC socket.
    Osc(Vec<u8>),
    /// Fired every tick interval (spec.md §4.5 "Periodic tick", 100 ms).
    Tick,
}

/// Runs the three logical activities of spec.md §4.5 each on their own
/// thread and serialises their output through one channel. Dropping the
/// dispatcher detaches its threads; blocking reader threads are not joined,
/// matching spec.md §5's "I/O is cancelled only on process shutdown" (the
/// process exits out from under them).
pub struct Dispatcher {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    threads: Vec<JoinHandle<()>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Dispatcher {
            sender,
            receiver,
            threads: Vec::new(),
        }
    }

    /// A cloneable handle producer threads use to post events.
    pub fn sender(&self) -> Sender<Event> {
        self.sender.clone()
    }

    /// Spawn a thread that repeatedly calls `read_fn`, posting each
    /// successful read as [`Event::Midi`]. `read_fn` returning `Err` logs a
    /// transport warning and keeps reading, per spec.md §7 ("Transport...
    /// never fatal during steady state").
    pub fn attach_midi_reader<F>(&mut self, name: impl Into<String>, mut read_fn: F)
    where
        F: FnMut() -> std::io::Result<Vec<u8>> + Send + 'static,
    {
        let name = name.into();
        let tx = self.sender.clone();
        let handle = thread::spawn(move || loop {
            match read_fn() {
                Ok(bytes) => {
                    if tx.send(Event::Midi(bytes)).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{name}: transport error: {e}"),
            }
        });
        self.threads.push(handle);
    }

    /// Spawn a thread that repeatedly calls `read_fn`, posting each received
    /// datagram as [`Event::Osc`].
    pub fn attach_osc_reader<F>(&mut self, name: impl Into<String>, mut read_fn: F)
    where
        F: FnMut() -> std::io::Result<Vec<u8>> + Send + 'static,
    {
        let name = name.into();
        let tx = self.sender.clone();
        let handle = thread::spawn(move || loop {
            match read_fn() {
                Ok(bytes) => {
                    if tx.send(Event::Osc(bytes)).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{name}: transport error: {e}"),
            }
        });
        self.threads.push(handle);
    }

    /// Spawn the periodic tick thread (spec.md §4.5, every 100 ms).
    pub fn attach_periodic_tick(&mut self, interval: Duration) {
        let tx = self.sender.clone();
        let handle = thread::spawn(move || loop {
            thread::sleep(interval);
            if tx.send(Event::Tick).is_err() {
                break;
            }
        });
        self.threads.push(handle);
    }

    /// Block for the next event. Returns `None` once every sender (and
    /// every attached producer thread) has been dropped.
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn periodic_tick_fires() {
        let mut d = Dispatcher::new();
        d.attach_periodic_tick(Duration::from_millis(5));
        let event = d.receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, Event::Tick));
    }

    #[test]
    fn midi_reader_forwards_bytes() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut d = Dispatcher::new();
        d.attach_midi_reader("test-midi", move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(vec![0xf0, 0xf7])
            } else {
                std::thread::sleep(Duration::from_millis(50));
                Ok(Vec::new())
            }
        });
        let event = d.receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        match event {
            Event::Midi(bytes) => assert_eq!(bytes, vec![0xf0, 0xf7]),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
