// SPDX-License-Identifier: GPL-3.0-or-later

//! Wires the Parameter Tree, Device Model, and Scheduler into a running
//! bridge (spec.md §4.5, §6). Grounded on the teacher's
//! `ServiceCmd::run()`/`Dispatcher` pairing in
//! `runtime/fireface/src/bin/snd-fireface-ctl-service.rs`: there `run()`
//! opens the card, builds the model, attaches the card and signal sources to
//! a `Dispatcher`, and blocks on its main loop; here `BridgeRuntime::run()`
//! opens the MIDI endpoint and UDP sockets, attaches the same three sources,
//! and drains `Dispatcher::recv()` itself rather than handing control to a
//! GLib main loop.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use log::{debug, trace, warn};
use socket2::{Domain, Socket, Type};

use oscmix_core::{device, tree, Dispatcher, DeviceModel, Event};
use oscmix_proto::sysex::{self, DecodeOutcome, FramePayload, SubId};

use crate::config::{self, Cli};
use crate::midi_io::{MidiEndpoint, MidiWriter};
use crate::snapshot;
use crate::translation;

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const SYSEX_REASSEMBLY_LIMIT: usize = 8 * 1024;
const METER_REQUEST_REG: u16 = 0x3f20;
const METER_REQUEST_MAGIC: u16 = 0x0001;

pub struct BridgeRuntime {
    model: DeviceModel,
    dispatcher: Dispatcher,
    midi_writer: MidiWriter,
    send_socket: UdpSocket,
    send_addr: SocketAddr,
    meters_enabled: bool,
    assembler: SysexAssembler,
    levels_cache: LevelsCache,
}

impl BridgeRuntime {
    pub fn new(cli: &Cli) -> Result<Self, oscmix_core::Error> {
        let device_id = cli
            .device_id()
            .map_err(oscmix_core::Error::Fatal)?;
        let descriptor = device::by_id(&device_id)
            .ok_or_else(|| oscmix_core::Error::Fatal(format!("unknown device {device_id:?}")))?;
        let mut model = DeviceModel::new(descriptor);
        model.enable_all_observers();
        restore_from_snapshot(&mut model, &device_id);

        let midi_port = cli.midi_port_name().map_err(oscmix_core::Error::Fatal)?;
        let endpoint = MidiEndpoint::open(&midi_port)?;
        let midi_writer = endpoint.writer();

        let receive_addr = cli
            .receive_socket_addr()
            .map_err(oscmix_core::Error::Fatal)?;
        let recv_socket = UdpSocket::bind(receive_addr)
            .map_err(|e| oscmix_core::Error::Fatal(format!("bind {receive_addr}: {e}")))?;

        let (send_socket, send_addr) = build_send_socket(cli)?;

        let mut dispatcher = Dispatcher::new();
        dispatcher.attach_midi_reader("midi-in", move || endpoint.read());
        dispatcher.attach_osc_reader("osc-in", move || {
            let mut buf = [0u8; 8192];
            let (n, _peer) = recv_socket.recv_from(&mut buf)?;
            Ok(buf[..n].to_vec())
        });
        dispatcher.attach_periodic_tick(TICK_INTERVAL);

        Ok(BridgeRuntime {
            model,
            dispatcher,
            midi_writer,
            send_socket,
            send_addr,
            meters_enabled: !cli.disable_meters,
            assembler: SysexAssembler::default(),
            levels_cache: LevelsCache::default(),
        })
    }

    /// Current Device Model, for the shutdown snapshot in `main.rs`.
    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Drain the dispatcher forever. Returns only if every producer thread
    /// has hung up (in practice: process shutdown).
    pub fn run(&mut self) -> Result<(), oscmix_core::Error> {
        debug!("bridge runtime started");
        while let Some(event) = self.dispatcher.recv() {
            match event {
                Event::Midi(bytes) => self.handle_midi_bytes(&bytes),
                Event::Osc(datagram) => self.handle_osc_datagram(&datagram),
                Event::Tick => self.handle_tick(),
            }
        }
        debug!("bridge runtime stopped: every event source hung up");
        Ok(())
    }

    fn handle_midi_bytes(&mut self, bytes: &[u8]) {
        for frame in self.assembler.push(bytes) {
            self.handle_sysex_frame(&frame);
        }
    }

    fn handle_sysex_frame(&mut self, frame: &[u8]) {
        let (outcome, payload) = sysex::decode_frame(frame);
        match outcome {
            DecodeOutcome::Ok => trace!("decoded sysex frame, {} bytes", frame.len()),
            other => {
                warn!("sysex decode failed: {other:?}");
                if payload.is_none() {
                    return;
                }
            }
        }
        let Some((sub_id, payload)) = payload else { return };
        match payload {
            FramePayload::RegisterWords(words) => self.handle_register_words(words),
            FramePayload::Levels(raw) => self.handle_levels(sub_id, &raw),
        }
    }

    fn handle_register_words(&mut self, words: Vec<Result<oscmix_proto::RegisterWord, u16>>) {
        for word in words {
            match word {
                Ok(word) => {
                    let events = self.model.apply_register_update(word);
                    for event in events {
                        for msg in translation::model_event_to_osc(&self.model, &event) {
                            self.send_osc(&msg);
                        }
                    }
                }
                Err(addr) => warn!("dropped register word with bad parity at {addr:#06x}"),
            }
        }
    }

    fn handle_levels(&mut self, sub_id: SubId, raw: &[u8]) {
        if !self.meters_enabled {
            return;
        }
        let samples = oscmix_proto::decode_levels(raw);
        let Some((base, leaf)) = self.levels_cache.classify(sub_id) else {
            return;
        };
        for msg in translation::meter_messages(base, leaf, &samples) {
            self.send_osc(&msg);
        }
    }

    fn handle_osc_datagram(&mut self, datagram: &[u8]) {
        let packet = match rosc::decoder::decode_udp(datagram) {
            Ok((_, packet)) => packet,
            Err(e) => {
                warn!("dropped malformed OSC datagram: {e:?}");
                return;
            }
        };
        for msg in flatten_packet(packet) {
            match translation::apply_osc_message(&mut self.model, &msg) {
                Ok(writes) => {
                    for write in writes {
                        let frame = sysex::encode_register_frame(&[(write.addr, write.value)]);
                        if let Err(e) = self.midi_writer.write(&frame) {
                            warn!("midi write failed: {e}");
                        }
                    }
                }
                Err(err) => {
                    warn!("rejected {}: {err}", msg.addr);
                    if let Some((code, kind, detail)) = err.as_osc_error() {
                        let error_msg = rosc::OscMessage {
                            addr: "/error".to_string(),
                            args: vec![
                                rosc::OscType::Int(code),
                                rosc::OscType::String(kind.to_string()),
                                rosc::OscType::String(detail),
                            ],
                        };
                        self.send_osc(&error_msg);
                    }
                }
            }
        }
    }

    fn handle_tick(&mut self) {
        if self.meters_enabled {
            let frame = sysex::encode_register_frame(&[(METER_REQUEST_REG, METER_REQUEST_MAGIC)]);
            if let Err(e) = self.midi_writer.write(&frame) {
                warn!("meter request failed: {e}");
            }
        }
    }

    fn send_osc(&self, msg: &rosc::OscMessage) {
        let packet = rosc::OscPacket::Message(msg.clone());
        match rosc::encoder::encode(&packet) {
            Ok(bytes) => {
                if let Err(e) = self.send_socket.send_to(&bytes, self.send_addr) {
                    warn!("osc send failed: {e}");
                }
            }
            Err(e) => warn!("osc encode failed: {e:?}"),
        }
    }
}

fn flatten_packet(packet: rosc::OscPacket) -> Vec<rosc::OscMessage> {
    match packet {
        rosc::OscPacket::Message(m) => vec![m],
        rosc::OscPacket::Bundle(b) => b.content.into_iter().flat_map(flatten_packet).collect(),
    }
}

fn build_send_socket(cli: &Cli) -> Result<(UdpSocket, SocketAddr), oscmix_core::Error> {
    let send_addr = cli.send_socket_addr().map_err(oscmix_core::Error::Fatal)?;
    if cli.is_multicast() {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)
            .map_err(|e| oscmix_core::Error::Fatal(format!("multicast socket: {e}")))?;
        socket
            .set_multicast_ttl_v4(1)
            .map_err(|e| oscmix_core::Error::Fatal(format!("multicast ttl: {e}")))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| oscmix_core::Error::Fatal(format!("multicast loop: {e}")))?;
        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket
            .bind(&bind_addr.into())
            .map_err(|e| oscmix_core::Error::Fatal(format!("multicast bind: {e}")))?;
        Ok((socket.into(), send_addr))
    } else {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| oscmix_core::Error::Fatal(format!("udp send socket: {e}")))?;
        Ok((socket, send_addr))
    }
}

/// Re-seed the Device Model's shadow state from the last saved snapshot
/// (spec.md §6 "restore prior gains/mutes/mixer state on startup"), so the
/// bridge has sensible values to report before the device's first refresh
/// completes. A missing or unreadable snapshot just leaves the model at its
/// power-on defaults — there's nothing to restore on a device's first run.
fn restore_from_snapshot(model: &mut DeviceModel, device_id: &str) {
    restore_from_path(model, device_id, &config::snapshot_path(device_id));
}

fn restore_from_path(model: &mut DeviceModel, device_id: &str, path: &std::path::Path) {
    let snap = match snapshot::load(path) {
        Ok(snap) => snap,
        Err(e) => {
            debug!("no snapshot restored from {}: {e}", path.display());
            return;
        }
    };
    if snap.device_id != device_id {
        warn!(
            "snapshot at {} is for device {:?}, not {device_id:?}; ignoring",
            path.display(),
            snap.device_id
        );
        return;
    }

    for (index, input) in snap.inputs.iter().enumerate() {
        model.speculative_write(tree::input_register(index, tree::INPUT_GAIN_OFFSET), input.gain as u16);
        model.speculative_write(tree::input_register(index, tree::INPUT_MUTE_OFFSET), input.mute as u16);
        model.speculative_write(tree::input_register(index, tree::INPUT_STEREO_OFFSET), input.stereo as u16);
        model.speculative_write(tree::input_register(index, tree::INPUT_48V_OFFSET), input.phantom as u16);
        model.speculative_write(tree::input_register(index, tree::INPUT_HIZ_OFFSET), input.hiz as u16);
        model.speculative_write(tree::input_register(index, tree::INPUT_REFLEVEL_OFFSET), input.reflevel as u16);
    }
    for (index, output) in snap.outputs.iter().enumerate() {
        model.speculative_write(tree::output_register(index, tree::OUTPUT_VOLUME_OFFSET), output.volume as u16);
        model.speculative_write(tree::output_register(index, tree::OUTPUT_MUTE_OFFSET), output.mute as u16);
        model.speculative_write(tree::output_register(index, tree::OUTPUT_STEREO_OFFSET), output.stereo as u16);
        model.speculative_write(tree::output_register(index, tree::OUTPUT_REFLEVEL_OFFSET), output.reflevel as u16);
        model.speculative_write(tree::output_register(index, tree::OUTPUT_DITHER_OFFSET), output.dither as u16);
    }
    for cell in &snap.mixer {
        let vol_reg = tree::mixer_register(cell.bus, cell.source);
        model.speculative_write(vol_reg, cell.volume as u16);
        model.speculative_write(vol_reg + 1, cell.pan as u8 as u16);
    }
    debug!("restored snapshot from {}", path.display());
}

/// Reassembles `0xF0..0xF7` SysEx frames out of arbitrarily-chunked MIDI
/// reads, dropping and resyncing on oversize input (spec.md §5 "MIDI SysEx
/// frames larger than the reassembly buffer (8 KiB) are dropped and the
/// decoder resyncs on the next `0xF0`").
#[derive(Default)]
struct SysexAssembler {
    buf: Vec<u8>,
}

impl SysexAssembler {
    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            let Some(start) = self.buf.iter().position(|&b| b == 0xF0) else {
                self.buf.clear();
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
            }
            match self.buf.iter().position(|&b| b == 0xF7) {
                Some(end) => {
                    frames.push(self.buf[..=end].to_vec());
                    self.buf.drain(..=end);
                }
                None => {
                    if self.buf.len() > SYSEX_REASSEMBLY_LIMIT {
                        warn!("sysex frame exceeded reassembly limit, resyncing");
                        self.buf.clear();
                    }
                    break;
                }
            }
        }
        frames
    }
}

/// Pairs pre-FX and post-FX level snapshots so a completed pair can be
/// republished as a single `/.../fxlevel` message per spec.md §4.4, while a
/// lone pre-FX or playback snapshot still republishes immediately as
/// `/.../level`.
#[derive(Default)]
struct LevelsCache {
    pending_pre_input: bool,
    pending_pre_output: bool,
}

impl LevelsCache {
    fn classify(&mut self, sub_id: SubId) -> Option<(&'static str, &'static str)> {
        match sub_id {
            SubId::PreFxInputLevels => {
                self.pending_pre_input = true;
                Some(("input", "level"))
            }
            SubId::PreFxOutputLevels => {
                self.pending_pre_output = true;
                Some(("output", "level"))
            }
            SubId::PlaybackLevels => Some(("playback", "level")),
            SubId::PostFxInputLevels => {
                if self.pending_pre_input {
                    self.pending_pre_input = false;
                    Some(("input", "fxlevel"))
                } else {
                    None
                }
            }
            SubId::PostFxOutputLevels => {
                if self.pending_pre_output {
                    self.pending_pre_output = false;
                    Some(("output", "fxlevel"))
                } else {
                    None
                }
            }
            SubId::RegisterWrites => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscmix_core::device::fireface_ucx2;

    #[test]
    fn restore_seeds_gain_mute_and_mixer_from_a_saved_snapshot() {
        let mut snap = snapshot::Snapshot {
            device_id: "ucx2".to_string(),
            ..Default::default()
        };
        snap.inputs.push(snapshot::InputSnapshot {
            gain: 120,
            phantom: false,
            hiz: false,
            pad: false,
            mute: true,
            stereo: false,
            reflevel: 0,
        });
        snap.mixer.push(snapshot::MixerSnapshot {
            bus: 0,
            source: 0,
            volume: -60,
            pan: 0,
        });
        let path = std::env::temp_dir().join(format!("oscmix-restore-test-{}.json", std::process::id()));
        snapshot::save(&snap, &path).unwrap();

        let mut model = DeviceModel::new(fireface_ucx2());
        restore_from_path(&mut model, "ucx2", &path);
        std::fs::remove_file(&path).ok();

        assert!(model.input(0).unwrap().mute);
        assert_eq!(model.mixer_cell(0, 0).volume, -60);
    }

    #[test]
    fn restore_ignores_a_snapshot_for_a_different_device() {
        let snap = snapshot::Snapshot {
            device_id: "ff802".to_string(),
            ..Default::default()
        };
        let path = std::env::temp_dir().join(format!("oscmix-restore-mismatch-{}.json", std::process::id()));
        snapshot::save(&snap, &path).unwrap();

        let mut model = DeviceModel::new(fireface_ucx2());
        restore_from_path(&mut model, "ucx2", &path);
        std::fs::remove_file(&path).ok();

        assert!(model.input(0).unwrap().gain == 0);
    }

    #[test]
    fn assembler_extracts_one_complete_frame() {
        let mut a = SysexAssembler::default();
        let frames = a.push(&[0xF0, 0x01, 0x02, 0xF7]);
        assert_eq!(frames, vec![vec![0xF0, 0x01, 0x02, 0xF7]]);
        assert!(a.buf.is_empty());
    }

    #[test]
    fn assembler_accumulates_split_frame() {
        let mut a = SysexAssembler::default();
        assert!(a.push(&[0xF0, 0x01]).is_empty());
        let frames = a.push(&[0x02, 0xF7]);
        assert_eq!(frames, vec![vec![0xF0, 0x01, 0x02, 0xF7]]);
    }

    #[test]
    fn assembler_resyncs_past_garbage() {
        let mut a = SysexAssembler::default();
        let frames = a.push(&[0x99, 0x98, 0xF0, 0x01, 0xF7]);
        assert_eq!(frames, vec![vec![0xF0, 0x01, 0xF7]]);
    }

    #[test]
    fn levels_cache_pairs_pre_and_post() {
        let mut cache = LevelsCache::default();
        assert_eq!(cache.classify(SubId::PreFxInputLevels), Some(("input", "level")));
        assert_eq!(
            cache.classify(SubId::PostFxInputLevels),
            Some(("input", "fxlevel"))
        );
        // A second post-FX frame with no preceding pre-FX frame is dropped.
        assert_eq!(cache.classify(SubId::PostFxInputLevels), None);
    }

    #[test]
    fn levels_cache_playback_is_always_direct() {
        let mut cache = LevelsCache::default();
        assert_eq!(cache.classify(SubId::PlaybackLevels), Some(("playback", "level")));
    }
}
