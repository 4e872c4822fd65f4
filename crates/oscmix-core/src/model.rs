// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Model (spec.md §4.3): single source of truth for register state,
//! change-detection, refresh orchestration, and observer fan-out. Grounded
//! on the teacher's `FfModel`/`CardCntr` split in
//! `runtime/fireface/src/model.rs` — there, `cache()` seeds state from the
//! device and `dispatch_elem_event()` routes control writes; here the same
//! two directions are `apply_register_update` and `request_write`, with a
//! diff gate standing in for ALSA's control-change notification queue.

use std::collections::HashMap;

use oscmix_proto::{RegisterWord, REFRESH_DONE_SENTINEL, REFRESH_REQUEST_MAGIC};

use crate::device::DeviceDescriptor;
use crate::names::unpack_name;
use crate::tree::{self, ParameterTree, NAME_REGISTER_COUNT};

/// The six independently enable-able observer categories (spec.md §4.3
/// "Observer registration").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverCategory {
    Dsp,
    Durec,
    SampleRate,
    Input,
    Output,
    Mixer,
}

const ALL_CATEGORIES: [ObserverCategory; 6] = [
    ObserverCategory::Dsp,
    ObserverCategory::Durec,
    ObserverCategory::SampleRate,
    ObserverCategory::Input,
    ObserverCategory::Output,
    ObserverCategory::Mixer,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    /// dB*10 fixed point; `i16::MIN` marks the `-infinity` sentinel.
    pub gain: i16,
    pub phantom: bool,
    pub hiz: bool,
    pub pad: bool,
    pub mute: bool,
    pub stereo: bool,
    pub reflevel: u8,
    /// The device's own packed channel name, once it has reported one
    /// (spec.md §4.3 "Name packing"). `None` until the first name register
    /// arrives.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputState {
    pub volume: i16,
    pub mute: bool,
    pub stereo: bool,
    pub reflevel: u8,
    pub dither: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerCell {
    pub volume: i16,
    pub pan: i8,
}

/// DURec transport state (spec.md §4.4 "State machine (DURec)"). Transitions
/// are driven entirely by inbound register updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurecTransport {
    NoMedia,
    FsError,
    Initializing,
    Reinitializing,
    Unknown,
    Stopped,
    Recording,
    Playing,
    Paused,
}

impl DurecTransport {
    fn from_register(value: u16) -> Self {
        match value {
            0 => DurecTransport::NoMedia,
            1 => DurecTransport::FsError,
            2 => DurecTransport::Initializing,
            3 => DurecTransport::Reinitializing,
            4 => DurecTransport::Stopped,
            5 => DurecTransport::Recording,
            6 => DurecTransport::Playing,
            7 => DurecTransport::Paused,
            _ => DurecTransport::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurecState {
    pub status: DurecTransport,
    pub position: u32,
    pub playmode: u16,
    pub file_index: u16,
    pub file_count: usize,
    pub files: Vec<String>,
}

impl Default for DurecState {
    fn default() -> Self {
        DurecState {
            status: DurecTransport::NoMedia,
            position: 0,
            playmode: 0,
            file_index: 0,
            file_count: 0,
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DspState {
    pub firmware_version: u16,
    pub load: u8,
}

/// One change notification produced by the diff gate. Consumed by
/// `oscmix-bridge`'s translation engine to build outbound OSC messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Dsp(DspState),
    Durec(DurecState),
    SampleRate(Option<u32>),
    ClockSource(u8),
    Input { index: usize, state: InputState },
    Output { index: usize, state: OutputState },
    Mixer { bus: usize, source: usize, cell: MixerCell },
    RefreshDone,
}

impl ModelEvent {
    fn category(&self) -> ObserverCategory {
        match self {
            ModelEvent::Dsp(_) => ObserverCategory::Dsp,
            ModelEvent::Durec(_) => ObserverCategory::Durec,
            ModelEvent::SampleRate(_) | ModelEvent::ClockSource(_) => ObserverCategory::SampleRate,
            ModelEvent::Input { .. } => ObserverCategory::Input,
            ModelEvent::Output { .. } => ObserverCategory::Output,
            ModelEvent::Mixer { .. } => ObserverCategory::Mixer,
            // RefreshDone is never gated on a category; it always escapes the
            // refresh-silence rule (spec.md §4.3).
            ModelEvent::RefreshDone => ObserverCategory::Dsp,
        }
    }
}

/// A pending outbound register write, already split into addr/value; the
/// caller is responsible for framing it through `oscmix_proto::sysex` and
/// writing it to the MIDI transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub addr: u16,
    pub value: u16,
}

impl From<RegisterWrite> for RegisterWord {
    fn from(w: RegisterWrite) -> Self {
        RegisterWord {
            addr: w.addr,
            value: w.value,
        }
    }
}

/// Tracks which observer categories are currently enabled. A fixed roster
/// with no runtime registration machinery — spec.md §9 calls for replacing
/// the original's hand-rolled callback arrays with exactly this shape.
#[derive(Debug, Default)]
struct ObserverRoster {
    enabled: HashMap<ObserverCategory, bool>,
}

impl ObserverRoster {
    fn set_enabled(&mut self, category: ObserverCategory, enabled: bool) {
        self.enabled.insert(category, enabled);
    }

    fn is_enabled(&self, category: ObserverCategory) -> bool {
        *self.enabled.get(&category).unwrap_or(&true)
    }
}

pub struct DeviceModel {
    pub descriptor: DeviceDescriptor,
    pub tree: ParameterTree,
    cells: HashMap<u16, u16>,
    inputs: Vec<InputState>,
    outputs: Vec<OutputState>,
    input_name_words: Vec<[u16; NAME_REGISTER_COUNT]>,
    output_name_words: Vec<[u16; NAME_REGISTER_COUNT]>,
    mixer: HashMap<(usize, usize), MixerCell>,
    durec: DurecState,
    dsp: DspState,
    sample_rate_hz: Option<u32>,
    clock_source: u8,
    refreshing: bool,
    pending_refresh_addrs: Vec<u16>,
    observers: ObserverRoster,
}

impl DeviceModel {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        let tree = ParameterTree::build(&descriptor);
        let inputs = vec![InputState::default(); descriptor.inputs.len()];
        let outputs = vec![OutputState::default(); descriptor.outputs.len()];
        let input_name_words = vec![[0u16; NAME_REGISTER_COUNT]; descriptor.inputs.len()];
        let output_name_words = vec![[0u16; NAME_REGISTER_COUNT]; descriptor.outputs.len()];
        DeviceModel {
            descriptor,
            tree,
            cells: HashMap::new(),
            inputs,
            outputs,
            input_name_words,
            output_name_words,
            mixer: HashMap::new(),
            durec: DurecState::default(),
            dsp: DspState::default(),
            sample_rate_hz: None,
            clock_source: 0,
            refreshing: false,
            pending_refresh_addrs: Vec::new(),
            observers: ObserverRoster::default(),
        }
    }

    pub fn set_observer_enabled(&mut self, category: ObserverCategory, enabled: bool) {
        self.observers.set_enabled(category, enabled);
    }

    /// Enable every observer category; the default roster state at startup.
    pub fn enable_all_observers(&mut self) {
        for category in ALL_CATEGORIES {
            self.observers.set_enabled(category, true);
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn input(&self, index: usize) -> Option<&InputState> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&OutputState> {
        self.outputs.get(index)
    }

    pub fn mixer_cell(&self, bus: usize, source: usize) -> MixerCell {
        self.mixer.get(&(bus, source)).copied().unwrap_or_default()
    }

    pub fn durec(&self) -> &DurecState {
        &self.durec
    }

    pub fn dsp(&self) -> &DspState {
        &self.dsp
    }

    pub fn sample_rate_hz(&self) -> Option<u32> {
        self.sample_rate_hz
    }

    /// Begin a refresh pass, per spec.md §4.3. Returns `None` if one is
    /// already in flight — a second concurrent `/refresh` is a no-op, the
    /// first of the two permitted policies in spec.md §5.
    pub fn start_refresh(&mut self) -> Option<RegisterWrite> {
        if self.refreshing {
            return None;
        }
        self.refreshing = true;
        self.pending_refresh_addrs.clear();
        Some(RegisterWrite {
            addr: 0,
            value: (REFRESH_REQUEST_MAGIC & 0xffff) as u16,
        })
    }

    /// Record a register write the model itself originates (e.g. a mixer
    /// volume set from an inbound OSC message), speculatively updating the
    /// shadow so a subsequent read doesn't observe a stale value — spec.md
    /// §4.3 "Register write". The device's own echo still reconciles
    /// authoritative state through [`Self::apply_register_update`].
    pub fn speculative_write(&mut self, addr: u16, value: u16) -> Vec<ModelEvent> {
        self.cells.insert(addr, value);
        let events = self.project_register(addr, value);
        if self.refreshing {
            self.pending_refresh_addrs.push(addr);
            Vec::new()
        } else {
            self.gate(events)
        }
    }

    /// Feed one decoded register word through the diff gate (spec.md §4.3
    /// "Register observation"). Returns the notifications to emit, already
    /// filtered by refresh-suppression and per-category enablement.
    pub fn apply_register_update(&mut self, word: RegisterWord) -> Vec<ModelEvent> {
        let RegisterWord { addr, value } = word;
        if self.cells.get(&addr) == Some(&value) {
            return Vec::new();
        }
        self.cells.insert(addr, value);

        if addr == REFRESH_DONE_SENTINEL {
            return self.finish_refresh();
        }

        let events = self.project_register(addr, value);
        if self.refreshing {
            self.pending_refresh_addrs.push(addr);
            Vec::new()
        } else {
            self.gate(events)
        }
    }

    fn finish_refresh(&mut self) -> Vec<ModelEvent> {
        self.refreshing = false;
        let addrs = std::mem::take(&mut self.pending_refresh_addrs);
        let mut out = vec![ModelEvent::RefreshDone];
        for addr in addrs {
            if let Some(&value) = self.cells.get(&addr) {
                let events = self.project_register(addr, value);
                out.extend(self.gate(events));
            }
        }
        out
    }

    fn gate(&self, events: Vec<ModelEvent>) -> Vec<ModelEvent> {
        events
            .into_iter()
            .filter(|e| self.observers.is_enabled(e.category()))
            .collect()
    }

    /// Map a raw register address/value onto shadow state, returning the
    /// event(s) that register produces. Pure with respect to `refreshing` —
    /// callers decide whether to suppress the result.
    fn project_register(&mut self, addr: u16, value: u16) -> Vec<ModelEvent> {
        if let Some((index, offset)) = self.locate_input(addr) {
            let state = &mut self.inputs[index];
            match offset {
                o if o == tree::INPUT_GAIN_OFFSET => state.gain = value as i16,
                o if o == tree::INPUT_MUTE_OFFSET => state.mute = value != 0,
                o if o == tree::INPUT_STEREO_OFFSET => state.stereo = value != 0,
                o if o == tree::INPUT_48V_OFFSET => state.phantom = value != 0,
                o if o == tree::INPUT_HIZ_OFFSET => state.hiz = value != 0,
                o if o == tree::INPUT_REFLEVEL_OFFSET => state.reflevel = value as u8,
                _ => return Vec::new(),
            }
            return vec![ModelEvent::Input {
                index,
                state: state.clone(),
            }];
        }
        if let Some((index, offset)) = self.locate_output(addr) {
            let state = &mut self.outputs[index];
            match offset {
                o if o == tree::OUTPUT_VOLUME_OFFSET => state.volume = value as i16,
                o if o == tree::OUTPUT_MUTE_OFFSET => state.mute = value != 0,
                o if o == tree::OUTPUT_STEREO_OFFSET => state.stereo = value != 0,
                o if o == tree::OUTPUT_REFLEVEL_OFFSET => state.reflevel = value as u8,
                o if o == tree::OUTPUT_DITHER_OFFSET => state.dither = value != 0,
                _ => return Vec::new(),
            }
            return vec![ModelEvent::Output {
                index,
                state: state.clone(),
            }];
        }
        if let Some((index, word)) = self.locate_input_name(addr) {
            self.input_name_words[index][word] = value;
            let name = unpack_name(&self.input_name_words[index]);
            let state = &mut self.inputs[index];
            state.name = Some(name);
            return vec![ModelEvent::Input {
                index,
                state: state.clone(),
            }];
        }
        if let Some((index, word)) = self.locate_output_name(addr) {
            self.output_name_words[index][word] = value;
            let name = unpack_name(&self.output_name_words[index]);
            let state = &mut self.outputs[index];
            state.name = Some(name);
            return vec![ModelEvent::Output {
                index,
                state: state.clone(),
            }];
        }
        if let Some((bus, source, is_pan)) = self.locate_mixer(addr) {
            let cell = self.mixer.entry((bus, source)).or_default();
            if is_pan {
                cell.pan = (value & 0x00ff) as i8;
            } else {
                cell.volume = value as i16;
            }
            return vec![ModelEvent::Mixer {
                bus,
                source,
                cell: *cell,
            }];
        }
        match addr {
            a if a == SYSTEM_SAMPLERATE_REG => {
                self.sample_rate_hz = crate::coder::sample_rate_hz(value as usize);
                vec![ModelEvent::SampleRate(self.sample_rate_hz)]
            }
            a if a == SYSTEM_CLOCKSOURCE_REG => {
                self.clock_source = value as u8;
                vec![ModelEvent::ClockSource(self.clock_source)]
            }
            a if a == HARDWARE_DSPLOAD_REG => {
                self.dsp.load = value as u8;
                vec![ModelEvent::Dsp(self.dsp)]
            }
            a if a == HARDWARE_DSPVERSION_REG => {
                self.dsp.firmware_version = value;
                vec![ModelEvent::Dsp(self.dsp)]
            }
            a if a == DUREC_STATUS_REG => {
                self.durec.status = DurecTransport::from_register(value);
                vec![ModelEvent::Durec(self.durec.clone())]
            }
            a if a == DUREC_POSITION_REG => {
                self.durec.position = value as u32;
                vec![ModelEvent::Durec(self.durec.clone())]
            }
            a if a == DUREC_PLAYMODE_REG => {
                self.durec.playmode = value;
                vec![ModelEvent::Durec(self.durec.clone())]
            }
            a if a == DUREC_FILE_REG => {
                self.durec.file_index = value & 0x7fff;
                vec![ModelEvent::Durec(self.durec.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn locate_input(&self, addr: u16) -> Option<(usize, u16)> {
        for index in 0..self.inputs.len() {
            let base = tree::input_register(index, 0);
            if addr >= base && addr < base + 0x10 {
                return Some((index, addr - base));
            }
        }
        None
    }

    fn locate_output(&self, addr: u16) -> Option<(usize, u16)> {
        for index in 0..self.outputs.len() {
            let base = tree::output_register(index, 0);
            if addr >= base && addr < base + 0x10 {
                return Some((index, addr - base));
            }
        }
        None
    }

    fn locate_input_name(&self, addr: u16) -> Option<(usize, usize)> {
        for index in 0..self.input_name_words.len() {
            let base = tree::input_name_register(index, 0);
            if addr >= base && addr < base + NAME_REGISTER_COUNT as u16 {
                return Some((index, (addr - base) as usize));
            }
        }
        None
    }

    fn locate_output_name(&self, addr: u16) -> Option<(usize, usize)> {
        for index in 0..self.output_name_words.len() {
            let base = tree::output_name_register(index, 0);
            if addr >= base && addr < base + NAME_REGISTER_COUNT as u16 {
                return Some((index, (addr - base) as usize));
            }
        }
        None
    }

    fn locate_mixer(&self, addr: u16) -> Option<(usize, usize, bool)> {
        let bus_count = self.descriptor.mixer_count;
        let source_count = self.descriptor.playback_count.max(self.descriptor.inputs.len());
        for bus in 0..bus_count {
            for source in 0..source_count {
                let vol = tree::mixer_register(bus, source);
                if addr == vol {
                    return Some((bus, source, false));
                }
                if addr == vol + 1 {
                    return Some((bus, source, true));
                }
            }
        }
        None
    }
}

const SYSTEM_SAMPLERATE_REG: u16 = 0x3f00;
const SYSTEM_CLOCKSOURCE_REG: u16 = 0x3f01;
const HARDWARE_DSPLOAD_REG: u16 = 0x3f10;
const HARDWARE_DSPVERSION_REG: u16 = 0x3f11;
const DUREC_STATUS_REG: u16 = 0x3e10;
const DUREC_POSITION_REG: u16 = 0x3e11;
const DUREC_PLAYMODE_REG: u16 = 0x3e12;
const DUREC_FILE_REG: u16 = 0x3e9c;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fireface_ucx2;

    fn model() -> DeviceModel {
        DeviceModel::new(fireface_ucx2())
    }

    #[test]
    fn diff_gate_ignores_unchanged_value() {
        let mut m = model();
        let addr = tree::input_register(0, tree::INPUT_MUTE_OFFSET);
        let first = m.apply_register_update(RegisterWord { addr, value: 1 });
        assert_eq!(first.len(), 1);
        let second = m.apply_register_update(RegisterWord { addr, value: 1 });
        assert!(second.is_empty());
    }

    #[test]
    fn mute_update_reaches_input_state() {
        let mut m = model();
        let addr = tree::input_register(0, tree::INPUT_MUTE_OFFSET);
        let events = m.apply_register_update(RegisterWord { addr, value: 1 });
        assert_eq!(events.len(), 1);
        assert!(m.input(0).unwrap().mute);
    }

    #[test]
    fn refresh_suppresses_until_sentinel() {
        let mut m = model();
        m.start_refresh().unwrap();
        assert!(m.is_refreshing());
        let addr = tree::input_register(1, tree::INPUT_MUTE_OFFSET);
        let events = m.apply_register_update(RegisterWord { addr, value: 1 });
        assert!(events.is_empty());
        let done = m.apply_register_update(RegisterWord {
            addr: REFRESH_DONE_SENTINEL,
            value: 1,
        });
        assert!(!m.is_refreshing());
        assert!(done.iter().any(|e| matches!(e, ModelEvent::RefreshDone)));
        assert!(done
            .iter()
            .any(|e| matches!(e, ModelEvent::Input { index: 1, .. })));
    }

    #[test]
    fn second_refresh_is_a_no_op() {
        let mut m = model();
        assert!(m.start_refresh().is_some());
        assert!(m.start_refresh().is_none());
    }

    #[test]
    fn channel_name_assembles_across_its_packed_registers() {
        let mut m = model();
        let words = crate::names::pack_name("Mic/Line 1");
        for (i, &word) in words.iter().enumerate() {
            m.apply_register_update(RegisterWord {
                addr: tree::input_name_register(0, i),
                value: word,
            });
        }
        assert_eq!(m.input(0).unwrap().name.as_deref(), Some("Mic/Line"));
    }

    #[test]
    fn mixer_volume_and_pan_occupy_distinct_cells() {
        let mut m = model();
        let vol_reg = tree::mixer_register(2, 4);
        m.apply_register_update(RegisterWord {
            addr: vol_reg,
            value: (-60i16) as u16,
        });
        m.apply_register_update(RegisterWord {
            addr: vol_reg + 1,
            value: 50,
        });
        let cell = m.mixer_cell(2, 4);
        assert_eq!(cell.volume, -60);
        assert_eq!(cell.pan, 50);
    }
}
