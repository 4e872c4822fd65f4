// SPDX-License-Identifier: GPL-3.0-or-later

//! Immutable device descriptors (spec.md §3 "Device descriptor"). Selected by
//! name at startup and never mutated afterwards — the analogue of the
//! teacher's per-model `CtlModel` dispatch (`runtime/fireface/src/model.rs`),
//! but data-driven instead of one Rust type per device.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputCapability: u8 {
        const GAIN     = 0b0001;
        const MIC_48V  = 0b0010;
        const REFLEVEL = 0b0100;
        const HIZ      = 0b1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputCapability: u8 {
        const REFLEVEL = 0b0001;
        const DITHER   = 0b0010;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChannelDescriptor {
    pub name: String,
    pub capabilities: InputCapability,
    /// `true` for microphone inputs (gain range 0..75 dB), `false` for line
    /// inputs (0..24 dB) — see spec.md §4.2 `inputgain` coder.
    pub is_mic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChannelDescriptor {
    pub name: String,
    pub capabilities: OutputCapability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub id: &'static str,
    pub firmware_revision: u16,
    pub inputs: Vec<InputChannelDescriptor>,
    pub outputs: Vec<OutputChannelDescriptor>,
    pub playback_count: usize,
    pub mixer_count: usize,
}

impl DeviceDescriptor {
    pub fn input(&self, zero_based: usize) -> Option<&InputChannelDescriptor> {
        self.inputs.get(zero_based)
    }

    pub fn output(&self, zero_based: usize) -> Option<&OutputChannelDescriptor> {
        self.outputs.get(zero_based)
    }
}

fn line_input(name: impl Into<String>) -> InputChannelDescriptor {
    InputChannelDescriptor {
        name: name.into(),
        capabilities: InputCapability::GAIN | InputCapability::REFLEVEL,
        is_mic: false,
    }
}

fn mic_input(name: impl Into<String>) -> InputChannelDescriptor {
    InputChannelDescriptor {
        name: name.into(),
        capabilities: InputCapability::GAIN
            | InputCapability::MIC_48V
            | InputCapability::REFLEVEL
            | InputCapability::HIZ,
        is_mic: true,
    }
}

fn digital_input(name: impl Into<String>) -> InputChannelDescriptor {
    InputChannelDescriptor {
        name: name.into(),
        capabilities: InputCapability::empty(),
        is_mic: false,
    }
}

fn line_output(name: impl Into<String>) -> OutputChannelDescriptor {
    OutputChannelDescriptor {
        name: name.into(),
        capabilities: OutputCapability::REFLEVEL | OutputCapability::DITHER,
    }
}

fn digital_output(name: impl Into<String>) -> OutputChannelDescriptor {
    OutputChannelDescriptor {
        name: name.into(),
        capabilities: OutputCapability::empty(),
    }
}

/// Fireface UCX II: 2 mic/line combo + 2 line + SPDIF stereo + ADAT8 in/out,
/// 2 line + 1 phones stereo out, 34 playback channels, 18-bus mixer.
pub fn fireface_ucx2() -> DeviceDescriptor {
    let mut inputs = vec![mic_input("Mic/Line 1"), mic_input("Mic/Line 2")];
    inputs.extend((3..=4).map(|n| line_input(format!("Line {n}"))));
    inputs.push(digital_input("SPDIF L"));
    inputs.push(digital_input("SPDIF R"));
    inputs.extend((1..=8).map(|n| digital_input(format!("ADAT {n}"))));

    let mut outputs: Vec<OutputChannelDescriptor> = (1..=4)
        .map(|n| line_output(format!("Line {n}")))
        .collect();
    outputs.push(digital_output("SPDIF L"));
    outputs.push(digital_output("SPDIF R"));
    outputs.extend((1..=8).map(|n| digital_output(format!("ADAT {n}"))));

    DeviceDescriptor {
        name: "Fireface UCX II",
        id: "ucx2",
        firmware_revision: 0x0100,
        inputs,
        outputs,
        playback_count: 18,
        mixer_count: 18,
    }
}

/// Fireface 802: 4 mic/line combo, 4 line, SPDIF stereo, ADAT8x2 in/out, 4
/// line + phones stereo out, 28 playback channels, 28-bus mixer.
pub fn fireface_802() -> DeviceDescriptor {
    let mut inputs: Vec<InputChannelDescriptor> = (1..=4)
        .map(|n| mic_input(format!("Mic/Line {n}")))
        .collect();
    inputs.extend((5..=8).map(|n| line_input(format!("Line {n}"))));
    inputs.push(digital_input("SPDIF L"));
    inputs.push(digital_input("SPDIF R"));
    inputs.extend((1..=16).map(|n| digital_input(format!("ADAT {n}"))));

    let mut outputs: Vec<OutputChannelDescriptor> = (1..=8)
        .map(|n| line_output(format!("Line {n}")))
        .collect();
    outputs.push(digital_output("SPDIF L"));
    outputs.push(digital_output("SPDIF R"));
    outputs.extend((1..=16).map(|n| digital_output(format!("ADAT {n}"))));

    DeviceDescriptor {
        name: "Fireface 802",
        id: "ff802",
        firmware_revision: 0x0100,
        inputs,
        outputs,
        playback_count: 28,
        mixer_count: 28,
    }
}

/// Fireface UFX II: superset of the 802 layout with two extra mic/line combo
/// inputs on the front panel, per the device family named in spec.md §1.
pub fn fireface_ufx2() -> DeviceDescriptor {
    let mut d = fireface_802();
    d.name = "Fireface UFX II";
    d.id = "ufx2";
    d.inputs.insert(0, mic_input("Mic/Line 0a"));
    d.inputs.insert(1, mic_input("Mic/Line 0b"));
    d
}

/// Smaller, earlier Fireface UCX: kept as a secondary descriptor to show the
/// tree/model code is parametric over channel counts, not hard-coded to one
/// device (see SPEC_FULL.md "Parameter Tree" expansion).
pub fn fireface_ucx() -> DeviceDescriptor {
    let mut inputs = vec![mic_input("Mic/Line 1"), mic_input("Mic/Line 2")];
    inputs.extend((3..=4).map(|n| line_input(format!("Line {n}"))));
    inputs.push(digital_input("SPDIF L"));
    inputs.push(digital_input("SPDIF R"));
    inputs.extend((1..=8).map(|n| digital_input(format!("ADAT {n}"))));

    let mut outputs: Vec<OutputChannelDescriptor> = (1..=6)
        .map(|n| line_output(format!("Line {n}")))
        .collect();
    outputs.push(digital_output("SPDIF L"));
    outputs.push(digital_output("SPDIF R"));
    outputs.extend((1..=8).map(|n| digital_output(format!("ADAT {n}"))));

    DeviceDescriptor {
        name: "Fireface UCX",
        id: "ucx",
        firmware_revision: 0x0100,
        inputs,
        outputs,
        playback_count: 16,
        mixer_count: 16,
    }
}

/// Resolve a descriptor by its stable identifier string (`ucx2`, `ff802`,
/// `ufx2`, `ucx`), the name the `--device`/`OSCMIX_DEVICE` collaborator flag
/// is expected to pass in.
pub fn by_id(id: &str) -> Option<DeviceDescriptor> {
    match id {
        "ucx2" => Some(fireface_ucx2()),
        "ff802" => Some(fireface_802()),
        "ufx2" => Some(fireface_ufx2()),
        "ucx" => Some(fireface_ucx()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ucx2_has_expected_shape() {
        let d = fireface_ucx2();
        assert_eq!(d.inputs.len(), 2 + 2 + 2 + 8);
        assert_eq!(d.outputs.len(), 4 + 2 + 8);
        assert!(d.inputs[0].capabilities.contains(InputCapability::MIC_48V));
        assert!(!d.inputs[3].capabilities.contains(InputCapability::MIC_48V));
    }

    #[test]
    fn by_id_covers_all_known_devices() {
        for id in ["ucx2", "ff802", "ufx2", "ucx"] {
            assert!(by_id(id).is_some(), "missing descriptor for {id}");
        }
        assert!(by_id("bogus").is_none());
    }
}
