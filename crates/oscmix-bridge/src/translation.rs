// SPDX-License-Identifier: GPL-3.0-or-later

//! Translation Engine (spec.md §4.4): inbound OSC → register writes,
//! inbound register updates → OSC notifications, the mixer law, and meter
//! republication. Grounded on the teacher's `*_ctls.rs` value-get/put pairs
//! (`runtime/fireface/src/latter_ctls.rs`) — there every control has a
//! `get`/`put` pair translating between an ALSA `ElemValue` and a protocol
//! field; here the same shape translates between `rosc::OscType` args and a
//! `RegisterWrite`.

use oscmix_core::{
    tree, CoderData, DeviceModel, DurecTransport, Error, InboundCoder, InputCapability,
    ModelEvent, OutputCapability, RegisterWrite, Result,
};
use oscmix_proto::LevelSample;
use rosc::{OscMessage, OscType};

const MIX_PAN_HIGH_BIT: u16 = 0x8000;
const NEG_INF_CELL: i16 = -650;

fn category_of(msg_addr: &str) -> Option<&str> {
    msg_addr.trim_start_matches('/').split('/').next()
}

fn arg_f64(args: &[OscType], index: usize) -> Result<f64> {
    match args.get(index) {
        Some(OscType::Float(f)) => Ok(*f as f64),
        Some(OscType::Double(d)) => Ok(*d),
        Some(OscType::Int(i)) => Ok(*i as f64),
        _ => Err(Error::type_mismatch("", "expected a numeric argument")),
    }
}

fn arg_i32(args: &[OscType], index: usize) -> Result<i32> {
    match args.get(index) {
        Some(OscType::Int(i)) => Ok(*i),
        Some(OscType::Float(f)) => Ok(*f as i32),
        Some(OscType::Bool(b)) => Ok(*b as i32),
        _ => Err(Error::type_mismatch("", "expected an integer argument")),
    }
}

fn arg_bool(args: &[OscType]) -> Result<bool> {
    match args.first() {
        Some(OscType::Bool(b)) => Ok(*b),
        Some(OscType::Int(i)) => Ok(*i != 0),
        Some(OscType::Float(f)) => Ok(*f != 0.0),
        _ => Err(Error::type_mismatch("", "expected a bool-like argument")),
    }
}

fn arg_enum(args: &[OscType], labels: &[&str]) -> Result<u16> {
    match args.first() {
        Some(OscType::String(s)) => labels
            .iter()
            .position(|l| l == s)
            .map(|i| i as u16)
            .ok_or_else(|| Error::out_of_range("", format!("unknown label {s:?}"))),
        Some(OscType::Int(i)) => Ok(*i as u16),
        _ => Err(Error::type_mismatch("", "expected a label or index")),
    }
}

/// dB → device 0.1-dB fixed point, with the `-65 -> -inf` coercion spec.md
/// §3 requires everywhere a volume is written.
pub fn volume_to_cell(db: f64) -> i16 {
    let clamped = db.clamp(-65.0, 6.0);
    if clamped <= -65.0 {
        NEG_INF_CELL
    } else {
        (clamped * 10.0).round() as i16
    }
}

pub fn cell_to_volume(cell: i16) -> f64 {
    if cell <= NEG_INF_CELL {
        f64::NEG_INFINITY
    } else {
        cell as f64 / 10.0
    }
}

fn gain_to_cell(gain: f64) -> i16 {
    if gain <= 0.0 {
        return NEG_INF_CELL;
    }
    volume_to_cell(20.0 * gain.log10())
}

/// The mixer law of spec.md §4.4, producing the volume/pan register writes
/// for one send and, when the source is stereo-linked, its paired channel.
pub fn mix_writes(
    bus: usize,
    source: usize,
    vol_db: f64,
    pan: i32,
    width: f64,
    source_is_stereo: bool,
) -> Vec<RegisterWrite> {
    let pan = pan.clamp(-100, 100);
    let vol_db = if vol_db <= -65.0 { f64::NEG_INFINITY } else { vol_db.clamp(-65.0, 6.0) };
    let gain = if vol_db.is_infinite() { 0.0 } else { 10f64.powf(vol_db / 20.0) };

    let left = gain * (1.0 + pan as f64 / 100.0).min(1.0);
    let right = gain * (1.0 - pan as f64 / 100.0).min(1.0);

    let (left, right) = if source_is_stereo && (width - 1.0).abs() > f64::EPSILON {
        let mid = (left + right) / 2.0;
        let side = (left - right) / 2.0 * width.clamp(0.0, 2.0);
        (mid + side, mid - side)
    } else {
        (left, right)
    };

    let vol_reg = tree::mixer_register(bus, source);
    let mut writes = vec![RegisterWrite {
        addr: vol_reg,
        value: gain_to_cell(left) as u16,
    }];
    if source_is_stereo {
        let vol_reg2 = tree::mixer_register(bus, source + 1);
        writes.push(RegisterWrite {
            addr: vol_reg2,
            value: gain_to_cell(right) as u16,
        });
    }
    writes
}

fn channel_index(steps: &[oscmix_core::TraversalStep]) -> Option<usize> {
    steps.iter().find_map(|s| s.index)
}

fn mixer_indices(steps: &[oscmix_core::TraversalStep]) -> Option<(usize, usize)> {
    let mut indices = steps.iter().filter_map(|s| s.index);
    let bus = indices.next()?;
    let source = indices.next()?;
    Some((bus, source))
}

/// Translate one inbound OSC message into the register writes it produces,
/// applying each speculatively to `model` (spec.md §4.3 "Register write").
/// Returns the writes the caller should frame through the codec and send
/// over MIDI.
pub fn apply_osc_message(model: &mut DeviceModel, msg: &OscMessage) -> Result<Vec<RegisterWrite>> {
    if msg.addr == "/refresh" {
        return Ok(model.start_refresh().into_iter().collect());
    }

    let steps = model.tree.resolve(&msg.addr)?;
    let leaf = steps
        .last()
        .ok_or_else(|| Error::unknown_address(&msg.addr))?
        .node
        .clone();
    let category = category_of(&msg.addr).unwrap_or("");

    let writes = match (category, leaf.inbound) {
        (_, None) => return Err(Error::unknown_address(&msg.addr)),
        ("input", Some(InboundCoder::InputGain)) => {
            let channel = channel_index(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let descriptor = model
                .descriptor
                .input(channel)
                .ok_or_else(|| Error::unknown_address(&msg.addr))?;
            if !descriptor.capabilities.contains(InputCapability::GAIN) {
                return Err(Error::unsupported_capability(&msg.addr, "gain"));
            }
            let max = if descriptor.is_mic { 75.0 } else { 24.0 };
            let db = arg_f64(&msg.args, 0)?;
            if !(0.0..=max).contains(&db) {
                return Err(Error::out_of_range(
                    &msg.addr,
                    format!("gain {db} dB is outside the channel's 0..{max} dB range"),
                ));
            }
            let value = (db * 10.0).round() as u16;
            vec![RegisterWrite {
                addr: tree::input_register(channel, tree::INPUT_GAIN_OFFSET),
                value,
            }]
        }
        ("input", Some(InboundCoder::InputStereo)) => {
            let channel = channel_index(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let on = arg_bool(&msg.args)? as u16;
            vec![
                RegisterWrite {
                    addr: tree::input_register(channel, tree::INPUT_STEREO_OFFSET),
                    value: on,
                },
                RegisterWrite {
                    addr: tree::input_register(channel + 1, tree::INPUT_STEREO_OFFSET),
                    value: on,
                },
            ]
        }
        ("output", Some(InboundCoder::OutputStereo)) => {
            let channel = channel_index(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let on = arg_bool(&msg.args)? as u16;
            vec![
                RegisterWrite {
                    addr: tree::output_register(channel, tree::OUTPUT_STEREO_OFFSET),
                    value: on,
                },
                RegisterWrite {
                    addr: tree::output_register(channel + 1, tree::OUTPUT_STEREO_OFFSET),
                    value: on,
                },
            ]
        }
        ("input", Some(coder)) => {
            let channel = channel_index(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let descriptor = model
                .descriptor
                .input(channel)
                .ok_or_else(|| Error::unknown_address(&msg.addr))?;
            if let Some((capability, name)) = input_capability_for_offset(leaf.register) {
                if !descriptor.capabilities.contains(capability) {
                    return Err(Error::unsupported_capability(&msg.addr, name));
                }
            }
            let value = decode_scalar(coder, &msg.args, &leaf.data, &msg.addr)?;
            vec![RegisterWrite {
                addr: tree::input_register(channel, leaf.register),
                value,
            }]
        }
        ("output", Some(coder)) => {
            let channel = channel_index(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let descriptor = model
                .descriptor
                .output(channel)
                .ok_or_else(|| Error::unknown_address(&msg.addr))?;
            if let Some((capability, name)) = output_capability_for_offset(leaf.register) {
                if !descriptor.capabilities.contains(capability) {
                    return Err(Error::unsupported_capability(&msg.addr, name));
                }
            }
            let value = decode_scalar(coder, &msg.args, &leaf.data, &msg.addr)?;
            vec![RegisterWrite {
                addr: tree::output_register(channel, leaf.register),
                value,
            }]
        }
        ("mix", Some(InboundCoder::Mix)) => {
            let (bus, source) = mixer_indices(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let vol_db = arg_f64(&msg.args, 0)?;
            let pan = msg.args.get(1).map(|_| arg_i32(&msg.args, 1)).transpose()?.unwrap_or(0);
            let width = msg.args.get(2).map(|_| arg_f64(&msg.args, 2)).transpose()?.unwrap_or(1.0);
            let source_is_stereo = model.input(source).map(|s| s.stereo).unwrap_or(false);
            mix_writes(bus, source, vol_db, pan, width, source_is_stereo)
        }
        ("mix", Some(InboundCoder::MixPan)) => {
            let (bus, source) = mixer_indices(&steps).ok_or_else(|| Error::unknown_address(&msg.addr))?;
            let pan = arg_i32(&msg.args, 0)?.clamp(-100, 100);
            let vol_reg = tree::mixer_register(bus, source);
            vec![RegisterWrite {
                addr: vol_reg + 1,
                value: (pan as i16 as u16 & 0x00ff) | MIX_PAN_HIGH_BIT,
            }]
        }
        ("durec", Some(InboundCoder::DurecCommand(magic))) => {
            vec![RegisterWrite {
                addr: leaf.register,
                value: (magic & 0xffff) as u16,
            }]
        }
        ("durec", Some(InboundCoder::DurecFileSelect)) => {
            let index = arg_i32(&msg.args, 0)? as u16;
            vec![RegisterWrite {
                addr: leaf.register,
                value: (index & 0x7fff) | MIX_PAN_HIGH_BIT,
            }]
        }
        ("durec", Some(InboundCoder::DurecDelete)) => {
            let index = arg_i32(&msg.args, 0)? as u16;
            vec![RegisterWrite {
                addr: leaf.register,
                value: index,
            }]
        }
        ("durec", Some(coder)) => {
            let value = decode_scalar(coder, &msg.args, &leaf.data, &msg.addr)?;
            vec![RegisterWrite {
                addr: leaf.register,
                value,
            }]
        }
        ("system", Some(InboundCoder::Enum)) if msg.addr.ends_with("samplerate") => {
            let hz = arg_i32(&msg.args, 0)? as u32;
            let index = oscmix_core::coder::sample_rate_index(hz)
                .ok_or_else(|| Error::out_of_range(&msg.addr, format!("unsupported rate {hz}")))?;
            vec![RegisterWrite {
                addr: leaf.register,
                value: index as u16,
            }]
        }
        ("system", Some(coder)) => {
            let value = decode_scalar(coder, &msg.args, &leaf.data, &msg.addr)?;
            vec![RegisterWrite {
                addr: leaf.register,
                value,
            }]
        }
        _ => return Err(Error::unknown_address(&msg.addr)),
    };

    for w in &writes {
        model.speculative_write(w.addr, w.value);
    }
    Ok(writes)
}

/// Which capability flag, if any, gates the input leaf at this per-channel
/// register offset (spec.md §7 "Semantic" / §6 "Requires capability flag").
/// Leaves with no entry here (e.g. `mute`, `stereo`) apply to every channel.
fn input_capability_for_offset(offset: u16) -> Option<(InputCapability, &'static str)> {
    match offset {
        o if o == tree::INPUT_48V_OFFSET => Some((InputCapability::MIC_48V, "48v")),
        o if o == tree::INPUT_HIZ_OFFSET => Some((InputCapability::HIZ, "hiz")),
        o if o == tree::INPUT_REFLEVEL_OFFSET => Some((InputCapability::REFLEVEL, "reflevel")),
        _ => None,
    }
}

fn output_capability_for_offset(offset: u16) -> Option<(OutputCapability, &'static str)> {
    match offset {
        o if o == tree::OUTPUT_REFLEVEL_OFFSET => Some((OutputCapability::REFLEVEL, "reflevel")),
        o if o == tree::OUTPUT_DITHER_OFFSET => Some((OutputCapability::DITHER, "dither")),
        _ => None,
    }
}

fn decode_scalar(
    coder: InboundCoder,
    args: &[OscType],
    data: &CoderData,
    addr: &str,
) -> Result<u16> {
    match coder {
        InboundCoder::Int => Ok(data.clamp_int(arg_i32(args, 0)?) as u16),
        InboundCoder::Bool => Ok(arg_bool(args)? as u16),
        InboundCoder::Enum => arg_enum(args, data.enum_labels()).map_err(|_| {
            Error::out_of_range(addr, "value outside the declared enum")
        }),
        InboundCoder::Fixed => {
            let (min, max, scale) = match data {
                CoderData::Fixed { min, max, scale } => (*min, *max, *scale),
                _ => (-65.0, 6.0, 10.0),
            };
            let v = arg_f64(args, 0)?.clamp(min, max);
            Ok(volume_to_cell(v).max((min * scale) as i16) as u16)
        }
        _ => Err(Error::type_mismatch(addr, "coder not valid at this node")),
    }
}

/// Translate one decoded register change into the OSC notification(s) it
/// produces (spec.md §4.3 "Register observation", §4.2 outbound coders).
pub fn model_event_to_osc(model: &DeviceModel, event: &ModelEvent) -> Vec<OscMessage> {
    match event {
        ModelEvent::RefreshDone => vec![osc("/refresh/done", vec![OscType::Int(1)])],
        ModelEvent::SampleRate(hz) => match hz {
            Some(hz) => vec![osc(
                "/system/samplerate",
                vec![OscType::Int(*hz as i32)],
            )],
            None => Vec::new(),
        },
        ModelEvent::ClockSource(index) => {
            let label = oscmix_core::coder::CLOCK_SOURCE_LABELS
                .get(*index as usize)
                .copied()
                .unwrap_or("Unknown");
            vec![osc(
                "/system/clocksource",
                vec![OscType::Int(*index as i32), OscType::String(label.to_string())],
            )]
        }
        ModelEvent::Dsp(dsp) => vec![
            osc("/hardware/dspload", vec![OscType::Int(dsp.load as i32)]),
            osc(
                "/hardware/dspversion",
                vec![OscType::Int(dsp.firmware_version as i32)],
            ),
        ],
        ModelEvent::Durec(durec) => vec![
            osc(
                "/durec/status",
                vec![OscType::Int(durec_status_code(durec.status))],
            ),
            osc("/durec/position", vec![OscType::Int(durec.position as i32)]),
            osc("/durec/playmode", vec![OscType::Int(durec.playmode as i32)]),
        ],
        ModelEvent::Input { index, state } => {
            let mut msgs = vec![osc(
                &format!("/input/{}/mute", index + 1),
                vec![OscType::Bool(state.mute)],
            )];
            if let Some(name) = &state.name {
                msgs.push(osc(
                    &format!("/input/{}/name", index + 1),
                    vec![OscType::String(name.clone())],
                ));
            }
            msgs
        }
        ModelEvent::Output { index, state } => {
            let mut msgs = vec![osc(
                &format!("/output/{}/volume", index + 1),
                vec![OscType::Float(cell_to_volume(state.volume) as f32)],
            )];
            if let Some(name) = &state.name {
                msgs.push(osc(
                    &format!("/output/{}/name", index + 1),
                    vec![OscType::String(name.clone())],
                ));
            }
            msgs
        }
        ModelEvent::Mixer { bus, source, cell } => {
            let vol_addr = format!("/mix/{}/input/{}", bus + 1, source + 1);
            let pan_addr = format!("{vol_addr}/pan");
            let _ = model; // descriptor lookups reserved for future label enrichment
            vec![
                osc(&vol_addr, vec![OscType::Float(cell_to_volume(cell.volume) as f32)]),
                osc(&pan_addr, vec![OscType::Int(cell.pan as i32)]),
            ]
        }
    }
}

fn durec_status_code(status: DurecTransport) -> i32 {
    match status {
        DurecTransport::NoMedia => 0,
        DurecTransport::FsError => 1,
        DurecTransport::Initializing => 2,
        DurecTransport::Reinitializing => 3,
        DurecTransport::Unknown => 8,
        DurecTransport::Stopped => 4,
        DurecTransport::Recording => 5,
        DurecTransport::Playing => 6,
        DurecTransport::Paused => 7,
    }
}

fn osc(addr: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args,
    }
}

/// Republish one decoded level frame (spec.md §4.4 "Meter publication").
/// `base` names the addressed group (`input`, `output`, `playback`);
/// `leaf` is `"level"` for a direct snapshot or `"fxlevel"` when this frame
/// completes a pre/post-FX pair.
pub fn meter_messages(base: &str, leaf: &str, samples: &[LevelSample]) -> Vec<OscMessage> {
    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            osc(
                &format!("/{base}/{}/{leaf}", i + 1),
                vec![OscType::Float(sample.peak_db), OscType::Float(sample.rms_db)],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscmix_core::device::fireface_ucx2;

    fn model() -> DeviceModel {
        DeviceModel::new(fireface_ucx2())
    }

    #[test]
    fn input_mute_scenario_matches_spec_register() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/input/1/mute".to_string(),
            args: vec![OscType::Int(1)],
        };
        let writes = apply_osc_message(&mut m, &msg).unwrap();
        assert_eq!(writes, vec![RegisterWrite { addr: 0x0108, value: 1 }]);
    }

    #[test]
    fn mixer_dbpan_scenario() {
        let mut m = model();
        let vol_msg = OscMessage {
            addr: "/mix/3/input/5".to_string(),
            args: vec![OscType::Float(-6.0)],
        };
        let writes = apply_osc_message(&mut m, &vol_msg).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].value as i16, -60);

        let pan_msg = OscMessage {
            addr: "/mix/3/input/5/pan".to_string(),
            args: vec![OscType::Int(50)],
        };
        let writes = apply_osc_message(&mut m, &pan_msg).unwrap();
        assert_eq!(writes[0].value, 50 | MIX_PAN_HIGH_BIT);
        assert_eq!(writes[0].addr, tree::mixer_register(2, 4) + 1);
    }

    #[test]
    fn stereo_pair_scenario() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/input/1/stereo".to_string(),
            args: vec![OscType::Bool(true)],
        };
        let writes = apply_osc_message(&mut m, &msg).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].addr, tree::input_register(0, tree::INPUT_STEREO_OFFSET));
        assert_eq!(writes[1].addr, tree::input_register(1, tree::INPUT_STEREO_OFFSET));
        assert_eq!(writes[0].value, 1);
        assert_eq!(writes[1].value, 1);
    }

    #[test]
    fn unknown_address_is_rejected() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/does/not/exist".to_string(),
            args: vec![OscType::Int(1)],
        };
        assert!(apply_osc_message(&mut m, &msg).is_err());
    }

    #[test]
    fn gain_above_the_line_input_ceiling_is_rejected() {
        let mut m = model();
        // Channel 3 on the UCX II is a line input (0..24 dB range).
        let msg = OscMessage {
            addr: "/input/3/gain".to_string(),
            args: vec![OscType::Float(25.0)],
        };
        assert!(apply_osc_message(&mut m, &msg).is_err());
    }

    #[test]
    fn gain_within_the_line_input_ceiling_is_accepted() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/input/3/gain".to_string(),
            args: vec![OscType::Float(24.0)],
        };
        let writes = apply_osc_message(&mut m, &msg).unwrap();
        assert_eq!(writes[0].value, 240);
    }

    #[test]
    fn hiz_rejected_on_a_channel_without_the_capability() {
        let mut m = model();
        // Channel 3 on the UCX II is a line input; only the mic inputs have HiZ.
        let msg = OscMessage {
            addr: "/input/3/hiz".to_string(),
            args: vec![OscType::Bool(true)],
        };
        assert!(apply_osc_message(&mut m, &msg).is_err());
    }

    #[test]
    fn hiz_accepted_on_a_channel_with_the_capability() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/input/1/hiz".to_string(),
            args: vec![OscType::Bool(true)],
        };
        assert!(apply_osc_message(&mut m, &msg).is_ok());
    }

    #[test]
    fn reflevel_rejected_on_a_digital_output_without_the_capability() {
        let mut m = model();
        // Output 5 on the UCX II is the digital SPDIF-L output; only the
        // line outputs carry REFLEVEL.
        let msg = OscMessage {
            addr: "/output/5/reflevel".to_string(),
            args: vec![OscType::String("+4dBu".to_string())],
        };
        assert!(apply_osc_message(&mut m, &msg).is_err());
    }

    #[test]
    fn reflevel_accepted_on_a_line_output_with_the_capability() {
        let mut m = model();
        let msg = OscMessage {
            addr: "/output/1/reflevel".to_string(),
            args: vec![OscType::String("+4dBu".to_string())],
        };
        assert!(apply_osc_message(&mut m, &msg).is_ok());
    }

    #[test]
    fn volume_clamp_boundaries() {
        assert_eq!(volume_to_cell(-65.0), NEG_INF_CELL);
        assert_eq!(volume_to_cell(-64.9), -649);
    }
}
