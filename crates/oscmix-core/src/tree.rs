// SPDX-License-Identifier: GPL-3.0-or-later

//! Parameter tree (spec.md §4.2): a compile-shape, runtime-built address
//! tree binding OSC paths to device registers and coders. Channel counts
//! come from the active `DeviceDescriptor`, so the tree itself has no
//! device-specific branches baked in — the analogue of the teacher's
//! `CardCntr`/`ElemId` registration loops in `latter_ctls.rs`, but addressed
//! by OSC path segment instead of an ALSA control index.

use crate::coder::{CoderData, InboundCoder, OutboundCoder};
use crate::device::{DeviceDescriptor, InputCapability, OutputCapability};
use crate::error::{Error, Result};

// Register blocks are laid out with enough headroom between bases that no
// device descriptor's channel count can make one block's addresses spill
// into the next. The largest descriptor (`fireface_ufx2`) has 28 inputs and
// 28 outputs/mixer buses; `INPUT_BASE + 28*INPUT_STRIDE = 0x02c0` and
// `OUTPUT_BASE + 28*OUTPUT_STRIDE = 0x05c0`, both comfortably short of the
// next base, and the mixer's worst case (`bus<<8 + source*2` at bus 27,
// source 27) tops out at `MIXER_BASE + 0x1b37`, short of `DUREC_STATUS_REG`.
const INPUT_BASE: u16 = 0x0100;
const INPUT_STRIDE: u16 = 0x0010;
const OUTPUT_BASE: u16 = 0x0400;
const OUTPUT_STRIDE: u16 = 0x0010;
const MIXER_BASE: u16 = 0x1000;
const INPUT_NAME_BASE: u16 = 0x5000;
const INPUT_NAME_STRIDE: u16 = 8;
const OUTPUT_NAME_BASE: u16 = 0x5200;
const OUTPUT_NAME_STRIDE: u16 = 8;
const SYSTEM_SAMPLERATE_REG: u16 = 0x3f00;
const SYSTEM_CLOCKSOURCE_REG: u16 = 0x3f01;
const HARDWARE_DSPLOAD_REG: u16 = 0x3f10;
const HARDWARE_DSPVERSION_REG: u16 = 0x3f11;
const REFRESH_TRIGGER_REG: u16 = 0x0000;
const DUREC_STATUS_REG: u16 = 0x3e10;
const DUREC_POSITION_REG: u16 = 0x3e11;
const DUREC_PLAYMODE_REG: u16 = 0x3e12;
const DUREC_FILE_REG: u16 = 0x3e9c;
const DUREC_DELETE_REG: u16 = 0x3e9b;
const DUREC_RECORD_CMD: u32 = 0x8122;
const DUREC_STOP_CMD: u32 = 0x8120;
const DUREC_PLAY_CMD: u32 = 0x8123;

/// Offsets of per-channel fields within one `INPUT_STRIDE`/`OUTPUT_STRIDE`
/// block. `mute` at offset 0x08 for channel 0 reproduces the register
/// `0x0108` from the `/input/1/mute` scenario.
mod input_field {
    pub const GAIN: u16 = 0x00;
    pub const MUTE: u16 = 0x08;
    pub const STEREO: u16 = 0x09;
    pub const PHANTOM_48V: u16 = 0x0a;
    pub const HIZ: u16 = 0x0b;
    pub const REFLEVEL: u16 = 0x0c;
}

mod output_field {
    pub const VOLUME: u16 = 0x00;
    pub const MUTE: u16 = 0x08;
    pub const STEREO: u16 = 0x09;
    pub const REFLEVEL: u16 = 0x0a;
    pub const DITHER: u16 = 0x0b;
}

/// A name segment: either an exact literal or the `*` wildcard, which
/// matches any positive integer index (spec.md §4.2 "Address matching").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(&'static str),
    Wildcard,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub segment: Segment,
    /// Zero when this node is an interior grouping with no register of its
    /// own (spec.md §3 "Parameter node"). For a leaf nested under a
    /// wildcard (e.g. `/input/*/mute`) this holds the per-channel field
    /// *offset*, not the absolute address — the translation engine combines
    /// it with the resolved channel index via [`input_register`] or
    /// [`output_register`].
    pub register: u16,
    pub inbound: Option<InboundCoder>,
    pub outbound: Option<OutboundCoder>,
    pub data: CoderData,
    pub children: Vec<Node>,
}

impl Node {
    fn group(segment: Segment, children: Vec<Node>) -> Self {
        Node {
            segment,
            register: 0,
            inbound: None,
            outbound: None,
            data: CoderData::None,
            children,
        }
    }

    fn leaf(
        segment: Segment,
        register: u16,
        inbound: Option<InboundCoder>,
        outbound: Option<OutboundCoder>,
        data: CoderData,
    ) -> Self {
        Node {
            segment,
            register,
            inbound,
            outbound,
            data,
            children: Vec::new(),
        }
    }

    fn child_named(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| match &c.segment {
            Segment::Literal(s) => *s == name,
            Segment::Wildcard => false,
        })
    }

    fn wildcard_child(&self) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| matches!(c.segment, Segment::Wildcard))
    }
}

/// One matched step of an address resolution: the node reached, and, for a
/// wildcard match, the 0-based channel index recovered from the path
/// segment (spec.md §9 "explicit traversal structure that carries each
/// matched segment's index", replacing the original's pointer arithmetic).
#[derive(Debug, Clone)]
pub struct TraversalStep<'a> {
    pub node: &'a Node,
    pub index: Option<usize>,
}

pub struct ParameterTree {
    pub root: Node,
}

impl ParameterTree {
    pub fn build(descriptor: &DeviceDescriptor) -> Self {
        let system = Node::group(
            Segment::Literal("system"),
            vec![
                Node::leaf(
                    Segment::Literal("samplerate"),
                    SYSTEM_SAMPLERATE_REG,
                    Some(InboundCoder::Enum),
                    Some(OutboundCoder::NewSampleRate),
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("clocksource"),
                    SYSTEM_CLOCKSOURCE_REG,
                    Some(InboundCoder::Enum),
                    Some(OutboundCoder::NewEnum),
                    CoderData::Enum {
                        labels: crate::coder::CLOCK_SOURCE_LABELS,
                    },
                ),
            ],
        );

        let refresh = Node::leaf(
            Segment::Literal("refresh"),
            REFRESH_TRIGGER_REG,
            Some(InboundCoder::Refresh),
            None,
            CoderData::None,
        );

        let input = Node::group(Segment::Literal("input"), vec![input_wildcard(descriptor)]);
        let output = Node::group(
            Segment::Literal("output"),
            vec![output_wildcard(descriptor)],
        );
        let playback = Node::group(
            Segment::Literal("playback"),
            vec![Node::group(
                Segment::Wildcard,
                vec![Node::leaf(
                    Segment::Literal("level"),
                    0,
                    None,
                    Some(OutboundCoder::NewLevel),
                    CoderData::None,
                )],
            )],
        );

        let mix = Node::group(Segment::Literal("mix"), vec![mix_output_wildcard()]);

        let hardware = Node::group(
            Segment::Literal("hardware"),
            vec![
                Node::leaf(
                    Segment::Literal("dspload"),
                    HARDWARE_DSPLOAD_REG,
                    None,
                    Some(OutboundCoder::NewDspLoad),
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("dspversion"),
                    HARDWARE_DSPVERSION_REG,
                    None,
                    Some(OutboundCoder::NewInt),
                    CoderData::None,
                ),
            ],
        );

        let durec = Node::group(
            Segment::Literal("durec"),
            vec![
                Node::leaf(
                    Segment::Literal("status"),
                    DUREC_STATUS_REG,
                    None,
                    Some(OutboundCoder::NewDurecStatus),
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("position"),
                    DUREC_POSITION_REG,
                    None,
                    Some(OutboundCoder::NewDurecPosition),
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("playmode"),
                    DUREC_PLAYMODE_REG,
                    Some(InboundCoder::Int),
                    Some(OutboundCoder::NewDurecPlaymode),
                    CoderData::IntRange { min: 0, max: 2 },
                ),
                Node::leaf(
                    Segment::Literal("file"),
                    DUREC_FILE_REG,
                    Some(InboundCoder::DurecFileSelect),
                    Some(OutboundCoder::NewDurecFile),
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("record"),
                    DUREC_FILE_REG,
                    Some(InboundCoder::DurecCommand(DUREC_RECORD_CMD)),
                    None,
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("stop"),
                    DUREC_FILE_REG,
                    Some(InboundCoder::DurecCommand(DUREC_STOP_CMD)),
                    None,
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("play"),
                    DUREC_FILE_REG,
                    Some(InboundCoder::DurecCommand(DUREC_PLAY_CMD)),
                    None,
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("delete"),
                    DUREC_DELETE_REG,
                    Some(InboundCoder::DurecDelete),
                    None,
                    CoderData::None,
                ),
                Node::leaf(
                    Segment::Literal("next"),
                    DUREC_FILE_REG,
                    Some(InboundCoder::DurecCommand(0)),
                    None,
                    CoderData::None,
                ),
            ],
        );

        let logs = Node::group(
            Segment::Literal("errors"),
            vec![Node::leaf(
                Segment::Literal("last"),
                0,
                None,
                Some(OutboundCoder::NewInt),
                CoderData::None,
            )],
        );

        let version = Node::leaf(
            Segment::Literal("version"),
            0,
            None,
            Some(OutboundCoder::NewInt),
            CoderData::None,
        );
        let oscstatus = Node::leaf(
            Segment::Literal("oscstatus"),
            0,
            None,
            Some(OutboundCoder::NewInt),
            CoderData::None,
        );

        ParameterTree {
            root: Node::group(
                Segment::Literal(""),
                vec![
                    system, input, output, playback, mix, hardware, durec, refresh, logs,
                    version, oscstatus,
                ],
            ),
        }
    }

    /// Resolve a slash-separated OSC address to its matched node chain.
    /// Exact segments are preferred over the wildcard at each level, per
    /// spec.md §4.2. Returns [`Error::unknown_address`] if any segment has
    /// no match.
    pub fn resolve<'a>(&'a self, address: &str) -> Result<Vec<TraversalStep<'a>>> {
        let trimmed = address.strip_prefix('/').unwrap_or(address);
        let mut node = &self.root;
        let mut steps = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(Error::unknown_address(address));
            }
            if let Some(child) = node.child_named(segment) {
                steps.push(TraversalStep {
                    node: child,
                    index: None,
                });
                node = child;
            } else if let Some(child) = node.wildcard_child() {
                let one_based: usize = segment
                    .parse()
                    .map_err(|_| Error::unknown_address(address))?;
                if one_based == 0 {
                    return Err(Error::unknown_address(address));
                }
                steps.push(TraversalStep {
                    node: child,
                    index: Some(one_based - 1),
                });
                node = child;
            } else {
                return Err(Error::unknown_address(address));
            }
        }
        Ok(steps)
    }
}

fn input_wildcard(descriptor: &DeviceDescriptor) -> Node {
    let mut children = vec![
        Node::leaf(
            Segment::Literal("gain"),
            0, // offset applied per-channel by the translation engine
            Some(InboundCoder::InputGain),
            Some(OutboundCoder::NewInputGain),
            CoderData::None,
        ),
        Node::leaf(
            Segment::Literal("mute"),
            input_field::MUTE,
            Some(InboundCoder::Bool),
            Some(OutboundCoder::NewBool),
            CoderData::None,
        ),
        Node::leaf(
            Segment::Literal("stereo"),
            input_field::STEREO,
            Some(InboundCoder::InputStereo),
            Some(OutboundCoder::NewInputStereo),
            CoderData::None,
        ),
        // Read-only: the device reports its own packed channel name (spec.md
        // §4.3 "Name packing"); the bridge doesn't accept renames over OSC.
        Node::leaf(
            Segment::Literal("name"),
            0,
            None,
            Some(OutboundCoder::NewChannelName),
            CoderData::None,
        ),
    ];
    // Capability-gated leaves are only attached on devices where at least
    // one input declares them; a request against a channel lacking the
    // capability is still rejected per-channel by the translation engine
    // (spec.md §7 "Semantic" errors), but omitting the leaf entirely for a
    // device with no such inputs keeps the tree honest about its surface.
    let any_mic = descriptor
        .inputs
        .iter()
        .any(|c| c.capabilities.contains(InputCapability::MIC_48V));
    if any_mic {
        children.push(Node::leaf(
            Segment::Literal("48v"),
            input_field::PHANTOM_48V,
            Some(InboundCoder::Bool),
            Some(OutboundCoder::NewInput48vReflevel),
            CoderData::None,
        ));
        children.push(Node::leaf(
            Segment::Literal("hiz"),
            input_field::HIZ,
            Some(InboundCoder::Bool),
            Some(OutboundCoder::NewInputHiz),
            CoderData::None,
        ));
    }
    if descriptor
        .inputs
        .iter()
        .any(|c| c.capabilities.contains(InputCapability::REFLEVEL))
    {
        children.push(Node::leaf(
            Segment::Literal("reflevel"),
            input_field::REFLEVEL,
            Some(InboundCoder::Enum),
            Some(OutboundCoder::NewInput48vReflevel),
            CoderData::Enum {
                labels: &["-10dBV", "+4dBu", "LoGain"],
            },
        ));
    }
    Node::group(Segment::Wildcard, children)
}

fn output_wildcard(descriptor: &DeviceDescriptor) -> Node {
    let mut children = vec![
        Node::leaf(
            Segment::Literal("volume"),
            output_field::VOLUME,
            Some(InboundCoder::Fixed),
            Some(OutboundCoder::NewFixed),
            CoderData::Fixed {
                min: -65.0,
                max: 6.0,
                scale: 10.0,
            },
        ),
        Node::leaf(
            Segment::Literal("mute"),
            output_field::MUTE,
            Some(InboundCoder::Bool),
            Some(OutboundCoder::NewBool),
            CoderData::None,
        ),
        Node::leaf(
            Segment::Literal("stereo"),
            output_field::STEREO,
            Some(InboundCoder::OutputStereo),
            Some(OutboundCoder::NewOutputStereo),
            CoderData::None,
        ),
        Node::leaf(
            Segment::Literal("name"),
            0,
            None,
            Some(OutboundCoder::NewChannelName),
            CoderData::None,
        ),
    ];
    if descriptor
        .outputs
        .iter()
        .any(|c| c.capabilities.contains(OutputCapability::REFLEVEL))
    {
        children.push(Node::leaf(
            Segment::Literal("reflevel"),
            output_field::REFLEVEL,
            Some(InboundCoder::Enum),
            Some(OutboundCoder::NewEnum),
            CoderData::Enum {
                labels: &["-10dBV", "+4dBu", "HiGain"],
            },
        ));
    }
    if descriptor
        .outputs
        .iter()
        .any(|c| c.capabilities.contains(OutputCapability::DITHER))
    {
        children.push(Node::leaf(
            Segment::Literal("dither"),
            output_field::DITHER,
            Some(InboundCoder::Bool),
            Some(OutboundCoder::NewBool),
            CoderData::None,
        ));
    }
    Node::group(Segment::Wildcard, children)
}

fn mix_output_wildcard() -> Node {
    let pan_leaf = Node::leaf(
        Segment::Literal("pan"),
        0,
        Some(InboundCoder::MixPan),
        Some(OutboundCoder::NewMixPan),
        CoderData::IntRange {
            min: -100,
            max: 100,
        },
    );
    let source_wildcard = Node::leaf(
        Segment::Wildcard,
        0,
        Some(InboundCoder::Mix),
        Some(OutboundCoder::NewMix),
        CoderData::Fixed {
            min: -65.0,
            max: 6.0,
            scale: 10.0,
        },
    );
    let mut source_wildcard = source_wildcard;
    source_wildcard.children.push(pan_leaf);

    let input_group = Node::group(Segment::Literal("input"), vec![source_wildcard]);
    Node::group(Segment::Wildcard, vec![input_group])
}

/// Register address for input channel `index` (0-based) field `offset`.
pub fn input_register(index: usize, offset: u16) -> u16 {
    INPUT_BASE + (index as u16) * INPUT_STRIDE + offset
}

/// Register address for output channel `index` (0-based) field `offset`.
pub fn output_register(index: usize, offset: u16) -> u16 {
    OUTPUT_BASE + (index as u16) * OUTPUT_STRIDE + offset
}

/// Register address for the mixer volume cell of bus `bus` (0-based),
/// source `source` (0-based); the pan cell is this register plus one, per
/// spec.md §4.4 "wire representation ... `(reg+1, pan | 0x8000)`". Sources
/// are given a two-register stride (volume, pan) so the pan cell never
/// collides with the next source's volume cell.
pub fn mixer_register(bus: usize, source: usize) -> u16 {
    MIXER_BASE + ((bus as u16) << 8) + (source as u16) * 2
}

/// Number of packed-name registers a single channel occupies (spec.md §4.3
/// "Name packing": two ASCII characters per register, an 8-character name).
pub const NAME_REGISTER_COUNT: usize = 4;

/// Register address for input channel `index`'s `word`-th packed-name cell.
pub fn input_name_register(index: usize, word: usize) -> u16 {
    INPUT_NAME_BASE + (index as u16) * INPUT_NAME_STRIDE + word as u16
}

/// Register address for output channel `index`'s `word`-th packed-name cell.
pub fn output_name_register(index: usize, word: usize) -> u16 {
    OUTPUT_NAME_BASE + (index as u16) * OUTPUT_NAME_STRIDE + word as u16
}

pub use input_field::{
    GAIN as INPUT_GAIN_OFFSET, HIZ as INPUT_HIZ_OFFSET, MUTE as INPUT_MUTE_OFFSET,
    PHANTOM_48V as INPUT_48V_OFFSET, REFLEVEL as INPUT_REFLEVEL_OFFSET,
    STEREO as INPUT_STEREO_OFFSET,
};
pub use output_field::{
    DITHER as OUTPUT_DITHER_OFFSET, MUTE as OUTPUT_MUTE_OFFSET, REFLEVEL as OUTPUT_REFLEVEL_OFFSET,
    STEREO as OUTPUT_STEREO_OFFSET, VOLUME as OUTPUT_VOLUME_OFFSET,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fireface_ucx2;

    #[test]
    fn input_mute_register_matches_scenario() {
        assert_eq!(input_register(0, INPUT_MUTE_OFFSET), 0x0108);
    }

    #[test]
    fn resolves_input_mute_path() {
        let tree = ParameterTree::build(&fireface_ucx2());
        let steps = tree.resolve("/input/1/mute").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].index, Some(0));
        assert_eq!(steps[2].node.register, input_field::MUTE);
    }

    #[test]
    fn resolves_mix_pan_path() {
        let tree = ParameterTree::build(&fireface_ucx2());
        let steps = tree.resolve("/mix/3/input/5/pan").unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[1].index, Some(2));
        assert_eq!(steps[3].index, Some(4));
        assert!(matches!(steps[4].node.inbound, Some(InboundCoder::MixPan)));
    }

    #[test]
    fn rejects_unknown_leaf() {
        let tree = ParameterTree::build(&fireface_ucx2());
        assert!(tree.resolve("/does/not/exist").is_err());
    }

    #[test]
    fn rejects_zero_index() {
        let tree = ParameterTree::build(&fireface_ucx2());
        assert!(tree.resolve("/input/0/mute").is_err());
    }
}
