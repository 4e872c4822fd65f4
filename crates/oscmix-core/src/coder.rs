// SPDX-License-Identifier: GPL-3.0-or-later

//! Inbound/outbound coder kinds for parameter tree leaves (spec.md §4.2).
//! A coder is a pure description of how to translate one OSC argument list
//! into a register write, or one register update into an OSC message; the
//! actual arithmetic lives in `oscmix-bridge`'s translation engine, which
//! matches on these variants the way the teacher's `*_ctls.rs` modules match
//! on `ElemValueAccessor` kinds.

/// Per-node data a coder consults: clamp ranges, fixed-point scale, or an
/// enum label table. Mirrors spec.md §3 "coder-specific `data` block".
#[derive(Debug, Clone, PartialEq)]
pub enum CoderData {
    None,
    IntRange { min: i32, max: i32 },
    Fixed { min: f64, max: f64, scale: f64 },
    Enum { labels: &'static [&'static str] },
}

impl CoderData {
    pub fn clamp_int(&self, value: i32) -> i32 {
        match self {
            CoderData::IntRange { min, max } => value.clamp(*min, *max),
            _ => value,
        }
    }

    pub fn enum_labels(&self) -> &'static [&'static str] {
        match self {
            CoderData::Enum { labels } => labels,
            _ => &[],
        }
    }
}

/// OSC → register. See spec.md §4.2 inbound coder table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundCoder {
    Int,
    Fixed,
    Enum,
    Bool,
    Refresh,
    InputStereo,
    OutputStereo,
    InputGain,
    Mix,
    MixPan,
    DurecCommand(u32),
    DurecFileSelect,
    DurecDelete,
}

/// Register → OSC. The mirror set named `new*` in spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundCoder {
    NewInt,
    NewFixed,
    NewEnum,
    NewBool,
    NewMix,
    NewMixPan,
    NewSampleRate,
    NewDspLoad,
    NewInputStereo,
    NewOutputStereo,
    NewInputGain,
    NewInput48vReflevel,
    NewInputHiz,
    NewDurecStatus,
    NewDurecPosition,
    NewDurecPlaymode,
    NewDurecFile,
    NewLevel,
    NewChannelName,
}

pub const CLOCK_SOURCE_LABELS: &[&str] = &["Internal", "AES", "ADAT", "Sync In"];

pub const SAMPLE_RATE_HZ: &[u32] = &[
    32000, 44100, 48000, 64000, 88200, 96000, 128000, 176400, 192000,
];

/// Index into [`SAMPLE_RATE_HZ`], or `None` for an unrecognised code — per
/// spec.md §4.4 "Unknown indices map to 0 and produce no notification."
pub fn sample_rate_hz(index: usize) -> Option<u32> {
    SAMPLE_RATE_HZ.get(index).copied()
}

/// The inverse of [`sample_rate_hz`], used when an inbound `/system/samplerate`
/// request names a frequency rather than a table index.
pub fn sample_rate_index(hz: u32) -> Option<usize> {
    SAMPLE_RATE_HZ.iter().position(|&rate| rate == hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_round_trips() {
        for (i, &hz) in SAMPLE_RATE_HZ.iter().enumerate() {
            assert_eq!(sample_rate_hz(i), Some(hz));
            assert_eq!(sample_rate_index(hz), Some(i));
        }
    }

    #[test]
    fn unknown_sample_rate_index_is_none() {
        assert_eq!(sample_rate_hz(99), None);
        assert_eq!(sample_rate_index(11025), None);
    }

    #[test]
    fn clamp_int_only_applies_to_int_range() {
        let data = CoderData::IntRange { min: -100, max: 100 };
        assert_eq!(data.clamp_int(500), 100);
        assert_eq!(data.clamp_int(-500), -100);
        assert_eq!(CoderData::None.clamp_int(500), 500);
    }
}
