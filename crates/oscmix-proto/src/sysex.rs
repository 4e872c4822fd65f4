// SPDX-License-Identifier: GPL-3.0-or-later

//! Framing and base-128 packing for RME SysEx, and the parity-checked 32-bit
//! register word used on sub-ID 0 traffic.
//!
//! This module owns no device semantics: it turns a raw SysEx byte string into
//! a sub-ID and a payload, and turns a payload into register words or raw
//! bytes. Everything else is the caller's job.
//!
//! Every decode outcome is logged here via the `log` crate as it is
//! produced: failures (`short-frame`, `bad-parity`, `bad-length`,
//! `unknown-subid`) at `warn`, successful decodes at `trace`.

use log::{trace, warn};

/// Manufacturer ID RME ships in the shipped binary protocol (spec.md REDESIGN
/// FLAGS: `0x200D` wins over the `0x000166` alternative seen elsewhere in the
/// original sources).
pub const MANUFACTURER_ID: u32 = 0x200D;
const MANUFACTURER_BYTES: [u8; 3] = [0x00, 0x20, 0x0D];
const DEVICE_ID: u8 = 0x10;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Sentinel register address that terminates a refresh dump.
pub const REFRESH_DONE_SENTINEL: u16 = 0x2FC0;
/// Magic value written to request a full register dump.
pub const REFRESH_REQUEST_MAGIC: u32 = 0xFFFFFFFF;

/// Sub-IDs that select the payload kind carried by a SysEx frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubId {
    RegisterWrites,
    PreFxInputLevels,
    PlaybackLevels,
    PreFxOutputLevels,
    PostFxInputLevels,
    PostFxOutputLevels,
}

impl SubId {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::RegisterWrites),
            1 => Some(Self::PreFxInputLevels),
            2 => Some(Self::PlaybackLevels),
            3 => Some(Self::PreFxOutputLevels),
            4 => Some(Self::PostFxInputLevels),
            5 => Some(Self::PostFxOutputLevels),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::RegisterWrites => 0,
            Self::PreFxInputLevels => 1,
            Self::PlaybackLevels => 2,
            Self::PreFxOutputLevels => 3,
            Self::PostFxInputLevels => 4,
            Self::PostFxOutputLevels => 5,
        }
    }
}

/// Outcome of decoding a single SysEx frame. The codec never panics or
/// returns a `Result` for malformed wire data; callers inspect this enum and
/// act (typically: log a warning and discard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Ok,
    ShortFrame,
    BadParity,
    BadLength,
    UnknownSubId,
}

/// A single register write or echo, as carried by sub-ID 0 traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWord {
    pub addr: u16,
    pub value: u16,
}

/// A decoded frame: the sub-ID plus whatever the payload yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// Sub-ID 0. Each word that failed its parity check is reported alongside
    /// the address recovered from it (when recoverable) rather than simply
    /// dropped silently, so a caller can log which register misbehaved.
    RegisterWords(Vec<Result<RegisterWord, u16>>),
    /// Sub-IDs 1..5. Raw post-base128 bytes; `oscmix_proto::meter` interprets
    /// them per channel.
    Levels(Vec<u8>),
}

/// Split raw septets into base-256 bytes. Five emitted septets on the wire
/// carry four source bytes: one leading byte holding the MSB of each of the
/// following (up to four) bytes, whose own low 7 bits are transmitted as-is.
pub fn base128_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5 + 4);
    let mut i = 0;
    while i < data.len() {
        let msb = data[i];
        i += 1;
        let n = (data.len() - i).min(4);
        for j in 0..n {
            let mut b = data[i + j] & 0x7f;
            if msb & (1 << j) != 0 {
                b |= 0x80;
            }
            out.push(b);
        }
        i += n;
    }
    out
}

/// Inverse of [`base128_decode`].
pub fn base128_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 5);
    for chunk in data.chunks(4) {
        let mut msb = 0u8;
        for (i, &b) in chunk.iter().enumerate() {
            if b & 0x80 != 0 {
                msb |= 1 << i;
            }
        }
        out.push(msb);
        out.extend(chunk.iter().map(|&b| b & 0x7f));
    }
    out
}

/// Parity-encode `(addr, value)` into the little-endian 32-bit word RME's
/// register protocol expects: bit31 set so that the whole word carries odd
/// parity, bits30..16 the 15-bit address, bits15..0 the value.
pub fn compose_register_word(addr: u16, value: u16) -> u32 {
    debug_assert!(addr < 0x8000, "register address must fit in 15 bits");
    let lower = ((addr as u32) << 16) | value as u32;
    let parity = if lower.count_ones() % 2 == 0 { 1 } else { 0 };
    lower | (parity << 31)
}

/// Recover `(addr, value)` from a register word, rejecting words whose parity
/// doesn't come out odd (a single flipped bit anywhere in the word always
/// trips this check).
pub fn parse_register_word(word: u32) -> Option<RegisterWord> {
    if word.count_ones() % 2 == 0 {
        return None;
    }
    Some(RegisterWord {
        addr: ((word >> 16) & 0x7fff) as u16,
        value: (word & 0xffff) as u16,
    })
}

/// Frame a sequence of register words as an outbound sub-ID 0 SysEx message.
pub fn encode_register_frame(words: &[(u16, u16)]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(words.len() * 4);
    for &(addr, value) in words {
        raw.extend_from_slice(&compose_register_word(addr, value).to_le_bytes());
    }
    encode_frame(SubId::RegisterWrites, &raw)
}

/// Frame an arbitrary payload (already packed to raw bytes) as a SysEx
/// message for the given sub-ID.
pub fn encode_frame(sub_id: SubId, raw_payload: &[u8]) -> Vec<u8> {
    let payload = base128_encode(raw_payload);
    let mut frame = Vec::with_capacity(7 + payload.len());
    frame.push(SYSEX_START);
    frame.extend_from_slice(&MANUFACTURER_BYTES);
    frame.push(DEVICE_ID);
    frame.push(sub_id.to_byte());
    frame.extend(payload);
    frame.push(SYSEX_END);
    frame
}

/// Decode one complete SysEx frame (`0xF0..0xF7` inclusive). Returns the
/// outcome plus, on `Ok`, the sub-ID and decoded payload.
pub fn decode_frame(frame: &[u8]) -> (DecodeOutcome, Option<(SubId, FramePayload)>) {
    if frame.len() < 7
        || frame[0] != SYSEX_START
        || frame[frame.len() - 1] != SYSEX_END
        || frame[1..4] != MANUFACTURER_BYTES
        || frame[4] != DEVICE_ID
    {
        warn!("short-frame: {} bytes, expected at least 7", frame.len());
        return (DecodeOutcome::ShortFrame, None);
    }

    let sub_id = match SubId::from_byte(frame[5]) {
        Some(id) => id,
        None => {
            warn!("unknown-subid: {:#04x}", frame[5]);
            return (DecodeOutcome::UnknownSubId, None);
        }
    };

    let raw = base128_decode(&frame[6..frame.len() - 1]);
    if raw.len() % 4 != 0 {
        warn!("bad-length: sub-id {sub_id:?} decoded to {} bytes, not a multiple of 4", raw.len());
        return (DecodeOutcome::BadLength, None);
    }

    match sub_id {
        SubId::RegisterWrites => {
            let mut words = Vec::with_capacity(raw.len() / 4);
            let mut any_bad_parity = false;
            for chunk in raw.chunks_exact(4) {
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                match parse_register_word(word) {
                    Some(rw) => words.push(Ok(rw)),
                    None => {
                        any_bad_parity = true;
                        let addr = (word >> 16) & 0x7fff;
                        warn!("bad-parity: register word at {addr:#06x}");
                        words.push(Err(addr as u16));
                    }
                }
            }
            let outcome = if any_bad_parity {
                DecodeOutcome::BadParity
            } else {
                trace!("ok: decoded {} register word(s)", words.len());
                DecodeOutcome::Ok
            };
            (outcome, Some((sub_id, FramePayload::RegisterWords(words))))
        }
        _ => {
            trace!("ok: decoded sub-id {sub_id:?}, {} raw bytes", raw.len());
            (DecodeOutcome::Ok, Some((sub_id, FramePayload::Levels(raw))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base128_round_trips_all_lengths_up_to_4096() {
        for len in 0..=4096usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let encoded = base128_encode(&data);
            assert!(encoded.iter().all(|&b| b & 0x80 == 0));
            let decoded = base128_decode(&encoded);
            assert_eq!(decoded, data, "mismatch at len={len}");
        }
    }

    #[test]
    fn register_word_round_trips_and_detects_bit_flips() {
        for reg in [0u16, 1, 0x3fff, 0x7fff] {
            for val in [0u16, 1, 0x8000, 0xffff] {
                let word = compose_register_word(reg, val);
                let parsed = parse_register_word(word).expect("freshly composed word is valid");
                assert_eq!(parsed, RegisterWord { addr: reg, value: val });

                for bit in 0..32 {
                    let flipped = word ^ (1 << bit);
                    assert!(
                        parse_register_word(flipped).is_none(),
                        "bit {bit} flip went undetected for reg={reg:#x} val={val:#x}"
                    );
                }
            }
        }
    }

    #[test]
    fn oversize_payload_is_bad_length_not_a_panic() {
        let mut frame = vec![0xF0, 0x00, 0x20, 0x0D, 0x10, 0x00];
        // Three septets worth of payload decode to 2 bytes, not a multiple of 4.
        frame.extend_from_slice(&[0x00, 0x01, 0x02]);
        frame.push(0xF7);
        let (outcome, _) = decode_frame(&frame);
        assert_eq!(outcome, DecodeOutcome::BadLength);
    }

    #[test]
    fn bad_parity_word_is_dropped_but_frame_continues() {
        let good = compose_register_word(0x0108, 0x0001);
        let bad = compose_register_word(0x0109, 0x0002) ^ 0x1; // flip one bit
        let mut raw = Vec::new();
        raw.extend_from_slice(&good.to_le_bytes());
        raw.extend_from_slice(&bad.to_le_bytes());
        let frame = encode_frame(SubId::RegisterWrites, &raw);

        let (outcome, payload) = decode_frame(&frame);
        assert_eq!(outcome, DecodeOutcome::BadParity);
        match payload.unwrap().1 {
            FramePayload::RegisterWords(words) => {
                assert_eq!(words.len(), 2);
                assert_eq!(words[0], Ok(RegisterWord { addr: 0x0108, value: 0x0001 }));
                assert!(words[1].is_err());
            }
            _ => panic!("expected register words"),
        }
    }

    #[test]
    fn short_frame_is_rejected() {
        let (outcome, _) = decode_frame(&[0xF0, 0x00, 0x20, 0x0D]);
        assert_eq!(outcome, DecodeOutcome::ShortFrame);
    }

    #[test]
    fn unknown_subid_is_rejected() {
        let frame = encode_frame(SubId::RegisterWrites, &[]);
        let mut frame = frame;
        let subid_pos = 5;
        frame[subid_pos] = 9;
        let (outcome, _) = decode_frame(&frame);
        assert_eq!(outcome, DecodeOutcome::UnknownSubId);
    }

    #[test]
    fn happy_path_register_write_frame_matches_scenario_1() {
        let frame = encode_register_frame(&[(0x0108, 0x0001)]);
        let (outcome, payload) = decode_frame(&frame);
        assert_eq!(outcome, DecodeOutcome::Ok);
        match payload.unwrap().1 {
            FramePayload::RegisterWords(words) => {
                assert_eq!(words, vec![Ok(RegisterWord { addr: 0x0108, value: 0x0001 })]);
            }
            _ => panic!("expected register words"),
        }
    }
}
