// SPDX-License-Identifier: GPL-3.0-or-later

//! SysEx framing and register-word codec for RME Fireface control surfaces.
//!
//! This crate owns no device semantics (channel counts, OSC addresses, gain
//! scaling all live in `oscmix-core`/`oscmix-bridge`); it only turns bytes on
//! the wire into register words and level samples and back.

pub mod meter;
pub mod sysex;

pub use sysex::{
    base128_decode, base128_encode, compose_register_word, decode_frame, encode_frame,
    encode_register_frame, parse_register_word, DecodeOutcome, FramePayload, RegisterWord, SubId,
    MANUFACTURER_ID, REFRESH_DONE_SENTINEL, REFRESH_REQUEST_MAGIC,
};
pub use meter::{decode_levels, LevelSample};
