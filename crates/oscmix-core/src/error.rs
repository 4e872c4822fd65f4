// SPDX-License-Identifier: GPL-3.0-or-later

//! Error taxonomy from spec.md §7, replacing the teacher's GObject-specific
//! `glib::Error` domain (there is no GLib in a USB-MIDI/UDP bridge) with a
//! plain `thiserror` enum that still distinguishes the same five categories.

use std::fmt;

/// Context carried by a protocol- or semantic-level error so the translation
/// engine can build the `/error ,iss` OSC message without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscContext {
    pub address: String,
    pub message: String,
}

impl fmt::Display for OscContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.message)
    }
}

/// A numeric code for `/error ,iss <code> "osc" <message>`. Stable within a
/// process but not a documented wire contract beyond this bridge.
pub type ErrorCode = i32;

pub const CODE_UNKNOWN_ADDRESS: ErrorCode = 404;
pub const CODE_TYPE_MISMATCH: ErrorCode = 415;
pub const CODE_OUT_OF_RANGE: ErrorCode = 416;
pub const CODE_UNSUPPORTED_CAPABILITY: ErrorCode = 403;
pub const CODE_MALFORMED_PACKET: ErrorCode = 400;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// MIDI read/write or socket read/write failure. Never fatal in steady
    /// state; recovered locally and logged.
    #[error("transport error: {0}")]
    Transport(String),

    /// SysEx manufacturer/device/sub-ID mismatch, base-128 decode failure,
    /// parity failure, oversize frame. The frame is dropped and the decoder
    /// resynchronises on the next `0xF0`.
    #[error("frame error: {0}")]
    Frame(String),

    /// Unknown OSC address, malformed OSC packet, argument type mismatch,
    /// value out of range. The message is dropped and a single `/error` is
    /// emitted.
    #[error("protocol error ({code}) at {context}")]
    Protocol { code: ErrorCode, context: OscContext },

    /// Operation issued for a capability the addressed channel doesn't have.
    #[error("semantic error ({code}) at {context}")]
    Semantic { code: ErrorCode, context: OscContext },

    /// Failure to open the MIDI device or bind the UDP socket. Terminates the
    /// process after best-effort cleanup.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl Error {
    pub fn unknown_address(address: impl Into<String>) -> Self {
        Error::Protocol {
            code: CODE_UNKNOWN_ADDRESS,
            context: OscContext {
                address: address.into(),
                message: "unknown address".to_string(),
            },
        }
    }

    pub fn type_mismatch(address: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Protocol {
            code: CODE_TYPE_MISMATCH,
            context: OscContext {
                address: address.into(),
                message: detail.into(),
            },
        }
    }

    pub fn out_of_range(address: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Protocol {
            code: CODE_OUT_OF_RANGE,
            context: OscContext {
                address: address.into(),
                message: detail.into(),
            },
        }
    }

    pub fn unsupported_capability(address: impl Into<String>, capability: &str) -> Self {
        Error::Semantic {
            code: CODE_UNSUPPORTED_CAPABILITY,
            context: OscContext {
                address: address.into(),
                message: format!("channel has no {capability} capability"),
            },
        }
    }

    pub fn malformed_packet(detail: impl Into<String>) -> Self {
        Error::Protocol {
            code: CODE_MALFORMED_PACKET,
            context: OscContext {
                address: String::new(),
                message: detail.into(),
            },
        }
    }

    /// The `(code, context, message)` triple carried by the outbound
    /// `/error ,iss` message, when this error is one the bridge reports
    /// outward rather than only logging.
    pub fn as_osc_error(&self) -> Option<(ErrorCode, &'static str, String)> {
        match self {
            Error::Protocol { code, context } => Some((*code, "osc", context.to_string())),
            Error::Semantic { code, context } => Some((*code, "osc", context.to_string())),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
