// SPDX-License-Identifier: GPL-3.0-or-later

//! Top-level error type for the bridge binary: everything `oscmix-core`
//! reports, plus the startup-only failures (argument/env resolution, socket
//! bind) that have no home in that crate's device-shaped taxonomy.

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Core(#[from] oscmix_core::Error),

    #[error("startup failed: {0}")]
    Startup(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
