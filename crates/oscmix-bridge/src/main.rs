// SPDX-License-Identifier: GPL-3.0-or-later

//! Entry point (spec.md §6 "Collaborators"). Mirrors the teacher's
//! `ServiceCmd::run()` shape in `runtime/fireface/src/bin/snd-fireface-ctl-service.rs`:
//! parse arguments, initialise logging, build the runtime, run it to
//! completion or exit non-zero on startup failure.

mod config;
mod error;
mod midi_io;
mod runtime;
mod snapshot;
mod translation;

use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use log::{error, info};

use config::Cli;
use error::BridgeError;
use runtime::BridgeRuntime;

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.debug {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();

    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), BridgeError> {
    let mut bridge = BridgeRuntime::new(cli)?;
    info!("oscmix bridge ready");
    let result = bridge.run();
    save_shutdown_snapshot(cli, &bridge);
    result.map_err(BridgeError::from)
}

fn save_shutdown_snapshot(cli: &Cli, bridge: &BridgeRuntime) {
    let Ok(device_id) = cli.device_id() else { return };
    let path = config::snapshot_path(&device_id);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let snap = snapshot::capture(bridge.model(), timestamp);
    if let Err(e) = snapshot::save(&snap, &path) {
        error!("failed to save snapshot to {}: {e}", path.display());
    }
}
