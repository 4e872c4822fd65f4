// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator-side configuration: CLI flags (spec.md §6) and the snapshot
//! file path. Modeled on the teacher's `Arguments`/`ServiceCmd::params` split
//! in `runtime/fireface/src/bin/snd-fireface-ctl-service.rs`, generalized
//! from a single positional card id to the fuller flag set a UDP/MIDI
//! bridge needs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

const DEFAULT_RECEIVE_ADDR: &str = "127.0.0.1:7222";
const DEFAULT_SEND_ADDR: &str = "127.0.0.1:8222";
const DEFAULT_MULTICAST_ADDR: &str = "224.0.0.1:8222";

#[derive(Parser, Debug)]
#[command(name = "oscmix", about = "OSC-to-RME-SysEx control bridge")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Disable periodic meter requests.
    #[arg(short = 'l', long = "no-meters")]
    pub disable_meters: bool,

    /// Send OSC output to the multicast group instead of a unicast peer.
    #[arg(short = 'm', long)]
    pub multicast: bool,

    /// UDP address to receive OSC datagrams on.
    #[arg(short = 'r', long = "recv", default_value = DEFAULT_RECEIVE_ADDR)]
    pub receive_addr: String,

    /// UDP address to send OSC datagrams to.
    #[arg(short = 's', long = "send", default_value = DEFAULT_SEND_ADDR)]
    pub send_addr: String,

    /// MIDI input/output device name. Falls back to `MIDIPORT` if unset.
    #[arg(short = 'p', long = "port")]
    pub midi_port: Option<String>,

    /// Device identifier: one of `ucx2`, `ff802`, `ufx2`, `ucx`. Falls back
    /// to `OSCMIX_DEVICE` if unset.
    #[arg(long)]
    pub device: Option<String>,
}

impl Cli {
    pub fn midi_port_name(&self) -> Result<String, String> {
        self.midi_port
            .clone()
            .or_else(|| std::env::var("MIDIPORT").ok())
            .ok_or_else(|| "no MIDI port given: pass -p or set MIDIPORT".to_string())
    }

    pub fn device_id(&self) -> Result<String, String> {
        self.device
            .clone()
            .or_else(|| std::env::var("OSCMIX_DEVICE").ok())
            .ok_or_else(|| "no device given: pass --device or set OSCMIX_DEVICE".to_string())
    }

    pub fn send_socket_addr(&self) -> Result<SocketAddr, String> {
        if self.multicast {
            return DEFAULT_MULTICAST_ADDR
                .parse()
                .map_err(|e| format!("bad multicast address: {e}"));
        }
        self.send_addr
            .parse()
            .map_err(|e| format!("bad send address {:?}: {e}", self.send_addr))
    }

    pub fn receive_socket_addr(&self) -> Result<SocketAddr, String> {
        self.receive_addr
            .parse()
            .map_err(|e| format!("bad receive address {:?}: {e}", self.receive_addr))
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }
}

impl Default for Cli {
    fn default() -> Self {
        Cli {
            debug: false,
            disable_meters: false,
            multicast: false,
            receive_addr: DEFAULT_RECEIVE_ADDR.to_string(),
            send_addr: DEFAULT_SEND_ADDR.to_string(),
            midi_port: None,
            device: None,
        }
    }
}

/// Multicast group address used when `-m` is given (spec.md §6 "multicast
/// alternative `224.0.0.1:8222`").
pub fn multicast_group() -> Ipv4Addr {
    match DEFAULT_MULTICAST_ADDR.parse::<SocketAddr>().unwrap().ip() {
        IpAddr::V4(addr) => addr,
        IpAddr::V6(_) => unreachable!("multicast default is IPv4"),
    }
}

/// `<app-data>/OSCMix/device_config/<device>.json` (spec.md §6 "Persisted
/// state"). No `dirs`-style crate appears anywhere in the reference corpus
/// for this kind of path, so this resolves the platform base directory by
/// hand from the usual environment variables rather than adding a
/// dependency nothing else in the stack needs.
pub fn snapshot_path(device_id: &str) -> PathBuf {
    let base = app_data_dir();
    base.join("OSCMix").join("device_config").join(format!("{device_id}.json"))
}

#[cfg(target_os = "windows")]
fn app_data_dir() -> PathBuf {
    std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(not(target_os = "windows"))]
fn app_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_is_namespaced_by_device() {
        let p = snapshot_path("ucx2");
        assert!(p.ends_with("OSCMix/device_config/ucx2.json"));
    }

    #[test]
    fn multicast_default_matches_spec() {
        assert_eq!(multicast_group(), Ipv4Addr::new(224, 0, 0, 1));
    }
}
