// SPDX-License-Identifier: GPL-3.0-or-later

//! Device-independent control-plane core: device descriptors, the
//! parameter address tree, the device model, and the scheduler primitive
//! that serialises access to it. Device semantics (mixer law, sample-rate
//! table, DURec transitions) live one layer up in `oscmix-bridge`, which
//! consumes this crate the way the teacher's `runtime/fireface` consumes
//! `protocols/fireface` and `libs/core`.

pub mod coder;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod names;
pub mod tree;

pub use coder::{CoderData, InboundCoder, OutboundCoder};
pub use device::{
    DeviceDescriptor, InputCapability, InputChannelDescriptor, OutputCapability,
    OutputChannelDescriptor,
};
pub use dispatcher::{Dispatcher, Event};
pub use error::{Error, ErrorCode, OscContext, Result};
pub use model::{
    DeviceModel, DspState, DurecState, DurecTransport, InputState, MixerCell, ModelEvent,
    ObserverCategory, OutputState, RegisterWrite,
};
pub use names::{pack_name, unpack_name};
pub use tree::{ParameterTree, Segment, TraversalStep};
