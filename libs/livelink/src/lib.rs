// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Live-link provider core.
//!
//! Streams motion, camera and light data from an external process into a
//! 3D engine's live-link subsystem. A [`ProviderSession`] registers
//! subjects, encodes frames with the [`codec`] and delivers them over a
//! [`Transport`] once an engine has answered discovery.
//!
//! ```no_run
//! use livelink::{FrameInput, ProviderConfig, ProviderSession, RawTransform, SubjectSchema};
//!
//! # fn main() -> livelink::Result<()> {
//! let provider = ProviderSession::create("Cam1", ProviderConfig::default())?;
//! let root = provider.register_subject("Root", SubjectSchema::transform(vec![]))?;
//!
//! let transforms = [RawTransform::IDENTITY];
//! let frame = FrameInput {
//!     world_time: 0.0,
//!     transforms: &transforms,
//!     ..FrameInput::default()
//! };
//! if provider.is_connected() {
//!     provider.push_frame(root, &frame)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod outbound;
pub mod registry;
pub mod schema;
pub mod session;
pub mod transport;
mod worker;

pub use codec::{
    CodecError, CodecSettings, DecodedFrame, FrameInput, MetadataInput, RawTransform, RoleValues,
};
pub use config::{LoopbackConfig, ProviderConfig, TransportConfig, UdpConfig};
pub use connection::{ConnectionEvent, ConnectionMachine, ConnectionState, ConnectionTimings};
pub use error::{LiveLinkError, Result};
pub use logging::init_logging;
pub use registry::{Registration, SubjectId, SubjectRegistry};
pub use schema::SubjectSchema;
pub use session::{ConnectionCallback, ProviderSession, PushOutcome};
pub use transport::{LoopbackBus, LoopbackTransport, Transport, UdpTransport};

pub use livelink_types as types;
