// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared live-link types.
//!
//! Everything an engine-side consumer needs to understand what a provider
//! sends: the typed transform and frame representation, per-role static
//! data, and the bus message set with its MessagePack wire encoding. The
//! provider crate (`livelink`) and any engine peer depend on this crate so
//! both sides agree on the wire layout.

pub mod frame;
pub mod math;
pub mod message;
pub mod static_data;

pub use frame::{
    CameraFrameData, CameraProjection, FrameData, FrameMetadata, FrameRate, LightFrameData, QualifiedFrameTime,
    RoleFrameData, Timecode, TimecodeFormat,
};
pub use math::{Quat, Transform, Vector3};
pub use message::{
    BusMessage, EndpointId, Envelope, WireError, LIVELINK_API_VERSION, MAX_DATAGRAM_SIZE, wire_len,
};
pub use static_data::{Bone, CameraStatic, LightStatic, Role, RoleStaticData, SubjectStaticData};
