// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame codec: flat provider records in, typed engine frames out.
//!
//! Pure functions over borrowed input; no shared state, safe to call from
//! any thread. Validation order is arity, then finiteness, then rotation
//! normalization, so a malformed frame always reports the most basic
//! problem first.

use livelink_types::{
    BusMessage, CameraFrameData, CameraProjection, EndpointId, Envelope, FrameData, FrameMetadata,
    FrameRate, LightFrameData, MAX_DATAGRAM_SIZE, QualifiedFrameTime, Quat, RoleFrameData,
    RoleStaticData, SubjectStaticData, Timecode, TimecodeFormat, Transform, Vector3, WireError,
    wire_len,
};
use thiserror::Error;

use crate::schema::SubjectSchema;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Format(String),

    #[error("Non-finite value in {0}")]
    InvalidValue(String),

    #[error("Rotation of transform {index} is not normalized (magnitude {magnitude})")]
    InvalidRotation { index: usize, magnitude: f64 },

    #[error("{what} needs {size} bytes, over the {max} byte datagram limit")]
    TooLarge { what: String, size: usize, max: usize },
}

impl From<WireError> for CodecError {
    fn from(err: WireError) -> Self {
        CodecError::Format(err.to_string())
    }
}

/// Flat transform as it crosses the C boundary. Rotation is a quaternion
/// with `w` in the 4th slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTransform {
    pub rotation: [f32; 4],
    pub translation: [f32; 3],
    pub scale: [f32; 3],
}

impl RawTransform {
    pub const IDENTITY: RawTransform = RawTransform {
        rotation: [0.0, 0.0, 0.0, 1.0],
        translation: [0.0; 3],
        scale: [1.0; 3],
    };

    pub fn with_translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: [x, y, z],
            ..Self::IDENTITY
        }
    }

    fn is_finite(&self) -> bool {
        self.rotation
            .iter()
            .chain(self.translation.iter())
            .chain(self.scale.iter())
            .all(|v| v.is_finite())
    }
}

impl Default for RawTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per-frame metadata supplied by the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataInput {
    pub string_metadata: Vec<(String, String)>,
    pub timecode: Timecode,
}

/// Role-specific per-frame values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum RoleValues {
    #[default]
    None,
    Camera(CameraFrameData),
    Light(LightFrameData),
}

/// One frame as handed over by the caller, borrowed from its buffers.
#[derive(Debug, Clone, Default)]
pub struct FrameInput<'a> {
    pub world_time: f64,
    pub transforms: &'a [RawTransform],
    pub properties: &'a [f32],
    pub metadata: Option<MetadataInput>,
    pub role_values: RoleValues,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecSettings {
    /// Accepted deviation of a quaternion's magnitude from 1.
    pub rotation_tolerance: f64,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            rotation_tolerance: 1e-3,
        }
    }
}

/// Validate a schema and produce the engine's static data for it.
pub fn encode_static(schema: &SubjectSchema) -> Result<SubjectStaticData, CodecError> {
    schema.validate()?;
    Ok(schema.to_static_data())
}

/// Marshal one flat frame into the engine representation.
///
/// `out_of_order` is always `false` here; the session sets it since only it
/// knows the subject's previous timestamp.
pub fn encode(
    schema: &SubjectSchema,
    input: &FrameInput<'_>,
    settings: &CodecSettings,
) -> Result<FrameData, CodecError> {
    let expected_transforms = schema.transform_count();
    if input.transforms.len() != expected_transforms {
        return Err(CodecError::Format(format!(
            "expected {} transforms for {} subject, got {}",
            expected_transforms,
            schema.role(),
            input.transforms.len()
        )));
    }
    if input.properties.len() != schema.property_count() {
        return Err(CodecError::Format(format!(
            "expected {} property values, got {}",
            schema.property_count(),
            input.properties.len()
        )));
    }

    let role = encode_role_values(&schema.role, &input.role_values)?;

    if !input.world_time.is_finite() {
        return Err(CodecError::InvalidValue("world time".into()));
    }
    if let Some(index) = input.properties.iter().position(|v| !v.is_finite()) {
        return Err(CodecError::InvalidValue(format!("property {index}")));
    }

    let mut transforms = Vec::with_capacity(input.transforms.len());
    for (index, raw) in input.transforms.iter().enumerate() {
        transforms.push(encode_transform(index, raw, settings)?);
    }

    let metadata = match &input.metadata {
        Some(metadata) => encode_metadata(metadata)?,
        None => FrameMetadata::default(),
    };

    Ok(FrameData {
        world_time: input.world_time,
        metadata,
        transforms,
        property_values: input.properties.to_vec(),
        role,
        out_of_order: false,
    })
}

fn encode_transform(
    index: usize,
    raw: &RawTransform,
    settings: &CodecSettings,
) -> Result<Transform, CodecError> {
    if !raw.is_finite() {
        return Err(CodecError::InvalidValue(format!("transform {index}")));
    }

    let [x, y, z, w] = raw.rotation;
    let rotation = Quat::new(x as f64, y as f64, z as f64, w as f64);
    let magnitude = rotation.magnitude();
    if (magnitude - 1.0).abs() > settings.rotation_tolerance {
        return Err(CodecError::InvalidRotation { index, magnitude });
    }

    let [tx, ty, tz] = raw.translation;
    let [sx, sy, sz] = raw.scale;
    Ok(Transform {
        rotation,
        translation: Vector3::new(tx as f64, ty as f64, tz as f64),
        scale: Vector3::new(sx as f64, sy as f64, sz as f64),
    })
}

fn encode_role_values(
    role: &RoleStaticData,
    values: &RoleValues,
) -> Result<RoleFrameData, CodecError> {
    match (role, values) {
        (
            RoleStaticData::Basic | RoleStaticData::Transform | RoleStaticData::Animation { .. },
            RoleValues::None,
        ) => Ok(RoleFrameData::None),
        (RoleStaticData::Camera(_), RoleValues::Camera(camera)) => {
            let values = [
                camera.field_of_view,
                camera.aspect_ratio,
                camera.focal_length,
                camera.aperture,
                camera.focus_distance,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CodecError::InvalidValue("camera values".into()));
            }
            Ok(RoleFrameData::Camera(*camera))
        }
        (RoleStaticData::Light(_), RoleValues::Light(light)) => {
            let values = [
                light.temperature,
                light.intensity,
                light.inner_cone_angle,
                light.outer_cone_angle,
                light.attenuation_radius,
                light.source_radius,
                light.soft_source_radius,
                light.source_length,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CodecError::InvalidValue("light values".into()));
            }
            let mut light = *light;
            light.light_color[3] = 255;
            Ok(RoleFrameData::Light(light))
        }
        (role, values) => Err(CodecError::Format(format!(
            "{} subject cannot take {} frame values",
            role.role(),
            match values {
                RoleValues::None => "plain",
                RoleValues::Camera(_) => "camera",
                RoleValues::Light(_) => "light",
            }
        ))),
    }
}

fn encode_metadata(input: &MetadataInput) -> Result<FrameMetadata, CodecError> {
    let string_metadata = input.string_metadata.iter().cloned().collect();
    Ok(FrameMetadata {
        string_metadata,
        scene_time: qualify_timecode(&input.timecode)?,
    })
}

/// Wire size of the largest frame envelope `schema` can produce for
/// `subject`, string metadata excluded.
///
/// Fails with [`CodecError::TooLarge`] when that frame, or the subject's
/// static data, cannot travel in one datagram. Every float is written at
/// full width, so only integers and variant names vary in size and both
/// are taken at their widest here.
pub fn frame_size_bound(subject: &str, schema: &SubjectSchema) -> Result<usize, CodecError> {
    let sender = EndpointId::new_random();
    let recipient = EndpointId::new_random();

    let static_data = Envelope::to(
        sender,
        recipient,
        BusMessage::SubjectStatic {
            subject: subject.to_string(),
            data: schema.to_static_data(),
        },
    );
    fits(|| format!("static data of '{subject}'"), wire_len(&static_data)?)?;

    let widest = Envelope::to(
        sender,
        recipient,
        BusMessage::FrameData {
            subject: subject.to_string(),
            frame: FrameData {
                world_time: 0.0,
                metadata: FrameMetadata {
                    string_metadata: Default::default(),
                    scene_time: Some(widest_scene_time()),
                },
                transforms: vec![Transform::IDENTITY; schema.transform_count()],
                property_values: vec![0.0; schema.property_count()],
                role: widest_role_values(&schema.role),
                out_of_order: true,
            },
        },
    );
    let bound = wire_len(&widest)?;
    fits(
        || format!("a frame of '{subject}' ({} transforms)", schema.transform_count()),
        bound,
    )?;
    Ok(bound)
}

/// Check one encoded frame against its subject's [`frame_size_bound`],
/// adding the string metadata the bound leaves out.
pub fn check_frame_size(subject: &str, bound: usize, frame: &FrameData) -> Result<(), CodecError> {
    let strings = &frame.metadata.string_metadata;
    if strings.is_empty() {
        return Ok(());
    }
    let empty = wire_len(&FrameMetadata::default().string_metadata)?;
    let size = bound - empty + wire_len(strings)?;
    fits(|| format!("a frame of '{subject}' with its metadata"), size)
}

fn fits(what: impl FnOnce() -> String, size: usize) -> Result<(), CodecError> {
    if size > MAX_DATAGRAM_SIZE {
        return Err(CodecError::TooLarge {
            what: what(),
            size,
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

fn widest_scene_time() -> QualifiedFrameTime {
    QualifiedFrameTime {
        timecode: Timecode {
            hours: i32::MIN,
            minutes: i32::MIN,
            seconds: i32::MIN,
            frames: i32::MIN,
            format: TimecodeFormat::Fps29_97Ndf,
        },
        rate: FrameRate {
            numerator: i32::MIN,
            denominator: i32::MIN,
        },
        drop_frame: true,
    }
}

fn widest_role_values(role: &RoleStaticData) -> RoleFrameData {
    match role {
        RoleStaticData::Basic | RoleStaticData::Transform | RoleStaticData::Animation { .. } => {
            RoleFrameData::None
        }
        RoleStaticData::Camera(_) => RoleFrameData::Camera(CameraFrameData {
            projection: CameraProjection::Orthographic,
            ..CameraFrameData::default()
        }),
        RoleStaticData::Light(_) => RoleFrameData::Light(LightFrameData {
            light_color: [u8::MAX; 4],
            ..LightFrameData::default()
        }),
    }
}

/// Attach the exact frame rate to a timecode.
///
/// A zero timecode of unknown format means "no scene time".
pub fn qualify_timecode(timecode: &Timecode) -> Result<Option<QualifiedFrameTime>, CodecError> {
    let Some(rate) = timecode.format.frame_rate() else {
        if timecode.is_zero() {
            return Ok(None);
        }
        return Err(CodecError::Format(
            "timecode has no format but non-zero fields".into(),
        ));
    };

    let max_frames = (rate.as_f64().ceil()) as i32;
    let in_range = (0..24).contains(&timecode.hours)
        && (0..60).contains(&timecode.minutes)
        && (0..60).contains(&timecode.seconds)
        && (0..max_frames).contains(&timecode.frames);
    if !in_range {
        return Err(CodecError::Format(format!(
            "timecode {:02}:{:02}:{:02}:{:02} out of range for {:?}",
            timecode.hours, timecode.minutes, timecode.seconds, timecode.frames, timecode.format
        )));
    }

    Ok(Some(QualifiedFrameTime {
        timecode: *timecode,
        rate,
        drop_frame: timecode.format.is_drop_frame(),
    }))
}

/// Frame values narrowed back to the provider's flat layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub transforms: Vec<RawTransform>,
    pub properties: Vec<f32>,
}

/// Inverse of [`encode`] for the flat parts of a frame.
pub fn decode(frame: &FrameData) -> DecodedFrame {
    let transforms = frame
        .transforms
        .iter()
        .map(|t| RawTransform {
            rotation: [
                t.rotation.x as f32,
                t.rotation.y as f32,
                t.rotation.z as f32,
                t.rotation.w as f32,
            ],
            translation: [
                t.translation.x as f32,
                t.translation.y as f32,
                t.translation.z as f32,
            ],
            scale: [t.scale.x as f32, t.scale.y as f32, t.scale.z as f32],
        })
        .collect();

    DecodedFrame {
        transforms,
        properties: frame.property_values.clone(),
    }
}

/// Timecode format from its C discriminant.
pub fn timecode_format(raw: i32) -> Result<TimecodeFormat, CodecError> {
    TimecodeFormat::from_raw(raw)
        .ok_or_else(|| CodecError::Format(format!("unknown timecode format {raw}")))
}
