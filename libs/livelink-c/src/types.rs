// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Flat `#[repr(C)]` records shared with C callers, and their conversions
//! into the core types.

use std::ffi::{CStr, c_char};

use livelink::types::{
    Bone, CameraFrameData, CameraProjection, CameraStatic, LightFrameData, LightStatic, Timecode,
};
use livelink::{ConnectionEvent, LiveLinkError, MetadataInput, RawTransform, Result, codec};

/// Size of every fixed name buffer, including the terminating NUL.
pub const LL_NAME_LEN: usize = 128;

pub type LlName = [c_char; LL_NAME_LEN];

/// Rotation `(x, y, z, w)`, translation and scale `(x, y, z)`.
pub type LlTransform = RawTransform;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlBone {
    pub name: LlName,
    /// `-1` for a root bone.
    pub parent_index: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlKeyValue {
    pub key: LlName,
    pub value: LlName,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LlTimecode {
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub frames: i32,
    /// `TimecodeFormat` discriminant; `0` means no timecode.
    pub format: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlMetadata {
    pub key_values: *const LlKeyValue,
    pub key_value_count: u32,
    pub timecode: LlTimecode,
}

/// Capability flags are `0` for false and anything else for true.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlCameraStatic {
    pub is_field_of_view_supported: u8,
    pub is_aspect_ratio_supported: u8,
    pub is_focal_length_supported: u8,
    pub is_projection_mode_supported: u8,
    pub film_back_width: f32,
    pub film_back_height: f32,
    pub is_aperture_supported: u8,
    pub is_focus_distance_supported: u8,
}

pub const LL_PROJECTION_PERSPECTIVE: i32 = 0;
pub const LL_PROJECTION_ORTHOGRAPHIC: i32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlCamera {
    pub field_of_view: f32,
    pub aspect_ratio: f32,
    pub focal_length: f32,
    pub aperture: f32,
    pub focus_distance: f32,
    pub projection: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlLightStatic {
    pub is_temperature_supported: u8,
    pub is_intensity_supported: u8,
    pub is_light_color_supported: u8,
    pub is_inner_cone_angle_supported: u8,
    pub is_outer_cone_angle_supported: u8,
    pub is_attenuation_radius_supported: u8,
    pub is_source_length_supported: u8,
    pub is_source_radius_supported: u8,
    pub is_soft_source_radius_supported: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlLight {
    pub temperature: f32,
    pub intensity: f32,
    /// RGBA; alpha is forced to 255.
    pub light_color: [u8; 4],
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub attenuation_radius: f32,
    pub source_radius: f32,
    pub soft_source_radius: f32,
    pub source_length: f32,
}

/// `ConnectionState` discriminants: 0 disconnected, 1 discovering,
/// 2 connected.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlConnectionEvent {
    pub previous: i32,
    pub current: i32,
}

// ============================================================================
// Conversions
// ============================================================================

/// Read a NUL-terminated name out of a fixed buffer.
pub fn name_from_buffer(buffer: &LlName, what: &str) -> Result<String> {
    // SAFETY: c_char and u8 have the same size and alignment.
    let bytes: &[u8; LL_NAME_LEN] = unsafe { &*(buffer as *const LlName as *const [u8; LL_NAME_LEN]) };
    let name = CStr::from_bytes_until_nul(bytes)
        .map_err(|_| LiveLinkError::InvalidArgument(format!("{what} is not NUL-terminated")))?;
    name.to_str()
        .map(str::to_owned)
        .map_err(|_| LiveLinkError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

/// Copy `name` into a fixed buffer, truncating on a character boundary.
pub fn name_to_buffer(name: &str) -> LlName {
    let mut buffer: LlName = [0; LL_NAME_LEN];
    let mut end = name.len().min(LL_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    for (slot, byte) in buffer.iter_mut().zip(&name.as_bytes()[..end]) {
        *slot = *byte as c_char;
    }
    buffer
}

impl LlBone {
    pub fn new(name: &str, parent_index: i32) -> Self {
        Self {
            name: name_to_buffer(name),
            parent_index,
        }
    }

    pub fn to_bone(&self) -> Result<Bone> {
        Ok(Bone::new(name_from_buffer(&self.name, "bone name")?, self.parent_index))
    }
}

impl LlKeyValue {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: name_to_buffer(key),
            value: name_to_buffer(value),
        }
    }
}

impl LlTimecode {
    pub fn to_timecode(&self) -> Result<Timecode> {
        Ok(Timecode {
            hours: self.hours,
            minutes: self.minutes,
            seconds: self.seconds,
            frames: self.frames,
            format: codec::timecode_format(self.format)?,
        })
    }
}

impl Default for LlMetadata {
    fn default() -> Self {
        Self {
            key_values: std::ptr::null(),
            key_value_count: 0,
            timecode: LlTimecode::default(),
        }
    }
}

impl LlMetadata {
    /// # Safety
    /// `key_values` must point at `key_value_count` records or be null with
    /// a zero count.
    pub unsafe fn to_input(&self) -> Result<MetadataInput> {
        let pairs = unsafe { crate::slice_arg(self.key_values, self.key_value_count, "metadata key_values")? };
        let string_metadata = pairs
            .iter()
            .map(|pair| {
                Ok((
                    name_from_buffer(&pair.key, "metadata key")?,
                    name_from_buffer(&pair.value, "metadata value")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MetadataInput {
            string_metadata,
            timecode: self.timecode.to_timecode()?,
        })
    }
}

impl Default for LlCameraStatic {
    fn default() -> Self {
        CameraStatic::default().into()
    }
}

impl From<CameraStatic> for LlCameraStatic {
    fn from(camera: CameraStatic) -> Self {
        Self {
            is_field_of_view_supported: u8::from(camera.is_field_of_view_supported),
            is_aspect_ratio_supported: u8::from(camera.is_aspect_ratio_supported),
            is_focal_length_supported: u8::from(camera.is_focal_length_supported),
            is_projection_mode_supported: u8::from(camera.is_projection_mode_supported),
            film_back_width: camera.film_back_width,
            film_back_height: camera.film_back_height,
            is_aperture_supported: u8::from(camera.is_aperture_supported),
            is_focus_distance_supported: u8::from(camera.is_focus_distance_supported),
        }
    }
}

impl From<&LlCameraStatic> for CameraStatic {
    fn from(camera: &LlCameraStatic) -> Self {
        Self {
            is_field_of_view_supported: camera.is_field_of_view_supported != 0,
            is_aspect_ratio_supported: camera.is_aspect_ratio_supported != 0,
            is_focal_length_supported: camera.is_focal_length_supported != 0,
            is_projection_mode_supported: camera.is_projection_mode_supported != 0,
            film_back_width: camera.film_back_width,
            film_back_height: camera.film_back_height,
            is_aperture_supported: camera.is_aperture_supported != 0,
            is_focus_distance_supported: camera.is_focus_distance_supported != 0,
        }
    }
}

impl Default for LlCamera {
    fn default() -> Self {
        let camera = CameraFrameData::default();
        Self {
            field_of_view: camera.field_of_view,
            aspect_ratio: camera.aspect_ratio,
            focal_length: camera.focal_length,
            aperture: camera.aperture,
            focus_distance: camera.focus_distance,
            projection: LL_PROJECTION_PERSPECTIVE,
        }
    }
}

impl LlCamera {
    pub fn to_frame_data(&self) -> Result<CameraFrameData> {
        let projection = match self.projection {
            LL_PROJECTION_PERSPECTIVE => CameraProjection::Perspective,
            LL_PROJECTION_ORTHOGRAPHIC => CameraProjection::Orthographic,
            other => {
                return Err(LiveLinkError::InvalidArgument(format!(
                    "unknown camera projection {other}"
                )));
            }
        };
        Ok(CameraFrameData {
            field_of_view: self.field_of_view,
            aspect_ratio: self.aspect_ratio,
            focal_length: self.focal_length,
            aperture: self.aperture,
            focus_distance: self.focus_distance,
            projection,
        })
    }
}

impl Default for LlLightStatic {
    fn default() -> Self {
        Self::from(LightStatic::default())
    }
}

impl From<LightStatic> for LlLightStatic {
    fn from(light: LightStatic) -> Self {
        Self {
            is_temperature_supported: u8::from(light.is_temperature_supported),
            is_intensity_supported: u8::from(light.is_intensity_supported),
            is_light_color_supported: u8::from(light.is_light_color_supported),
            is_inner_cone_angle_supported: u8::from(light.is_inner_cone_angle_supported),
            is_outer_cone_angle_supported: u8::from(light.is_outer_cone_angle_supported),
            is_attenuation_radius_supported: u8::from(light.is_attenuation_radius_supported),
            is_source_length_supported: u8::from(light.is_source_length_supported),
            is_source_radius_supported: u8::from(light.is_source_radius_supported),
            is_soft_source_radius_supported: u8::from(light.is_soft_source_radius_supported),
        }
    }
}

impl From<&LlLightStatic> for LightStatic {
    fn from(light: &LlLightStatic) -> Self {
        Self {
            is_temperature_supported: light.is_temperature_supported != 0,
            is_intensity_supported: light.is_intensity_supported != 0,
            is_light_color_supported: light.is_light_color_supported != 0,
            is_inner_cone_angle_supported: light.is_inner_cone_angle_supported != 0,
            is_outer_cone_angle_supported: light.is_outer_cone_angle_supported != 0,
            is_attenuation_radius_supported: light.is_attenuation_radius_supported != 0,
            is_source_length_supported: light.is_source_length_supported != 0,
            is_source_radius_supported: light.is_source_radius_supported != 0,
            is_soft_source_radius_supported: light.is_soft_source_radius_supported != 0,
        }
    }
}

impl Default for LlLight {
    fn default() -> Self {
        let light = LightFrameData::default();
        Self {
            temperature: light.temperature,
            intensity: light.intensity,
            light_color: light.light_color,
            inner_cone_angle: light.inner_cone_angle,
            outer_cone_angle: light.outer_cone_angle,
            attenuation_radius: light.attenuation_radius,
            source_radius: light.source_radius,
            soft_source_radius: light.soft_source_radius,
            source_length: light.source_length,
        }
    }
}

impl From<&LlLight> for LightFrameData {
    fn from(light: &LlLight) -> Self {
        Self {
            temperature: light.temperature,
            intensity: light.intensity,
            light_color: light.light_color,
            inner_cone_angle: light.inner_cone_angle,
            outer_cone_angle: light.outer_cone_angle,
            attenuation_radius: light.attenuation_radius,
            source_radius: light.source_radius,
            soft_source_radius: light.soft_source_radius,
            source_length: light.source_length,
        }
    }
}

impl From<ConnectionEvent> for LlConnectionEvent {
    fn from(event: ConnectionEvent) -> Self {
        Self {
            previous: event.previous as i32,
            current: event.current as i32,
        }
    }
}
