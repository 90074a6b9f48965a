// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-frame data as the engine receives it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::Transform;

/// SMPTE timecode rates (ST 12-1, ST 428-11).
///
/// Discriminants are part of the C ABI and must not be reordered.
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimecodeFormat {
    #[default]
    Unknown = 0,
    Fps23_98 = 1,
    Fps24 = 2,
    Fps25 = 3,
    Fps29_97Ndf = 4,
    Fps29_97Df = 5,
    Fps30 = 6,
    Fps47_95 = 7,
    Fps48 = 8,
    Fps50 = 9,
    Fps59_94Ndf = 10,
    Fps59_94Df = 11,
    Fps60 = 12,
    Fps72 = 13,
    Fps96 = 14,
    Fps100 = 15,
    Fps120 = 16,
}

impl TimecodeFormat {
    pub fn from_raw(raw: i32) -> Option<Self> {
        use TimecodeFormat::*;
        Some(match raw {
            0 => Unknown,
            1 => Fps23_98,
            2 => Fps24,
            3 => Fps25,
            4 => Fps29_97Ndf,
            5 => Fps29_97Df,
            6 => Fps30,
            7 => Fps47_95,
            8 => Fps48,
            9 => Fps50,
            10 => Fps59_94Ndf,
            11 => Fps59_94Df,
            12 => Fps60,
            13 => Fps72,
            14 => Fps96,
            15 => Fps100,
            16 => Fps120,
            _ => return None,
        })
    }

    /// Exact rate of this format; `None` for [`TimecodeFormat::Unknown`].
    pub fn frame_rate(self) -> Option<FrameRate> {
        use TimecodeFormat::*;
        let (numerator, denominator) = match self {
            Unknown => return None,
            Fps23_98 => (24000, 1001),
            Fps24 => (24, 1),
            Fps25 => (25, 1),
            Fps29_97Ndf | Fps29_97Df => (30000, 1001),
            Fps30 => (30, 1),
            Fps47_95 => (48000, 1001),
            Fps48 => (48, 1),
            Fps50 => (50, 1),
            Fps59_94Ndf | Fps59_94Df => (60000, 1001),
            Fps60 => (60, 1),
            Fps72 => (72, 1),
            Fps96 => (96, 1),
            Fps100 => (100, 1),
            Fps120 => (120, 1),
        };
        Some(FrameRate {
            numerator,
            denominator,
        })
    }

    pub fn is_drop_frame(self) -> bool {
        matches!(self, TimecodeFormat::Fps29_97Df | TimecodeFormat::Fps59_94Df)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: i32,
    pub denominator: i32,
}

impl FrameRate {
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub frames: i32,
    pub format: TimecodeFormat,
}

impl Timecode {
    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0 && self.frames == 0
    }
}

/// A timecode qualified by its exact rate, as the engine stores scene time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedFrameTime {
    pub timecode: Timecode,
    pub rate: FrameRate,
    pub drop_frame: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub string_metadata: BTreeMap<String, String>,
    pub scene_time: Option<QualifiedFrameTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CameraProjection {
    Perspective,
    Orthographic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrameData {
    /// Degrees.
    pub field_of_view: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    pub focal_length: f32,
    /// f-stop.
    pub aperture: f32,
    /// Centimetres; manual focus only.
    pub focus_distance: f32,
    pub projection: CameraProjection,
}

impl Default for CameraFrameData {
    fn default() -> Self {
        Self {
            field_of_view: 90.0,
            aspect_ratio: 1.777_778,
            focal_length: 50.0,
            aperture: 2.8,
            focus_distance: 100_000.0,
            projection: CameraProjection::Perspective,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightFrameData {
    /// Kelvin.
    pub temperature: f32,
    /// Lux.
    pub intensity: f32,
    /// RGBA; alpha is always 255 on the engine side.
    pub light_color: [u8; 4],
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub attenuation_radius: f32,
    pub source_radius: f32,
    pub soft_source_radius: f32,
    pub source_length: f32,
}

impl Default for LightFrameData {
    fn default() -> Self {
        Self {
            temperature: 6500.0,
            intensity: std::f32::consts::PI,
            light_color: [255, 255, 255, 255],
            inner_cone_angle: 0.0,
            outer_cone_angle: 44.0,
            attenuation_radius: 1000.0,
            source_radius: 0.0,
            soft_source_radius: 0.0,
            source_length: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoleFrameData {
    /// Basic, transform and animation frames carry no extra values.
    None,
    Camera(CameraFrameData),
    Light(LightFrameData),
}

/// One timestamped snapshot of a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    /// Seconds, as supplied by the provider.
    pub world_time: f64,
    pub metadata: FrameMetadata,
    /// One per transform slot of the subject's static data.
    pub transforms: Vec<Transform>,
    /// One per property name of the subject's static data.
    pub property_values: Vec<f32>,
    pub role: RoleFrameData,
    /// Set when `world_time` went backwards relative to the previous frame
    /// of the same subject. Ordering policy is left to the engine.
    pub out_of_order: bool,
}

impl FrameData {
    /// Empty frame at `world_time`, for subjects without slots.
    pub fn new(world_time: f64) -> Self {
        Self {
            world_time,
            metadata: FrameMetadata::default(),
            transforms: Vec::new(),
            property_values: Vec::new(),
            role: RoleFrameData::None,
            out_of_order: false,
        }
    }
}
