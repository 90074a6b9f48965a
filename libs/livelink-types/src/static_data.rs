// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-subject static data: the role, its slots, and role-specific
//! capability flags. Sent once per subject (and again to every newly
//! subscribed engine); frames are interpreted against it.

use serde::{Deserialize, Serialize};

/// Kind of subject, which fixes the shape of its static and frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Named float properties only.
    Basic,
    /// A single transform.
    Transform,
    /// A skeleton: one transform per bone.
    Animation,
    /// A transform plus camera lens values.
    Camera,
    /// A transform plus light values.
    Light,
}

impl Role {
    /// Number of transforms a frame of this role carries, given the bone count.
    pub fn transform_count(self, bone_count: usize) -> usize {
        match self {
            Role::Basic => 0,
            Role::Transform | Role::Camera | Role::Light => 1,
            Role::Animation => bone_count,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Basic => "basic",
            Role::Transform => "transform",
            Role::Animation => "animation",
            Role::Camera => "camera",
            Role::Light => "light",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skeleton bone. `parent_index == -1` marks a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub parent_index: i32,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent_index: i32) -> Self {
        Self {
            name: name.into(),
            parent_index,
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name, -1)
    }
}

/// Which per-frame camera values the engine should apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraStatic {
    pub is_field_of_view_supported: bool,
    pub is_aspect_ratio_supported: bool,
    pub is_focal_length_supported: bool,
    pub is_projection_mode_supported: bool,
    /// Cinematic cameras only; values `<= 0` leave the engine default.
    pub film_back_width: f32,
    pub film_back_height: f32,
    pub is_aperture_supported: bool,
    pub is_focus_distance_supported: bool,
}

impl Default for CameraStatic {
    fn default() -> Self {
        Self {
            is_field_of_view_supported: false,
            is_aspect_ratio_supported: false,
            is_focal_length_supported: false,
            is_projection_mode_supported: false,
            film_back_width: -1.0,
            film_back_height: -1.0,
            is_aperture_supported: false,
            is_focus_distance_supported: false,
        }
    }
}

/// Which per-frame light values the engine should apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightStatic {
    pub is_temperature_supported: bool,
    pub is_intensity_supported: bool,
    pub is_light_color_supported: bool,
    pub is_inner_cone_angle_supported: bool,
    pub is_outer_cone_angle_supported: bool,
    pub is_attenuation_radius_supported: bool,
    pub is_source_length_supported: bool,
    pub is_source_radius_supported: bool,
    pub is_soft_source_radius_supported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoleStaticData {
    Basic,
    Transform,
    Animation { bones: Vec<Bone> },
    Camera(CameraStatic),
    Light(LightStatic),
}

impl RoleStaticData {
    pub fn role(&self) -> Role {
        match self {
            RoleStaticData::Basic => Role::Basic,
            RoleStaticData::Transform => Role::Transform,
            RoleStaticData::Animation { .. } => Role::Animation,
            RoleStaticData::Camera(_) => Role::Camera,
            RoleStaticData::Light(_) => Role::Light,
        }
    }

    pub fn bones(&self) -> &[Bone] {
        match self {
            RoleStaticData::Animation { bones } => bones,
            _ => &[],
        }
    }
}

/// Static data of one subject as the engine receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStaticData {
    pub property_names: Vec<String>,
    pub role: RoleStaticData,
}

impl SubjectStaticData {
    pub fn transform_count(&self) -> usize {
        let role = self.role.role();
        role.transform_count(self.role.bones().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_count_follows_role() {
        assert_eq!(Role::Basic.transform_count(5), 0);
        assert_eq!(Role::Transform.transform_count(5), 1);
        assert_eq!(Role::Camera.transform_count(0), 1);
        assert_eq!(Role::Light.transform_count(0), 1);
        assert_eq!(Role::Animation.transform_count(3), 3);
    }

    #[test]
    fn static_data_reports_bone_transforms() {
        let data = SubjectStaticData {
            property_names: vec![],
            role: RoleStaticData::Animation {
                bones: vec![Bone::root("root"), Bone::new("spine", 0)],
            },
        };
        assert_eq!(data.transform_count(), 2);
        assert_eq!(data.role.role(), Role::Animation);
    }

    #[test]
    fn camera_static_defaults_leave_film_back_unset() {
        let camera = CameraStatic::default();
        assert!(camera.film_back_width < 0.0);
        assert!(!camera.is_field_of_view_supported);
    }
}
