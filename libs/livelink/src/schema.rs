// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Subject schemas: the ordered slots a subject's frames must fill.

use std::collections::HashSet;

use livelink_types::{Bone, CameraStatic, LightStatic, Role, RoleStaticData, SubjectStaticData};

use crate::codec::CodecError;

/// Role plus ordered property and bone slots of one subject.
///
/// Immutable once registered; changing it goes through
/// [`SubjectRegistry::update_schema`](crate::registry::SubjectRegistry::update_schema).
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSchema {
    pub property_names: Vec<String>,
    pub role: RoleStaticData,
}

impl SubjectSchema {
    pub fn basic(property_names: Vec<String>) -> Self {
        Self {
            property_names,
            role: RoleStaticData::Basic,
        }
    }

    pub fn transform(property_names: Vec<String>) -> Self {
        Self {
            property_names,
            role: RoleStaticData::Transform,
        }
    }

    pub fn animation(bones: Vec<Bone>, property_names: Vec<String>) -> Self {
        Self {
            property_names,
            role: RoleStaticData::Animation { bones },
        }
    }

    pub fn camera(camera: CameraStatic, property_names: Vec<String>) -> Self {
        Self {
            property_names,
            role: RoleStaticData::Camera(camera),
        }
    }

    pub fn light(light: LightStatic, property_names: Vec<String>) -> Self {
        Self {
            property_names,
            role: RoleStaticData::Light(light),
        }
    }

    pub fn role(&self) -> Role {
        self.role.role()
    }

    pub fn bones(&self) -> &[Bone] {
        self.role.bones()
    }

    /// Transforms a frame of this subject must carry.
    pub fn transform_count(&self) -> usize {
        self.role().transform_count(self.bones().len())
    }

    pub fn property_count(&self) -> usize {
        self.property_names.len()
    }

    /// Check names and the bone hierarchy.
    ///
    /// Bone parents must point at an earlier bone, or be `-1` for a root.
    pub fn validate(&self) -> Result<(), CodecError> {
        check_unique_names("property", self.property_names.iter().map(String::as_str))?;

        match &self.role {
            RoleStaticData::Animation { bones } => {
                if bones.is_empty() {
                    return Err(CodecError::Format(
                        "animation subject needs at least one bone".into(),
                    ));
                }
                check_unique_names("bone", bones.iter().map(|b| b.name.as_str()))?;
                for (index, bone) in bones.iter().enumerate() {
                    let parent = bone.parent_index;
                    if parent != -1 && (parent < 0 || parent as usize >= index) {
                        return Err(CodecError::Format(format!(
                            "bone '{}' (index {}) has invalid parent index {}",
                            bone.name, index, parent
                        )));
                    }
                }
            }
            RoleStaticData::Camera(camera) => {
                if !camera.film_back_width.is_finite() || !camera.film_back_height.is_finite() {
                    return Err(CodecError::InvalidValue("camera film back".into()));
                }
            }
            RoleStaticData::Basic | RoleStaticData::Transform | RoleStaticData::Light(_) => {}
        }

        Ok(())
    }

    pub fn to_static_data(&self) -> SubjectStaticData {
        SubjectStaticData {
            property_names: self.property_names.clone(),
            role: self.role.clone(),
        }
    }
}

fn check_unique_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), CodecError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(CodecError::Format(format!("empty {kind} name")));
        }
        if !seen.insert(name) {
            return Err(CodecError::Format(format!("duplicate {kind} name '{name}'")));
        }
    }
    Ok(())
}
