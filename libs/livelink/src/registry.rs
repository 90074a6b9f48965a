// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Subjects owned by one provider.

use std::collections::HashMap;

use crate::codec;
use crate::error::{LiveLinkError, Result};
use crate::schema::SubjectSchema;

/// Provider-scoped subject identifier. Never reused, so an id that was
/// unregistered or replaced stays invalid for the provider's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(u32);

impl SubjectId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredSubject {
    pub id: SubjectId,
    pub name: String,
    pub schema: SubjectSchema,
    /// `world_time` of the last accepted frame.
    pub last_world_time: Option<f64>,
    /// Largest wire size of a frame without string metadata.
    pub frame_bound: usize,
}

/// What a registration did, so the session knows what to tell the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New subject.
    Added(SubjectId),
    /// Same name and schema were already registered.
    Unchanged(SubjectId),
    /// Schema replaced; `old` is now invalid.
    Replaced { old: SubjectId, new: SubjectId },
}

impl Registration {
    pub fn id(&self) -> SubjectId {
        match *self {
            Registration::Added(id) | Registration::Unchanged(id) => id,
            Registration::Replaced { new, .. } => new,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubjectRegistry {
    subjects: HashMap<SubjectId, RegisteredSubject>,
    by_name: HashMap<String, SubjectId>,
    next_id: u32,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with `schema`.
    ///
    /// Registering an identical schema again is a no-op returning the
    /// existing id; a different schema is a `DuplicateName` error.
    pub fn register(&mut self, name: &str, schema: SubjectSchema) -> Result<Registration> {
        if name.is_empty() {
            return Err(LiveLinkError::InvalidArgument("empty subject name".into()));
        }
        schema.validate()?;

        if let Some(&existing) = self.by_name.get(name) {
            let current = &self.subjects[&existing];
            if current.schema == schema {
                return Ok(Registration::Unchanged(existing));
            }
            return Err(LiveLinkError::DuplicateName(format!(
                "subject '{name}' is registered with a different schema"
            )));
        }

        let frame_bound = codec::frame_size_bound(name, &schema)?;
        let id = self.allocate_id()?;
        self.insert(id, name, schema, frame_bound);
        Ok(Registration::Added(id))
    }

    /// Replace the schema of a registered subject. The old id is
    /// invalidated and a fresh one returned, even when the schema is equal,
    /// so the engine always sees a remove followed by an add.
    pub fn update_schema(&mut self, name: &str, schema: SubjectSchema) -> Result<Registration> {
        schema.validate()?;
        let old = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| LiveLinkError::NotFound(format!("subject '{name}'")))?;
        let frame_bound = codec::frame_size_bound(name, &schema)?;

        let new = self.allocate_id()?;
        self.subjects.remove(&old);
        self.insert(new, name, schema, frame_bound);
        Ok(Registration::Replaced { old, new })
    }

    pub fn unregister(&mut self, id: SubjectId) -> Result<RegisteredSubject> {
        let subject = self
            .subjects
            .remove(&id)
            .ok_or(LiveLinkError::UnknownSubject(id.raw()))?;
        self.by_name.remove(&subject.name);
        Ok(subject)
    }

    pub fn lookup(&self, name: &str) -> Result<SubjectId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| LiveLinkError::NotFound(format!("subject '{name}'")))
    }

    pub fn get(&self, id: SubjectId) -> Result<&RegisteredSubject> {
        self.subjects
            .get(&id)
            .ok_or(LiveLinkError::UnknownSubject(id.raw()))
    }

    pub fn get_mut(&mut self, id: SubjectId) -> Result<&mut RegisteredSubject> {
        self.subjects
            .get_mut(&id)
            .ok_or(LiveLinkError::UnknownSubject(id.raw()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSubject> {
        self.subjects.values()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Remove every subject, returning them.
    pub fn clear(&mut self) -> Vec<RegisteredSubject> {
        self.by_name.clear();
        self.subjects.drain().map(|(_, s)| s).collect()
    }

    fn allocate_id(&mut self) -> Result<SubjectId> {
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| LiveLinkError::OutOfResources("subject ids exhausted".into()))?;
        Ok(SubjectId(id))
    }

    fn insert(&mut self, id: SubjectId, name: &str, schema: SubjectSchema, frame_bound: usize) {
        self.by_name.insert(name.to_string(), id);
        self.subjects.insert(
            id,
            RegisteredSubject {
                id,
                name: name.to_string(),
                schema,
                last_world_time: None,
                frame_bound,
            },
        );
    }
}
