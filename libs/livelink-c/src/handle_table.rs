// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Generation-tagged handle table.
//!
//! Handles are `u64`: the low 32 bits hold `slot index + 1`, the high 32
//! bits the slot's generation. Removing an entry bumps the generation, so
//! a handle that outlived its entry never resolves again, even after the
//! slot is reused. `0` is never a valid handle.

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFull {
    pub capacity: usize,
}

#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> HandleTable<T> {
    /// `capacity` is clamped so every index fits the handle encoding.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity: capacity.min(u32::MAX as usize - 1),
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, value: T) -> Result<u64, TableFull> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.capacity {
                    return Err(TableFull {
                        capacity: self.capacity,
                    });
                }
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;
        Ok(encode(index, slot.generation))
    }

    pub fn get(&self, handle: u64) -> Option<&T> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn remove(&mut self, handle: u64) -> Option<T> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        Some(value)
    }
}

fn encode(index: u32, generation: u32) -> u64 {
    ((generation as u64) << 32) | (index as u64 + 1)
}

fn decode(handle: u64) -> Option<(u32, u32)> {
    let low = (handle & 0xFFFF_FFFF) as u32;
    let index = low.checked_sub(1)?;
    Some((index, (handle >> 32) as u32))
}
