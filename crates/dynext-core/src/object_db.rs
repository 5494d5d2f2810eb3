//! Generational directory of live objects.

use std::fmt;

use crate::ids::InstanceId;
use crate::object::Object;

/// Raw object reference, the pointer-call representation of an object slot.
///
/// Unlike [`InstanceId`] it is never null; the null object is `None` in an
/// `Option<ObjectHandle>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into ObjectDb.slots
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl ObjectHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn instance_id(self) -> InstanceId {
        InstanceId::from_parts(self.index, self.generation)
    }
}

impl From<InstanceId> for ObjectHandle {
    fn from(id: InstanceId) -> Self {
        Self::new(id.index(), id.generation())
    }
}

/// Storage for every live object, addressed by [`InstanceId`].
///
/// Freed slots are reused with a bumped generation, so ids of freed objects
/// stop resolving instead of aliasing the new occupant.
#[derive(Default)]
pub struct ObjectDb {
    slots: Vec<ObjectSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct ObjectSlot {
    generation: u32,
    object: Option<Object>,
}

impl ObjectDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its identity.
    pub fn insert(&mut self, object: Object) -> InstanceId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            InstanceId::from_parts(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(ObjectSlot {
                generation: 1,
                object: Some(object),
            });
            InstanceId::from_parts(index, 1)
        }
    }

    /// Returns None if the id is null or stale.
    pub fn get(&self, id: InstanceId) -> Option<&Object> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Object> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.object.as_mut()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    /// Remove an object, invalidating its id.
    pub fn remove(&mut self, id: InstanceId) -> Option<Object> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free_list.push(id.index());
        self.live -= 1;
        Some(object)
    }

    /// Resolve a raw handle to the identity of the object it names.
    pub fn resolve(&self, handle: ObjectHandle) -> Option<InstanceId> {
        let id = handle.instance_id();
        self.contains(id).then_some(id)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Ids of all live objects, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object
                .as_ref()
                .map(|_| InstanceId::from_parts(index as u32, slot.generation))
        })
    }
}

impl fmt::Debug for ObjectDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDb")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free_list.len())
            .finish()
    }
}
