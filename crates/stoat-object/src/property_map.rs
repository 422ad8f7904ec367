//! Per-object property storage.
//!
//! Two interchangeable backings: a small insertion-ordered vector for the
//! common handful-of-properties case, promoted to an insertion-ordered
//! hash map once the object grows past a fixed threshold.

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::slot::Slot;
use crate::value::PropertyKey;

/// Promotion threshold from the vector backing to the hash backing.
const SMALL_LIMIT: usize = 8;

/// Mapping key → slot with enumeration-order bookkeeping.
#[derive(Debug)]
pub enum PropertyMap {
    /// Linear scan over a few slots, in insertion order.
    Small(SmallVec<[Slot; 4]>),
    /// Insertion-ordered hash map for larger objects.
    Large(IndexMap<PropertyKey, Slot, FxBuildHasher>),
}

impl PropertyMap {
    /// An empty map (small backing).
    pub fn new() -> Self {
        Self::Small(SmallVec::new())
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        match self {
            Self::Small(slots) => slots.len(),
            Self::Large(map) => map.len(),
        }
    }

    /// True when no slots exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a slot.
    pub fn get(&self, key: &PropertyKey) -> Option<&Slot> {
        match self {
            Self::Small(slots) => slots.iter().find(|s| &s.key == key),
            Self::Large(map) => map.get(key),
        }
    }

    /// Look up a slot mutably.
    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut Slot> {
        match self {
            Self::Small(slots) => slots.iter_mut().find(|s| &s.key == key),
            Self::Large(map) => map.get_mut(key),
        }
    }

    /// Insert or replace a slot, keeping first-insertion order and
    /// promoting the backing at the threshold.
    pub fn insert(&mut self, slot: Slot) {
        if let Self::Small(slots) = self {
            if let Some(existing) = slots.iter_mut().find(|s| s.key == slot.key) {
                *existing = slot;
                return;
            }
            if slots.len() < SMALL_LIMIT {
                slots.push(slot);
                return;
            }
            self.promote();
        }
        match self {
            Self::Large(map) => {
                map.insert(slot.key.clone(), slot);
            }
            Self::Small(_) => unreachable!("promoted above"),
        }
    }

    /// Remove a slot, preserving the order of the remainder.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<Slot> {
        match self {
            Self::Small(slots) => {
                let at = slots.iter().position(|s| &s.key == key)?;
                Some(slots.remove(at))
            }
            Self::Large(map) => map.shift_remove(key),
        }
    }

    fn promote(&mut self) {
        if let Self::Small(slots) = self {
            let mut map = IndexMap::with_capacity_and_hasher(slots.len() + 1, FxBuildHasher);
            for slot in slots.drain(..) {
                map.insert(slot.key.clone(), slot);
            }
            *self = Self::Large(map);
        }
    }

    /// Iterate slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        let (small, large) = match self {
            Self::Small(slots) => (Some(slots.iter()), None),
            Self::Large(map) => (None, Some(map.values())),
        };
        small
            .into_iter()
            .flatten()
            .chain(large.into_iter().flatten())
    }

    /// Keys in language enumeration order: integer indices ascending, then
    /// string keys in insertion order. Symbols are excluded; DONTENUM
    /// slots are excluded unless `include_hidden`.
    pub fn ordered_keys(&self, include_hidden: bool) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut strings: Vec<PropertyKey> = Vec::new();
        for slot in self.iter() {
            if !include_hidden && slot.is_dont_enum() {
                continue;
            }
            match &slot.key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(slot.key.clone()),
                PropertyKey::Symbol(_) => {}
            }
        }
        indices.sort_unstable();
        let mut keys: Vec<PropertyKey> =
            indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(strings);
        keys
    }

    /// All keys including symbols: enumeration order, then symbols in
    /// insertion order.
    pub fn all_keys(&self) -> Vec<PropertyKey> {
        let mut keys = self.ordered_keys(true);
        keys.extend(
            self.iter()
                .filter(|s| matches!(s.key, PropertyKey::Symbol(_)))
                .map(|s| s.key.clone()),
        );
        keys
    }
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self::new()
    }
}
