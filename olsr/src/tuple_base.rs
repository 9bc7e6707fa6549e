use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::timeout::{Time, TimeoutList};

/// Stable reference to a tuple in a [`TupleBase`].
///
/// Removing a tuple bumps the generation of its slot, so a handle that outlives its tuple reads as absent
/// instead of aliasing whatever tuple reuses the slot.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Handle<V> {
    index: u32,
    generation: u32,
    #[serde(skip)]
    tuple: PhantomData<fn() -> V>,
}

impl<V> Handle<V> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            tuple: PhantomData,
        }
    }
}

// region Handle traits

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Handle<V> {}

impl<V> PartialEq for Handle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<V> Eq for Handle<V> {}

impl<V> PartialOrd for Handle<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for Handle<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<V> Hash for Handle<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<V> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

// endregion

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Slot<V> {
    generation: u32,
    tuple: Option<V>,
}

/// Generic information base: an arena of tuples plus the base's own timeout list.
///
/// Tuples inserted without an expiry are permanent until removed.
#[derive(Clone, Debug, Serialize, Deserialize, Educe)]
#[educe(Default(bound()))]
pub struct TupleBase<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    len: usize,
    timeouts: TimeoutList<Handle<V>>,
}

impl<V> TupleBase<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            timeouts: TimeoutList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, tuple: V, expiry: Option<Time>) -> Handle<V> {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].tuple = Some(tuple);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    tuple: Some(tuple),
                });
                (self.slots.len() - 1) as u32
            }
        };
        let handle = Handle::new(index, self.slots[index as usize].generation);
        self.len += 1;
        if let Some(at) = expiry {
            self.timeouts.schedule(handle, at);
        }
        handle
    }

    pub fn contains(&self, handle: Handle<V>) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle<V>) -> Option<&V> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.tuple.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<V>) -> Option<&mut V> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.tuple.as_mut())
    }

    /// Removes the tuple and its timeout entry
    pub fn remove(&mut self, handle: Handle<V>) -> Option<V> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let tuple = slot.tuple.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        self.timeouts.cancel(handle);
        Some(tuple)
    }

    pub fn expiry(&self, handle: Handle<V>) -> Option<Time> {
        self.timeouts.deadline(handle)
    }

    /// Schedules or reschedules the expiry of a live tuple
    pub fn set_expiry(&mut self, handle: Handle<V>, at: Time) {
        if self.contains(handle) {
            self.timeouts.reschedule(handle, at);
        }
    }

    /// Makes the tuple permanent
    pub fn clear_expiry(&mut self, handle: Handle<V>) {
        self.timeouts.cancel(handle);
    }

    pub fn next_expiry(&self) -> Option<Time> {
        self.timeouts.next_deadline()
    }

    /// Unlinks and returns the earliest expired tuple.
    ///
    /// Callers loop on this and run their expiry callback between calls, so the callback may freely mutate this
    /// or any other base.
    pub fn pop_expired(&mut self, now: Time) -> Option<(Handle<V>, V)> {
        while let Some((_, handle)) = self.timeouts.pop_expired(now) {
            if let Some(tuple) = self.remove(handle) {
                return Some((handle, tuple));
            }
        }
        None
    }

    /// Whether every pending timeout lies strictly after `now`
    pub fn timeouts_after(&self, now: Time) -> bool {
        self.timeouts.iter().all(|(at, _)| *at > now)
    }

    /// Number of tuples that have a pending timeout
    pub fn timed_len(&self) -> usize {
        self.timeouts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<V>, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.tuple
                .as_ref()
                .map(|tuple| (Handle::new(index as u32, slot.generation), tuple))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<V>, &mut V)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.tuple
                .as_mut()
                .map(|tuple| (Handle::new(index as u32, generation), tuple))
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.slots.iter().filter_map(|slot| slot.tuple.as_ref())
    }

    /// Snapshot of the live handles, for loops that mutate the base
    pub fn handles(&self) -> Vec<Handle<V>> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn find(&self, mut pred: impl FnMut(&V) -> bool) -> Option<Handle<V>> {
        self.iter().find(|(_, tuple)| pred(tuple)).map(|(handle, _)| handle)
    }

    /// Removes every tuple rejected by `keep`, returning them
    pub fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) -> Vec<V> {
        let doomed: Vec<Handle<V>> = self
            .iter()
            .filter(|(_, tuple)| !keep(tuple))
            .map(|(handle, _)| handle)
            .collect();
        doomed.into_iter().filter_map(|handle| self.remove(handle)).collect()
    }

    pub fn clear(&mut self) -> Vec<V> {
        self.retain(|_| false)
    }
}
