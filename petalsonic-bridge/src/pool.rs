//! Fixed-capacity generational pools.
//!
//! Every bridge entity (object, listener, trigger, event instance, ...) lives in a pool
//! that is sized once when the world is created and never grows afterwards. Handles
//! handed out to the engine are typed keys carrying a slot index and a generation, so
//! a key that outlived its entity is detected instead of aliasing a newer one.

use crate::error::{BridgeError, Result};
use std::marker::PhantomData;
use std::num::NonZeroU32;

/// Trait for keys of a [`Pool`].
pub trait PoolKey: Copy {
    #[doc(hidden)]
    fn new(index: u32, generation: NonZeroU32) -> Self;
    #[doc(hidden)]
    fn index(&self) -> u32;
    #[doc(hidden)]
    fn generation(&self) -> NonZeroU32;
}

/// Creates a typed key for a [`Pool`].
macro_rules! create_pool_key {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
        pub struct $name {
            index: u32,
            generation: std::num::NonZeroU32,
        }

        impl $crate::pool::PoolKey for $name {
            fn new(index: u32, generation: std::num::NonZeroU32) -> Self {
                Self { index, generation }
            }

            fn index(&self) -> u32 {
                self.index
            }

            fn generation(&self) -> std::num::NonZeroU32 {
                self.generation
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}({}v{})",
                    stringify!($name),
                    self.index,
                    self.generation
                )
            }
        }
    };
}

create_pool_key!(ObjectKey, "Handle of an emitter object.");
create_pool_key!(ListenerKey, "Handle of a listener.");
create_pool_key!(TriggerKey, "Handle of a trigger (event definition).");
create_pool_key!(EventInstanceKey, "Handle of one in-flight trigger execution.");
create_pool_key!(ParameterKey, "Handle of a parameter connection.");
create_pool_key!(SwitchStateKey, "Handle of a switch state connection.");
create_pool_key!(EnvironmentKey, "Handle of an environment connection.");
create_pool_key!(FileKey, "Handle of a registered file (sound bank).");

enum Slot<T> {
    Occupied {
        value: T,
        generation: NonZeroU32,
    },
    Empty {
        next_free: Option<u32>,
        last_generation: NonZeroU32,
    },
}

/// Occupancy of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub constructed: usize,
    pub capacity: usize,
}

/// A pool of at most `capacity` values addressed by generational keys.
pub struct Pool<K, V> {
    name: &'static str,
    capacity: usize,
    entries: Vec<Slot<V>>,
    next_free: Option<u32>,
    len: usize,
    _marker: PhantomData<K>,
}

impl<K: PoolKey, V> Pool<K, V> {
    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: Vec::with_capacity(capacity),
            next_free: None,
            len: 0,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            constructed: self.len,
            capacity: self.capacity,
        }
    }

    /// Stores `value` and returns its key, or [`BridgeError::PoolExhausted`] if the pool
    /// is full.
    pub fn insert(&mut self, value: V) -> Result<K> {
        if self.len >= self.capacity {
            log::error!(
                "{} pool exhausted (capacity {})",
                self.name,
                self.capacity
            );
            return Err(BridgeError::PoolExhausted {
                pool: self.name,
                capacity: self.capacity,
            });
        }

        if let Some(index) = self.next_free
            && let Some(Slot::Empty {
                next_free,
                last_generation,
            }) = self.entries.get(index as usize)
        {
            self.next_free = *next_free;
            let generation = last_generation.checked_add(1).unwrap_or(NonZeroU32::MIN);
            self.entries[index as usize] = Slot::Occupied { value, generation };
            self.len += 1;
            return Ok(K::new(index, generation));
        }

        // Capacity never exceeds what fits in the index once validated by the world.
        let index = u32::try_from(self.entries.len()).map_err(|_| BridgeError::PoolExhausted {
            pool: self.name,
            capacity: self.capacity,
        })?;
        self.entries.push(Slot::Occupied {
            value,
            generation: NonZeroU32::MIN,
        });
        self.len += 1;
        Ok(K::new(index, NonZeroU32::MIN))
    }

    pub fn get(&self, key: K) -> Option<&V> {
        match self.entries.get(key.index() as usize) {
            Some(Slot::Occupied { value, generation }) if *generation == key.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        match self.entries.get_mut(key.index() as usize) {
            Some(Slot::Occupied { value, generation }) if *generation == key.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Removes the value behind `key`. Stale keys return `None`.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let entry = self.entries.get_mut(key.index() as usize)?;
        let generation = match entry {
            Slot::Occupied { generation, .. } if *generation == key.generation() => *generation,
            _ => return None,
        };

        let empty = Slot::Empty {
            next_free: self.next_free,
            last_generation: generation,
        };
        self.next_free = Some(key.index());
        self.len -= 1;

        match std::mem::replace(entry, empty) {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Empty { .. } => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { value, generation } => {
                    Some((K::new(index as u32, *generation), value))
                }
                Slot::Empty { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { value, generation } => {
                    Some((K::new(index as u32, *generation), value))
                }
                Slot::Empty { .. } => None,
            })
    }
}
