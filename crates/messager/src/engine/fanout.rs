// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic-indexed copy-on-write registration lists.
//!
//! Shared storage behind the binding and listener managers:
//! - `DashMap` shards the topic index, so there is no router-wide lock;
//! - each topic holds an `ArcSwap<Vec<_>>`, so dispatch iterates an immutable
//!   snapshot while registrations swap in a new list.
//!
//! An entry added while a dispatch is iterating may or may not see that message.

use crate::api::TopicId;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

/// Identity of a registered entry (stable for as long as it is registered).
pub(crate) trait Registration: Send + Sync {
    fn key(&self) -> usize;
}

type Slot<E> = Arc<ArcSwap<Vec<Arc<E>>>>;

pub(crate) struct TopicFanout<E: ?Sized> {
    slots: DashMap<TopicId, Slot<E>>,
}

impl<E: ?Sized + Registration> TopicFanout<E> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, topic: TopicId) -> Slot<E> {
        let entry = self
            .slots
            .entry(topic)
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(Vec::new())));
        Arc::clone(entry.value())
    }

    /// Append `entry` to `topic`'s list; `false` if the same key is already there.
    pub(crate) fn insert(&self, topic: TopicId, entry: Arc<E>) -> bool {
        let slot = self.slot(topic);
        let key = entry.key();
        let mut inserted = false;

        slot.rcu(|current| {
            if current.iter().any(|existing| existing.key() == key) {
                inserted = false;
                return Arc::clone(current);
            }
            inserted = true;
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&entry));
            Arc::new(next)
        });

        inserted
    }

    /// Remove the entry with `key` from `topic`'s list; `true` if it was present.
    pub(crate) fn remove(&self, topic: TopicId, key: usize) -> bool {
        let slot = match self.slots.get(&topic) {
            Some(slot) => Arc::clone(slot.value()),
            None => return false,
        };
        let mut removed = false;

        slot.rcu(|current| {
            if !current.iter().any(|existing| existing.key() == key) {
                removed = false;
                return Arc::clone(current);
            }
            removed = true;
            let next: Vec<Arc<E>> = current
                .iter()
                .filter(|existing| existing.key() != key)
                .cloned()
                .collect();
            Arc::new(next)
        });

        removed
    }

    /// Immutable view of `topic`'s list, in registration order.
    #[inline]
    pub(crate) fn snapshot(&self, topic: TopicId) -> Option<Arc<Vec<Arc<E>>>> {
        let slot = self.slots.get(&topic).map(|slot| Arc::clone(slot.value()))?;
        Some(slot.load_full())
    }

    pub(crate) fn len(&self, topic: TopicId) -> usize {
        self.snapshot(topic).map_or(0, |list| list.len())
    }
}
