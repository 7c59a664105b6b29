// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bound variables ("inputs") kept in sync with a topic's latest value.

use crate::api::{Topic, TopicId, TopicValue};
use crate::engine::fanout::{Registration, TopicFanout};
use crate::message::Payload;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;

/// Consumer-owned cell mirroring the latest value routed on its topic.
///
/// Clones share the same cell. The router only holds a registration clone,
/// so dropping every consumer handle after [`BindingManager::remove_input`]
/// releases the cell.
pub struct Input<T> {
    cell: Arc<ArcSwapOption<T>>,
}

impl<T> Input<T> {
    /// Detached cell, not yet registered with any messager.
    pub fn new(initial: Option<T>) -> Self {
        Self {
            cell: Arc::new(ArcSwapOption::new(initial.map(Arc::new))),
        }
    }

    /// Latest value, `None` when empty.
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.load_full()
    }

    /// Overwrite the value locally (does not publish anything).
    pub fn set(&self, value: T) {
        self.cell.store(Some(Arc::new(value)));
    }

    /// Take the current value, leaving the cell empty.
    pub fn take(&self) -> Option<Arc<T>> {
        self.cell.swap(None)
    }

    fn store_shared(&self, value: Arc<T>) {
        self.cell.store(Some(value));
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.cell) as *const () as usize
    }
}

impl<T: Clone> Input<T> {
    /// Latest value cloned out of the cell.
    pub fn value(&self) -> Option<T> {
        self.cell.load().as_deref().cloned()
    }
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Input").field(&self.cell.load_full()).finish()
    }
}

pub(crate) trait BoundSlot: Registration {
    /// Store the payload; `false` if it is not this slot's type.
    fn store(&self, payload: &Payload) -> bool;
}

struct TypedSlot<T> {
    input: Input<T>,
}

impl<T: Send + Sync + 'static> Registration for TypedSlot<T> {
    fn key(&self) -> usize {
        self.input.key()
    }
}

impl<T: Send + Sync + 'static> BoundSlot for TypedSlot<T> {
    #[inline]
    fn store(&self, payload: &Payload) -> bool {
        match Arc::clone(payload).downcast::<T>() {
            Ok(value) => {
                self.input.store_shared(value);
                true
            }
            Err(_) => false,
        }
    }
}

/// Topic -> bound variables.
pub struct BindingManager {
    inputs: TopicFanout<dyn BoundSlot>,
}

impl BindingManager {
    pub fn new() -> Self {
        Self {
            inputs: TopicFanout::new(),
        }
    }

    /// Allocate a cell seeded with `initial` and register it under `topic`.
    pub fn create_input<T: TopicValue>(&self, topic: &Topic<T>, initial: T) -> Input<T> {
        let input = Input::new(Some(initial));
        self.attach_input(topic, &input);
        input
    }

    /// Allocate an empty cell and register it under `topic`.
    pub fn create_input_default<T: TopicValue>(&self, topic: &Topic<T>) -> Input<T> {
        let input = Input::new(None);
        self.attach_input(topic, &input);
        input
    }

    /// Register a caller-owned cell; `false` if it was already registered.
    pub fn attach_input<T: TopicValue>(&self, topic: &Topic<T>, input: &Input<T>) -> bool {
        let slot = Arc::new(TypedSlot {
            input: input.clone(),
        });
        let attached = self.inputs.insert(topic.id(), slot);
        if !attached {
            log::debug!("[binding] input already attached to '{}'", topic.name());
        }
        attached
    }

    /// Deregister a cell; `true` only if registration changed.
    pub fn remove_input<T: TopicValue>(&self, topic: &Topic<T>, input: &Input<T>) -> bool {
        self.inputs.remove(topic.id(), input.key())
    }

    pub fn input_count(&self, topic: TopicId) -> usize {
        self.inputs.len(topic)
    }

    /// Overwrite every cell bound to `topic`. Returns the number updated.
    pub(crate) fn update(&self, topic: TopicId, payload: &Payload) -> usize {
        let Some(inputs) = self.inputs.snapshot(topic) else {
            return 0;
        };

        let mut updated = 0;
        for input in inputs.iter() {
            if input.store(payload) {
                updated += 1;
            } else {
                log::debug!("[binding] payload type mismatch on topic {}", topic);
            }
        }
        updated
    }
}

impl Default for BindingManager {
    fn default() -> Self {
        Self::new()
    }
}
