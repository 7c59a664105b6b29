// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message envelope: a topic identity plus a type-erased payload.

use crate::api::{Topic, TopicId, TopicValue};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shareable payload.
///
/// The concrete type always matches the topic's declared type: messages can
/// only be built from a [`Topic<T>`] and a `T`, and wire transports decode with
/// the topic's own codec.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A payload addressed to one topic.
#[derive(Clone)]
pub struct Message {
    topic: TopicId,
    payload: Payload,
}

impl Message {
    pub fn new<T: TopicValue>(topic: &Topic<T>, content: T) -> Self {
        Self {
            topic: topic.id(),
            payload: Arc::new(content),
        }
    }

    /// Build from an already-erased payload (codec output).
    pub(crate) fn from_parts(topic: TopicId, payload: Payload) -> Self {
        Self { topic, payload }
    }

    #[inline]
    pub fn topic_id(&self) -> TopicId {
        self.topic
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Borrow the content as `T`, `None` if the payload is another type.
    pub fn content<T: Any>(&self) -> Option<&T> {
        (*self.payload).downcast_ref::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
