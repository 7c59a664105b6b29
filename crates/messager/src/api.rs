// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic registry ("messager API").
//!
//! A [`MessagerApi`] is the closed set of topics two endpoints agree on. Each
//! topic has a numeric [`TopicId`], a name, the Rust type of its payload and a
//! JSON codec used by wire transports.
//!
//! # Example
//!
//! ```
//! use messager::api::MessagerApi;
//!
//! let mut builder = MessagerApi::builder("Robot");
//! let speed = builder.topic::<f64>("Speed").expect("unique topic");
//! let api = builder.build();
//!
//! assert!(api.contains_topic(speed.id()));
//! assert_eq!(api.find_topic(speed.id()).map(|t| t.name()), Some("Speed"));
//! ```
//!
//! A topic ID is the FNV-1a hash of `"<api>/<topic>"`, so it is stable across
//! processes and declaration order, and a handle from another API never
//! resolves here.

use crate::error::{Error, Result};
use crate::message::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Bounds every topic payload type satisfies.
///
/// Payloads cross threads (dispatch happens on transport threads) and may
/// cross the wire (serde).
pub trait TopicValue: Any + Send + Sync + Serialize + DeserializeOwned {}

impl<T> TopicValue for T where T: Any + Send + Sync + Serialize + DeserializeOwned {}

/// Opaque numeric topic identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicId(pub u32);

impl TopicId {
    /// Identity of `topic` inside the API named `api`.
    pub fn derive(api: &str, topic: &str) -> Self {
        let mut hash: u32 = 2_166_136_261;
        for byte in api.bytes().chain(std::iter::once(b'/')).chain(topic.bytes()) {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(16_777_619);
        }
        Self(hash)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle on a topic declared in a [`MessagerApi`].
///
/// The type parameter ties the payload type to the topic at compile time:
/// messages, inputs and listeners can only be created with a matching `T`.
pub struct Topic<T> {
    id: TopicId,
    name: Arc<str>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            _payload: PhantomData,
        }
    }
}

impl<T> PartialEq for Topic<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Topic<T> {}

impl<T> Hash for Topic<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

type EncodeFn = fn(&Payload) -> Result<Vec<u8>>;
type DecodeFn = fn(&[u8]) -> Result<Payload>;

/// Registry entry for one topic.
#[derive(Clone)]
pub struct TopicDescriptor {
    id: TopicId,
    name: Arc<str>,
    type_name: &'static str,
    type_id: TypeId,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl TopicDescriptor {
    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the payload (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Serialize a payload of this topic for the wire.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        (self.encode)(payload)
    }

    /// Deserialize wire bytes into a payload of this topic's type.
    pub fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        (self.decode)(bytes)
    }

    fn holds<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Whether `payload` has this topic's declared type.
    pub fn accepts(&self, payload: &Payload) -> bool {
        (**payload).type_id() == self.type_id
    }
}

impl fmt::Debug for TopicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn encode_json<T: TopicValue>(payload: &Payload) -> Result<Vec<u8>> {
    let value = (**payload).downcast_ref::<T>().ok_or_else(|| {
        Error::Codec(format!(
            "payload is not a {}",
            std::any::type_name::<T>()
        ))
    })?;
    serde_json::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
}

fn decode_json<T: TopicValue>(bytes: &[u8]) -> Result<Payload> {
    let value: T = serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(Arc::new(value))
}

/// Immutable set of topics shared by both endpoints.
#[derive(Debug, Clone)]
pub struct MessagerApi {
    name: String,
    topics: Vec<TopicDescriptor>,
    by_id: HashMap<TopicId, usize>,
    by_name: HashMap<Arc<str>, usize>,
}

impl MessagerApi {
    /// Start declaring a new API.
    pub fn builder(name: impl Into<String>) -> ApiBuilder {
        ApiBuilder {
            api: MessagerApi {
                name: name.into(),
                topics: Vec::new(),
                by_id: HashMap::new(),
                by_name: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn contains_topic(&self, id: TopicId) -> bool {
        self.by_id.contains_key(&id)
    }

    #[inline]
    pub fn find_topic(&self, id: TopicId) -> Option<&TopicDescriptor> {
        self.by_id.get(&id).map(|&index| &self.topics[index])
    }

    pub fn topic_by_name(&self, name: &str) -> Option<&TopicDescriptor> {
        self.by_name.get(name).map(|&index| &self.topics[index])
    }

    /// Recover a typed handle by name; `None` if absent or declared with another type.
    pub fn topic<T: TopicValue>(&self, name: &str) -> Option<Topic<T>> {
        let descriptor = self.topic_by_name(name)?;
        if !descriptor.holds::<T>() {
            return None;
        }
        Some(Topic {
            id: descriptor.id,
            name: Arc::clone(&descriptor.name),
            _payload: PhantomData,
        })
    }

    /// Descriptors in declaration order.
    pub fn topics(&self) -> impl Iterator<Item = &TopicDescriptor> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Builder for [`MessagerApi`].
#[derive(Debug)]
pub struct ApiBuilder {
    api: MessagerApi,
}

impl ApiBuilder {
    /// Declare a topic carrying payloads of type `T`.
    ///
    /// Fails with [`Error::InvalidState`] if the name is already declared or
    /// its ID collides with an earlier topic.
    pub fn topic<T: TopicValue>(&mut self, name: &str) -> Result<Topic<T>> {
        if self.api.by_name.contains_key(name) {
            return Err(Error::InvalidState(format!(
                "topic '{}' declared twice in API '{}'",
                name, self.api.name
            )));
        }

        let id = TopicId::derive(&self.api.name, name);
        if let Some(&index) = self.api.by_id.get(&id) {
            return Err(Error::InvalidState(format!(
                "topic '{}' collides with '{}' ({}) in API '{}'",
                name, self.api.topics[index].name, id, self.api.name
            )));
        }
        let name: Arc<str> = Arc::from(name);
        let index = self.api.topics.len();

        self.api.topics.push(TopicDescriptor {
            id,
            name: Arc::clone(&name),
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            encode: encode_json::<T>,
            decode: decode_json::<T>,
        });
        self.api.by_id.insert(id, index);
        self.api.by_name.insert(Arc::clone(&name), index);

        Ok(Topic {
            id,
            name,
            _payload: PhantomData,
        })
    }

    pub fn build(self) -> MessagerApi {
        self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pose {
        x: f64,
        y: f64,
    }

    #[test]
    fn test_ids_derive_from_api_and_topic_name() {
        let mut builder = MessagerApi::builder("Robot");
        let speed = builder.topic::<f64>("Speed").expect("speed");
        let pose = builder.topic::<Pose>("Pose").expect("pose");
        let api = builder.build();

        assert_eq!(speed.id(), TopicId::derive("Robot", "Speed"));
        assert_eq!(pose.id(), TopicId::derive("Robot", "Pose"));
        assert_ne!(speed.id(), TopicId::derive("Other", "Speed"));
        assert_eq!(api.len(), 2);
        assert!(api.contains_topic(pose.id()));
        assert!(!api.contains_topic(TopicId::derive("Robot", "Heading")));
        assert!(api.find_topic(TopicId(0)).is_none());

        let names: Vec<_> = api.topics().map(|topic| topic.name()).collect();
        assert_eq!(names, ["Speed", "Pose"]);
    }

    #[test]
    fn test_ids_do_not_depend_on_declaration_order() {
        let mut first = MessagerApi::builder("Robot");
        let speed_a = first.topic::<f64>("Speed").expect("speed");
        first.topic::<Pose>("Pose").expect("pose");

        let mut second = MessagerApi::builder("Robot");
        second.topic::<Pose>("Pose").expect("pose");
        let speed_b = second.topic::<f64>("Speed").expect("speed");

        assert_eq!(speed_a.id(), speed_b.id());
    }

    #[test]
    fn test_descriptor_accepts_only_declared_type() {
        let mut builder = MessagerApi::builder("Robot");
        let speed = builder.topic::<f64>("Speed").expect("speed");
        let api = builder.build();
        let descriptor = api.find_topic(speed.id()).expect("descriptor");

        let good: Payload = Arc::new(2.0_f64);
        let bad: Payload = Arc::new("2.0".to_string());
        assert!(descriptor.accepts(&good));
        assert!(!descriptor.accepts(&bad));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = MessagerApi::builder("Robot");
        builder.topic::<f64>("Speed").expect("first declaration");
        let err = builder.topic::<i32>("Speed").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_typed_lookup_checks_payload_type() {
        let mut builder = MessagerApi::builder("Robot");
        builder.topic::<f64>("Speed").expect("speed");
        let api = builder.build();

        assert!(api.topic::<f64>("Speed").is_some());
        assert!(api.topic::<String>("Speed").is_none());
        assert!(api.topic::<f64>("Missing").is_none());
    }

    #[test]
    fn test_codec_roundtrip_through_descriptor() {
        let mut builder = MessagerApi::builder("Robot");
        let pose = builder.topic::<Pose>("Pose").expect("pose");
        let api = builder.build();
        let descriptor = api.find_topic(pose.id()).expect("descriptor");

        let payload: Payload = Arc::new(Pose { x: 1.5, y: -2.0 });
        let bytes = descriptor.encode(&payload).expect("encode");
        let decoded = descriptor.decode(&bytes).expect("decode");

        assert_eq!(
            decoded.downcast_ref::<Pose>(),
            Some(&Pose { x: 1.5, y: -2.0 })
        );
        assert!(descriptor.type_name().ends_with("Pose"));
    }

    #[test]
    fn test_codec_rejects_foreign_payload() {
        let mut builder = MessagerApi::builder("Robot");
        let speed = builder.topic::<f64>("Speed").expect("speed");
        let api = builder.build();
        let descriptor = api.find_topic(speed.id()).expect("descriptor");

        let wrong: Payload = Arc::new("fast".to_string());
        assert!(matches!(descriptor.encode(&wrong), Err(Error::Codec(_))));
        assert!(matches!(descriptor.decode(b"not json"), Err(Error::Codec(_))));
    }
}
