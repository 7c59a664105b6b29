// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message router: the single path every message takes, inbound or submitted.
//!
//! ```text
//! submit(msg) --validate--> [self-delivery] --connected?--> Transport::send
//!                                 |                  \--no--> SkippedClosed (warn)
//!                                 v
//! Transport --on_receive--> validate --> BindingManager.update
//!                                    \-> ListenerManager.dispatch
//! ```
//!
//! Validation failures ([`Error::UnknownTopic`]: an ID outside the API, or a
//! payload whose type differs from the topic's) abort the call before any
//! dispatch. Everything else degrades: skipped sends are counted and logged,
//! non-message inbound objects are counted and dropped.

use crate::api::{MessagerApi, TopicDescriptor, TopicId};
use crate::engine::binding::BindingManager;
use crate::engine::listener::ListenerManager;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::transport::{Inbound, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a successful [`MessageRouter::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Handed to the transport.
    Sent,
    /// Transport closed: network send dropped (local delivery still happened).
    SkippedClosed,
    /// Transport refused the send; logged and counted, not propagated.
    SendFailed,
}

/// Result of a successful [`MessageRouter::on_receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Delivered { inputs: usize, listeners: usize },
    /// Not a message (protocol traffic or undecodable payload); dropped silently.
    Discarded,
}

/// Router telemetry counters (relaxed atomics).
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub messages_submitted: AtomicU64,
    pub messages_dispatched: AtomicU64,
    pub sends_skipped: AtomicU64,
    pub send_failures: AtomicU64,
    pub objects_discarded: AtomicU64,
    pub listener_panics: AtomicU64,
}

/// Point-in-time copy of [`RouterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub messages_submitted: u64,
    pub messages_dispatched: u64,
    pub sends_skipped: u64,
    pub send_failures: u64,
    pub objects_discarded: u64,
    pub listener_panics: u64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            messages_submitted: self.messages_submitted.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            sends_skipped: self.sends_skipped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            objects_discarded: self.objects_discarded.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}

/// Validates messages against the API and fans them out to local consumers.
pub struct MessageRouter {
    api: Arc<MessagerApi>,
    transport: Arc<dyn Transport>,
    bindings: BindingManager,
    listeners: ListenerManager,
    allow_self_submit: AtomicBool,
    metrics: RouterMetrics,
}

impl MessageRouter {
    /// New router with self-delivery enabled.
    pub fn new(api: Arc<MessagerApi>, transport: Arc<dyn Transport>) -> Self {
        Self {
            api,
            transport,
            bindings: BindingManager::new(),
            listeners: ListenerManager::new(),
            allow_self_submit: AtomicBool::new(true),
            metrics: RouterMetrics::new(),
        }
    }

    pub fn api(&self) -> &Arc<MessagerApi> {
        &self.api
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn bindings(&self) -> &BindingManager {
        &self.bindings
    }

    pub fn listeners(&self) -> &ListenerManager {
        &self.listeners
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    pub fn allows_self_submit(&self) -> bool {
        self.allow_self_submit.load(Ordering::Acquire)
    }

    /// Toggle local echo of submitted messages.
    pub fn set_allow_self_submit(&self, allow: bool) {
        self.allow_self_submit.store(allow, Ordering::Release);
    }

    fn validate(&self, topic: TopicId) -> Result<&TopicDescriptor> {
        self.api.find_topic(topic).ok_or_else(|| {
            log::error!(
                "[router] topic {} is not part of API '{}'",
                topic,
                self.api.name()
            );
            Error::UnknownTopic { id: topic }
        })
    }

    fn validate_message(&self, message: &Message) -> Result<&TopicDescriptor> {
        let descriptor = self.validate(message.topic_id())?;
        if !descriptor.accepts(message.payload()) {
            log::error!(
                "[router] payload for topic '{}' is not a {}",
                descriptor.name(),
                descriptor.type_name()
            );
            return Err(Error::UnknownTopic {
                id: message.topic_id(),
            });
        }
        Ok(descriptor)
    }

    /// Submit a message: local delivery first (if enabled), then the network.
    ///
    /// Never fails because the transport is closed; only an unknown topic is an
    /// error.
    pub fn submit(&self, message: Message) -> Result<SubmitOutcome> {
        let descriptor = self.validate_message(&message)?;
        self.metrics.messages_submitted.fetch_add(1, Ordering::Relaxed);

        if self.allows_self_submit() {
            self.dispatch(descriptor, &message);
        }

        if !self.transport.is_connected() {
            self.metrics.sends_skipped.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[router] messager is closed, send skipped for topic '{}'",
                descriptor.name()
            );
            return Ok(SubmitOutcome::SkippedClosed);
        }

        log::debug!("[router] submit message for topic '{}'", descriptor.name());

        match self.transport.send(&message) {
            Ok(()) => Ok(SubmitOutcome::Sent),
            Err(e) => {
                self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[router] send failed for topic '{}': {}",
                    descriptor.name(),
                    e
                );
                Ok(SubmitOutcome::SendFailed)
            }
        }
    }

    /// Inbound entry point, called by the transport once per received object.
    pub fn on_receive(&self, inbound: Inbound) -> Result<ReceiveOutcome> {
        let (descriptor, message) = match inbound {
            Inbound::Message(message) => (self.validate_message(&message)?, message),
            Inbound::Encoded { topic, bytes } => {
                let descriptor = self.validate(topic)?;
                match descriptor.decode(&bytes) {
                    Ok(payload) => (descriptor, Message::from_parts(topic, payload)),
                    Err(e) => {
                        log::debug!(
                            "[router] dropping undecodable payload for topic '{}': {}",
                            descriptor.name(),
                            e
                        );
                        return Ok(self.discard());
                    }
                }
            }
            Inbound::Control { kind } => {
                log::debug!("[router] dropping non-message object '{}'", kind);
                return Ok(self.discard());
            }
        };

        log::debug!(
            "[router] message received for topic '{}'",
            descriptor.name()
        );
        Ok(self.dispatch(descriptor, &message))
    }

    fn discard(&self) -> ReceiveOutcome {
        self.metrics.objects_discarded.fetch_add(1, Ordering::Relaxed);
        ReceiveOutcome::Discarded
    }

    /// Bound variables first, then listeners, for this topic only.
    fn dispatch(&self, descriptor: &TopicDescriptor, message: &Message) -> ReceiveOutcome {
        let topic = descriptor.id();
        let inputs = self.bindings.update(topic, message.payload());
        let report = self.listeners.dispatch(topic, message.payload());

        self.metrics.messages_dispatched.fetch_add(1, Ordering::Relaxed);
        if report.panicked > 0 {
            self.metrics
                .listener_panics
                .fetch_add(report.panicked as u64, Ordering::Relaxed);
        }

        ReceiveOutcome::Delivered {
            inputs,
            listeners: report.delivered,
        }
    }
}
