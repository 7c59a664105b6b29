// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The messager facade.
//!
//! [`Messager`] owns the lifecycle (start/close). [`MessagerBasics`] is the
//! clonable handle components receive to publish and subscribe without being
//! able to start or close the endpoint.

use crate::api::{MessagerApi, Topic, TopicValue};
use crate::config::MessagerConfig;
use crate::engine::{
    Input, MessageRouter, MessagerStateListener, RouterMetricsSnapshot, StateListeners,
    SubmitOutcome, TopicListener,
};
use crate::error::Result;
use crate::lifecycle::{LifecycleController, LifecycleState, PeriodicUpdateDriver, UpdateDriver};
use crate::message::Message;
use crate::transport::tcp::{TcpConfig, TcpTransport};
use crate::transport::{Inbound, Transport};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Clonable publish/subscribe handle on a messager.
#[derive(Clone)]
pub struct MessagerBasics {
    router: Arc<MessageRouter>,
    lifecycle: Arc<LifecycleController>,
}

impl MessagerBasics {
    pub fn messager_api(&self) -> &Arc<MessagerApi> {
        self.router.api()
    }

    /// Route a message locally (if self-submit is on) and to the peer.
    pub fn submit_message(&self, message: Message) -> Result<SubmitOutcome> {
        self.router.submit(message)
    }

    /// Shorthand for `submit_message(Message::new(topic, content))`.
    pub fn submit<T: TopicValue>(&self, topic: &Topic<T>, content: T) -> Result<SubmitOutcome> {
        self.router.submit(Message::new(topic, content))
    }

    /// New bound variable seeded with `initial`.
    pub fn create_input<T: TopicValue>(&self, topic: &Topic<T>, initial: T) -> Input<T> {
        self.router.bindings().create_input(topic, initial)
    }

    /// New bound variable, empty until the first message on `topic`.
    pub fn create_input_default<T: TopicValue>(&self, topic: &Topic<T>) -> Input<T> {
        self.router.bindings().create_input_default(topic)
    }

    pub fn attach_input<T: TopicValue>(&self, topic: &Topic<T>, input: &Input<T>) -> bool {
        self.router.bindings().attach_input(topic, input)
    }

    pub fn remove_input<T: TopicValue>(&self, topic: &Topic<T>, input: &Input<T>) -> bool {
        self.router.bindings().remove_input(topic, input)
    }

    pub fn register_topic_listener<T: TopicValue>(
        &self,
        topic: &Topic<T>,
        listener: Arc<dyn TopicListener<T>>,
    ) -> bool {
        self.router.listeners().register_topic_listener(topic, listener)
    }

    pub fn remove_topic_listener<T: TopicValue>(
        &self,
        topic: &Topic<T>,
        listener: &Arc<dyn TopicListener<T>>,
    ) -> bool {
        self.router.listeners().remove_topic_listener(topic, listener)
    }

    /// Whether the transport currently has a live session.
    pub fn is_messager_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    pub fn register_messager_state_listener(&self, listener: Arc<dyn MessagerStateListener>) {
        self.lifecycle.state_listeners().register(listener);
    }

    pub fn remove_messager_state_listener(
        &self,
        listener: &Arc<dyn MessagerStateListener>,
    ) -> bool {
        self.lifecycle.state_listeners().remove(listener)
    }

    pub fn metrics(&self) -> RouterMetricsSnapshot {
        self.router.metrics().snapshot()
    }
}

/// A messaging endpoint: API, router, transport and lifecycle.
pub struct Messager {
    basics: MessagerBasics,
}

impl Messager {
    /// Endpoint named after its API.
    pub fn new(
        api: Arc<MessagerApi>,
        transport: Arc<dyn Transport>,
        driver: Arc<dyn UpdateDriver>,
    ) -> Self {
        let name = api.name().to_string();
        Self::named(name, api, transport, driver)
    }

    pub fn named(
        name: impl Into<String>,
        api: Arc<MessagerApi>,
        transport: Arc<dyn Transport>,
        driver: Arc<dyn UpdateDriver>,
    ) -> Self {
        let router = Arc::new(MessageRouter::new(api, Arc::clone(&transport)));

        // The transport must not keep the router alive.
        let weak = Arc::downgrade(&router);
        transport.set_received_listener(Arc::new(move |inbound: Inbound| -> Result<()> {
            match weak.upgrade() {
                Some(router) => router.on_receive(inbound).map(|_| ()),
                None => Ok(()),
            }
        }));

        let lifecycle = Arc::new(LifecycleController::new(
            name,
            transport,
            driver,
            Arc::new(StateListeners::new()),
        ));

        Self {
            basics: MessagerBasics { router, lifecycle },
        }
    }

    /// TCP server on `port`, pumped every `period` by a named thread.
    pub fn tcp_server(
        api: Arc<MessagerApi>,
        port: u16,
        name: &str,
        period: Duration,
    ) -> Result<Self> {
        Self::with_tcp(
            name,
            api,
            TcpConfig::server(port),
            Arc::new(PeriodicUpdateDriver::new(name, period)),
        )
    }

    /// TCP client for `host:port`, pumped every `period` by a named thread.
    pub fn tcp_client(
        api: Arc<MessagerApi>,
        host: &str,
        port: u16,
        name: &str,
        period: Duration,
    ) -> Result<Self> {
        Self::with_tcp(
            name,
            api,
            TcpConfig::client(host, port),
            Arc::new(PeriodicUpdateDriver::new(name, period)),
        )
    }

    /// TCP endpoint for the role in `config`, with a caller-supplied driver.
    pub fn with_tcp(
        name: &str,
        api: Arc<MessagerApi>,
        config: TcpConfig,
        driver: Arc<dyn UpdateDriver>,
    ) -> Result<Self> {
        let transport = TcpTransport::new(Arc::clone(&api), config)?;
        Ok(Self::named(name, api, Arc::new(transport), driver))
    }

    /// TCP endpoint described by a [`MessagerConfig`].
    pub fn from_config(api: Arc<MessagerApi>, config: &MessagerConfig) -> Result<Self> {
        config.validate()?;
        let driver = Arc::new(PeriodicUpdateDriver::new(
            config.name.as_str(),
            config.update_period(),
        ));
        let messager = Self::with_tcp(&config.name, api, TcpConfig::from(config), driver)?;
        messager.set_allow_self_submit(config.allow_self_submit);
        Ok(messager)
    }

    pub fn name(&self) -> &str {
        self.basics.lifecycle.name()
    }

    /// A clonable handle without lifecycle control.
    pub fn basics(&self) -> MessagerBasics {
        self.basics.clone()
    }

    /// Connect and block until the session is up, then start pumping.
    pub fn start_messager(&self) -> Result<()> {
        self.basics.lifecycle.start()
    }

    /// Disconnect and stop pumping. Idempotent.
    pub fn close_messager(&self) -> Result<()> {
        self.basics.lifecycle.close()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.basics.lifecycle.state()
    }

    /// Push the current open/closed state to every state listener.
    pub fn notify_messager_state_listeners(&self) {
        let open = self.basics.is_messager_open();
        self.basics.lifecycle.state_listeners().notify(open);
    }

    pub fn set_allow_self_submit(&self, allow: bool) {
        self.basics.router.set_allow_self_submit(allow);
    }

    pub fn allows_self_submit(&self) -> bool {
        self.basics.router.allows_self_submit()
    }
}

impl Deref for Messager {
    type Target = MessagerBasics;

    fn deref(&self) -> &MessagerBasics {
        &self.basics
    }
}

impl Drop for Messager {
    fn drop(&mut self) {
        if self.lifecycle_state() != LifecycleState::Closed {
            if let Err(e) = self.close_messager() {
                log::warn!("[messager] '{}' close on drop failed: {}", self.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ManualUpdateDriver;
    use crate::transport::loopback::LoopbackTransport;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn speed_api() -> (Arc<MessagerApi>, Topic<f64>) {
        let mut builder = MessagerApi::builder("Speedometer");
        let speed = builder.topic::<f64>("Speed").expect("speed");
        (Arc::new(builder.build()), speed)
    }

    fn loopback_messager(
        api: &Arc<MessagerApi>,
    ) -> (Messager, LoopbackTransport, Arc<ManualUpdateDriver>) {
        let (a, b) = LoopbackTransport::pair();
        let driver = Arc::new(ManualUpdateDriver::new());
        let messager = Messager::new(Arc::clone(api), Arc::new(a), driver.clone());
        (messager, b, driver)
    }

    #[test]
    fn test_basics_handle_shares_router() {
        let (api, speed) = speed_api();
        let (messager, _peer, _driver) = loopback_messager(&api);
        let basics = messager.basics();

        let input = messager.create_input(&speed, 0.0);
        basics.submit(&speed, 3.0).expect("submit");

        assert_eq!(input.value(), Some(3.0));
        assert_eq!(basics.metrics().messages_submitted, 1);
        assert_eq!(basics.messager_api().name(), "Speedometer");
        assert_eq!(messager.name(), "Speedometer");
    }

    #[test]
    fn test_inbound_from_peer_reaches_listeners() {
        let (api, speed) = speed_api();
        let (messager, peer, driver) = loopback_messager(&api);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener: Arc<dyn TopicListener<f64>> = Arc::new(move |value: &f64| {
            assert_eq!(*value, 8.0);
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(messager.register_topic_listener(&speed, Arc::clone(&listener)));

        peer.connect().expect("peer connect");
        messager.start_messager().expect("start");
        peer.send(&Message::new(&speed, 8.0)).expect("peer send");
        assert!(driver.update().expect("pump"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(messager.remove_topic_listener(&speed, &listener));
        assert!(!messager.remove_topic_listener(&speed, &listener));
    }

    #[test]
    fn test_notify_pushes_current_state() {
        let (api, _) = speed_api();
        let (messager, _peer, _driver) = loopback_messager(&api);
        let last = Arc::new(AtomicBool::new(true));
        let l = Arc::clone(&last);
        let listener: Arc<dyn MessagerStateListener> =
            Arc::new(move |open: bool| l.store(open, Ordering::SeqCst));
        messager.register_messager_state_listener(Arc::clone(&listener));

        messager.notify_messager_state_listeners();
        assert!(!last.load(Ordering::SeqCst));

        assert!(messager.remove_messager_state_listener(&listener));
        assert!(!messager.remove_messager_state_listener(&listener));
    }

    #[test]
    fn test_drop_closes_messager() {
        let (api, _) = speed_api();
        let (messager, peer, driver) = loopback_messager(&api);
        peer.connect().expect("peer connect");
        messager.start_messager().expect("start");
        assert!(peer.is_connected());

        drop(messager);
        assert!(!peer.is_connected());
        assert!(!driver.is_running());
    }

    #[test]
    fn test_from_config_applies_routing_options() {
        let (api, _) = speed_api();
        let config = MessagerConfig {
            address: "127.0.0.1".to_string(),
            allow_self_submit: false,
            ..MessagerConfig::server(0)
        };

        let messager = Messager::from_config(api, &config).expect("messager");
        assert!(!messager.allows_self_submit());
        assert_eq!(messager.lifecycle_state(), LifecycleState::Created);
        assert_eq!(messager.name(), "messager");
    }
}
