// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing engine: bound variables, topic listeners and the router that feeds
//! them.
//!
//! ```text
//! Transport --> MessageRouter --> BindingManager  (Input<T> cells)
//!                     |       \-> ListenerManager (TopicListener<T>)
//!                     \-- submit --> [self-delivery] --> Transport
//! ```

mod binding;
mod fanout;
mod listener;
mod router;

pub use binding::{BindingManager, Input};
pub use listener::{
    DispatchReport, ListenerManager, MessagerStateListener, StateListeners, TopicListener,
};
pub use router::{
    MessageRouter, ReceiveOutcome, RouterMetrics, RouterMetricsSnapshot, SubmitOutcome,
};
