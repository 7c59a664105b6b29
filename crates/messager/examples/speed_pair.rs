// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speed pair demo: a TCP server and client in one process.
//!
//! ```text
//! RUST_LOG=debug cargo run -p messager --example speed_pair
//! ```

use messager::{Messager, MessagerApi, PeriodicUpdateDriver, Result, TcpConfig, TcpTransport};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PERIOD: Duration = Duration::from_millis(10);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut builder = MessagerApi::builder("Speedometer");
    let speed = builder.topic::<f64>("Speed")?;
    let api = Arc::new(builder.build());

    let server = TcpTransport::server(
        Arc::clone(&api),
        TcpConfig::server(0).with_address("127.0.0.1"),
    )?;
    let port = server
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or_default();
    let dashboard = Messager::named(
        "dashboard",
        Arc::clone(&api),
        Arc::new(server),
        Arc::new(PeriodicUpdateDriver::new("dashboard", PERIOD)),
    );
    let engine = Messager::tcp_client(api, "127.0.0.1", port, "engine", PERIOD)?;

    let displayed = dashboard.create_input(&speed, 0.0);
    let listener: Arc<dyn messager::TopicListener<f64>> =
        Arc::new(|value: &f64| log::info!("dashboard: speed is now {:.1}", value));
    dashboard.register_topic_listener(&speed, listener);

    let dashboard = thread::spawn(move || -> Result<Messager> {
        dashboard.start_messager()?;
        Ok(dashboard)
    });
    engine.start_messager()?;
    let dashboard = dashboard
        .join()
        .map_err(|_| messager::Error::InvalidState("dashboard thread panicked".into()))??;

    for step in 1..=5 {
        engine.submit(&speed, f64::from(step) * 10.0)?;
        thread::sleep(PERIOD * 5);
    }
    log::info!("dashboard displays {:?}", displayed.value());

    dashboard.close_messager()?;
    thread::sleep(PERIOD * 5);
    let outcome = engine.submit(&speed, 99.0)?;
    log::info!(
        "engine submit after dashboard closed: {:?} (dashboard still shows {:?})",
        outcome,
        displayed.value()
    );

    engine.close_messager()
}
