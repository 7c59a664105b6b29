// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end integration tests
//!
//! Two messagers sharing the "Speed" API exchange values, then one side
//! closes and the other keeps delivering locally. Runs over the loopback
//! transport and over localhost TCP.

use messager::transport::loopback::LoopbackTransport;
use messager::{
    Input, LifecycleState, ManualUpdateDriver, Messager, MessagerApi, MessagerStateListener,
    PeriodicUpdateDriver, SubmitOutcome, TcpConfig, TcpTransport, Topic,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn speed_api() -> (Arc<MessagerApi>, Topic<f64>) {
    let mut builder = MessagerApi::builder("Speedometer");
    let speed = builder.topic::<f64>("Speed").expect("speed");
    (Arc::new(builder.build()), speed)
}

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

fn start_both(a: Messager, b: &Messager) -> Messager {
    // start() blocks until the peer is up, so one side starts on its own thread.
    let starter = thread::spawn(move || {
        a.start_messager().expect("start A");
        a
    });
    b.start_messager().expect("start B");
    starter.join().expect("starter thread")
}

/// The scenario shared by both transports. `pump_a` drives A's inbound side.
fn run_speed_scenario(a: &Messager, b: &Messager, speed: &Topic<f64>, mut pump_a: impl FnMut()) {
    let a_speed: Input<f64> = a.create_input(speed, 0.0);
    let b_speed: Input<f64> = b.create_input(speed, 0.0);

    assert!(a.is_messager_open());
    assert!(b.is_messager_open());

    assert_eq!(b.submit(speed, 5.0).expect("B submit 5"), SubmitOutcome::Sent);
    assert_eq!(b_speed.value(), Some(5.0));
    wait_for("A to read 5", || {
        pump_a();
        a_speed.value() == Some(5.0)
    });

    a.close_messager().expect("close A");
    assert_eq!(a.lifecycle_state(), LifecycleState::Closed);
    wait_for("B to see the close", || !b.is_messager_open());

    assert_eq!(
        b.submit(speed, 9.0).expect("B submit 9"),
        SubmitOutcome::SkippedClosed
    );
    assert_eq!(b_speed.value(), Some(9.0));
    assert_eq!(a_speed.value(), Some(5.0));
}

#[test]
fn test_speed_scenario_over_loopback() {
    let (api, speed) = speed_api();
    let (ta, tb) = LoopbackTransport::pair();
    let driver_a = Arc::new(ManualUpdateDriver::new());
    let a = Messager::named("A", Arc::clone(&api), Arc::new(ta), driver_a.clone());
    let b = Messager::named("B", api, Arc::new(tb), Arc::new(ManualUpdateDriver::new()));

    let a = start_both(a, &b);
    run_speed_scenario(&a, &b, &speed, || {
        driver_a.update().expect("pump A");
    });
}

#[test]
fn test_speed_scenario_over_tcp() {
    let (api, speed) = speed_api();
    let server = TcpTransport::server(
        Arc::clone(&api),
        TcpConfig::server(0).with_address("127.0.0.1"),
    )
    .expect("bind server");
    let port = server.local_addr().expect("bound address").port();

    let a = Messager::named(
        "A",
        Arc::clone(&api),
        Arc::new(server),
        Arc::new(PeriodicUpdateDriver::new("A", Duration::from_millis(2))),
    );
    let b = Messager::tcp_client(api, "127.0.0.1", port, "B", Duration::from_millis(2))
        .expect("client messager");

    let b_states = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&b_states);
    let listener: Arc<dyn MessagerStateListener> = Arc::new(move |open: bool| s.lock().push(open));
    b.register_messager_state_listener(listener);

    let a = start_both(a, &b);
    run_speed_scenario(&a, &b, &speed, || {});

    b.close_messager().expect("close B");
    assert_eq!(*b_states.lock(), vec![true, false]);
}

#[test]
fn test_tcp_messager_from_config_roundtrip() {
    let (api, speed) = speed_api();
    let server = TcpTransport::server(
        Arc::clone(&api),
        TcpConfig::server(0).with_address("127.0.0.1"),
    )
    .expect("bind server");
    let port = server.local_addr().expect("bound address").port();
    let a = Messager::named(
        "A",
        Arc::clone(&api),
        Arc::new(server),
        Arc::new(PeriodicUpdateDriver::new("A", Duration::from_millis(2))),
    );

    let config = messager::MessagerConfig::from_toml_str(&format!(
        "name = \"B\"\nrole = \"client\"\naddress = \"127.0.0.1\"\nport = {}\nupdate_period_ms = 2\n",
        port
    ))
    .expect("config");
    let b = Messager::from_config(api, &config).expect("client messager");

    let a = start_both(a, &b);
    let b_speed = b.create_input_default(&speed);
    a.submit(&speed, 12.5).expect("A submit");
    wait_for("B to read 12.5", || b_speed.value() == Some(12.5));

    b.close_messager().expect("close B");
    a.close_messager().expect("close A");
}
