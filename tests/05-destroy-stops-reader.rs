// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use embermqtt::{ConnectOptions, QoS};

mod common;
use common::{BrokerEvent, FakeBroker};

#[test]
fn destroy_joins_reader_thread_even_with_a_publish_in_flight() {
    let broker = FakeBroker::start();
    let options = ConnectOptions::builder(broker.addr)
        .unwrap()
        .client_id("test-destroy")
        .build()
        .unwrap();
    let client = embermqtt::Client::create(options).expect("handshake succeeds");
    assert!(matches!(
        broker.next_event(Duration::from_secs(2)),
        Some(BrokerEvent::Connected)
    ));

    client
        .publish("devices/probe-1/status", QoS::AtMostOnce, b"going down")
        .unwrap();
    assert!(matches!(
        broker.next_event(Duration::from_secs(2)),
        Some(BrokerEvent::Published { .. })
    ));

    // destroy() must return once the reader thread has actually stopped,
    // not merely requested a stop; a hang here means the join is broken.
    client.destroy().expect("destroy joins cleanly");
}
