// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use embermqtt::ConnectOptions;

mod common;
use common::{BrokerEvent, FakeBroker};

#[test]
fn idle_connection_sends_pingreq_within_half_keepalive() {
    let broker = FakeBroker::start();
    let options = ConnectOptions::builder(broker.addr)
        .unwrap()
        .client_id("test-keepalive")
        .keepalive_secs(2)
        .build()
        .unwrap();
    let client = embermqtt::Client::create(options).expect("handshake succeeds");
    assert!(matches!(
        broker.next_event(Duration::from_secs(2)),
        Some(BrokerEvent::Connected)
    ));

    // Half of a 2s keepalive is 1s; give the reader loop enough slack for
    // its own recv-timeout polling cadence before declaring failure.
    assert!(matches!(
        broker.next_event(Duration::from_secs(4)),
        Some(BrokerEvent::PingReceived)
    ));

    client.destroy().unwrap();
}
