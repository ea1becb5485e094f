// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Minimal in-process broker double driving the integration tests below.
//! It understands just enough of MQTT 3.1.1 to exercise the client: it
//! always accepts CONNECT, always grants SUBSCRIBE, and answers PINGREQ.

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use embermqtt::fixed_header::{FixedHeader, PacketType};
use embermqtt::packet::{ConnectAckPacket, ConnectReturnCode, DecodePacket, PublishPacket};

/// Event observed by the test from the broker side, forwarded over a
/// channel so assertions can run on the main test thread.
#[derive(Debug)]
pub enum BrokerEvent {
    Connected,
    Subscribed { packet_id: u16 },
    PingReceived,
    Published { topic: String, payload: Vec<u8> },
}

pub struct FakeBroker {
    pub addr: SocketAddr,
    events: Receiver<BrokerEvent>,
    connections: Arc<Mutex<Vec<TcpStream>>>,
    accept_thread: Option<JoinHandle<()>>,
}

impl FakeBroker {
    /// Start listening. Each accepted connection gets its own thread that
    /// speaks just enough MQTT to keep the client happy, until the test
    /// drops the broker or the client closes the socket.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake broker");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let connections = Arc::new(Mutex::new(Vec::new()));

        let accept_connections = Arc::clone(&connections);
        let accept_thread = std::thread::spawn(move || accept_loop(listener, tx, accept_connections));

        FakeBroker {
            addr,
            events: rx,
            connections,
            accept_thread: Some(accept_thread),
        }
    }

    pub fn next_event(&self, timeout: std::time::Duration) -> Option<BrokerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Forcibly close every connection currently open, simulating a broker
    /// restart or a dropped link. The client's reader thread observes a
    /// zero-byte read and moves to the reconnect loop.
    pub fn disconnect_all(&self) {
        let mut connections = self.connections.lock().unwrap();
        for conn in connections.drain(..) {
            let _ = conn.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        // The accept thread blocks in `listener.accept()` forever; this
        // double is only ever used for the lifetime of a single test
        // process, so we don't bother joining it on drop.
        let _ = self.accept_thread.take();
    }
}

fn accept_loop(listener: TcpListener, tx: Sender<BrokerEvent>, connections: Arc<Mutex<Vec<TcpStream>>>) {
    for stream in listener.incoming() {
        let Ok(stream) = stream else { return };
        if let Ok(handle) = stream.try_clone() {
            connections.lock().unwrap().push(handle);
        }
        let tx = tx.clone();
        std::thread::spawn(move || serve_connection(stream, tx));
    }
}

fn serve_connection(mut stream: TcpStream, tx: Sender<BrokerEvent>) {
    stream.set_nodelay(true).ok();
    let mut buf = vec![0u8; 1024];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let Ok((header, _offset)) = FixedHeader::decode(&buf[..n]) else {
            continue;
        };
        match header.packet_type {
            PacketType::Connect => {
                let ack = ConnectAckPacket {
                    session_present: false,
                    return_code: ConnectReturnCode::Accepted,
                };
                let mut out = Vec::new();
                // CONNACK has no encoder on the client side (the client
                // never sends one), so it is built by hand here.
                out.push(0x20);
                out.push(0x02);
                out.push(u8::from(ack.session_present));
                out.push(0x00);
                use std::io::Write;
                if stream.write_all(&out).is_err() {
                    return;
                }
                let _ = tx.send(BrokerEvent::Connected);
            }
            PacketType::Subscribe => {
                let packet_id = u16::from_be_bytes([buf[2], buf[3]]);
                let ack = SubackBytes::encode(packet_id);
                use std::io::Write;
                if stream.write_all(&ack).is_err() {
                    return;
                }
                let _ = tx.send(BrokerEvent::Subscribed { packet_id });
            }
            PacketType::PingRequest => {
                use std::io::Write;
                if stream.write_all(&[0xd0, 0x00]).is_err() {
                    return;
                }
                let _ = tx.send(BrokerEvent::PingReceived);
            }
            PacketType::Publish { .. } => {
                if let Ok(packet) = PublishPacket::decode(&buf[..n]) {
                    let _ = tx.send(BrokerEvent::Published {
                        topic: packet.topic.clone(),
                        payload: packet.payload.clone(),
                    });
                }
            }
            PacketType::Disconnect => return,
            _ => {}
        }
    }
}

/// Tiny hand-rolled SUBACK encoder: the client crate has no encoder for
/// this packet type since it never sends one, so the broker double builds
/// the three bytes directly instead of depending on SubscribeAckPacket.
struct SubackBytes;

impl SubackBytes {
    fn encode(packet_id: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0x90);
        out.push(0x03);
        out.extend_from_slice(&packet_id.to_be_bytes());
        out.push(0x00); // granted QoS 0
        out
    }
}
