// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::fixed_header::{FixedHeader, PacketId, PacketType, QoS};
use crate::packet::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, DecodePacket, DisconnectPacket,
    EncodePacket, PingRequestPacket, PublishAckPacket, PublishPacket, SubscribeAckPacket,
    SubscribePacket,
};
use crate::session::{Keepalive, Phase};
use crate::subscription::SubscriptionRegistry;
use crate::transport::{self, TransportReader, TransportWriter};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
const RECONNECT_DELAY_MS: u32 = 1000;
const RECV_TIMEOUT: Duration = Duration::from_millis(2000);
const MAX_PACKET_SIZE: usize = 1024;

/// Shared, lock-protected state touched by both the foreground `Client`
/// handle and the background reader thread. This guards only state — the
/// write half of the transport, phase, keepalive, subscriptions, packet
/// id counter — never a blocking read; the reader thread's blocking
/// `recv` runs on a transport half it owns outright, outside this lock.
struct Shared {
    options: ConnectOptions,
    clock: Arc<dyn Clock>,
    transport: Option<Box<dyn TransportWriter>>,
    phase: Phase,
    keepalive: Keepalive,
    packet_id: PacketId,
    subscriptions: SubscriptionRegistry,
}

impl Shared {
    fn next_packet_id(&mut self) -> PacketId {
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        self.packet_id
    }

    /// Close the write half, if any, and transition to `Disconnected`.
    /// Idempotent: calling it again on an already-disconnected session
    /// does nothing.
    fn disconnect(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
        self.transport = None;
        self.phase = Phase::Disconnected;
    }

    /// Encode and send `packet`. A send failure disconnects the session
    /// immediately, per the requirement that a failed outbound PUBLISH,
    /// SUBSCRIBE, or PINGREQ tear down the transport rather than leave
    /// `is_connected()` reporting stale state.
    fn send<P: EncodePacket>(&mut self, packet: &P) -> Result<(), Error> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "client is not connected"))?;
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        if let Err(err) = transport.send(&buf) {
            let err = Error::from(err);
            log::warn!("transport send failed, disconnecting: {err}");
            self.disconnect();
            return Err(err);
        }
        self.keepalive.note_activity(self.clock.now_ms());
        Ok(())
    }
}

/// One MQTT 3.1.1 session: a broker connection, its keepalive/reconnect
/// state machine, and the subscription registry replayed after every
/// reconnect. Publish and subscribe calls may be made from any thread;
/// they serialize on the same mutex the background reader uses to touch
/// shared state, but never race the reader's blocking recv, which runs
/// on an independent transport half.
pub struct Client {
    shared: Arc<Mutex<Shared>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Client {
    /// Connect to the broker and start the background reader thread.
    /// Blocks until the initial CONNECT/CONNACK handshake completes.
    pub fn create(options: ConnectOptions) -> Result<Self, Error> {
        Self::create_with_clock(options, SystemClock::shared())
    }

    pub fn create_with_clock(options: ConnectOptions, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let (writer, mut reader) = transport::connect(&options, CONNECT_TIMEOUT)?;
        let now_ms = clock.now_ms();
        let keepalive = Keepalive::new(options.keepalive_secs(), now_ms);

        let shared = Shared {
            options,
            clock,
            transport: Some(writer),
            phase: Phase::Disconnected,
            keepalive,
            packet_id: 0,
            subscriptions: SubscriptionRegistry::new(),
        };
        let shared = Arc::new(Mutex::new(shared));
        perform_handshake(&shared, reader.as_mut())?;

        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let reader_shared = Arc::clone(&shared);
        let reader_running = Arc::clone(&running);
        let reader_thread =
            std::thread::spawn(move || reader_loop(reader_shared, reader_running, reader));

        Ok(Client {
            shared,
            running,
            reader: Some(reader_thread),
        })
    }

    /// Send a PUBLISH. For `QoS::AtLeastOnce` a packet id is assigned; the
    /// broker's PUBACK is observed by the reader thread but, matching the
    /// scope of this client, does not trigger retransmission on timeout.
    pub fn publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<(), Error> {
        if topic.len() + payload.len() > MAX_PACKET_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "publish exceeds the maximum packet size",
            ));
        }
        let mut shared = self.shared.lock().unwrap();
        if shared.phase != Phase::Connected {
            return Err(Error::new(ErrorKind::NotConnected, "client is not connected"));
        }
        let mut packet = PublishPacket::new(topic, qos, payload);
        if qos != QoS::AtMostOnce {
            let packet_id = shared.next_packet_id();
            packet = packet.with_packet_id(packet_id);
        }
        shared.send(&packet)
    }

    /// Send a SUBSCRIBE and, only once it is fully sent, register the
    /// filter so a future reconnect replays it. A call made while
    /// disconnected, or whose send fails, never touches the registry —
    /// otherwise a caller told `subscribe` failed would still see the
    /// filter silently resurface on the next reconnect.
    pub fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<(), Error> {
        if topic_filter.len() > crate::subscription::MAX_TOPIC_LEN {
            return Err(Error::new(ErrorKind::InvalidArgument, "topic filter too long"));
        }
        let mut shared = self.shared.lock().unwrap();
        if shared.phase != Phase::Connected {
            return Err(Error::new(ErrorKind::NotConnected, "client is not connected"));
        }
        let packet_id = shared.next_packet_id();
        let packet = SubscribePacket::new(topic_filter, qos, packet_id);
        shared.send(&packet)?;
        shared.subscriptions.insert(topic_filter, qos);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().phase == Phase::Connected
    }

    /// Stop the reader thread and close the transport. Does not attempt a
    /// graceful DISCONNECT/reconnect afterward.
    pub fn destroy(mut self) -> Result<(), Error> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.phase == Phase::Connected {
                let _ = shared.send(&DisconnectPacket);
            }
            shared.disconnect();
        }
        if let Some(reader) = self.reader.take() {
            reader.join().map_err(|_| {
                Error::new(ErrorKind::IoError, "reader thread panicked")
            })?;
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.reader.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// Send CONNECT and block for CONNACK, as part of the initial `create` and
/// every subsequent reconnect attempt. The send-mutex is held only long
/// enough to hand the encoded CONNECT to the transport; it is released
/// before the blocking wait for CONNACK so a concurrent `publish`/
/// `subscribe` call never stalls behind the handshake's network round trip.
fn perform_handshake(
    shared: &Arc<Mutex<Shared>>,
    reader: &mut dyn TransportReader,
) -> Result<(), Error> {
    {
        let mut shared = shared.lock().unwrap();
        let connect_packet = ConnectPacket::from_options(&shared.options);
        shared.send(&connect_packet)?;
    }

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let n = reader.recv(&mut buf, CONNECT_TIMEOUT).map_err(Error::from);
    let n = match n {
        Ok(n) => n,
        Err(err) => {
            shared.lock().unwrap().disconnect();
            return Err(err);
        }
    };
    if n == 0 {
        shared.lock().unwrap().disconnect();
        return Err(Error::new(ErrorKind::HandshakeError, "broker closed the connection"));
    }
    let ack = match ConnectAckPacket::decode(&buf[..n]) {
        Ok(ack) => ack,
        Err(err) => {
            shared.lock().unwrap().disconnect();
            return Err(err);
        }
    };
    if ack.return_code != ConnectReturnCode::Accepted {
        shared.lock().unwrap().disconnect();
        return Err(Error::from_string(
            ErrorKind::HandshakeError,
            format!("broker rejected CONNECT: {:?}", ack.return_code),
        ));
    }

    let mut shared = shared.lock().unwrap();
    let now_ms = shared.clock.now_ms();
    shared.phase = Phase::Connected;
    shared.keepalive = Keepalive::new(shared.options.keepalive_secs(), now_ms);
    Ok(())
}

/// Resend a SUBSCRIBE for every entry in the registry, in insertion order,
/// with freshly allocated packet ids.
fn resubscribe_all(shared: &mut Shared) -> Result<(), Error> {
    let filters: Vec<(String, QoS)> = shared
        .subscriptions
        .iter()
        .map(|s| (s.topic_filter.clone(), s.qos))
        .collect();
    for (topic_filter, qos) in filters {
        let packet_id = shared.next_packet_id();
        let packet = SubscribePacket::new(&topic_filter, qos, packet_id);
        shared.send(&packet)?;
    }
    Ok(())
}

/// Reconnect, replay the subscription registry, and return the new read
/// half once Connected again. The first attempt happens immediately; only
/// a failed attempt is followed by a fixed delay before the next retry.
/// Retries forever (subject to `running`); the reader loop calls this
/// whenever the link is found to be down and swaps in the returned reader.
fn reconnect_loop(
    shared: &Arc<Mutex<Shared>>,
    running: &std::sync::atomic::AtomicBool,
) -> Option<Box<dyn TransportReader>> {
    use std::sync::atomic::Ordering;

    let mut first_attempt = true;
    while running.load(Ordering::SeqCst) {
        if !first_attempt {
            let clock = Arc::clone(&shared.lock().unwrap().clock);
            clock.sleep_ms(RECONNECT_DELAY_MS);
            if !running.load(Ordering::SeqCst) {
                return None;
            }
        }
        first_attempt = false;

        let options = shared.lock().unwrap().options.clone();
        let attempt = transport::connect(&options, CONNECT_TIMEOUT).and_then(|(writer, mut reader)| {
            shared.lock().unwrap().transport = Some(writer);
            perform_handshake(shared, reader.as_mut())?;
            resubscribe_all(&mut shared.lock().unwrap())?;
            Ok(reader)
        });

        match attempt {
            Ok(reader) => return Some(reader),
            Err(err) => log::warn!("reconnect attempt failed: {err}"),
        }
    }
    None
}

/// Single background reader: drives keepalive, receives and dispatches
/// inbound packets, and triggers reconnection on link failure. Owns its
/// read half as a plain local variable — the blocking `recv` call never
/// takes the state lock, so it can never stall a concurrent `publish` or
/// `subscribe` call.
fn reader_loop(
    shared: Arc<Mutex<Shared>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    mut reader: Box<dyn TransportReader>,
) {
    use std::sync::atomic::Ordering;

    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    while running.load(Ordering::SeqCst) {
        let phase = shared.lock().unwrap().phase;
        if phase != Phase::Connected {
            match reconnect_loop(&shared, &running) {
                Some(new_reader) => reader = new_reader,
                None => return,
            }
            continue;
        }

        let now_ms = shared.lock().unwrap().clock.now_ms();
        let should_ping = shared.lock().unwrap().keepalive.should_ping(now_ms);
        if should_ping {
            let mut shared_guard = shared.lock().unwrap();
            if shared_guard.send(&PingRequestPacket).is_ok() {
                let now_ms = shared_guard.clock.now_ms();
                shared_guard.keepalive.note_ping_sent(now_ms);
            } else {
                log::warn!("failed to send PINGREQ");
            }
        }

        let dead = {
            let shared_guard = shared.lock().unwrap();
            let now_ms = shared_guard.clock.now_ms();
            shared_guard.keepalive.is_dead(now_ms)
        };
        if dead {
            log::warn!("broker did not answer PINGREQ in time, reconnecting");
            shared.lock().unwrap().disconnect();
            continue;
        }

        let recv_result = reader.recv(&mut buf, RECV_TIMEOUT).map_err(Error::from);

        match recv_result {
            Ok(0) => {
                log::warn!("broker closed the connection");
                shared.lock().unwrap().disconnect();
            }
            Ok(n) => {
                if let Err(err) = dispatch(&shared, &buf[..n]) {
                    log::error!("failed to handle inbound packet: {err}");
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::SocketError) => {
                // Receive poll timed out with nothing to read; loop back
                // around to re-check keepalive timers.
            }
            Err(err) => {
                log::warn!("transport error, reconnecting: {err}");
                shared.lock().unwrap().disconnect();
            }
        }
    }
}

fn dispatch(shared: &Arc<Mutex<Shared>>, buf: &[u8]) -> Result<(), Error> {
    let (header, _offset) = FixedHeader::decode(buf)?;
    match header.packet_type {
        PacketType::PingResponse => {
            let mut shared = shared.lock().unwrap();
            let now_ms = shared.clock.now_ms();
            shared.keepalive.note_pingresp(now_ms);
            Ok(())
        }
        PacketType::Publish { .. } => {
            let packet = PublishPacket::decode(buf)?;
            let (ack, cb) = {
                let mut shared = shared.lock().unwrap();
                let now_ms = shared.clock.now_ms();
                shared.keepalive.note_activity(now_ms);
                let ack = if packet.qos == QoS::AtLeastOnce {
                    packet.packet_id
                } else {
                    None
                };
                (ack, shared.options.msg_cb().cloned())
            };
            if let Some(cb) = cb {
                cb(&packet.topic, &packet.payload);
            }
            if let Some(packet_id) = ack {
                let mut shared = shared.lock().unwrap();
                let ack_packet = PublishAckPacket::new(packet_id);
                shared.send(&ack_packet)?;
            }
            Ok(())
        }
        PacketType::SubscribeAck => {
            let packet = SubscribeAckPacket::decode(buf)?;
            log::debug!("subscription {} acknowledged: {:?}", packet.packet_id, packet.granted);
            let mut shared = shared.lock().unwrap();
            let now_ms = shared.clock.now_ms();
            shared.keepalive.note_activity(now_ms);
            Ok(())
        }
        PacketType::PublishAck => {
            let packet = PublishAckPacket::decode(buf)?;
            log::debug!("publish {} acknowledged", packet.packet_id);
            let mut shared = shared.lock().unwrap();
            let now_ms = shared.clock.now_ms();
            shared.keepalive.note_activity(now_ms);
            Ok(())
        }
        other => {
            log::debug!("ignoring unexpected packet type: {other:?}");
            Ok(())
        }
    }
}
