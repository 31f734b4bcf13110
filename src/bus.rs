//! Pub/sub abstraction over the message bus (spec §6 "Bus topics").
//!
//! The protocol core never talks to Redis directly; it only sees
//! [`RequestSource`], [`EventSink`], and [`ResponsePublisher`]. This keeps
//! `device`/`router`/`poll_loop` runtime-agnostic and lets tests substitute
//! [`InMemoryBus`] for a live Redis connection, the same separation
//! `ssp-server` keeps between its `bus` crate (in-process broadcast) and
//! `device_handle.rs` (protocol engine).

use log::{debug, warn};

/// One inbound command envelope plus the topic it arrived on.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Where command envelopes come from (spec §6: `hopper-request`,
/// `validator-request`, and the reserved no-op `metacash` topic).
pub trait RequestSource: Send {
    /// Blocks until a message is available, or returns `None` on a clean
    /// shutdown signal from the underlying transport.
    fn recv(&mut self) -> Option<InboundMessage>;
}

/// Where domain events are published (spec §6: `hopper-event`,
/// `validator-event`).
pub trait EventSink: Send {
    fn publish_event(&mut self, topic: &str, payload: &[u8]);
}

/// Where command responses are published (spec §6: `hopper-response`,
/// `validator-response`).
pub trait ResponsePublisher: Send {
    fn publish_response(&mut self, topic: &str, payload: &[u8]);
}

/// Topic names, grouped so callers never hand-roll a `"-request"` suffix.
pub mod topics {
    pub const RESERVED: &str = "metacash";
    pub const HOPPER_REQUEST: &str = "hopper-request";
    pub const VALIDATOR_REQUEST: &str = "validator-request";
    pub const HOPPER_RESPONSE: &str = "hopper-response";
    pub const VALIDATOR_RESPONSE: &str = "validator-response";
    pub const HOPPER_EVENT: &str = "hopper-event";
    pub const VALIDATOR_EVENT: &str = "validator-event";
}

#[cfg(feature = "redis-bus")]
pub mod redis_bus {
    //! Redis-backed implementation using two connections, one for
    //! subscribing and one for publishing, so a burst of publishes never
    //! blocks delivery of an inbound command (spec §5 "Shared resources").
    //!
    //! Redis's `PubSub` type borrows its connection, which doesn't fit a
    //! struct callers hold onto across `recv()` calls; a dedicated thread
    //! owns the connection and the subscription loop instead, forwarding
    //! decoded messages over a channel.

    use super::*;
    use crossbeam::channel::{self, Receiver};
    use redis::{Client, Commands};

    pub struct RedisRequestSource {
        inbound: Receiver<InboundMessage>,
    }

    impl RedisRequestSource {
        pub fn connect(host: &str, port: u16) -> redis::RedisResult<Self> {
            let client = Client::open(format!("redis://{host}:{port}/"))?;
            let mut conn = client.get_connection()?;
            let (tx, rx) = channel::unbounded();

            std::thread::spawn(move || {
                let mut pubsub = conn.as_pubsub();
                if pubsub.subscribe(topics::RESERVED).is_err()
                    || pubsub.subscribe(topics::HOPPER_REQUEST).is_err()
                    || pubsub.subscribe(topics::VALIDATOR_REQUEST).is_err()
                {
                    warn!("bus subscribe failed, request source thread exiting");
                    return;
                }
                loop {
                    let msg = match pubsub.get_message() {
                        Ok(msg) => msg,
                        Err(err) => {
                            warn!("bus recv failed: {err}");
                            break;
                        }
                    };
                    let topic = msg.get_channel_name().to_string();
                    if topic == topics::RESERVED {
                        debug!("ignoring reserved topic {topic}");
                        continue;
                    }
                    let Ok(payload) = msg.get_payload::<Vec<u8>>() else { continue };
                    if tx.send(InboundMessage { topic, payload }).is_err() {
                        break;
                    }
                }
            });

            Ok(Self { inbound: rx })
        }
    }

    impl RequestSource for RedisRequestSource {
        fn recv(&mut self) -> Option<InboundMessage> {
            self.inbound.recv().ok()
        }
    }

    pub struct RedisPublisher {
        client: Client,
        conn: redis::Connection,
    }

    impl RedisPublisher {
        pub fn connect(host: &str, port: u16) -> redis::RedisResult<Self> {
            let client = Client::open(format!("redis://{host}:{port}/"))?;
            let conn = client.get_connection()?;
            Ok(Self { client, conn })
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) {
            let result: redis::RedisResult<()> = self.conn.publish(topic, payload);
            if let Err(err) = result {
                warn!("bus publish to {topic} failed, reconnecting: {err}");
                match self.client.get_connection() {
                    Ok(conn) => self.conn = conn,
                    Err(err) => warn!("bus reconnect failed: {err}"),
                }
            }
        }
    }

    impl EventSink for RedisPublisher {
        fn publish_event(&mut self, topic: &str, payload: &[u8]) {
            self.publish(topic, payload);
        }
    }

    impl ResponsePublisher for RedisPublisher {
        fn publish_response(&mut self, topic: &str, payload: &[u8]) {
            self.publish(topic, payload);
        }
    }
}

/// In-memory bus double used by tests (gated behind the `mock` feature,
/// mirroring `ssp-server`'s own `mock` Cargo feature).
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct InMemoryBus {
        pub inbound: VecDeque<InboundMessage>,
        pub responses: Vec<(String, Vec<u8>)>,
        pub events: Vec<(String, Vec<u8>)>,
    }

    impl InMemoryBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_request(&mut self, topic: &str, payload: &[u8]) {
            self.inbound.push_back(InboundMessage { topic: topic.to_string(), payload: payload.to_vec() });
        }
    }

    impl RequestSource for InMemoryBus {
        fn recv(&mut self) -> Option<InboundMessage> {
            self.inbound.pop_front()
        }
    }

    impl EventSink for InMemoryBus {
        fn publish_event(&mut self, topic: &str, payload: &[u8]) {
            self.events.push((topic.to_string(), payload.to_vec()));
        }
    }

    impl ResponsePublisher for InMemoryBus {
        fn publish_response(&mut self, topic: &str, payload: &[u8]) {
            self.responses.push((topic.to_string(), payload.to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryBus;
    use super::*;

    #[test]
    fn in_memory_bus_round_trips_request_and_response() {
        let mut bus = InMemoryBus::new();
        bus.push_request(topics::HOPPER_REQUEST, b"{\"cmd\":\"empty\"}");
        let msg = bus.recv().unwrap();
        assert_eq!(msg.topic, topics::HOPPER_REQUEST);

        bus.publish_response(topics::HOPPER_RESPONSE, b"{\"result\":\"ok\"}");
        assert_eq!(bus.responses.len(), 1);
        assert_eq!(bus.responses[0].0, topics::HOPPER_RESPONSE);
    }

    #[test]
    fn in_memory_bus_records_events_separately_from_responses() {
        let mut bus = InMemoryBus::new();
        bus.publish_event(topics::HOPPER_EVENT, b"{\"event\":\"unit reset\"}");
        assert_eq!(bus.events.len(), 1);
        assert!(bus.responses.is_empty());
    }
}
